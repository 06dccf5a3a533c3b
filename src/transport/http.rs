use crate::error::Result;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone, Debug)]
pub enum Auth {
    None,
    Basic { username: String, password: String },
    Bearer(HeaderValue),
}

impl Auth {
    /// # Errors
    /// Returns an error if the token cannot be used as a header value.
    #[allow(clippy::result_large_err)]
    pub fn bearer(token: &str) -> Result<Self> {
        Ok(Self::Bearer(HeaderValue::from_str(&format!("Bearer {token}"))?))
    }

    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Thin JSON/form REST adapter shared by the HTTP integrations.
///
/// Every request carries the client-wide timeout, so a slow third party can
/// delay a tool result but never hang it.
#[derive(Clone, Debug)]
pub struct RestClient {
    client: Client,
    base_url: Url,
    auth: Auth,
}

impl RestClient {
    /// # Errors
    /// Returns an error if the base URL is invalid or the client fails to build.
    #[allow(clippy::result_large_err)]
    pub fn new(base_url: &str, auth: Auth) -> Result<Self> {
        Self::new_with_timeouts(base_url, auth, DEFAULT_TIMEOUT, DEFAULT_POOL_IDLE_TIMEOUT)
    }

    /// # Errors
    /// Returns an error if the base URL is invalid or the client fails to build.
    #[allow(clippy::result_large_err)]
    pub fn new_with_timeouts(
        base_url: &str,
        auth: Auth,
        timeout: Duration,
        pool_idle_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(pool_idle_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            auth,
        })
    }

    /// Resolve `path` against the base URL. An empty path targets the base itself.
    ///
    /// # Errors
    /// Returns an error if the joined URL is invalid.
    #[allow(clippy::result_large_err)]
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        if path.is_empty() {
            return Ok(self.base_url.clone());
        }
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        Ok(base.join(path)?)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Auth::None => builder,
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
            Auth::Bearer(header) => builder.header(AUTHORIZATION, header),
        }
    }

    /// POST an urlencoded form and decode the JSON reply.
    ///
    /// # Errors
    /// Returns an error on transport failure, a non-success status, or an undecodable body.
    pub async fn post_form<F, R>(&self, path: &str, form: &F) -> Result<R>
    where
        F: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let res = self
            .authorize(self.client.post(url))
            .form(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    /// POST a JSON body, ignoring the reply body.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub async fn post_json<B>(&self, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(path)?;
        self.authorize(self.client.post(url))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
