use async_trait::async_trait;
use url::Url;

use super::{BookingOutcome, BookingRequest, BookingService};
use crate::Result;

pub const DEFAULT_BOOKING_URL: &str = "https://mangydogcoffee.com/book";

/// Booking by self-service link: nothing is reserved, the caller finishes online.
#[derive(Debug, Clone)]
pub struct LinkBooking {
    base: Url,
}

impl LinkBooking {
    /// # Errors
    /// Returns an error if `base_url` is not a valid URL.
    #[allow(clippy::result_large_err)]
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base: Url::parse(base_url)?,
        })
    }

    #[must_use]
    pub fn link_for(&self, request: &BookingRequest) -> Url {
        let mut url = self.base.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(date) = request.date_time.as_deref() {
                query.append_pair("date", date);
            }
            query.append_pair("duration", &request.duration_mins.to_string());
            if let Some(purpose) = request.purpose.as_deref() {
                query.append_pair("purpose", purpose);
            }
        }
        url
    }
}

#[async_trait]
impl BookingService for LinkBooking {
    async fn book(&self, request: &BookingRequest) -> Result<BookingOutcome> {
        Ok(BookingOutcome {
            booked: false,
            mode: "link".to_string(),
            link: self.link_for(request).to_string(),
        })
    }
}
