use barista_rt::Error;
use barista_rt::integrations::{
    Notifier, SlackConfig, SlackNotifier, SmsGateway, Telephony, TransferNotice, TwilioClient,
    TwilioConfig, transfer_twiml,
};
use base64::Engine;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn twilio(server: &MockServer, from: Option<&str>, service: Option<&str>) -> TwilioClient {
    TwilioClient::new(&TwilioConfig {
        account_sid: "AC123".to_string(),
        auth_token: "secret".to_string(),
        from_number: from.map(str::to_string),
        messaging_service_sid: service.map(str::to_string),
        api_base: Some(server.uri()),
    })
    .unwrap()
}

fn basic_auth() -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode("AC123:secret");
    format!("Basic {encoded}")
}

#[tokio::test]
async fn sms_posts_form_with_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Accounts/AC123/Messages.json"))
        .and(header("authorization", basic_auth().as_str()))
        .and(body_string_contains("To=%2B15125550100"))
        .and(body_string_contains("From=%2B15125550000"))
        .and(body_string_contains("Body=Hello+there"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "sid": "SM123",
            "status": "queued",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = twilio(&server, Some("+15125550000"), None);
    let receipt = client.send_sms("512-555-0100", "Hello there").await.unwrap();
    assert_eq!(receipt.sid.as_deref(), Some("SM123"));
}

#[tokio::test]
async fn messaging_service_wins_over_from_number() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Accounts/AC123/Messages.json"))
        .and(body_string_contains("MessagingServiceSid=MG1"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "sid": "SM9" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = twilio(&server, Some("+15125550000"), Some("MG1"));
    client.send_sms("+15125550100", "Hi").await.unwrap();
}

#[tokio::test]
async fn sms_needs_a_sender_and_a_valid_number() {
    let server = MockServer::start().await;
    let client = twilio(&server, None, None);
    let err = client.send_sms("+15125550100", "Hi").await.unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg == "No SMS sender configured"));

    let client = twilio(&server, Some("+15125550000"), None);
    let err = client.send_sms("12", "Hi").await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid phone number");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn twilio_error_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Accounts/AC123/Messages.json"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": 21211,
            "message": "Invalid 'To' Phone Number",
        })))
        .mount(&server)
        .await;

    let client = twilio(&server, Some("+15125550000"), None);
    let err = client.send_sms("+15125550100", "Hi").await.unwrap_err();
    assert!(matches!(err, Error::Http(_)));
}

#[tokio::test]
async fn redirect_posts_twiml_to_the_live_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Accounts/AC123/Calls/CA42.json"))
        .and(body_string_contains("Twiml=%3C%3Fxml"))
        .and(body_string_contains("Dial"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "sid": "CA42" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = twilio(&server, None, None);
    let twiml = transfer_twiml("+15125550199", None, 30, None);
    client.redirect_call("CA42", &twiml).await.unwrap();
}

#[tokio::test]
async fn slack_transfer_notice_is_posted_to_the_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/T1/B1/X1"))
        .and(body_string_contains("+15125550100"))
        .and(body_string_contains("Mangy Dog Coffee Bot"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = SlackNotifier::new(&SlackConfig {
        webhook_url: Some(format!("{}/services/T1/B1/X1", server.uri())),
        ..SlackConfig::default()
    })
    .unwrap();
    assert!(notifier.is_configured());
    notifier
        .notify_transfer(&TransferNotice {
            caller_phone: Some("+15125550100".to_string()),
            caller_name: None,
            reason: Some("Wholesale pricing".to_string()),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn slack_failure_status_maps_to_integration_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let notifier = SlackNotifier::new(&SlackConfig {
        webhook_url: Some(server.uri()),
        ..SlackConfig::default()
    })
    .unwrap();
    let err = notifier
        .notify_transfer(&TransferNotice::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Integration(ref msg) if msg == "Slack returned 500"));
}
