use async_trait::async_trait;
use barista_rt::commerce::ProductCatalog;
use barista_rt::integrations::booking::DEFAULT_BOOKING_URL;
use barista_rt::integrations::{
    BookingService, LinkBooking, Notifier, SmsGateway, SmsReceipt, Telephony, TransferNotice,
};
use barista_rt::kb::{KbAnswer, KbSource, KnowledgeBase};
use barista_rt::store::{
    BusinessConfig, CallLog, CitationLog, IntentLog, MemoryStore, Order, OrderStatus, Store,
    TransferConfig,
};
use barista_rt::tools::args::{
    AnswerQuestionArgs, GetProductsArgs, LookupProductArgs, PlaceOrderArgs, SendTextArgs,
    SetLanguageArgs, TakeMessageArgs, TransferArgs,
};
use barista_rt::tools::{AboutInfo, ExecutorDeps, LowConfidenceAction, ToolContext, ToolExecutor};
use barista_rt::{Error, Result};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

struct FixedKb {
    score: f64,
}

#[async_trait]
impl KnowledgeBase for FixedKb {
    async fn search(&self, _question: &str, _language: &str, _top_k: usize) -> Result<KbAnswer> {
        Ok(KbAnswer::new(
            "House Blend is a medium roast with notes of chocolate.",
            vec![KbSource::new("House Blend", self.score)],
        ))
    }
}

#[derive(Default)]
struct RecordingSms {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

#[async_trait]
impl SmsGateway for RecordingSms {
    async fn send_sms(&self, to: &str, body: &str) -> Result<SmsReceipt> {
        if self.fail {
            return Err(Error::Integration("Twilio returned 400".to_string()));
        }
        self.sent.lock().push((to.to_string(), body.to_string()));
        Ok(SmsReceipt {
            sid: Some("SM1".to_string()),
        })
    }
}

#[derive(Default)]
struct RecordingTelephony {
    redirects: Mutex<Vec<(String, String)>>,
    fail: bool,
}

#[async_trait]
impl Telephony for RecordingTelephony {
    async fn redirect_call(&self, call_sid: &str, twiml: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Integration("Call is not in-progress".to_string()));
        }
        self.redirects
            .lock()
            .push((call_sid.to_string(), twiml.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<TransferNotice>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_transfer(&self, notice: &TransferNotice) -> Result<()> {
        self.notices.lock().push(notice.clone());
        Ok(())
    }
}

struct Fixture {
    exec: Arc<ToolExecutor>,
    store: Arc<MemoryStore>,
    sms: Arc<RecordingSms>,
    telephony: Arc<RecordingTelephony>,
    notifier: Arc<RecordingNotifier>,
}

struct Setup {
    score: f64,
    store: MemoryStore,
    sms: RecordingSms,
    telephony: RecordingTelephony,
    transfer_number: Option<String>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            score: 0.9,
            store: MemoryStore::new(),
            sms: RecordingSms::default(),
            telephony: RecordingTelephony::default(),
            transfer_number: None,
        }
    }
}

fn fixture(setup: Setup) -> Fixture {
    let store = Arc::new(setup.store);
    let sms = Arc::new(setup.sms);
    let telephony = Arc::new(setup.telephony);
    let notifier = Arc::new(RecordingNotifier::default());
    let booking: Arc<dyn BookingService> = Arc::new(LinkBooking::new(DEFAULT_BOOKING_URL).unwrap());
    let deps = ExecutorDeps {
        catalog: Arc::new(ProductCatalog::default_coffee()),
        kb: Arc::new(FixedKb { score: setup.score }),
        store: Arc::clone(&store) as Arc<dyn Store>,
        sms: Arc::clone(&sms) as Arc<dyn SmsGateway>,
        telephony: Arc::clone(&telephony) as Arc<dyn Telephony>,
        notifier: Arc::clone(&notifier) as Arc<dyn Notifier>,
        booking,
        about: AboutInfo::default(),
        transfer_number: setup.transfer_number,
    };
    Fixture {
        exec: Arc::new(ToolExecutor::new(deps)),
        store,
        sms,
        telephony,
        notifier,
    }
}

fn question(text: &str) -> AnswerQuestionArgs {
    AnswerQuestionArgs {
        question: text.to_string(),
        language: None,
    }
}

fn gated(action: LowConfidenceAction) -> MemoryStore {
    MemoryStore::new().with_business_config(BusinessConfig {
        kb_min_confidence: 0.55,
        low_confidence_action: action,
    })
}

async fn wait_until(mut ready: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !ready() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn confident_answer_returns_context_and_sources() {
    let f = fixture(Setup::default());
    let out = f
        .exec
        .answer_question(question("What does House Blend taste like?"), &ToolContext::default())
        .await
        .unwrap();

    assert_eq!(out["ok"], true);
    assert_eq!(out["confidenceOk"], true);
    assert_eq!(out["topConfidence"], 0.9);
    assert!(out["context"].as_str().unwrap().contains("chocolate"));
    assert_eq!(out["sources"][0]["title"], "House Blend");
    assert_eq!(f.store.citations().len(), 1);
}

#[tokio::test]
async fn low_confidence_follows_configured_action() {
    let cases = [
        (LowConfidenceAction::AskClarify, "CLARIFY"),
        (LowConfidenceAction::Transfer, "TRANSFER"),
        (LowConfidenceAction::Voicemail, "VOICEMAIL"),
    ];
    for (action, expected) in cases {
        let f = fixture(Setup {
            score: 0.3,
            store: gated(action),
            ..Setup::default()
        });
        for _ in 0..2 {
            let out = f
                .exec
                .answer_question(question("Do you sell decaf?"), &ToolContext::default())
                .await
                .unwrap();
            assert_eq!(out["ok"], false);
            assert_eq!(out["lowConfidence"], true);
            assert_eq!(out["action"], expected);
        }
        let flagged = f
            .store
            .intents()
            .iter()
            .filter(|entry| entry.intent == "lowConfidenceKB")
            .count();
        assert_eq!(flagged, 2);
    }
}

#[tokio::test]
async fn clarify_keeps_partial_context_for_the_model() {
    let f = fixture(Setup {
        score: 0.2,
        ..Setup::default()
    });
    let out = f
        .exec
        .answer_question(question("Is the roast oily?"), &ToolContext::default())
        .await
        .unwrap();
    assert_eq!(out["action"], "CLARIFY");
    assert!(out["partialContext"].as_str().unwrap().contains("medium roast"));
    assert_eq!(out["sources"][0]["score"], 0.2);
}

#[tokio::test]
async fn threshold_is_inclusive() {
    let f = fixture(Setup {
        score: 0.55,
        ..Setup::default()
    });
    let out = f
        .exec
        .answer_question(question("House Blend?"), &ToolContext::default())
        .await
        .unwrap();
    assert_eq!(out["confidenceOk"], true);
}

fn order_args(items: Value) -> PlaceOrderArgs {
    serde_json::from_value(json!({
        "customerPhone": "(512) 555-0100",
        "items": items,
    }))
    .unwrap()
}

#[tokio::test]
async fn order_is_priced_stored_and_confirmed() {
    let f = fixture(Setup::default());
    let out = f
        .exec
        .place_order(
            order_args(json!([{ "product": "House Blend", "quantity": 2, "size": "1lb" }])),
            &ToolContext::default(),
        )
        .await
        .unwrap();

    assert_eq!(out["success"], true);
    assert_eq!(out["subtotal"], 57.98);
    assert_eq!(out["tax"], 4.78);
    assert_eq!(out["shipping"], 0.0);
    assert_eq!(out["total"], 62.76);
    assert_eq!(out["items"][0]["grind"], "whole_bean");
    let number = out["orderNumber"].as_str().unwrap();
    assert!(number.starts_with("MDC-"));
    assert_eq!(f.store.order_count(), 1);

    let stored = f.exec.get_order(number).await.unwrap().unwrap();
    assert_eq!(stored.customer_phone, "+15125550100");
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.shipping_method, "standard");

    let sms = Arc::clone(&f.sms);
    wait_until(move || !sms.sent.lock().is_empty()).await;
    let (to, body) = f.sms.sent.lock()[0].clone();
    assert_eq!(to, "+15125550100");
    assert!(body.contains(number));
    assert!(body.contains("Total: $62.76"));
}

#[tokio::test]
async fn one_bad_item_rejects_the_whole_order() {
    let f = fixture(Setup::default());
    let out = f
        .exec
        .place_order(
            order_args(json!([
                { "product": "house-blend", "quantity": 1 },
                { "product": "Unicorn Roast", "quantity": 1 },
            ])),
            &ToolContext::default(),
        )
        .await
        .unwrap();
    assert_eq!(out, json!({ "success": false, "error": "Product not found: Unicorn Roast" }));
    assert_eq!(f.store.order_count(), 0);
    tokio::task::yield_now().await;
    assert!(f.sms.sent.lock().is_empty());
}

#[tokio::test]
async fn order_with_bad_phone_is_rejected() {
    let f = fixture(Setup::default());
    let args: PlaceOrderArgs = serde_json::from_value(json!({
        "customerPhone": "555",
        "items": [{ "product": "matcha", "quantity": 1 }],
    }))
    .unwrap();
    let out = f.exec.place_order(args, &ToolContext::default()).await.unwrap();
    assert_eq!(out["error"], "Invalid phone number");
    assert_eq!(f.store.order_count(), 0);
}

#[tokio::test]
async fn order_status_can_be_advanced() {
    let f = fixture(Setup::default());
    let out = f
        .exec
        .place_order(
            order_args(json!([{ "product": "earl grey", "quantity": 1 }])),
            &ToolContext::default(),
        )
        .await
        .unwrap();
    let number = out["orderNumber"].as_str().unwrap();

    let updated = f
        .exec
        .update_order_status(number, OrderStatus::Shipped)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, OrderStatus::Shipped);
    assert!(f
        .exec
        .update_order_status("MDC-NOPE", OrderStatus::Shipped)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn transfer_without_live_call_only_signals_intent() {
    let f = fixture(Setup::default());
    let args = TransferArgs {
        reason: Some("wholesale".to_string()),
        caller_phone: None,
        caller_name: Some("Sam".to_string()),
    };
    let out = f
        .exec
        .transfer_to_human(args, &ToolContext::default().caller_phone("+15125550100"))
        .await
        .unwrap();
    assert_eq!(out, json!({ "ok": true, "reason": "wholesale", "action": "TRANSFER" }));
    assert!(f.telephony.redirects.lock().is_empty());

    let notifier = Arc::clone(&f.notifier);
    wait_until(move || !notifier.notices.lock().is_empty()).await;
    let notice = f.notifier.notices.lock()[0].clone();
    assert_eq!(notice.caller_phone.as_deref(), Some("+15125550100"));
    assert_eq!(notice.caller_name.as_deref(), Some("Sam"));
}

#[tokio::test]
async fn transfer_redirects_the_call_with_dial_twiml() {
    let store = MemoryStore::new().with_transfer_config(TransferConfig {
        destination: Some("+15125550199".to_string()),
        ..TransferConfig::default()
    });
    store
        .upsert_call_log("CA1", Some("+15125550100"), None)
        .await
        .unwrap();
    let f = fixture(Setup {
        store,
        ..Setup::default()
    });

    let out = f
        .exec
        .transfer_to_human(TransferArgs::default(), &ToolContext::for_call("CA1"))
        .await
        .unwrap();
    assert_eq!(out["ok"], true);
    assert_eq!(out["action"], "TRANSFER");

    let (call_sid, twiml) = f.telephony.redirects.lock()[0].clone();
    assert_eq!(call_sid, "CA1");
    assert!(twiml.contains("<Dial timeout=\"30\">+15125550199</Dial>"));
    let log = f.store.call_log_by_sid("CA1").await.unwrap().unwrap();
    assert_eq!(log.outcome.as_deref(), Some("transferred"));
}

#[tokio::test]
async fn transfer_falls_back_to_configured_number() {
    let f = fixture(Setup {
        transfer_number: Some("+15125550142".to_string()),
        ..Setup::default()
    });
    let out = f
        .exec
        .transfer_to_human(TransferArgs::default(), &ToolContext::for_call("CA2"))
        .await
        .unwrap();
    assert_eq!(out["ok"], true);
    assert!(f.telephony.redirects.lock()[0].1.contains("+15125550142"));
}

#[tokio::test]
async fn transfer_failure_offers_voicemail() {
    let f = fixture(Setup {
        transfer_number: Some("+15125550142".to_string()),
        telephony: RecordingTelephony {
            fail: true,
            ..RecordingTelephony::default()
        },
        ..Setup::default()
    });
    let out = f
        .exec
        .transfer_to_human(TransferArgs::default(), &ToolContext::for_call("CA3"))
        .await
        .unwrap();
    assert_eq!(out["ok"], false);
    assert_eq!(out["action"], "VOICEMAIL");
    assert_eq!(out["error"], "Call is not in-progress");

    let none = fixture(Setup::default());
    let out = none
        .exec
        .transfer_to_human(TransferArgs::default(), &ToolContext::for_call("CA4"))
        .await
        .unwrap();
    assert_eq!(out["action"], "VOICEMAIL");
    assert_eq!(out["error"], "No transfer destination configured");
}

#[tokio::test]
async fn text_message_failure_is_reported_not_raised() {
    let f = fixture(Setup {
        sms: RecordingSms {
            fail: true,
            ..RecordingSms::default()
        },
        ..Setup::default()
    });
    let args = SendTextArgs {
        to: "+15125550100".to_string(),
        message: "Our website is mangydogcoffee.com".to_string(),
    };
    let out = f.exec.send_text_message(args, &ToolContext::default()).await.unwrap();
    assert_eq!(out, json!({ "ok": false, "error": "Twilio returned 400" }));
}

#[tokio::test]
async fn take_message_returns_ticket_and_captured_fields() {
    let f = fixture(Setup::default());
    let args = TakeMessageArgs {
        subject: Some("Wholesale".to_string()),
        details: None,
        contact: Some("+15125550100".to_string()),
    };
    let out = f.exec.take_message(args, &ToolContext::default()).await.unwrap();
    let ticket = out["ticketId"].as_str().unwrap();
    assert!(ticket.starts_with("MSG-"));
    assert_eq!(ticket.len(), 10);
    assert_eq!(
        out["captured"],
        json!({ "subject": "Wholesale", "contact": "+15125550100" })
    );
}

#[tokio::test]
async fn policy_defaults_when_nothing_is_stored() {
    let f = fixture(Setup::default());
    let out = f.exec.get_policy().await.unwrap();
    assert_eq!(
        out,
        json!({ "kbMinConfidence": 0.55, "lowConfidenceAction": "ask_clarify" })
    );

    f.store.set_business_config(BusinessConfig {
        kb_min_confidence: 0.7,
        low_confidence_action: LowConfidenceAction::Voicemail,
    });
    let out = f.exec.get_policy().await.unwrap();
    assert_eq!(out["lowConfidenceAction"], "voicemail");
}

#[tokio::test]
async fn product_listing_and_lookup() {
    let f = fixture(Setup::default());
    let ctx = ToolContext::default();

    let teas = f
        .exec
        .get_products(GetProductsArgs { category: Some("tea".to_string()) }, &ctx)
        .await
        .unwrap();
    assert_eq!(teas["products"].as_array().unwrap().len(), 6);

    let none = f
        .exec
        .get_products(GetProductsArgs { category: Some("merch".to_string()) }, &ctx)
        .await
        .unwrap();
    assert_eq!(none["products"], json!([]));

    let found = f
        .exec
        .lookup_product(LookupProductArgs { product_name: "max caf".to_string() }, &ctx)
        .await
        .unwrap();
    assert_eq!(found["product"]["key"], "max-caf");

    let missing = f
        .exec
        .lookup_product(LookupProductArgs { product_name: "decaf".to_string() }, &ctx)
        .await
        .unwrap();
    assert_eq!(missing, json!({ "ok": false, "error": "Product not found: decaf" }));
}

#[tokio::test]
async fn set_language_normalizes_and_logs() {
    let f = fixture(Setup::default());
    let out = f
        .exec
        .set_language(SetLanguageArgs { lang: Some(" ES ".to_string()) }, &ToolContext::for_call("CA5"))
        .await
        .unwrap();
    assert_eq!(out, json!({ "ok": true, "lang": "es" }));
    let logged = f.store.languages();
    assert_eq!(logged[0].language, "es");
    assert_eq!(logged[0].call_sid.as_deref(), Some("CA5"));
}

#[tokio::test]
async fn catalogue_is_reachable_through_the_router() {
    let f = fixture(Setup::default());
    let router = Arc::clone(&f.exec).router();
    let names: Vec<_> = router.definitions().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "getAboutInfo",
            "transferToHuman",
            "bookAppointment",
            "takeMessage",
            "answerQuestion",
            "sendTextMessage",
            "placeOrder",
            "getProducts",
            "lookupProduct",
            "setLanguage",
            "getPolicy",
        ]
    );

    let about = router.dispatch("getAboutInfo", Value::Null).await;
    assert_eq!(about["beneficiary"], "AKT Foundation");

    let bad = router.dispatch("answerQuestion", json!({})).await;
    assert!(bad["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid arguments for answerQuestion"));

    let booked = router
        .dispatch("bookAppointment", json!({ "purpose": "tasting" }))
        .await;
    assert_eq!(booked["ok"], true);
    assert_eq!(booked["mode"], "link");
    assert!(booked["message"]
        .as_str()
        .unwrap()
        .contains("Visit https://mangydogcoffee.com/book"));
}

/// Reads go to a `MemoryStore`; every write is rejected.
#[derive(Default)]
struct ReadOnlyStore {
    inner: MemoryStore,
}

fn read_only() -> Error {
    Error::Store("database is read-only".to_string())
}

#[async_trait]
impl Store for ReadOnlyStore {
    async fn business_config(&self) -> Result<Option<BusinessConfig>> {
        self.inner.business_config().await
    }

    async fn transfer_config(&self) -> Result<Option<TransferConfig>> {
        self.inner.transfer_config().await
    }

    async fn call_log_by_sid(&self, call_sid: &str) -> Result<Option<CallLog>> {
        self.inner.call_log_by_sid(call_sid).await
    }

    async fn upsert_call_log(
        &self,
        _call_sid: &str,
        _from: Option<&str>,
        _to: Option<&str>,
    ) -> Result<CallLog> {
        Err(read_only())
    }

    async fn set_call_outcome(&self, _call_sid: &str, _outcome: &str) -> Result<()> {
        Err(read_only())
    }

    async fn create_order(&self, _order: Order) -> Result<Order> {
        Err(read_only())
    }

    async fn order_by_number(&self, order_number: &str) -> Result<Option<Order>> {
        self.inner.order_by_number(order_number).await
    }

    async fn update_order_status(
        &self,
        _order_number: &str,
        _status: OrderStatus,
    ) -> Result<Option<Order>> {
        Err(read_only())
    }

    async fn log_intent(&self, _entry: IntentLog) -> Result<()> {
        Err(read_only())
    }

    async fn log_citation(&self, _entry: CitationLog) -> Result<()> {
        Err(read_only())
    }

    async fn log_language(&self, _call_sid: Option<&str>, _language: &str) -> Result<()> {
        Err(read_only())
    }
}

fn executor_over(store: Arc<ReadOnlyStore>, score: f64, sms: Arc<RecordingSms>) -> Arc<ToolExecutor> {
    let deps = ExecutorDeps {
        catalog: Arc::new(ProductCatalog::default_coffee()),
        kb: Arc::new(FixedKb { score }),
        store,
        sms,
        telephony: Arc::new(RecordingTelephony::default()),
        notifier: Arc::new(RecordingNotifier::default()),
        booking: Arc::new(LinkBooking::new(DEFAULT_BOOKING_URL).unwrap()),
        about: AboutInfo::default(),
        transfer_number: None,
    };
    Arc::new(ToolExecutor::new(deps))
}

#[tokio::test]
async fn order_storage_failure_is_generic_and_sends_nothing() {
    let store = Arc::new(ReadOnlyStore::default());
    let sms = Arc::new(RecordingSms::default());
    let exec = executor_over(Arc::clone(&store), 0.9, Arc::clone(&sms));

    let out = exec
        .place_order(
            order_args(json!([{ "product": "House Blend", "quantity": 2, "size": "1lb" }])),
            &ToolContext::default(),
        )
        .await
        .unwrap();

    assert_eq!(out, json!({ "success": false, "error": "Failed to create order" }));
    assert_eq!(store.inner.order_count(), 0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(sms.sent.lock().is_empty());
}

#[tokio::test]
async fn audit_write_failures_do_not_change_answers() {
    let ctx = ToolContext::for_call("CA7");

    let confident = executor_over(
        Arc::new(ReadOnlyStore::default()),
        0.9,
        Arc::new(RecordingSms::default()),
    );
    let out = confident
        .answer_question(question("What does House Blend taste like?"), &ctx)
        .await
        .unwrap();
    assert_eq!(out["ok"], true);
    assert_eq!(out["confidenceOk"], true);
    assert_eq!(out["sources"][0]["title"], "House Blend");

    let unsure = executor_over(
        Arc::new(ReadOnlyStore {
            inner: gated(LowConfidenceAction::Voicemail),
        }),
        0.3,
        Arc::new(RecordingSms::default()),
    );
    let out = unsure
        .answer_question(question("Do you sell decaf?"), &ctx)
        .await
        .unwrap();
    assert_eq!(out["lowConfidence"], true);
    assert_eq!(out["action"], "VOICEMAIL");

    let lang = unsure
        .set_language(SetLanguageArgs { lang: Some("ES".to_string()) }, &ctx)
        .await
        .unwrap();
    assert_eq!(lang, json!({ "ok": true, "lang": "es" }));
}
