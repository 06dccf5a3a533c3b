use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::args::{
    AnswerQuestionArgs, BookAppointmentArgs, GetProductsArgs, LookupProductArgs, NoArgs,
    PlaceOrderArgs, SendTextArgs, SetLanguageArgs, TakeMessageArgs, TransferArgs,
};
use super::policy::{GateOutcome, gate};
use super::router::{ToolCallRouter, ToolContext};
use crate::Result;
use crate::commerce::{Category, ProductCatalog, Quote, order_number, price_order, random_base36};
use crate::integrations::{
    BookingRequest, BookingService, Notifier, SmsGateway, Telephony, TransferNotice,
    transfer_twiml,
};
use crate::kb::{KbAnswer, KnowledgeBase};
use crate::store::{
    BusinessConfig, CitationLog, IntentLog, Order, OrderItem, OrderStatus, Store, TransferConfig,
};

pub const KB_TOP_K: usize = 5;
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_APPOINTMENT_MINS: u32 = 30;

const TRANSFER_MESSAGE: &str = "I'm not confident I have the right information for that question. \
Let me transfer you to someone who can help better.";
const VOICEMAIL_MESSAGE: &str = "I'm not sure I have the right answer for that. \
Would you like to leave a message and we'll get back to you with the correct information?";
const CLARIFY_MESSAGE: &str = "I'm not entirely sure about that. Could you rephrase your question \
or ask about something more specific like our coffee products, brewing recommendations, \
or our charitable mission?";
const TRANSFER_APOLOGY: &str = "I'm sorry, I wasn't able to connect you to someone right now. \
Would you like to leave a message so we can call you back?";

const DESC_ABOUT: &str = "Get information about Mangy Dog Coffee and its charitable mission supporting the AKT Foundation";
const DESC_TRANSFER: &str = "Transfer the caller to a human agent";
const DESC_BOOK: &str = "Book an appointment or send a booking link. Use when caller wants to schedule a meeting or callback.";
const DESC_MESSAGE: &str = "Take a voicemail message from the caller";
const DESC_ANSWER: &str = "REQUIRED: Look up product information from the knowledge base. \
You MUST call this tool BEFORE answering ANY question about products, pricing, coffee, tea, pods, \
roasts, tasting notes, grinds, or availability. Never guess or assume product information - always use this tool first.";
const DESC_SMS: &str = "Send an SMS text message to a phone number. Use this when the caller requests \
information be texted to them, or to send links that are hard to communicate verbally.";
const DESC_ORDER: &str = "Place a phone order for coffee, tea, pods or sample packs. \
Confirm every item, size and grind with the caller and collect their phone number first.";
const DESC_PRODUCTS: &str = "List products with their sizes and prices, optionally filtered by category";
const DESC_LOOKUP: &str = "Look up a single product by name to get its sizes and prices";
const DESC_LANGUAGE: &str = "Set the conversation language when the caller switches languages";
const DESC_POLICY: &str = "Get the current knowledge-base confidence policy";

/// Organization facts read back by `getAboutInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AboutInfo {
    pub organization: String,
    pub beneficiary: String,
    pub mission: String,
    pub website: String,
}

impl Default for AboutInfo {
    fn default() -> Self {
        Self {
            organization: "Mangy Dog Coffee".to_string(),
            beneficiary: "AKT Foundation".to_string(),
            mission: "Mangy Dog Coffee proudly donates 10% of all sales to the AKT Foundation, \
a 501(c)(3) nonprofit dedicated to providing essential household necessities to families in \
extreme poverty and those impacted by domestic violence."
                .to_string(),
            website: "mangydogcoffee.com".to_string(),
        }
    }
}

/// Everything the tools talk to.
#[derive(Clone)]
pub struct ExecutorDeps {
    pub catalog: Arc<ProductCatalog>,
    pub kb: Arc<dyn KnowledgeBase>,
    pub store: Arc<dyn Store>,
    pub sms: Arc<dyn SmsGateway>,
    pub telephony: Arc<dyn Telephony>,
    pub notifier: Arc<dyn Notifier>,
    pub booking: Arc<dyn BookingService>,
    pub about: AboutInfo,
    /// Used when no transfer destination is stored.
    pub transfer_number: Option<String>,
}

/// Business operations behind the tool catalogue.
///
/// Each operation returns a JSON result for the model. Business and delegate
/// failures come back as `ok: false` (or `success: false` for orders) values;
/// only argument decoding is left to the router.
pub struct ToolExecutor {
    deps: ExecutorDeps,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("products", &self.deps.catalog.all().len())
            .field("about", &self.deps.about)
            .finish_non_exhaustive()
    }
}

fn normalize_language(raw: Option<&str>) -> String {
    let lang: String = raw
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(DEFAULT_LANGUAGE)
        .chars()
        .take(5)
        .collect();
    lang.to_lowercase()
}

/// Run a side effect in the background; its failure is logged and nothing else.
fn spawn_side_effect<F>(what: &'static str, fut: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = fut.await {
            error!(error = %err, "{what} failed");
        }
    });
}

fn order_confirmation_text(order: &Order) -> String {
    let lines: Vec<String> = order
        .items
        .iter()
        .map(|item| format!("{} x {} ({})", item.quantity, item.product_name, item.size))
        .collect();
    format!(
        "Thanks for your Mangy Dog Coffee order {}!\n{}\nTotal: {}\nWe'll text you when it ships.",
        order.order_number,
        lines.join("\n"),
        order.total
    )
}

impl ToolExecutor {
    #[must_use]
    pub const fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }

    #[must_use]
    pub fn catalog(&self) -> &ProductCatalog {
        &self.deps.catalog
    }

    /// The full tool catalogue bound to this executor.
    #[must_use]
    pub fn router(self: Arc<Self>) -> ToolCallRouter {
        let mut router = ToolCallRouter::new();

        let exec = Arc::clone(&self);
        router.tool_with_description("getAboutInfo", DESC_ABOUT, move |_: NoArgs, ctx| {
            let exec = Arc::clone(&exec);
            async move { exec.get_about_info(&ctx).await }
        });
        let exec = Arc::clone(&self);
        router.tool_with_description("transferToHuman", DESC_TRANSFER, move |args: TransferArgs, ctx| {
            let exec = Arc::clone(&exec);
            async move { exec.transfer_to_human(args, &ctx).await }
        });
        let exec = Arc::clone(&self);
        router.tool_with_description("bookAppointment", DESC_BOOK, move |args: BookAppointmentArgs, ctx| {
            let exec = Arc::clone(&exec);
            async move { exec.book_appointment(args, &ctx).await }
        });
        let exec = Arc::clone(&self);
        router.tool_with_description("takeMessage", DESC_MESSAGE, move |args: TakeMessageArgs, ctx| {
            let exec = Arc::clone(&exec);
            async move { exec.take_message(args, &ctx).await }
        });
        let exec = Arc::clone(&self);
        router.tool_with_description("answerQuestion", DESC_ANSWER, move |args: AnswerQuestionArgs, ctx| {
            let exec = Arc::clone(&exec);
            async move { exec.answer_question(args, &ctx).await }
        });
        let exec = Arc::clone(&self);
        router.tool_with_description("sendTextMessage", DESC_SMS, move |args: SendTextArgs, ctx| {
            let exec = Arc::clone(&exec);
            async move { exec.send_text_message(args, &ctx).await }
        });
        let exec = Arc::clone(&self);
        router.tool_with_description("placeOrder", DESC_ORDER, move |args: PlaceOrderArgs, ctx| {
            let exec = Arc::clone(&exec);
            async move { exec.place_order(args, &ctx).await }
        });
        let exec = Arc::clone(&self);
        router.tool_with_description("getProducts", DESC_PRODUCTS, move |args: GetProductsArgs, ctx| {
            let exec = Arc::clone(&exec);
            async move { exec.get_products(args, &ctx).await }
        });
        let exec = Arc::clone(&self);
        router.tool_with_description("lookupProduct", DESC_LOOKUP, move |args: LookupProductArgs, ctx| {
            let exec = Arc::clone(&exec);
            async move { exec.lookup_product(args, &ctx).await }
        });
        let exec = Arc::clone(&self);
        router.tool_with_description("setLanguage", DESC_LANGUAGE, move |args: SetLanguageArgs, ctx| {
            let exec = Arc::clone(&exec);
            async move { exec.set_language(args, &ctx).await }
        });
        router.tool_with_description("getPolicy", DESC_POLICY, move |_: NoArgs, _| {
            let exec = Arc::clone(&self);
            async move { exec.get_policy().await }
        });

        router
    }

    async fn call_log_id(&self, ctx: &ToolContext) -> Option<u64> {
        let call_sid = ctx.call_sid.as_deref()?;
        match self.deps.store.call_log_by_sid(call_sid).await {
            Ok(log) => log.map(|log| log.id),
            Err(err) => {
                warn!(call_sid = %call_sid, error = %err, "Call log lookup failed");
                None
            }
        }
    }

    async fn log_intent(&self, ctx: &ToolContext, intent: &str, payload: Value) {
        let entry = IntentLog::new(self.call_log_id(ctx).await, intent, payload);
        if let Err(err) = self.deps.store.log_intent(entry).await {
            warn!(intent = %intent, error = %err, "Intent log write failed");
        }
    }

    async fn business_config(&self) -> BusinessConfig {
        match self.deps.store.business_config().await {
            Ok(config) => config.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "Business config unavailable, using defaults");
                BusinessConfig::default()
            }
        }
    }

    async fn transfer_config(&self) -> TransferConfig {
        match self.deps.store.transfer_config().await {
            Ok(config) => config.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "Transfer config unavailable, using defaults");
                TransferConfig::default()
            }
        }
    }

    /// # Errors
    /// Never fails; the signature matches the other tools.
    pub async fn get_policy(&self) -> Result<Value> {
        let config = self.business_config().await;
        Ok(json!({
            "kbMinConfidence": config.kb_min_confidence,
            "lowConfidenceAction": config.low_confidence_action,
        }))
    }

    /// # Errors
    /// Never fails; audit write failures are logged.
    pub async fn set_language(&self, args: SetLanguageArgs, ctx: &ToolContext) -> Result<Value> {
        let lang = normalize_language(args.lang.as_deref());
        if let Err(err) = self.deps.store.log_language(ctx.call_sid.as_deref(), &lang).await {
            warn!(error = %err, "Language log write failed");
        }
        self.log_intent(ctx, "setLanguage", json!({ "lang": lang })).await;
        Ok(json!({ "ok": true, "lang": lang }))
    }

    /// # Errors
    /// Never fails.
    pub async fn get_about_info(&self, ctx: &ToolContext) -> Result<Value> {
        self.log_intent(ctx, "getAboutInfo", json!({})).await;
        let about = &self.deps.about;
        Ok(json!({
            "ok": true,
            "organization": about.organization,
            "beneficiary": about.beneficiary,
            "mission": about.mission,
            "website": about.website,
        }))
    }

    /// Redirect the live call to a person, with voicemail if nobody picks up.
    ///
    /// # Errors
    /// Never fails; telephony failures return a voicemail fallback.
    pub async fn transfer_to_human(&self, args: TransferArgs, ctx: &ToolContext) -> Result<Value> {
        self.log_intent(ctx, "transferToHuman", serde_json::to_value(&args)?)
            .await;

        let notice = TransferNotice {
            caller_phone: args.caller_phone.clone().or_else(|| ctx.caller_phone.clone()),
            caller_name: args.caller_name.clone(),
            reason: args.reason.clone(),
        };
        let notifier = Arc::clone(&self.deps.notifier);
        spawn_side_effect("Transfer notification", async move {
            notifier.notify_transfer(&notice).await
        });

        let Some(call_sid) = ctx.call_sid.as_deref() else {
            return Ok(json!({
                "ok": true,
                "reason": args.reason.as_deref().unwrap_or("unspecified"),
                "action": "TRANSFER",
            }));
        };

        let config = self.transfer_config().await;
        let destination = config
            .destination
            .clone()
            .or_else(|| self.deps.transfer_number.clone())
            .filter(|number| !number.trim().is_empty());
        let Some(destination) = destination else {
            warn!(call_sid = %call_sid, "No transfer destination configured");
            return Ok(json!({
                "ok": false,
                "action": "VOICEMAIL",
                "error": "No transfer destination configured",
                "message": TRANSFER_APOLOGY,
            }));
        };

        let twiml = transfer_twiml(
            &destination,
            config.hold_message.as_deref(),
            config.wait_seconds,
            config.voicemail_greeting.as_deref(),
        );
        if let Err(err) = self.deps.telephony.redirect_call(call_sid, &twiml).await {
            error!(call_sid = %call_sid, error = %err, "Call transfer failed");
            return Ok(json!({
                "ok": false,
                "action": "VOICEMAIL",
                "error": err.to_string(),
                "message": TRANSFER_APOLOGY,
            }));
        }
        if let Err(err) = self.deps.store.set_call_outcome(call_sid, "transferred").await {
            warn!(call_sid = %call_sid, error = %err, "Call outcome write failed");
        }
        info!(call_sid = %call_sid, "Call transferred");

        Ok(json!({
            "ok": true,
            "action": "TRANSFER",
            "reason": args.reason.as_deref().unwrap_or("unspecified"),
            "message": config
                .hold_message
                .as_deref()
                .unwrap_or(crate::integrations::twilio::DEFAULT_HOLD_MESSAGE),
        }))
    }

    /// # Errors
    /// Never fails; booking failures come back as `ok: false`.
    pub async fn book_appointment(
        &self,
        args: BookAppointmentArgs,
        ctx: &ToolContext,
    ) -> Result<Value> {
        self.log_intent(ctx, "bookAppointment", serde_json::to_value(&args)?)
            .await;

        let request = BookingRequest {
            date_time: args.date_time,
            duration_mins: args.duration_mins.unwrap_or(DEFAULT_APPOINTMENT_MINS),
            purpose: args.purpose,
            contact: args.contact.clone(),
            email: args.email,
        };
        let outcome = match self.deps.booking.book(&request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "Booking failed");
                return Ok(json!({ "ok": false, "error": err.to_string() }));
            }
        };

        let contact = args.contact.filter(|c| !c.trim().is_empty());
        let message = match (outcome.booked, contact.is_some()) {
            (true, true) => {
                "Great! I've booked your appointment. I've sent you a confirmation text with the details."
                    .to_string()
            }
            (true, false) => format!(
                "Great! I've booked your appointment. You can view it at {}",
                outcome.link
            ),
            (false, true) => {
                "I've sent you a link to book your appointment. Check your text messages!".to_string()
            }
            (false, false) => format!(
                "I've sent you a link to book your appointment. Visit {} to complete booking.",
                outcome.link
            ),
        };

        if let Some(contact) = contact {
            let body = if outcome.booked {
                format!("Your Mangy Dog Coffee appointment is confirmed: {}", outcome.link)
            } else {
                format!("Book your Mangy Dog Coffee appointment here: {}", outcome.link)
            };
            let sms = Arc::clone(&self.deps.sms);
            spawn_side_effect("Booking text", async move {
                sms.send_sms(&contact, &body).await.map(|_| ())
            });
        }

        Ok(json!({
            "ok": true,
            "message": message,
            "mode": outcome.mode,
            "link": outcome.link,
        }))
    }

    /// # Errors
    /// Fails only if the captured arguments cannot be serialized.
    pub async fn take_message(&self, args: TakeMessageArgs, ctx: &ToolContext) -> Result<Value> {
        let captured = serde_json::to_value(&args)?;
        self.log_intent(ctx, "takeMessage", captured.clone()).await;
        Ok(json!({
            "ok": true,
            "ticketId": format!("MSG-{}", random_base36(6)),
            "captured": captured,
        }))
    }

    /// Knowledge lookup with confidence gating.
    ///
    /// # Errors
    /// Never fails; a knowledge-base error counts as an empty answer.
    pub async fn answer_question(
        &self,
        args: AnswerQuestionArgs,
        ctx: &ToolContext,
    ) -> Result<Value> {
        self.log_intent(ctx, "answerQuestion", json!({ "question": args.question }))
            .await;

        let lang = normalize_language(args.language.as_deref());
        let answer = match self.deps.kb.search(&args.question, &lang, KB_TOP_K).await {
            Ok(answer) => answer,
            Err(err) => {
                warn!(error = %err, "Knowledge base search failed");
                KbAnswer::default()
            }
        };
        let config = self.business_config().await;

        let citation = CitationLog {
            call_log_id: self.call_log_id(ctx).await,
            question: args.question.clone(),
            language: lang,
            sources: answer.sources.clone(),
            created_at: Utc::now(),
        };
        if let Err(err) = self.deps.store.log_citation(citation).await {
            warn!(error = %err, "Citation log write failed");
        }

        let top = answer.top_confidence();
        let outcome = gate(top, config.kb_min_confidence, config.low_confidence_action);
        if outcome != GateOutcome::Answered {
            self.log_intent(
                ctx,
                "lowConfidenceKB",
                json!({
                    "question": args.question,
                    "confidence": top,
                    "action": config.low_confidence_action,
                }),
            )
            .await;
        }

        Ok(match outcome {
            GateOutcome::Answered => json!({
                "ok": true,
                "confidenceOk": true,
                "topConfidence": top,
                "context": answer.context,
                "sources": answer.sources,
            }),
            GateOutcome::Transfer => json!({
                "ok": false,
                "lowConfidence": true,
                "action": outcome.action(),
                "message": TRANSFER_MESSAGE,
            }),
            GateOutcome::Voicemail => json!({
                "ok": false,
                "lowConfidence": true,
                "action": outcome.action(),
                "message": VOICEMAIL_MESSAGE,
            }),
            GateOutcome::Clarify => json!({
                "ok": false,
                "lowConfidence": true,
                "action": outcome.action(),
                "message": CLARIFY_MESSAGE,
                "partialContext": answer.context,
                "sources": answer.sources,
            }),
        })
    }

    /// # Errors
    /// Never fails; gateway failures come back as `ok: false`.
    pub async fn send_text_message(&self, args: SendTextArgs, ctx: &ToolContext) -> Result<Value> {
        self.log_intent(ctx, "sendTextMessage", json!({ "to": args.to }))
            .await;

        match self.deps.sms.send_sms(&args.to, &args.message).await {
            Ok(_) => Ok(json!({
                "ok": true,
                "message": format!("I've sent a text message to {}.", args.to),
            })),
            Err(err) => {
                warn!(error = %err, "Text message failed");
                let mut error = err.to_string();
                if error.is_empty() {
                    error = "Failed to send SMS".to_string();
                }
                Ok(json!({ "ok": false, "error": error }))
            }
        }
    }

    /// Price, persist and confirm an order. Nothing is stored unless every item resolves.
    ///
    /// # Errors
    /// Never fails; validation and storage failures come back as `success: false`.
    pub async fn place_order(&self, args: PlaceOrderArgs, ctx: &ToolContext) -> Result<Value> {
        self.log_intent(
            ctx,
            "placeOrder",
            json!({ "customerPhone": args.customer_phone, "items": args.items.len() }),
        )
        .await;

        let quote = match price_order(&self.deps.catalog, &args.customer_phone, &args.items) {
            Ok(quote) => quote,
            Err(err) => {
                info!(error = %err, "Order rejected");
                return Ok(json!({ "success": false, "error": err.to_string() }));
            }
        };

        let order = self.build_order(quote, args.shipping_method, args.notes, ctx).await;
        let order = match self.deps.store.create_order(order).await {
            Ok(order) => order,
            Err(err) => {
                error!(error = %err, "Failed to create order");
                return Ok(json!({ "success": false, "error": "Failed to create order" }));
            }
        };
        info!(order_number = %order.order_number, total = %order.total, "Order created");

        let sms = Arc::clone(&self.deps.sms);
        let phone = order.customer_phone.clone();
        let body = order_confirmation_text(&order);
        spawn_side_effect("Order confirmation text", async move {
            sms.send_sms(&phone, &body).await.map(|_| ())
        });

        Ok(json!({
            "success": true,
            "orderNumber": order.order_number,
            "subtotal": order.subtotal,
            "tax": order.tax,
            "shipping": order.shipping,
            "total": order.total,
            "items": order.items,
        }))
    }

    async fn build_order(
        &self,
        quote: Quote,
        shipping_method: Option<String>,
        notes: Option<String>,
        ctx: &ToolContext,
    ) -> Order {
        Order {
            id: 0,
            order_number: order_number(),
            call_log_id: self.call_log_id(ctx).await,
            customer_phone: quote.customer_phone,
            items: quote.lines.into_iter().map(OrderItem::from).collect(),
            subtotal: quote.subtotal,
            tax: quote.tax,
            shipping: quote.shipping,
            total: quote.total,
            status: OrderStatus::Pending,
            payment_status: "pending".to_string(),
            payment_method: "phone".to_string(),
            shipping_method: shipping_method
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "standard".to_string()),
            notes,
            created_at: Utc::now(),
        }
    }

    /// # Errors
    /// Never fails; an unknown category yields an empty list.
    pub async fn get_products(&self, args: GetProductsArgs, ctx: &ToolContext) -> Result<Value> {
        self.log_intent(ctx, "getProducts", json!({ "category": args.category }))
            .await;

        let catalog = &self.deps.catalog;
        let products: Vec<_> = match args.category.as_deref().filter(|c| !c.trim().is_empty()) {
            None => catalog.all().iter().collect(),
            Some(raw) => Category::parse(raw)
                .map(|category| catalog.by_category(category).collect())
                .unwrap_or_default(),
        };
        Ok(json!({ "ok": true, "products": products }))
    }

    /// # Errors
    /// Never fails.
    pub async fn lookup_product(&self, args: LookupProductArgs, ctx: &ToolContext) -> Result<Value> {
        self.log_intent(ctx, "lookupProduct", json!({ "productName": args.product_name }))
            .await;

        Ok(match self.deps.catalog.resolve(&args.product_name) {
            Some(product) => json!({ "ok": true, "product": product }),
            None => json!({
                "ok": false,
                "error": format!("Product not found: {}", args.product_name),
            }),
        })
    }

    /// # Errors
    /// Returns the store's error.
    pub async fn get_order(&self, order_number: &str) -> Result<Option<Order>> {
        self.deps.store.order_by_number(order_number).await
    }

    /// # Errors
    /// Returns the store's error.
    pub async fn update_order_status(
        &self,
        order_number: &str,
        status: OrderStatus,
    ) -> Result<Option<Order>> {
        let updated = self.deps.store.update_order_status(order_number, status).await?;
        if updated.is_some() {
            info!(order_number = %order_number, status = ?status, "Order status updated");
        }
        Ok(updated)
    }
}
