//! Drives the chat flow end to end with the in-memory store, a scripted
//! hazard backend, a scripted advisor and a recording sink.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use landalert_bot::advisor::FALLBACK_RECOMMENDATION;
use landalert_bot::conversation::{ANALYZING, ASK_USAGE, NEED_LOCATION_FIRST, NO_COVERAGE, THANKS, UNRECOGNIZED};
use landalert_bot::store::NewSpatialQuery;
use landalert_bot::{
    Advisor, AdvisorError, AdvisoryContext, Analyzer, BotUser, Conversation, HazardBackend, Incoming,
    Keyboard, MemoryRecordStore, Platform, RecordStore, Reply, ReplySink, Result, TextFormat,
    TransportError,
};
use landalert_core::{Hazard, QueryPoint, RiskClass, RiskReport};

/// Fixed reports inside a box around Makurdi, nothing elsewhere.
struct Scripted;

#[async_trait]
impl HazardBackend for Scripted {
    async fn evaluate(&self, hazard: Hazard, point: QueryPoint) -> Result<Option<RiskReport>> {
        if !(7.0..8.0).contains(&point.lat) || !(8.0..9.0).contains(&point.lon) {
            return Ok(None);
        }
        let (class, label, value) = match hazard {
            Hazard::Flood => (4, "Substantial", 0.61),
            Hazard::Drought => (2, "Mild Drought", 0.45),
            Hazard::Heat => (3, "High (or Warm)", 35.2),
        };
        Ok(Some(RiskReport {
            hazard,
            class: RiskClass::new(class).unwrap(),
            label: label.into(),
            index_value: value,
        }))
    }
}

/// Echoes what it was asked about.
#[derive(Default)]
struct EchoAdvisor {
    seen: Mutex<Vec<AdvisoryContext>>,
}

#[async_trait]
impl Advisor for EchoAdvisor {
    async fn recommend(&self, ctx: &AdvisoryContext) -> std::result::Result<String, AdvisorError> {
        self.seen.lock().unwrap().push(ctx.clone());
        Ok(format!("  Proceed with caution for {}.  ", ctx.intent))
    }
}

struct DownAdvisor;

#[async_trait]
impl Advisor for DownAdvisor {
    async fn recommend(&self, _: &AdvisoryContext) -> std::result::Result<String, AdvisorError> {
        Err(AdvisorError::Network("connection refused".into()))
    }
}

#[derive(Default)]
struct RecordingSink {
    replies: Mutex<Vec<Reply>>,
}

impl RecordingSink {
    fn take(&self) -> Vec<Reply> {
        std::mem::take(&mut *self.replies.lock().unwrap())
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn send(&self, reply: Reply) -> std::result::Result<(), TransportError> {
        self.replies.lock().unwrap().push(reply);
        Ok(())
    }
}

fn user() -> BotUser {
    BotUser {
        user_id: "1001".into(),
        platform: Platform::Telegram,
        username: Some("amaka".into()),
        first_name: Some("Amaka".into()),
        last_name: None,
    }
}

fn setup(advisor: Arc<dyn Advisor>) -> (Conversation, Arc<MemoryRecordStore>) {
    let store = Arc::new(MemoryRecordStore::new());
    let analyzer = Analyzer::new(Arc::new(Scripted), Duration::from_secs(1));
    let conversation = Conversation::new(analyzer, advisor, Duration::from_secs(1), store.clone());
    (conversation, store)
}

const MAKURDI: Incoming = Incoming::Location {
    latitude: 7.7322,
    longitude: 8.5391,
};

#[tokio::test]
async fn start_registers_the_user_and_welcomes() {
    let (conv, store) = setup(Arc::new(EchoAdvisor::default()));
    let sink = RecordingSink::default();

    conv.handle(&user(), Incoming::Start, &sink).await;

    let replies = sink.take();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].format, TextFormat::Html);
    assert!(replies[0].text.contains("share your current location"));
    assert_eq!(store.user(Platform::Telegram, "1001").await.unwrap().username.as_deref(), Some("amaka"));
}

#[tokio::test]
async fn location_is_analyzed_and_persisted() {
    let (conv, store) = setup(Arc::new(EchoAdvisor::default()));
    let sink = RecordingSink::default();

    conv.handle(&user(), MAKURDI, &sink).await;

    let replies = sink.take();
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0].text, ANALYZING);
    assert_eq!(replies[1].text, THANKS);
    let report = &replies[2];
    assert!(report.text.contains("Level 4 of 5 - Substantial"));
    assert!(report.text.contains("Mild Drought"));
    assert!(report.text.contains("(35.2°C)"));
    assert_eq!(report.keyboard, Keyboard::Commands(vec!["/recommendation".into()]));

    let rows = store.queries().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].flood_risk_level, Some(4));
    assert_eq!(rows[0].drought.as_deref(), Some("Mild Drought"));
    assert_eq!(rows[0].lst_category.as_deref(), Some("High (or Warm)"));
    assert_eq!(rows[0].user_intent, "unspecified");
}

#[tokio::test]
async fn recommendation_round_trip() {
    let advisor = Arc::new(EchoAdvisor::default());
    let (conv, store) = setup(advisor.clone());
    let sink = RecordingSink::default();

    conv.handle(&user(), MAKURDI, &sink).await;
    conv.handle(&user(), Incoming::Recommendation, &sink).await;
    let replies = sink.take();
    let ask = replies.last().unwrap();
    assert_eq!(ask.text, ASK_USAGE);
    assert!(matches!(ask.keyboard, Keyboard::ForceReply { .. }));

    conv.handle(&user(), Incoming::Text("my usage: rice farming".into()), &sink)
        .await;
    let replies = sink.take();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].text, "Proceed with caution for rice farming.");
    assert_eq!(replies[0].keyboard, Keyboard::Remove);

    let ctx = advisor.seen.lock().unwrap()[0].clone();
    assert_eq!(ctx.user_name, "amaka");
    assert_eq!(ctx.flood, Some((4, "Substantial".to_string())));
    assert_eq!(ctx.lst_category.as_deref(), Some("High (or Warm)"));

    let row = store.latest_query("1001").await.unwrap().unwrap();
    assert_eq!(row.user_intent, "rice farming");
    assert_eq!(
        row.ai_recommendation.as_deref(),
        Some("Proceed with caution for rice farming.")
    );

    // The flag is one-shot.
    conv.handle(&user(), Incoming::Text("hello".into()), &sink).await;
    assert_eq!(sink.take()[0].text, UNRECOGNIZED);
}

#[tokio::test]
async fn corrupt_flood_level_never_reaches_the_advisor() {
    let advisor = Arc::new(EchoAdvisor::default());
    let (conv, store) = setup(advisor.clone());
    let sink = RecordingSink::default();
    store
        .insert_query(&NewSpatialQuery {
            user_id: "1001".into(),
            latitude: 7.7322,
            longitude: 8.5391,
            vhi: Some(0.45),
            lst_temp: Some(31.2),
            lst_category: Some("Mildly Elevated".into()),
            drought: Some("Mild Drought".into()),
            flood_risk_level: Some(9),
        })
        .await
        .unwrap();

    conv.handle(&user(), Incoming::Recommendation, &sink).await;
    conv.handle(&user(), Incoming::Text("My Usage: poultry".into()), &sink).await;

    let ctx = advisor.seen.lock().unwrap()[0].clone();
    assert_eq!(ctx.flood, None);
    assert_eq!(ctx.drought.as_deref(), Some("Mild Drought"));
}

#[tokio::test]
async fn advisor_failure_falls_back() {
    let (conv, store) = setup(Arc::new(DownAdvisor));
    let sink = RecordingSink::default();

    conv.handle(&user(), MAKURDI, &sink).await;
    conv.handle(&user(), Incoming::Recommendation, &sink).await;
    sink.take();
    conv.handle(&user(), Incoming::Text("warehouse".into()), &sink).await;

    let replies = sink.take();
    assert_eq!(replies[0].text, FALLBACK_RECOMMENDATION);
    let row = store.latest_query("1001").await.unwrap().unwrap();
    assert_eq!(row.user_intent, "warehouse");
}

#[tokio::test]
async fn usage_without_a_prior_location_asks_for_one() {
    let (conv, _) = setup(Arc::new(EchoAdvisor::default()));
    let sink = RecordingSink::default();

    conv.handle(&user(), Incoming::Recommendation, &sink).await;
    conv.handle(&user(), Incoming::Text("school".into()), &sink).await;
    assert_eq!(sink.take().last().unwrap().text, NEED_LOCATION_FIRST);
}

#[tokio::test]
async fn outside_coverage_reports_insufficient_data() {
    let (conv, store) = setup(Arc::new(EchoAdvisor::default()));
    let sink = RecordingSink::default();

    // Cotonou, Benin.
    conv.handle(&user(), Incoming::Location { latitude: 6.37, longitude: 2.39 }, &sink)
        .await;

    let replies = sink.take();
    assert_eq!(replies.last().unwrap().text, NO_COVERAGE);
    assert!(!replies.iter().any(|r| r.text.contains("Level")));
    assert_eq!(store.queries().await.len(), 1);
}

#[tokio::test]
async fn invalid_coordinates_are_rejected_before_analysis() {
    let (conv, store) = setup(Arc::new(EchoAdvisor::default()));
    let sink = RecordingSink::default();

    conv.handle(&user(), Incoming::Location { latitude: 123.0, longitude: 8.0 }, &sink)
        .await;

    let replies = sink.take();
    assert_eq!(replies.len(), 1);
    assert_ne!(replies[0].text, ANALYZING);
    assert!(store.queries().await.is_empty());
}

#[tokio::test]
async fn free_text_is_unrecognized() {
    let (conv, _) = setup(Arc::new(EchoAdvisor::default()));
    let sink = RecordingSink::default();

    conv.handle(&user(), Incoming::Text("what is this".into()), &sink).await;

    let replies = sink.take();
    assert_eq!(replies[0].text, UNRECOGNIZED);
    assert_eq!(replies[0].keyboard, Keyboard::Remove);
}
