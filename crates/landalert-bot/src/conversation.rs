//! Chat conversation flow shared by the Telegram and WhatsApp transports.
//!
//! ```text
//!   /start          → upsert user, welcome
//!   location        → "analyzing", analyze, persist, report + /recommendation keyboard
//!   /recommendation → ask for intended usage, set awaiting-usage
//!   text (awaiting) → advisor on the latest record, persist, reply
//!   text (other)    → "unrecognized"
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use landalert_core::{flood_label, QueryPoint, RiskClass, RiskReport};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::advisor::{recommend_or_fallback, Advisor, AdvisoryContext};
use crate::analysis::{Analyzer, LocationAnalysis};
use crate::error::TransportError;
use crate::store::{BotUser, NewSpatialQuery, RecordStore};

// ── Messages ──

/// A normalized inbound chat event.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Start,
    Location { latitude: f64, longitude: f64 },
    Recommendation,
    Text(String),
}

impl Incoming {
    /// Classify a text message: `/start` and `/recommendation` (with an
    /// optional `@BotName` suffix or payload) are commands.
    pub fn from_text(text: &str) -> Self {
        match command_name(text) {
            Some(cmd) if cmd.eq_ignore_ascii_case("start") => Incoming::Start,
            Some(cmd) if cmd.eq_ignore_ascii_case("recommendation") => Incoming::Recommendation,
            _ => Incoming::Text(text.to_string()),
        }
    }
}

fn command_name(text: &str) -> Option<&str> {
    let rest = text.trim().strip_prefix('/')?;
    let word = rest.split_whitespace().next().unwrap_or("");
    Some(word.split('@').next().unwrap_or(word))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    /// `<b>`/`<i>` markup.
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    None,
    /// One-tap command buttons, hidden after use.
    Commands(Vec<String>),
    /// Ask the client to open a reply box with a placeholder.
    ForceReply { placeholder: String },
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub format: TextFormat,
    pub keyboard: Keyboard,
}

impl Reply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Plain,
            keyboard: Keyboard::None,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            format: TextFormat::Html,
            ..Self::plain(text)
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// Delivers replies to one chat as soon as they are produced.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, reply: Reply) -> Result<(), TransportError>;
}

// ── Texts ──

pub const WELCOME: &str = "<b>👋 Welcome to LandAlert Bot!</b>\n\
I provide <b>real-time land risk analysis</b> for flood, drought and heat.\n\
Please <b>share your current location</b> with the location button so I can begin your analysis. 🌍";

pub const ANALYZING: &str = "🔍 I'm analyzing your location, please wait...";

pub const THANKS: &str = "Thanks for sharing your location! Here's your analysis:";

pub const ASK_USAGE: &str = "To provide the most accurate analysis, please share your intended usage of the land \
at your location (e.g., agriculture, construction, conservation).";

pub const USAGE_PREFIX: &str = "My Usage:";

pub const UNRECOGNIZED: &str = "Unrecognized Command!\nKindly share your location to proceed!";

pub const TRY_AGAIN: &str = "⚠️ I couldn't complete the analysis right now. Please share your location again in a moment.";

pub const INVALID_LOCATION: &str = "That location doesn't look valid. Please share your location with the location button.";

pub const NO_COVERAGE: &str = "Insufficient data for this location. LandAlert currently covers Nigeria only.";

pub const NEED_LOCATION_FIRST: &str = "Please share your location first so I can tailor a recommendation to it.";

pub const RECOMMENDATION_COMMAND: &str = "/recommendation";

/// Escape `<`, `>` and `&` for Telegram HTML.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Upper-case the first letter.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The HTML risk report for one location.
pub fn format_report(a: &LocationAnalysis) -> String {
    let heat = match &a.heat {
        Some(r) => format!("<b>{}!</b> ({:.1}°C)", escape_html(&capitalize(&r.label)), r.index_value),
        None => "<b>Insufficient data</b> (N/A)".to_string(),
    };
    let drought = match &a.drought {
        Some(r) => format!(
            "<b>{}</b>\n    - VHI (Vegetation Health Index): {:.2}",
            escape_html(&r.label),
            r.index_value
        ),
        None => "<b>Insufficient data</b>\n    - VHI (Vegetation Health Index): N/A".to_string(),
    };
    let flood = match &a.flood {
        Some(r) => format!("<b>Level {} of 5 - {}</b>", r.class.get(), escape_html(&r.label)),
        None => "<b>Insufficient data</b>".to_string(),
    };
    format!(
        "<b>🛰️ LandAlert Report 🛰️</b>\n\
<i>Land risk analysis from satellite data</i>\n\
\n\
<b>Geographic Data</b>\n\
<b>🌍 Coordinates:</b> lat: {lat:.5}, lon: {lon:.5}\n\
\n\
<b>Environmental Status</b>\n\
<b>🌡️ Surface Temperature:</b> {heat}\n\
<b>💧 Drought Risk:</b> {drought}\n\
<b>🌊 Flood Susceptibility:</b> {flood}",
        lat = a.point.lat,
        lon = a.point.lon,
    )
}

fn record_for(user: &BotUser, a: &LocationAnalysis) -> NewSpatialQuery {
    let value = |r: &Option<RiskReport>| r.as_ref().map(|r| f64::from(r.index_value));
    let label = |r: &Option<RiskReport>| r.as_ref().map(|r| r.label.clone());
    NewSpatialQuery {
        user_id: user.user_id.clone(),
        latitude: a.point.lat,
        longitude: a.point.lon,
        vhi: value(&a.drought),
        lst_temp: value(&a.heat),
        lst_category: label(&a.heat),
        drought: label(&a.drought),
        flood_risk_level: a.flood.as_ref().map(|r| i16::from(r.class.get())),
    }
}

/// Strip a leading `My Usage:` (any case) and surrounding whitespace.
pub fn strip_usage_prefix(text: &str) -> &str {
    let t = text.trim();
    match t.get(..USAGE_PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(USAGE_PREFIX) => t[USAGE_PREFIX.len()..].trim(),
        _ => t,
    }
}

// ── Sessions ──

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Session {
    awaiting_usage: bool,
}

/// Per-user conversation state, keyed by platform user id.
#[derive(Default)]
pub struct Sessions {
    inner: RwLock<HashMap<String, Session>>,
}

impl Sessions {
    pub async fn is_awaiting_usage(&self, user_id: &str) -> bool {
        self.inner
            .read()
            .await
            .get(user_id)
            .is_some_and(|s| s.awaiting_usage)
    }

    pub async fn set_awaiting_usage(&self, user_id: &str, awaiting: bool) {
        let mut map = self.inner.write().await;
        if awaiting {
            map.entry(user_id.to_string()).or_default().awaiting_usage = true;
        } else {
            map.remove(user_id);
        }
    }

    /// Drop the user's session, returning whether the flag was set.
    async fn take_awaiting_usage(&self, user_id: &str) -> bool {
        self.inner
            .write()
            .await
            .remove(user_id)
            .is_some_and(|s| s.awaiting_usage)
    }
}

// ── Dispatcher ──

pub struct Conversation {
    analyzer: Analyzer,
    advisor: Arc<dyn Advisor>,
    advisor_timeout: Duration,
    store: Arc<dyn RecordStore>,
    sessions: Sessions,
}

impl Conversation {
    pub fn new(
        analyzer: Analyzer,
        advisor: Arc<dyn Advisor>,
        advisor_timeout: Duration,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            analyzer,
            advisor,
            advisor_timeout,
            store,
            sessions: Sessions::default(),
        }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    /// Handle one inbound event, sending every reply through `sink`.
    pub async fn handle(&self, user: &BotUser, msg: Incoming, sink: &dyn ReplySink) {
        match msg {
            Incoming::Start => self.on_start(user, sink).await,
            Incoming::Location { latitude, longitude } => {
                self.on_location(user, latitude, longitude, sink).await
            }
            Incoming::Recommendation => self.on_recommendation(user, sink).await,
            Incoming::Text(text) => self.on_text(user, &text, sink).await,
        }
    }

    async fn send(&self, sink: &dyn ReplySink, reply: Reply) {
        if let Err(e) = sink.send(reply).await {
            warn!(error = %e, "failed to deliver reply");
        }
    }

    async fn on_start(&self, user: &BotUser, sink: &dyn ReplySink) {
        match self.store.upsert_user(user).await {
            Ok(created) => info!(user_id = %user.user_id, platform = user.platform.as_str(), created, "user registered"),
            Err(e) => warn!(user_id = %user.user_id, error = %e, "failed to upsert user"),
        }
        self.send(sink, Reply::html(WELCOME)).await;
    }

    async fn on_location(&self, user: &BotUser, latitude: f64, longitude: f64, sink: &dyn ReplySink) {
        let point = match QueryPoint::new(latitude, longitude) {
            Ok(p) => p,
            Err(e) => {
                warn!(user_id = %user.user_id, error = %e, "rejected location");
                self.send(sink, Reply::plain(INVALID_LOCATION)).await;
                return;
            }
        };
        self.send(sink, Reply::plain(ANALYZING)).await;

        let analysis = match self.analyzer.analyze(point).await {
            Ok(a) => a,
            Err(e) => {
                warn!(user_id = %user.user_id, error = %e, "analysis failed");
                self.send(sink, Reply::plain(TRY_AGAIN)).await;
                return;
            }
        };
        info!(
            user_id = %user.user_id,
            lat = point.lat,
            lon = point.lon,
            flood = ?analysis.flood.as_ref().map(|r| r.class.get()),
            drought = ?analysis.drought.as_ref().map(|r| r.class.get()),
            heat = ?analysis.heat.as_ref().map(|r| r.class.get()),
            "location analyzed"
        );

        if let Err(e) = self.store.insert_query(&record_for(user, &analysis)).await {
            warn!(user_id = %user.user_id, error = %e, "failed to persist query");
        }

        if !analysis.has_any() {
            self.send(sink, Reply::plain(NO_COVERAGE)).await;
            return;
        }
        self.send(sink, Reply::plain(THANKS)).await;
        let keyboard = Keyboard::Commands(vec![RECOMMENDATION_COMMAND.to_string()]);
        self.send(sink, Reply::html(format_report(&analysis)).with_keyboard(keyboard))
            .await;
    }

    async fn on_recommendation(&self, user: &BotUser, sink: &dyn ReplySink) {
        self.sessions.set_awaiting_usage(&user.user_id, true).await;
        let keyboard = Keyboard::ForceReply {
            placeholder: format!("{USAGE_PREFIX} "),
        };
        self.send(sink, Reply::plain(ASK_USAGE).with_keyboard(keyboard)).await;
    }

    async fn on_text(&self, user: &BotUser, text: &str, sink: &dyn ReplySink) {
        if !self.sessions.take_awaiting_usage(&user.user_id).await {
            self.send(sink, Reply::plain(UNRECOGNIZED).with_keyboard(Keyboard::Remove))
                .await;
            return;
        }
        let intent = strip_usage_prefix(text);

        let latest = match self.store.latest_query(&user.user_id).await {
            Ok(Some(q)) => q,
            Ok(None) => {
                self.send(sink, Reply::plain(NEED_LOCATION_FIRST).with_keyboard(Keyboard::Remove))
                    .await;
                return;
            }
            Err(e) => {
                warn!(user_id = %user.user_id, error = %e, "failed to load latest query");
                self.send(sink, Reply::plain(TRY_AGAIN).with_keyboard(Keyboard::Remove))
                    .await;
                return;
            }
        };

        let ctx = AdvisoryContext {
            user_name: user.display_name().to_string(),
            intent: intent.to_string(),
            latitude: latest.latitude,
            longitude: latest.longitude,
            flood: latest.flood_risk_level.and_then(stored_flood),
            drought: latest.drought.clone(),
            vhi: latest.vhi,
            lst_temp: latest.lst_temp,
            lst_category: latest.lst_category.clone(),
        };
        let recommendation = recommend_or_fallback(self.advisor.as_ref(), &ctx, self.advisor_timeout).await;

        if let Err(e) = self
            .store
            .record_recommendation(latest.id, intent, &recommendation)
            .await
        {
            warn!(user_id = %user.user_id, query_id = latest.id, error = %e, "failed to store recommendation");
        }
        self.send(sink, Reply::plain(recommendation).with_keyboard(Keyboard::Remove))
            .await;
    }
}

/// Level and label of a stored flood class. Levels outside 1..=5 are dropped.
fn stored_flood(level: i16) -> Option<(u8, String)> {
    let class = RiskClass::new(u8::try_from(level).ok()?)?;
    Some((class.get(), flood_label(class).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use landalert_core::Hazard;

    #[test]
    fn commands_and_free_text() {
        assert_eq!(Incoming::from_text("/start"), Incoming::Start);
        assert_eq!(Incoming::from_text("/start@LandAlertBot"), Incoming::Start);
        assert_eq!(Incoming::from_text(" /Recommendation "), Incoming::Recommendation);
        assert_eq!(
            Incoming::from_text("My Usage: farming"),
            Incoming::Text("My Usage: farming".into())
        );
        assert_eq!(Incoming::from_text("/help"), Incoming::Text("/help".into()));
    }

    #[test]
    fn stored_flood_levels_outside_the_scale_are_dropped() {
        assert_eq!(stored_flood(4), Some((4, "Substantial".to_string())));
        assert_eq!(stored_flood(5), Some((5, "Critical".to_string())));
        assert_eq!(stored_flood(0), None);
        assert_eq!(stored_flood(9), None);
        assert_eq!(stored_flood(-1), None);
        assert_eq!(stored_flood(300), None);
    }

    #[test]
    fn usage_prefix_is_case_insensitive() {
        assert_eq!(strip_usage_prefix("My Usage: farming"), "farming");
        assert_eq!(strip_usage_prefix("my usage:   build a school "), "build a school");
        assert_eq!(strip_usage_prefix("MY USAGE:solar"), "solar");
        assert_eq!(strip_usage_prefix("  fish pond"), "fish pond");
        assert_eq!(strip_usage_prefix("My"), "My");
    }

    fn report(hazard: Hazard, class: u8, label: &str, v: f32) -> RiskReport {
        RiskReport {
            hazard,
            class: RiskClass::new(class).unwrap(),
            label: label.into(),
            index_value: v,
        }
    }

    #[test]
    fn report_lists_every_hazard() {
        let a = LocationAnalysis {
            point: QueryPoint::new(7.7975, 6.7406).unwrap(),
            flood: Some(report(Hazard::Flood, 4, "Substantial", 0.61)),
            drought: Some(report(Hazard::Drought, 2, "Mild Drought", 0.45)),
            heat: Some(report(Hazard::Heat, 3, "High (or Warm)", 35.04)),
        };
        let text = format_report(&a);
        assert!(text.contains("lat: 7.79750, lon: 6.74060"));
        assert!(text.contains("<b>High (or Warm)!</b> (35.0°C)"));
        assert!(text.contains("<b>Mild Drought</b>"));
        assert!(text.contains("VHI (Vegetation Health Index): 0.45"));
        assert!(text.contains("<b>Level 4 of 5 - Substantial</b>"));
    }

    #[test]
    fn missing_hazards_read_as_insufficient_data() {
        let a = LocationAnalysis {
            point: QueryPoint::new(9.0, 7.0).unwrap(),
            flood: None,
            drought: None,
            heat: Some(report(Hazard::Heat, 1, "Comfortable Warmth", 25.0)),
        };
        let text = format_report(&a);
        assert!(text.contains("<b>🌊 Flood Susceptibility:</b> <b>Insufficient data</b>"));
        assert!(text.contains("VHI (Vegetation Health Index): N/A"));
    }

    #[tokio::test]
    async fn awaiting_flag_is_per_user_and_cleared_on_take() {
        let s = Sessions::default();
        s.set_awaiting_usage("a", true).await;
        assert!(s.is_awaiting_usage("a").await);
        assert!(!s.is_awaiting_usage("b").await);
        assert!(s.take_awaiting_usage("a").await);
        assert!(!s.take_awaiting_usage("a").await);
    }

    #[tokio::test]
    async fn finished_sessions_leave_no_entry() {
        let s = Sessions::default();
        for id in ["a", "b", "c"] {
            s.set_awaiting_usage(id, true).await;
        }
        s.take_awaiting_usage("a").await;
        s.set_awaiting_usage("b", false).await;
        // Taking for a user with no session must not create one.
        s.take_awaiting_usage("d").await;
        let map = s.inner.read().await;
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("c"));
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(escape_html("a < b & c"), "a &lt; b &amp; c");
    }
}
