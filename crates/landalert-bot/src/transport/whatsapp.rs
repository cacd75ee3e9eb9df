//! WhatsApp Cloud API: webhook verification, inbound messages and the Graph
//! `messages` endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::check_status;
use crate::conversation::{Incoming, Keyboard, Reply, ReplySink, TextFormat};
use crate::error::TransportError;
use crate::store::{BotUser, Platform};

const GRAPH_URL: &str = "https://graph.facebook.com/v20.0";

// ── Verification handshake ──

/// Query of the `GET` subscription check.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// The challenge to echo back, or `None` when the request must be refused.
pub fn verify_subscription(query: &VerifyQuery, expected_token: &str) -> Option<String> {
    match (&query.mode, &query.verify_token, &query.challenge) {
        (Some(mode), Some(token), Some(challenge)) if mode == "subscribe" && token == expected_token => {
            Some(challenge.clone())
        }
        _ => None,
    }
}

// ── Inbound payload ──

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    pub value: ChangeValue,
}

#[derive(Debug, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<WaMessage>,
}

#[derive(Debug, Deserialize)]
pub struct Contact {
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
pub struct Profile {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct WaMessage {
    pub from: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<WaText>,
    #[serde(default)]
    pub location: Option<WaLocation>,
}

#[derive(Debug, Deserialize)]
pub struct WaText {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct WaLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// A message the conversation can act on. `user.user_id` is the sender's
/// number, which is also the reply address.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub user: BotUser,
    pub incoming: Incoming,
}

/// Every text or location message in the payload. Status callbacks and
/// other message types yield nothing.
pub fn parse_webhook(payload: WebhookPayload) -> Vec<Inbound> {
    let mut out = Vec::new();
    for change in payload.entry.into_iter().flat_map(|e| e.changes) {
        if change.field != "messages" {
            continue;
        }
        let value = change.value;
        for message in value.messages {
            let incoming = match (message.kind.as_str(), message.location, message.text) {
                ("location", Some(loc), _) => Incoming::Location {
                    latitude: loc.latitude,
                    longitude: loc.longitude,
                },
                ("text", _, Some(text)) => Incoming::from_text(&text.body),
                (kind, _, _) => {
                    debug!(kind, "ignoring whatsapp message");
                    continue;
                }
            };
            let name = value
                .contacts
                .iter()
                .find(|c| c.wa_id == message.from)
                .and_then(|c| c.profile.as_ref())
                .map(|p| p.name.clone());
            out.push(Inbound {
                user: BotUser {
                    user_id: message.from,
                    platform: Platform::WhatsApp,
                    username: None,
                    first_name: name,
                    last_name: None,
                },
                incoming,
            });
        }
    }
    out
}

// ── Outbound ──

/// Map the `<b>`/`<i>` markup to WhatsApp's `*bold*`/`_italic_` and drop
/// any other tags.
pub fn html_to_whatsapp(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let Some(len) = rest[start..].find('>') else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let tag = &rest[start + 1..start + len];
        match tag.trim_start_matches('/') {
            "b" | "strong" => out.push('*'),
            "i" | "em" => out.push('_'),
            _ => {}
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out.replace("&lt;", "<").replace("&gt;", ">").replace("&amp;", "&")
}

/// Plain text for one reply, with keyboards rendered as hints.
pub fn render(reply: &Reply) -> String {
    let mut text = match reply.format {
        TextFormat::Html => html_to_whatsapp(&reply.text),
        TextFormat::Plain => reply.text.clone(),
    };
    match &reply.keyboard {
        Keyboard::Commands(commands) if !commands.is_empty() => {
            text.push_str("\n\nReply with ");
            text.push_str(&commands.join(" or "));
        }
        Keyboard::ForceReply { placeholder } => {
            text.push_str(&format!("\n\nStart your reply with \"{}\"", placeholder.trim_end()));
        }
        _ => {}
    }
    text
}

pub fn send_message_body(to: &str, reply: &Reply) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": { "preview_url": false, "body": render(reply) },
    })
}

#[derive(Clone)]
pub struct WhatsAppClient {
    http: reqwest::Client,
    access_token: String,
    messages_url: String,
}

impl WhatsAppClient {
    pub fn new(access_token: impl Into<String>, phone_number_id: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: access_token.into(),
            messages_url: format!("{GRAPH_URL}/{phone_number_id}/messages"),
        }
    }

    pub async fn send(&self, to: &str, reply: &Reply) -> Result<(), TransportError> {
        let response = self
            .http
            .post(&self.messages_url)
            .bearer_auth(&self.access_token)
            .json(&send_message_body(to, reply))
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        check_status(response).await
    }

    pub fn sink(&self, to: impl Into<String>) -> WhatsAppSink {
        WhatsAppSink {
            client: self.clone(),
            to: to.into(),
        }
    }
}

/// Replies for one WhatsApp number.
pub struct WhatsAppSink {
    client: WhatsAppClient,
    to: String,
}

#[async_trait]
impl ReplySink for WhatsAppSink {
    async fn send(&self, reply: Reply) -> Result<(), TransportError> {
        self.client.send(&self.to, &reply).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(messages: Value) -> WebhookPayload {
        serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": { "phone_number_id": "99" },
                        "contacts": [{ "profile": { "name": "Chinedu" }, "wa_id": "2348000000001" }],
                        "messages": messages
                    }
                }]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn parses_location_and_text() {
        let p = payload(json!([
            {
                "from": "2348000000001", "id": "wamid.1", "timestamp": "1700000000",
                "type": "location",
                "location": { "latitude": 6.5244, "longitude": 3.3792, "name": "Lagos" }
            },
            {
                "from": "2348000000001", "id": "wamid.2", "timestamp": "1700000001",
                "type": "text", "text": { "body": "/recommendation" }
            },
            {
                "from": "2348000000001", "id": "wamid.3", "timestamp": "1700000002",
                "type": "image", "image": { "id": "m" }
            }
        ]));
        let inbound = parse_webhook(p);
        assert_eq!(inbound.len(), 2);
        assert_eq!(inbound[0].user.user_id, "2348000000001");
        assert_eq!(inbound[0].user.first_name.as_deref(), Some("Chinedu"));
        assert_eq!(inbound[0].user.platform, Platform::WhatsApp);
        assert_eq!(
            inbound[0].incoming,
            Incoming::Location { latitude: 6.5244, longitude: 3.3792 }
        );
        assert_eq!(inbound[1].incoming, Incoming::Recommendation);
    }

    #[test]
    fn status_callbacks_yield_nothing() {
        let p: WebhookPayload = serde_json::from_value(json!({
            "entry": [{ "changes": [{ "field": "messages", "value": {
                "statuses": [{ "id": "wamid.1", "status": "delivered" }]
            }}]}]
        }))
        .unwrap();
        assert!(parse_webhook(p).is_empty());
    }

    #[test]
    fn verification_handshake() {
        let q = VerifyQuery {
            mode: Some("subscribe".into()),
            verify_token: Some("s3cret".into()),
            challenge: Some("1158201444".into()),
        };
        assert_eq!(verify_subscription(&q, "s3cret").as_deref(), Some("1158201444"));
        assert_eq!(verify_subscription(&q, "other"), None);
        let q = VerifyQuery { mode: None, ..q };
        assert_eq!(verify_subscription(&q, "s3cret"), None);
    }

    #[test]
    fn html_becomes_whatsapp_markup() {
        assert_eq!(
            html_to_whatsapp("<b>Level 4</b> of <i>5</i> &amp; a <br/>"),
            "*Level 4* of _5_ & a "
        );
        assert_eq!(html_to_whatsapp("1 < 2"), "1 < 2");
    }

    #[test]
    fn keyboards_render_as_hints() {
        let r = Reply::plain("Ask").with_keyboard(Keyboard::ForceReply { placeholder: "My Usage: ".into() });
        assert_eq!(render(&r), "Ask\n\nStart your reply with \"My Usage:\"");
        let r = Reply::html("<b>Report</b>").with_keyboard(Keyboard::Commands(vec!["/recommendation".into()]));
        let body = send_message_body("234", &r);
        assert_eq!(body["text"]["body"], "*Report*\n\nReply with /recommendation");
        assert_eq!(body["to"], "234");
    }
}
