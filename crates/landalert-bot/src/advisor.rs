//! AI land-use recommendation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AdvisorError;

/// Longest reply sent to the user, in characters.
pub const MAX_REPLY_CHARS: usize = 280;

pub const FALLBACK_RECOMMENDATION: &str = "Sorry, I couldn't generate a recommendation right now. \
Please review the risk report above and try /recommendation again in a few minutes.";

const SYSTEM_PROMPT: &str = "You are a helpful Nigerian land and flood risk advisor.";

/// What the advisor knows about the user and the plot.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryContext {
    pub user_name: String,
    pub intent: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Flood class 1..=5 and its label.
    pub flood: Option<(u8, String)>,
    pub drought: Option<String>,
    pub vhi: Option<f64>,
    pub lst_temp: Option<f64>,
    pub lst_category: Option<String>,
}

#[async_trait]
pub trait Advisor: Send + Sync {
    async fn recommend(&self, ctx: &AdvisoryContext) -> Result<String, AdvisorError>;
}

/// Advisor text within `timeout`, trimmed; the fallback message on any failure.
pub async fn recommend_or_fallback(advisor: &dyn Advisor, ctx: &AdvisoryContext, timeout: Duration) -> String {
    match tokio::time::timeout(timeout, advisor.recommend(ctx)).await {
        Ok(Ok(text)) if !text.trim().is_empty() => trim_reply(&text),
        Ok(Ok(_)) => {
            warn!("advisor returned an empty recommendation");
            FALLBACK_RECOMMENDATION.to_string()
        }
        Ok(Err(e)) => {
            warn!(error = %e, "advisor failed");
            FALLBACK_RECOMMENDATION.to_string()
        }
        Err(_) => {
            warn!(error = %AdvisorError::Timeout, "advisor failed");
            FALLBACK_RECOMMENDATION.to_string()
        }
    }
}

/// Trim whitespace and cap at [`MAX_REPLY_CHARS`], cutting at a word
/// boundary where one exists.
pub fn trim_reply(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= MAX_REPLY_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_REPLY_CHARS - 1).collect();
    let cut = match head.rfind(char::is_whitespace) {
        Some(i) if i > head.len() / 2 => head[..i].trim_end(),
        _ => head.as_str(),
    };
    format!("{cut}…")
}

fn or_na<T: ToString>(v: &Option<T>) -> String {
    v.as_ref().map_or_else(|| "N/A".to_string(), ToString::to_string)
}

pub fn build_prompt(ctx: &AdvisoryContext) -> String {
    let flood = ctx
        .flood
        .as_ref()
        .map_or_else(|| "N/A".to_string(), |(c, label)| format!("Level {c} of 5 ({label})"));
    let lst = match ctx.lst_temp {
        Some(t) => format!("{t:.1}°C ({})", ctx.lst_category.as_deref().unwrap_or("N/A")),
        None => "N/A".to_string(),
    };
    format!(
        "You are a senior land development and flood risk expert in Nigeria.
A user named {name} is asking about a plot of land at coordinates ({lon:.5}, {lat:.5}).

Their intention: {intent}

Our flood susceptibility model (elevation, slope, rainfall, rivers, soil moisture, land cover, vegetation and flow accumulation) and satellite drought and heat indices classify this location as:

→ flood_susceptibility: **{flood}**
→ drought: **{drought}**
→ vegetation health index (VHI): **{vhi}**
→ land surface temperature (LST): **{lst}**

Write a short, clear, professional and friendly message (max {max} characters) in simple English that includes:

1. The risk level
2. One-sentence explanation why
3. Strong recommendation (Go ahead / Proceed with caution / Not recommended)
4. One practical next step or alternative suggestion

Tone: warm and trustworthy, like a senior engineer advising a client.",
        name = ctx.user_name,
        lon = ctx.longitude,
        lat = ctx.latitude,
        intent = ctx.intent,
        drought = or_na(&ctx.drought),
        vhi = ctx.vhi.map_or_else(|| "N/A".to_string(), |v| format!("{v:.2}")),
        max = MAX_REPLY_CHARS,
    )
}

// ── OpenAI chat completions ──

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct OpenAiAdvisor {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiAdvisor {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Advisor for OpenAiAdvisor {
    async fn recommend(&self, ctx: &AdvisoryContext) -> Result<String, AdvisorError> {
        if self.api_key.is_empty() {
            return Err(AdvisorError::Config("OPENAI_API_KEY is empty".into()));
        }
        let prompt = build_prompt(ctx);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: &prompt },
            ],
            max_tokens: 300,
            temperature: 0.7,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AdvisorError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdvisorError::Api(format!("{status}: {body}")));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AdvisorError::Parse(e.to_string()))?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AdvisorError::Parse("no choices in response".into()))?;
        debug!(chars = text.chars().count(), "advisor reply");
        Ok(text.trim().to_string())
    }
}

/// Used when no API key is configured: every request falls back.
pub struct DisabledAdvisor;

#[async_trait]
impl Advisor for DisabledAdvisor {
    async fn recommend(&self, _: &AdvisoryContext) -> Result<String, AdvisorError> {
        Err(AdvisorError::Config("OPENAI_API_KEY not set".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AdvisoryContext {
        AdvisoryContext {
            user_name: "Ada".into(),
            intent: "poultry farm".into(),
            latitude: 7.7975,
            longitude: 6.7406,
            flood: Some((4, "Substantial".into())),
            drought: Some("Mild Drought".into()),
            vhi: Some(0.4567),
            lst_temp: Some(33.24),
            lst_category: None,
        }
    }

    #[test]
    fn prompt_carries_every_input() {
        let p = build_prompt(&ctx());
        assert!(p.contains("A user named Ada"));
        assert!(p.contains("(6.74060, 7.79750)"));
        assert!(p.contains("Their intention: poultry farm"));
        assert!(p.contains("Level 4 of 5 (Substantial)"));
        assert!(p.contains("**Mild Drought**"));
        assert!(p.contains("**0.46**"));
        assert!(p.contains("33.2°C (N/A)"));
        assert!(p.contains("max 280 characters"));
    }

    #[test]
    fn missing_values_read_as_na() {
        let mut c = ctx();
        c.flood = None;
        c.vhi = None;
        c.lst_temp = None;
        let p = build_prompt(&c);
        assert!(p.contains("flood_susceptibility: **N/A**"));
        assert!(p.contains("(VHI): **N/A**"));
        assert!(p.contains("(LST): **N/A**"));
    }

    #[test]
    fn replies_are_capped_at_280_chars() {
        let long = "word ".repeat(100);
        let t = trim_reply(&long);
        assert!(t.chars().count() <= MAX_REPLY_CHARS);
        assert!(t.ends_with("word…"));
        assert_eq!(trim_reply("  short  "), "short");
        let unbroken = "é".repeat(400);
        assert_eq!(trim_reply(&unbroken).chars().count(), MAX_REPLY_CHARS);
    }

    struct Broken;

    #[async_trait]
    impl Advisor for Broken {
        async fn recommend(&self, _: &AdvisoryContext) -> Result<String, AdvisorError> {
            Err(AdvisorError::Api("500".into()))
        }
    }

    struct Slow;

    #[async_trait]
    impl Advisor for Slow {
        async fn recommend(&self, _: &AdvisoryContext) -> Result<String, AdvisorError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    #[tokio::test]
    async fn failures_degrade_to_the_fallback() {
        let t = Duration::from_millis(50);
        assert_eq!(recommend_or_fallback(&Broken, &ctx(), t).await, FALLBACK_RECOMMENDATION);
        assert_eq!(recommend_or_fallback(&Slow, &ctx(), t).await, FALLBACK_RECOMMENDATION);
        assert_eq!(recommend_or_fallback(&DisabledAdvisor, &ctx(), t).await, FALLBACK_RECOMMENDATION);
    }
}
