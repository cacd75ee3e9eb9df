//! LandAlert chat service: Telegram and WhatsApp webhooks, a JSON risk API
//! and AI land-use recommendations on top of a precomputed `RiskModel`.

pub mod advisor;
pub mod analysis;
pub mod app;
pub mod config;
pub mod conversation;
pub mod error;
pub mod store;
pub mod transport;

pub use advisor::{Advisor, AdvisoryContext, DisabledAdvisor, OpenAiAdvisor};
pub use analysis::{Analyzer, HazardBackend, LocalBackend, LocationAnalysis};
pub use app::{router, AppState, ModelInfo};
pub use config::Config;
pub use conversation::{Conversation, Incoming, Keyboard, Reply, ReplySink, TextFormat};
pub use error::{AdvisorError, Result, ServiceError, TransportError};
pub use store::{BotUser, MemoryRecordStore, PgRecordStore, Platform, RecordStore};
