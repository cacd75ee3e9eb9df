//! LandAlert bot server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use landalert_bot::app::{TelegramHook, WhatsAppHook};
use landalert_bot::transport::telegram::TelegramClient;
use landalert_bot::transport::whatsapp::WhatsAppClient;
use landalert_bot::{
    router, Advisor, AppState, Analyzer, Config, Conversation, DisabledAdvisor, LocalBackend,
    MemoryRecordStore, ModelInfo, OpenAiAdvisor, PgRecordStore, RecordStore,
};
use landalert_core::RiskModel;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "landalert-bot", about = "Flood, drought and heat risk chat bot")]
struct Args {
    /// Risk model bundle (overrides RISK_MODEL_PATH)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Listen port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,landalert_bot=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let args = Args::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    let model_path = args.model.unwrap_or_else(|| config.risk_model_path.clone());
    let json = std::fs::read_to_string(&model_path)
        .with_context(|| format!("Failed to read risk model {}", model_path.display()))?;
    let model = RiskModel::from_json_str(&json)
        .with_context(|| format!("Invalid risk model {}", model_path.display()))?;
    let model_info = ModelInfo::of(&model);
    tracing::info!(
        region = %model_info.region,
        created_at = %model_info.created_at,
        breakpoints = ?model_info.flood_breakpoints,
        "risk model loaded"
    );

    let store: Arc<dyn RecordStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .context("Failed to connect to database")?;
            let store = PgRecordStore::new(pool);
            store.migrate().await.context("Failed to run migrations")?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, records are kept in memory only");
            Arc::new(MemoryRecordStore::new())
        }
    };

    let advisor: Arc<dyn Advisor> = match &config.openai_api_key {
        Some(key) => Arc::new(OpenAiAdvisor::new(key.clone(), config.openai_model.clone())),
        None => {
            tracing::warn!("OPENAI_API_KEY not set, recommendations use the fallback text");
            Arc::new(DisabledAdvisor)
        }
    };

    let backend = Arc::new(LocalBackend::new(Arc::new(model)));
    let analyzer = Analyzer::new(backend, config.hazard_timeout);
    let conversation = Conversation::new(
        analyzer,
        advisor,
        config.advisor_timeout,
        Arc::clone(&store),
    );

    let telegram = config.telegram.as_ref().map(|t| TelegramHook {
        client: TelegramClient::new(&t.bot_token),
        secret: t.webhook_secret.clone(),
    });
    let whatsapp = config.whatsapp.as_ref().map(|w| WhatsAppHook {
        client: WhatsAppClient::new(w.access_token.clone(), &w.phone_number_id),
        verify_token: w.verify_token.clone(),
    });
    if telegram.is_none() && whatsapp.is_none() {
        tracing::warn!("no chat platform configured, serving the JSON API only");
    }

    let app = router(AppState {
        conversation: Arc::new(conversation),
        store,
        model: model_info,
        telegram,
        whatsapp,
    });

    let port = args.port.unwrap_or(config.port);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("LandAlert bot listening on {addr}");
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
