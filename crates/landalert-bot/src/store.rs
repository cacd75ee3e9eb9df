//! Persistence of chat users and per-location query records.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Telegram,
    WhatsApp,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Telegram => "telegram",
            Platform::WhatsApp => "whatsapp",
        }
    }
}

/// A chat participant as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotUser {
    /// Platform-scoped id (Telegram user id, WhatsApp number).
    pub user_id: String,
    pub platform: Platform,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl BotUser {
    /// Name to address the user by.
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.first_name.as_deref())
            .unwrap_or("there")
    }
}

/// Analysis results for one shared location.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSpatialQuery {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub vhi: Option<f64>,
    pub lst_temp: Option<f64>,
    pub lst_category: Option<String>,
    pub drought: Option<String>,
    pub flood_risk_level: Option<i16>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct SpatialQuery {
    pub id: i64,
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub vhi: Option<f64>,
    pub lst_temp: Option<f64>,
    pub lst_category: Option<String>,
    pub drought: Option<String>,
    pub flood_risk_level: Option<i16>,
    pub user_intent: String,
    pub ai_recommendation: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_INTENT: &str = "unspecified";

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or refresh a user. Returns true when the user is new.
    async fn upsert_user(&self, user: &BotUser) -> Result<bool>;

    async fn insert_query(&self, query: &NewSpatialQuery) -> Result<i64>;

    /// Most recent query of `user_id`, if any.
    async fn latest_query(&self, user_id: &str) -> Result<Option<SpatialQuery>>;

    async fn record_recommendation(&self, query_id: i64, intent: &str, recommendation: &str) -> Result<()>;

    /// Connectivity check for the health endpoint.
    async fn ping(&self) -> Result<()>;
}

// ── Postgres ──

pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn upsert_user(&self, user: &BotUser) -> Result<bool> {
        // xmax = 0 only on a freshly inserted row.
        let created = sqlx::query_scalar::<_, bool>(
            r#"
            INSERT INTO bot_users (user_id, platform, username, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (platform, user_id) DO UPDATE
            SET username = EXCLUDED.username,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name
            RETURNING (xmax = 0)
            "#,
        )
        .bind(&user.user_id)
        .bind(user.platform.as_str())
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn insert_query(&self, q: &NewSpatialQuery) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO spatial_queries
                (user_id, latitude, longitude, vhi, lst_temp, lst_category, drought, flood_risk_level, user_intent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(&q.user_id)
        .bind(q.latitude)
        .bind(q.longitude)
        .bind(q.vhi)
        .bind(q.lst_temp)
        .bind(&q.lst_category)
        .bind(&q.drought)
        .bind(q.flood_risk_level)
        .bind(DEFAULT_INTENT)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn latest_query(&self, user_id: &str) -> Result<Option<SpatialQuery>> {
        let row = sqlx::query_as::<_, SpatialQuery>(
            r#"
            SELECT id, user_id, latitude, longitude, vhi, lst_temp, lst_category, drought,
                   flood_risk_level, user_intent, ai_recommendation, created_at
            FROM spatial_queries
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn record_recommendation(&self, query_id: i64, intent: &str, recommendation: &str) -> Result<()> {
        let done = sqlx::query(
            "UPDATE spatial_queries SET user_intent = $2, ai_recommendation = $3 WHERE id = $1",
        )
        .bind(query_id)
        .bind(intent)
        .bind(recommendation)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(ServiceError::Store(format!("spatial query {query_id} not found")));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ── In-memory ──

#[derive(Default)]
struct MemoryTables {
    users: HashMap<(Platform, String), BotUser>,
    queries: Vec<SpatialQuery>,
}

/// Process-local store for development and tests.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: RwLock<MemoryTables>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user(&self, platform: Platform, user_id: &str) -> Option<BotUser> {
        let key = (platform, user_id.to_string());
        self.tables.read().await.users.get(&key).cloned()
    }

    pub async fn queries(&self) -> Vec<SpatialQuery> {
        self.tables.read().await.queries.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn upsert_user(&self, user: &BotUser) -> Result<bool> {
        let mut t = self.tables.write().await;
        let key = (user.platform, user.user_id.clone());
        Ok(t.users.insert(key, user.clone()).is_none())
    }

    async fn insert_query(&self, q: &NewSpatialQuery) -> Result<i64> {
        let mut t = self.tables.write().await;
        let id = t.queries.len() as i64 + 1;
        t.queries.push(SpatialQuery {
            id,
            user_id: q.user_id.clone(),
            latitude: q.latitude,
            longitude: q.longitude,
            vhi: q.vhi,
            lst_temp: q.lst_temp,
            lst_category: q.lst_category.clone(),
            drought: q.drought.clone(),
            flood_risk_level: q.flood_risk_level,
            user_intent: DEFAULT_INTENT.to_string(),
            ai_recommendation: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn latest_query(&self, user_id: &str) -> Result<Option<SpatialQuery>> {
        let t = self.tables.read().await;
        // Ids grow with insertion order.
        Ok(t.queries.iter().rev().find(|q| q.user_id == user_id).cloned())
    }

    async fn record_recommendation(&self, query_id: i64, intent: &str, recommendation: &str) -> Result<()> {
        let mut t = self.tables.write().await;
        let q = t
            .queries
            .iter_mut()
            .find(|q| q.id == query_id)
            .ok_or_else(|| ServiceError::Store(format!("spatial query {query_id} not found")))?;
        q.user_intent = intent.to_string();
        q.ai_recommendation = Some(recommendation.to_string());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
