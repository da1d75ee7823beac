//! Core data model (spec §3): `Memory`, `Vector`, `Waypoint`, `EmbedLog`,
//! and `UserProfile`.

use crate::sector::Sector;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub user_id: Option<String>,
    pub segment: i64,
    pub content: String,
    pub primary_sector: Sector,
    pub tags: Vec<String>,
    pub metadata: Json,
    pub salience: f64,
    pub decay_lambda: f64,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_seen_at: i64,
    pub version: i64,
    /// Present once the decay engine has compressed this memory's summary
    /// (spec §4.6); `None` for a fresh, uncompressed memory.
    pub summary: Option<String>,
    pub feedback_score: f64,
}

#[derive(Debug, Clone)]
pub struct StoredVector {
    pub memory_id: String,
    pub sector: Sector,
    pub user_id: Option<String>,
    pub vec_blob: Vec<u8>,
    pub dim: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    pub src_id: String,
    pub dst_id: String,
    pub user_id: Option<String>,
    pub weight: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedLogStatus {
    Pending,
    Completed,
    Failed,
}

impl EmbedLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedLogStatus::Pending => "pending",
            EmbedLogStatus::Completed => "completed",
            EmbedLogStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedLog {
    pub id: String,
    pub kind: String,
    pub status: EmbedLogStatus,
    pub created_at: i64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub summary: Option<String>,
    pub reflection_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Reserved metadata keys (spec §9): callers SHOULD NOT repurpose these.
pub mod reserved_keys {
    pub const IS_ROOT: &str = "is_root";
    pub const IS_CHILD: &str = "is_child";
    pub const SECTION_INDEX: &str = "section_index";
    pub const TOTAL_SECTIONS: &str = "total_sections";
    pub const PARENT_ID: &str = "parent_id";
    pub const SOURCE_URL: &str = "source_url";
    pub const INGESTION_STRATEGY: &str = "ingestion_strategy";
    pub const INGESTED_AT: &str = "ingested_at";
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
