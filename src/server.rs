//! HTTP server (spec §6): axum routes over the memory, retrieval, ingestion,
//! and user-aggregate operations. Shared-state wiring follows the teacher's
//! `server.rs::setup_shared_state` pattern; the MCP/rmcp transport is
//! replaced by a plain HTTP surface per this crate's external interface.

use crate::config::HsgConfig;
use crate::embedding::router::EmbeddingRouter;
use crate::error::{HsgError, Result as HsgResult};
use crate::memory::retrieval::{hsg_query, QueryFilter, RetrievedMemory};
use crate::memory::store::{add_memory, get_memory, list_memories, reinforce_memory, update_memory, NewMemory, REINFORCE_ETA};
use crate::memory::types::Memory;
use crate::memory::{forget, ingest, reflection, users};
use crate::sector::{classify, Sector};
use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;

#[derive(Clone)]
pub struct AppState {
    // Async mutex, not std::sync::Mutex: several handlers (query, ingest)
    // hold the connection across an embedding call's `.await`.
    pub db: Arc<TokioMutex<rusqlite::Connection>>,
    pub router: Arc<EmbeddingRouter>,
    pub cfg: Arc<HsgConfig>,
    pub active_queries: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(cfg: HsgConfig) -> anyhow::Result<Self> {
        let db_path = cfg.resolved_db_path();
        let conn = crate::db::open_database(&db_path)?;
        tracing::info!(db = %db_path.display(), "database ready");

        let router = EmbeddingRouter::new(cfg.router.clone()).context("failed to build embedding router")?;

        Ok(Self {
            db: Arc::new(TokioMutex::new(conn)),
            router: Arc::new(router),
            cfg: Arc::new(cfg),
            active_queries: Arc::new(AtomicUsize::new(0)),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/memory/add", post(add_memory_handler))
        .route("/memory/query", post(query_handler))
        .route("/memory/reinforce", post(reinforce_handler))
        .route("/memory/all", get(list_memories_handler))
        .route("/memory/ingest", post(ingest_handler))
        .route("/memory/ingest/url", post(ingest_url_handler))
        .route("/memory/{id}", get(get_memory_handler).patch(patch_memory_handler).delete(delete_memory_handler))
        .route("/users/{id}", get(get_user_handler))
        .route("/users/{id}/memories", get(user_memories_handler).delete(wipe_user_handler))
        .route("/users/{id}/summary/regenerate", post(regenerate_summary_handler))
        .with_state(state)
}

/// Runs the HTTP server until ctrl-c, binding to `cfg.server.host:port`
/// (spec §5 process model).
pub async fn serve(cfg: HsgConfig) -> anyhow::Result<()> {
    let host = cfg.server.host.clone();
    let port = cfg.server.port;
    let bind_addr = format!("{host}:{port}");

    let state = AppState::new(cfg)?;
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "hsg server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
            tracing::info!("shutting down hsg server");
        })
        .await?;

    Ok(())
}

fn parse_sector(s: &str) -> HsgResult<Sector> {
    Sector::from_str(s).map_err(|e| HsgError::InvalidRequest(e.to_string()))
}

fn require_tenant(memory: &Memory, requested: Option<&str>) -> HsgResult<()> {
    if memory.user_id.as_deref() != requested {
        return Err(HsgError::Forbidden(format!(
            "memory {} does not belong to the requested tenant",
            memory.id
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct AddMemoryRequest {
    pub user_id: Option<String>,
    pub content: String,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<JsonValue>,
    pub sector: Option<String>,
    /// When two or more sectors are given, embed `content` in each of them
    /// via [`EmbeddingRouter::embed_multi_sector`] instead of just
    /// `sector` (spec §3: a memory "MAY have additional vectors in other
    /// sectors when multi-sector embedding is requested").
    pub sectors: Option<Vec<String>>,
}

async fn add_memory_handler(
    State(state): State<AppState>,
    Json(req): Json<AddMemoryRequest>,
) -> HsgResult<Json<Memory>> {
    if req.content.trim().is_empty() {
        return Err(HsgError::InvalidRequest("content must not be empty".into()));
    }
    if req.content.len() > state.cfg.ingest.max_payload_size {
        return Err(HsgError::PayloadTooLarge(format!(
            "content of {} bytes exceeds max_payload_size of {} bytes",
            req.content.len(),
            state.cfg.ingest.max_payload_size
        )));
    }
    let sector = match &req.sector {
        Some(s) => parse_sector(s)?,
        None => classify(&req.content),
    };

    let extra_sectors = req
        .sectors
        .as_ref()
        .map(|names| names.iter().map(|s| parse_sector(s)).collect::<HsgResult<Vec<Sector>>>())
        .transpose()?
        .filter(|s| s.len() > 1);

    let (vectors, mut conn) = if let Some(sectors) = extra_sectors {
        let conn = state.db.lock().await;
        let outcomes = state
            .router
            .embed_multi_sector(&conn, &req.content, &sectors, None)
            .await
            .map_err(HsgError::from_router_error)?;
        (outcomes.into_iter().map(|(s, o)| (s, o.vector)).collect::<Vec<_>>(), conn)
    } else {
        let outcome = state
            .router
            .embed_for_sector(&req.content, sector)
            .await
            .map_err(HsgError::from_router_error)?;
        (vec![(sector, outcome.vector)], state.db.lock().await)
    };

    let memory = add_memory(
        &mut conn,
        NewMemory {
            user_id: req.user_id.as_deref(),
            content: &req.content,
            tags: req.tags.unwrap_or_default(),
            metadata: req.metadata.unwrap_or(JsonValue::Null),
            primary_sector: sector,
            segment: 0,
        },
        &vectors,
    )?;
    Ok(Json(memory))
}

#[derive(Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub sector: Option<String>,
    pub k: Option<usize>,
    pub user_id: Option<String>,
}

#[derive(Serialize)]
pub struct QueryResultItem {
    pub memory: Memory,
    pub score: f64,
    pub cross_resonance_score: f64,
    pub activation: f64,
}

impl From<RetrievedMemory> for QueryResultItem {
    fn from(r: RetrievedMemory) -> Self {
        Self {
            memory: r.memory,
            score: r.score,
            cross_resonance_score: r.cross_resonance_score,
            activation: r.activation,
        }
    }
}

async fn query_handler(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> HsgResult<Json<Vec<QueryResultItem>>> {
    let sector = match &req.sector {
        Some(s) => parse_sector(s)?,
        None => classify(&req.query),
    };

    state.active_queries.fetch_add(1, Ordering::SeqCst);
    let result = {
        let conn = state.db.lock().await;
        hsg_query(
            &conn,
            &state.router,
            &req.query,
            sector,
            req.k.unwrap_or(10),
            QueryFilter { user_id: req.user_id.clone(), sector: None },
            state.cfg.retrieval.base_threshold,
            state.cfg.retrieval.candidate_window,
            state.cfg.retrieval.decay_reinforce_on_query,
        )
        .await
    };
    state.active_queries.fetch_sub(1, Ordering::SeqCst);

    let results = result.map_err(HsgError::from_router_error)?;
    Ok(Json(results.into_iter().map(QueryResultItem::from).collect()))
}

#[derive(Deserialize)]
pub struct ReinforceRequest {
    pub id: String,
}

async fn reinforce_handler(
    State(state): State<AppState>,
    Json(req): Json<ReinforceRequest>,
) -> HsgResult<Json<JsonValue>> {
    let conn = state.db.lock().await;
    let salience = reinforce_memory(&conn, &req.id, REINFORCE_ETA)?
        .ok_or_else(|| HsgError::NotFound(format!("memory {} not found", req.id)))?;
    Ok(Json(serde_json::json!({ "id": req.id, "salience": salience })))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub user_id: Option<String>,
    pub sector: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

async fn list_memories_handler(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> HsgResult<Json<Vec<Memory>>> {
    if state.cfg.storage.strict_tenant && q.user_id.is_none() {
        return Err(HsgError::InvalidRequest("user_id is required in strict-tenant mode".into()));
    }
    let sector = q.sector.as_deref().map(parse_sector).transpose()?;
    let conn = state.db.lock().await;
    let memories = list_memories(&conn, q.user_id.as_deref(), sector, q.limit.unwrap_or(100), q.offset.unwrap_or(0))?;
    Ok(Json(memories))
}

#[derive(Deserialize)]
pub struct TenantQuery {
    pub user_id: Option<String>,
}

async fn get_memory_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<TenantQuery>,
) -> HsgResult<Json<Memory>> {
    let conn = state.db.lock().await;
    let memory = get_memory(&conn, &id)?.ok_or_else(|| HsgError::NotFound(format!("memory {id} not found")))?;
    require_tenant(&memory, q.user_id.as_deref())?;
    Ok(Json(memory))
}

#[derive(Deserialize)]
pub struct UpdateMemoryRequest {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<JsonValue>,
    pub user_id: Option<String>,
}

async fn patch_memory_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateMemoryRequest>,
) -> HsgResult<Json<Memory>> {
    let existing = {
        let conn = state.db.lock().await;
        get_memory(&conn, &id)?.ok_or_else(|| HsgError::NotFound(format!("memory {id} not found")))?
    };
    require_tenant(&existing, req.user_id.as_deref())?;

    let new_vectors = if let Some(content) = &req.content {
        let outcome = state
            .router
            .embed_for_sector(content, existing.primary_sector)
            .await
            .map_err(HsgError::from_router_error)?;
        vec![(existing.primary_sector, outcome.vector)]
    } else {
        vec![]
    };

    let mut conn = state.db.lock().await;
    let updated = update_memory(
        &mut conn,
        &id,
        req.content.as_deref(),
        req.tags,
        req.metadata,
        &new_vectors,
    )?;
    Ok(Json(updated))
}

async fn delete_memory_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<TenantQuery>,
) -> HsgResult<Json<JsonValue>> {
    let mut conn = state.db.lock().await;
    let existing = get_memory(&conn, &id)?.ok_or_else(|| HsgError::NotFound(format!("memory {id} not found")))?;
    require_tenant(&existing, q.user_id.as_deref())?;
    let deleted = forget::delete_memory(&mut conn, &id)?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

#[derive(Deserialize)]
pub struct IngestRequestBody {
    pub user_id: Option<String>,
    pub content: String,
    pub markdown: Option<bool>,
    pub metadata: Option<JsonValue>,
}

async fn ingest_handler(
    State(state): State<AppState>,
    Json(req): Json<IngestRequestBody>,
) -> HsgResult<Json<JsonValue>> {
    let content_type = if req.markdown.unwrap_or(false) {
        ingest::ContentType::Markdown
    } else {
        ingest::ContentType::Text
    };
    let mut conn = state.db.lock().await;
    let result = ingest::ingest_document(
        &mut conn,
        &state.router,
        ingest::IngestRequest {
            content_type,
            data: &req.content,
            user_id: req.user_id.as_deref(),
            metadata: req.metadata,
        },
        &state.cfg.ingest,
    )
    .await
    .map_err(HsgError::from_ingest_error)?;
    Ok(Json(serde_json::json!({
        "root_id": result.root_id,
        "child_ids": result.child_ids,
        "strategy": result.strategy,
        "child_count": result.child_count,
        "extraction_meta": result.extraction_meta,
    })))
}

#[derive(Deserialize)]
pub struct IngestUrlRequestBody {
    pub user_id: Option<String>,
    pub url: String,
    pub metadata: Option<JsonValue>,
}

async fn ingest_url_handler(
    State(state): State<AppState>,
    Json(req): Json<IngestUrlRequestBody>,
) -> HsgResult<Json<JsonValue>> {
    let mut conn = state.db.lock().await;
    let result = ingest::ingest_document(
        &mut conn,
        &state.router,
        ingest::IngestRequest {
            content_type: ingest::ContentType::Url,
            data: &req.url,
            user_id: req.user_id.as_deref(),
            metadata: req.metadata,
        },
        &state.cfg.ingest,
    )
    .await
    .map_err(HsgError::from_ingest_error)?;
    Ok(Json(serde_json::json!({
        "root_id": result.root_id,
        "child_ids": result.child_ids,
        "strategy": result.strategy,
        "child_count": result.child_count,
        "extraction_meta": result.extraction_meta,
    })))
}

async fn get_user_handler(State(state): State<AppState>, Path(user_id): Path<String>) -> HsgResult<Json<JsonValue>> {
    let conn = state.db.lock().await;
    let profile = users::get_user_profile(&conn, &user_id)?;
    let stats = users::user_stats(&conn, &user_id)?;
    Ok(Json(serde_json::json!({
        "profile": profile,
        "stats": {
            "memory_count": stats.memory_count,
            "waypoint_count": stats.waypoint_count,
            "by_sector": stats.by_sector,
            "avg_salience": stats.avg_salience,
            "oldest_created_at": stats.oldest_created_at,
            "newest_created_at": stats.newest_created_at,
        },
    })))
}

async fn user_memories_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(q): Query<ListQuery>,
) -> HsgResult<Json<Vec<Memory>>> {
    let sector = q.sector.as_deref().map(parse_sector).transpose()?;
    let conn = state.db.lock().await;
    let memories = list_memories(&conn, Some(&user_id), sector, q.limit.unwrap_or(100), q.offset.unwrap_or(0))?;
    Ok(Json(memories))
}

async fn wipe_user_handler(State(state): State<AppState>, Path(user_id): Path<String>) -> HsgResult<Json<JsonValue>> {
    let mut conn = state.db.lock().await;
    let removed = forget::wipe_user(&mut conn, &user_id)?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

async fn regenerate_summary_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> HsgResult<Json<JsonValue>> {
    let conn = state.db.lock().await;
    let summary = reflection::run_reflection(&conn, &user_id)?;
    Ok(Json(serde_json::json!({ "summary": summary })))
}

/// Spawns the background decay sweep loop, waking on `interval_secs` and
/// respecting `active_queries` quiescence (spec §5 runtime mapping).
pub fn spawn_decay_loop(state: AppState, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let now = crate::memory::types::now_ms();
            let page_size = state.cfg.decay.page_size as i64;
            let yield_every = state.cfg.decay.yield_every as u64;
            let min_dim = state.cfg.router.min_vec_dim;
            let result = {
                let conn = state.db.lock().await;
                crate::memory::decay::run_sweep(&conn, page_size, yield_every, min_dim, now, &state.active_queries).await
            };
            match result {
                Ok(stats) => tracing::info!(?stats, "decay sweep complete"),
                Err(e) => tracing::error!(error = %e, "decay sweep failed"),
            }
        }
    })
}
