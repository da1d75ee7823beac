#![allow(dead_code)]

use hsg::config::RouterConfig;
use hsg::db::open_memory_database;
use hsg::embedding::router::EmbeddingRouter;
use hsg::memory::store::{add_memory, NewMemory};
use hsg::sector::Sector;
use rusqlite::Connection;
use serde_json::Value as Json;

/// A fast-tier router (synthetic embeddings only) for tests that don't care
/// about provider/fusion behavior.
pub fn fast_router(dim: usize) -> EmbeddingRouter {
    let mut cfg = RouterConfig::default();
    cfg.tier = "fast".into();
    cfg.vector_dim = dim;
    EmbeddingRouter::new(cfg).unwrap()
}

pub fn memory_db() -> Connection {
    open_memory_database().unwrap()
}

/// Adds a memory with a synthetic vector for `sector`, returning its id.
pub fn add(conn: &mut Connection, user_id: Option<&str>, content: &str, sector: Sector) -> String {
    let vec = hsg::embedding::synthetic::gen_synth(content, sector, 64);
    add_memory(
        conn,
        NewMemory {
            user_id,
            content,
            tags: vec![],
            metadata: Json::Null,
            primary_sector: sector,
            segment: 0,
        },
        &[(sector, vec)],
    )
    .unwrap()
    .id
}
