//! Retrieval engine (C8): vector shortlist, cross-sector resonance scoring,
//! spreading activation over the waypoint graph, energy thresholding, and
//! reinforcement on hit. Grounded in the teacher's `memory/search.rs` shape
//! (BM25/RRF fusion dropped — no full-text index in this data model) plus
//! spec §4.5's scoring pipeline.

use super::store::{reinforce_memory, REINFORCE_ETA};
use super::types::Memory;
use super::waypoints::outgoing;
use crate::sector::{resonance, Sector};
use crate::vector::{cosine, from_blob};
use anyhow::Result;
use rusqlite::{params, Connection};
use std::collections::HashMap;

/// Spreading activation decay per hop.
pub const ACTIVATION_GAMMA: f64 = 0.35;
/// Maximum hops walked from the seed set.
pub const ACTIVATION_MAX_HOPS: u32 = 3;
/// Weight of spreading activation in the final combined score.
pub const ACTIVATION_WEIGHT: f64 = 0.3;
/// Memories below this salience are dropped before scoring.
pub const MIN_SALIENCE: f64 = 0.01;
/// Seed set size for spreading activation.
const SEED_COUNT: usize = 5;

#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    pub memory: Memory,
    pub score: f64,
    pub cross_resonance_score: f64,
    pub activation: f64,
}

#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub user_id: Option<String>,
    pub sector: Option<Sector>,
}

struct Candidate {
    memory: Memory,
    sector: Sector,
    cross: f64,
}

fn tenant_clause(user_id: Option<&str>) -> (&'static str, Option<&str>) {
    if user_id.is_some() {
        ("(m.user_id = ?1)", user_id)
    } else {
        ("(m.user_id IS NULL)", None)
    }
}

/// Scan up to `candidate_window` vectors, scoring each against the query
/// vector for its own sector, and return the ones passing the salience
/// floor (spec §4.5 steps 1-3).
fn shortlist(
    conn: &Connection,
    query_vectors: &HashMap<usize, Vec<f32>>,
    query_sector: Sector,
    filter: &QueryFilter,
    candidate_window: usize,
) -> Result<Vec<Candidate>> {
    let (clause, bound_user) = tenant_clause(filter.user_id.as_deref());
    let sql = format!(
        "SELECT m.id, m.user_id, m.segment, m.content, m.primary_sector, m.tags, m.meta, \
         m.salience, m.decay_lambda, m.created_at, m.updated_at, m.last_seen_at, m.version, \
         m.summary, m.feedback_score, v.sector, v.vec_blob \
         FROM memories m JOIN vectors v ON v.memory_id = m.id \
         WHERE {clause} AND m.salience > ?2 \
         AND (?3 IS NULL OR m.primary_sector = ?3) \
         ORDER BY m.last_seen_at DESC LIMIT ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            bound_user,
            MIN_SALIENCE,
            filter.sector.map(|s| s.as_str()),
            candidate_window as i64
        ],
        |row| {
            let tags_json: String = row.get("tags")?;
            let meta_json: String = row.get("meta")?;
            let primary_sector: String = row.get("primary_sector")?;
            let vec_sector: String = row.get("sector")?;
            let blob: Vec<u8> = row.get("vec_blob")?;
            Ok((
                Memory {
                    id: row.get("id")?,
                    user_id: row.get("user_id")?,
                    segment: row.get("segment")?,
                    content: row.get("content")?,
                    primary_sector: primary_sector.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
                    tags: serde_json::from_str(&tags_json).unwrap_or_default(),
                    metadata: serde_json::from_str(&meta_json).unwrap_or(serde_json::Value::Null),
                    salience: row.get("salience")?,
                    decay_lambda: row.get("decay_lambda")?,
                    created_at: row.get("created_at")?,
                    updated_at: row.get("updated_at")?,
                    last_seen_at: row.get("last_seen_at")?,
                    version: row.get("version")?,
                    summary: row.get("summary")?,
                    feedback_score: row.get("feedback_score")?,
                },
                vec_sector,
                blob,
            ))
        },
    )?;

    let mut out = Vec::new();
    for row in rows {
        let (memory, vec_sector, blob) = row?;
        let vec_sector: Sector = vec_sector.parse()?;
        let Some(q) = query_vectors.get(&vec_sector.index()) else {
            continue;
        };
        let v = from_blob(&blob)?;
        let sim = cosine(q, &v) as f64;
        let cross = sim * resonance(vec_sector, query_sector);
        out.push(Candidate { memory, sector: vec_sector, cross });
    }
    Ok(out)
}

/// Spreading activation (spec §4.5 step 4): seed every candidate in `seeds`
/// with activation 1.0, then walk outgoing waypoints up to
/// `ACTIVATION_MAX_HOPS`. Each edge `(s,d,w)` transfers
/// `e = w * activation(s) * exp(-ACTIVATION_GAMMA)`; the activation at `d`
/// is `max(existing, e)`, not an accumulation.
fn spread_activation(
    conn: &Connection,
    seeds: &[String],
) -> Result<HashMap<String, f64>> {
    let decay = (-ACTIVATION_GAMMA).exp();
    let mut activation: HashMap<String, f64> = HashMap::new();
    let mut frontier: Vec<(String, f64)> = seeds.iter().map(|id| (id.clone(), 1.0)).collect();

    for _ in 0..ACTIVATION_MAX_HOPS {
        let mut hop: HashMap<String, f64> = HashMap::new();
        for (id, energy) in &frontier {
            if *energy < 1e-4 {
                continue;
            }
            for edge in outgoing(conn, id)? {
                let e = edge.weight * energy * decay;
                if e < 1e-4 {
                    continue;
                }
                let slot = hop.entry(edge.dst_id).or_insert(0.0);
                if e > *slot {
                    *slot = e;
                }
            }
        }
        if hop.is_empty() {
            break;
        }
        for (id, e) in &hop {
            let slot = activation.entry(id.clone()).or_insert(0.0);
            if *e > *slot {
                *slot = *e;
            }
        }
        frontier = hop.into_iter().collect();
    }
    Ok(activation)
}

/// `hsg_query`: embed the query for every sector touched by the shortlist,
/// score candidates, spread activation from the top seeds, apply the
/// adaptive energy threshold, and return up to `k` hydrated results
/// (spec §4.5).
pub async fn hsg_query(
    conn: &Connection,
    router: &crate::embedding::router::EmbeddingRouter,
    query_text: &str,
    query_sector: Sector,
    k: usize,
    filter: QueryFilter,
    base_threshold: f64,
    candidate_window: usize,
    reinforce_on_hit: bool,
) -> Result<Vec<RetrievedMemory>> {
    let mut query_vectors = HashMap::new();
    for &sector in crate::sector::ALL_SECTORS.iter() {
        let outcome = router.embed_for_sector(query_text, sector).await?;
        query_vectors.insert(sector.index(), outcome.vector);
    }

    let candidates = shortlist(conn, &query_vectors, query_sector, &filter, candidate_window)?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut scored: Vec<(Candidate, f64)> = candidates
        .into_iter()
        .map(|c| {
            let base = c.cross * c.memory.salience;
            (c, base)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let seeds: Vec<String> = scored.iter().take(SEED_COUNT).map(|(c, _)| c.memory.id.clone()).collect();
    let activation = spread_activation(conn, &seeds)?;

    let total_energy: f64 = scored.iter().map(|(_, s)| s).sum();
    let tau_eff = (base_threshold * (1.0 + (total_energy + 1.0).ln())).clamp(0.1, 0.9);

    let mut results: Vec<RetrievedMemory> = scored
        .into_iter()
        .map(|(c, base)| {
            let act = activation.get(&c.memory.id).copied().unwrap_or(0.0);
            let combined = base + ACTIVATION_WEIGHT * act;
            RetrievedMemory {
                memory: c.memory,
                score: combined,
                cross_resonance_score: c.cross,
                activation: act,
            }
        })
        .filter(|r| r.score >= tau_eff)
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(k);

    if reinforce_on_hit {
        for r in &results {
            reinforce_memory(conn, &r.memory.id, REINFORCE_ETA)?;
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::db::open_memory_database;
    use crate::embedding::router::EmbeddingRouter;
    use crate::memory::store::{add_memory, NewMemory};
    use crate::memory::waypoints::link;
    use serde_json::Value as Json;

    fn router() -> EmbeddingRouter {
        let mut cfg = RouterConfig::default();
        cfg.tier = "fast".into();
        cfg.vector_dim = 64;
        EmbeddingRouter::new(cfg).unwrap()
    }

    fn add(conn: &mut Connection, content: &str, sector: Sector, _router: &EmbeddingRouter) -> String {
        let vec = crate::embedding::synthetic::gen_synth(content, sector, 64);
        add_memory(
            conn,
            NewMemory {
                user_id: Some("u1"),
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

    #[tokio::test]
    async fn query_finds_closely_matching_memory() {
        let mut conn = open_memory_database().unwrap();
        let router = router();
        let id = add(&mut conn, "the quick brown fox jumps", Sector::Semantic, &router);

        let results = hsg_query(
            &conn,
            &router,
            "the quick brown fox jumps",
            Sector::Semantic,
            5,
            QueryFilter { user_id: Some("u1".into()), sector: None },
            0.0,
            100,
            false,
        )
        .await
        .unwrap();

        assert!(results.iter().any(|r| r.memory.id == id));
    }

    #[tokio::test]
    async fn query_respects_tenant_filter() {
        let mut conn = open_memory_database().unwrap();
        let router = router();
        add(&mut conn, "hello world", Sector::Semantic, &router);

        let results = hsg_query(
            &conn,
            &router,
            "hello world",
            Sector::Semantic,
            5,
            QueryFilter { user_id: Some("other-user".into()), sector: None },
            0.0,
            100,
            false,
        )
        .await
        .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn reinforce_on_hit_raises_salience() {
        let mut conn = open_memory_database().unwrap();
        let router = router();
        let id = add(&mut conn, "a memorable event happened", Sector::Episodic, &router);
        let before = crate::memory::store::get_memory(&conn, &id).unwrap().unwrap().salience;

        let _ = hsg_query(
            &conn,
            &router,
            "a memorable event happened",
            Sector::Episodic,
            5,
            QueryFilter { user_id: Some("u1".into()), sector: None },
            0.0,
            100,
            true,
        )
        .await
        .unwrap();

        let after = crate::memory::store::get_memory(&conn, &id).unwrap().unwrap().salience;
        assert!(after >= before);
    }

    #[tokio::test]
    async fn spreading_activation_boosts_linked_memory() {
        let mut conn = open_memory_database().unwrap();
        let router = router();
        let seed = add(&mut conn, "root topic about gardens", Sector::Semantic, &router);
        let linked = add(&mut conn, "completely unrelated filler text zzz", Sector::Procedural, &router);
        link(&conn, &seed, &linked, Some("u1"), 1.0).unwrap();

        let activation = spread_activation(&conn, &[seed.clone()]).unwrap();
        assert!(activation.get(&linked).copied().unwrap_or(0.0) > 0.0);
    }
}
