//! Reflection (C9): periodic per-user clustering and summary generation.
//! Spec-novel; the periodic-sweep idiom (page through memories, do bounded
//! work, write back) is grounded in the teacher's `memory/maintenance.rs`
//! sweep shape.

use super::types::Memory;
use super::users::upsert_summary;
use crate::sector::Sector;
use anyhow::Result;
use rusqlite::{params, Connection};
use std::collections::HashMap;

/// Cosine threshold above which two memories are folded into the same
/// cluster.
pub const CLUSTER_THRESHOLD: f32 = 0.75;
/// Memories considered per reflection pass.
pub const REFLECTION_WINDOW: i64 = 100;

struct Cluster {
    members: Vec<usize>,
    centroid: Vec<f32>,
}

fn bag_of_words(text: &str, vocab: &HashMap<String, usize>) -> Vec<f32> {
    let mut v = vec![0.0f32; vocab.len()];
    for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        if let Some(&idx) = vocab.get(token) {
            v[idx] += 1.0;
        }
    }
    crate::vector::normalize(&mut v);
    v
}

fn build_vocab(texts: &[&str]) -> HashMap<String, usize> {
    let mut vocab = HashMap::new();
    for text in texts {
        for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let next = vocab.len();
            vocab.entry(token.to_string()).or_insert(next);
        }
    }
    vocab
}

fn cluster_memories(memories: &[Memory]) -> Vec<Cluster> {
    let texts: Vec<&str> = memories.iter().map(|m| m.content.as_str()).collect();
    let vocab = build_vocab(&texts);
    let vectors: Vec<Vec<f32>> = texts.iter().map(|t| bag_of_words(t, &vocab)).collect();

    let mut clusters: Vec<Cluster> = Vec::new();
    for (i, v) in vectors.iter().enumerate() {
        let mut best: Option<(usize, f32)> = None;
        for (ci, cluster) in clusters.iter().enumerate() {
            let sim = crate::vector::cosine(v, &cluster.centroid);
            if sim >= CLUSTER_THRESHOLD && best.map(|(_, b)| sim > b).unwrap_or(true) {
                best = Some((ci, sim));
            }
        }
        match best {
            Some((ci, _)) => {
                let cluster = &mut clusters[ci];
                cluster.members.push(i);
                let n = cluster.members.len() as f32;
                for (c, x) in cluster.centroid.iter_mut().zip(v.iter()) {
                    *c += (*x - *c) / n;
                }
            }
            None => clusters.push(Cluster {
                members: vec![i],
                centroid: v.clone(),
            }),
        }
    }
    clusters
}

fn cluster_salience(cluster: &Cluster, memories: &[Memory], now_ms: i64) -> f64 {
    let n = cluster.members.len() as f64;
    let newest = cluster
        .members
        .iter()
        .map(|&i| memories[i].last_seen_at)
        .max()
        .unwrap_or(now_ms);
    let age_days = ((now_ms - newest).max(0) as f64) / 86_400_000.0;
    let recency = (1.0 - age_days / 30.0).clamp(0.0, 1.0);
    let has_emotional = cluster
        .members
        .iter()
        .any(|&i| memories[i].primary_sector == Sector::Emotional);

    0.6 * (n / 10.0).min(1.0) + 0.3 * recency + 0.1 * if has_emotional { 1.0 } else { 0.0 }
}

fn summarize_cluster(cluster: &Cluster, memories: &[Memory]) -> String {
    let mut members: Vec<&Memory> = cluster.members.iter().map(|&i| &memories[i]).collect();
    members.sort_by(|a, b| b.salience.partial_cmp(&a.salience).unwrap_or(std::cmp::Ordering::Equal));
    let snippets: Vec<String> = members
        .iter()
        .take(3)
        .map(|m| {
            let s: String = m.content.chars().take(80).collect();
            s
        })
        .collect();
    snippets.join("; ")
}

fn load_recent_memories(conn: &Connection, user_id: &str) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, segment, content, primary_sector, tags, meta, salience, \
         decay_lambda, created_at, updated_at, last_seen_at, version, summary, feedback_score \
         FROM memories WHERE user_id = ?1 ORDER BY last_seen_at DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, REFLECTION_WINDOW], |row| {
        let tags_json: String = row.get("tags")?;
        let meta_json: String = row.get("meta")?;
        let sector: String = row.get("primary_sector")?;
        Ok(Memory {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            segment: row.get("segment")?,
            content: row.get("content")?,
            primary_sector: sector.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
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
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Runs one reflection pass for `user_id`: clusters up to the last
/// `REFLECTION_WINDOW` memories by bag-of-words cosine similarity, scores
/// each cluster, and writes a summary built from the highest-salience
/// cluster to `users.summary`. Returns `None` if there are too few
/// memories to reflect on.
pub fn run_reflection(conn: &Connection, user_id: &str) -> Result<Option<String>> {
    let memories = load_recent_memories(conn, user_id)?;
    if memories.len() < 2 {
        return Ok(None);
    }

    let now = super::types::now_ms();
    let clusters = cluster_memories(&memories);
    let best = clusters
        .iter()
        .max_by(|a, b| {
            cluster_salience(a, &memories, now)
                .partial_cmp(&cluster_salience(b, &memories, now))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .expect("at least one cluster exists when memories is non-empty");

    let summary = summarize_cluster(best, &memories);
    upsert_summary(conn, user_id, &summary)?;
    Ok(Some(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::memory::store::{add_memory, NewMemory};
    use crate::memory::users::get_user_profile;
    use serde_json::Value as Json;

    fn add(conn: &mut Connection, content: &str, sector: Sector) {
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
            &[(sector, crate::embedding::synthetic::gen_synth(content, sector, 64))],
        )
        .unwrap();
    }

    #[test]
    fn reflection_is_none_with_too_few_memories() {
        let mut conn = open_memory_database().unwrap();
        add(&mut conn, "only one memory", Sector::Semantic);
        assert!(run_reflection(&conn, "u1").unwrap().is_none());
    }

    #[test]
    fn reflection_clusters_and_writes_summary() {
        let mut conn = open_memory_database().unwrap();
        add(&mut conn, "gardening tips for roses and tulips", Sector::Semantic);
        add(&mut conn, "gardening advice about roses and soil", Sector::Semantic);
        add(&mut conn, "completely unrelated topic about rockets", Sector::Procedural);

        let summary = run_reflection(&conn, "u1").unwrap();
        assert!(summary.is_some());
        let profile = get_user_profile(&conn, "u1").unwrap().unwrap();
        assert_eq!(profile.reflection_count, 1);
        assert!(profile.summary.is_some());
    }
}
