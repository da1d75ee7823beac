//! Decay & compression engine (C7): dual-phase retention, tiered vector
//! compression, deep-cold fingerprinting, and opportunistic regeneration on
//! query hit. Sweep pagination/quiescence idiom grounded in the teacher's
//! `memory/maintenance.rs::apply_decay`.

use crate::vector::{compress, from_blob, normalize, to_blob, MIN_DIM_FLOOR};
use anyhow::Result;
use rusqlite::{params, Connection};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const LAMBDA_FAST: f64 = 0.015;
pub const LAMBDA_SLOW: f64 = 0.002;
pub const THETA: f64 = 0.4;

/// Retention factor `R(t) = exp(-lambda1*t) + theta*exp(-lambda2*t)`,
/// clamped to [0,1]. `t` is in days.
pub fn retention(t_days: f64) -> f64 {
    let r = (-LAMBDA_FAST * t_days).exp() + THETA * (-LAMBDA_SLOW * t_days).exp();
    r.clamp(0.0, 1.0)
}

fn fnv1a64(s: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

/// 32-dim deterministic fingerprint derived from `id + summary/content`
/// (FNV seed, xorshift64 expansion, L2-normalized) — the final cold-storage
/// representation once a memory goes "deep cold" (spec §4.6).
pub fn fingerprint(seed_text: &str) -> Vec<f32> {
    let mut h = fnv1a64(seed_text).max(1);
    let mut out = Vec::with_capacity(32);
    for _ in 0..32 {
        h ^= h << 13;
        h ^= h >> 7;
        h ^= h << 17;
        let v = (h as i64 as f64 / i64::MAX as f64) as f32;
        out.push(v);
    }
    normalize(&mut out);
    out
}

fn truncate_summary(content: &str, tier: CompressionTier) -> String {
    match tier {
        CompressionTier::Warm => content.to_string(),
        CompressionTier::Cold => {
            let truncated: String = content.chars().take(200).collect();
            if content.chars().count() > 200 {
                format!("{truncated}…")
            } else {
                truncated
            }
        }
        CompressionTier::DeepCold => top_keywords(content, 3).join(", "),
    }
}

fn top_keywords(content: &str, k: usize) -> Vec<String> {
    use std::collections::HashMap;
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in content
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
    {
        *counts.entry(word.to_string()).or_insert(0) += 1;
    }
    let mut pairs: Vec<(String, usize)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    pairs.into_iter().take(k).map(|(w, _)| w).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompressionTier {
    Warm,
    Cold,
    DeepCold,
}

fn tier_for(r: f64) -> CompressionTier {
    if r < 0.3 {
        CompressionTier::DeepCold
    } else if r < 0.7 {
        CompressionTier::Cold
    } else {
        CompressionTier::Warm
    }
}

#[derive(Debug, Default)]
pub struct SweepStats {
    pub scanned: u64,
    pub changed: u64,
    pub compressed: u64,
    pub fingerprinted: u64,
    pub skipped_quiescence: bool,
}

/// Run one decay sweep over all memories, in pages of up to `page_size`
/// rows. Skipped entirely if `active_queries` is non-zero at the start
/// (counter-based quiescence check, spec §4.6/§5).
pub async fn run_sweep(
    conn: &Connection,
    page_size: i64,
    yield_every: u64,
    min_vec_dim: usize,
    now_ms: i64,
    active_queries: &AtomicUsize,
) -> Result<SweepStats> {
    let mut stats = SweepStats::default();
    if active_queries.load(Ordering::SeqCst) > 0 {
        stats.skipped_quiescence = true;
        return Ok(stats);
    }

    let mut offset = 0i64;
    loop {
        let mut stmt = conn.prepare(
            "SELECT id, salience, last_seen_at, content, summary FROM memories \
             ORDER BY id LIMIT ?1 OFFSET ?2",
        )?;
        let rows: Vec<(String, f64, i64, String, Option<String>)> = stmt
            .query_map(params![page_size, offset], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if rows.is_empty() {
            break;
        }

        for (id, salience, last_seen_at, content, summary) in rows {
            stats.scanned += 1;
            let t_days = ((now_ms - last_seen_at).max(0) as f64) / 86_400_000.0;
            let r = retention(t_days);
            let new_salience = (salience * r).clamp(0.0, 1.0);
            let changed = (new_salience - salience).abs() > 0.001;

            if changed {
                conn.execute(
                    "UPDATE memories SET salience = ?1, updated_at = ?2 WHERE id = ?3",
                    params![new_salience, now_ms, id],
                )?;
                stats.changed += 1;
            }

            let tier = tier_for(r);
            if tier != CompressionTier::Warm {
                let new_summary = truncate_summary(summary.as_deref().unwrap_or(&content), tier);
                conn.execute(
                    "UPDATE memories SET summary = ?1, updated_at = ?2 WHERE id = ?3",
                    params![new_summary, now_ms, id],
                )?;

                let mut vstmt = conn.prepare(
                    "SELECT sector, vec_blob, dim FROM vectors WHERE memory_id = ?1",
                )?;
                let vecs: Vec<(String, Vec<u8>, i64)> = vstmt
                    .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                for (sector, blob, dim) in vecs {
                    if tier == CompressionTier::DeepCold {
                        let fp = fingerprint(&format!("{id}|{content}"));
                        conn.execute(
                            "UPDATE vectors SET vec_blob = ?1, dim = ?2 WHERE memory_id = ?3 AND sector = ?4",
                            params![to_blob(&fp), fp.len() as i64, id, sector],
                        )?;
                        stats.fingerprinted += 1;
                    } else if dim as usize > min_vec_dim {
                        let target = ((dim as f64 * r).floor() as usize).clamp(min_vec_dim, dim as usize);
                        if target < dim as usize {
                            let v = from_blob(&blob)?;
                            let compressed = compress(&v, target.max(MIN_DIM_FLOOR))?;
                            conn.execute(
                                "UPDATE vectors SET vec_blob = ?1, dim = ?2 WHERE memory_id = ?3 AND sector = ?4",
                                params![to_blob(&compressed), compressed.len() as i64, id, sector],
                            )?;
                            stats.compressed += 1;
                        }
                    }
                }
            }

            if stats.scanned % yield_every == 0 {
                tokio::task::yield_now().await;
            }
        }

        offset += page_size;
    }

    Ok(stats)
}

/// Opportunistic regeneration on query hit (spec §4.6): if a matched
/// vector's dim is at or below the floor, the caller SHOULD re-embed and
/// store fresh vectors. This just answers the predicate; the actual
/// re-embedding happens in `memory::retrieval` since it needs the router.
pub fn needs_regeneration(dim: usize) -> bool {
    dim <= MIN_DIM_FLOOR
}
