//! Synthetic embedder (C2): a deterministic, dense, hashed-feature vector
//! generated from tokenized text, weighted per sector. No model weights or
//! network calls are involved — this is the always-available fallback tier
//! and the baseline fused into the hybrid/smart tiers.

use crate::sector::Sector;
use crate::vector::normalize;
use std::collections::HashMap;

/// Fixed seed for the secondary (mix-shift) hash, so `h2` is reproducible
/// across processes and platforms.
const H2_SEED: u64 = 0x9E3779B97F4A7C15;

/// FNV-1a-like 64-bit hash.
fn h1(key: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in key.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

/// Mix-shift secondary hash, seeded with a fixed constant.
fn h2(key: &str) -> u64 {
    let mut h = h1(key) ^ H2_SEED;
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51afd7ed558ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ceb9fe1a85ec53);
    h ^= h >> 33;
    h
}

fn bucket(hash: u64, dim: usize) -> usize {
    if dim.is_power_of_two() {
        (hash & (dim as u64 - 1)) as usize
    } else {
        (hash % dim as u64) as usize
    }
}

fn add_feature(out: &mut [f32], key: &str, weight: f32) {
    let dim = out.len();
    let hash1 = h1(key);
    let hash2 = h2(key);
    let sign = if hash1 % 2 == 0 { 1.0 } else { -1.0 };
    let amt = weight * sign;
    out[bucket(hash1, dim)] += amt;
    out[bucket(hash2, dim)] += amt * 0.5;
}

/// Canonical tokenization: lowercase, split on non-alphanumeric runs.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// A small, fixed synonym table used to expand the token multiset. Not
/// exhaustive by design — this is a deterministic enrichment step, not a
/// thesaurus.
fn synonyms(token: &str) -> &'static [&'static str] {
    match token {
        "good" => &["great", "positive"],
        "bad" => &["poor", "negative"],
        "big" => &["large", "huge"],
        "small" => &["tiny", "little"],
        "fast" => &["quick", "rapid"],
        "slow" => &["sluggish"],
        "happy" => &["glad", "pleased"],
        "sad" => &["unhappy", "down"],
        "start" => &["begin", "initiate"],
        "end" => &["finish", "conclude"],
        _ => &[],
    }
}

/// `gen_synth(text, sector) -> [f32; D]`. Identical `(text, sector)` always
/// yields bit-identical output.
pub fn gen_synth(text: &str, sector: Sector, dim: usize) -> Vec<f32> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        let val = 1.0 / (dim as f32).sqrt();
        return vec![val; dim];
    }

    let s = sector.as_str();
    let synth_weight = sector.synth_weight();

    // Expand tokens with the synonym set; E is the expanded multiset.
    let mut expanded: Vec<&str> = Vec::with_capacity(tokens.len() * 2);
    for t in &tokens {
        expanded.push(t.as_str());
        for syn in synonyms(t) {
            expanded.push(syn);
        }
    }
    let l = expanded.len() as f32;

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for t in &expanded {
        *counts.entry(t).or_insert(0) += 1;
    }

    let mut out = vec![0.0f32; dim];

    // Per-distinct-token tf-idf-weighted feature, plus character n-grams.
    for (&t, &c) in &counts {
        let tf = c as f32 / l;
        let idf = (1.0 + l / c as f32).ln();
        let w = (tf * idf + 1.0) * synth_weight;

        add_feature(&mut out, &format!("{s}|tok|{t}"), w);

        for gram in char_ngrams(t, 3) {
            add_feature(&mut out, &format!("{s}|ng3|{gram}"), 0.4 * w);
        }
        for gram in char_ngrams(t, 4) {
            add_feature(&mut out, &format!("{s}|ng4|{gram}"), 0.3 * w);
        }
    }

    // Positional bigrams/trigrams/skip-grams over the *original* token
    // sequence (not the synonym-expanded multiset).
    for (i, pair) in tokens.windows(2).enumerate() {
        let weight = 1.4 * synth_weight / (1.0 + 0.1 * i as f32);
        add_feature(&mut out, &format!("{s}|bg|{}_{}", pair[0], pair[1]), weight);
    }
    for triple in tokens.windows(3) {
        add_feature(
            &mut out,
            &format!("{s}|tg|{}_{}_{}", triple[0], triple[1], triple[2]),
            1.0 * synth_weight,
        );
    }
    let mut skip_count = 0;
    for (i, pair) in tokens.windows(3).enumerate() {
        if skip_count >= 20 {
            break;
        }
        add_feature(
            &mut out,
            &format!("{s}|skip1|{}_{}_{}", i, pair[0], pair[2]),
            0.7 * synth_weight,
        );
        skip_count += 1;
    }

    // Positional sinusoidal features for the first 50 tokens.
    let amplitude = 0.5 * synth_weight / (1.0 + l).ln().max(1e-6);
    for i in 0..tokens.len().min(50) {
        let phase = (i as f32 + 1.0) * 0.5;
        add_feature(&mut out, &format!("{s}|possin|{i}"), amplitude * phase.sin());
    }

    // Coarse length and density buckets.
    let len_bucket = (l + 1.0).log2().floor().min(10.0) as u32;
    add_feature(&mut out, &format!("{s}|lenb|{len_bucket}"), synth_weight);

    let distinct = counts.len() as f32;
    let density_bucket = (10.0 * distinct / l).floor() as u32;
    add_feature(&mut out, &format!("{s}|densb|{density_bucket}"), synth_weight);

    normalize(&mut out);
    out
}

fn char_ngrams(s: &str, n: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < n {
        return Vec::new();
    }
    (0..=chars.len() - n)
        .map(|i| chars[i..i + n].iter().collect())
        .collect()
}
