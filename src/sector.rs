//! Sector classification (C5): the five-way partition of memories and
//! vectors, and the fixed cross-sector resonance matrix.

use std::fmt;
use std::str::FromStr;

/// One of the five memory sectors. Order here fixes the cross-sector
/// matrix indices and MUST NOT change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    Episodic,
    Semantic,
    Procedural,
    Emotional,
    Reflective,
}

pub const ALL_SECTORS: [Sector; 5] = [
    Sector::Episodic,
    Sector::Semantic,
    Sector::Procedural,
    Sector::Emotional,
    Sector::Reflective,
];

impl Sector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sector::Episodic => "episodic",
            Sector::Semantic => "semantic",
            Sector::Procedural => "procedural",
            Sector::Emotional => "emotional",
            Sector::Reflective => "reflective",
        }
    }

    /// Index into the cross-sector matrix and the synthetic embedder's
    /// per-sector weight table.
    pub fn index(&self) -> usize {
        match self {
            Sector::Episodic => 0,
            Sector::Semantic => 1,
            Sector::Procedural => 2,
            Sector::Emotional => 3,
            Sector::Reflective => 4,
        }
    }

    /// Per-sector weight `S` used by the synthetic embedder (spec §4.2).
    pub fn synth_weight(&self) -> f32 {
        match self {
            Sector::Episodic => 1.3,
            Sector::Semantic => 1.0,
            Sector::Procedural => 1.2,
            Sector::Emotional => 1.4,
            Sector::Reflective => 0.9,
        }
    }

    /// Sector-aware fusion weights `(alpha_synth, alpha_sem)` for the
    /// hybrid/smart router tiers (spec §4.3).
    pub fn fusion_weights(&self) -> (f32, f32) {
        match self {
            Sector::Episodic => (0.65, 0.35),
            Sector::Semantic => (0.6, 0.4),
            Sector::Procedural => (0.55, 0.45),
            Sector::Emotional => (0.58, 0.42),
            Sector::Reflective => (0.62, 0.38),
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "episodic" => Ok(Sector::Episodic),
            "semantic" => Ok(Sector::Semantic),
            "procedural" => Ok(Sector::Procedural),
            "emotional" => Ok(Sector::Emotional),
            "reflective" => Ok(Sector::Reflective),
            other => anyhow::bail!("unknown sector {other:?}"),
        }
    }
}

/// Full 5x5 symmetric cross-sector resonance matrix, rows/cols in order
/// episodic, semantic, procedural, emotional, reflective.
pub const CROSS_SECTOR_MATRIX: [[f64; 5]; 5] = [
    [1.0, 0.7, 0.3, 0.6, 0.6],
    [0.7, 1.0, 0.4, 0.7, 0.8],
    [0.3, 0.4, 1.0, 0.5, 0.2],
    [0.6, 0.7, 0.5, 1.0, 0.8],
    [0.6, 0.8, 0.2, 0.8, 1.0],
];

/// Cross-sector resonance `M[a, b]`.
pub fn resonance(a: Sector, b: Sector) -> f64 {
    CROSS_SECTOR_MATRIX[a.index()][b.index()]
}

/// Rule-based classifier: maps raw text to its primary sector. The precise
/// rules are implementation-defined; this one scans for sector-indicative
/// keywords with a priority order, falling back to `semantic`.
pub fn classify(text: &str) -> Sector {
    let lower = text.to_lowercase();

    let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has_any(&[
        "felt", "feel", "feeling", "happy", "sad", "angry", "afraid", "anxious", "love",
        "hate", "excited", "scared", "joy", "grief",
    ]) {
        return Sector::Emotional;
    }
    if has_any(&[
        "step 1", "first,", "then,", "how to", "procedure", "instructions", "recipe",
        "algorithm", "configure", "install",
    ]) {
        return Sector::Procedural;
    }
    if has_any(&[
        "yesterday", "today", "this morning", "last week", "i went", "i saw", "i met",
        "at ", "on monday", "on tuesday",
    ]) {
        return Sector::Episodic;
    }
    if has_any(&["reflecting on", "in retrospect", "looking back", "i realize", "summary:"]) {
        return Sector::Reflective;
    }
    Sector::Semantic
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_is_symmetric() {
        for i in 0..5 {
            for j in 0..5 {
                assert_eq!(CROSS_SECTOR_MATRIX[i][j], CROSS_SECTOR_MATRIX[j][i]);
            }
        }
    }

    #[test]
    fn matrix_diagonal_is_one() {
        for i in 0..5 {
            assert_eq!(CROSS_SECTOR_MATRIX[i][i], 1.0);
        }
    }

    #[test]
    fn resonance_matches_glossary_values() {
        assert_eq!(resonance(Sector::Episodic, Sector::Semantic), 0.7);
        assert_eq!(resonance(Sector::Semantic, Sector::Reflective), 0.8);
        assert_eq!(resonance(Sector::Procedural, Sector::Emotional), 0.5);
    }

    #[test]
    fn classify_detects_emotional() {
        assert_eq!(classify("I felt so happy today"), Sector::Emotional);
    }

    #[test]
    fn classify_falls_back_to_semantic() {
        assert_eq!(classify("The capital of France is Paris"), Sector::Semantic);
    }

    #[test]
    fn sector_str_round_trip() {
        for s in ALL_SECTORS {
            assert_eq!(s.as_str().parse::<Sector>().unwrap(), s);
        }
    }
}
