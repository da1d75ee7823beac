//! Hierarchical Sector Graph (HSG): a sector-partitioned associative memory
//! engine for AI agents.
//!
//! Memories are written into one of five sectors — episodic, semantic,
//! procedural, emotional, reflective — each with its own embedding and its
//! own decay rate. A fixed cross-sector resonance matrix lets a query in one
//! sector still surface strongly-related memories filed under another, and a
//! directed weighted waypoint graph between memories lets retrieval spread
//! activation beyond pure vector similarity. Salience decays on a dual-phase
//! curve (a fast initial forgetting curve plus a slow long-term floor) and
//! rises again on reinforcement, so memories that keep getting hit stay warm
//! while the rest cool, compress, and eventually fingerprint down to a
//! lightweight cold-storage representation.
//!
//! Module map:
//! - [`sector`] — the five-way partition and cross-sector resonance matrix.
//! - [`vector`] — the embedding blob codec and vector math primitives.
//! - [`embedding`] — the synthetic embedder, pluggable providers, and the
//!   tiered embedding router that fuses them.
//! - [`db`] — SQLite schema, migrations, and health checks.
//! - [`memory`] — storage, waypoints, deletion, decay, ingestion, retrieval,
//!   reflection, and per-user aggregates.
//! - [`config`] — configuration loading.
//! - [`error`] — the typed error taxonomy at the public API boundary.
//!
//! The HTTP transport (`server`) and CLI live in the binary crate, not here,
//! the same way the teacher keeps its MCP transport out of its library
//! surface.

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod sector;
pub mod vector;
