//! Search orchestration: parallel fan-out, deduplication, scoring, and
//! aggregation under partial failure.

pub mod dedup;
pub mod scoring;
pub mod search;

pub use dedup::{dedup_records, normalize_key};
pub use scoring::{quality_score, score_and_rank};
pub use search::{aggregate, SearchOrchestrator};
