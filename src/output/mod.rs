//! Output module
//!
//! Handles the staging file enriched events are written to before loading.

mod jsonl;

pub use jsonl::{write_jsonl, JsonlWriter};
