//! # tandem-store
//!
//! Client-side cache for the Tandem messaging engine.
//!
//! The crate holds no I/O: [`MessageStore`] keeps every conversation's
//! ordered, deduplicated timeline and [`ConversationListAggregator`] keeps the
//! persisted conversation list plus the current virtual conversation. Both
//! are owned by a single writer, the engine loop in `tandem-client`.

pub mod conversations;
pub mod messages;
pub mod models;

mod error;

pub use conversations::{aggregate, ConversationListAggregator, SnapshotResult};
pub use error::RecordError;
pub use messages::{MergeResult, MessageStore};
pub use models::*;
