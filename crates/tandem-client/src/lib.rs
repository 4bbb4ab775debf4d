//! # tandem-client
//!
//! The Tandem sync engine: a single-writer loop that keeps conversations,
//! timelines and match gating in step with the REST service and the push
//! channel, plus the attachment staging used by the compose box.
//!
//! Start it with [`spawn_engine`] and drive it through [`EngineHandle`].

pub mod compose;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod handle;
pub mod scheduler;
pub mod staging;

pub use compose::ComposeSession;
pub use config::SyncConfig;
pub use engine::{spawn_engine, EngineServices};
pub use error::{EngineError, SendError, ValidationError};
pub use events::{PollFailure, PushHealth, SyncStatus};
pub use handle::EngineHandle;
pub use scheduler::{backoff_delay, PollTarget, SubscriptionState, SyncScheduler};
pub use staging::{
    AttachmentCandidate, AttachmentRejection, AttachmentStagingArea, LocalFile, NoopPreviews,
    PreviewHandle, PreviewProvider,
};
