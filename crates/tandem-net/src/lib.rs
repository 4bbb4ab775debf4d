//! # tandem-net
//!
//! Network seams of the Tandem sync engine: the REST service, the directory
//! and the real-time push channel, plus their production implementations.

pub mod api;
pub mod error;
pub mod push;
pub mod rest;

pub use api::{
    ChatApi, Directory, OutgoingAttachment, PushChannel, PushEvent, SessionProvider, StaticSession,
};
pub use error::ApiError;
pub use push::WsPushChannel;
pub use rest::RestClient;
