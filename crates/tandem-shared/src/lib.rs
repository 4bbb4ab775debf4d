//! # tandem-shared
//!
//! Domain vocabulary shared by every Tandem crate: identifiers, conversation
//! identity, match gating and the wire records of the REST and push services.

pub mod constants;
pub mod error;
pub mod gate;
pub mod identity;
pub mod protocol;
pub mod types;

pub use error::{ErrorKind, IdentityError, TandemError};
pub use gate::{evaluate, MatchFacts, MatchState, MatchStatus, Participation};
pub use identity::{classify, ConversationRoute};
pub use types::{
    ConversationKey, ConversationKind, CorrelationToken, MessageId, RoomKey, SourceHint, UserId,
};
