/// Application name
pub const APP_NAME: &str = "Tandem";

/// Reserved prefix marking a club/event conversation key
pub const CLUB_KEY_PREFIX: &str = "club_";

/// Separator between club id and event id in a canonical key
pub const CLUB_EVENT_SEPARATOR: char = ':';

/// Deep-link route prefix accepted in front of a conversation key
pub const CHAT_ROUTE_PREFIX: &str = "chat/";

/// Room key prefix for peer-to-peer chat on the push channel
pub const USER_ROOM_PREFIX: &str = "user";

/// Room key prefix for club/event chat on the push channel
pub const CLUB_ROOM_PREFIX: &str = "club";

/// Maximum number of attachments on a single message
pub const MAX_ATTACHMENTS: usize = 5;

/// Maximum size of a single attachment in bytes (10 MiB)
pub const MAX_ATTACHMENT_SIZE: u64 = 10 * 1024 * 1024;

/// Media type prefix accepted for attachments
pub const IMAGE_MEDIA_PREFIX: &str = "image/";

/// Conversation list poll interval in milliseconds
pub const CONVERSATION_POLL_INTERVAL_MS: u64 = 5_000;

/// Active conversation message poll interval in milliseconds
pub const MESSAGE_POLL_INTERVAL_MS: u64 = 2_000;

/// Default REST request timeout in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Push reconnect attempts before falling back to poll-only mode
pub const PUSH_RECONNECT_ATTEMPTS: u32 = 5;

/// Base push reconnect delay in milliseconds (doubles per attempt)
pub const PUSH_RECONNECT_BASE_DELAY_MS: u64 = 1_000;

/// Default page size for conversation and message listing
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Prefix for ids of optimistic, not yet persisted messages
pub const LOCAL_MESSAGE_ID_PREFIX: &str = "local:";
