/// Application name
pub const APP_NAME: &str = "Tableau";

/// Number of random bytes behind a generated room code
pub const ROOM_CODE_BYTES: usize = 3;

/// Length of a room code in characters (hex-encoded random bytes)
pub const ROOM_CODE_LEN: usize = ROOM_CODE_BYTES * 2;

/// Chat recipient that addresses every member of the room
pub const RECIPIENT_EVERYONE: &str = "everyone";

/// Field the drawing toolkit stamps on every operation it emits
pub const OP_ID_FIELD: &str = "drawingId";

/// Default HTTP / WebSocket port
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Public chat messages retained per room
pub const DEFAULT_CHAT_HISTORY_LIMIT: usize = 200;

/// Pending join requests expire after this many seconds
pub const DEFAULT_JOIN_REQUEST_TTL_SECS: u64 = 600;

/// Outbound frames queued per connection before new ones are dropped
pub const DEFAULT_OUTBOUND_BUFFER: usize = 1024;

/// Largest inbound WebSocket message (full canvas snapshots are big)
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;
