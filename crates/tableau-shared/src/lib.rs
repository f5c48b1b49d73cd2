//! # tableau-shared
//!
//! Wire protocol and domain vocabulary shared by the Tableau coordination
//! server and its clients: room codes, connection identifiers, the event
//! enums exchanged over the WebSocket, and the errors produced while decoding
//! them.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
