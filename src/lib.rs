//! Rustscape World Library
//!
//! This library provides the world core of the Rustscape game server:
//! entity placement, region tracking and the per-tick player update
//! protocol spoken to 317 clients.
//!
//! ## Modules
//!
//! - `config` - Server configuration management
//! - `error` - Error types and result definitions
//! - `game` - World, entities, players, plugins and the update protocol
//! - `net` - Packet buffers, buffer pooling and the transport hand-off
//! - `protocol` - Packet framing and inbound message decoding

pub mod config;
pub mod error;
pub mod game;
pub mod net;
pub mod protocol;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{Result, RustscapeError};
pub use game::world::World;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Client revision spoken by the update protocol
pub const REVISION: u32 = 317;
