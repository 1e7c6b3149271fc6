//! Networking module
//!
//! This module holds the byte-level plumbing shared by the world and the
//! connection layer:
//! - Packet buffers with bit access
//! - Pooled scratch buffers for update encoding
//! - Non-blocking frame hand-off to connection tasks

pub mod buffer;
pub mod pool;
pub mod transport;

pub use buffer::PacketBuffer;
pub use pool::{BufferPool, PooledBuffer};
pub use transport::Outbound;
