//! Player synchronization module
//!
//! Everything needed to tell each client what changed around it this tick:
//! - pending attribute flags and their payloads
//! - the ordered update block encoders
//! - the bounded, ordered set of tracked peers
//! - the opcode 81 message builder

pub mod blocks;
pub mod local_players;
pub mod player_sync;
pub mod update_flags;

pub use blocks::{encode_blocks, UpdateBlock, UpdateState};
pub use local_players::{LocalPlayers, MAX_LOCAL_PLAYERS};
pub use player_sync::{PlayerUpdater, MAX_ADDS_PER_TICK};
pub use update_flags::{PendingUpdates, UpdateFlags};
