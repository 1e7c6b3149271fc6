//! Error handling module
//!
//! Defines custom error types for the Rustscape world server.

use std::io;

use thiserror::Error;

use crate::game::entity::{EntityId, EntityState};

/// Main error type for the Rustscape world server
#[derive(Error, Debug)]
pub enum RustscapeError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Protocol-related errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Game logic errors
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while handing frames to the transport layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Write buffer full")]
    WriteBufferFull,
}

/// Protocol-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown opcode: {0}")]
    UnknownOpcode(u8),

    #[error("Invalid packet size: expected {expected}, got {actual}")]
    InvalidPacketSize { expected: usize, actual: usize },

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Packet too large: {size} bytes (max: {max})")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Buffer is not in bit access mode")]
    NotInBitMode,

    #[error("Buffer is already in bit access mode")]
    BitModeActive,

    #[error("Value {value} does not fit in {bits} bits for field '{field}'")]
    FieldOutOfRange {
        field: &'static str,
        value: i64,
        bits: usize,
    },

    #[error("Update flag {0} is set but its payload is missing")]
    MissingBlockData(&'static str),
}

/// Game logic errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Invalid state transition for {entity}: {from:?} -> {to:?}")]
    InvalidStateTransition {
        entity: EntityId,
        from: EntityState,
        to: EntityState,
    },

    #[error("Entity {0} has never been placed")]
    NotPlaced(EntityId),

    #[error("Player not found: {0}")]
    PlayerNotFound(u16),

    #[error("World full")]
    WorldFull,

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Task '{name}' failed: {reason}")]
    TaskFailed { name: String, reason: String },
}

/// Result type alias for Rustscape operations
pub type Result<T> = std::result::Result<T, RustscapeError>;
