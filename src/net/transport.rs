//! Transport hand-off
//!
//! The world never performs socket I/O itself. Finished frames are pushed
//! into a bounded channel owned by the connection task, which writes them
//! to the socket on its own schedule. Sends never block the tick.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

use crate::error::{NetworkError, Result};

/// Sending half of a player's outbound frame queue
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Bytes>,
}

impl Outbound {
    /// Wrap an existing channel sender
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// Create a queue with room for `capacity` frames
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Queue a frame without waiting
    pub fn send(&self, frame: Bytes) -> Result<()> {
        let len = frame.len();
        match self.tx.try_send(frame) {
            Ok(()) => {
                trace!(bytes = len, "Frame queued for transport");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(NetworkError::WriteBufferFull.into()),
            Err(TrySendError::Closed(_)) => Err(NetworkError::ConnectionClosed.into()),
        }
    }

    /// Whether the receiving connection task has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RustscapeError;

    #[tokio::test]
    async fn test_send_and_receive() {
        let (outbound, mut rx) = Outbound::channel(2);
        outbound.send(Bytes::from_static(&[81, 0, 1, 0])).unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(&frame[..], &[81, 0, 1, 0]);
    }

    #[test]
    fn test_full_queue_does_not_block() {
        let (outbound, _rx) = Outbound::channel(1);
        outbound.send(Bytes::from_static(&[1])).unwrap();

        let err = outbound.send(Bytes::from_static(&[2])).unwrap_err();
        assert!(matches!(
            err,
            RustscapeError::Network(NetworkError::WriteBufferFull)
        ));
    }

    #[test]
    fn test_closed_queue() {
        let (outbound, rx) = Outbound::channel(1);
        drop(rx);

        assert!(outbound.is_closed());
        let err = outbound.send(Bytes::from_static(&[1])).unwrap_err();
        assert!(matches!(
            err,
            RustscapeError::Network(NetworkError::ConnectionClosed)
        ));
    }
}
