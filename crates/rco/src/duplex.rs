//! In-process transport for wiring two contexts together.
//!
//! Each end owns the sending half of one unbounded channel and the receiving half of
//! the other. Dropping an end closes the peer's inbound stream, which is how a served
//! context notices its peer has gone.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::transport;
use crate::transport::Transport;
use crate::transport::TransportError;

type Frame = Vec<u8>;

/// One end of an in-memory duplex link.
pub struct DuplexChannelTransport {
    outbound: mpsc::UnboundedSender<Frame>,
    // `recv` takes `&self`, so the receiver sits behind an async lock.
    inbound: Arc<Mutex<mpsc::UnboundedReceiver<Frame>>>,
}

impl DuplexChannelTransport {
    pub fn new(outbound: mpsc::UnboundedSender<Frame>, inbound: mpsc::UnboundedReceiver<Frame>) -> Self {
        Self { outbound, inbound: Arc::new(Mutex::new(inbound)) }
    }

    /// Two connected ends. Frames sent on one arrive, in order, on the other.
    pub fn pair() -> (Self, Self) {
        let (left_tx, right_rx) = mpsc::unbounded_channel();
        let (right_tx, left_rx) = mpsc::unbounded_channel();
        (Self::new(left_tx, left_rx), Self::new(right_tx, right_rx))
    }

    /// True once the peer end has been dropped.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

#[async_trait::async_trait]
impl Transport for DuplexChannelTransport {
    async fn send(&self, payload: &[u8]) -> transport::Result<()> {
        self.outbound
            .send(payload.to_vec())
            .map_err(|_| TransportError::ConnectionLost("peer end dropped".into()))
    }

    async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        Ok(self.inbound.lock().await.recv().await)
    }
}
