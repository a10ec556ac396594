//! # Transport Pump
//!
//! Binds a context to a `Transport`. Outbound packets are binary-encoded and queued to a
//! writer task; a reader task feeds every inbound frame to `on_data` until the stream
//! closes. Pump failures are logged and end the pump; they never surface as call errors.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::config::Encoding;
use crate::context::Context;
use crate::context::Payload;
use crate::transport::Transport;

/// The running reader and writer tasks of a served context.
pub struct Pump {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Pump {
    /// Waits until the inbound stream ends.
    pub async fn closed(self) {
        let _ = self.reader.await;
        self.writer.abort();
    }

    /// Stops both tasks immediately.
    pub fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

impl Context {
    /// Serves this context over `transport`, replacing any bound output.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn serve(&self, transport: impl Transport) -> Pump {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let name = self.name().to_string();
        self.bind_output(
            move |payload| {
                if let Payload::Binary(bytes) = payload {
                    if tx.send(bytes).is_err() {
                        debug!(context = %name, "writer gone, dropping packet");
                    }
                }
            },
            Encoding::Binary,
        );

        let writer_transport = transport.clone();
        let name = self.name().to_string();
        let writer = tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if let Err(e) = writer_transport.send(&bytes).await {
                    warn!(context = %name, error = %e, "transport send failed");
                    break;
                }
            }
        });

        let ctx = self.clone();
        let reader = tokio::spawn(async move {
            loop {
                match transport.recv().await {
                    Ok(Some(frame)) => {
                        if let Err(e) = ctx.on_data(frame) {
                            warn!(context = %ctx.name(), error = %e, "dropping inbound frame");
                        }
                    }
                    Ok(None) => {
                        debug!(context = %ctx.name(), "stream closed");
                        break;
                    }
                    Err(e) => {
                        warn!(context = %ctx.name(), error = %e, "transport error in pump");
                        break;
                    }
                }
            }
        });

        Pump { reader, writer }
    }
}
