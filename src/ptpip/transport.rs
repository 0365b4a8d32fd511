//! Byte transport under the packet layer.
//!
//! The client owns a boxed [`PtpTransport`]. The TCP implementation opens the
//! control channel on connect and the event channel on demand, spawning one
//! reader task per channel that forwards raw chunks to the client.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::error::{PtpError, Result};

/// Which of the two PTP/IP channels a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Control,
    Event,
}

/// Inbound notification from the transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// Raw bytes read off one channel. Arbitrary chunking; the packet layer
    /// reassembles frames.
    Data { channel: Channel, bytes: Vec<u8> },
    /// The peer closed one channel or the read failed.
    Closed { channel: Channel },
}

/// Dual-channel byte transport.
#[async_trait]
pub trait PtpTransport: Send {
    /// Open the control channel.
    async fn connect(&mut self) -> Result<()>;

    /// Open the event channel. Must be called after [`connect`](Self::connect).
    async fn open_event_channel(&mut self) -> Result<()>;

    /// Close both channels.
    async fn disconnect(&mut self);

    async fn send(&mut self, channel: Channel, bytes: &[u8]) -> Result<()>;

    /// Hand out the inbound event stream. Valid exactly once.
    fn take_inbound(&mut self) -> mpsc::UnboundedReceiver<TransportEvent>;
}

/// TCP transport talking to a camera's PTP/IP endpoint.
pub struct TcpTransport {
    host: String,
    port: u16,
    io_timeout: Duration,
    control: Option<OwnedWriteHalf>,
    event: Option<OwnedWriteHalf>,
    inbound_tx: mpsc::UnboundedSender<TransportEvent>,
    inbound_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16, io_timeout: Duration) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            host: host.into(),
            port,
            io_timeout,
            control: None,
            event: None,
            inbound_tx,
            inbound_rx: Some(inbound_rx),
        }
    }

    async fn open_stream(&self, channel: Channel) -> Result<OwnedWriteHalf> {
        let addr = format!("{}:{}", self.host, self.port);
        let stream = timeout(self.io_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| PtpError::timeout(format!("connecting to {addr}")))?
            .map_err(|e| {
                error!("Failed to open {channel:?} stream to {addr}: {e}");
                PtpError::FailedToCreateStreamsToHost
            })?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        spawn_reader(channel, read_half, self.inbound_tx.clone());
        Ok(write_half)
    }
}

fn spawn_reader(
    channel: Channel,
    mut read_half: OwnedReadHalf,
    tx: mpsc::UnboundedSender<TransportEvent>,
) {
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match read_half.read(&mut chunk).await {
                Ok(0) => {
                    debug!("{channel:?} channel closed by peer");
                    let _ = tx.send(TransportEvent::Closed { channel });
                    return;
                }
                Ok(n) => {
                    if tx
                        .send(TransportEvent::Data {
                            channel,
                            bytes: chunk[..n].to_vec(),
                        })
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) => {
                    error!("Read error on {channel:?} channel: {e}");
                    let _ = tx.send(TransportEvent::Closed { channel });
                    return;
                }
            }
        }
    });
}

#[async_trait]
impl PtpTransport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        let write_half = self.open_stream(Channel::Control).await?;
        self.control = Some(write_half);
        Ok(())
    }

    async fn open_event_channel(&mut self) -> Result<()> {
        let write_half = self.open_stream(Channel::Event).await?;
        self.event = Some(write_half);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut control) = self.control.take() {
            let _ = control.shutdown().await;
        }
        if let Some(mut event) = self.event.take() {
            let _ = event.shutdown().await;
        }
    }

    async fn send(&mut self, channel: Channel, bytes: &[u8]) -> Result<()> {
        let half = match channel {
            Channel::Control => self.control.as_mut(),
            Channel::Event => self.event.as_mut(),
        };
        let Some(half) = half else {
            return Err(PtpError::SocketClosed);
        };
        timeout(self.io_timeout, half.write_all(bytes))
            .await
            .map_err(|_| PtpError::timeout(format!("writing to {channel:?} channel")))?
            .map_err(|e| {
                error!("Write error on {channel:?} channel: {e}");
                PtpError::SocketClosed
            })?;
        Ok(())
    }

    fn take_inbound(&mut self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.inbound_rx
            .take()
            .expect("inbound receiver already taken")
    }
}
