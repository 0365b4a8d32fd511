//! Scripted in-memory transport for exercising the client without a camera.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::buffer::ByteBuffer;
use super::packet::{Packet, parse_packets};
use super::transport::{Channel, PtpTransport, TransportEvent};
use crate::error::Result;

/// Decides how the fake camera answers each packet the client sends.
pub(crate) type Script = Box<dyn FnMut(Channel, &Packet) -> Vec<(Channel, Packet)> + Send>;

pub(crate) struct MockHandle {
    pub(crate) sent: Arc<Mutex<Vec<(Channel, Packet)>>>,
    disconnects: Arc<AtomicUsize>,
    injector: mpsc::UnboundedSender<TransportEvent>,
}

impl MockHandle {
    /// Push packets to the client as if the camera had sent them.
    pub(crate) fn inject(&self, channel: Channel, packets: &[Packet]) {
        for packet in packets {
            let _ = self.injector.send(TransportEvent::Data {
                channel,
                bytes: packet.serialize(),
            });
        }
    }

    /// Push raw bytes, framing errors included.
    pub(crate) fn inject_bytes(&self, channel: Channel, bytes: &[u8]) {
        let _ = self.injector.send(TransportEvent::Data {
            channel,
            bytes: bytes.to_vec(),
        });
    }

    pub(crate) fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self, channel: Channel) {
        let _ = self.injector.send(TransportEvent::Closed { channel });
    }

    /// Every CommandRequest observed so far, in send order.
    pub(crate) fn command_requests(&self) -> Vec<(u32, u32, Vec<u32>)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, p)| match p {
                Packet::CommandRequest { code, transaction_id, args } => {
                    Some((*code, *transaction_id, args.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

pub(crate) struct MockTransport {
    script: Script,
    sent: Arc<Mutex<Vec<(Channel, Packet)>>>,
    disconnects: Arc<AtomicUsize>,
    inbound_tx: mpsc::UnboundedSender<TransportEvent>,
    inbound_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl MockTransport {
    pub(crate) fn new(script: Script) -> (Self, MockHandle) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let disconnects = Arc::new(AtomicUsize::new(0));
        let handle = MockHandle {
            sent: sent.clone(),
            disconnects: disconnects.clone(),
            injector: inbound_tx.clone(),
        };
        (
            Self {
                script,
                sent,
                disconnects,
                inbound_tx,
                inbound_rx: Some(inbound_rx),
            },
            handle,
        )
    }

    /// A script that completes the init handshake and answers pings, handing
    /// everything else to `overlay`.
    pub(crate) fn handshake_script(
        mut overlay: impl FnMut(Channel, &Packet) -> Vec<(Channel, Packet)> + Send + 'static,
    ) -> Script {
        Box::new(move |channel, packet| match packet {
            Packet::InitCommand { guid, .. } => vec![(
                Channel::Control,
                Packet::InitCommandAck {
                    session_id: 1,
                    guid: *guid,
                    name: "MockCam".to_string(),
                },
            )],
            Packet::InitEvent { .. } => vec![(Channel::Event, Packet::InitEventAck)],
            Packet::Ping => vec![(channel, Packet::Pong)],
            _ => overlay(channel, packet),
        })
    }

    /// A script that acknowledges every command request with an OK response.
    pub(crate) fn always_ok_script() -> Script {
        Self::handshake_script(|_, packet| match packet {
            Packet::CommandRequest { transaction_id, .. } => vec![(
                Channel::Control,
                Packet::CommandResponse {
                    code: 0x2001,
                    transaction_id: Some(*transaction_id),
                },
            )],
            _ => vec![],
        })
    }
}

#[async_trait]
impl PtpTransport for MockTransport {
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn open_event_channel(&mut self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn send(&mut self, channel: Channel, bytes: &[u8]) -> Result<()> {
        let mut buf = ByteBuffer::from_bytes(bytes.to_vec());
        for packet in parse_packets(&mut buf).expect("client sent malformed bytes") {
            let replies = (self.script)(channel, &packet);
            self.sent.lock().unwrap().push((channel, packet));
            for (reply_channel, reply) in replies {
                let _ = self.inbound_tx.send(TransportEvent::Data {
                    channel: reply_channel,
                    bytes: reply.serialize(),
                });
            }
        }
        Ok(())
    }

    fn take_inbound(&mut self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.inbound_rx
            .take()
            .expect("inbound receiver already taken")
    }
}
