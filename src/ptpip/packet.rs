//! PTP/IP packet framing and codec.
//!
//! Every packet is `u32 length | u32 kind | body`, all little-endian, where
//! `length` counts the whole packet including the 8-byte header. The parser
//! works on a stream accumulator and hands back only fully-framed packets;
//! partial tails stay in the buffer for the next read.

use tracing::warn;

use super::buffer::{ByteBuffer, ByteView};
use crate::error::{PtpError, Result};

pub(crate) const HEADER_LEN: usize = 8;

/// Upper bound on a single framed packet. Anything larger is treated as a
/// desynchronized stream.
const MAX_PACKET_LEN: usize = 64 * 1024 * 1024;

/// Most arguments a command request may carry.
pub(crate) const MAX_COMMAND_ARGS: usize = 5;

/// Wire packet kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketKind {
    InitCommand = 1,
    InitCommandAck = 2,
    InitEvent = 3,
    InitEventAck = 4,
    Error = 5,
    CommandRequest = 6,
    CommandResponse = 7,
    StartData = 8,
    Data = 9,
    Cancel = 10,
    EndData = 11,
    Event = 12,
    Ping = 13,
    Pong = 14,
}

impl PacketKind {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => Self::InitCommand,
            2 => Self::InitCommandAck,
            3 => Self::InitEvent,
            4 => Self::InitEventAck,
            5 => Self::Error,
            6 => Self::CommandRequest,
            7 => Self::CommandResponse,
            8 => Self::StartData,
            9 => Self::Data,
            10 => Self::Cancel,
            11 => Self::EndData,
            12 => Self::Event,
            13 => Self::Ping,
            14 => Self::Pong,
            _ => return None,
        })
    }
}

/// A fully-framed PTP/IP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    InitCommand {
        guid: [u8; 16],
        name: String,
        version: u32,
    },
    InitCommandAck {
        session_id: u32,
        guid: [u8; 16],
        name: String,
    },
    InitEvent {
        session_id: u32,
    },
    InitEventAck,
    Error {
        payload: Vec<u8>,
    },
    CommandRequest {
        code: u32,
        transaction_id: u32,
        args: Vec<u32>,
    },
    CommandResponse {
        code: u16,
        /// Absent on some firmwares for the session-open response.
        transaction_id: Option<u32>,
    },
    StartData {
        transaction_id: u32,
        total_length: u64,
    },
    Data {
        transaction_id: u32,
        payload: Vec<u8>,
    },
    Cancel {
        transaction_id: u32,
    },
    EndData {
        transaction_id: u32,
        payload: Vec<u8>,
    },
    Event {
        code: u16,
        transaction_id: u32,
        params: Vec<u32>,
    },
    Ping,
    Pong,
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::InitCommand { .. } => PacketKind::InitCommand,
            Self::InitCommandAck { .. } => PacketKind::InitCommandAck,
            Self::InitEvent { .. } => PacketKind::InitEvent,
            Self::InitEventAck => PacketKind::InitEventAck,
            Self::Error { .. } => PacketKind::Error,
            Self::CommandRequest { .. } => PacketKind::CommandRequest,
            Self::CommandResponse { .. } => PacketKind::CommandResponse,
            Self::StartData { .. } => PacketKind::StartData,
            Self::Data { .. } => PacketKind::Data,
            Self::Cancel { .. } => PacketKind::Cancel,
            Self::EndData { .. } => PacketKind::EndData,
            Self::Event { .. } => PacketKind::Event,
            Self::Ping => PacketKind::Ping,
            Self::Pong => PacketKind::Pong,
        }
    }

    /// Serialize to wire bytes, header included.
    pub fn serialize(&self) -> Vec<u8> {
        let mut body = ByteBuffer::new();
        match self {
            Self::InitCommand { guid, name, version } => {
                body.append_slice(guid);
                body.append_utf16_string(name);
                body.append_u32(*version);
            }
            Self::InitCommandAck { session_id, guid, name } => {
                body.append_u32(*session_id);
                body.append_slice(guid);
                body.append_utf16_string(name);
            }
            Self::InitEvent { session_id } => {
                body.append_u32(*session_id);
            }
            Self::InitEventAck | Self::Ping | Self::Pong => {}
            Self::Error { payload } => {
                body.append_slice(payload);
            }
            Self::CommandRequest { code, transaction_id, args } => {
                debug_assert!(args.len() <= MAX_COMMAND_ARGS);
                body.append_u32(*code);
                body.append_u32(*transaction_id);
                for arg in args.iter().take(MAX_COMMAND_ARGS) {
                    body.append_u32(*arg);
                }
            }
            Self::CommandResponse { code, transaction_id } => {
                body.append_u16(*code);
                if let Some(tid) = transaction_id {
                    body.append_u32(*tid);
                }
            }
            Self::StartData { transaction_id, total_length } => {
                body.append_u32(*transaction_id);
                body.append_u64(*total_length);
            }
            Self::Data { transaction_id, payload } | Self::EndData { transaction_id, payload } => {
                body.append_u32(*transaction_id);
                body.append_slice(payload);
            }
            Self::Cancel { transaction_id } => {
                body.append_u32(*transaction_id);
            }
            Self::Event { code, transaction_id, params } => {
                body.append_u16(*code);
                body.append_u32(*transaction_id);
                for param in params.iter().take(3) {
                    body.append_u32(*param);
                }
            }
        }

        let mut out = ByteBuffer::new();
        out.append_u32((HEADER_LEN + body.len()) as u32);
        out.append_u32(self.kind() as u32);
        out.append_slice(body.as_slice());
        out.into_vec()
    }

    /// Decode a packet body. `body` excludes the 8-byte header. Returns `None`
    /// when a required sub-field does not fit in the declared length.
    fn decode(kind: PacketKind, body: ByteView<'_>) -> Option<Self> {
        Some(match kind {
            PacketKind::InitCommand => {
                let guid: [u8; 16] = body.read_bytes(0, 16)?.try_into().ok()?;
                let (name, consumed) = body.read_utf16_string(16)?;
                let version = body.read_u32(16 + consumed)?;
                Self::InitCommand { guid, name, version }
            }
            PacketKind::InitCommandAck => {
                let session_id = body.read_u32(0)?;
                let guid: [u8; 16] = body.read_bytes(4, 16)?.try_into().ok()?;
                let (name, _) = body.read_utf16_string(20)?;
                Self::InitCommandAck { session_id, guid, name }
            }
            PacketKind::InitEvent => Self::InitEvent {
                session_id: body.read_u32(0)?,
            },
            PacketKind::InitEventAck => Self::InitEventAck,
            PacketKind::Error => Self::Error {
                payload: body.as_slice().to_vec(),
            },
            PacketKind::CommandRequest => {
                let code = body.read_u32(0)?;
                let transaction_id = body.read_u32(4)?;
                let arg_bytes = body.len().checked_sub(8)?;
                if arg_bytes % 4 != 0 {
                    return None;
                }
                let mut args = Vec::with_capacity(arg_bytes / 4);
                for i in 0..(arg_bytes / 4).min(MAX_COMMAND_ARGS) {
                    args.push(body.read_u32(8 + i * 4)?);
                }
                Self::CommandRequest { code, transaction_id, args }
            }
            PacketKind::CommandResponse => {
                let code = body.read_u16(0)?;
                let transaction_id = body.read_u32(2);
                Self::CommandResponse { code, transaction_id }
            }
            PacketKind::StartData => Self::StartData {
                transaction_id: body.read_u32(0)?,
                total_length: body.read_u64(4)?,
            },
            PacketKind::Data => Self::Data {
                transaction_id: body.read_u32(0)?,
                payload: body.read_bytes(4, body.len() - 4)?.to_vec(),
            },
            PacketKind::Cancel => Self::Cancel {
                transaction_id: body.read_u32(0)?,
            },
            PacketKind::EndData => Self::EndData {
                transaction_id: body.read_u32(0)?,
                payload: body.read_bytes(4, body.len() - 4)?.to_vec(),
            },
            PacketKind::Event => {
                let code = body.read_u16(0)?;
                let transaction_id = body.read_u32(2)?;
                let param_bytes = body.len() - 6;
                let mut params = Vec::new();
                for i in 0..(param_bytes / 4).min(3) {
                    params.push(body.read_u32(6 + i * 4)?);
                }
                Self::Event { code, transaction_id, params }
            }
            PacketKind::Ping => Self::Ping,
            PacketKind::Pong => Self::Pong,
        })
    }
}

/// Drain every fully-framed packet out of `buf`.
///
/// A zero or impossible declared length at the very start of the unparsed
/// stream is unrecoverable and fails with [`PtpError::Framing`]. The same
/// condition after at least one good packet is logged and the tail discarded,
/// since some firmwares emit trailing garbage after event bursts.
pub(crate) fn parse_packets(buf: &mut ByteBuffer) -> Result<Vec<Packet>> {
    let mut packets = Vec::new();
    let mut offset = 0usize;

    loop {
        let Some(declared) = buf.read_u32(offset) else {
            break;
        };
        let declared = declared as usize;

        if declared < HEADER_LEN || declared > MAX_PACKET_LEN {
            if offset == 0 {
                return Err(PtpError::framing(format!(
                    "declared packet length {declared} at stream start"
                )));
            }
            warn!(declared, offset, "discarding desynchronized packet tail");
            buf.clear();
            return Ok(packets);
        }

        let Some(kind_raw) = buf.read_u32(offset + 4) else {
            break;
        };

        if buf.len() - offset < declared {
            // Partial packet, wait for more bytes.
            break;
        }

        let body = ByteView::new(
            buf.read_bytes(offset + HEADER_LEN, declared - HEADER_LEN)
                .unwrap_or(&[]),
        );

        match PacketKind::from_u32(kind_raw) {
            Some(kind) => match Packet::decode(kind, body) {
                Some(packet) => packets.push(packet),
                None => warn!(?kind, declared, "skipping packet with malformed body"),
            },
            None => warn!(kind_raw, declared, "skipping packet of unknown kind"),
        }

        offset += declared;
    }

    buf.drain_front(offset);
    Ok(packets)
}
