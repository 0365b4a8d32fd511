//! PTP/IP wire protocol: framing, transport, and the transaction engine.

pub mod buffer;
pub mod client;
pub(crate) mod codes;
pub mod packet;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use buffer::ByteBuffer;
pub use client::{Command, Priority, PtpEvent, PtpIpClient, Response, derive_guid};
pub use packet::{Packet, PacketKind};
pub use transport::{Channel, PtpTransport, TcpTransport, TransportEvent};
