//! UAVCAN v0 single frame decoding.
//!
//! Every frame on the bus carries a 29-bit extended arbitration id and a payload of
//! up to 8 bytes, the last of which is the tail byte. This module only classifies
//! individual frames; it does not reassemble multi-frame transfers.
use embedded_can::{ExtendedId, Id};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Bus node identifier, 0..=127.
pub type NodeId = u8;

/// A raw frame as read from the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
    arbitration_id: u32,
    dlc: usize,
    data: [u8; 8],
}

impl RawFrame {
    /// Maximum payload length of a classic CAN frame.
    pub const MAX_LEN: usize = 8;

    /// Create a frame. Returns `None` if `arbitration_id` does not fit in 29 bits or
    /// `payload` is longer than [RawFrame::MAX_LEN].
    #[must_use]
    pub fn new(arbitration_id: u32, payload: &[u8]) -> Option<Self> {
        if arbitration_id > ExtendedId::MAX.as_raw() || payload.len() > Self::MAX_LEN {
            return None;
        }
        let mut data = [0u8; Self::MAX_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Some(Self {
            arbitration_id,
            dlc: payload.len(),
            data,
        })
    }

    /// Copy any [embedded_can::Frame] into a `RawFrame`. Standard (11-bit) and remote
    /// frames are not used by DroneCAN and produce `None`.
    #[must_use]
    pub fn from_can_frame<F: embedded_can::Frame>(frame: &F) -> Option<Self> {
        if frame.is_remote_frame() {
            return None;
        }
        match frame.id() {
            Id::Extended(id) => Self::new(id.as_raw(), frame.data()),
            Id::Standard(_) => None,
        }
    }

    #[must_use]
    pub fn arbitration_id(&self) -> u32 {
        self.arbitration_id
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.dlc]
    }
}

impl embedded_can::Frame for RawFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        match id.into() {
            Id::Extended(id) => RawFrame::new(id.as_raw(), data),
            Id::Standard(_) => None,
        }
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        true
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        // new() guarantees the id fits in 29 bits
        Id::Extended(ExtendedId::new(self.arbitration_id).unwrap_or(ExtendedId::ZERO))
    }

    fn dlc(&self) -> usize {
        self.dlc
    }

    fn data(&self) -> &[u8] {
        self.payload()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Message,
    Service,
}

/// Fields encoded in the 29-bit arbitration id.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub priority: u8,
    pub kind: FrameKind,
    /// 16-bit message type id, or 8-bit service type id.
    pub type_id: u16,
    pub source_node_id: NodeId,
    /// Only set for service frames.
    pub destination_node_id: Option<NodeId>,
    /// Only set for service frames.
    pub is_request: Option<bool>,
}

impl FrameHeader {
    /// Decode from an arbitration id. Every 29-bit value decodes; bits above 28 are
    /// ignored.
    #[must_use]
    pub fn decode(id: u32) -> Self {
        let priority = ((id >> 26) & 0x7) as u8;
        let source_node_id = (id & 0x7f) as NodeId;

        if (id >> 25) & 0x1 == 1 {
            FrameHeader {
                priority,
                kind: FrameKind::Service,
                type_id: ((id >> 16) & 0xff) as u16,
                source_node_id,
                destination_node_id: Some(((id >> 8) & 0x7f) as NodeId),
                is_request: Some((id >> 15) & 0x1 == 1),
            }
        } else {
            FrameHeader {
                priority,
                kind: FrameKind::Message,
                type_id: ((id >> 8) & 0xffff) as u16,
                source_node_id,
                destination_node_id: None,
                is_request: None,
            }
        }
    }

    #[must_use]
    pub fn is_service(&self) -> bool {
        self.kind == FrameKind::Service
    }
}

/// Transfer boundary flags and transfer id carried in the last payload byte.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailByte {
    pub start_of_transfer: bool,
    pub end_of_transfer: bool,
    pub toggle: bool,
    pub transfer_id: u8,
}

impl TailByte {
    /// Decode the tail byte from a frame payload.
    ///
    /// # Errors
    /// [Error::EmptyPayload] if `payload` has no bytes.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let Some(b) = payload.last() else {
            return Err(Error::EmptyPayload);
        };
        Ok(Self::from_byte(*b))
    }

    #[must_use]
    pub fn from_byte(b: u8) -> Self {
        TailByte {
            start_of_transfer: (b >> 7) & 0x1 == 1,
            end_of_transfer: (b >> 6) & 0x1 == 1,
            toggle: (b >> 5) & 0x1 == 1,
            transfer_id: b & 0x1f,
        }
    }

    /// True when the transfer starts and ends in this frame.
    #[must_use]
    pub fn is_single_frame(&self) -> bool {
        self.start_of_transfer && self.end_of_transfer
    }
}

/// Decode the header fields from an arbitration id.
#[must_use]
pub fn decode_header(arbitration_id: u32) -> FrameHeader {
    FrameHeader::decode(arbitration_id)
}

/// Decode the tail byte, i.e., the last byte, of `payload`.
///
/// # Errors
/// [Error::EmptyPayload] if `payload` is empty.
pub fn decode_tail(payload: &[u8]) -> Result<TailByte> {
    TailByte::decode(payload)
}

/// A frame split into its header, tail byte and the transfer bytes in between.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub header: FrameHeader,
    pub tail: TailByte,
    /// Payload without the tail byte.
    pub body: Vec<u8>,
}

impl DecodedFrame {
    #[must_use]
    pub fn is_single_frame(&self) -> bool {
        self.tail.is_single_frame()
    }
}

/// Decode the header and tail of `frame`.
///
/// # Errors
/// [Error::EmptyPayload] if the frame has no payload, in which case no body can be
/// derived either.
pub fn decode_frame(frame: &RawFrame) -> Result<DecodedFrame> {
    let payload = frame.payload();
    let tail = TailByte::decode(payload)?;
    Ok(DecodedFrame {
        header: FrameHeader::decode(frame.arbitration_id()),
        tail,
        body: payload[..payload.len() - 1].to_vec(),
    })
}
