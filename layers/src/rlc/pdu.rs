//! RLC Data PDU Formats
//!
//! UMD and AMD PDU headers of TS 38.322 Section 6.2.2. STATUS PDUs live in
//! the `status` module.

use super::config::{AmSnSize, UmSnSize};
use bytes::{BufMut, Bytes, BytesMut};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
use thiserror::Error;

/// Largest SDU the entities accept (TS 38.323 maximum PDCP PDU size)
pub const MAX_SDU_SIZE: usize = 9000;

/// Length of the SO field
pub const SO_FIELD_LEN: usize = 2;

/// Wire-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PduError {
    #[error("PDU too short: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("PDU carries no payload")]
    EmptyPayload,

    #[error("Control PDU where a data PDU was expected")]
    UnexpectedControlPdu,

    #[error("Data PDU where a control PDU was expected")]
    UnexpectedDataPdu,

    #[error("Unsupported control PDU type {0:#05b}")]
    UnsupportedCpt(u8),

    #[error("SN {sn} does not fit a {bits} bit field")]
    SnOverflow { sn: u32, bits: u8 },

    #[error("Segment [{start}, {end}) inconsistent with SDU of {sdu_len} bytes")]
    InconsistentSegment { start: usize, end: usize, sdu_len: usize },

    #[error("SDU of {0} bytes exceeds maximum SDU size")]
    SduTooLarge(usize),

    #[error("Malformed status PDU: {0}")]
    MalformedStatus(&'static str),
}

/// Segmentation Info field
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum SiField {
    /// Data field contains all bytes of an SDU
    FullSdu = 0b00,
    /// Data field contains the first segment of an SDU
    FirstSegment = 0b01,
    /// Data field contains the last segment of an SDU
    LastSegment = 0b10,
    /// Data field contains neither the first nor the last segment
    MiddleSegment = 0b11,
}

impl SiField {
    fn from_bits(bits: u8) -> Self {
        // two bits always decode to one of the four values
        SiField::from_u8(bits & 0b11).unwrap_or(SiField::FullSdu)
    }

    fn bits(self) -> u8 {
        self.to_u8().unwrap_or(0)
    }
}

/// Where a PDU's payload sits inside its SDU. Only middle and last segments
/// carry a segment offset on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentPosition {
    /// Whole SDU
    Full,
    /// Starts at offset 0, more follows
    First,
    /// Neither first nor last
    Middle { so: u16 },
    /// Ends the SDU
    Last { so: u16 },
}

impl SegmentPosition {
    /// Position of bytes `[start, end)` inside an SDU of `sdu_len` bytes
    pub fn for_range(start: usize, end: usize, sdu_len: usize) -> Self {
        let so = start as u16;
        match (start == 0, end >= sdu_len) {
            (true, true) => SegmentPosition::Full,
            (true, false) => SegmentPosition::First,
            (false, true) => SegmentPosition::Last { so },
            (false, false) => SegmentPosition::Middle { so },
        }
    }

    fn from_wire(si: SiField, so: u16) -> Self {
        match si {
            SiField::FullSdu => SegmentPosition::Full,
            SiField::FirstSegment => SegmentPosition::First,
            SiField::MiddleSegment => SegmentPosition::Middle { so },
            SiField::LastSegment => SegmentPosition::Last { so },
        }
    }

    /// SI field value
    pub fn si(&self) -> SiField {
        match self {
            SegmentPosition::Full => SiField::FullSdu,
            SegmentPosition::First => SiField::FirstSegment,
            SegmentPosition::Middle { .. } => SiField::MiddleSegment,
            SegmentPosition::Last { .. } => SiField::LastSegment,
        }
    }

    /// Byte offset of the payload inside the SDU
    pub fn so(&self) -> u16 {
        match self {
            SegmentPosition::Full | SegmentPosition::First => 0,
            SegmentPosition::Middle { so } | SegmentPosition::Last { so } => *so,
        }
    }

    /// Whether the header carries an SO field
    pub fn has_so(&self) -> bool {
        matches!(self, SegmentPosition::Middle { .. } | SegmentPosition::Last { .. })
    }

    /// Whether the payload ends the SDU
    pub fn is_last(&self) -> bool {
        matches!(self, SegmentPosition::Full | SegmentPosition::Last { .. })
    }
}

fn check_len(pdu: &[u8], needed: usize) -> Result<(), PduError> {
    if pdu.len() < needed {
        return Err(PduError::Truncated { needed, got: pdu.len() });
    }
    Ok(())
}

fn check_sn(sn: u32, bits: u8) -> Result<(), PduError> {
    if sn >> bits != 0 {
        return Err(PduError::SnOverflow { sn, bits });
    }
    Ok(())
}

fn read_so(pdu: &[u8], at: usize) -> Result<u16, PduError> {
    check_len(pdu, at + SO_FIELD_LEN)?;
    Ok(u16::from_be_bytes([pdu[at], pdu[at + 1]]))
}

/// Whether an AM PDU is a data PDU (D/C bit set)
pub fn is_data_pdu(pdu: &[u8]) -> bool {
    pdu.first().map(|b| b & 0x80 != 0).unwrap_or(false)
}

/// UMD PDU header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UmdHeader {
    /// Position of the payload in its SDU
    pub position: SegmentPosition,
    /// SN of the SDU, carried by every UMD PDU so the receiver can order
    /// and deduplicate whole SDUs as well as segments
    pub sn: u32,
}

impl UmdHeader {
    /// Header length for a payload at `position`
    pub fn header_len(sn_size: UmSnSize, position: SegmentPosition) -> usize {
        let sn_len = match sn_size {
            UmSnSize::Size6 => 1,
            UmSnSize::Size12 => 2,
        };
        if position.has_so() {
            sn_len + SO_FIELD_LEN
        } else {
            sn_len
        }
    }

    /// Append the header to `buf`
    pub fn write(&self, sn_size: UmSnSize, buf: &mut BytesMut) -> Result<(), PduError> {
        let si = self.position.si().bits() << 6;
        check_sn(self.sn, sn_size.bits())?;
        match sn_size {
            UmSnSize::Size6 => buf.put_u8(si | (self.sn & 0x3F) as u8),
            UmSnSize::Size12 => {
                buf.put_u8(si | ((self.sn >> 8) & 0x0F) as u8);
                buf.put_u8((self.sn & 0xFF) as u8);
            }
        }
        if self.position.has_so() {
            buf.put_u16(self.position.so());
        }
        Ok(())
    }

    /// Parse the header, returning it with its length
    pub fn parse(sn_size: UmSnSize, pdu: &[u8]) -> Result<(Self, usize), PduError> {
        check_len(pdu, 1)?;
        let si = SiField::from_bits(pdu[0] >> 6);
        let (sn, sn_len) = match sn_size {
            UmSnSize::Size6 => ((pdu[0] & 0x3F) as u32, 1),
            UmSnSize::Size12 => {
                check_len(pdu, 2)?;
                ((((pdu[0] & 0x0F) as u32) << 8) | pdu[1] as u32, 2)
            }
        };
        let (so, len) = match si {
            SiField::MiddleSegment | SiField::LastSegment => (read_so(pdu, sn_len)?, sn_len + SO_FIELD_LEN),
            _ => (0, sn_len),
        };
        let header = Self { position: SegmentPosition::from_wire(si, so), sn };
        Ok((header, len))
    }
}

/// AMD PDU header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmdHeader {
    /// Polling bit
    pub poll: bool,
    /// Position of the payload in its SDU
    pub position: SegmentPosition,
    /// Sequence number of the SDU
    pub sn: u32,
}

impl AmdHeader {
    /// Header length for a payload at `position`
    pub fn header_len(sn_size: AmSnSize, position: SegmentPosition) -> usize {
        let sn_len = match sn_size {
            AmSnSize::Size12 => 2,
            AmSnSize::Size18 => 3,
        };
        if position.has_so() {
            sn_len + SO_FIELD_LEN
        } else {
            sn_len
        }
    }

    /// Append the header to `buf`
    pub fn write(&self, sn_size: AmSnSize, buf: &mut BytesMut) -> Result<(), PduError> {
        check_sn(self.sn, sn_size.bits())?;
        let first = 0x80 | ((self.poll as u8) << 6) | (self.position.si().bits() << 4);
        match sn_size {
            AmSnSize::Size12 => {
                buf.put_u8(first | ((self.sn >> 8) & 0x0F) as u8);
                buf.put_u8((self.sn & 0xFF) as u8);
            }
            AmSnSize::Size18 => {
                buf.put_u8(first | ((self.sn >> 16) & 0x03) as u8);
                buf.put_u8(((self.sn >> 8) & 0xFF) as u8);
                buf.put_u8((self.sn & 0xFF) as u8);
            }
        }
        if self.position.has_so() {
            buf.put_u16(self.position.so());
        }
        Ok(())
    }

    /// Parse the header, returning it with its length
    pub fn parse(sn_size: AmSnSize, pdu: &[u8]) -> Result<(Self, usize), PduError> {
        check_len(pdu, 1)?;
        if !is_data_pdu(pdu) {
            return Err(PduError::UnexpectedControlPdu);
        }
        let poll = pdu[0] & 0x40 != 0;
        let si = SiField::from_bits(pdu[0] >> 4);
        let (sn, sn_len) = match sn_size {
            AmSnSize::Size12 => {
                check_len(pdu, 2)?;
                ((((pdu[0] & 0x0F) as u32) << 8) | pdu[1] as u32, 2)
            }
            AmSnSize::Size18 => {
                check_len(pdu, 3)?;
                let sn = (((pdu[0] & 0x03) as u32) << 16) | ((pdu[1] as u32) << 8) | pdu[2] as u32;
                (sn, 3)
            }
        };
        let (so, len) = match si {
            SiField::MiddleSegment | SiField::LastSegment => (read_so(pdu, sn_len)?, sn_len + SO_FIELD_LEN),
            _ => (0, sn_len),
        };
        let header = Self { poll, position: SegmentPosition::from_wire(si, so), sn };
        Ok((header, len))
    }
}

/// Build a PDU from an already encoded header writer and its payload
pub(crate) fn assemble(
    header_len: usize,
    payload: &Bytes,
    write_header: impl FnOnce(&mut BytesMut) -> Result<(), PduError>,
) -> Result<Bytes, PduError> {
    let mut buf = BytesMut::with_capacity(header_len + payload.len());
    write_header(&mut buf)?;
    buf.put_slice(payload);
    Ok(buf.freeze())
}
