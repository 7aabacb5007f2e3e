//! STATUS PDU
//!
//! TS 38.322 Section 6.2.2.5. The layout is the same for 12 and 18 bit SNs
//! apart from the width of the SN fields and the reserved padding that
//! brings every group back to a byte boundary:
//!
//! ```text
//! header:  D/C(1)=0 CPT(3)=000 ACK_SN(w) E1(1) R..
//! per NACK: NACK_SN(w) E1(1) E2(1) E3(1) R..  [SO_start(16) SO_end(16)]  [NACK_range(8)]
//! ```

use super::config::AmSnSize;
use super::pdu::PduError;
use super::sn::SnSpace;
use bytes::{BufMut, Bytes, BytesMut};
use nom::bits::complete::take;
use nom::IResult;

/// SO_end value meaning "up to the last byte of the SDU"
pub const SO_END_OF_SDU: u16 = 0xFFFF;

/// Largest value of the NACK range field
pub const MAX_NACK_RANGE: u8 = 255;

/// Missing byte range of one SDU; `end` is the offset of the last missing
/// byte, or [`SO_END_OF_SDU`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoRange {
    pub start: u16,
    pub end: u16,
}

impl SoRange {
    /// Range from `start` to the end of the SDU
    pub fn to_end(start: u16) -> Self {
        Self { start, end: SO_END_OF_SDU }
    }

    pub fn reaches_end(&self) -> bool {
        self.end == SO_END_OF_SDU
    }

    /// Half-open byte range inside an SDU of `sdu_len` bytes, `None` when
    /// the range does not fit the SDU
    pub fn resolve(&self, sdu_len: usize) -> Option<(usize, usize)> {
        let start = self.start as usize;
        let end = if self.reaches_end() { sdu_len } else { self.end as usize + 1 };
        if start >= end || end > sdu_len {
            return None;
        }
        Some((start, end))
    }
}

/// One NACK element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusNack {
    pub sn: u32,
    pub so: Option<SoRange>,
    /// Number of consecutive SDUs starting at `sn` covered by this NACK
    pub range: Option<u8>,
}

impl StatusNack {
    /// NACK of a whole SDU
    pub fn whole(sn: u32) -> Self {
        Self { sn, so: None, range: None }
    }

    /// NACK of a byte range of one SDU
    pub fn segment(sn: u32, so: SoRange) -> Self {
        Self { sn, so: Some(so), range: None }
    }

    /// Number of SDUs this element covers
    pub fn sdu_count(&self) -> u32 {
        self.range.map(u32::from).unwrap_or(1)
    }

    /// Per-SDU view: `(sn, missing range)` with `None` meaning the whole SDU.
    /// With a NACK range the SO start applies to the first SDU and the SO end
    /// to the last one.
    pub fn expand(&self, space: SnSpace) -> impl Iterator<Item = (u32, Option<SoRange>)> + '_ {
        let count = self.sdu_count();
        (0..count).map(move |i| {
            let so = match self.so {
                None => None,
                Some(so) if count == 1 => Some(so),
                Some(so) if i == 0 => Some(SoRange::to_end(so.start)),
                Some(so) if i == count - 1 => Some(SoRange { start: 0, end: so.end }),
                Some(_) => None,
            };
            (space.add(self.sn, i), so)
        })
    }

    fn packed_size(&self, sn_bits: usize) -> usize {
        let mut size = (sn_bits + 3).div_ceil(8);
        if self.so.is_some() {
            size += 4;
        }
        if self.range.is_some() {
            size += 1;
        }
        size
    }
}

/// Decoded STATUS PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPdu {
    /// Next SN not reported as missing; everything below it that is not
    /// NACKed is acknowledged
    pub ack_sn: u32,
    pub nacks: Vec<StatusNack>,
}

impl StatusPdu {
    pub fn new(ack_sn: u32) -> Self {
        Self { ack_sn, nacks: Vec::new() }
    }

    /// Append a NACK in SN order. Whole-SDU NACKs directly following another
    /// whole-SDU NACK are merged into its NACK range; byte-range NACKs are
    /// never merged.
    pub fn push_nack(&mut self, space: SnSpace, sn: u32, so: Option<SoRange>) {
        if so.is_none() {
            if let Some(last) = self.nacks.last_mut() {
                let count = last.sdu_count();
                let adjacent = space.add(last.sn, count) == sn;
                if last.so.is_none() && adjacent && count < MAX_NACK_RANGE as u32 {
                    last.range = Some((count + 1) as u8);
                    return;
                }
            }
        }
        self.nacks.push(StatusNack { sn, so, range: None });
    }

    /// Number of SDUs reported missing (fully or partially)
    pub fn nacked_sdus(&self) -> u32 {
        self.nacks.iter().map(StatusNack::sdu_count).sum()
    }

    /// Encoded size in bytes
    pub fn packed_size(&self, sn_size: AmSnSize) -> usize {
        let sn_bits = sn_size.bits() as usize;
        let header = (4 + sn_bits + 1).div_ceil(8);
        header + self.nacks.iter().map(|n| n.packed_size(sn_bits)).sum::<usize>()
    }

    /// Drop trailing NACKs until the PDU fits `max_bytes`. ACK_SN moves back
    /// to the first dropped NACK so nothing unreported is acknowledged.
    /// Returns false if not even the header fits.
    pub fn trim(&mut self, sn_size: AmSnSize, max_bytes: usize) -> bool {
        while self.packed_size(sn_size) > max_bytes {
            match self.nacks.pop() {
                Some(dropped) => self.ack_sn = dropped.sn,
                None => return false,
            }
        }
        true
    }

    /// Serialize to wire format
    pub fn encode(&self, sn_size: AmSnSize) -> Result<Bytes, PduError> {
        let bits = sn_size.bits();
        let space = sn_size.space();
        let check = |sn: u32| {
            if space.is_valid(sn) {
                Ok(())
            } else {
                Err(PduError::SnOverflow { sn, bits })
            }
        };

        check(self.ack_sn)?;
        let mut writer = BitWriter::with_capacity(self.packed_size(sn_size));
        writer.put(0, 1); // D/C
        writer.put(0, 3); // CPT
        writer.put(self.ack_sn, bits);
        writer.put(!self.nacks.is_empty() as u32, 1);
        writer.align();

        for (i, nack) in self.nacks.iter().enumerate() {
            check(nack.sn)?;
            if nack.range == Some(0) {
                return Err(PduError::MalformedStatus("zero NACK range"));
            }
            let more = i + 1 < self.nacks.len();
            writer.put(nack.sn, bits);
            writer.put(more as u32, 1);
            writer.put(nack.so.is_some() as u32, 1);
            writer.put(nack.range.is_some() as u32, 1);
            writer.align();
            if let Some(so) = nack.so {
                writer.put(so.start as u32, 16);
                writer.put(so.end as u32, 16);
            }
            if let Some(range) = nack.range {
                writer.put(range as u32, 8);
            }
        }
        Ok(writer.finish())
    }

    /// Parse a STATUS PDU. Trailing padding after the last NACK is ignored.
    pub fn decode(sn_size: AmSnSize, pdu: &[u8]) -> Result<Self, PduError> {
        if pdu.is_empty() {
            return Err(PduError::Truncated { needed: 1, got: 0 });
        }
        let w = sn_size.bits() as usize;

        let (input, dc) = field((pdu, 0), 1).map_err(truncated)?;
        if dc != 0 {
            return Err(PduError::UnexpectedDataPdu);
        }
        let (input, cpt) = field(input, 3).map_err(truncated)?;
        if cpt != 0 {
            return Err(PduError::UnsupportedCpt(cpt as u8));
        }
        let (input, ack_sn) = field(input, w).map_err(truncated)?;
        let (input, e1) = field(input, 1).map_err(truncated)?;
        let (mut input, _) = align(input).map_err(truncated)?;

        let mut status = StatusPdu::new(ack_sn);
        let mut more = e1 == 1;
        while more {
            let (rest, (nack, next)) = parse_nack(input, w).map_err(truncated)?;
            if nack.range == Some(0) {
                return Err(PduError::MalformedStatus("zero NACK range"));
            }
            if let Some(so) = nack.so {
                if !so.reaches_end() && so.start > so.end && nack.range.is_none() {
                    return Err(PduError::MalformedStatus("SO_start beyond SO_end"));
                }
            }
            status.nacks.push(nack);
            input = rest;
            more = next;
        }
        Ok(status)
    }
}

type BitInput<'a> = (&'a [u8], usize);

fn field(input: BitInput<'_>, count: usize) -> IResult<BitInput<'_>, u32> {
    take(count)(input)
}

fn align(input: BitInput<'_>) -> IResult<BitInput<'_>, ()> {
    let pad = (8 - input.1) % 8;
    let (rest, _) = field(input, pad)?;
    Ok((rest, ()))
}

fn parse_nack(input: BitInput<'_>, w: usize) -> IResult<BitInput<'_>, (StatusNack, bool)> {
    let (input, sn) = field(input, w)?;
    let (input, e1) = field(input, 1)?;
    let (input, e2) = field(input, 1)?;
    let (input, e3) = field(input, 1)?;
    let (mut input, _) = align(input)?;

    let mut so = None;
    if e2 == 1 {
        let (rest, start) = field(input, 16)?;
        let (rest, end) = field(rest, 16)?;
        so = Some(SoRange { start: start as u16, end: end as u16 });
        input = rest;
    }
    let mut range = None;
    if e3 == 1 {
        let (rest, value) = field(input, 8)?;
        range = Some(value as u8);
        input = rest;
    }
    Ok((input, (StatusNack { sn, so, range }, e1 == 1)))
}

fn truncated<E>(_: nom::Err<E>) -> PduError {
    PduError::MalformedStatus("truncated status PDU")
}

/// MSB-first bit packer
struct BitWriter {
    buf: BytesMut,
    acc: u8,
    used: u8,
}

impl BitWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self { buf: BytesMut::with_capacity(capacity), acc: 0, used: 0 }
    }

    fn put(&mut self, value: u32, bits: u8) {
        for i in (0..bits).rev() {
            self.acc = (self.acc << 1) | ((value >> i) & 1) as u8;
            self.used += 1;
            if self.used == 8 {
                self.buf.put_u8(self.acc);
                self.acc = 0;
                self.used = 0;
            }
        }
    }

    fn align(&mut self) {
        if self.used > 0 {
            self.buf.put_u8(self.acc << (8 - self.used));
            self.acc = 0;
            self.used = 0;
        }
    }

    fn finish(mut self) -> Bytes {
        self.align();
        self.buf.freeze()
    }
}
