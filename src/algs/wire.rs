//! Fixed, versioned wire types for field exchange frames.
//!
//! One frame travels per (field, peer, exchange):
//!
//! ```text
//! WireHdr | WireCount (entities) | WireCount (components) | payload
//! ```
//!
//! Header integers are little-endian. Gid payloads are `WireGid` records
//! (little-endian `u64`); value payloads are the raw element bytes.

use bytemuck::{Pod, Zeroable};
use itertools::Itertools;
use std::mem::{align_of, size_of};

use crate::data::internal_field::ElementType;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Copy `bytes` into a freshly allocated, correctly aligned `Vec<T>`.
pub fn collect_pod<T: Pod>(bytes: &[u8]) -> Result<Vec<T>, String> {
    if bytes.len() % size_of::<T>() != 0 {
        return Err(format!(
            "{} payload bytes are not a multiple of {}",
            bytes.len(),
            size_of::<T>()
        ));
    }
    Ok(bytemuck::pod_collect_to_vec(bytes))
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// What a frame carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum FrameKind {
    Gids = 1,
    Data = 2,
}

impl FrameKind {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(FrameKind::Gids),
            2 => Some(FrameKind::Data),
            _ => None,
        }
    }
}

// ===== Common records ======================================================

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,  // = WIRE_VERSION.to_le()
    pub kind_le: u16,     // FrameKind
    pub elem_le: u16,     // ElementType::code(), 0 for gid frames
    pub reserved_le: u16, // future use; keep zero
}

impl WireHdr {
    pub fn new(kind: FrameKind, elem: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: (kind as u16).to_le(),
            elem_le: elem.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn elem(&self) -> u16 {
        u16::from_le(self.elem_le)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32, // count of following records
}
impl WireCount {
    /// Counts past `u32::MAX` do not fit the header.
    pub fn new(n: usize) -> Result<Self, String> {
        let n = u32::try_from(n).map_err(|_| format!("count {n} exceeds the u32 wire header"))?;
        Ok(Self { n_le: n.to_le() })
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// A global id carried on the wire.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireGid {
    pub id_le: u64,
}
impl WireGid {
    pub fn of(id: u64) -> Self {
        Self { id_le: id.to_le() }
    }
    pub fn get(&self) -> u64 {
        u64::from_le(self.id_le)
    }
}

pub const FRAME_PREFIX: usize = size_of::<WireHdr>() + 2 * size_of::<WireCount>();

// ===== Compile-time sanity checks =========================================

const _: () = {
    assert!(size_of::<WireHdr>() == 8);
    assert!(size_of::<WireCount>() == 4);
    assert!(size_of::<WireGid>() == 8);
    assert!(align_of::<WireGid>() == 8);
    assert!(FRAME_PREFIX == 16);
};
static_assertions::const_assert_eq!(size_of::<WireHdr>() % align_of::<WireCount>(), 0);

/// Encode one frame around `payload` (`count * components` records).
pub fn encode_frame<T: Pod>(
    kind: FrameKind,
    elem: u16,
    count: usize,
    components: usize,
    payload: &[T],
) -> Result<Vec<u8>, String> {
    let count = WireCount::new(count)?;
    let components = WireCount::new(components)?;
    let bytes = cast_slice(payload);
    let mut out = Vec::with_capacity(FRAME_PREFIX + bytes.len());
    out.extend_from_slice(bytemuck::bytes_of(&WireHdr::new(kind, elem)));
    out.extend_from_slice(bytemuck::bytes_of(&count));
    out.extend_from_slice(bytemuck::bytes_of(&components));
    out.extend_from_slice(bytes);
    Ok(out)
}

/// Gid frame for `gids`.
pub fn encode_gids(gids: &[u64]) -> Result<Vec<u8>, String> {
    let recs: Vec<WireGid> = gids.iter().map(|&g| WireGid::of(g)).collect();
    encode_frame(FrameKind::Gids, 0, gids.len(), 1, &recs)
}

/// Data frame for `values` of element type `elem`.
pub fn encode_values<T: Pod>(
    elem: ElementType,
    count: usize,
    components: usize,
    values: &[T],
) -> Result<Vec<u8>, String> {
    encode_frame(FrameKind::Data, elem.code(), count, components, values)
}

/// Decoded frame prefix plus a borrowed payload.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    pub kind: FrameKind,
    pub elem: u16,
    pub count: usize,
    pub components: usize,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Parse the prefix and check version and kind.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, String> {
        if bytes.len() < FRAME_PREFIX {
            return Err(format!(
                "frame of {} bytes is shorter than its {FRAME_PREFIX}-byte prefix",
                bytes.len()
            ));
        }
        let hdr: WireHdr = bytemuck::pod_read_unaligned(&bytes[..8]);
        if hdr.version() != WIRE_VERSION {
            return Err(format!(
                "wire version {} (expected {WIRE_VERSION})",
                hdr.version()
            ));
        }
        let kind = FrameKind::from_u16(hdr.kind())
            .ok_or_else(|| format!("unknown frame kind {}", hdr.kind()))?;
        let count: WireCount = bytemuck::pod_read_unaligned(&bytes[8..12]);
        let components: WireCount = bytemuck::pod_read_unaligned(&bytes[12..16]);
        Ok(Self {
            kind,
            elem: hdr.elem(),
            count: count.get(),
            components: components.get(),
            payload: &bytes[FRAME_PREFIX..],
        })
    }

    /// Payload must hold exactly `count * components` records.
    pub fn check_payload(&self, record_size: usize) -> Result<(), String> {
        expect_exact_len(self.payload.len(), self.count * self.components * record_size)
    }

    pub fn gids(&self) -> Result<Vec<u64>, String> {
        self.check_payload(size_of::<WireGid>())?;
        Ok(collect_pod::<WireGid>(self.payload)?
            .iter()
            .map(WireGid::get)
            .collect())
    }
}

/// Canonical multi-destination message: `data[offsets[i]..offsets[i + 1]]`
/// goes to `dests[i]`. Offsets count elements, not entities.
#[derive(Clone, Debug, PartialEq)]
pub struct PackedMessage<T> {
    pub data: Vec<T>,
    pub offsets: Vec<usize>,
    pub dests: Vec<usize>,
}

impl<T> PackedMessage<T> {
    /// `offsets` has one more entry than `dests`, starts at zero, never
    /// decreases and ends at `data.len()`.
    pub fn validate(&self) -> Result<(), String> {
        if self.offsets.len() != self.dests.len() + 1 {
            return Err(format!(
                "{} offsets for {} destinations",
                self.offsets.len(),
                self.dests.len()
            ));
        }
        if self.offsets.first() != Some(&0) {
            return Err("offsets must start at 0".into());
        }
        if let Some((a, b)) = self.offsets.iter().tuple_windows().find(|(a, b)| a > b) {
            return Err(format!("offsets decrease from {a} to {b}"));
        }
        if self.offsets.last() != Some(&self.data.len()) {
            return Err(format!(
                "last offset {:?} does not match {} data elements",
                self.offsets.last(),
                self.data.len()
            ));
        }
        Ok(())
    }

    /// `(dest, slice)` pairs in destination order.
    pub fn segments(&self) -> impl Iterator<Item = (usize, &[T])> + '_ {
        self.dests
            .iter()
            .zip(self.offsets.iter().tuple_windows())
            .map(|(&d, (&a, &b))| (d, &self.data[a..b]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gid_frame_roundtrip() {
        let bytes = encode_gids(&[3, 1 << 40, 7]).unwrap();
        let f = Frame::decode(&bytes).unwrap();
        assert_eq!(f.kind, FrameKind::Gids);
        assert_eq!(f.count, 3);
        assert_eq!(f.gids().unwrap(), vec![3, 1 << 40, 7]);
    }

    #[test]
    fn value_frame_carries_shape_and_type() {
        let bytes = encode_values(ElementType::F32, 2, 2, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let f = Frame::decode(&bytes).unwrap();
        f.check_payload(4).unwrap();
        assert_eq!((f.count, f.components), (2, 2));
        assert_eq!(ElementType::from_code(f.elem), Some(ElementType::F32));
        assert_eq!(collect_pod::<f32>(f.payload).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn truncated_and_versioned_frames_rejected() {
        let mut bytes = encode_values(ElementType::I64, 1, 1, &[5i64]).unwrap();
        assert!(Frame::decode(&bytes[..10]).is_err());
        assert!(Frame::decode(&bytes[..20]).unwrap().check_payload(8).is_err());
        bytes[0] = 9;
        assert!(Frame::decode(&bytes).unwrap_err().contains("version"));
    }

    #[test]
    fn counts_beyond_u32_are_refused() {
        assert_eq!(WireCount::new(u32::MAX as usize).unwrap().get(), u32::MAX as usize);
        let too_many = u32::MAX as usize + 1;
        assert!(WireCount::new(too_many).unwrap_err().contains("u32"));
        // the payload is never inspected once the header fails
        assert!(encode_values::<f64>(ElementType::F64, too_many, 1, &[]).is_err());
        assert!(encode_values::<f64>(ElementType::F64, 1, too_many, &[]).is_err());
    }

    #[test]
    fn version_guard() {
        let hdr = WireHdr::new(FrameKind::Data, 2);
        assert_eq!(hdr.version(), WIRE_VERSION);
        assert_eq!(hdr.kind(), 2);
    }

    #[test]
    fn packed_message_invariants() {
        let ok = PackedMessage {
            data: vec![1, 2, 3],
            offsets: vec![0, 0, 3],
            dests: vec![0, 1],
        };
        ok.validate().unwrap();
        let segs: Vec<_> = ok.segments().collect();
        assert_eq!(segs, vec![(0, &[][..]), (1, &[1, 2, 3][..])]);

        let bad = PackedMessage {
            data: vec![1, 2, 3],
            offsets: vec![0, 2, 1, 3],
            dests: vec![0, 1, 2],
        };
        assert!(bad.validate().is_err());
        let short = PackedMessage {
            data: vec![1, 2, 3],
            offsets: vec![0, 2],
            dests: vec![0],
        };
        assert!(short.validate().is_err());
    }
}
