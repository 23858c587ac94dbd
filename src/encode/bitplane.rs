//! Per-chunk bitplane packing.
//!
//! Every chunk of an attribute stream stores a base value and a bit width in the
//! stream header, and `vertex_count` deltas in the payload. Element 'i' starts at bit
//! `i * components * bits`, components follow each other LSB first.

use std::iter;

use crate::core::buffer::{BitWriter, PayloadWord};
use crate::core::format::{Stream, StreamBase, IBO_BITS, VERTICES_PER_CHUNK};
use crate::core::shared::{low_mask, sign_extend};
use super::quantize::NormalTangent;

/// Bit widths in this range are promoted to 16 for three-component 16-bit streams;
/// the runtime reconstruction of positions is only exact at 16 bits or at most 12.
pub const PROMOTED_WIDTHS: std::ops::RangeInclusive<u32> = 13..=15;

/// Per-chunk sign class of the tangent handedness, stored two bits per chunk in `aux`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum SignClass {
    AllPositive = 1,
    AllNegative = 2,
    /// one explicit bit per vertex in the low bit of the last component.
    Mixed = 3,
}

impl SignClass {
    pub fn from_aux(aux: i32, chunk: usize) -> Option<Self> {
        match (aux >> (2 * chunk)) & 3 {
            1 => Some(SignClass::AllPositive),
            2 => Some(SignClass::AllNegative),
            3 => Some(SignClass::Mixed),
            _ => None,
        }
    }
}

/// the smallest width that holds 'delta'.
#[inline]
pub fn required_bits(delta: u32) -> u32 {
    if delta == 0 { 0 } else { 32 - delta.leading_zeros() }
}

/// Packs the triangles of one chunk at a fixed 5 bits per local index.
pub fn encode_primitive_chunk(payload: &mut Vec<PayloadWord>, triangles: &[[u8; 3]]) {
    let mut writer = BitWriter::with_capacity(triangles.len() * 3 * IBO_BITS as usize);
    for tri in triangles {
        debug_assert!(tri.iter().all(|&i| (i as usize) < VERTICES_PER_CHUNK));
        for &i in tri {
            writer.write(i as u32, IBO_BITS);
        }
    }
    writer.flush_into(payload);
}

/// Encodes one chunk of an attribute stream whose elements have 'N' components of
/// 'component_bits' bits each, given in local vertex order.
/// Records the base and width of 'chunk_index' in 'stream' and returns the width.
pub fn encode_attribute_chunk<const N: usize>(
    payload: &mut Vec<PayloadWord>,
    stream: &mut Stream,
    values: &[[u32; N]],
    component_bits: u32,
    chunk_index: usize,
) -> u32 {
    let Some(&first) = values.first() else {
        return 0;
    };
    let mask = low_mask(component_bits);

    let mut ulo = [u32::MAX; N];
    let mut uhi = [0_u32; N];
    let mut slo = [i32::MAX; N];
    let mut shi = [i32::MIN; N];

    // unused slots repeat the first value
    let padding = VERTICES_PER_CHUNK.saturating_sub(values.len());
    for v in values.iter().chain(iter::repeat(&first).take(padding)) {
        for c in 0..N {
            let u = v[c] & mask;
            let s = sign_extend(u, component_bits);
            ulo[c] = ulo[c].min(u);
            uhi[c] = uhi[c].max(u);
            slo[c] = slo[c].min(s);
            shi[c] = shi[c].max(s);
        }
    }

    let diff_unsigned = (0..N).map(|c| uhi[c] - ulo[c]).max().unwrap_or(0);
    let diff_signed = (0..N)
        .map(|c| (shi[c].wrapping_sub(slo[c]) as u32) & mask)
        .max()
        .unwrap_or(0);

    let (base, max_delta) = if diff_signed < diff_unsigned {
        (slo.map(|s| s as u32 & mask), diff_signed)
    } else {
        (ulo, diff_unsigned)
    };

    let mut bits = required_bits(max_delta);
    if component_bits == 16 && N == 3 && PROMOTED_WIDTHS.contains(&bits) {
        bits = 16;
    }

    write_base(stream, &base, component_bits, chunk_index);
    stream.bits_per_chunk |= bits << (8 * chunk_index);

    let mut writer = BitWriter::with_capacity(values.len() * N * bits as usize);
    for (i, v) in values.iter().enumerate() {
        writer.seek(i * N * bits as usize);
        for c in 0..N {
            writer.write(v[c].wrapping_sub(base[c]) & mask, bits);
        }
    }
    writer.flush_into(payload);

    bits
}

/// ORs the base components of 'chunk_index' into the stream's base words.
fn write_base<const N: usize>(stream: &mut Stream, base: &[u32; N], component_bits: u32, chunk_index: usize) {
    let StreamBase::Values(words) = &mut stream.base else {
        return;
    };
    let mut writer = BitWriter::new();
    writer.seek(chunk_index * N * component_bits as usize);
    for &b in base {
        writer.write(b, component_bits);
    }
    for (dst, src) in words.iter_mut().zip(writer.into_words()) {
        *dst |= src;
    }
}

/// Encodes one chunk of the normal/tangent stream.
/// The handedness of every vertex is classified per chunk into `aux`; only mixed
/// chunks carry it in the payload, in the low bit of the tangent's last component.
pub fn encode_normal_tangent_chunk(
    payload: &mut Vec<PayloadWord>,
    stream: &mut Stream,
    nts: &[NormalTangent],
    chunk_index: usize,
) -> u32 {
    let count = nts.len();
    let mut sign_mask = nts.iter()
        .enumerate()
        .fold(0_u32, |acc, (i, nt)| acc | (nt.t_sign as u32) << i);

    if count < VERTICES_PER_CHUNK && sign_mask == low_mask(count as u32) {
        sign_mask = u32::MAX;
    }

    let class = match sign_mask {
        0 => SignClass::AllPositive,
        u32::MAX => SignClass::AllNegative,
        _ => SignClass::Mixed,
    };
    stream.aux |= (class as i32) << (2 * chunk_index);

    let values: Vec<[u32; 4]> = nts.iter()
        .enumerate()
        .map(|(i, nt)| {
            let mut v = [nt.n[0], nt.n[1], nt.t[0], nt.t[1]].map(|c| c as u8 as u32);
            if class == SignClass::Mixed {
                v[3] = (v[3] & !1) | ((sign_mask >> i) & 1);
            }
            v
        })
        .collect();

    encode_attribute_chunk(payload, stream, &values, 8, chunk_index)
}

/// widens signed 16-bit components to the unsigned stream representation.
pub(crate) fn widen_i16<const N: usize>(v: [i16; N]) -> [u32; N] {
    v.map(|c| c as u16 as u32)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::StreamType;

    #[test]
    fn required_bits_table() {
        assert_eq!(required_bits(0), 0);
        assert_eq!(required_bits(1), 1);
        assert_eq!(required_bits(2), 2);
        assert_eq!(required_bits(255), 8);
        assert_eq!(required_bits(256), 9);
        assert_eq!(required_bits(u32::MAX), 32);
    }

    #[test]
    fn single_triangle_primitive_word() {
        let mut payload = Vec::new();
        encode_primitive_chunk(&mut payload, &[[0, 1, 2]]);
        assert_eq!(payload, vec![0x820]);

        // 15 bits per triangle
        let mut payload = Vec::new();
        encode_primitive_chunk(&mut payload, &[[0, 1, 2]; 5]);
        assert_eq!(payload.len(), 3);
    }

    #[test]
    fn signed_range_wins_when_straddling_zero() {
        let mut stream = Stream::new(StreamType::UV);
        let mut payload = Vec::new();
        let bits = encode_attribute_chunk(&mut payload, &mut stream, &[[0xFFFF, 0], [1, 0]], 16, 0);
        assert_eq!(bits, 2);
        assert_eq!(stream.bits(0), 2);
        assert_eq!(stream.base.to_words()[0], 0xFFFF);
        assert_eq!(payload, vec![0b10 << 4]);
    }

    #[test]
    fn unsigned_range_when_smaller() {
        let mut stream = Stream::new(StreamType::UV);
        let mut payload = Vec::new();
        // 0x7FFF and 0x8000 are adjacent unsigned, far apart signed
        let bits = encode_attribute_chunk(&mut payload, &mut stream, &[[0x7FFF, 3], [0x8000, 3]], 16, 1);
        assert_eq!(bits, 1);
        assert_eq!(stream.bits(1), 1);
        assert_eq!(stream.base.to_words()[1], 0x7FFF | 3 << 16);
        assert_eq!(payload, vec![0b01 << 2]);
    }

    #[test]
    fn position_widths_13_to_15_promote_to_16() {
        for (range, expected) in [(4095_u32, 12), (4096, 16), (0x7FFF, 16), (0x8000, 16)] {
            let mut stream = Stream::new(StreamType::Position);
            let mut payload = Vec::new();
            let bits = encode_attribute_chunk(&mut payload, &mut stream, &[[0, 0, 0], [range, 0, 0]], 16, 0);
            assert_eq!(bits, expected, "range {}", range);
        }

        // two-component streams are not promoted
        let mut stream = Stream::new(StreamType::UV);
        let bits = encode_attribute_chunk(&mut Vec::new(), &mut stream, &[[0, 0], [4096, 0]], 16, 0);
        assert_eq!(bits, 13);
    }

    #[test]
    fn constant_chunk_takes_no_payload() {
        let mut stream = Stream::new(StreamType::Position);
        let mut payload = vec![7];
        let bits = encode_attribute_chunk(&mut payload, &mut stream, &[[5, 6, 7]; 10], 16, 2);
        assert_eq!(bits, 0);
        assert_eq!(payload, vec![7]);
        // chunk 2 base starts at bit 96
        assert_eq!(stream.base.to_words()[3], 5 | 6 << 16);
        assert_eq!(stream.base.to_words()[4], 7);
    }

    #[test]
    fn payload_word_count() {
        let values: Vec<[u32; 3]> = (0..7).map(|i| [i, 0, 0]).collect();
        let mut payload = Vec::new();
        let bits = encode_attribute_chunk(&mut payload, &mut Stream::new(StreamType::Position), &values, 16, 0);
        assert_eq!(bits, 3);
        // 7 elements * 3 components * 3 bits
        assert_eq!(payload.len(), 2);
    }

    fn nt(t_sign: bool) -> NormalTangent {
        NormalTangent { n: [0, 127], t: [-127, 0], t_sign }
    }

    #[test]
    fn handedness_classes() {
        let mut stream = Stream::new(StreamType::NormalTangentOct8);
        encode_normal_tangent_chunk(&mut Vec::new(), &mut stream, &[nt(false); 3], 0);
        encode_normal_tangent_chunk(&mut Vec::new(), &mut stream, &[nt(true); 3], 1);
        let mut payload = Vec::new();
        encode_normal_tangent_chunk(&mut payload, &mut stream, &[nt(false), nt(true)], 2);

        assert_eq!(SignClass::from_aux(stream.aux, 0), Some(SignClass::AllPositive));
        assert_eq!(SignClass::from_aux(stream.aux, 1), Some(SignClass::AllNegative));
        assert_eq!(SignClass::from_aux(stream.aux, 2), Some(SignClass::Mixed));
        assert_eq!(SignClass::from_aux(stream.aux, 3), None);
        assert_eq!(stream.aux, 1 | 2 << 2 | 3 << 4);

        // only the sign bit differs in the mixed chunk
        assert_eq!(stream.bits(2), 1);
        assert_eq!(payload, vec![1 << 7]);
    }

    #[test]
    fn full_chunk_all_negative() {
        let mut stream = Stream::new(StreamType::NormalTangentOct8);
        encode_normal_tangent_chunk(&mut Vec::new(), &mut stream, &[nt(true); VERTICES_PER_CHUNK], 0);
        assert_eq!(SignClass::from_aux(stream.aux, 0), Some(SignClass::AllNegative));
    }
}
