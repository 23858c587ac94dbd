pub mod octahedral;

use log::debug;
use thiserror::Error;

use crate::core::mesh::{AttributeFormat, Mesh, MeshAttribute};
use crate::core::shared::ldexp;

/// Fixed-point values sharing one power-of-two exponent: `value * 2^exp`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Quantized<const N: usize> {
    pub values: Vec<[i16; N]>,
    pub exp: i32,
}

/// Octahedral normal and tangent with the tangent's handedness.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NormalTangent {
    pub n: [i8; 2],
    pub t: [i8; 2],
    /// set when the bitangent is flipped (tangent w < 0).
    pub t_sign: bool,
}

#[remain::sorted]
#[derive(Error, Debug)]
pub enum Err {
    #[error("{:?} is stored as {:?}, which cannot be quantized.", .attribute, .format)]
    FormatUnsupported { attribute: MeshAttribute, format: AttributeFormat },

    #[error("{:?} does not fit in the vertex layout.", .0)]
    InvalidLayout(MeshAttribute),

    #[error("{:?} is required but absent.", .0)]
    MissingAttribute(MeshAttribute),
}

/// The scale that brings 'max_value' into [2^14, 2^15).
/// A zero range is treated as if the maximum were in [1, 2).
pub fn compute_log2_scale(max_value: f32) -> i32 {
    if !(max_value > 0.0) || !max_value.is_finite() {
        return 14;
    }
    14 - max_value.log2().floor() as i32
}

#[inline]
fn encode_snorm_exp<const N: usize>(v: [f32; N], scale_log2: i32) -> [i16; N] {
    v.map(|c| ldexp(c, scale_log2).round().clamp(-32768.0, 32767.0) as i16)
}

/// reconstructs the floats of a fixed-point vector.
pub fn decode_snorm_exp<const N: usize>(v: [i16; N], exp: i32) -> [f32; N] {
    v.map(|c| ldexp(c as f32, exp))
}

/// Shifts out the low bits no value uses and folds the shift into 'exp'.
pub(crate) fn adjust_quant<const N: usize>(values: &mut [[i16; N]], exp: &mut i32) {
    let active_bits = values.iter()
        .flatten()
        .fold(0_u32, |acc, &c| acc | c as i32 as u32);
    if active_bits == 0 {
        return;
    }

    let extra_shift = active_bits.trailing_zeros();
    for c in values.iter_mut().flatten() {
        *c >>= extra_shift;
    }
    *exp += extra_shift as i32;
}

/// validates that 'attr' lies inside every vertex of its buffer and returns its format.
fn channel_format(mesh: &Mesh, attr: MeshAttribute) -> Result<AttributeFormat, Err> {
    let layout = mesh.get_layout(attr);
    if layout.format == AttributeFormat::Undefined {
        return Ok(layout.format);
    }
    let (stride, len) = if attr == MeshAttribute::Position {
        (mesh.position_stride, mesh.positions.len())
    } else {
        (mesh.attribute_stride, mesh.attributes.len())
    };
    let end = layout.offset as usize + layout.format.size();
    if end > stride || len < stride * mesh.vertex_count() {
        return Err(Err::InvalidLayout(attr));
    }
    Ok(layout.format)
}

pub fn quantize_positions(mesh: &Mesh, max_scale_log2: i32) -> Result<Quantized<3>, Err> {
    let attribute = MeshAttribute::Position;
    match channel_format(mesh, attribute)? {
        AttributeFormat::R32G32B32Sfloat | AttributeFormat::R32G32B32A32Sfloat => {}
        AttributeFormat::Undefined => return Err(Err::MissingAttribute(attribute)),
        format => return Err(Err::FormatUnsupported { attribute, format }),
    }

    let positions: Vec<[f32; 3]> = (0..mesh.vertex_count())
        .map(|i| mesh.read_f32s::<3>(attribute, i))
        .collect();

    let max_value = positions.iter()
        .flatten()
        .fold(0.0_f32, |acc, c| acc.max(c.abs()));
    let scale_log2 = compute_log2_scale(max_value).min(max_scale_log2);

    let mut values: Vec<_> = positions.iter()
        .map(|&p| encode_snorm_exp(p, scale_log2))
        .collect();
    let mut exp = -scale_log2;
    adjust_quant(&mut values, &mut exp);

    debug!("Quantized {} positions with exponent {}.", values.len(), exp);
    Ok(Quantized { values, exp })
}

/// Quantizes UVs after remapping [0, 1] to [-1, 1].
/// Decoding is `0.5 * (value * 2^exp) + 0.5`.
pub fn quantize_uvs(mesh: &Mesh) -> Result<Quantized<2>, Err> {
    let attribute = MeshAttribute::UV;
    let num_vertices = mesh.vertex_count();
    let uvs: Vec<[f32; 2]> = match channel_format(mesh, attribute)? {
        AttributeFormat::R32G32Sfloat => (0..num_vertices)
            .map(|i| mesh.read_f32s::<2>(attribute, i))
            .collect(),
        AttributeFormat::R16G16Unorm => (0..num_vertices)
            .map(|i| mesh.read_u16s::<2>(attribute, i).map(|c| c as f32 / 65535.0))
            .collect(),
        AttributeFormat::Undefined => return Err(Err::MissingAttribute(attribute)),
        format => return Err(Err::FormatUnsupported { attribute, format }),
    };

    let uvs: Vec<[f32; 2]> = uvs.into_iter()
        .map(|uv| uv.map(|c| 2.0 * c - 1.0))
        .collect();
    let max_value = uvs.iter()
        .flatten()
        .fold(0.0_f32, |acc, c| acc.max(c.abs()));
    let scale_log2 = compute_log2_scale(max_value);

    let mut values: Vec<_> = uvs.iter()
        .map(|&uv| encode_snorm_exp(uv, scale_log2))
        .collect();
    let mut exp = -scale_log2;
    adjust_quant(&mut values, &mut exp);

    debug!("Quantized {} UVs with exponent {}.", values.len(), exp);
    Ok(Quantized { values, exp })
}

/// Octahedral-encodes normals and tangents. One of the two may be absent,
/// in which case it encodes as the zero direction.
pub fn quantize_normal_tangents(mesh: &Mesh) -> Result<Vec<NormalTangent>, Err> {
    let num_vertices = mesh.vertex_count();

    let normal_format = channel_format(mesh, MeshAttribute::Normal)?;
    let normals: Vec<[f32; 3]> = match normal_format {
        AttributeFormat::R32G32B32Sfloat | AttributeFormat::R32G32B32A32Sfloat => (0..num_vertices)
            .map(|i| mesh.read_f32s::<3>(MeshAttribute::Normal, i))
            .collect(),
        AttributeFormat::Undefined => vec![[0.0; 3]; num_vertices],
        format => return Err(Err::FormatUnsupported { attribute: MeshAttribute::Normal, format }),
    };

    let tangent_format = channel_format(mesh, MeshAttribute::Tangent)?;
    let tangents: Vec<[f32; 4]> = match tangent_format {
        AttributeFormat::R32G32B32Sfloat => (0..num_vertices)
            .map(|i| {
                let [x, y, z] = mesh.read_f32s::<3>(MeshAttribute::Tangent, i);
                [x, y, z, 0.0]
            })
            .collect(),
        AttributeFormat::R32G32B32A32Sfloat => (0..num_vertices)
            .map(|i| mesh.read_f32s::<4>(MeshAttribute::Tangent, i))
            .collect(),
        AttributeFormat::Undefined => vec![[0.0; 4]; num_vertices],
        format => return Err(Err::FormatUnsupported { attribute: MeshAttribute::Tangent, format }),
    };

    if normal_format == AttributeFormat::Undefined && tangent_format == AttributeFormat::Undefined {
        return Err(Err::MissingAttribute(MeshAttribute::Normal));
    }

    Ok(normals.iter()
        .zip(&tangents)
        .map(|(&n, t)| NormalTangent {
            n: octahedral::encode_oct8(n),
            t: octahedral::encode_oct8([t[0], t[1], t[2]]),
            t_sign: t[3] < 0.0,
        })
        .collect())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::builder::MeshBuilder;

    #[test]
    fn log2_scale() {
        assert_eq!(compute_log2_scale(1.0), 14);
        assert_eq!(compute_log2_scale(1.99), 14);
        assert_eq!(compute_log2_scale(2.0), 13);
        assert_eq!(compute_log2_scale(0.5), 15);
        assert_eq!(compute_log2_scale(100.0), 8);
        assert_eq!(compute_log2_scale(0.0), 14);
    }

    #[test]
    fn trim_folds_common_zero_bits_into_exponent() {
        let mut values = vec![[0_i16, 4096, 2048], [-4096, 0, 0]];
        let mut exp = -12;
        adjust_quant(&mut values, &mut exp);
        assert_eq!(values, vec![[0, 2, 1], [-2, 0, 0]]);
        assert_eq!(exp, -1);

        let mut zeros = vec![[0_i16; 2]; 3];
        let mut exp = -14;
        adjust_quant(&mut zeros, &mut exp);
        assert_eq!(exp, -14);
    }

    #[test]
    fn positions_round_trip_within_one_step() {
        let positions = vec![[0.0, 0.0, 0.0], [1.25, -3.5, 0.001], [-7.9, 2.2, 5.5]];
        let mesh = MeshBuilder::new().set_positions(positions.clone()).build().unwrap();
        let q = quantize_positions(&mesh, 12).unwrap();
        // max |c| = 7.9 -> scale 12, trimmed by nothing
        assert_eq!(q.exp, -12);
        for (p, e) in positions.iter().zip(&q.values) {
            let d = decode_snorm_exp(*e, q.exp);
            for c in 0..3 {
                assert!((p[c] - d[c]).abs() <= ldexp(1.0, q.exp));
            }
        }
    }

    #[test]
    fn position_scale_is_clamped() {
        let mesh = MeshBuilder::new()
            .set_positions(vec![[0.001, 0.0, 0.0], [0.0, 0.0, 0.0]])
            .build()
            .unwrap();
        let q = quantize_positions(&mesh, 12).unwrap();
        // 0.001 * 2^12 rounds to 4
        assert_eq!(q.values[0], [1, 0, 0]);
        assert_eq!(q.exp, -10);
    }

    #[test]
    fn uvs_use_the_signed_range() {
        let mesh = MeshBuilder::new()
            .set_positions(vec![[0.0; 3]; 3])
            .add_attribute(MeshAttribute::UV, vec![[0.0_f32, 1.0], [1.0, 0.0], [0.5, 0.5]])
            .build()
            .unwrap();
        let q = quantize_uvs(&mesh).unwrap();
        assert_eq!(q.values, vec![[-1, 1], [1, -1], [0, 0]]);
        assert_eq!(q.exp, 0);
    }

    #[test]
    fn unorm_uvs() {
        let raw: Vec<u8> = [0_u16, 0xFFFF, 0xFFFF, 0].iter().flat_map(|c| c.to_le_bytes()).collect();
        let mesh = MeshBuilder::new()
            .set_positions(vec![[0.0; 3]; 2])
            .add_raw_attribute(MeshAttribute::UV, AttributeFormat::R16G16Unorm, raw)
            .build()
            .unwrap();
        let q = quantize_uvs(&mesh).unwrap();
        assert_eq!(q.values, vec![[-1, 1], [1, -1]]);
    }

    #[test]
    fn missing_and_unsupported_channels() {
        let mesh = MeshBuilder::new().set_positions(vec![[0.0; 3]; 3]).build().unwrap();
        assert!(matches!(quantize_uvs(&mesh), Err(Err::MissingAttribute(MeshAttribute::UV))));
        assert!(matches!(quantize_normal_tangents(&mesh), Err(Err::MissingAttribute(MeshAttribute::Normal))));

        let mesh = MeshBuilder::new()
            .set_positions(vec![[0.0; 3]; 1])
            .add_raw_attribute(MeshAttribute::UV, AttributeFormat::R8G8B8A8Unorm, vec![0; 4])
            .build()
            .unwrap();
        assert!(matches!(
            quantize_uvs(&mesh),
            Err(Err::FormatUnsupported { attribute: MeshAttribute::UV, format: AttributeFormat::R8G8B8A8Unorm })
        ));

        let mut mesh = Mesh::new();
        mesh.positions = vec![0; 12];
        mesh.position_stride = 12;
        assert!(matches!(quantize_positions(&mesh, 12), Err(Err::MissingAttribute(MeshAttribute::Position))));
    }

    #[test]
    fn normal_tangent_handedness() {
        let mesh = MeshBuilder::new()
            .set_positions(vec![[0.0; 3]; 2])
            .add_attribute(MeshAttribute::Normal, vec![[0.0_f32, 0.0, 1.0], [1.0, 0.0, 0.0]])
            .add_attribute(MeshAttribute::Tangent, vec![[1.0_f32, 0.0, 0.0, 1.0], [0.0, 0.0, -1.0, -1.0]])
            .build()
            .unwrap();
        let nt = quantize_normal_tangents(&mesh).unwrap();
        assert_eq!(nt[0], NormalTangent { n: [0, 0], t: [127, 0], t_sign: false });
        assert_eq!(nt[1], NormalTangent { n: [127, 0], t: [127, 127], t_sign: true });

        // tangent-less meshes encode a zero tangent
        let mesh = MeshBuilder::new()
            .set_positions(vec![[0.0; 3]; 1])
            .add_attribute(MeshAttribute::Normal, vec![[0.0_f32, 1.0, 0.0]])
            .build()
            .unwrap();
        let nt = quantize_normal_tangents(&mesh).unwrap();
        assert_eq!(nt[0], NormalTangent { n: [0, 127], t: [0, 0], t_sign: false });
    }
}
