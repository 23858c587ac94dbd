use crate::core::shared::Vec3;

/// rounds 'v' in [-1, 1] to a signed fixed-point value with 'bits' bits.
#[inline]
pub(crate) fn quantize_snorm(v: f32, bits: u32) -> i32 {
	let scale = ((1 << (bits - 1)) - 1) as f32;
	let round = if v >= 0.0 { 0.5 } else { -0.5 };
	let v = v.clamp(-1.0, 1.0);
	(v * scale + round) as i32
}

/// Transforms the direction to the octahedron space, in [-1, 1]^2.
/// The zero vector maps to the origin.
pub(crate) fn octahedral_transform(n: Vec3) -> [f32; 2] {
	let [x, y, z] = n;
	let abs_sum = x.abs() + y.abs() + z.abs();
	let s = if abs_sum == 0.0 { 0.0 } else { 1.0 / abs_sum };
	let (x, y) = (x * s, y * s);

	if z >= 0.0 {
		[x, y]
	} else {
		let x_sign = if x >= 0.0 { 1.0 } else { -1.0 };
		let y_sign = if y >= 0.0 { 1.0 } else { -1.0 };
		[(1.0 - y.abs()) * x_sign, (1.0 - x.abs()) * y_sign]
	}
}

/// Encodes a direction as two signed 8-bit octahedral coordinates.
pub fn encode_oct8(n: Vec3) -> [i8; 2] {
	octahedral_transform(n).map(|c| quantize_snorm(c, 8) as i8)
}

/// Data is transformed back from the octahedron space and normalized.
pub fn decode_oct8(e: [i8; 2]) -> Vec3 {
	let mut x = e[0] as f32 / 127.0;
	let mut y = e[1] as f32 / 127.0;
	let z = 1.0 - x.abs() - y.abs();

	// fold the lower hemisphere back
	let t = (-z).max(0.0);
	x -= if x >= 0.0 { t } else { -t };
	y -= if y >= 0.0 { t } else { -t };

	let norm = (x * x + y * y + z * z).sqrt();
	if norm == 0.0 {
		return [0.0; 3];
	}
	[x / norm, y / norm, z / norm]
}
