/// Every configurable stage carries a `Config` with a module-specific default.
pub trait ConfigType {
    fn default() -> Self;
}

/// computes 'x * 2^exp'.
#[inline]
pub fn ldexp(x: f32, exp: i32) -> f32 {
    (x as f64 * 2_f64.powi(exp)) as f32
}

/// sign-extends the low 'bits' bits of 'value'.
#[inline]
pub(crate) fn sign_extend(value: u32, bits: u32) -> i32 {
    debug_assert!(bits > 0 && bits <= 32);
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// mask of the low 'bits' bits.
#[inline]
pub(crate) fn low_mask(bits: u32) -> u32 {
    if bits >= 32 { u32::MAX } else { (1 << bits) - 1 }
}

pub type Vec3 = [f32; 3];

#[cfg(test)]
pub(crate) fn sub3(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[cfg(test)]
pub(crate) fn dot3(a: Vec3, b: Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[cfg(test)]
pub(crate) fn length3(a: Vec3) -> f32 {
    dot3(a, a).sqrt()
}
