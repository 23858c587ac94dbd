pub mod bit_coder;
pub mod buffer;
pub mod format;
pub mod mesh;
pub mod shared;
