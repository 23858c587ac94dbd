use std::{slice, vec};

/// Little-endian byte sink used by the container writer.
pub trait ByteWriter: Sized {
    fn write_u8(&mut self, value: u8);
    fn write_u16(&mut self, value: u16) {
        self.write_u8(value as u8);
        self.write_u8((value >> 8) as u8);
    }
    fn write_u32(&mut self, value: u32) {
        self.write_u16(value as u16);
        self.write_u16((value >> 16) as u16);
    }
    fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }
    fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }
    fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_u8(b);
        }
    }
}

impl ByteWriter for Vec<u8> {
    fn write_u8(&mut self, value: u8) {
        self.push(value);
    }

    fn write_u16(&mut self, value: u16) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn write_u32(&mut self, value: u32) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

#[remain::sorted]
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderErr {
    #[error("Not enough data to read.")]
    NotEnoughData,
}

/// Little-endian byte source used by the container reader.
pub trait ByteReader {
    fn read_u8(&mut self) -> Result<u8, ReaderErr>;
    fn read_u16(&mut self) -> Result<u16, ReaderErr> {
        let out = [
            self.read_u8()?,
            self.read_u8()?
        ];
        Ok(u16::from_le_bytes(out))
    }
    fn read_u32(&mut self) -> Result<u32, ReaderErr> {
        let out = [
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?
        ];
        Ok(u32::from_le_bytes(out))
    }
    fn read_i32(&mut self) -> Result<i32, ReaderErr> {
        Ok(self.read_u32()? as i32)
    }
    fn read_f32(&mut self) -> Result<f32, ReaderErr> {
        Ok(f32::from_bits(self.read_u32()?))
    }
}

impl ByteReader for vec::IntoIter<u8> {
    fn read_u8(&mut self) -> Result<u8, ReaderErr> {
        self.next().ok_or(ReaderErr::NotEnoughData)
    }
}

impl ByteReader for slice::Iter<'_, u8> {
    fn read_u8(&mut self) -> Result<u8, ReaderErr> {
        self.next().copied().ok_or(ReaderErr::NotEnoughData)
    }

    fn read_u32(&mut self) -> Result<u32, ReaderErr> {
        let bytes = self.as_slice();
        if bytes.len() < 4 {
            return Err(ReaderErr::NotEnoughData);
        }
        let out = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        *self = bytes[4..].iter();
        Ok(out)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_layout() {
        let mut buffer = Vec::new();
        buffer.write_u16(0x0102);
        buffer.write_u32(0x03040506);
        buffer.write_i32(-2);
        buffer.write_f32(1.0);
        assert_eq!(
            buffer,
            vec![0x02, 0x01, 0x06, 0x05, 0x04, 0x03, 0xFE, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x80, 0x3F]
        );

        let mut reader = buffer.iter();
        assert_eq!(reader.read_u16().unwrap(), 0x0102);
        assert_eq!(reader.read_u32().unwrap(), 0x03040506);
        assert_eq!(reader.read_i32().unwrap(), -2);
        assert_eq!(reader.read_f32().unwrap(), 1.0);
        assert_eq!(reader.read_u8(), Err(ReaderErr::NotEnoughData));
    }

    #[test]
    fn short_reads_fail() {
        let mut reader = vec![1_u8, 2, 3].into_iter();
        assert_eq!(reader.read_u32(), Err(ReaderErr::NotEnoughData));

        let data = [1_u8, 2, 3];
        let mut reader = data.iter();
        assert_eq!(reader.read_u32(), Err(ReaderErr::NotEnoughData));
        assert_eq!(reader.read_u8().unwrap(), 1);
    }
}
