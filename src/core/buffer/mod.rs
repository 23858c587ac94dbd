pub mod reader;
pub mod writer;

pub use reader::BitReader;
pub use writer::BitWriter;

/// The unit of the shared payload. Bits are addressed LSB first within a word,
/// and words are stored little-endian in the container.
pub type PayloadWord = u32;

pub(crate) const WORD_BITS: usize = PayloadWord::BITS as usize;

/// number of words needed to hold 'num_bits' bits.
#[inline]
pub fn words_for_bits(num_bits: usize) -> usize {
    (num_bits + WORD_BITS - 1) / WORD_BITS
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_reader_lsb_first() {
        let mut writer = BitWriter::new();
        writer.write(0b101010100, 9);
        writer.write(0b10101010, 8);
        writer.write(0b0101010, 7);
        writer.write(0b111100, 6);
        writer.write(0b00001, 5);
        writer.write(0b1100, 4);
        assert_eq!(writer.bit_offset(), 9+8+7+6+5+4);
        let words = writer.into_words();
        assert_eq!(words.len(), 2);

        let mut reader = BitReader::new(&words);
        assert_eq!(reader.read(9), 0b101010100);
        assert_eq!(reader.read(8), 0b10101010);
        assert_eq!(reader.read(7), 0b0101010);
        assert_eq!(reader.read(6), 0b111100);
        assert_eq!(reader.read(5), 0b00001);
        assert_eq!(reader.read(4), 0b1100);
    }

    #[test]
    fn test_word_boundary_straddle() {
        let mut writer = BitWriter::new();
        writer.write(0, 30);
        writer.write(0b1011, 4);
        let words = writer.into_words();
        assert_eq!(words, vec![0b11 << 30, 0b10]);

        let mut reader = BitReader::new(&words);
        reader.seek(30);
        assert_eq!(reader.read(4), 0b1011);
    }

    #[test]
    fn test_full_width_and_zero_width() {
        let mut writer = BitWriter::new();
        writer.write(0xDEADBEEF, 32);
        writer.write(0xFFFF, 0);
        writer.write(0x1, 1);
        assert_eq!(writer.bit_offset(), 33);
        let words = writer.into_words();
        assert_eq!(words, vec![0xDEADBEEF, 1]);

        let mut reader = BitReader::new(&words);
        assert_eq!(reader.read(32), 0xDEADBEEF);
        assert_eq!(reader.read(0), 0);
        assert_eq!(reader.read(1), 1);
    }

    #[test]
    fn test_seek_element_addressing() {
        // three 5-bit components per element, as the primitive stream packs them.
        let mut writer = BitWriter::new();
        for (i, tri) in [[0_u32, 1, 2], [31, 30, 29], [7, 8, 9]].iter().enumerate() {
            writer.seek(i * 3 * 5);
            for &c in tri {
                writer.write(c, 5);
            }
        }
        let words = writer.into_words();
        assert_eq!(words.len(), words_for_bits(45));

        let mut reader = BitReader::new(&words);
        reader.seek(15);
        assert_eq!([reader.read(5), reader.read(5), reader.read(5)], [31, 30, 29]);
    }

    #[test]
    fn test_reader_past_end_yields_zero() {
        let words = [0xFFFF_FFFF_u32];
        let mut reader = BitReader::new(&words);
        reader.seek(28);
        assert_eq!(reader.read(8), 0xF);
    }
}
