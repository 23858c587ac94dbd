use super::{PayloadWord, WORD_BITS};

/// Reads bit fields out of a word slice, LSB first.
/// Reads past the end of the slice yield zero bits, matching a decoder that
/// relies on the trailing pad word.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
	words: &'a [PayloadWord],
	bit_offset: usize,
}

impl<'a> BitReader<'a> {
	pub fn new(words: &'a [PayloadWord]) -> Self {
		Self { words, bit_offset: 0 }
	}

	pub fn seek(&mut self, bit_offset: usize) {
		self.bit_offset = bit_offset;
	}

	pub fn bit_offset(&self) -> usize {
		self.bit_offset
	}

	fn word(&self, idx: usize) -> PayloadWord {
		self.words.get(idx).copied().unwrap_or(0)
	}

	/// reads 'width' bits at the cursor and advances it.
	pub fn read(&mut self, width: u32) -> u32 {
		assert!(width <= 32, "Invalid width: {}", width);
		if width == 0 {
			return 0;
		}
		let word = self.bit_offset / WORD_BITS;
		let shift = (self.bit_offset % WORD_BITS) as u32;

		// two adjacent words as one 64-bit window
		let window = self.word(word) as u64 | ((self.word(word + 1) as u64) << 32);
		let value = (window >> shift) as u32;

		self.bit_offset += width as usize;
		if width == 32 { value } else { value & ((1 << width) - 1) }
	}
}
