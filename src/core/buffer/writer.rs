use super::{words_for_bits, PayloadWord, WORD_BITS};

/// Bit-address cursor over a growable word buffer.
/// Values are written LSB first, starting at the current bit offset.
/// Writes OR into the buffer, so every bit is expected to be written at most once.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
	words: Vec<PayloadWord>,

	/// the bit offset where the next write starts.
	bit_offset: usize,

	/// the highest bit offset ever reached. Determines the flushed size.
	high_water: usize,
}

impl BitWriter {
	pub fn new() -> Self {
		Self::default()
	}

	/// A constructor that allocates the specified size (in bits) beforehand.
	pub fn with_capacity(num_bits: usize) -> Self {
		Self {
			words: Vec::with_capacity(words_for_bits(num_bits)),
			bit_offset: 0,
			high_water: 0,
		}
	}

	/// moves the cursor to 'bit_offset'. Bits skipped over stay zero.
	pub fn seek(&mut self, bit_offset: usize) {
		self.bit_offset = bit_offset;
		self.high_water = self.high_water.max(bit_offset);
	}

	pub fn bit_offset(&self) -> usize {
		self.bit_offset
	}

	/// writes the low 'width' bits of 'value' at the cursor and advances it.
	pub fn write(&mut self, value: u32, width: u32) {
		assert!(width <= 32, "Invalid width: {}", width);
		if width == 0 {
			return;
		}
		let value = if width == 32 { value } else { value & ((1 << width) - 1) };

		let end = self.bit_offset + width as usize;
		let needed = words_for_bits(end);
		if self.words.len() < needed {
			self.words.resize(needed, 0);
		}

		let word = self.bit_offset / WORD_BITS;
		let shift = (self.bit_offset % WORD_BITS) as u32;
		self.words[word] |= value << shift;
		if shift + width > 32 {
			self.words[word + 1] |= value >> (32 - shift);
		}

		self.bit_offset = end;
		self.high_water = self.high_water.max(end);
	}

	/// flushes the written bits into whole words. Trailing partial words are zero-padded.
	pub fn into_words(mut self) -> Vec<PayloadWord> {
		self.words.resize(words_for_bits(self.high_water), 0);
		self.words
	}

	/// flushes the written bits and appends the words to 'out'.
	/// Returns the word offset in 'out' where the flushed words start.
	pub fn flush_into(self, out: &mut Vec<PayloadWord>) -> usize {
		let start = out.len();
		out.extend(self.into_words());
		start
	}
}
