use crate::core::bit_coder::ByteWriter;
use crate::core::format::{FormatHeader, MAGIC};

/// Writes the magic tag followed by the format header.
pub fn write_header<W>(writer: &mut W, header: &FormatHeader)
where
    W: ByteWriter,
{
    writer.write_bytes(&MAGIC);
    writer.write_u32(header.style as u32);
    writer.write_u32(header.stream_count);
    writer.write_u32(header.meshlet_count);
    writer.write_u32(header.payload_size_words);
}
