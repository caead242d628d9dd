use std::io::{self, Read, Seek, SeekFrom};

/// Reads exactly `buffer.len()` bytes starting at the absolute byte `offset`.
///
/// # Arguments
///
/// - `reader`: The seekable source to read from.
/// - `offset`: The absolute byte offset of the first byte to read.
/// - `buffer`: The destination buffer, filled completely on success.
///
/// # Errors
///
/// Returns an `io::Error` if the seek fails or the source ends before the buffer is filled.
pub fn read_at<T: Read + Seek>(reader: &mut T, offset: u64, buffer: &mut [u8]) -> io::Result<()> {
    reader.seek(SeekFrom::Start(offset))?;

    reader.read_exact(buffer).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!(
                "Failed to read {} bytes at offset {offset}: {err}",
                buffer.len()
            ),
        )
    })
}

/// Reads up to `buffer.len()` bytes starting at the absolute byte `offset`.
///
/// Unlike [`read_at`], reaching the end of the source is not an error: the
/// number of bytes actually read is returned.
pub fn read_up_to<T: Read + Seek>(
    reader: &mut T,
    offset: u64,
    buffer: &mut [u8],
) -> io::Result<usize> {
    reader.seek(SeekFrom::Start(offset))?;

    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }

    Ok(filled)
}

/// Extracts a little-endian 32-bit unsigned integer from a buffer at a given offset.
///
/// # Panics
///
/// Panics if the slice does not contain enough bytes starting from the offset.
pub fn u32_at(buffer: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ])
}

/// Extracts a little-endian 16-bit unsigned integer from a buffer at a given offset.
///
/// # Panics
///
/// Panics if the slice does not contain enough bytes starting from the offset.
pub fn u16_at(buffer: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buffer[offset], buffer[offset + 1]])
}
