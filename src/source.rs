//! The read protocol between field decoders and byte sources.
//!
//! A source either delivers exactly the requested bytes, suspends, or
//! signals end of input. Partial delivery never happens: a decoder that asks
//! for `n` bytes can index `buf[..n]` unconditionally.

/// Outcome of a single [ByteSource::request].
#[derive(Debug, PartialEq, Eq)]
pub enum Fetch<'a> {
    /// Exactly the requested number of contiguous bytes.
    Bytes(&'a [u8]),
    /// Not enough bytes buffered yet; the current parse attempt must yield
    /// until the producer delivers more. Only stream sources return this.
    Pending,
    /// End of input before the requested bytes.
    Eof,
}

/// Anything that can satisfy byte requests for the decoders.
pub trait ByteSource {
    /// Requests `n >= 1` contiguous bytes.
    fn request(&mut self, n: usize) -> Fetch<'_>;
}

/// Byte source over a single in-memory buffer. Owned by one parse
/// invocation; never suspends.
#[derive(Debug)]
pub struct SliceSource<'d> {
    data: &'d [u8],
    offset: usize,
}

impl<'d> SliceSource<'d> {
    pub fn new(data: &'d [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.offset
    }
}

impl ByteSource for SliceSource<'_> {
    fn request(&mut self, n: usize) -> Fetch<'_> {
        match self.data.get(self.offset..self.offset + n) {
            Some(bytes) => {
                self.offset += n;
                Fetch::Bytes(bytes)
            }
            None => Fetch::Eof,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_source_delivers_and_advances() {
        let data = [1u8, 2, 3, 4];
        let mut src = SliceSource::new(&data);

        assert_eq!(src.request(2), Fetch::Bytes(&[1, 2][..]));
        assert_eq!(src.request(1), Fetch::Bytes(&[3][..]));
        assert_eq!(src.consumed(), 3);
    }

    #[test]
    fn test_slice_source_eof_on_overrun() {
        let data = [1u8, 2];
        let mut src = SliceSource::new(&data);

        assert_eq!(src.request(3), Fetch::Eof);
        // A failed request consumes nothing.
        assert_eq!(src.consumed(), 0);
        assert_eq!(src.request(2), Fetch::Bytes(&[1, 2][..]));
        assert_eq!(src.request(1), Fetch::Eof);
    }
}
