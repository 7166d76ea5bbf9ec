//! Streaming execution: an accumulating chunk queue and the transducer that
//! decodes objects from it.
//!
//! The producer pushes chunks; each completed object is handed back in input
//! order. A parse attempt that runs out of buffered bytes records how many
//! it needs and is re-run from the last object boundary once the producer
//! delivers enough, so the emitted object sequence is independent of how the
//! input is split into chunks.

use std::collections::VecDeque;

use crate::errors::DecodeError;
use crate::schema::{Outcome, Schema};
use crate::source::{ByteSource, Fetch};
use crate::value::Record;

/// Committed prefix length above which the front chunk is re-sliced before
/// coalescing, bounding the cost of the copy about to happen.
const COALESCE_PREFIX_LIMIT: usize = 1024;

/// Byte source over an accumulating queue of producer chunks.
struct StreamSource {
    chunks: VecDeque<Vec<u8>>,
    /// Committed bytes at the front of `chunks[0]`: everything before this
    /// belongs to already-emitted objects.
    offset: usize,
    /// Total bytes held, including the committed prefix.
    buffered: usize,
    /// Bytes consumed past `offset` by the in-flight parse attempt.
    cursor: usize,
    /// Unread bytes the suspended attempt needs before it is worth retrying.
    pending: Option<usize>,
    eof: bool,
}

impl StreamSource {
    fn new() -> Self {
        StreamSource {
            chunks: VecDeque::new(),
            offset: 0,
            buffered: 0,
            cursor: 0,
            pending: None,
            eof: false,
        }
    }

    fn push(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.buffered += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Bytes past the last committed object boundary.
    fn unread(&self) -> usize {
        self.buffered - self.offset
    }

    /// True once a suspended attempt's byte requirement is met.
    fn ready(&self) -> bool {
        match self.pending {
            Some(need) => self.eof || self.unread() >= need,
            None => true,
        }
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Commits the in-flight attempt's bytes and releases spent chunks.
    fn commit(&mut self) {
        self.offset += self.cursor;
        self.cursor = 0;

        while let Some(front) = self.chunks.front() {
            if self.offset < front.len() {
                break;
            }
            self.offset -= front.len();
            self.buffered -= front.len();
            self.chunks.pop_front();
        }
    }

    /// Discards everything; used when a decode error tears the stream down.
    fn clear(&mut self) {
        self.chunks.clear();
        self.offset = 0;
        self.buffered = 0;
        self.cursor = 0;
        self.pending = None;
    }

    /// Merges the queue into a single chunk so a straddling request can be
    /// served contiguously.
    fn coalesce(&mut self) {
        if self.offset > COALESCE_PREFIX_LIMIT {
            if let Some(front) = self.chunks.front_mut() {
                front.drain(..self.offset);
                self.buffered -= self.offset;
                self.offset = 0;
            }
        }

        if self.chunks.len() > 1 {
            let mut merged = Vec::with_capacity(self.buffered);
            for chunk in self.chunks.drain(..) {
                merged.extend_from_slice(&chunk);
            }
            self.chunks.push_back(merged);
        }
    }
}

impl ByteSource for StreamSource {
    fn request(&mut self, n: usize) -> Fetch<'_> {
        if self.unread() < self.cursor + n {
            if self.eof {
                return Fetch::Eof;
            }
            self.pending = Some(self.cursor + n);
            return Fetch::Pending;
        }

        let start = self.offset + self.cursor;
        if start + n > self.chunks.front().map_or(0, Vec::len) {
            self.coalesce();
        }

        // Coalescing may have dropped the committed prefix.
        let start = self.offset + self.cursor;
        self.cursor += n;
        match self.chunks.front() {
            Some(chunk) => Fetch::Bytes(&chunk[start..start + n]),
            None => Fetch::Eof,
        }
    }
}

/// Streaming transducer over one [Schema]: bytes in, decoded objects out.
///
/// Obtained from [Schema::stream]. Push chunks with [write](Self::write) and
/// end the input with [finish](Self::finish); a decode error terminates the
/// stream and discards buffered chunks.
pub struct StreamParser<'a> {
    schema: &'a Schema,
    source: StreamSource,
    closed: bool,
}

impl<'a> StreamParser<'a> {
    pub(crate) fn new(schema: &'a Schema) -> Self {
        StreamParser {
            schema,
            source: StreamSource::new(),
            closed: false,
        }
    }

    /// Ingests one chunk and returns the objects it completed, in input
    /// order. A closed stream ignores further chunks.
    pub fn write(&mut self, chunk: Vec<u8>) -> Result<Vec<Record>, DecodeError> {
        let mut emitted = Vec::new();
        if self.closed {
            return Ok(emitted);
        }

        self.source.push(chunk);
        self.pump(&mut emitted)?;
        Ok(emitted)
    }

    /// Signals end of input. The suspended parse, if any, sees EOF; an
    /// EOF-tolerant chain may still complete one trailing object.
    pub fn finish(mut self) -> Result<Option<Record>, DecodeError> {
        self.source.eof = true;
        let mut emitted = Vec::new();
        self.pump(&mut emitted)?;
        Ok(emitted.pop())
    }

    /// Re-arms parses from the top of the chain until bytes run short.
    fn pump(&mut self, emitted: &mut Vec<Record>) -> Result<(), DecodeError> {
        while !self.closed && self.source.ready() {
            self.source.rewind();
            match self.schema.run(&mut self.source, None) {
                Ok(Outcome::Complete(rec)) => {
                    let advanced = self.source.cursor > 0;
                    self.source.commit();
                    self.source.pending = None;
                    emitted.push(rec);
                    if !advanced {
                        // A chain that consumes no bytes would re-emit
                        // forever; one object, then the stream closes.
                        self.closed = true;
                    }
                }
                Ok(Outcome::Finished(rec)) => {
                    self.source.commit();
                    self.source.pending = None;
                    emitted.push(rec);
                    self.closed = true;
                }
                Ok(Outcome::Eof) => {
                    self.closed = true;
                }
                Ok(Outcome::Pending) => break,
                Err(err) => {
                    self.source.clear();
                    self.closed = true;
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}
