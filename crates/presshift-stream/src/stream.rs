//! The windowed stream buffer shared by all sources.

use bytes::{Buf, BytesMut};

use crate::source::{ByteSource, FileSource, MemorySource, PushSource};
use crate::{StreamError, StreamResult};

/// How strictly `pull` must honor the requested byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullMode {
    /// Return up to the requested number of bytes; fewer (or none) at end of
    /// data is fine.
    NoMoreThan,
    /// Return exactly the requested number of bytes or fail with
    /// [`StreamError::NotEnoughData`].
    Exactly,
}

/// Tuning knobs for a [`ByteStream`].
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// How many bytes behind the cursor stay buffered for cheap backward
    /// seeks. Clamped to at least 2 KiB.
    pub forget_window: usize,

    /// Read granularity against the underlying source.
    pub chunk_size: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            forget_window: 64 * 1024,
            chunk_size: 8 * 1024,
        }
    }
}

impl StreamOptions {
    pub fn forget_window(mut self, bytes: usize) -> Self {
        self.forget_window = bytes;
        self
    }

    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }
}

const MIN_FORGET_WINDOW: usize = 2 * 1024;

/// Handle to a mark pinning the buffer floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkId(u64);

/// A buffered, seekable pull-stream over a [`ByteSource`].
///
/// The stream owns the only mutable buffer in the pipeline. Layers above
/// borrow slices out of it between calls; any slice is invalidated by the
/// next operation that may drop bytes below the oldest live mark.
///
/// Single-threaded and non-reentrant.
pub struct ByteStream {
    source: Box<dyn ByteSource>,
    buffer: BytesMut,
    /// Absolute offset of `buffer[0]`.
    buffer_start: u64,
    /// Logical read position. Always within the buffered range.
    cursor: u64,
    /// Absolute offset of the next byte to fetch from the source.
    fetch_pos: u64,
    eof_seen: bool,
    closed: bool,
    marks: Vec<(MarkId, u64)>,
    next_mark: u64,
    options: StreamOptions,
}

impl ByteStream {
    pub fn new(source: Box<dyn ByteSource>, mut options: StreamOptions) -> Self {
        options.forget_window = options.forget_window.max(MIN_FORGET_WINDOW);
        options.chunk_size = options.chunk_size.max(512);
        Self {
            source,
            buffer: BytesMut::new(),
            buffer_start: 0,
            cursor: 0,
            fetch_pos: 0,
            eof_seen: false,
            closed: false,
            marks: Vec::new(),
            next_mark: 0,
            options,
        }
    }

    pub fn from_memory(data: impl Into<Vec<u8>>) -> Self {
        Self::new(Box::new(MemorySource::new(data)), StreamOptions::default())
    }

    pub fn from_file_source(source: FileSource) -> Self {
        Self::new(Box::new(source), StreamOptions::default())
    }

    /// An empty stream to be fed through [`ByteStream::append_bytes`].
    pub fn push_stream() -> Self {
        Self::new(Box::new(PushSource), StreamOptions::default())
    }

    /// Total length of the underlying data, when known.
    pub fn length(&self) -> Option<u64> {
        if let Some(n) = self.source.len_hint() {
            // Pushed bytes extend past the source's own length.
            return Some(n.max(self.fetch_pos));
        }
        self.eof_seen.then_some(self.fetch_pos)
    }

    /// Current logical read position.
    pub fn tell(&self) -> u64 {
        self.cursor
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Lowest absolute offset still buffered.
    pub fn buffer_floor(&self) -> u64 {
        self.buffer_start
    }

    /// Move the logical cursor to an absolute offset.
    ///
    /// Seeks within the retained window are buffer-local; seeks outside are
    /// delegated to the source, discarding the buffer.
    pub fn seek(&mut self, offset: u64) -> StreamResult<()> {
        self.check_open()?;
        let buffered_end = self.buffer_start + self.buffer.len() as u64;
        if offset >= self.buffer_start && offset <= buffered_end {
            self.cursor = offset;
            return Ok(());
        }
        if !self.source.is_seekable() {
            return Err(StreamError::InvalidOffset {
                offset,
                floor: self.buffer_start,
            });
        }
        self.buffer.clear();
        self.buffer_start = offset;
        self.cursor = offset;
        self.fetch_pos = offset;
        self.eof_seen = false;
        Ok(())
    }

    /// Make at least `n` bytes from the cursor available and return them.
    ///
    /// Does not consume; call [`ByteStream::consume`] to advance.
    pub fn pull(&mut self, n: usize, mode: PullMode) -> StreamResult<&[u8]> {
        self.check_open()?;
        self.fill(n)?;
        let available = self.available();
        if mode == PullMode::Exactly && available < n {
            return Err(StreamError::NotEnoughData {
                requested: n,
                available,
            });
        }
        let start = (self.cursor - self.buffer_start) as usize;
        let end = start + available.min(n);
        Ok(&self.buffer[start..end])
    }

    /// Like `pull(n, NoMoreThan)`: whatever is available up to `n`, no error
    /// at end of data.
    pub fn peek(&mut self, n: usize) -> StreamResult<&[u8]> {
        self.pull(n, PullMode::NoMoreThan)
    }

    /// Every byte currently readable without another source round-trip.
    pub fn buffered(&self) -> &[u8] {
        let start = (self.cursor - self.buffer_start) as usize;
        &self.buffer[start..]
    }

    /// Advance the cursor by `n` buffered bytes, possibly forgetting bytes
    /// that fall behind the window and below every live mark.
    pub fn consume(&mut self, n: usize) -> StreamResult<()> {
        self.check_open()?;
        if n > self.available() {
            return Err(StreamError::NotEnoughData {
                requested: n,
                available: self.available(),
            });
        }
        self.cursor += n as u64;
        self.forget();
        Ok(())
    }

    /// Consume everything currently buffered.
    pub fn consume_all(&mut self) -> StreamResult<()> {
        let n = self.available();
        self.consume(n)
    }

    /// True once the source is exhausted and every buffered byte consumed.
    pub fn reached_end_of_data(&mut self) -> bool {
        if self.available() > 0 {
            return false;
        }
        if !self.eof_seen {
            // A zero-length fill is the only way to learn the source is done.
            let _ = self.fill(1);
        }
        self.eof_seen && self.available() == 0
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.buffer.clear();
    }

    /// Append pushed bytes as the continuation of the source.
    pub fn append_bytes(&mut self, data: &[u8]) -> StreamResult<()> {
        self.check_open()?;
        if self.eof_seen {
            return Err(StreamError::Closed);
        }
        self.buffer.extend_from_slice(data);
        self.fetch_pos += data.len() as u64;
        Ok(())
    }

    /// Mark the end of pushed input.
    pub fn input_finished(&mut self) {
        self.eof_seen = true;
    }

    /// Pin the buffer floor at `offset` so a later [`ByteStream::seek`] back
    /// to it stays buffer-local.
    pub fn add_mark(&mut self, offset: u64) -> MarkId {
        let id = MarkId(self.next_mark);
        self.next_mark += 1;
        self.marks.push((id, offset));
        id
    }

    pub fn remove_mark(&mut self, id: MarkId) {
        self.marks.retain(|(mark, _)| *mark != id);
    }

    fn check_open(&self) -> StreamResult<()> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        Ok(())
    }

    fn available(&self) -> usize {
        (self.buffer_start + self.buffer.len() as u64 - self.cursor) as usize
    }

    /// Fill the buffer until `n` bytes are available from the cursor or the
    /// source runs dry.
    fn fill(&mut self, n: usize) -> StreamResult<()> {
        while self.available() < n && !self.eof_seen {
            let want = (n - self.available()).max(self.options.chunk_size);
            let old_len = self.buffer.len();
            self.buffer.resize(old_len + want, 0);
            let read = match self.source.read_at(self.fetch_pos, &mut self.buffer[old_len..]) {
                Ok(read) => read,
                Err(err) => {
                    self.buffer.truncate(old_len);
                    return Err(StreamError::Io(err));
                }
            };
            self.buffer.truncate(old_len + read);
            self.fetch_pos += read as u64;
            if read == 0 {
                if self.source.end_on_empty_read() {
                    self.eof_seen = true;
                }
                break;
            }
        }
        Ok(())
    }

    fn forget(&mut self) {
        let window_floor = self
            .cursor
            .saturating_sub(self.options.forget_window as u64);
        let mark_floor = self
            .marks
            .iter()
            .map(|(_, offset)| *offset)
            .min()
            .unwrap_or(u64::MAX);
        let keep_from = window_floor.min(mark_floor).min(self.cursor);
        if keep_from > self.buffer_start {
            let drop = (keep_from - self.buffer_start) as usize;
            self.buffer.advance(drop);
            self.buffer_start = keep_from;
        }
    }
}

impl Drop for ByteStream {
    fn drop(&mut self) {
        self.close();
    }
}
