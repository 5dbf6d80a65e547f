//! # PressShift Byte Streams
//!
//! Seekable, buffered, pull-based byte sources for the streaming WXR
//! pipeline:
//! - In-memory and file-backed sources behind one `ByteSource` trait
//! - Bounded forget-window buffering so inputs larger than RAM stream in
//!   constant memory
//! - Marks that pin the buffer floor, backing parser bookmarks
//! - Push-style feeding (`append_bytes`) for callers that receive chunks

pub mod source;
pub mod stream;

pub use source::{ByteSource, FileSource, MemorySource, PushSource};
pub use stream::{ByteStream, MarkId, PullMode, StreamOptions};

use thiserror::Error;

/// Errors produced by byte stream operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// An `Exactly` pull (or a read past the end of data) could not be
    /// satisfied. This is a control-flow signal in incremental use, not a
    /// hard failure: feed more bytes or accept end of data.
    #[error("not enough data: requested {requested} bytes, {available} available")]
    NotEnoughData { requested: usize, available: usize },

    #[error("stream is closed")]
    Closed,

    #[error("invalid offset {offset}: retained window starts at {floor}")]
    InvalidOffset { offset: u64, floor: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StreamResult<T> = Result<T, StreamError>;
