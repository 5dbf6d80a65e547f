//! # PressShift Markup Migration
//!
//! Rewrites WordPress block markup during site moves:
//! - Streaming HTML tag tokenizer with staged byte-range edits
//! - Block-comment delimiter parsing (`<!-- wp:name {json} -->`) layered
//!   over the tokenizer by composition
//! - Depth-first block attribute traversal with dirty-delimiter
//!   re-serialization
//! - A combined URL rewriter across tag attributes, block attribute JSON,
//!   plain text, and CSS `url()` references, preserving each URL's written
//!   style

pub mod block_attributes;
pub mod block_processor;
pub mod tag_processor;
pub mod url_rewriter;

pub use block_attributes::PathStep;
pub use block_processor::{BlockProcessor, BlockTokenType};
pub use tag_processor::{TagProcessor, TokenType};
pub use url_rewriter::{rewrite_markup, FoundUrl, UrlMapping, UrlRewriter, UrlSite};

use thiserror::Error;

/// Errors produced by the markup layer.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Two staged edits overlap; the document cannot be serialized.
    #[error("conflicting edit at byte {offset}")]
    ConflictingEdit { offset: usize },

    /// A block closer that does not match the innermost open block.
    #[error("mismatched block closer: expected {expected:?}, found {found}")]
    MismatchedCloser {
        expected: Option<String>,
        found: String,
    },

    #[error("no attribute named `{0}` on the current tag")]
    NoSuchAttribute(String),

    #[error("no current block attribute to write")]
    NoBlockAttribute,

    #[error("no current URL to rewrite")]
    NoCurrentUrl,

    #[error("updated document is not valid UTF-8")]
    InvalidUtf8,
}

pub type MigrateResult<T> = Result<T, MigrateError>;
