//! # PressShift XML Processor
//!
//! An incremental, namespace-aware XML token producer built for WXR export
//! streams:
//! - Byte-at-a-time state machine that pauses cleanly on incomplete input
//! - Namespace resolution to expanded `{uri}local` names
//! - Continuous UTF-8 validation (replacement in character data, fatal in
//!   names and markup)
//! - Only the five predefined entities and numeric character references;
//!   DTDs, processing instructions, and external entities are refused as
//!   unsupported rather than half-parsed
//! - Byte offsets, depth, and breadcrumbs for every token
//! - Serializable bookmarks for cross-process resume over a seekable source

pub mod charref;
pub mod cursor;
pub(crate) mod lexer;
pub mod name;
pub(crate) mod namespaces;
pub mod processor;
pub mod utf8;

pub use lexer::ByteSpan;
pub use name::XmlName;
pub use processor::{
    Attribute, ProcessorOptions, TokenKind, XmlBookmark, XmlProcessor, XmlStep, XmlToken,
};

use thiserror::Error;

/// A restricted XML feature this processor deliberately refuses.
///
/// Unsupported features are a recoverable signal: the document cannot be
/// streamed by this parser, but the bytes themselves may be fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedFeature {
    /// DTD internal subsets and everything they can define.
    Dtd,
    /// Processing instructions other than the XML declaration.
    ProcessingInstruction,
    /// An entity reference beyond the five predefined ones.
    EntityReference,
    /// Element nesting past the configured depth limit.
    DeepNesting,
    /// A declared encoding other than UTF-8.
    Encoding,
}

impl std::fmt::Display for UnsupportedFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dtd => "document type definition",
            Self::ProcessingInstruction => "processing instruction",
            Self::EntityReference => "undefined entity reference",
            Self::DeepNesting => "element nesting too deep",
            Self::Encoding => "non-UTF-8 encoding declaration",
        };
        f.write_str(text)
    }
}

/// Errors produced by the XML layer.
#[derive(Debug, Error)]
pub enum XmlError {
    /// The document is not well formed. Fatal: parsing cannot continue.
    #[error("malformed XML at byte {offset}: {reason}")]
    Malformed { offset: u64, reason: String },

    /// The document uses a feature outside the supported profile.
    #[error("unsupported XML feature: {0}")]
    Unsupported(UnsupportedFeature),

    #[error(transparent)]
    Stream(#[from] presshift_stream::StreamError),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

pub type XmlResult<T> = Result<T, XmlError>;
