//! # PressShift WXR Reader
//!
//! Streaming reader for WordPress eXtended RSS export files:
//! - Lazy sequence of typed entities (posts, comments, terms, users, meta,
//!   site options) in source order
//! - Constant memory: one entity's fields at a time, however large the file
//! - Children stamped with the ids of their most recent ancestors
//! - Persistable reentrancy cursors for cross-process resume
//! - All six `wordpress.org/export` namespace variants accepted

pub mod entity;
pub mod reader;
pub mod schema;

pub use entity::{Entity, EntityType};
pub use reader::{ReaderOptions, WxrReader, WxrStep};
pub use schema::{EntityDefinition, WxrSchema};

use thiserror::Error;

/// Errors produced by the WXR layer.
#[derive(Debug, Error)]
pub enum WxrError {
    #[error(transparent)]
    Xml(#[from] presshift_xml::XmlError),

    #[error("missing or invalid wxr_version at end of stream")]
    MissingVersion,

    #[error("invalid reentrancy cursor: {0}")]
    InvalidCursor(String),
}

pub type WxrResult<T> = Result<T, WxrError>;
