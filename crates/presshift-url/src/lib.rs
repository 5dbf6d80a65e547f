//! # PressShift URL
//!
//! The URL machinery under the migration pipeline:
//! - The WHATWG basic URL parser (scheme, authority, host, path states)
//!   with IPv4/IPv6 literals and IDNA/Punycode domain mapping
//! - Percent-encode sets and codecs
//! - `application/x-www-form-urlencoded` pair lists
//! - An in-text URL sieve gated by an embedded public-suffix table
//! - CSS `url()` detection
//! - Base-URL replacement that preserves escapes and trailing-slash style
//!
//! All tables (encode sets, suffix list, scheme defaults) are immutable and
//! process-wide; nothing here mutates global state.

pub mod css;
pub mod host;
pub mod idna;
pub mod parser;
pub mod percent;
pub mod psl;
pub mod punycode;
pub mod query;
pub mod rewrite;
pub mod scheme;
pub mod sieve;

pub use css::{find_css_urls, is_data_url, CssUrl};
pub use host::Host;
pub use parser::{Path, Url};
pub use query::QueryList;
pub use rewrite::{is_child_url_of, replace_base_url};
pub use sieve::{find_urls_in_text, TextUrl};

use thiserror::Error;

/// Errors produced by the URL layer.
///
/// Parsing reports many conditions as validation-only (logged, parse
/// continues); this error covers the cases where the standard mandates
/// failure. The kind string matches the standard's error names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("invalid URL: {0}")]
    Invalid(&'static str),
}

pub type UrlResult<T> = Result<T, UrlError>;
