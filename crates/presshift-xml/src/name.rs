//! Expanded XML names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An expanded XML name: a namespace URI paired with a local name.
///
/// All matching in the pipeline is by this pair. Prefixes are a lexical
/// artifact of the document and never survive past namespace resolution.
///
/// The canonical text form is `{uri}local`, with the braces omitted for the
/// empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct XmlName {
    pub namespace: String,
    pub local: String,
}

impl XmlName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// A name in the empty (default-default) namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            namespace: String::new(),
            local: local.into(),
        }
    }

    pub fn has_namespace(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// Parse the canonical `{uri}local` form.
    pub fn from_canonical(canonical: &str) -> Self {
        if let Some(rest) = canonical.strip_prefix('{') {
            if let Some(end) = rest.find('}') {
                return Self::new(&rest[..end], &rest[end + 1..]);
            }
        }
        Self::local(canonical)
    }
}

impl fmt::Display for XmlName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

/// Split a qualified name into its optional prefix and local part.
///
/// A leading or trailing colon, or more than one colon, is not a valid QName.
pub fn split_qname(qname: &str) -> Option<(Option<&str>, &str)> {
    match qname.find(':') {
        None => Some((None, qname)),
        Some(idx) => {
            let (prefix, rest) = qname.split_at(idx);
            let local = &rest[1..];
            if prefix.is_empty() || local.is_empty() || local.contains(':') {
                None
            } else {
                Some((Some(prefix), local))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_round_trip() {
        let name = XmlName::new("http://wordpress.org/export/1.2/", "post_id");
        assert_eq!(
            name.to_string(),
            "{http://wordpress.org/export/1.2/}post_id"
        );
        assert_eq!(XmlName::from_canonical(&name.to_string()), name);

        let plain = XmlName::local("title");
        assert_eq!(plain.to_string(), "title");
        assert_eq!(XmlName::from_canonical("title"), plain);
    }

    #[test]
    fn test_split_qname() {
        assert_eq!(split_qname("wp:post_id"), Some((Some("wp"), "post_id")));
        assert_eq!(split_qname("title"), Some((None, "title")));
        assert_eq!(split_qname(":bad"), None);
        assert_eq!(split_qname("bad:"), None);
        assert_eq!(split_qname("a:b:c"), None);
    }
}
