//! Namespace scope tracking.

use std::collections::HashMap;

use crate::name::XmlName;
use crate::{XmlError, XmlResult};

/// The namespace name bound to the `xml` prefix by definition.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// A stack of prefix scopes, one frame per open element that declared
/// namespaces. Frames hold the full in-scope mapping so resolution is a
/// single lookup and bookmark capture is a plain clone.
#[derive(Debug, Clone)]
pub(crate) struct NamespaceStack {
    frames: Vec<HashMap<String, String>>,
}

impl NamespaceStack {
    pub fn new() -> Self {
        let mut root = HashMap::new();
        root.insert("xml".to_string(), XML_NAMESPACE.to_string());
        Self { frames: vec![root] }
    }

    /// Push a new scope from `xmlns` declarations found on an element.
    ///
    /// `declarations` pairs are (prefix, uri) where the empty prefix is the
    /// default namespace. The new frame inherits the enclosing scope.
    pub fn push_scope(&mut self, declarations: Vec<(String, String)>) {
        let mut frame = self
            .frames
            .last()
            .cloned()
            .unwrap_or_default();
        for (prefix, uri) in declarations {
            frame.insert(prefix, uri);
        }
        self.frames.push(frame);
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.frames.len() > 1);
        self.frames.pop();
    }

    fn lookup(&self, prefix: &str) -> Option<&str> {
        self.frames
            .last()
            .and_then(|frame| frame.get(prefix))
            .map(String::as_str)
    }

    /// Resolve an element qname. Unprefixed elements take the in-scope
    /// default namespace.
    pub fn resolve_element(&self, qname: &str, offset: u64) -> XmlResult<XmlName> {
        let (prefix, local) = split(qname, offset)?;
        match prefix {
            None => Ok(XmlName::new(
                self.lookup("").unwrap_or_default(),
                local,
            )),
            Some(prefix) => self
                .lookup(prefix)
                .map(|uri| XmlName::new(uri, local))
                .ok_or_else(|| unbound(prefix, offset)),
        }
    }

    /// Resolve an attribute qname. Unprefixed attributes have no namespace.
    pub fn resolve_attribute(&self, qname: &str, offset: u64) -> XmlResult<XmlName> {
        let (prefix, local) = split(qname, offset)?;
        match prefix {
            None => Ok(XmlName::local(local)),
            Some(prefix) => self
                .lookup(prefix)
                .map(|uri| XmlName::new(uri, local))
                .ok_or_else(|| unbound(prefix, offset)),
        }
    }

    /// Snapshot for bookmarks: frames as plain pair lists.
    pub fn snapshot(&self) -> Vec<Vec<(String, String)>> {
        self.frames
            .iter()
            .map(|frame| {
                let mut pairs: Vec<(String, String)> = frame
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                pairs.sort();
                pairs
            })
            .collect()
    }

    pub fn restore(snapshot: Vec<Vec<(String, String)>>) -> Self {
        if snapshot.is_empty() {
            return Self::new();
        }
        Self {
            frames: snapshot
                .into_iter()
                .map(|pairs| pairs.into_iter().collect())
                .collect(),
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

fn split(qname: &str, offset: u64) -> XmlResult<(Option<&str>, &str)> {
    crate::name::split_qname(qname).ok_or_else(|| XmlError::Malformed {
        offset,
        reason: format!("invalid qualified name `{qname}`"),
    })
}

fn unbound(prefix: &str, offset: u64) -> XmlError {
    XmlError::Malformed {
        offset,
        reason: format!("unbound namespace prefix `{prefix}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_and_prefixed_resolution() {
        let mut stack = NamespaceStack::new();
        stack.push_scope(vec![
            (String::new(), "urn:default".to_string()),
            ("wp".to_string(), "http://wordpress.org/export/1.2/".to_string()),
        ]);

        assert_eq!(
            stack.resolve_element("item", 0).unwrap(),
            XmlName::new("urn:default", "item")
        );
        assert_eq!(
            stack.resolve_element("wp:post_id", 0).unwrap(),
            XmlName::new("http://wordpress.org/export/1.2/", "post_id")
        );
        // Unprefixed attributes stay namespace-less.
        assert_eq!(
            stack.resolve_attribute("domain", 0).unwrap(),
            XmlName::local("domain")
        );

        stack.pop_scope();
        assert!(stack.resolve_element("wp:post_id", 0).is_err());
        assert_eq!(
            stack.resolve_element("item", 0).unwrap(),
            XmlName::local("item")
        );
    }

    #[test]
    fn test_xml_prefix_is_predeclared() {
        let stack = NamespaceStack::new();
        assert_eq!(
            stack.resolve_attribute("xml:lang", 0).unwrap(),
            XmlName::new(XML_NAMESPACE, "lang")
        );
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut stack = NamespaceStack::new();
        stack.push_scope(vec![("a".to_string(), "urn:a".to_string())]);
        let restored = NamespaceStack::restore(stack.snapshot());
        assert_eq!(
            restored.resolve_element("a:x", 0).unwrap(),
            XmlName::new("urn:a", "x")
        );
        assert_eq!(restored.depth(), 2);
    }
}
