//! `application/x-www-form-urlencoded` pair lists.

use crate::percent::{percent_decode, percent_encode_bytes, FORM_URLENCODED};

/// An ordered list of query `(name, value)` pairs.
///
/// Duplicates are preserved; order is significant and survives a round trip
/// through the serialized form (up to `+`/space normalization).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryList {
    pairs: Vec<(String, String)>,
}

impl QueryList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a serialized query (without the leading `?`).
    pub fn from_str(input: &str) -> Self {
        let mut pairs = Vec::new();
        for piece in input.split('&') {
            if piece.is_empty() {
                continue;
            }
            let (name, value) = match piece.find('=') {
                Some(index) => (&piece[..index], &piece[index + 1..]),
                None => (piece, ""),
            };
            pairs.push((decode_component(name), decode_component(value)));
        }
        Self { pairs }
    }

    /// Serialize back to a query string (without the `?`).
    pub fn to_query_string(&self) -> String {
        let mut out = String::new();
        for (index, (name, value)) in self.pairs.iter().enumerate() {
            if index > 0 {
                out.push('&');
            }
            out.push_str(&encode_component(name));
            out.push('=');
            out.push_str(&encode_component(value));
        }
        out
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// All values under a name, in order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// Replace the first occurrence and drop the rest; append when absent.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let mut found = false;
        self.pairs.retain_mut(|(n, v)| {
            if n == name {
                if found {
                    return false;
                }
                found = true;
                *v = value.clone();
            }
            true
        });
        if !found {
            self.append(name, value);
        }
    }

    pub fn delete(&mut self, name: &str) {
        self.pairs.retain(|(n, _)| n != name);
    }

    /// Stable sort by name, compared as UTF-16 code units.
    pub fn sort(&mut self) {
        self.pairs.sort_by(|(a, _), (b, _)| {
            let a_units: Vec<u16> = a.encode_utf16().collect();
            let b_units: Vec<u16> = b.encode_utf16().collect();
            a_units.cmp(&b_units)
        });
    }
}

fn decode_component(input: &str) -> String {
    let replaced = input.replace('+', " ");
    String::from_utf8_lossy(&percent_decode(&replaced)).into_owned()
}

fn encode_component(input: &str) -> String {
    percent_encode_bytes(input.as_bytes(), FORM_URLENCODED).replace("%20", "+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_order_and_duplicates() {
        let list = QueryList::from_str("b=2&a=1&b=3&flag");
        assert_eq!(list.len(), 4);
        assert_eq!(list.get("b"), Some("2"));
        assert_eq!(list.get_all("b"), vec!["2", "3"]);
        assert_eq!(list.get("flag"), Some(""));
    }

    #[test]
    fn test_round_trip() {
        let list = QueryList::from_str("name=J%C3%BCrgen&msg=hello+world&x=%26%3D");
        assert_eq!(list.get("name"), Some("Jürgen"));
        assert_eq!(list.get("msg"), Some("hello world"));
        assert_eq!(list.get("x"), Some("&="));
        let serialized = list.to_query_string();
        assert_eq!(QueryList::from_str(&serialized), list);
    }

    #[test]
    fn test_set_replaces_first_and_drops_rest() {
        let mut list = QueryList::from_str("a=1&b=2&a=3");
        list.set("a", "9");
        assert_eq!(list.to_query_string(), "a=9&b=2");
        list.set("c", "new");
        assert_eq!(list.to_query_string(), "a=9&b=2&c=new");
    }

    #[test]
    fn test_delete() {
        let mut list = QueryList::from_str("a=1&b=2&a=3");
        list.delete("a");
        assert_eq!(list.to_query_string(), "b=2");
    }

    #[test]
    fn test_sort_is_stable_and_utf16_ordered() {
        let mut list = QueryList::from_str("b=1&a=2&b=0&%F0%9F%A6%80=crab&z=9");
        list.sort();
        let names: Vec<&str> = list.pairs().iter().map(|(n, _)| n.as_str()).collect();
        // The crab (a surrogate pair in UTF-16) sorts after BMP characters.
        assert_eq!(names, vec!["a", "b", "b", "z", "🦀"]);
        assert_eq!(list.get_all("b"), vec!["1", "0"]);
    }
}
