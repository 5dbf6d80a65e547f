//! Block attribute trees: path flattening, lookup, and re-encoding.

use serde_json::Value;

/// One step into the attributes tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl PathStep {
    pub fn as_key(&self) -> String {
        match self {
            PathStep::Key(key) => key.clone(),
            PathStep::Index(index) => index.to_string(),
        }
    }
}

/// Render a path as a dotted string for display and matching.
pub fn path_to_string(path: &[PathStep]) -> String {
    let mut out = String::new();
    for (index, step) in path.iter().enumerate() {
        if index > 0 {
            out.push('.');
        }
        out.push_str(&step.as_key());
    }
    out
}

/// Depth-first flattening, parents before children. Every addressable node
/// gets a path; the root itself does not.
pub fn flatten_paths(value: &Value) -> Vec<Vec<PathStep>> {
    let mut out = Vec::new();
    descend(value, &mut Vec::new(), &mut out);
    out
}

fn descend(value: &Value, prefix: &mut Vec<PathStep>, out: &mut Vec<Vec<PathStep>>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                prefix.push(PathStep::Key(key.clone()));
                out.push(prefix.clone());
                descend(child, prefix, out);
                prefix.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                prefix.push(PathStep::Index(index));
                out.push(prefix.clone());
                descend(child, prefix, out);
                prefix.pop();
            }
        }
        _ => {}
    }
}

pub fn get_path<'v>(root: &'v Value, path: &[PathStep]) -> Option<&'v Value> {
    let mut current = root;
    for step in path {
        current = match step {
            PathStep::Key(key) => current.get(key)?,
            PathStep::Index(index) => current.get(index)?,
        };
    }
    Some(current)
}

pub fn get_path_mut<'v>(root: &'v mut Value, path: &[PathStep]) -> Option<&'v mut Value> {
    let mut current = root;
    for step in path {
        current = match step {
            PathStep::Key(key) => current.get_mut(key)?,
            PathStep::Index(index) => current.get_mut(index)?,
        };
    }
    Some(current)
}

/// Serialize attributes the way the block serializer does: JSON with `<`,
/// `>`, and `&` escaped so the payload can never terminate the enclosing
/// HTML comment or leak markup.
pub fn encode_block_attributes(value: &Value) -> String {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    // These characters only occur inside string literals in serialized
    // JSON, so a plain replacement cannot corrupt the structure.
    json.replace('<', "\\u003C")
        .replace('>', "\\u003E")
        .replace('&', "\\u0026")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_orders_parents_first() {
        let attrs = json!({
            "src": "a.jpg",
            "meta": {"width": 100, "tags": ["x", "y"]},
        });
        let paths = flatten_paths(&attrs);
        let rendered: Vec<String> = paths.iter().map(|p| path_to_string(p)).collect();
        assert_eq!(
            rendered,
            vec![
                "src",
                "meta",
                "meta.width",
                "meta.tags",
                "meta.tags.0",
                "meta.tags.1",
            ]
        );
    }

    #[test]
    fn test_get_and_set_by_path() {
        let mut attrs = json!({"a": {"b": ["x", "y"]}});
        let paths = flatten_paths(&attrs);
        let leaf = paths.last().unwrap();
        assert_eq!(get_path(&attrs, leaf), Some(&json!("y")));
        *get_path_mut(&mut attrs, leaf).unwrap() = json!("z");
        assert_eq!(attrs["a"]["b"][1], "z");
    }

    #[test]
    fn test_encoding_escapes_markup() {
        let attrs = json!({"content": "<b>&co</b>"});
        let encoded = encode_block_attributes(&attrs);
        assert_eq!(
            encoded,
            r#"{"content":"\u003Cb\u003E\u0026co\u003C/b\u003E"}"#
        );
        // It still parses back to the same value.
        let reparsed: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(reparsed, attrs);
    }
}
