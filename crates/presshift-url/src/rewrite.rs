//! Base URL replacement.
//!
//! The migration primitive: move a URL from under one site base to another,
//! carrying the path suffix over byte for byte. Percent-encoded segments are
//! never decoded, so double-escaped names survive; trailing-slash style
//! rides along as the empty final segment.

use crate::parser::{Path, Url};

/// Whether `url` lives under `base`: same host and port, and `base`'s path
/// is a segment-wise prefix. Scheme is deliberately ignored so that
/// http→https migrations still match.
pub fn is_child_url_of(url: &Url, base: &Url) -> bool {
    if url.host != base.host || url.port != base.port {
        return false;
    }
    let (Some(url_segments), Some(base_prefix)) = (url.path.segments(), prefix_segments(base))
    else {
        return false;
    };
    if url_segments.len() < base_prefix.len() {
        return false;
    }
    url_segments
        .iter()
        .zip(base_prefix)
        .all(|(segment, prefix)| segment == prefix)
}

/// The base's path as a matching prefix: a trailing empty segment (the
/// serialized trailing slash) does not have to be matched literally.
fn prefix_segments(base: &Url) -> Option<&[String]> {
    let segments = base.path.segments()?;
    match segments.last() {
        Some(last) if last.is_empty() => Some(&segments[..segments.len() - 1]),
        _ => Some(segments),
    }
}

/// Rewrite `url` from under `old_base` to under `new_base`.
///
/// Returns `None` when `url` is not a child of `old_base`. The suffix of
/// the path beyond the old base is reattached verbatim to the new base's
/// path; query and fragment are untouched.
pub fn replace_base_url(url: &Url, old_base: &Url, new_base: &Url) -> Option<Url> {
    if !is_child_url_of(url, old_base) {
        return None;
    }
    let url_segments = url.path.segments()?;
    let old_prefix = prefix_segments(old_base)?;
    let new_prefix = prefix_segments(new_base)?;

    let mut segments: Vec<String> = new_prefix.to_vec();
    segments.extend_from_slice(&url_segments[old_prefix.len()..]);
    if segments.is_empty() {
        // The root with no trailing slash still serializes as "/".
        segments.push(String::new());
    }

    let mut out = url.clone();
    out.scheme = new_base.scheme.clone();
    out.host = new_base.host.clone();
    out.port = new_base.port;
    out.path = Path::List(segments);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_child_detection() {
        let base = url("https://example.com/blog/");
        assert!(is_child_url_of(&url("https://example.com/blog/post-1"), &base));
        assert!(is_child_url_of(&url("https://example.com/blog/"), &base));
        // Scheme differences do not matter; host and port do.
        assert!(is_child_url_of(&url("http://example.com/blog/x"), &base));
        assert!(!is_child_url_of(&url("https://other.com/blog/x"), &base));
        assert!(!is_child_url_of(&url("https://example.com:8080/blog/x"), &base));
        assert!(!is_child_url_of(&url("https://example.com/other/"), &base));
    }

    #[test]
    fn test_basic_replacement() {
        let rewritten = replace_base_url(
            &url("http://old/a.jpg"),
            &url("http://old"),
            &url("https://new"),
        )
        .unwrap();
        assert_eq!(rewritten.to_string(), "https://new/a.jpg");
    }

    #[test]
    fn test_double_escapes_survive() {
        let rewritten = replace_base_url(
            &url("https://example.com/~jappleseed/1997.10.1/%2561-reasons-to-migrate-data/"),
            &url("https://example.com/~jappleseed/"),
            &url("https://newsite.com/users/jappleseed/"),
        )
        .unwrap();
        assert_eq!(
            rewritten.to_string(),
            "https://newsite.com/users/jappleseed/1997.10.1/%2561-reasons-to-migrate-data/"
        );
    }

    #[test]
    fn test_trailing_slash_style_preserved() {
        let old = url("https://old.com/");
        let new = url("https://new.com/base");
        assert_eq!(
            replace_base_url(&url("https://old.com/dir/"), &old, &new)
                .unwrap()
                .to_string(),
            "https://new.com/base/dir/"
        );
        assert_eq!(
            replace_base_url(&url("https://old.com/file"), &old, &new)
                .unwrap()
                .to_string(),
            "https://new.com/base/file"
        );
        assert_eq!(
            replace_base_url(&url("https://old.com/"), &old, &new)
                .unwrap()
                .to_string(),
            "https://new.com/base/"
        );
    }

    #[test]
    fn test_query_and_fragment_untouched() {
        let rewritten = replace_base_url(
            &url("https://old.com/p?page_id=2#frag"),
            &url("https://old.com"),
            &url("https://new.com"),
        )
        .unwrap();
        assert_eq!(rewritten.to_string(), "https://new.com/p?page_id=2#frag");
    }

    #[test]
    fn test_rewritten_path_starts_with_new_base() {
        let old = url("https://example.com/a/");
        let new = url("https://example.net/b/c/");
        let rewritten =
            replace_base_url(&url("https://example.com/a/x/y"), &old, &new).unwrap();
        assert!(rewritten.path_string().starts_with("/b/c/"));
    }

    #[test]
    fn test_non_child_returns_none() {
        assert!(replace_base_url(
            &url("https://elsewhere.com/x"),
            &url("https://old.com"),
            &url("https://new.com"),
        )
        .is_none());
    }
}
