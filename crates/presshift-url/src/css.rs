//! CSS `url()` detection.
//!
//! A minimal tokenizer: enough of CSS to find `url(...)` and the
//! string-argument forms `url("...")` / `url('...')` inside stylesheet text
//! and inline `style` attributes, with byte ranges precise enough to splice
//! replacements back in. Comments and unrelated strings are skipped.

/// One `url()` reference in a stylesheet.
#[derive(Debug, Clone, PartialEq)]
pub struct CssUrl {
    /// Byte range of the URL text itself (inside any quotes).
    pub start: usize,
    pub end: usize,
    pub raw: String,
    pub quoted: bool,
}

/// Whether a reference is a data URI (never rewritten).
pub fn is_data_url(raw: &str) -> bool {
    raw.len() >= 5 && raw[..5].eq_ignore_ascii_case("data:")
}

/// Find every rewritable `url()` reference. Data URIs are excluded.
pub fn find_css_urls(css: &str) -> Vec<CssUrl> {
    let bytes = css.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_comment(bytes, i + 2);
            }
            b'"' | b'\'' => {
                i = skip_string(bytes, i + 1, bytes[i]);
            }
            b'u' | b'U' => {
                if is_url_function_start(bytes, i) {
                    let (next, url) = read_url_function(css, i + 4);
                    if let Some(url) = url {
                        if !is_data_url(&url.raw) {
                            found.push(url);
                        }
                    }
                    i = next;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    found
}

fn is_url_function_start(bytes: &[u8], i: usize) -> bool {
    if i + 4 > bytes.len() || !bytes[i..i + 4].eq_ignore_ascii_case(b"url(") {
        return false;
    }
    // `url` must be its own identifier, not the tail of one.
    if i > 0 {
        let prev = bytes[i - 1];
        if prev.is_ascii_alphanumeric() || prev == b'_' || prev == b'-' {
            return false;
        }
    }
    true
}

fn skip_comment(bytes: &[u8], mut i: usize) -> usize {
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return i + 2;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_string(bytes: &[u8], mut i: usize, quote: u8) -> usize {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            b'\n' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Parse the argument of a `url(` token starting right after the paren.
/// Returns the resume index plus the reference, when well formed.
fn read_url_function(css: &str, open: usize) -> (usize, Option<CssUrl>) {
    let bytes = css.as_bytes();
    let mut i = open;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return (bytes.len(), None);
    }
    match bytes[i] {
        quote @ (b'"' | b'\'') => {
            let start = i + 1;
            let mut j = start;
            while j < bytes.len() && bytes[j] != quote {
                if bytes[j] == b'\\' {
                    j += 1;
                }
                j += 1;
            }
            if j >= bytes.len() {
                return (bytes.len(), None);
            }
            let end = j;
            // Whitespace then the closing paren.
            let mut k = j + 1;
            while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if bytes.get(k) != Some(&b')') {
                return (k, None);
            }
            (
                k + 1,
                Some(CssUrl {
                    start,
                    end,
                    raw: css[start..end].to_string(),
                    quoted: true,
                }),
            )
        }
        _ => {
            // Unquoted url token: up to the closing paren, no whitespace or
            // quotes allowed inside.
            let start = i;
            let mut j = i;
            while j < bytes.len() {
                match bytes[j] {
                    b')' => {
                        let end = j;
                        if end == start {
                            return (j + 1, None);
                        }
                        return (
                            j + 1,
                            Some(CssUrl {
                                start,
                                end,
                                raw: css[start..end].to_string(),
                                quoted: false,
                            }),
                        );
                    }
                    b'"' | b'\'' | b'(' => return (j + 1, None),
                    b if b.is_ascii_whitespace() => {
                        // Trailing whitespace is fine if `)` follows.
                        let mut k = j;
                        while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                            k += 1;
                        }
                        if bytes.get(k) == Some(&b')') {
                            return (
                                k + 1,
                                Some(CssUrl {
                                    start,
                                    end: j,
                                    raw: css[start..j].to_string(),
                                    quoted: false,
                                }),
                            );
                        }
                        return (k, None);
                    }
                    _ => j += 1,
                }
            }
            (bytes.len(), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquoted_and_quoted_forms() {
        let css = r#"body { background: url(https://old/bg.png); }
.a { mask: url("https://old/mask.svg"); }
.b { cursor: url( 'https://old/c.cur' ); }"#;
        let found = find_css_urls(css);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].raw, "https://old/bg.png");
        assert!(!found[0].quoted);
        assert_eq!(found[1].raw, "https://old/mask.svg");
        assert!(found[1].quoted);
        assert_eq!(found[2].raw, "https://old/c.cur");
    }

    #[test]
    fn test_spans_are_exact() {
        let css = "a { background: url(x.png) }";
        let found = find_css_urls(css);
        assert_eq!(&css[found[0].start..found[0].end], "x.png");
    }

    #[test]
    fn test_data_uris_excluded() {
        let css = "a { background: url(data:image/png;base64,AAAA) }";
        assert!(find_css_urls(css).is_empty());
    }

    #[test]
    fn test_comments_and_strings_skipped() {
        let css = r#"/* url(commented.png) */ .x { content: "url(instring.png)"; background: url(real.png); }"#;
        let found = find_css_urls(css);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].raw, "real.png");
    }

    #[test]
    fn test_url_must_be_standalone_identifier() {
        let css = ".x { behavior: myurl(a.png); background: url(b.png) }";
        let found = find_css_urls(css);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].raw, "b.png");
    }
}
