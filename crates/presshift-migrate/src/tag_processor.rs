//! A streaming HTML tag tokenizer with staged edits.
//!
//! Scans WordPress-grade markup (well formed enough, no tree building) into
//! tags, text runs, and comments, exposing attributes by name. All writes
//! are staged as byte-range replacements and applied in ascending offset
//! order by [`TagProcessor::get_updated_html`]; overlapping edits are
//! refused rather than silently merged.

use tracing::warn;

use crate::{MigrateError, MigrateResult};

/// The kind of token the processor is paused on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    TagOpen,
    TagClose,
    Text,
    Comment,
}

/// A staged byte-range replacement.
#[derive(Debug, Clone)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

#[derive(Debug, Clone)]
struct AttrSpan {
    name_start: usize,
    name_end: usize,
    /// Value content span, excluding quotes. For a bare attribute this is
    /// the empty span at the end of the name.
    value_start: usize,
    value_end: usize,
    has_value: bool,
}

#[derive(Debug, Clone)]
struct CurrentToken {
    kind: TokenType,
    start: usize,
    end: usize,
    name_start: usize,
    name_end: usize,
    /// For comments, the payload between `<!--` and `-->`.
    payload_start: usize,
    payload_end: usize,
    attrs: Vec<AttrSpan>,
    self_closing: bool,
}

/// The tokenizer.
pub struct TagProcessor {
    html: Vec<u8>,
    pos: usize,
    token: Option<CurrentToken>,
    edits: Vec<Edit>,
    /// Set after an opener whose content is raw text (SCRIPT, STYLE, ...).
    raw_text_tag: Option<String>,
}

/// Elements whose content is raw text rather than markup.
const RAW_TEXT_TAGS: [&str; 4] = ["script", "style", "textarea", "title"];

impl TagProcessor {
    pub fn new(html: &str) -> Self {
        Self {
            html: html.as_bytes().to_vec(),
            pos: 0,
            token: None,
            edits: Vec::new(),
            raw_text_tag: None,
        }
    }

    /// Advance to the next token. Returns its type, or `None` at the end of
    /// the document.
    pub fn next_token(&mut self) -> Option<TokenType> {
        self.token = None;
        if self.pos >= self.html.len() {
            return None;
        }
        if let Some(tag) = self.raw_text_tag.take() {
            if let Some(token) = self.lex_raw_text(&tag) {
                self.token = Some(token);
                return self.token_type();
            }
        }
        let token = if self.html[self.pos] == b'<' {
            self.lex_markup()
        } else {
            self.lex_text()
        };
        self.pos = token.end;
        if token.kind == TokenType::TagOpen && !token.self_closing {
            let name = self.slice(token.name_start, token.name_end).to_ascii_lowercase();
            if RAW_TEXT_TAGS.contains(&name.as_str()) {
                self.raw_text_tag = Some(name);
            }
        }
        self.token = Some(token);
        self.token_type()
    }

    pub fn token_type(&self) -> Option<TokenType> {
        self.token.as_ref().map(|t| t.kind)
    }

    /// Lowercased tag name of the current tag token.
    pub fn tag_name(&self) -> Option<String> {
        let token = self.token.as_ref()?;
        match token.kind {
            TokenType::TagOpen | TokenType::TagClose => {
                Some(self.slice(token.name_start, token.name_end).to_ascii_lowercase())
            }
            _ => None,
        }
    }

    pub fn is_self_closing(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.self_closing)
    }

    /// The raw text of the current text token.
    pub fn text(&self) -> Option<&str> {
        let token = self.token.as_ref()?;
        (token.kind == TokenType::Text).then(|| self.slice(token.start, token.end))
    }

    /// Absolute byte range of the current text token.
    pub fn text_span(&self) -> Option<(usize, usize)> {
        let token = self.token.as_ref()?;
        (token.kind == TokenType::Text).then_some((token.start, token.end))
    }

    /// The payload of the current comment token (between the delimiters).
    pub fn comment_text(&self) -> Option<&str> {
        let token = self.token.as_ref()?;
        (token.kind == TokenType::Comment)
            .then(|| self.slice(token.payload_start, token.payload_end))
    }

    /// Absolute byte range of the current comment payload.
    pub fn comment_span(&self) -> Option<(usize, usize)> {
        let token = self.token.as_ref()?;
        (token.kind == TokenType::Comment).then_some((token.payload_start, token.payload_end))
    }

    /// Decoded value of an attribute on the current tag, by case-insensitive
    /// name. A bare attribute yields an empty string.
    pub fn get_attribute(&self, name: &str) -> Option<String> {
        let span = self.find_attribute(name)?;
        if !span.has_value {
            return Some(String::new());
        }
        Some(html_decode(self.slice(span.value_start, span.value_end)))
    }

    /// Raw (undecoded) value bytes of an attribute and their span.
    pub fn raw_attribute(&self, name: &str) -> Option<(&str, (usize, usize))> {
        let span = self.find_attribute(name)?;
        if !span.has_value {
            return None;
        }
        Some((
            self.slice(span.value_start, span.value_end),
            (span.value_start, span.value_end),
        ))
    }

    /// Stage a replacement of an attribute's value. The new value is
    /// attribute-encoded.
    pub fn set_attribute(&mut self, name: &str, value: &str) -> MigrateResult<()> {
        let Some(span) = self.find_attribute(name) else {
            return Err(MigrateError::NoSuchAttribute(name.to_string()));
        };
        if !span.has_value {
            return Err(MigrateError::NoSuchAttribute(name.to_string()));
        }
        self.edits.push(Edit {
            start: span.value_start,
            end: span.value_end,
            text: html_encode_attribute(value),
        });
        Ok(())
    }

    /// Stage a raw byte-range replacement (text rewrites, comment payload
    /// swaps). Offsets are absolute.
    pub fn replace_range(&mut self, start: usize, end: usize, text: String) {
        self.edits.push(Edit { start, end, text });
    }

    /// Opaque resume point: the offset where the current token begins.
    pub fn bookmark(&self) -> usize {
        self.token.as_ref().map_or(self.pos, |t| t.start)
    }

    /// Re-seat the tokenizer at an earlier bookmark.
    pub fn seek(&mut self, bookmark: usize) {
        self.pos = bookmark.min(self.html.len());
        self.token = None;
        self.raw_text_tag = None;
    }

    /// Apply every staged edit in ascending offset order.
    pub fn get_updated_html(&self) -> MigrateResult<String> {
        let mut edits: Vec<&Edit> = self.edits.iter().collect();
        edits.sort_by_key(|e| (e.start, e.end));
        let mut out = Vec::with_capacity(self.html.len());
        let mut cursor = 0;
        for edit in edits {
            if edit.start < cursor {
                return Err(MigrateError::ConflictingEdit {
                    offset: edit.start,
                });
            }
            out.extend_from_slice(&self.html[cursor..edit.start]);
            out.extend_from_slice(edit.text.as_bytes());
            cursor = edit.end;
        }
        out.extend_from_slice(&self.html[cursor..]);
        String::from_utf8(out).map_err(|_| MigrateError::InvalidUtf8)
    }

    fn slice(&self, start: usize, end: usize) -> &str {
        std::str::from_utf8(&self.html[start..end]).unwrap_or_default()
    }

    fn find_attribute(&self, name: &str) -> Option<AttrSpan> {
        let token = self.token.as_ref()?;
        if token.kind != TokenType::TagOpen {
            return None;
        }
        token
            .attrs
            .iter()
            .find(|span| {
                self.slice(span.name_start, span.name_end)
                    .eq_ignore_ascii_case(name)
            })
            .cloned()
    }

    fn lex_text(&mut self) -> CurrentToken {
        let start = self.pos;
        let mut end = self.pos;
        while end < self.html.len() && self.html[end] != b'<' {
            end += 1;
        }
        CurrentToken {
            kind: TokenType::Text,
            start,
            end,
            name_start: start,
            name_end: start,
            payload_start: start,
            payload_end: end,
            attrs: Vec::new(),
            self_closing: false,
        }
    }

    /// Raw text content of a SCRIPT/STYLE/TEXTAREA/TITLE element, up to its
    /// closing tag.
    fn lex_raw_text(&mut self, tag: &str) -> Option<CurrentToken> {
        let start = self.pos;
        let closer = format!("</{tag}");
        let haystack = &self.html[start..];
        let end = find_case_insensitive(haystack, closer.as_bytes())
            .map(|at| start + at)
            .unwrap_or(self.html.len());
        if end == start {
            return None;
        }
        self.pos = end;
        Some(CurrentToken {
            kind: TokenType::Text,
            start,
            end,
            name_start: start,
            name_end: start,
            payload_start: start,
            payload_end: end,
            attrs: Vec::new(),
            self_closing: false,
        })
    }

    fn lex_markup(&mut self) -> CurrentToken {
        let start = self.pos;
        let bytes = &self.html;
        match bytes.get(start + 1) {
            Some(b'!') => {
                if bytes[start + 1..].starts_with(b"!--") {
                    self.lex_comment(start)
                } else {
                    // Doctype or bogus markup declaration: an opaque comment.
                    let end = find_byte(bytes, b'>', start).map_or(bytes.len(), |at| at + 1);
                    CurrentToken {
                        kind: TokenType::Comment,
                        start,
                        end,
                        name_start: start,
                        name_end: start,
                        payload_start: start + 2,
                        payload_end: end.saturating_sub(1),
                        attrs: Vec::new(),
                        self_closing: false,
                    }
                }
            }
            Some(b'/') => {
                let name_start = start + 2;
                let name_end = self.scan_name(name_start);
                let end = find_byte(bytes, b'>', name_end).map_or(bytes.len(), |at| at + 1);
                CurrentToken {
                    kind: TokenType::TagClose,
                    start,
                    end,
                    name_start,
                    name_end,
                    payload_start: start,
                    payload_end: end,
                    attrs: Vec::new(),
                    self_closing: false,
                }
            }
            Some(c) if c.is_ascii_alphabetic() => self.lex_open_tag(start),
            _ => {
                // A literal `<` in text.
                let mut end = start + 1;
                while end < bytes.len() && bytes[end] != b'<' {
                    end += 1;
                }
                CurrentToken {
                    kind: TokenType::Text,
                    start,
                    end,
                    name_start: start,
                    name_end: start,
                    payload_start: start,
                    payload_end: end,
                    attrs: Vec::new(),
                    self_closing: false,
                }
            }
        }
    }

    fn lex_comment(&mut self, start: usize) -> CurrentToken {
        let payload_start = start + 4;
        let close = find_subslice(&self.html, b"-->", payload_start);
        let (payload_end, end) = match close {
            Some(at) => (at, at + 3),
            None => {
                warn!(offset = start, "unterminated comment");
                (self.html.len(), self.html.len())
            }
        };
        CurrentToken {
            kind: TokenType::Comment,
            start,
            end,
            name_start: start,
            name_end: start,
            payload_start,
            payload_end,
            attrs: Vec::new(),
            self_closing: false,
        }
    }

    fn lex_open_tag(&mut self, start: usize) -> CurrentToken {
        let name_start = start + 1;
        let name_end = self.scan_name(name_start);
        let mut attrs = Vec::new();
        let mut i = name_end;
        let mut self_closing = false;
        let len = self.html.len();
        loop {
            while i < len && self.html[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= len {
                break;
            }
            match self.html[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' => {
                    if self.html.get(i + 1) == Some(&b'>') {
                        self_closing = true;
                        i += 2;
                        break;
                    }
                    i += 1;
                }
                _ => {
                    let attr = self.scan_attribute(&mut i);
                    attrs.push(attr);
                }
            }
        }
        CurrentToken {
            kind: TokenType::TagOpen,
            start,
            end: i,
            name_start,
            name_end,
            payload_start: start,
            payload_end: i,
            attrs,
            self_closing,
        }
    }

    fn scan_name(&self, start: usize) -> usize {
        let mut end = start;
        while end < self.html.len() {
            let b = self.html[end];
            if b.is_ascii_whitespace() || matches!(b, b'>' | b'/' | b'=') {
                break;
            }
            end += 1;
        }
        end
    }

    fn scan_attribute(&self, i: &mut usize) -> AttrSpan {
        let name_start = *i;
        let name_end = self.scan_name(name_start);
        *i = name_end;
        let len = self.html.len();
        while *i < len && self.html[*i].is_ascii_whitespace() {
            *i += 1;
        }
        if self.html.get(*i) != Some(&b'=') {
            return AttrSpan {
                name_start,
                name_end,
                value_start: name_end,
                value_end: name_end,
                has_value: false,
            };
        }
        *i += 1;
        while *i < len && self.html[*i].is_ascii_whitespace() {
            *i += 1;
        }
        match self.html.get(*i) {
            Some(&quote) if quote == b'"' || quote == b'\'' => {
                let value_start = *i + 1;
                let mut value_end = value_start;
                while value_end < len && self.html[value_end] != quote {
                    value_end += 1;
                }
                *i = (value_end + 1).min(len);
                AttrSpan {
                    name_start,
                    name_end,
                    value_start,
                    value_end,
                    has_value: true,
                }
            }
            _ => {
                let value_start = *i;
                let mut value_end = value_start;
                while value_end < len {
                    let b = self.html[value_end];
                    if b.is_ascii_whitespace() || b == b'>' {
                        break;
                    }
                    value_end += 1;
                }
                *i = value_end;
                AttrSpan {
                    name_start,
                    name_end,
                    value_start,
                    value_end,
                    has_value: true,
                }
            }
        }
    }
}

fn find_byte(haystack: &[u8], needle: u8, from: usize) -> Option<usize> {
    haystack[from.min(haystack.len())..]
        .iter()
        .position(|&b| b == needle)
        .map(|at| from + at)
}

fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    let from = from.min(haystack.len());
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|at| from + at)
}

fn find_case_insensitive(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// Minimal HTML character reference decoding for attribute values.
pub(crate) fn html_decode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < input.len() {
        if bytes[i] == b'&' {
            if let Some(semi) = input[i..].find(';').filter(|&at| at <= 12) {
                let body = &input[i + 1..i + semi];
                if let Some(decoded) = decode_reference(body) {
                    out.push_str(&decoded);
                    i += semi + 1;
                    continue;
                }
            }
        }
        let ch = input[i..].chars().next().unwrap_or('\u{FFFD}');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn decode_reference(body: &str) -> Option<String> {
    if let Some(numeric) = body.strip_prefix('#') {
        let value = if let Some(hex) = numeric.strip_prefix(['x', 'X']) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            numeric.parse().ok()?
        };
        return char::from_u32(value).map(String::from);
    }
    let ch = match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{00A0}',
        _ => return None,
    };
    Some(ch.to_string())
}

/// Encode a string for a double-quoted attribute value.
pub(crate) fn html_encode_attribute(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(html: &str) -> Vec<(TokenType, Option<String>)> {
        let mut processor = TagProcessor::new(html);
        let mut out = Vec::new();
        while let Some(kind) = processor.next_token() {
            out.push((kind, processor.tag_name()));
        }
        out
    }

    #[test]
    fn test_basic_tokens() {
        let html = r#"<p class="intro">Hello <b>world</b></p><!-- note -->"#;
        let kinds = tokens(html);
        assert_eq!(
            kinds,
            vec![
                (TokenType::TagOpen, Some("p".into())),
                (TokenType::Text, None),
                (TokenType::TagOpen, Some("b".into())),
                (TokenType::Text, None),
                (TokenType::TagClose, Some("b".into())),
                (TokenType::TagClose, Some("p".into())),
                (TokenType::Comment, None),
            ]
        );
    }

    #[test]
    fn test_attributes() {
        let mut processor =
            TagProcessor::new(r#"<img src="a.jpg" alt='pic' hidden data-x=plain>"#);
        processor.next_token();
        assert_eq!(processor.get_attribute("src"), Some("a.jpg".into()));
        assert_eq!(processor.get_attribute("SRC"), Some("a.jpg".into()));
        assert_eq!(processor.get_attribute("alt"), Some("pic".into()));
        assert_eq!(processor.get_attribute("hidden"), Some(String::new()));
        assert_eq!(processor.get_attribute("data-x"), Some("plain".into()));
        assert_eq!(processor.get_attribute("missing"), None);
    }

    #[test]
    fn test_attribute_entity_decoding() {
        let mut processor = TagProcessor::new(r#"<a href="/x?a=1&amp;b=2">l</a>"#);
        processor.next_token();
        assert_eq!(processor.get_attribute("href"), Some("/x?a=1&b=2".into()));
    }

    #[test]
    fn test_set_attribute_and_updated_html() {
        let mut processor = TagProcessor::new(r#"<img src="old.jpg"><img src="old2.jpg">"#);
        processor.next_token();
        processor.set_attribute("src", "new.jpg").unwrap();
        processor.next_token();
        processor.set_attribute("src", "a&b.jpg").unwrap();
        assert_eq!(
            processor.get_updated_html().unwrap(),
            r#"<img src="new.jpg"><img src="a&amp;b.jpg">"#
        );
    }

    #[test]
    fn test_edits_apply_in_offset_order() {
        let mut processor = TagProcessor::new("0123456789");
        processor.replace_range(6, 8, "X".into());
        processor.replace_range(1, 3, "Y".into());
        assert_eq!(processor.get_updated_html().unwrap(), "0Y345X89");
    }

    #[test]
    fn test_overlapping_edits_conflict() {
        let mut processor = TagProcessor::new("0123456789");
        processor.replace_range(2, 6, "A".into());
        processor.replace_range(4, 8, "B".into());
        assert!(matches!(
            processor.get_updated_html(),
            Err(MigrateError::ConflictingEdit { offset: 4 })
        ));
    }

    #[test]
    fn test_comment_payload_span() {
        let html = "<!-- wp:image {\"a\":1} -->";
        let mut processor = TagProcessor::new(html);
        processor.next_token();
        assert_eq!(processor.comment_text(), Some(" wp:image {\"a\":1} "));
        let (start, end) = processor.comment_span().unwrap();
        assert_eq!(&html[start..end], " wp:image {\"a\":1} ");
    }

    #[test]
    fn test_script_and_style_are_raw_text() {
        let html = "<style>a { content: \"</p>\" } b</style><p>x</p>";
        let mut processor = TagProcessor::new(html);
        assert_eq!(processor.next_token(), Some(TokenType::TagOpen));
        assert_eq!(processor.tag_name(), Some("style".into()));
        assert_eq!(processor.next_token(), Some(TokenType::Text));
        assert!(processor.text().unwrap().contains("content"));
        assert_eq!(processor.next_token(), Some(TokenType::TagClose));
        assert_eq!(processor.tag_name(), Some("style".into()));
    }

    #[test]
    fn test_self_closing_and_literal_angle() {
        let mut processor = TagProcessor::new("<br/>a < b");
        assert_eq!(processor.next_token(), Some(TokenType::TagOpen));
        assert!(processor.is_self_closing());
        assert_eq!(processor.next_token(), Some(TokenType::Text));
        assert_eq!(processor.next_token(), Some(TokenType::Text));
        assert!(processor.next_token().is_none());
    }

    #[test]
    fn test_bookmark_and_seek() {
        let mut processor = TagProcessor::new("<a>one</a><b>two</b>");
        processor.next_token();
        let mark = processor.bookmark();
        processor.next_token();
        processor.next_token();
        processor.seek(mark);
        assert_eq!(processor.next_token(), Some(TokenType::TagOpen));
        assert_eq!(processor.tag_name(), Some("a".into()));
    }
}
