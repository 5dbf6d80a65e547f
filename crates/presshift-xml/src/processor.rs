//! The namespace-resolving token processor.
//!
//! Wraps the lexer with document-structure checks, namespace scopes, depth
//! accounting, breadcrumbs, and resumable bookmarks. This is the layer the
//! WXR entity reader drives.

use serde::{Deserialize, Serialize};

use presshift_stream::ByteStream;

use crate::lexer::{ByteSpan, Lexed, Lexer, RawEvent};
use crate::name::XmlName;
use crate::namespaces::NamespaceStack;
use crate::{UnsupportedFeature, XmlError, XmlResult};

/// A namespace-resolved attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: XmlName,
    pub value: String,
    /// Byte range of the value content in the input.
    pub span: ByteSpan,
}

/// A fully resolved token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    ElementOpen {
        name: XmlName,
        attributes: Vec<Attribute>,
        self_closing: bool,
    },
    ElementClose {
        name: XmlName,
    },
    Text(String),
    CData(String),
    Comment(String),
    XmlDecl {
        version: String,
        encoding: Option<String>,
        standalone: Option<bool>,
    },
    Doctype(String),
}

/// A token plus its position observables.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlToken {
    pub kind: TokenKind,
    pub byte_start: u64,
    pub byte_len: u64,
    /// Number of open elements enclosing (or, for element tokens,
    /// including) this token.
    pub depth: usize,
}

impl XmlToken {
    /// The character data carried by text-like tokens.
    pub fn character_data(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Text(text) | TokenKind::CData(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_element_open(&self) -> bool {
        matches!(self.kind, TokenKind::ElementOpen { .. })
    }

    pub fn is_element_close(&self) -> bool {
        matches!(self.kind, TokenKind::ElementClose { .. })
    }
}

/// Outcome of one processor step.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlStep {
    Token(XmlToken),
    /// The buffered input ends mid-token; feed more bytes or mark the input
    /// finished and step again.
    NeedMoreInput,
    EndOfDocument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum DocPhase {
    Prolog,
    InDocument,
    AfterDocument,
}

/// A resumable position between two tokens.
///
/// Serializes to JSON (and from there to an opaque base64 cursor) so that a
/// parse can continue in another process, given a seekable source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XmlBookmark {
    pub offset: u64,
    namespaces: Vec<Vec<(String, String)>>,
    open_elements: Vec<XmlName>,
    phase: DocPhase,
}

/// Tuning knobs for the processor.
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Maximum element nesting before the document is refused as
    /// unsupported.
    pub depth_limit: usize,

    /// How many bytes to request from the stream per lexer call.
    pub chunk_size: usize,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            depth_limit: 128,
            chunk_size: 8 * 1024,
        }
    }
}

/// Incremental, namespace-aware XML token producer.
pub struct XmlProcessor {
    stream: ByteStream,
    lexer: Lexer,
    namespaces: NamespaceStack,
    open_elements: Vec<XmlName>,
    phase: DocPhase,
    /// The element just closed (or self-closed) still shows in breadcrumbs;
    /// its scope is popped right before the next step.
    pending_pop: bool,
    options: ProcessorOptions,
}

impl XmlProcessor {
    pub fn new(stream: ByteStream) -> Self {
        Self::with_options(stream, ProcessorOptions::default())
    }

    pub fn with_options(stream: ByteStream, options: ProcessorOptions) -> Self {
        let lexer = Lexer::resumed_at(stream.tell());
        Self {
            stream,
            lexer,
            namespaces: NamespaceStack::new(),
            open_elements: Vec::new(),
            phase: DocPhase::Prolog,
            pending_pop: false,
            options,
        }
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::new(ByteStream::from_memory(data))
    }

    /// An empty processor to be fed through [`XmlProcessor::append_bytes`].
    pub fn push() -> Self {
        Self::new(ByteStream::push_stream())
    }

    /// Re-seat a processor on a seekable stream at a previously captured
    /// bookmark.
    pub fn resume(mut stream: ByteStream, bookmark: &XmlBookmark) -> XmlResult<Self> {
        stream.seek(bookmark.offset)?;
        let mut processor = Self::new(stream);
        processor.lexer = Lexer::resumed_at(bookmark.offset);
        processor.namespaces = NamespaceStack::restore(bookmark.namespaces.clone());
        processor.open_elements = bookmark.open_elements.clone();
        processor.phase = bookmark.phase;
        Ok(processor)
    }

    /// Feed more bytes to a push-fed processor.
    pub fn append_bytes(&mut self, data: &[u8]) -> XmlResult<()> {
        self.stream.append_bytes(data)?;
        Ok(())
    }

    /// Mark the end of push-fed input.
    pub fn input_finished(&mut self) {
        self.stream.input_finished();
    }

    /// Produce the next token, pausing on incomplete input.
    pub fn next_token(&mut self) -> XmlResult<XmlStep> {
        self.apply_pending_pop();
        loop {
            let available = self.stream.peek(self.options.chunk_size)?.len();
            if available == 0 {
                if !self.stream.reached_end_of_data() {
                    return Ok(XmlStep::NeedMoreInput);
                }
                if let Some(lexed) = self.lexer.finish()? {
                    if let Some(token) = self.interpret(lexed)? {
                        return Ok(XmlStep::Token(token));
                    }
                    continue;
                }
                return self.end_of_document();
            }

            let (consumed, lexed) = {
                let buffered = self.stream.buffered();
                self.lexer.advance(buffered)?
            };
            self.stream.consume(consumed)?;
            if let Some(lexed) = lexed {
                if let Some(token) = self.interpret(lexed)? {
                    return Ok(XmlStep::Token(token));
                }
            }
        }
    }

    /// XML Names of the open elements from the root to the current token's
    /// element (inclusive for element tokens).
    pub fn breadcrumbs(&self) -> &[XmlName] {
        &self.open_elements
    }

    /// Match breadcrumbs against a pattern of local names or `{uri}local`
    /// forms; `*` matches any single segment.
    pub fn matches_breadcrumbs(&self, pattern: &[&str]) -> bool {
        if pattern.len() != self.open_elements.len() {
            return false;
        }
        self.open_elements
            .iter()
            .zip(pattern)
            .all(|(name, segment)| {
                *segment == "*"
                    || *segment == name.local
                    || *segment == name.to_string()
            })
    }

    pub fn depth(&self) -> usize {
        self.open_elements.len()
    }

    /// Capture the resume point after the current token.
    pub fn bookmark(&self) -> XmlBookmark {
        let mut open_elements = self.open_elements.clone();
        let mut namespaces = self.namespaces.snapshot();
        if self.pending_pop {
            open_elements.pop();
            namespaces.pop();
        }
        let phase = if self.phase == DocPhase::InDocument && open_elements.is_empty() {
            DocPhase::AfterDocument
        } else {
            self.phase
        };
        XmlBookmark {
            offset: self.lexer.position(),
            namespaces,
            open_elements,
            phase,
        }
    }

    /// Serialize the current resume point as an opaque cursor string.
    pub fn get_reentrancy_cursor(&self) -> XmlResult<String> {
        crate::cursor::encode_cursor(&self.bookmark())
    }

    /// Pin the stream buffer so a later in-window seek back to `offset`
    /// stays cheap.
    pub fn pin(&mut self, offset: u64) -> presshift_stream::MarkId {
        self.stream.add_mark(offset)
    }

    pub fn unpin(&mut self, id: presshift_stream::MarkId) {
        self.stream.remove_mark(id);
    }

    /// Absolute offset of the next unlexed byte.
    pub fn position(&self) -> u64 {
        self.lexer.position()
    }

    pub fn into_stream(self) -> ByteStream {
        self.stream
    }

    fn apply_pending_pop(&mut self) {
        if self.pending_pop {
            self.pending_pop = false;
            self.namespaces.pop_scope();
            self.open_elements.pop();
            if self.open_elements.is_empty() && self.phase == DocPhase::InDocument {
                self.phase = DocPhase::AfterDocument;
            }
        }
    }

    fn end_of_document(&self) -> XmlResult<XmlStep> {
        match self.phase {
            DocPhase::AfterDocument => Ok(XmlStep::EndOfDocument),
            DocPhase::Prolog => Err(XmlError::Malformed {
                offset: self.lexer.position(),
                reason: "document has no root element".to_string(),
            }),
            DocPhase::InDocument => Err(XmlError::Malformed {
                offset: self.lexer.position(),
                reason: format!(
                    "unexpected end of input with {} open element(s)",
                    self.open_elements.len()
                ),
            }),
        }
    }

    fn interpret(&mut self, lexed: Lexed) -> XmlResult<Option<XmlToken>> {
        let Lexed { event, span } = lexed;
        let kind = match event {
            RawEvent::Text(text) => {
                if self.open_elements.is_empty() {
                    if text.chars().all(char::is_whitespace) {
                        return Ok(None);
                    }
                    return Err(XmlError::Malformed {
                        offset: span.start,
                        reason: "character data outside the root element".to_string(),
                    });
                }
                TokenKind::Text(text)
            }
            RawEvent::CData(text) => {
                if self.open_elements.is_empty() {
                    return Err(XmlError::Malformed {
                        offset: span.start,
                        reason: "CDATA outside the root element".to_string(),
                    });
                }
                TokenKind::CData(text)
            }
            RawEvent::Comment(text) => TokenKind::Comment(text),
            RawEvent::XmlDecl {
                version,
                encoding,
                standalone,
            } => {
                if self.phase != DocPhase::Prolog {
                    return Err(XmlError::Malformed {
                        offset: span.start,
                        reason: "XML declaration after content".to_string(),
                    });
                }
                TokenKind::XmlDecl {
                    version,
                    encoding,
                    standalone,
                }
            }
            RawEvent::Doctype(body) => {
                if self.phase != DocPhase::Prolog {
                    return Err(XmlError::Malformed {
                        offset: span.start,
                        reason: "doctype after content".to_string(),
                    });
                }
                TokenKind::Doctype(body)
            }
            RawEvent::StartTag {
                qname,
                attributes,
                self_closing,
            } => {
                if self.phase == DocPhase::AfterDocument {
                    return Err(XmlError::Malformed {
                        offset: span.start,
                        reason: "multiple root elements".to_string(),
                    });
                }
                if self.open_elements.len() >= self.options.depth_limit {
                    return Err(XmlError::Unsupported(UnsupportedFeature::DeepNesting));
                }

                let mut declarations = Vec::new();
                let mut plain = Vec::new();
                for attr in attributes {
                    if attr.qname == "xmlns" {
                        declarations.push((String::new(), attr.value));
                    } else if let Some(prefix) = attr.qname.strip_prefix("xmlns:") {
                        declarations.push((prefix.to_string(), attr.value));
                    } else {
                        plain.push(attr);
                    }
                }
                self.namespaces.push_scope(declarations);

                let name = match self.namespaces.resolve_element(&qname, span.start) {
                    Ok(name) => name,
                    Err(err) => {
                        self.namespaces.pop_scope();
                        return Err(err);
                    }
                };
                let mut resolved = Vec::with_capacity(plain.len());
                for attr in plain {
                    match self.namespaces.resolve_attribute(&attr.qname, span.start) {
                        Ok(attr_name) => resolved.push(Attribute {
                            name: attr_name,
                            value: attr.value,
                            span: attr.span,
                        }),
                        Err(err) => {
                            self.namespaces.pop_scope();
                            return Err(err);
                        }
                    }
                }

                self.phase = DocPhase::InDocument;
                self.open_elements.push(name.clone());
                if self_closing {
                    self.pending_pop = true;
                }
                TokenKind::ElementOpen {
                    name,
                    attributes: resolved,
                    self_closing,
                }
            }
            RawEvent::EndTag { qname } => {
                let name = self.namespaces.resolve_element(&qname, span.start)?;
                match self.open_elements.last() {
                    None => {
                        return Err(XmlError::Malformed {
                            offset: span.start,
                            reason: format!("closing tag `{name}` with nothing open"),
                        });
                    }
                    Some(open) if *open != name => {
                        return Err(XmlError::Malformed {
                            offset: span.start,
                            reason: format!("closing tag `{name}` does not match open `{open}`"),
                        });
                    }
                    Some(_) => {}
                }
                self.pending_pop = true;
                TokenKind::ElementClose { name }
            }
        };
        Ok(Some(XmlToken {
            kind,
            byte_start: span.start,
            byte_len: span.len,
            depth: self.open_elements.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_tokens(input: &str) -> Vec<XmlToken> {
        let mut processor = XmlProcessor::from_bytes(input.as_bytes().to_vec());
        let mut tokens = Vec::new();
        loop {
            match processor.next_token().unwrap() {
                XmlStep::Token(token) => tokens.push(token),
                XmlStep::EndOfDocument => break,
                XmlStep::NeedMoreInput => unreachable!("memory stream never starves"),
            }
        }
        tokens
    }

    const WXR_NS: &str = "http://wordpress.org/export/1.2/";

    #[test]
    fn test_namespace_resolution() {
        let tokens = collect_tokens(&format!(
            r#"<rss xmlns:wp="{WXR_NS}"><channel><wp:post_id>7</wp:post_id></channel></rss>"#
        ));
        match &tokens[2].kind {
            TokenKind::ElementOpen { name, .. } => {
                assert_eq!(*name, XmlName::new(WXR_NS, "post_id"));
            }
            other => panic!("unexpected token {other:?}"),
        }
        assert_eq!(tokens[2].depth, 3);
        match &tokens[3].kind {
            TokenKind::Text(text) => assert_eq!(text, "7"),
            other => panic!("unexpected token {other:?}"),
        }
    }

    #[test]
    fn test_breadcrumbs_and_matching() {
        let mut processor = XmlProcessor::from_bytes(
            r#"<rss><channel><title>x</title></channel></rss>"#.as_bytes().to_vec(),
        );
        // rss, channel, title opens
        for _ in 0..3 {
            processor.next_token().unwrap();
        }
        assert!(processor.matches_breadcrumbs(&["rss", "channel", "title"]));
        assert!(processor.matches_breadcrumbs(&["rss", "channel", "*"]));
        assert!(!processor.matches_breadcrumbs(&["rss", "*"]));
        // The text token keeps the element breadcrumbs.
        processor.next_token().unwrap();
        assert!(processor.matches_breadcrumbs(&["rss", "channel", "title"]));
    }

    #[test]
    fn test_mismatched_close_is_fatal() {
        let mut processor = XmlProcessor::from_bytes(b"<a><b></a></b>".to_vec());
        processor.next_token().unwrap();
        processor.next_token().unwrap();
        assert!(matches!(
            processor.next_token(),
            Err(XmlError::Malformed { .. })
        ));
    }

    #[test]
    fn test_multiple_roots_rejected() {
        let mut processor = XmlProcessor::from_bytes(b"<a/><b/>".to_vec());
        processor.next_token().unwrap();
        assert!(matches!(
            processor.next_token(),
            Err(XmlError::Malformed { .. })
        ));
    }

    #[test]
    fn test_push_feeding_suspends() {
        let mut processor = XmlProcessor::push();
        processor.append_bytes(b"<a>hel").unwrap();
        match processor.next_token().unwrap() {
            XmlStep::Token(token) => assert!(token.is_element_open()),
            other => panic!("unexpected {other:?}"),
        }
        // Text is incomplete; the processor pauses without emitting.
        assert_eq!(processor.next_token().unwrap(), XmlStep::NeedMoreInput);
        processor.append_bytes(b"lo</a>").unwrap();
        processor.input_finished();
        match processor.next_token().unwrap() {
            XmlStep::Token(token) => {
                assert_eq!(token.character_data(), Some("hello"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_depth_limit() {
        let depth = 10;
        let mut input = String::new();
        for i in 0..=depth {
            input.push_str(&format!("<e{i}>"));
        }
        let mut processor = XmlProcessor::with_options(
            presshift_stream::ByteStream::from_memory(input.into_bytes()),
            ProcessorOptions {
                depth_limit: depth,
                ..ProcessorOptions::default()
            },
        );
        let result = std::iter::from_fn(|| Some(processor.next_token()))
            .take(depth + 1)
            .last()
            .unwrap();
        assert!(matches!(
            result,
            Err(XmlError::Unsupported(UnsupportedFeature::DeepNesting))
        ));
    }

    #[test]
    fn test_token_spans_cover_input() {
        let input = r#"<?xml version="1.0"?><a x="1">text<b/></a>"#;
        let tokens = collect_tokens(input);
        let total: u64 = tokens.iter().map(|t| t.byte_len).sum();
        assert_eq!(total, input.len() as u64);
        for pair in tokens.windows(2) {
            assert_eq!(pair[0].byte_start + pair[0].byte_len, pair[1].byte_start);
        }
    }

    #[test]
    fn test_bookmark_resume_yields_identical_tokens() {
        let input = format!(
            r#"<rss xmlns:wp="{WXR_NS}"><channel><item><wp:post_id>1</wp:post_id></item><item><wp:post_id>2</wp:post_id></item></channel></rss>"#
        );

        let mut processor = XmlProcessor::from_bytes(input.as_bytes().to_vec());
        let mut seen = 0;
        // Stop right after the first </item>.
        let bookmark = loop {
            match processor.next_token().unwrap() {
                XmlStep::Token(token) => {
                    if token.is_element_close() {
                        seen += 1;
                        if seen == 2 {
                            break processor.bookmark();
                        }
                    }
                }
                other => panic!("unexpected {other:?}"),
            }
        };
        let mut remaining = Vec::new();
        loop {
            match processor.next_token().unwrap() {
                XmlStep::Token(token) => remaining.push(token),
                XmlStep::EndOfDocument => break,
                XmlStep::NeedMoreInput => unreachable!(),
            }
        }

        let stream = presshift_stream::ByteStream::from_memory(input.as_bytes().to_vec());
        let mut resumed = XmlProcessor::resume(stream, &bookmark).unwrap();
        let mut replayed = Vec::new();
        loop {
            match resumed.next_token().unwrap() {
                XmlStep::Token(token) => replayed.push(token),
                XmlStep::EndOfDocument => break,
                XmlStep::NeedMoreInput => unreachable!(),
            }
        }
        assert_eq!(remaining, replayed);
    }

    #[test]
    fn test_cursor_round_trip() {
        let mut processor = XmlProcessor::from_bytes(b"<a><b/></a>".to_vec());
        processor.next_token().unwrap();
        let cursor = processor.get_reentrancy_cursor().unwrap();
        let bookmark: XmlBookmark = crate::cursor::decode_cursor(&cursor).unwrap();
        assert_eq!(bookmark, processor.bookmark());
    }
}
