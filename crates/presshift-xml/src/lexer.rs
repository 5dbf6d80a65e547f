//! The byte-level XML state machine.
//!
//! The lexer consumes one byte at a time and emits raw lexical events with
//! absolute byte offsets. It never looks ahead, so it can stop between any
//! two bytes: when input runs out mid-token the accumulated scratch state
//! simply waits for the next `advance` call. Namespace resolution and
//! document-structure checks live in the processor on top.

use crate::charref::{decode_numeric, decode_predefined};
use crate::utf8::Utf8Accumulator;
use crate::{UnsupportedFeature, XmlError, XmlResult};

use serde::{Deserialize, Serialize};

/// A byte range in the input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteSpan {
    pub start: u64,
    pub len: u64,
}

/// A lexical attribute prior to namespace resolution.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawAttribute {
    pub qname: String,
    pub value: String,
    /// Span of the value content between the quotes, in input bytes.
    pub span: ByteSpan,
}

/// A lexical event prior to namespace resolution.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawEvent {
    XmlDecl {
        version: String,
        encoding: Option<String>,
        standalone: Option<bool>,
    },
    Doctype(String),
    Comment(String),
    StartTag {
        qname: String,
        attributes: Vec<RawAttribute>,
        self_closing: bool,
    },
    EndTag {
        qname: String,
    },
    Text(String),
    CData(String),
}

/// Event plus the byte range it was lexed from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lexed {
    pub event: RawEvent,
    pub span: ByteSpan,
}

const MAX_NAME_LENGTH: usize = 4 * 1024;
// &#x10FFFF; is the longest reference that can still be valid.
const MAX_REFERENCE_LENGTH: usize = 9;

const DOCTYPE_KEYWORD: &[u8] = b"DOCTYPE";
const CDATA_KEYWORD: &[u8] = b"[CDATA[";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    /// Character data; also the between-tokens rest state.
    Text,
    /// Partway through the byte order mark.
    Bom(u8),
    /// Saw `<`.
    TagOpen,
    /// Saw `<!`.
    MarkupDecl,
    /// Matching `DOCTYPE` (index of next expected byte).
    DoctypeKeyword(usize),
    /// Opaque doctype body until `>`; `[` (an internal subset) is refused.
    Doctype,
    /// Matching `[CDATA[` (index of next expected byte).
    CDataKeyword(usize),
    CData,
    /// Matched this many `]` bytes inside CDATA.
    CDataEnding(u8),
    /// Saw `<!-`, waiting for the second `-`.
    CommentOpen,
    Comment,
    /// Matched this many `-` bytes inside a comment.
    CommentEnding(u8),
    /// Saw `<?`, accumulating the target name.
    PiTarget,
    /// Inside `<?xml ...`, accumulating up to `?`.
    XmlDeclBody,
    /// Saw `?` inside the XML declaration.
    XmlDeclEnding,
    /// Element name after `<`.
    TagName,
    /// End tag name after `</`.
    EndTagName,
    /// After an end tag name, until `>`.
    EndTagTail,
    /// Inside a start tag between attributes.
    BeforeAttrName,
    AttrName,
    /// After an attribute name, expecting `=`.
    AfterAttrName,
    /// After `=`, expecting the opening quote.
    BeforeAttrValue,
    /// Inside a quoted attribute value.
    AttrValue,
    /// Saw `/` inside a start tag, expecting `>`.
    TagSlash,
    /// Saw `&`; accumulating the reference. `true` inside attribute values.
    Reference(bool),
}

enum Step {
    Consume,
    ConsumeEmit(RawEvent),
    /// Emit without consuming the triggering byte (it starts the next token).
    HoldEmit(RawEvent),
}

pub(crate) struct Lexer {
    state: LexState,
    /// Absolute offset of the next byte to be consumed.
    pos: u64,
    token_start: u64,
    /// First offset at which markup may start (0, or 3 past a BOM).
    document_start: u64,
    text: String,
    text_utf8: Utf8Accumulator,
    pending_cr: bool,
    name: String,
    name_utf8: Utf8Accumulator,
    tag_qname: String,
    attrs: Vec<RawAttribute>,
    value: String,
    value_start: u64,
    quote: u8,
    reference: String,
    finished_text_flushed: bool,
}

impl Lexer {
    pub fn new() -> Self {
        Self::resumed_at(0)
    }

    /// A lexer positioned between tokens at an absolute offset.
    pub fn resumed_at(pos: u64) -> Self {
        Self {
            state: LexState::Text,
            pos,
            token_start: pos,
            document_start: pos,
            text: String::new(),
            text_utf8: Utf8Accumulator::lossy(),
            pending_cr: false,
            name: String::new(),
            name_utf8: Utf8Accumulator::strict(),
            tag_qname: String::new(),
            attrs: Vec::new(),
            value: String::new(),
            value_start: 0,
            quote: 0,
            reference: String::new(),
            finished_text_flushed: false,
        }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Whether the lexer sits between tokens with nothing buffered, i.e. at
    /// a position that can be bookmarked.
    pub fn at_token_boundary(&self) -> bool {
        self.state == LexState::Text && self.text.is_empty() && !self.text_utf8.is_mid_sequence()
    }

    /// Process bytes until an event completes or the slice is exhausted.
    ///
    /// Returns how many bytes were consumed and the completed event, if any.
    pub fn advance(&mut self, input: &[u8]) -> XmlResult<(usize, Option<Lexed>)> {
        let mut consumed = 0;
        while consumed < input.len() {
            let byte = input[consumed];
            match self.step(byte)? {
                Step::Consume => {
                    consumed += 1;
                    self.pos += 1;
                }
                Step::ConsumeEmit(event) => {
                    consumed += 1;
                    self.pos += 1;
                    let span = self.finish_span();
                    return Ok((consumed, Some(Lexed { event, span })));
                }
                Step::HoldEmit(event) => {
                    let span = self.finish_span();
                    return Ok((consumed, Some(Lexed { event, span })));
                }
            }
        }
        Ok((consumed, None))
    }

    /// Signal end of input. Returns a final text event if character data was
    /// pending, `None` on a clean boundary, and an error mid-token.
    pub fn finish(&mut self) -> XmlResult<Option<Lexed>> {
        match self.state {
            LexState::Text => {
                self.text_utf8.finish(&mut self.text);
                if self.text.is_empty() || self.finished_text_flushed {
                    return Ok(None);
                }
                self.finished_text_flushed = true;
                let event = RawEvent::Text(std::mem::take(&mut self.text));
                let span = self.finish_span();
                Ok(Some(Lexed { event, span }))
            }
            _ => Err(XmlError::Malformed {
                offset: self.pos,
                reason: "unexpected end of input inside markup".to_string(),
            }),
        }
    }

    fn finish_span(&mut self) -> ByteSpan {
        let span = ByteSpan {
            start: self.token_start,
            len: self.pos - self.token_start,
        };
        self.token_start = self.pos;
        span
    }

    fn malformed(&self, reason: impl Into<String>) -> XmlError {
        XmlError::Malformed {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn step(&mut self, byte: u8) -> XmlResult<Step> {
        match self.state {
            LexState::Text => self.step_text(byte),
            LexState::Bom(seen) => self.step_bom(seen, byte),
            LexState::TagOpen => self.step_tag_open(byte),
            LexState::MarkupDecl => self.step_markup_decl(byte),
            LexState::DoctypeKeyword(idx) => self.step_keyword(
                byte,
                idx,
                DOCTYPE_KEYWORD,
                LexState::Doctype,
                "expected `<!DOCTYPE`",
            ),
            LexState::Doctype => self.step_doctype(byte),
            LexState::CDataKeyword(idx) => self.step_keyword(
                byte,
                idx,
                CDATA_KEYWORD,
                LexState::CData,
                "expected `<![CDATA[`",
            ),
            LexState::CData => self.step_cdata(byte),
            LexState::CDataEnding(seen) => self.step_cdata_ending(seen, byte),
            LexState::CommentOpen => self.step_comment_open(byte),
            LexState::Comment => self.step_comment(byte),
            LexState::CommentEnding(seen) => self.step_comment_ending(seen, byte),
            LexState::PiTarget => self.step_pi_target(byte),
            LexState::XmlDeclBody => self.step_xml_decl_body(byte),
            LexState::XmlDeclEnding => self.step_xml_decl_ending(byte),
            LexState::TagName => self.step_tag_name(byte),
            LexState::EndTagName => self.step_end_tag_name(byte),
            LexState::EndTagTail => self.step_end_tag_tail(byte),
            LexState::BeforeAttrName => self.step_before_attr_name(byte),
            LexState::AttrName => self.step_attr_name(byte),
            LexState::AfterAttrName => self.step_after_attr_name(byte),
            LexState::BeforeAttrValue => self.step_before_attr_value(byte),
            LexState::AttrValue => self.step_attr_value(byte),
            LexState::TagSlash => self.step_tag_slash(byte),
            LexState::Reference(in_attr) => self.step_reference(in_attr, byte),
        }
    }

    fn step_text(&mut self, byte: u8) -> XmlResult<Step> {
        if byte == 0xEF && self.pos == 0 {
            self.state = LexState::Bom(1);
            return Ok(Step::Consume);
        }
        if byte == b'<' {
            if self.text_utf8.is_mid_sequence() {
                self.text_utf8.finish(&mut self.text);
            }
            self.pending_cr = false;
            if !self.text.is_empty() {
                let event = RawEvent::Text(std::mem::take(&mut self.text));
                return Ok(Step::HoldEmit(event));
            }
            self.token_start = self.pos;
            self.state = LexState::TagOpen;
            return Ok(Step::Consume);
        }
        if byte == b'&' {
            if self.text_utf8.is_mid_sequence() {
                self.text_utf8.finish(&mut self.text);
            }
            self.pending_cr = false;
            self.reference.clear();
            self.state = LexState::Reference(false);
            return Ok(Step::Consume);
        }
        self.push_char_data(byte);
        Ok(Step::Consume)
    }

    /// Append one byte of character data, applying line-ending normalization.
    fn push_char_data(&mut self, byte: u8) {
        if !self.text_utf8.is_mid_sequence() {
            if byte == b'\r' {
                self.text.push('\n');
                self.pending_cr = true;
                return;
            }
            if byte == b'\n' && self.pending_cr {
                self.pending_cr = false;
                return;
            }
            self.pending_cr = false;
        }
        self.text_utf8.push(byte, &mut self.text);
    }

    fn step_bom(&mut self, seen: u8, byte: u8) -> XmlResult<Step> {
        let expected = [0xEF, 0xBB, 0xBF];
        if byte != expected[seen as usize] {
            return Err(self.malformed("invalid byte order mark"));
        }
        if seen == 2 {
            self.state = LexState::Text;
            self.document_start = self.pos + 1;
            self.token_start = self.pos + 1;
        } else {
            self.state = LexState::Bom(seen + 1);
        }
        Ok(Step::Consume)
    }

    fn step_tag_open(&mut self, byte: u8) -> XmlResult<Step> {
        match byte {
            b'/' => {
                self.begin_name();
                self.state = LexState::EndTagName;
                Ok(Step::Consume)
            }
            b'!' => {
                self.state = LexState::MarkupDecl;
                Ok(Step::Consume)
            }
            b'?' => {
                self.begin_name();
                self.state = LexState::PiTarget;
                Ok(Step::Consume)
            }
            _ => {
                self.begin_name();
                self.push_name_byte(byte)?;
                self.state = LexState::TagName;
                Ok(Step::Consume)
            }
        }
    }

    fn step_markup_decl(&mut self, byte: u8) -> XmlResult<Step> {
        match byte {
            b'-' => {
                self.state = LexState::CommentOpen;
                Ok(Step::Consume)
            }
            b'[' => {
                self.state = LexState::CDataKeyword(1);
                Ok(Step::Consume)
            }
            b'D' => {
                self.state = LexState::DoctypeKeyword(1);
                Ok(Step::Consume)
            }
            _ => Err(self.malformed("unrecognized markup declaration")),
        }
    }

    fn step_keyword(
        &mut self,
        byte: u8,
        idx: usize,
        keyword: &'static [u8],
        next: LexState,
        error: &'static str,
    ) -> XmlResult<Step> {
        if byte != keyword[idx] {
            return Err(self.malformed(error));
        }
        if idx + 1 == keyword.len() {
            self.text.clear();
            self.state = next;
        } else {
            self.state = match next {
                LexState::Doctype => LexState::DoctypeKeyword(idx + 1),
                _ => LexState::CDataKeyword(idx + 1),
            };
        }
        Ok(Step::Consume)
    }

    fn step_doctype(&mut self, byte: u8) -> XmlResult<Step> {
        match byte {
            b'[' => Err(XmlError::Unsupported(UnsupportedFeature::Dtd)),
            b'>' => {
                let body = std::mem::take(&mut self.text);
                self.state = LexState::Text;
                Ok(Step::ConsumeEmit(RawEvent::Doctype(
                    body.trim().to_string(),
                )))
            }
            _ => {
                self.push_char_data(byte);
                Ok(Step::Consume)
            }
        }
    }

    fn step_cdata(&mut self, byte: u8) -> XmlResult<Step> {
        match byte {
            b']' => {
                self.state = LexState::CDataEnding(1);
                Ok(Step::Consume)
            }
            _ => {
                self.push_char_data(byte);
                Ok(Step::Consume)
            }
        }
    }

    fn step_cdata_ending(&mut self, seen: u8, byte: u8) -> XmlResult<Step> {
        match (seen, byte) {
            (1, b']') => {
                self.state = LexState::CDataEnding(2);
                Ok(Step::Consume)
            }
            (2, b'>') => {
                let body = std::mem::take(&mut self.text);
                self.state = LexState::Text;
                Ok(Step::ConsumeEmit(RawEvent::CData(body)))
            }
            (2, b']') => {
                // `]]]>` ends with one literal `]` kept.
                self.text.push(']');
                Ok(Step::Consume)
            }
            (1, _) => {
                self.text.push(']');
                self.state = LexState::CData;
                self.step_cdata(byte)
            }
            (_, _) => {
                self.text.push_str("]]");
                self.state = LexState::CData;
                self.step_cdata(byte)
            }
        }
    }

    fn step_comment_open(&mut self, byte: u8) -> XmlResult<Step> {
        if byte != b'-' {
            return Err(self.malformed("expected `<!--`"));
        }
        self.text.clear();
        self.state = LexState::Comment;
        Ok(Step::Consume)
    }

    fn step_comment(&mut self, byte: u8) -> XmlResult<Step> {
        if byte == b'-' {
            self.state = LexState::CommentEnding(1);
            return Ok(Step::Consume);
        }
        self.push_char_data(byte);
        Ok(Step::Consume)
    }

    fn step_comment_ending(&mut self, seen: u8, byte: u8) -> XmlResult<Step> {
        match (seen, byte) {
            (1, b'-') => {
                self.state = LexState::CommentEnding(2);
                Ok(Step::Consume)
            }
            (2, b'>') => {
                let body = std::mem::take(&mut self.text);
                self.state = LexState::Text;
                Ok(Step::ConsumeEmit(RawEvent::Comment(body)))
            }
            (2, b'-') => {
                self.text.push('-');
                Ok(Step::Consume)
            }
            (1, _) => {
                self.text.push('-');
                self.state = LexState::Comment;
                self.step_comment(byte)
            }
            (_, _) => {
                self.text.push_str("--");
                self.state = LexState::Comment;
                self.step_comment(byte)
            }
        }
    }

    fn step_pi_target(&mut self, byte: u8) -> XmlResult<Step> {
        if byte.is_ascii_whitespace() || byte == b'?' {
            if self.name == "xml" && self.token_start == self.document_start {
                self.text.clear();
                self.state = if byte == b'?' {
                    LexState::XmlDeclEnding
                } else {
                    LexState::XmlDeclBody
                };
                return Ok(Step::Consume);
            }
            return Err(XmlError::Unsupported(
                UnsupportedFeature::ProcessingInstruction,
            ));
        }
        self.push_name_byte(byte)?;
        Ok(Step::Consume)
    }

    fn step_xml_decl_body(&mut self, byte: u8) -> XmlResult<Step> {
        if byte == b'?' {
            self.state = LexState::XmlDeclEnding;
            return Ok(Step::Consume);
        }
        self.push_char_data(byte);
        Ok(Step::Consume)
    }

    fn step_xml_decl_ending(&mut self, byte: u8) -> XmlResult<Step> {
        if byte == b'>' {
            let body = std::mem::take(&mut self.text);
            let event = self.parse_xml_decl(&body)?;
            self.state = LexState::Text;
            return Ok(Step::ConsumeEmit(event));
        }
        self.text.push('?');
        self.state = LexState::XmlDeclBody;
        self.step_xml_decl_body(byte)
    }

    /// Parse the pseudo-attributes of an XML declaration body.
    fn parse_xml_decl(&self, body: &str) -> XmlResult<RawEvent> {
        let mut version = None;
        let mut encoding = None;
        let mut standalone = None;
        let mut rest = body.trim();
        while !rest.is_empty() {
            let eq = rest.find('=').ok_or_else(|| {
                self.malformed("malformed XML declaration")
            })?;
            let key = rest[..eq].trim();
            let after = rest[eq + 1..].trim_start();
            let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'');
            let quote = quote.ok_or_else(|| self.malformed("unquoted XML declaration value"))?;
            let value_end = after[1..]
                .find(quote)
                .ok_or_else(|| self.malformed("unterminated XML declaration value"))?;
            let value = &after[1..1 + value_end];
            match key {
                "version" => version = Some(value.to_string()),
                "encoding" => encoding = Some(value.to_string()),
                "standalone" => standalone = Some(value == "yes"),
                _ => {
                    return Err(self.malformed(format!(
                        "unknown XML declaration attribute `{key}`"
                    )))
                }
            }
            rest = after[1 + value_end + 1..].trim_start();
        }
        let version = version.ok_or_else(|| self.malformed("XML declaration without version"))?;
        if !version.starts_with("1.") {
            return Err(self.malformed(format!("unsupported XML version `{version}`")));
        }
        if let Some(enc) = &encoding {
            if !enc.eq_ignore_ascii_case("utf-8") && !enc.eq_ignore_ascii_case("utf8") {
                return Err(XmlError::Unsupported(UnsupportedFeature::Encoding));
            }
        }
        Ok(RawEvent::XmlDecl {
            version,
            encoding,
            standalone,
        })
    }

    fn step_tag_name(&mut self, byte: u8) -> XmlResult<Step> {
        match byte {
            b'>' => {
                self.tag_qname = self.take_name()?;
                Ok(Step::ConsumeEmit(self.make_start_tag(false)))
            }
            b'/' => {
                self.tag_qname = self.take_name()?;
                self.state = LexState::TagSlash;
                Ok(Step::Consume)
            }
            _ if byte.is_ascii_whitespace() => {
                self.tag_qname = self.take_name()?;
                self.state = LexState::BeforeAttrName;
                Ok(Step::Consume)
            }
            _ => {
                self.push_name_byte(byte)?;
                Ok(Step::Consume)
            }
        }
    }

    fn step_end_tag_name(&mut self, byte: u8) -> XmlResult<Step> {
        match byte {
            b'>' => {
                let qname = self.take_name()?;
                self.state = LexState::Text;
                Ok(Step::ConsumeEmit(RawEvent::EndTag { qname }))
            }
            _ if byte.is_ascii_whitespace() => {
                self.tag_qname = self.take_name()?;
                self.state = LexState::EndTagTail;
                Ok(Step::Consume)
            }
            _ => {
                self.push_name_byte(byte)?;
                Ok(Step::Consume)
            }
        }
    }

    fn step_end_tag_tail(&mut self, byte: u8) -> XmlResult<Step> {
        if byte == b'>' {
            let qname = std::mem::take(&mut self.tag_qname);
            self.state = LexState::Text;
            return Ok(Step::ConsumeEmit(RawEvent::EndTag { qname }));
        }
        if byte.is_ascii_whitespace() {
            return Ok(Step::Consume);
        }
        Err(self.malformed("unexpected content in end tag"))
    }

    fn step_before_attr_name(&mut self, byte: u8) -> XmlResult<Step> {
        match byte {
            b'>' => Ok(Step::ConsumeEmit(self.make_start_tag(false))),
            b'/' => {
                self.state = LexState::TagSlash;
                Ok(Step::Consume)
            }
            _ if byte.is_ascii_whitespace() => Ok(Step::Consume),
            _ => {
                self.begin_name();
                self.push_name_byte(byte)?;
                self.state = LexState::AttrName;
                Ok(Step::Consume)
            }
        }
    }

    fn step_attr_name(&mut self, byte: u8) -> XmlResult<Step> {
        match byte {
            b'=' => {
                self.tag_attr_name()?;
                self.state = LexState::BeforeAttrValue;
                Ok(Step::Consume)
            }
            _ if byte.is_ascii_whitespace() => {
                self.tag_attr_name()?;
                self.state = LexState::AfterAttrName;
                Ok(Step::Consume)
            }
            b'>' | b'/' => Err(self.malformed("attribute without a value")),
            _ => {
                self.push_name_byte(byte)?;
                Ok(Step::Consume)
            }
        }
    }

    fn step_after_attr_name(&mut self, byte: u8) -> XmlResult<Step> {
        match byte {
            b'=' => {
                self.state = LexState::BeforeAttrValue;
                Ok(Step::Consume)
            }
            _ if byte.is_ascii_whitespace() => Ok(Step::Consume),
            _ => Err(self.malformed("attribute without a value")),
        }
    }

    fn step_before_attr_value(&mut self, byte: u8) -> XmlResult<Step> {
        match byte {
            b'"' | b'\'' => {
                self.quote = byte;
                self.value.clear();
                self.value_start = self.pos + 1;
                self.state = LexState::AttrValue;
                Ok(Step::Consume)
            }
            _ if byte.is_ascii_whitespace() => Ok(Step::Consume),
            _ => Err(self.malformed("unquoted attribute value")),
        }
    }

    fn step_attr_value(&mut self, byte: u8) -> XmlResult<Step> {
        if self.pending_cr {
            self.pending_cr = false;
            if byte == b'\n' {
                return Ok(Step::Consume);
            }
        }
        if byte == self.quote {
            if self.text_utf8.is_mid_sequence() {
                self.text_utf8.finish(&mut self.value);
            }
            let attr = RawAttribute {
                qname: std::mem::take(&mut self.name),
                value: std::mem::take(&mut self.value),
                span: ByteSpan {
                    start: self.value_start,
                    len: self.pos - self.value_start,
                },
            };
            self.attrs.push(attr);
            self.state = LexState::BeforeAttrName;
            return Ok(Step::Consume);
        }
        match byte {
            b'<' => Err(self.malformed("`<` in attribute value")),
            b'&' => {
                self.reference.clear();
                self.state = LexState::Reference(true);
                Ok(Step::Consume)
            }
            // Attribute-value normalization folds whitespace to spaces.
            b'\t' | b'\n' => {
                self.value.push(' ');
                Ok(Step::Consume)
            }
            b'\r' => {
                self.value.push(' ');
                self.pending_cr = true;
                Ok(Step::Consume)
            }
            _ => {
                self.text_utf8.push(byte, &mut self.value);
                Ok(Step::Consume)
            }
        }
    }

    fn step_tag_slash(&mut self, byte: u8) -> XmlResult<Step> {
        if byte == b'>' {
            return Ok(Step::ConsumeEmit(self.make_start_tag(true)));
        }
        Err(self.malformed("expected `>` after `/`"))
    }

    fn step_reference(&mut self, in_attr: bool, byte: u8) -> XmlResult<Step> {
        if byte == b';' {
            let decoded = self.decode_reference()?;
            if in_attr {
                self.value.push(decoded);
                self.state = LexState::AttrValue;
            } else {
                self.text.push(decoded);
                self.state = LexState::Text;
            }
            return Ok(Step::Consume);
        }
        if self.reference.len() >= MAX_REFERENCE_LENGTH || !byte.is_ascii_graphic() {
            return Err(self.malformed("malformed entity reference"));
        }
        self.reference.push(byte as char);
        Ok(Step::Consume)
    }

    fn decode_reference(&mut self) -> XmlResult<char> {
        let reference = std::mem::take(&mut self.reference);
        if let Some(body) = reference.strip_prefix('#') {
            return decode_numeric(body).map_err(|err| self.malformed(err.reason()));
        }
        if let Some(ch) = decode_predefined(&reference) {
            return Ok(ch);
        }
        // No DTD support means no way to define this; the document cannot be
        // streamed, but a coarser consumer may still want it.
        Err(XmlError::Unsupported(UnsupportedFeature::EntityReference))
    }

    fn make_start_tag(&mut self, self_closing: bool) -> RawEvent {
        self.state = LexState::Text;
        RawEvent::StartTag {
            qname: std::mem::take(&mut self.tag_qname),
            attributes: std::mem::take(&mut self.attrs),
            self_closing,
        }
    }

    fn begin_name(&mut self) {
        self.name.clear();
        self.name_utf8 = Utf8Accumulator::strict();
    }

    fn push_name_byte(&mut self, byte: u8) -> XmlResult<()> {
        if self.name.len() >= MAX_NAME_LENGTH {
            return Err(self.malformed("name too long"));
        }
        if byte.is_ascii() && !is_ascii_name_byte(byte) {
            return Err(self.malformed(format!(
                "invalid character `{}` in name",
                byte.escape_ascii()
            )));
        }
        if !self.name_utf8.push(byte, &mut self.name) {
            return Err(self.malformed("invalid UTF-8 in name"));
        }
        Ok(())
    }

    fn take_name(&mut self) -> XmlResult<String> {
        if self.name_utf8.is_mid_sequence() {
            return Err(self.malformed("invalid UTF-8 in name"));
        }
        if self.name.is_empty() {
            return Err(self.malformed("empty name"));
        }
        if self.name.starts_with(['-', '.']) || self.name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return Err(self.malformed(format!("invalid name `{}`", self.name)));
        }
        Ok(std::mem::take(&mut self.name))
    }

    fn tag_attr_name(&mut self) -> XmlResult<()> {
        // The finished attribute name stays in `self.name` until the value
        // closes; validate it now so errors point at the right offset.
        if self.name_utf8.is_mid_sequence() {
            return Err(self.malformed("invalid UTF-8 in name"));
        }
        if self.name.is_empty() {
            return Err(self.malformed("empty attribute name"));
        }
        Ok(())
    }
}

/// ASCII bytes permitted in names, a pragmatic subset of the XML `Name`
/// production. Non-ASCII is allowed wholesale once it decodes.
fn is_ascii_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b':' | b'_' | b'-' | b'.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(input: &[u8]) -> Vec<RawEvent> {
        let mut lexer = Lexer::new();
        let mut events = Vec::new();
        let mut offset = 0;
        while offset < input.len() {
            let (consumed, event) = lexer.advance(&input[offset..]).unwrap();
            offset += consumed;
            if let Some(lexed) = event {
                events.push(lexed.event);
            }
        }
        while let Some(lexed) = lexer.finish().unwrap() {
            events.push(lexed.event);
        }
        events
    }

    #[test]
    fn test_simple_element() {
        let events = lex_all(b"<a>hi</a>");
        assert_eq!(
            events,
            vec![
                RawEvent::StartTag {
                    qname: "a".into(),
                    attributes: vec![],
                    self_closing: false
                },
                RawEvent::Text("hi".into()),
                RawEvent::EndTag { qname: "a".into() },
            ]
        );
    }

    #[test]
    fn test_attributes_and_spans() {
        let events = lex_all(br#"<item id="42" wp:k='v'/>"#);
        match &events[0] {
            RawEvent::StartTag {
                qname,
                attributes,
                self_closing,
            } => {
                assert_eq!(qname, "item");
                assert!(self_closing);
                assert_eq!(attributes.len(), 2);
                assert_eq!(attributes[0].qname, "id");
                assert_eq!(attributes[0].value, "42");
                assert_eq!(attributes[0].span, ByteSpan { start: 10, len: 2 });
                assert_eq!(attributes[1].qname, "wp:k");
                assert_eq!(attributes[1].value, "v");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_entities_and_charrefs() {
        let events = lex_all(b"<a>&lt;x&gt; &amp; &#65;&#x42;</a>");
        assert_eq!(events[1], RawEvent::Text("<x> & AB".into()));
    }

    #[test]
    fn test_unknown_entity_is_unsupported() {
        let mut lexer = Lexer::new();
        let err = lexer.advance(b"<a>&nbsp;</a>").unwrap_err();
        assert!(matches!(
            err,
            XmlError::Unsupported(UnsupportedFeature::EntityReference)
        ));
    }

    #[test]
    fn test_cdata() {
        let events = lex_all(b"<a><![CDATA[<b>&amp;]]></a>");
        assert_eq!(events[1], RawEvent::CData("<b>&amp;".into()));
    }

    #[test]
    fn test_cdata_with_embedded_brackets() {
        let events = lex_all(b"<a><![CDATA[x]] ]]]></a>");
        assert_eq!(events[1], RawEvent::CData("x]] ]".into()));
    }

    #[test]
    fn test_comment() {
        let events = lex_all(b"<a><!-- a - b -- c --></a>");
        assert_eq!(events[1], RawEvent::Comment(" a - b -- c ".into()));
    }

    #[test]
    fn test_xml_decl() {
        let events = lex_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>");
        assert_eq!(
            events[0],
            RawEvent::XmlDecl {
                version: "1.0".into(),
                encoding: Some("UTF-8".into()),
                standalone: None,
            }
        );
    }

    #[test]
    fn test_pi_is_unsupported() {
        let mut lexer = Lexer::new();
        let err = lexer.advance(b"<?php echo ?>").unwrap_err();
        assert!(matches!(
            err,
            XmlError::Unsupported(UnsupportedFeature::ProcessingInstruction)
        ));
    }

    #[test]
    fn test_doctype_opaque_but_subset_unsupported() {
        let events = lex_all(b"<!DOCTYPE html><a/>");
        assert_eq!(events[0], RawEvent::Doctype("html".into()));

        let mut lexer = Lexer::new();
        let err = lexer.advance(b"<!DOCTYPE doc [<!ENTITY x 'y'>]>").unwrap_err();
        assert!(matches!(err, XmlError::Unsupported(UnsupportedFeature::Dtd)));
    }

    #[test]
    fn test_suspension_mid_token() {
        let mut lexer = Lexer::new();
        let (consumed, event) = lexer.advance(b"<item att").unwrap();
        assert_eq!(consumed, 9);
        assert!(event.is_none());
        let (_, event) = lexer.advance(b"r=\"v\">").unwrap();
        let lexed = event.unwrap();
        match lexed.event {
            RawEvent::StartTag { attributes, .. } => {
                assert_eq!(attributes[0].qname, "attr");
                assert_eq!(attributes[0].value, "v");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(lexed.span, ByteSpan { start: 0, len: 15 });
    }

    #[test]
    fn test_crlf_normalization() {
        let events = lex_all(b"<a>line1\r\nline2\rline3</a>");
        assert_eq!(events[1], RawEvent::Text("line1\nline2\nline3".into()));
    }

    #[test]
    fn test_invalid_utf8_in_text_replaced() {
        let events = lex_all(b"<a>ok\xffbad</a>");
        assert_eq!(events[1], RawEvent::Text("ok\u{FFFD}bad".into()));
    }

    #[test]
    fn test_invalid_utf8_in_name_fatal() {
        let mut lexer = Lexer::new();
        assert!(lexer.advance(b"<a\xff>").is_err());
    }

    #[test]
    fn test_bom_is_skipped() {
        let events = lex_all(b"\xEF\xBB\xBF<?xml version=\"1.0\"?><a/>");
        assert!(matches!(events[0], RawEvent::XmlDecl { .. }));
    }

    #[test]
    fn test_unexpected_eof_mid_tag() {
        let mut lexer = Lexer::new();
        let (_, event) = lexer.advance(b"<a href=\"x").unwrap();
        assert!(event.is_none());
        assert!(lexer.finish().is_err());
    }
}
