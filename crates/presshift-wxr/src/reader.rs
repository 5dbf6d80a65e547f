//! The streaming entity reader.
//!
//! Drives the XML processor token by token, accumulating text into fields
//! according to the schema and emitting owned entities in source order. The
//! reader never buffers more than one entity's fields; inputs larger than
//! RAM stream through untouched.

use std::collections::{HashMap, VecDeque};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use presshift_stream::ByteStream;
use presshift_xml::{
    cursor, ProcessorOptions, TokenKind, XmlBookmark, XmlName, XmlProcessor, XmlStep, XmlToken,
};

use crate::entity::{Entity, EntityType};
use crate::schema::{WxrSchema, TERMS_FIELD};
use crate::{WxrError, WxrResult};

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+$").expect("version pattern compiles"));

/// Outcome of one reader step.
#[derive(Debug, Clone, PartialEq)]
pub enum WxrStep {
    Entity(Entity),
    /// The input ends mid-document; feed more bytes or mark the input
    /// finished and step again.
    NeedMoreInput,
    /// Clean end of stream; the version gate has passed.
    Finished,
}

/// Reader configuration.
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    pub processor: ProcessorOptions,
}

/// The opaque reentrancy cursor payload.
///
/// Serialized as base64 JSON; callers persist the string and hand it back to
/// [`WxrReader::from_cursor`] together with a seekable stream over the same
/// bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReentrancyCursor {
    xml: XmlBookmark,
    upstream: u64,
    last_post_id: Option<String>,
    last_comment_id: Option<String>,
}

struct OpenEntity {
    tag: XmlName,
    entity_type: EntityType,
    fields: serde_json::Map<String, Value>,
    depth: usize,
    /// Resume point at the entity's opening tag. Resume seeks the upstream
    /// source, so the stream buffer stays bounded however large the entity.
    start: XmlBookmark,
}

struct OpenField {
    tag: XmlName,
    canonical: &'static str,
}

/// Streaming WXR entity reader.
pub struct WxrReader {
    processor: XmlProcessor,
    schema: WxrSchema,
    entity: Option<OpenEntity>,
    field: Option<OpenField>,
    option: Option<OpenField>,
    text_buffer: String,
    last_opener_attributes: HashMap<String, String>,
    pending: VecDeque<Entity>,
    last_post_id: Option<String>,
    last_comment_id: Option<String>,
    wxr_version: Option<String>,
    /// Resumed readers cannot re-see the version element; the gate is
    /// skipped for them.
    version_gate: bool,
    finished: bool,
}

impl WxrReader {
    pub fn new(stream: ByteStream) -> Self {
        Self::with_options(stream, ReaderOptions::default(), WxrSchema::wordpress())
    }

    pub fn with_options(stream: ByteStream, options: ReaderOptions, schema: WxrSchema) -> Self {
        Self::build(XmlProcessor::with_options(stream, options.processor), schema, true)
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::new(ByteStream::from_memory(data))
    }

    /// An empty reader to be fed through [`WxrReader::append_bytes`].
    pub fn push() -> Self {
        Self::new(ByteStream::push_stream())
    }

    /// Restore a reader from a persisted cursor and a seekable stream over
    /// the same bytes.
    pub fn from_cursor(stream: ByteStream, cursor: &str) -> WxrResult<Self> {
        let payload: ReentrancyCursor =
            cursor::decode_cursor(cursor).map_err(|err| WxrError::InvalidCursor(err.to_string()))?;
        let processor = XmlProcessor::resume(stream, &payload.xml)?;
        let mut reader = Self::build(processor, WxrSchema::wordpress(), false);
        reader.last_post_id = payload.last_post_id;
        reader.last_comment_id = payload.last_comment_id;
        Ok(reader)
    }

    fn build(processor: XmlProcessor, schema: WxrSchema, version_gate: bool) -> Self {
        Self {
            processor,
            schema,
            entity: None,
            field: None,
            option: None,
            text_buffer: String::new(),
            last_opener_attributes: HashMap::new(),
            pending: VecDeque::new(),
            last_post_id: None,
            last_comment_id: None,
            wxr_version: None,
            version_gate,
            finished: false,
        }
    }

    /// Feed more bytes to a push-fed reader.
    pub fn append_bytes(&mut self, data: &[u8]) -> WxrResult<()> {
        self.processor.append_bytes(data)?;
        Ok(())
    }

    /// Mark the end of push-fed input.
    pub fn input_finished(&mut self) {
        self.processor.input_finished();
    }

    /// The version announced by the stream, once seen.
    pub fn wxr_version(&self) -> Option<&str> {
        self.wxr_version.as_deref()
    }

    /// Produce the next entity in source order.
    pub fn next_entity(&mut self) -> WxrResult<WxrStep> {
        loop {
            if let Some(entity) = self.pending.pop_front() {
                return Ok(WxrStep::Entity(entity));
            }
            if self.finished {
                return Ok(WxrStep::Finished);
            }
            let boundary = self.processor.bookmark();
            match self.processor.next_token()? {
                XmlStep::NeedMoreInput => return Ok(WxrStep::NeedMoreInput),
                XmlStep::EndOfDocument => {
                    self.finished = true;
                    if self.version_gate {
                        match &self.wxr_version {
                            Some(version) if VERSION_PATTERN.is_match(version) => {}
                            _ => return Err(WxrError::MissingVersion),
                        }
                    }
                }
                XmlStep::Token(token) => self.handle_token(token, boundary),
            }
        }
    }

    /// Persistable cursor for the current position. When an entity is mid
    /// accumulation, the cursor points at its opening tag so no fields are
    /// lost on resume.
    pub fn get_reentrancy_cursor(&self) -> WxrResult<String> {
        let xml = match &self.entity {
            Some(open) => open.start.clone(),
            None => self.processor.bookmark(),
        };
        let payload = ReentrancyCursor {
            upstream: xml.offset,
            xml,
            last_post_id: self.last_post_id.clone(),
            last_comment_id: self.last_comment_id.clone(),
        };
        cursor::encode_cursor(&payload).map_err(|err| WxrError::InvalidCursor(err.to_string()))
    }

    fn in_channel(&self) -> bool {
        let crumbs = self.processor.breadcrumbs();
        crumbs.len() >= 3 && crumbs[0].local == "rss" && crumbs[1].local == "channel"
    }

    fn handle_token(&mut self, token: XmlToken, boundary: XmlBookmark) {
        match token.kind {
            TokenKind::ElementOpen {
                name,
                attributes,
                self_closing,
            } => {
                self.last_opener_attributes = attributes
                    .into_iter()
                    .map(|attr| (attr.name.local, attr.value))
                    .collect();
                if !self.in_channel() {
                    return;
                }
                if let Some(definition) = self.schema.entity_for(&name) {
                    let entity_type = definition.entity_type;
                    if self.entity.is_some() {
                        // A nested or adjacent entity root ends the one in
                        // progress; any of its fields still to come are
                        // dropped.
                        debug!(offset = token.byte_start, next = %name, "entity interrupted by sibling root");
                        self.finish_entity();
                    }
                    self.entity = Some(OpenEntity {
                        tag: name,
                        entity_type,
                        fields: serde_json::Map::new(),
                        depth: token.depth,
                        start: boundary,
                    });
                    self.field = None;
                    self.text_buffer.clear();
                    if self_closing {
                        self.finish_entity();
                    }
                    return;
                }
                if let Some(open) = &self.entity {
                    let canonical = self
                        .schema
                        .entity_for(&open.tag)
                        .and_then(|definition| definition.fields.get(&name).copied());
                    if let Some(canonical) = canonical {
                        if self_closing {
                            self.close_field(&name, canonical);
                        } else {
                            self.text_buffer.clear();
                            self.field = Some(OpenField {
                                tag: name,
                                canonical,
                            });
                        }
                    }
                    return;
                }
                if self.processor.breadcrumbs().len() == 3 {
                    if let Some(canonical) = self.schema.site_option_for(&name) {
                        if self_closing {
                            self.emit_site_option(canonical, String::new());
                        } else {
                            self.text_buffer.clear();
                            self.option = Some(OpenField {
                                tag: name,
                                canonical,
                            });
                        }
                    }
                }
            }
            TokenKind::Text(text) | TokenKind::CData(text) => {
                if self.field.is_some() || self.option.is_some() {
                    self.text_buffer.push_str(&text);
                }
            }
            TokenKind::ElementClose { name } => {
                if let Some(field) = &self.field {
                    if field.tag == name {
                        let canonical = field.canonical;
                        self.field = None;
                        self.close_field(&name, canonical);
                        return;
                    }
                }
                if let Some(option) = &self.option {
                    if option.tag == name {
                        let canonical = option.canonical;
                        self.option = None;
                        let value = std::mem::take(&mut self.text_buffer);
                        self.emit_site_option(canonical, value);
                        return;
                    }
                }
                if let Some(open) = &self.entity {
                    // The entity's own closer, or a shallower one (the
                    // channel ending with an entity still open).
                    if (open.tag == name && open.depth == token.depth)
                        || token.depth < open.depth
                    {
                        self.finish_entity();
                    }
                }
            }
            TokenKind::Comment(_)
            | TokenKind::XmlDecl { .. }
            | TokenKind::Doctype(_) => {}
        }
    }

    /// Store the accumulated text under a field's canonical name, with the
    /// special `<category domain="..." nicename="...">` rule feeding the
    /// post's `terms` list.
    fn close_field(&mut self, tag: &XmlName, canonical: &'static str) {
        let value = std::mem::take(&mut self.text_buffer);
        let Some(open) = self.entity.as_mut() else {
            return;
        };
        if canonical == TERMS_FIELD {
            let taxonomy = self.last_opener_attributes.get("domain");
            let nicename = self.last_opener_attributes.get("nicename");
            match (taxonomy, nicename) {
                (Some(taxonomy), Some(nicename)) => {
                    let term = serde_json::json!({
                        "taxonomy": taxonomy,
                        "slug": nicename,
                        "description": value,
                    });
                    let terms = open
                        .fields
                        .entry(TERMS_FIELD)
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Some(terms) = terms.as_array_mut() {
                        terms.push(term);
                    }
                }
                _ => {
                    debug!(tag = %tag, "category without domain/nicename dropped");
                }
            }
            return;
        }
        open.fields.insert(canonical.to_string(), Value::String(value));
    }

    /// Emit the in-progress entity, applying the id stamping hooks.
    fn finish_entity(&mut self) {
        let Some(open) = self.entity.take() else {
            return;
        };
        self.field = None;
        let mut entity = Entity {
            entity_type: open.entity_type,
            fields: open.fields,
        };
        match entity.entity_type {
            EntityType::Post => {
                self.last_post_id = entity.field("post_id").map(str::to_string);
            }
            EntityType::Comment => {
                self.last_comment_id = entity.field("comment_id").map(str::to_string);
                entity
                    .fields
                    .insert("post_id".to_string(), optional_id(&self.last_post_id));
            }
            EntityType::PostMeta => {
                entity
                    .fields
                    .insert("post_id".to_string(), optional_id(&self.last_post_id));
            }
            EntityType::CommentMeta => {
                entity
                    .fields
                    .insert("comment_id".to_string(), optional_id(&self.last_comment_id));
                entity
                    .fields
                    .insert("post_id".to_string(), optional_id(&self.last_post_id));
            }
            EntityType::Tag => {
                entity.set_field("taxonomy", "post_tag");
            }
            EntityType::Category => {
                entity.set_field("taxonomy", "category");
            }
            _ => {}
        }
        self.pending.push_back(entity);
    }

    fn emit_site_option(&mut self, canonical: &'static str, value: String) {
        if canonical == "wxr_version" {
            self.wxr_version = Some(value.clone());
        }
        let mut entity = Entity::new(EntityType::SiteOption);
        entity.set_field("option_name", canonical);
        entity.set_field("option_value", value);
        self.pending.push_back(entity);
    }
}

fn optional_id(id: &Option<String>) -> Value {
    match id {
        Some(id) => Value::String(id.clone()),
        None => Value::Null,
    }
}
