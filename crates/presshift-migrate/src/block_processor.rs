//! The block-comment parser, layered over the tag processor by composition.
//!
//! Every HTML comment is offered to the block delimiter grammar:
//! `<!-- wp:name {json} -->`, `<!-- /wp:name -->`, or the self-closing
//! `<!-- wp:name {json} /-->`. Comments that almost parse (broken JSON)
//! stay plain comments with a warning; a closer that does not match the top
//! of the open-block stack is fatal for the traversal.

use serde_json::Value;
use tracing::warn;

use crate::block_attributes::{
    encode_block_attributes, flatten_paths, get_path, get_path_mut, path_to_string, PathStep,
};
use crate::tag_processor::{TagProcessor, TokenType};
use crate::{MigrateError, MigrateResult};

/// Token classes produced by the block processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTokenType {
    TagOpen,
    TagClose,
    Text,
    Comment,
    BlockOpener,
    BlockCloser,
}

#[derive(Debug)]
struct CurrentBlock {
    name: String,
    attributes: Value,
    closer: bool,
    self_closing: bool,
    payload_span: (usize, usize),
    dirty: bool,
    paths: Vec<Vec<PathStep>>,
    /// Attribute traversal position; `None` before the first call.
    cursor: Option<usize>,
}

/// Streaming processor over tags, text, comments, and block delimiters.
pub struct BlockProcessor {
    tags: TagProcessor,
    stack: Vec<String>,
    block: Option<CurrentBlock>,
    halted: bool,
}

enum Delimiter {
    Block {
        name: String,
        attributes: Value,
        closer: bool,
        self_closing: bool,
    },
    /// Looked like a block but did not parse; stays a plain comment.
    Suspicious,
    NotABlock,
}

impl BlockProcessor {
    pub fn new(markup: &str) -> Self {
        Self {
            tags: TagProcessor::new(markup),
            stack: Vec::new(),
            block: None,
            halted: false,
        }
    }

    /// Advance to the next token.
    pub fn next_token(&mut self) -> MigrateResult<Option<BlockTokenType>> {
        if self.halted {
            return Ok(None);
        }
        self.flush_dirty_block();
        self.block = None;

        let Some(kind) = self.tags.next_token() else {
            return Ok(None);
        };
        let kind = match kind {
            TokenType::TagOpen => BlockTokenType::TagOpen,
            TokenType::TagClose => BlockTokenType::TagClose,
            TokenType::Text => BlockTokenType::Text,
            TokenType::Comment => {
                let payload = self.tags.comment_text().unwrap_or_default().to_string();
                let span = self.tags.comment_span().unwrap_or((0, 0));
                match parse_delimiter(&payload) {
                    Delimiter::NotABlock => BlockTokenType::Comment,
                    Delimiter::Suspicious => {
                        warn!(offset = span.0, "suspicious block delimiter left as comment");
                        BlockTokenType::Comment
                    }
                    Delimiter::Block {
                        name,
                        attributes,
                        closer,
                        self_closing,
                    } => {
                        let kind = if closer {
                            match self.stack.last() {
                                Some(open) if *open == name => {
                                    self.stack.pop();
                                }
                                open => {
                                    self.halted = true;
                                    return Err(MigrateError::MismatchedCloser {
                                        expected: open.cloned(),
                                        found: name,
                                    });
                                }
                            }
                            BlockTokenType::BlockCloser
                        } else {
                            if !self_closing {
                                self.stack.push(name.clone());
                            }
                            BlockTokenType::BlockOpener
                        };
                        let paths = flatten_paths(&attributes);
                        self.block = Some(CurrentBlock {
                            name,
                            attributes,
                            closer,
                            self_closing,
                            payload_span: span,
                            dirty: false,
                            paths,
                            cursor: None,
                        });
                        kind
                    }
                }
            }
        };
        Ok(Some(kind))
    }

    pub fn is_block_opener(&self) -> bool {
        self.block.as_ref().is_some_and(|b| !b.closer)
    }

    pub fn is_block_closer(&self) -> bool {
        self.block.as_ref().is_some_and(|b| b.closer)
    }

    pub fn is_self_closing_block(&self) -> bool {
        self.block.as_ref().is_some_and(|b| b.self_closing)
    }

    pub fn get_block_name(&self) -> Option<&str> {
        self.block.as_ref().map(|b| b.name.as_str())
    }

    /// The attribute tree of the current block opener.
    pub fn get_block_attributes(&self) -> Option<&Value> {
        self.block
            .as_ref()
            .filter(|b| !b.closer)
            .map(|b| &b.attributes)
    }

    /// Number of currently open blocks.
    pub fn get_block_depth(&self) -> usize {
        self.stack.len()
    }

    /// Names of the open blocks, outermost first.
    pub fn open_blocks(&self) -> &[String] {
        &self.stack
    }

    /// Step the attribute traversal of the current block opener. Returns
    /// false when the tree is exhausted.
    pub fn next_block_attribute(&mut self) -> bool {
        let Some(block) = self.block.as_mut().filter(|b| !b.closer) else {
            return false;
        };
        let next = block.cursor.map_or(0, |at| at + 1);
        if next >= block.paths.len() {
            return false;
        }
        block.cursor = Some(next);
        true
    }

    /// The key (last path step) of the traversal's current attribute.
    pub fn get_block_attribute_key(&self) -> Option<String> {
        let (_, path) = self.current_path()?;
        path.last().map(PathStep::as_key)
    }

    /// The full dotted path of the traversal's current attribute.
    pub fn get_block_attribute_path(&self) -> Option<String> {
        let (_, path) = self.current_path()?;
        Some(path_to_string(path))
    }

    pub fn get_block_attribute_value(&self) -> Option<&Value> {
        let (block, path) = self.current_path()?;
        get_path(&block.attributes, path)
    }

    /// Overwrite the traversal's current attribute and mark the delimiter
    /// for re-serialization.
    pub fn set_block_attribute_value(&mut self, value: Value) -> MigrateResult<()> {
        let Some(block) = self.block.as_mut().filter(|b| !b.closer) else {
            return Err(MigrateError::NoBlockAttribute);
        };
        let Some(path) = block.cursor.and_then(|at| block.paths.get(at)) else {
            return Err(MigrateError::NoBlockAttribute);
        };
        let Some(slot) = get_path_mut(&mut block.attributes, path) else {
            return Err(MigrateError::NoBlockAttribute);
        };
        *slot = value;
        block.dirty = true;
        Ok(())
    }

    /// Set an attribute by path without traversing.
    pub fn set_block_attribute_at(&mut self, path: &[PathStep], value: Value) -> MigrateResult<()> {
        let Some(block) = self.block.as_mut().filter(|b| !b.closer) else {
            return Err(MigrateError::NoBlockAttribute);
        };
        let Some(slot) = get_path_mut(&mut block.attributes, path) else {
            return Err(MigrateError::NoBlockAttribute);
        };
        *slot = value;
        block.dirty = true;
        Ok(())
    }

    pub(crate) fn block_paths(&self) -> Option<&[Vec<PathStep>]> {
        self.block
            .as_ref()
            .filter(|b| !b.closer)
            .map(|b| b.paths.as_slice())
    }

    /// Apply all staged edits, including a still-dirty current block.
    pub fn get_updated_html(&mut self) -> MigrateResult<String> {
        self.flush_dirty_block();
        self.tags.get_updated_html()
    }

    /// Access to the underlying tag token (attributes, text spans, raw
    /// range edits).
    pub fn tags(&self) -> &TagProcessor {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut TagProcessor {
        &mut self.tags
    }

    fn current_path(&self) -> Option<(&CurrentBlock, &Vec<PathStep>)> {
        let block = self.block.as_ref().filter(|b| !b.closer)?;
        let path = block.cursor.and_then(|at| block.paths.get(at))?;
        Some((block, path))
    }

    /// Stage the re-encoded delimiter payload for an edited block.
    fn flush_dirty_block(&mut self) {
        let Some(block) = self.block.as_mut() else {
            return;
        };
        if !block.dirty {
            return;
        }
        block.dirty = false;
        let attrs = if block.attributes.as_object().is_some_and(|o| !o.is_empty()) {
            format!(" {}", encode_block_attributes(&block.attributes))
        } else {
            String::new()
        };
        let tail = if block.self_closing { " /" } else { " " };
        let payload = format!(" wp:{}{attrs}{tail}", block.name);
        let (start, end) = block.payload_span;
        self.tags.replace_range(start, end, payload);
    }
}

/// Parse an HTML comment payload as a block delimiter.
fn parse_delimiter(payload: &str) -> Delimiter {
    let trimmed = payload.trim();
    let (closer, rest) = match trimmed.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let Some(rest) = rest.strip_prefix("wp:") else {
        return Delimiter::NotABlock;
    };
    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/')))
        .unwrap_or(rest.len());
    let name = &rest[..name_len];
    if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
        return Delimiter::NotABlock;
    }
    let mut tail = rest[name_len..].trim();

    if closer {
        // Closers carry nothing after the name.
        if !tail.is_empty() {
            return Delimiter::Suspicious;
        }
        return Delimiter::Block {
            name: name.to_string(),
            attributes: Value::Null,
            closer: true,
            self_closing: false,
        };
    }

    let self_closing = tail.ends_with('/');
    if self_closing {
        tail = tail[..tail.len() - 1].trim_end();
    }
    if tail.is_empty() {
        return Delimiter::Block {
            name: name.to_string(),
            attributes: Value::Object(serde_json::Map::new()),
            closer: false,
            self_closing,
        };
    }
    if !tail.starts_with('{') {
        return Delimiter::NotABlock;
    }
    match serde_json::from_str::<Value>(tail) {
        Ok(attributes @ Value::Object(_)) => Delimiter::Block {
            name: name.to_string(),
            attributes,
            closer: false,
            self_closing,
        },
        Ok(_) | Err(_) => Delimiter::Suspicious,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_tokens_and_stack() {
        let markup = r#"<!-- wp:group --><div><!-- wp:image {"id":5} /--></div><!-- /wp:group -->"#;
        let mut blocks = BlockProcessor::new(markup);

        assert_eq!(
            blocks.next_token().unwrap(),
            Some(BlockTokenType::BlockOpener)
        );
        assert_eq!(blocks.get_block_name(), Some("group"));
        assert_eq!(blocks.get_block_depth(), 1);

        assert_eq!(blocks.next_token().unwrap(), Some(BlockTokenType::TagOpen));

        assert_eq!(
            blocks.next_token().unwrap(),
            Some(BlockTokenType::BlockOpener)
        );
        assert!(blocks.is_self_closing_block());
        assert_eq!(blocks.get_block_name(), Some("image"));
        assert_eq!(blocks.get_block_attributes(), Some(&json!({"id": 5})));
        // Self-closing blocks do not change the stack.
        assert_eq!(blocks.get_block_depth(), 1);

        assert_eq!(blocks.next_token().unwrap(), Some(BlockTokenType::TagClose));

        assert_eq!(
            blocks.next_token().unwrap(),
            Some(BlockTokenType::BlockCloser)
        );
        assert_eq!(blocks.get_block_depth(), 0);
        assert_eq!(blocks.next_token().unwrap(), None);
    }

    #[test]
    fn test_mismatched_closer_halts() {
        let markup = "<!-- wp:group --><!-- /wp:image -->";
        let mut blocks = BlockProcessor::new(markup);
        blocks.next_token().unwrap();
        let err = blocks.next_token().unwrap_err();
        assert!(matches!(
            err,
            MigrateError::MismatchedCloser { expected: Some(ref e), ref found }
                if e == "group" && found == "image"
        ));
        // The processor refuses to continue.
        assert_eq!(blocks.next_token().unwrap(), None);
    }

    #[test]
    fn test_malformed_json_downgrades_to_comment() {
        let markup = r#"<!-- wp:image {"src": broken} --><!-- plain comment -->"#;
        let mut blocks = BlockProcessor::new(markup);
        assert_eq!(blocks.next_token().unwrap(), Some(BlockTokenType::Comment));
        assert_eq!(blocks.next_token().unwrap(), Some(BlockTokenType::Comment));
        assert_eq!(blocks.get_block_depth(), 0);
    }

    #[test]
    fn test_namespaced_block_names() {
        let markup = "<!-- wp:myplugin/thing --><!-- /wp:myplugin/thing -->";
        let mut blocks = BlockProcessor::new(markup);
        blocks.next_token().unwrap();
        assert_eq!(blocks.get_block_name(), Some("myplugin/thing"));
        assert_eq!(
            blocks.next_token().unwrap(),
            Some(BlockTokenType::BlockCloser)
        );
    }

    #[test]
    fn test_attribute_traversal_and_edit() {
        let markup = r#"<!-- wp:image {"src":"http://old/a.jpg","width":100} -->x<!-- /wp:image -->"#;
        let mut blocks = BlockProcessor::new(markup);
        blocks.next_token().unwrap();

        let mut seen = Vec::new();
        while blocks.next_block_attribute() {
            seen.push(blocks.get_block_attribute_key().unwrap());
            if blocks.get_block_attribute_value() == Some(&json!("http://old/a.jpg")) {
                blocks
                    .set_block_attribute_value(json!("https://new/a.jpg"))
                    .unwrap();
            }
        }
        assert_eq!(seen, vec!["src", "width"]);

        let updated = blocks.get_updated_html().unwrap();
        assert_eq!(
            updated,
            r#"<!-- wp:image {"src":"https://new/a.jpg","width":100} -->x<!-- /wp:image -->"#
        );
    }

    #[test]
    fn test_single_edit_touches_one_block() {
        let markup = r#"<!-- wp:a {"v":1} --><!-- wp:b {"v":2} /--><!-- /wp:a -->"#;
        let mut blocks = BlockProcessor::new(markup);
        blocks.next_token().unwrap();
        blocks.next_token().unwrap();
        assert_eq!(blocks.get_block_name(), Some("b"));
        assert!(blocks.next_block_attribute());
        blocks.set_block_attribute_value(json!(3)).unwrap();
        let updated = blocks.get_updated_html().unwrap();
        assert_eq!(
            updated,
            r#"<!-- wp:a {"v":1} --><!-- wp:b {"v":3} /--><!-- /wp:a -->"#
        );
    }

    #[test]
    fn test_reserialize_without_edits_is_identity() {
        let markup =
            r#"<!-- wp:quote {"cite":"x"} --><p>q</p><!-- /wp:quote --><!-- wp:spacer /-->"#;
        let mut blocks = BlockProcessor::new(markup);
        while blocks.next_token().unwrap().is_some() {}
        assert_eq!(blocks.get_updated_html().unwrap(), markup);
    }
}
