//! The combined URL rewriter.
//!
//! Walks block markup once and surfaces every URL it carries: URL-valued
//! tag attributes (fixed per-tag table), string leaves of block attribute
//! JSON, plain text (through the in-text sieve), and CSS `url()` references
//! in STYLE elements and `style` attributes. Each find can be rewritten in
//! place, preserving whether the original was written absolutely or
//! relatively.

use std::collections::VecDeque;

use serde_json::Value;

use presshift_url::{css, find_urls_in_text, replace_base_url, Url};

use crate::block_attributes::{path_to_string, PathStep};
use crate::block_processor::{BlockProcessor, BlockTokenType};
use crate::{MigrateError, MigrateResult};

/// URL-valued attributes per tag, lowercase. `IMG.srcset` is deliberately
/// absent (it is a comma list with descriptors, not a single URL).
static URL_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("a", &["href"]),
    ("applet", &["codebase", "archive"]),
    ("area", &["href"]),
    ("audio", &["src"]),
    ("base", &["href"]),
    ("blockquote", &["cite"]),
    ("body", &["background"]),
    ("button", &["formaction"]),
    ("command", &["icon"]),
    ("del", &["cite"]),
    ("embed", &["src"]),
    ("form", &["action"]),
    ("frame", &["longdesc", "src"]),
    ("head", &["profile"]),
    ("html", &["manifest"]),
    ("iframe", &["longdesc", "src"]),
    ("image", &["href"]),
    ("img", &["longdesc", "src", "usemap", "lowsrc", "highsrc"]),
    ("input", &["formaction", "src", "usemap"]),
    ("ins", &["cite"]),
    ("link", &["href"]),
    ("object", &["classid", "codebase", "data", "usemap"]),
    ("q", &["cite"]),
    ("script", &["src"]),
    ("source", &["src"]),
    ("track", &["src"]),
    ("video", &["poster", "src"]),
];

fn url_attributes_for(tag: &str) -> &'static [&'static str] {
    URL_ATTRIBUTES
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, attrs)| *attrs)
        .unwrap_or(&[])
}

/// Where in the markup a URL was found.
#[derive(Debug, Clone, PartialEq)]
pub enum UrlSite {
    TagAttribute { tag: String, attribute: String },
    BlockAttribute { block: String, path: String },
    Text,
    Css,
}

/// One URL surfaced by the rewriter.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundUrl {
    /// The text as written in the markup.
    pub raw: String,
    pub parsed: Url,
    pub site: UrlSite,
    /// Whether `raw` parses as an absolute URL on its own. Relative finds
    /// are written back in relative form.
    pub is_absolute: bool,
}

#[derive(Debug, Clone)]
enum Target {
    Attribute(String),
    Range(usize, usize),
    BlockAttr(Vec<PathStep>),
}

/// Streams URLs out of markup and stages rewrites.
pub struct UrlRewriter {
    blocks: BlockProcessor,
    base: Option<Url>,
    queue: VecDeque<(FoundUrl, Target)>,
    current: Option<(FoundUrl, Target)>,
    in_style_element: bool,
}

impl UrlRewriter {
    pub fn new(markup: &str, base: Option<Url>) -> Self {
        Self {
            blocks: BlockProcessor::new(markup),
            base,
            queue: VecDeque::new(),
            current: None,
            in_style_element: false,
        }
    }

    /// Advance to the next URL in the document.
    pub fn next_url(&mut self) -> MigrateResult<Option<FoundUrl>> {
        loop {
            if let Some((found, target)) = self.queue.pop_front() {
                let result = found.clone();
                self.current = Some((found, target));
                return Ok(Some(result));
            }
            self.current = None;
            match self.blocks.next_token()? {
                None => return Ok(None),
                Some(kind) => self.harvest(kind),
            }
        }
    }

    /// The find `next_url` is currently paused on.
    pub fn current_url(&self) -> Option<&FoundUrl> {
        self.current.as_ref().map(|(found, _)| found)
    }

    /// Overwrite the current find with new URL text.
    pub fn set_url(&mut self, new_text: &str) -> MigrateResult<()> {
        let Some((_, target)) = self.current.clone() else {
            return Err(MigrateError::NoCurrentUrl);
        };
        match target {
            Target::Attribute(name) => self.blocks.tags_mut().set_attribute(&name, new_text),
            Target::Range(start, end) => {
                self.blocks
                    .tags_mut()
                    .replace_range(start, end, new_text.to_string());
                Ok(())
            }
            Target::BlockAttr(path) => self
                .blocks
                .set_block_attribute_at(&path, Value::String(new_text.to_string())),
        }
    }

    /// Move the current find from `old_base` to `new_base`, preserving the
    /// original's absolute or relative style. Returns false when the URL is
    /// not under `old_base`.
    pub fn replace_base_url(&mut self, old_base: &Url, new_base: &Url) -> MigrateResult<bool> {
        let Some((found, _)) = self.current.as_ref() else {
            return Err(MigrateError::NoCurrentUrl);
        };
        let Some(rewritten) = replace_base_url(&found.parsed, old_base, new_base) else {
            return Ok(false);
        };
        let text = render_in_style_of(found, &rewritten);
        self.set_url(&text)?;
        Ok(true)
    }

    /// Apply every staged rewrite.
    pub fn get_updated_html(&mut self) -> MigrateResult<String> {
        self.blocks.get_updated_html()
    }

    pub fn block_depth(&self) -> usize {
        self.blocks.get_block_depth()
    }

    fn harvest(&mut self, kind: BlockTokenType) {
        match kind {
            BlockTokenType::TagOpen => {
                let Some(tag) = self.blocks.tags().tag_name() else {
                    return;
                };
                if tag == "style" {
                    self.in_style_element = true;
                }
                self.harvest_tag_attributes(&tag);
                self.harvest_style_attribute();
            }
            BlockTokenType::TagClose => {
                if self.blocks.tags().tag_name().as_deref() == Some("style") {
                    self.in_style_element = false;
                }
            }
            BlockTokenType::Text => {
                if self.in_style_element {
                    self.harvest_css_text();
                } else {
                    self.harvest_text();
                }
            }
            BlockTokenType::BlockOpener => self.harvest_block_attributes(),
            BlockTokenType::BlockCloser | BlockTokenType::Comment => {}
        }
    }

    fn harvest_tag_attributes(&mut self, tag: &str) {
        for &attribute in url_attributes_for(tag) {
            let Some(raw) = self.blocks.tags().get_attribute(attribute) else {
                continue;
            };
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(parsed) = Url::parse_with_base(trimmed, self.base.as_ref()) else {
                continue;
            };
            let is_absolute = Url::parse(trimmed).is_ok();
            self.queue.push_back((
                FoundUrl {
                    raw: trimmed.to_string(),
                    parsed,
                    site: UrlSite::TagAttribute {
                        tag: tag.to_string(),
                        attribute: attribute.to_string(),
                    },
                    is_absolute,
                },
                Target::Attribute(attribute.to_string()),
            ));
        }
    }

    /// CSS references inside an inline `style` attribute. Works over the
    /// raw value so byte ranges splice exactly.
    fn harvest_style_attribute(&mut self) {
        let Some((raw, (value_start, _))) = self.blocks.tags().raw_attribute("style") else {
            return;
        };
        let raw = raw.to_string();
        self.harvest_css(&raw, value_start);
    }

    fn harvest_css_text(&mut self) {
        let Some((start, _)) = self.blocks.tags().text_span() else {
            return;
        };
        let Some(text) = self.blocks.tags().text() else {
            return;
        };
        let text = text.to_string();
        self.harvest_css(&text, start);
    }

    fn harvest_css(&mut self, css_text: &str, offset: usize) {
        for reference in css::find_css_urls(css_text) {
            let Ok(parsed) = Url::parse_with_base(&reference.raw, self.base.as_ref()) else {
                continue;
            };
            let is_absolute = Url::parse(&reference.raw).is_ok();
            self.queue.push_back((
                FoundUrl {
                    raw: reference.raw.clone(),
                    parsed,
                    site: UrlSite::Css,
                    is_absolute,
                },
                Target::Range(offset + reference.start, offset + reference.end),
            ));
        }
    }

    fn harvest_text(&mut self) {
        let Some((start, _)) = self.blocks.tags().text_span() else {
            return;
        };
        let Some(text) = self.blocks.tags().text() else {
            return;
        };
        let text = text.to_string();
        for found in find_urls_in_text(&text, self.base.as_ref()) {
            self.queue.push_back((
                FoundUrl {
                    raw: found.raw.clone(),
                    parsed: found.parsed,
                    site: UrlSite::Text,
                    is_absolute: found.had_scheme,
                },
                Target::Range(start + found.start, start + found.end),
            ));
        }
    }

    /// String leaves of the block attribute tree, parsed without a base so
    /// ordinary words never count as URLs.
    fn harvest_block_attributes(&mut self) {
        let Some(block) = self.blocks.get_block_name().map(str::to_string) else {
            return;
        };
        let Some(attributes) = self.blocks.get_block_attributes().cloned() else {
            return;
        };
        let Some(paths) = self.blocks.block_paths() else {
            return;
        };
        for path in paths.to_vec() {
            let Some(Value::String(raw)) = crate::block_attributes::get_path(&attributes, &path)
            else {
                continue;
            };
            let Ok(parsed) = Url::parse(raw) else {
                continue;
            };
            if !parsed.is_special() {
                continue;
            }
            self.queue.push_back((
                FoundUrl {
                    raw: raw.clone(),
                    parsed,
                    site: UrlSite::BlockAttribute {
                        block: block.clone(),
                        path: path_to_string(&path),
                    },
                    is_absolute: true,
                },
                Target::BlockAttr(path),
            ));
        }
    }
}

/// Serialize a rewritten URL to match how the original was written.
fn render_in_style_of(found: &FoundUrl, rewritten: &Url) -> String {
    if found.is_absolute {
        return rewritten.to_string();
    }
    // A bare host in text ("myblog.com") stays scheme-less.
    if found.site == UrlSite::Text && !found.raw.starts_with('/') {
        let full = rewritten.to_string();
        let mut bare = full
            .strip_prefix(&format!("{}://", rewritten.scheme()))
            .map(str::to_string)
            .unwrap_or(full);
        if !found.raw.ends_with('/') && rewritten.path_string() == "/" && bare.ends_with('/') {
            bare.pop();
        }
        return bare;
    }
    rewritten.serialize_relative()
}

/// An ordered old→new base mapping; the longest matching old base wins.
#[derive(Debug, Clone, Default)]
pub struct UrlMapping {
    pairs: Vec<(Url, Url)>,
}

impl UrlMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, old_base: Url, new_base: Url) {
        self.pairs.push((old_base, new_base));
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Url, Url)>) -> Self {
        Self {
            pairs: pairs.into_iter().collect(),
        }
    }

    /// The mapping whose old base covers `url` with the most specific
    /// (longest) path.
    pub fn best_match(&self, url: &Url) -> Option<(&Url, &Url)> {
        self.pairs
            .iter()
            .filter(|(old, _)| presshift_url::is_child_url_of(url, old))
            .max_by_key(|(old, _)| old.path_string().trim_end_matches('/').len())
            .map(|(old, new)| (old, new))
    }
}

/// One-shot convenience: rewrite every mapped URL in a markup string.
pub fn rewrite_markup(
    markup: &str,
    mapping: &UrlMapping,
    base: Option<&Url>,
) -> MigrateResult<String> {
    let mut rewriter = UrlRewriter::new(markup, base.cloned());
    while let Some(found) = rewriter.next_url()? {
        let Some((old_base, new_base)) = mapping.best_match(&found.parsed) else {
            continue;
        };
        let (old_base, new_base) = (old_base.clone(), new_base.clone());
        rewriter.replace_base_url(&old_base, &new_base)?;
    }
    rewriter.get_updated_html()
}
