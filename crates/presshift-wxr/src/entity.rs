//! Typed entities emitted by the reader.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The kind of record an entity carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Post,
    PostMeta,
    Comment,
    CommentMeta,
    Term,
    Tag,
    Category,
    User,
    SiteOption,
    /// Reserved for schemas that surface the version element as its own
    /// entity. The default schema emits it as a `site_option` instead.
    WxrVersion,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::PostMeta => "post_meta",
            Self::Comment => "comment",
            Self::CommentMeta => "comment_meta",
            Self::Term => "term",
            Self::Tag => "tag",
            Self::Category => "category",
            Self::User => "user",
            Self::SiteOption => "site_option",
            Self::WxrVersion => "wxr_version",
        }
    }
}

/// A typed record with a bag of canonical fields.
///
/// Field values are strings except for nested records (a post's `terms`
/// list). Entities own their data: they stay valid however far the stream
/// advances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub fields: Map<String, Value>,
}

impl Entity {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            fields: Map::new(),
        }
    }

    /// A string field by canonical name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), Value::String(value.into()));
    }

    /// The accumulated `terms` list of a post.
    pub fn terms(&self) -> Option<&Vec<Value>> {
        self.fields.get("terms").and_then(Value::as_array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_access() {
        let mut entity = Entity::new(EntityType::Post);
        entity.set_field("post_title", "Hello");
        assert_eq!(entity.field("post_title"), Some("Hello"));
        assert_eq!(entity.field("missing"), None);
        assert_eq!(entity.entity_type.as_str(), "post");
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let mut entity = Entity::new(EntityType::SiteOption);
        entity.set_field("option_name", "blogname");
        let json = serde_json::to_string(&entity).unwrap();
        assert!(json.contains(r#""type":"site_option""#));
    }
}
