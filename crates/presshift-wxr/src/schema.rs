//! The WXR schema: which elements become entities and fields.
//!
//! WordPress exporters in the wild disagree on the exact `wp:` namespace
//! (plain or https, versions 1.0 through 1.2), so every variant is
//! registered. Legacy field spellings are accepted on input and mapped to
//! one canonical set; the legacy names never appear in emitted entities.

use std::collections::HashMap;

use presshift_xml::XmlName;

use crate::entity::EntityType;

/// Every namespace the `wp:` prefix is seen bound to.
pub const WP_NAMESPACES: [&str; 6] = [
    "http://wordpress.org/export/1.0/",
    "http://wordpress.org/export/1.1/",
    "http://wordpress.org/export/1.2/",
    "https://wordpress.org/export/1.0/",
    "https://wordpress.org/export/1.1/",
    "https://wordpress.org/export/1.2/",
];

/// Dublin Core, carrying the post author.
pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

/// The RSS content module, carrying the post body.
pub const CONTENT_NAMESPACE: &str = "http://purl.org/rss/1.0/modules/content/";

/// The export excerpt module namespaces.
pub const EXCERPT_NAMESPACES: [&str; 6] = [
    "http://wordpress.org/export/1.0/excerpt/",
    "http://wordpress.org/export/1.1/excerpt/",
    "http://wordpress.org/export/1.2/excerpt/",
    "https://wordpress.org/export/1.0/excerpt/",
    "https://wordpress.org/export/1.1/excerpt/",
    "https://wordpress.org/export/1.2/excerpt/",
];

/// Sentinel canonical name for the in-post `<category>` element, which feeds
/// the `terms` list instead of a scalar field.
pub const TERMS_FIELD: &str = "terms";

/// How one entity root maps to an entity type and its field tags.
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    pub entity_type: EntityType,
    /// Field element name to the canonical field it fills.
    pub fields: HashMap<XmlName, &'static str>,
}

/// The full mapping configuration driving the reader.
#[derive(Debug, Clone)]
pub struct WxrSchema {
    /// Channel children emitted as `site_option` entities, by element name.
    /// Applied only at the exact breadcrumb path `rss/channel/*`.
    pub known_site_options: HashMap<XmlName, &'static str>,

    /// Entity root elements anywhere under `rss/channel`.
    pub known_entities: HashMap<XmlName, EntityDefinition>,
}

impl Default for WxrSchema {
    fn default() -> Self {
        Self::wordpress()
    }
}

impl WxrSchema {
    /// The standard WordPress export schema.
    pub fn wordpress() -> Self {
        let mut site_options = HashMap::new();
        site_options.insert(XmlName::local("title"), "blogname");
        site_options.insert(XmlName::local("description"), "blogdescription");
        for ns in WP_NAMESPACES {
            site_options.insert(XmlName::new(ns, "base_blog_url"), "home");
            site_options.insert(XmlName::new(ns, "base_site_url"), "siteurl");
            site_options.insert(XmlName::new(ns, "wxr_version"), "wxr_version");
        }

        let mut entities = HashMap::new();
        entities.insert(XmlName::local("item"), post_definition());
        for ns in WP_NAMESPACES {
            entities.insert(XmlName::new(ns, "comment"), comment_definition());
            entities.insert(
                XmlName::new(ns, "postmeta"),
                meta_definition(EntityType::PostMeta),
            );
            entities.insert(
                XmlName::new(ns, "commentmeta"),
                meta_definition(EntityType::CommentMeta),
            );
            entities.insert(XmlName::new(ns, "author"), user_definition());
            entities.insert(XmlName::new(ns, "category"), category_definition());
            entities.insert(XmlName::new(ns, "tag"), tag_definition());
            entities.insert(XmlName::new(ns, "term"), term_definition());
        }

        Self {
            known_site_options: site_options,
            known_entities: entities,
        }
    }

    pub fn entity_for(&self, name: &XmlName) -> Option<&EntityDefinition> {
        self.known_entities.get(name)
    }

    pub fn site_option_for(&self, name: &XmlName) -> Option<&'static str> {
        self.known_site_options.get(name).copied()
    }
}

/// Insert one field under every `wp:` namespace variant.
fn wp_field(fields: &mut HashMap<XmlName, &'static str>, tag: &str, canonical: &'static str) {
    for ns in WP_NAMESPACES {
        fields.insert(XmlName::new(ns, tag), canonical);
    }
}

fn post_definition() -> EntityDefinition {
    let mut fields = HashMap::new();
    fields.insert(XmlName::local("title"), "post_title");
    fields.insert(XmlName::local("link"), "link");
    fields.insert(XmlName::local("guid"), "guid");
    fields.insert(XmlName::local("pubDate"), "post_published_at");
    fields.insert(XmlName::local("category"), TERMS_FIELD);
    fields.insert(XmlName::new(DC_NAMESPACE, "creator"), "post_author");
    fields.insert(XmlName::new(CONTENT_NAMESPACE, "encoded"), "post_content");
    for ns in EXCERPT_NAMESPACES {
        fields.insert(XmlName::new(ns, "encoded"), "post_excerpt");
    }
    wp_field(&mut fields, "post_id", "post_id");
    wp_field(&mut fields, "post_date", "post_date");
    wp_field(&mut fields, "post_date_gmt", "post_date_gmt");
    wp_field(&mut fields, "post_modified", "post_modified");
    wp_field(&mut fields, "post_modified_gmt", "post_modified_gmt");
    wp_field(&mut fields, "comment_status", "comment_status");
    wp_field(&mut fields, "ping_status", "ping_status");
    wp_field(&mut fields, "post_name", "post_name");
    wp_field(&mut fields, "status", "post_status");
    wp_field(&mut fields, "post_parent", "post_parent");
    wp_field(&mut fields, "menu_order", "menu_order");
    wp_field(&mut fields, "post_type", "post_type");
    wp_field(&mut fields, "post_password", "post_password");
    wp_field(&mut fields, "is_sticky", "is_sticky");
    wp_field(&mut fields, "attachment_url", "attachment_url");
    EntityDefinition {
        entity_type: EntityType::Post,
        fields,
    }
}

fn comment_definition() -> EntityDefinition {
    let mut fields = HashMap::new();
    wp_field(&mut fields, "comment_id", "comment_id");
    wp_field(&mut fields, "comment_author", "comment_author");
    wp_field(&mut fields, "comment_author_email", "comment_author_email");
    wp_field(&mut fields, "comment_author_url", "comment_author_url");
    wp_field(&mut fields, "comment_author_IP", "comment_author_IP");
    wp_field(&mut fields, "comment_date", "comment_date");
    wp_field(&mut fields, "comment_date_gmt", "comment_date_gmt");
    wp_field(&mut fields, "comment_content", "comment_content");
    wp_field(&mut fields, "comment_approved", "comment_approved");
    wp_field(&mut fields, "comment_type", "comment_type");
    wp_field(&mut fields, "comment_parent", "comment_parent");
    wp_field(&mut fields, "comment_user_id", "comment_user_id");
    EntityDefinition {
        entity_type: EntityType::Comment,
        fields,
    }
}

fn meta_definition(entity_type: EntityType) -> EntityDefinition {
    let mut fields = HashMap::new();
    wp_field(&mut fields, "meta_key", "meta_key");
    wp_field(&mut fields, "meta_value", "meta_value");
    // Pre-1.1 exports used bare key/value tags.
    wp_field(&mut fields, "key", "meta_key");
    wp_field(&mut fields, "value", "meta_value");
    EntityDefinition {
        entity_type,
        fields,
    }
}

fn user_definition() -> EntityDefinition {
    let mut fields = HashMap::new();
    wp_field(&mut fields, "author_id", "ID");
    wp_field(&mut fields, "author_login", "user_login");
    wp_field(&mut fields, "author_email", "user_email");
    wp_field(&mut fields, "author_display_name", "display_name");
    wp_field(&mut fields, "author_first_name", "first_name");
    wp_field(&mut fields, "author_last_name", "last_name");
    EntityDefinition {
        entity_type: EntityType::User,
        fields,
    }
}

fn category_definition() -> EntityDefinition {
    let mut fields = HashMap::new();
    wp_field(&mut fields, "term_id", "term_id");
    wp_field(&mut fields, "category_nicename", "slug");
    wp_field(&mut fields, "category_parent", "parent");
    wp_field(&mut fields, "cat_name", "name");
    wp_field(&mut fields, "category_description", "description");
    EntityDefinition {
        entity_type: EntityType::Category,
        fields,
    }
}

fn tag_definition() -> EntityDefinition {
    let mut fields = HashMap::new();
    wp_field(&mut fields, "term_id", "term_id");
    wp_field(&mut fields, "tag_slug", "slug");
    wp_field(&mut fields, "tag_name", "name");
    wp_field(&mut fields, "tag_description", "description");
    EntityDefinition {
        entity_type: EntityType::Tag,
        fields,
    }
}

fn term_definition() -> EntityDefinition {
    let mut fields = HashMap::new();
    wp_field(&mut fields, "term_id", "term_id");
    wp_field(&mut fields, "term_taxonomy", "taxonomy");
    wp_field(&mut fields, "term_slug", "slug");
    wp_field(&mut fields, "term_parent", "parent");
    wp_field(&mut fields, "term_name", "name");
    wp_field(&mut fields, "term_description", "description");
    EntityDefinition {
        entity_type: EntityType::Term,
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_wp_namespace_variants_recognized() {
        let schema = WxrSchema::wordpress();
        for ns in WP_NAMESPACES {
            let def = schema
                .entity_for(&XmlName::new(ns, "comment"))
                .expect("comment registered");
            assert_eq!(def.entity_type, EntityType::Comment);
        }
    }

    #[test]
    fn test_legacy_names_map_to_canonical() {
        let schema = WxrSchema::wordpress();
        let cat = schema
            .entity_for(&XmlName::new(WP_NAMESPACES[2], "category"))
            .unwrap();
        assert_eq!(
            cat.fields
                .get(&XmlName::new(WP_NAMESPACES[2], "category_nicename")),
            Some(&"slug")
        );
        let meta = schema
            .entity_for(&XmlName::new(WP_NAMESPACES[0], "postmeta"))
            .unwrap();
        assert_eq!(
            meta.fields.get(&XmlName::new(WP_NAMESPACES[0], "key")),
            Some(&"meta_key")
        );
    }

    #[test]
    fn test_site_options() {
        let schema = WxrSchema::wordpress();
        assert_eq!(
            schema.site_option_for(&XmlName::local("title")),
            Some("blogname")
        );
        assert_eq!(
            schema.site_option_for(&XmlName::new(WP_NAMESPACES[2], "wxr_version")),
            Some("wxr_version")
        );
        assert_eq!(schema.site_option_for(&XmlName::local("generator")), None);
    }
}
