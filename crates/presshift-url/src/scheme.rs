//! Special schemes and their default ports.

/// The special schemes table from the URL standard.
const SPECIAL_SCHEMES: [(&str, Option<u16>); 6] = [
    ("ftp", Some(21)),
    ("file", None),
    ("http", Some(80)),
    ("https", Some(443)),
    ("ws", Some(80)),
    ("wss", Some(443)),
];

/// Whether a scheme is special.
pub fn is_special(scheme: &str) -> bool {
    SPECIAL_SCHEMES.iter().any(|(name, _)| *name == scheme)
}

/// Default port for a scheme, when it has one.
pub fn default_port(scheme: &str) -> Option<u16> {
    SPECIAL_SCHEMES
        .iter()
        .find(|(name, _)| *name == scheme)
        .and_then(|(_, port)| *port)
}

pub fn is_file(scheme: &str) -> bool {
    scheme == "file"
}

pub fn is_websocket(scheme: &str) -> bool {
    scheme == "ws" || scheme == "wss"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table() {
        assert!(is_special("http"));
        assert!(is_special("file"));
        assert!(!is_special("mailto"));
        assert_eq!(default_port("https"), Some(443));
        assert_eq!(default_port("ftp"), Some(21));
        assert_eq!(default_port("file"), None);
        assert_eq!(default_port("gopher"), None);
        assert!(is_file("file"));
        assert!(is_websocket("wss"));
        assert!(!is_websocket("http"));
    }
}
