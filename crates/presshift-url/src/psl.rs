//! Embedded public-suffix table.
//!
//! A compact cut of the ICANN section of the public suffix list, covering
//! the suffixes that actually show up in migrated site content. It gates the
//! in-text URL sieve: a bare hostname only counts as a URL when its suffix
//! is listed here.

/// Sorted so membership checks can binary-search.
static PUBLIC_SUFFIXES: &[&str] = &[
    "ac.uk", "app", "ar", "at", "au", "be", "bg", "biz", "blog", "br", "ca", "cat", "cc",
    "ch", "cl", "cloud", "cn", "co", "co.at", "co.il", "co.in", "co.jp", "co.kr", "co.nz",
    "co.uk", "co.za", "com", "com.ar", "com.au", "com.br", "com.cn", "com.mx", "com.tr",
    "com.ua", "cz", "de", "dev", "dk", "edu", "ee", "es", "eu", "fi", "fm", "fr", "gal",
    "gov", "gov.uk", "gr", "hr", "hu", "ie", "il", "in", "info", "int", "io", "is", "it",
    "jp", "kr", "lt", "lu", "lv", "me", "mil", "mobi", "mx", "name", "net", "net.au",
    "net.br", "nl", "no", "nu", "nz", "online", "org", "org.au", "org.br", "org.uk", "ph",
    "pl", "pro", "pt", "ro", "rs", "ru", "se", "sg", "sh", "shop", "si", "site", "sk",
    "store", "tech", "tk", "tr", "tv", "ua", "uk", "us", "vn", "wiki", "xyz", "za",
];

/// Whether the exact string is a listed public suffix.
pub fn is_public_suffix(suffix: &str) -> bool {
    PUBLIC_SUFFIXES.binary_search(&suffix).is_ok()
}

/// Whether a hostname ends in a listed suffix with at least one more label
/// in front of it.
pub fn has_listed_suffix(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    let mut start = 0;
    while let Some(dot) = host[start..].find('.') {
        start += dot + 1;
        if is_public_suffix(&host[start..]) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted() {
        let mut sorted = PUBLIC_SUFFIXES.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, PUBLIC_SUFFIXES);
    }

    #[test]
    fn test_suffix_membership() {
        assert!(is_public_suffix("com"));
        assert!(is_public_suffix("co.uk"));
        assert!(!is_public_suffix("example.com"));
        assert!(!is_public_suffix("notatld"));
    }

    #[test]
    fn test_host_gating() {
        assert!(has_listed_suffix("myblog.com"));
        assert!(has_listed_suffix("w.org"));
        assert!(has_listed_suffix("news.bbc.co.uk"));
        assert!(has_listed_suffix("example.com."));
        // A suffix alone is not a registrable host.
        assert!(!has_listed_suffix("com"));
        assert!(!has_listed_suffix("localhost"));
        assert!(!has_listed_suffix("it"));
        assert!(!has_listed_suffix("server.internal"));
    }
}
