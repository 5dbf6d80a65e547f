//! IDNA compatibility processing (UTS #46).
//!
//! ToASCII with the host parser's parameter profile: `CheckHyphens=false`,
//! `CheckBidi=true`, `CheckJoiners=true`, `UseSTD3=false`, non-transitional,
//! `VerifyDnsLength=false`. The mapping stage is condensed onto the std
//! Unicode tables (full lowercase mapping, explicit ignored/deviation/
//! width-mapping sets) rather than a generated UTS #46 row table; a
//! conformance-level harness is out of scope. Errors come back as a bitmask
//! and any set bit makes the host parser reject the domain.

use tracing::debug;

use crate::punycode;

/// A character whose UTS #46 status forbids it in a domain.
pub const ERR_DISALLOWED: u32 = 1 << 0;
/// An `xn--` label that does not decode, or a label that fails to encode.
pub const ERR_PUNYCODE: u32 = 1 << 1;
/// A ZWJ/ZWNJ outside its required joining context.
pub const ERR_CONTEXTJ: u32 = 1 << 2;
/// A label mixing directionality in a way the Bidi rule forbids.
pub const ERR_BIDI: u32 = 1 << 3;
/// A label with leading or trailing hyphens (only with `CheckHyphens`).
pub const ERR_HYPHEN: u32 = 1 << 4;

/// Processing options; the defaults are the URL standard's profile.
#[derive(Debug, Clone)]
pub struct IdnaOptions {
    pub check_hyphens: bool,
    pub check_bidi: bool,
    pub check_joiners: bool,
    pub use_std3_ascii_rules: bool,
    pub transitional: bool,
    pub verify_dns_length: bool,
}

impl Default for IdnaOptions {
    fn default() -> Self {
        Self {
            check_hyphens: false,
            check_bidi: true,
            check_joiners: true,
            use_std3_ascii_rules: false,
            transitional: false,
            verify_dns_length: false,
        }
    }
}

/// The outcome of ToASCII: the mapped domain plus the error bitmask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdnaResult {
    pub domain: String,
    pub errors: u32,
}

impl IdnaResult {
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

const ZWNJ: char = '\u{200C}';
const ZWJ: char = '\u{200D}';

/// UTS #46 ToASCII under the default (URL standard) profile.
pub fn to_ascii(input: &str) -> IdnaResult {
    to_ascii_with(input, &IdnaOptions::default())
}

pub fn to_ascii_with(input: &str, options: &IdnaOptions) -> IdnaResult {
    let mut errors = 0;
    let mapped = map(input, options, &mut errors);

    let mut labels = Vec::new();
    for label in mapped.split('.') {
        labels.push(process_label(label, options, &mut errors));
    }
    let domain = labels.join(".");
    if errors != 0 {
        debug!(domain = %input, errors = format_args!("{errors:#b}"), "idna processing reported errors");
    }
    IdnaResult { domain, errors }
}

/// The mapping stage: lowercase, fold dot equivalents and widths, drop
/// ignored characters, flag disallowed ones.
fn map(input: &str, options: &IdnaOptions, errors: &mut u32) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            // Dot equivalents.
            '\u{3002}' | '\u{FF0E}' | '\u{FF61}' => out.push('.'),
            // Ignored (mapped to nothing).
            '\u{00AD}' | '\u{034F}' | '\u{200B}' | '\u{2060}' | '\u{FEFF}'
            | '\u{180B}'..='\u{180D}'
            | '\u{FE00}'..='\u{FE0F}' => {}
            // Deviation characters: kept under non-transitional processing.
            'ß' | 'ς' => {
                if options.transitional {
                    match ch {
                        'ß' => out.push_str("ss"),
                        _ => out.push('σ'),
                    }
                } else {
                    out.push(ch);
                }
            }
            ZWNJ | ZWJ => {
                if !options.transitional {
                    out.push(ch);
                }
            }
            // Fullwidth forms fold to ASCII, then lowercase below.
            '\u{FF01}'..='\u{FF5E}' => {
                let folded = char::from_u32(ch as u32 - 0xFEE0).unwrap_or(ch);
                for lower in folded.to_lowercase() {
                    out.push(lower);
                }
            }
            _ if ch.is_control() || (ch.is_whitespace() && ch != ' ') => {
                *errors |= ERR_DISALLOWED;
                out.push(ch);
            }
            ' ' => {
                *errors |= ERR_DISALLOWED;
                out.push(ch);
            }
            _ => {
                for lower in ch.to_lowercase() {
                    out.push(lower);
                }
            }
        }
    }
    out
}

/// Per-label validation and ASCII conversion.
fn process_label(label: &str, options: &IdnaOptions, errors: &mut u32) -> String {
    if label.is_empty() {
        return String::new();
    }

    // Decode Punycode labels so validation sees the Unicode form.
    let (unicode, was_punycode) = match label.strip_prefix("xn--") {
        Some(encoded) => match punycode::decode(encoded) {
            Some(decoded) => (decoded, true),
            None => {
                *errors |= ERR_PUNYCODE;
                return label.to_string();
            }
        },
        None => (label.to_string(), false),
    };

    if options.check_hyphens
        && (unicode.starts_with('-')
            || unicode.ends_with('-')
            || unicode.get(2..4) == Some("--"))
    {
        *errors |= ERR_HYPHEN;
    }
    if options.check_joiners {
        check_joiners(&unicode, errors);
    }
    if options.check_bidi {
        check_bidi(&unicode, errors);
    }

    if unicode.is_ascii() {
        if was_punycode {
            // Punycode that decodes to pure ASCII is not a valid A-label.
            *errors |= ERR_PUNYCODE;
            return label.to_string();
        }
        return unicode;
    }
    match punycode::encode(&unicode) {
        Some(encoded) => format!("xn--{encoded}"),
        None => {
            *errors |= ERR_PUNYCODE;
            label.to_string()
        }
    }
}

/// ContextJ, condensed: a joiner must follow a non-ASCII letter or mark and
/// must not start or end a label or double up.
fn check_joiners(label: &str, errors: &mut u32) {
    let chars: Vec<char> = label.chars().collect();
    for (index, ch) in chars.iter().enumerate() {
        if *ch != ZWNJ && *ch != ZWJ {
            continue;
        }
        let previous = index.checked_sub(1).and_then(|i| chars.get(i));
        let next = chars.get(index + 1);
        let anchored = previous.is_some_and(|p| !p.is_ascii() && p.is_alphabetic());
        if !anchored || next.is_none() || matches!(next, Some(&ZWNJ) | Some(&ZWJ)) {
            *errors |= ERR_CONTEXTJ;
        }
    }
}

fn is_rtl(ch: char) -> bool {
    matches!(ch,
        '\u{0590}'..='\u{08FF}'
        | '\u{FB1D}'..='\u{FDFF}'
        | '\u{FE70}'..='\u{FEFF}'
        | '\u{10800}'..='\u{10FFF}'
        | '\u{1E800}'..='\u{1EFFF}'
    )
}

/// The Bidi rule, condensed: an RTL label cannot carry Latin letters, and
/// Arabic-Indic digits cannot mix with their extended forms.
fn check_bidi(label: &str, errors: &mut u32) {
    let has_rtl = label.chars().any(is_rtl);
    if !has_rtl {
        return;
    }
    if label.chars().any(|c| c.is_ascii_alphabetic()) {
        *errors |= ERR_BIDI;
    }
    let arabic_indic = label.chars().any(|c| ('\u{0660}'..='\u{0669}').contains(&c));
    let extended_arabic = label.chars().any(|c| ('\u{06F0}'..='\u{06F9}').contains(&c));
    if arabic_indic && extended_arabic {
        *errors |= ERR_BIDI;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ascii_passes_through() {
        let result = to_ascii("example.com");
        assert!(result.is_ok());
        assert_eq!(result.domain, "example.com");
    }

    #[test]
    fn test_case_folding() {
        let result = to_ascii("EXAMPLE.CoM");
        assert_eq!(result.domain, "example.com");
    }

    #[test]
    fn test_idn_label_encodes() {
        let result = to_ascii("łąka.pl");
        assert!(result.is_ok());
        assert_eq!(result.domain, "xn--ka-2ia6b.pl");

        let result = to_ascii("bücher.example");
        assert_eq!(result.domain, "xn--bcher-kva.example");
    }

    #[test]
    fn test_fullwidth_and_dot_variants_fold() {
        let result = to_ascii("ｅｘａｍｐｌｅ。com");
        assert!(result.is_ok());
        assert_eq!(result.domain, "example.com");
    }

    #[test]
    fn test_existing_punycode_is_validated() {
        let result = to_ascii("xn--ka-2ia6b.pl");
        assert!(result.is_ok());
        assert_eq!(result.domain, "xn--ka-2ia6b.pl");

        let result = to_ascii("xn--!!!.pl");
        assert_ne!(result.errors & ERR_PUNYCODE, 0);
    }

    #[test]
    fn test_deviation_kept_non_transitional() {
        let result = to_ascii("faß.example");
        assert!(result.is_ok());
        assert_eq!(result.domain, "xn--fa-hia.example");

        let transitional = to_ascii_with(
            "faß.example",
            &IdnaOptions {
                transitional: true,
                ..IdnaOptions::default()
            },
        );
        assert_eq!(transitional.domain, "fass.example");
    }

    #[test]
    fn test_control_characters_flagged() {
        let result = to_ascii("exa\u{0001}mple.com");
        assert_ne!(result.errors & ERR_DISALLOWED, 0);
    }

    #[test]
    fn test_stray_joiner_flagged() {
        let result = to_ascii("\u{200D}bad.example");
        assert_ne!(result.errors & ERR_CONTEXTJ, 0);
    }

    #[test]
    fn test_bidi_mixing_flagged() {
        let result = to_ascii("ab\u{05D0}.example");
        assert_ne!(result.errors & ERR_BIDI, 0);
    }

    #[test]
    fn test_soft_hyphen_ignored() {
        let result = to_ascii("exam\u{00AD}ple.com");
        assert!(result.is_ok());
        assert_eq!(result.domain, "example.com");
    }
}
