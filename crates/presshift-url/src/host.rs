//! Host parsing and serialization.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::idna;
use crate::percent::{self, C0_CONTROL};
use crate::{UrlError, UrlResult};

/// A parsed URL host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Host {
    /// No host at all (opaque-path URLs like `mailto:`).
    Null,
    /// The percent-encoded host of a non-special URL.
    Opaque(String),
    /// An ASCII domain, IDNA-mapped.
    Domain(String),
    Ipv4(u32),
    Ipv6([u16; 8]),
}

impl Host {
    /// The host parser. `is_special` selects domain parsing over opaque
    /// parsing.
    pub fn parse(input: &str, is_special: bool) -> UrlResult<Host> {
        if let Some(rest) = input.strip_prefix('[') {
            let inner = rest
                .strip_suffix(']')
                .ok_or(UrlError::Invalid("IPv6-unclosed"))?;
            return parse_ipv6(inner).map(Host::Ipv6);
        }
        if !is_special {
            return parse_opaque(input);
        }
        if input.is_empty() {
            return Err(UrlError::Invalid("host-missing"));
        }

        let decoded = percent::percent_decode_lossy(input);
        let result = idna::to_ascii(&decoded);
        if !result.is_ok() {
            return Err(UrlError::Invalid("domain-to-ASCII"));
        }
        let ascii = result.domain;
        if ascii.is_empty() {
            return Err(UrlError::Invalid("domain-to-ASCII"));
        }
        if ascii.chars().any(is_forbidden_domain_code_point) {
            return Err(UrlError::Invalid("domain-invalid-code-point"));
        }
        if ends_in_a_number(&ascii) {
            return parse_ipv4(&ascii).map(Host::Ipv4);
        }
        Ok(Host::Domain(ascii))
    }

    /// The empty host of `file:` URLs without an authority.
    pub fn empty() -> Host {
        Host::Domain(String::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Host::Null)
    }

    pub fn is_empty_host(&self) -> bool {
        matches!(self, Host::Domain(domain) if domain.is_empty())
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Null => Ok(()),
            Host::Opaque(host) | Host::Domain(host) => f.write_str(host),
            Host::Ipv4(address) => write!(
                f,
                "{}.{}.{}.{}",
                (address >> 24) & 0xFF,
                (address >> 16) & 0xFF,
                (address >> 8) & 0xFF,
                address & 0xFF
            ),
            Host::Ipv6(pieces) => {
                f.write_str("[")?;
                let compress = longest_zero_run(pieces);
                let mut index = 0;
                while index < 8 {
                    if let Some((start, len)) = compress {
                        if index == start {
                            f.write_str(if start == 0 { "::" } else { ":" })?;
                            index += len;
                            continue;
                        }
                    }
                    write!(f, "{:x}", pieces[index])?;
                    if index != 7 {
                        f.write_str(":")?;
                    }
                    index += 1;
                }
                f.write_str("]")
            }
        }
    }
}

/// Code points forbidden anywhere in an opaque host.
fn is_forbidden_host_code_point(ch: char) -> bool {
    matches!(
        ch,
        '\0' | '\t' | '\n' | '\r' | ' ' | '#' | '/' | ':' | '<' | '>' | '?' | '@' | '['
            | '\\' | ']' | '^' | '|'
    )
}

/// Code points forbidden in a parsed domain (the host set plus controls,
/// `%`, and DEL).
fn is_forbidden_domain_code_point(ch: char) -> bool {
    is_forbidden_host_code_point(ch) || ch.is_ascii_control() || ch == '%' || ch == '\u{7F}'
}

fn parse_opaque(input: &str) -> UrlResult<Host> {
    if input.chars().any(|ch| ch != '%' && is_forbidden_host_code_point(ch)) {
        return Err(UrlError::Invalid("host-invalid-code-point"));
    }
    Ok(Host::Opaque(percent::percent_encode(input, C0_CONTROL)))
}

/// Whether the final label forces IPv4 interpretation.
fn ends_in_a_number(input: &str) -> bool {
    let mut parts: Vec<&str> = input.split('.').collect();
    if parts.last() == Some(&"") {
        if parts.len() == 1 {
            return false;
        }
        parts.pop();
    }
    let Some(last) = parts.last() else {
        return false;
    };
    if !last.is_empty() && last.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }
    parse_ipv4_number(last).is_some()
}

/// One dotted piece as decimal, octal, or hex. Returns the value and
/// whether the syntax deviated from plain decimal.
fn parse_ipv4_number(input: &str) -> Option<(u64, bool)> {
    if input.is_empty() {
        return None;
    }
    let (digits, radix, flagged) = if let Some(hex) = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        (hex, 16, true)
    } else if input.len() >= 2 && input.starts_with('0') {
        (&input[1..], 8, true)
    } else {
        (input, 10, false)
    };
    if digits.is_empty() {
        return Some((0, true));
    }
    let mut value: u64 = 0;
    for ch in digits.chars() {
        let digit = ch.to_digit(radix)?;
        value = value.checked_mul(radix as u64)?.checked_add(digit as u64)?;
        if value > u32::MAX as u64 + 1 {
            // Anything past 2^32 can only overflow.
            return None;
        }
    }
    Some((value, flagged))
}

/// The IPv4 parser: 1..4 dot-separated numbers, the last absorbing the
/// remaining bytes of the address.
fn parse_ipv4(input: &str) -> UrlResult<u32> {
    let mut parts: Vec<&str> = input.split('.').collect();
    if parts.last() == Some(&"") {
        parts.pop();
    }
    if parts.is_empty() || parts.len() > 4 {
        return Err(UrlError::Invalid("IPv4-too-many-parts"));
    }
    let mut numbers = Vec::with_capacity(parts.len());
    for part in &parts {
        let (value, _) = parse_ipv4_number(part)
            .ok_or(UrlError::Invalid("IPv4-non-numeric-part"))?;
        numbers.push(value);
    }
    let last = *numbers.last().expect("at least one part");
    for &value in &numbers[..numbers.len() - 1] {
        if value > 255 {
            return Err(UrlError::Invalid("IPv4-out-of-range-part"));
        }
    }
    let remaining = 5 - numbers.len() as u32;
    if last >= 256u64.pow(remaining) {
        return Err(UrlError::Invalid("IPv4-out-of-range-part"));
    }
    let mut address = last as u32;
    for (index, &value) in numbers[..numbers.len() - 1].iter().enumerate() {
        address += (value as u32) << (8 * (3 - index));
    }
    Ok(address)
}

/// The IPv6 parser: eight pieces, optional `::` compression, optional
/// embedded IPv4 in the final 32 bits.
fn parse_ipv6(input: &str) -> UrlResult<[u16; 8]> {
    let chars: Vec<char> = input.chars().collect();
    let mut address = [0u16; 8];
    let mut piece_index = 0usize;
    let mut compress: Option<usize> = None;
    let mut pointer = 0usize;

    if chars.first() == Some(&':') {
        if chars.get(1) != Some(&':') {
            return Err(UrlError::Invalid("IPv6-invalid-compression"));
        }
        pointer += 2;
        piece_index += 1;
        compress = Some(piece_index);
    }

    while pointer < chars.len() {
        if piece_index == 8 {
            return Err(UrlError::Invalid("IPv6-too-many-pieces"));
        }
        if chars[pointer] == ':' {
            if compress.is_some() {
                return Err(UrlError::Invalid("IPv6-multiple-compression"));
            }
            pointer += 1;
            piece_index += 1;
            compress = Some(piece_index);
            continue;
        }
        let mut value: u32 = 0;
        let mut length = 0;
        while length < 4 {
            let Some(digit) = chars.get(pointer).and_then(|c| c.to_digit(16)) else {
                break;
            };
            value = value * 16 + digit;
            pointer += 1;
            length += 1;
        }
        if chars.get(pointer) == Some(&'.') {
            if length == 0 {
                return Err(UrlError::Invalid("IPv4-in-IPv6-invalid-code-point"));
            }
            pointer -= length;
            if piece_index > 6 {
                return Err(UrlError::Invalid("IPv4-in-IPv6-too-many-pieces"));
            }
            let mut numbers_seen = 0;
            while pointer < chars.len() {
                let mut ipv4_piece: Option<u32> = None;
                if numbers_seen > 0 {
                    if chars[pointer] == '.' && numbers_seen < 4 {
                        pointer += 1;
                    } else {
                        return Err(UrlError::Invalid("IPv4-in-IPv6-invalid-code-point"));
                    }
                }
                if !chars.get(pointer).is_some_and(char::is_ascii_digit) {
                    return Err(UrlError::Invalid("IPv4-in-IPv6-invalid-code-point"));
                }
                while let Some(digit) = chars.get(pointer).and_then(|c| c.to_digit(10)) {
                    ipv4_piece = Some(match ipv4_piece {
                        None => digit,
                        Some(0) => return Err(UrlError::Invalid("IPv4-in-IPv6-invalid-code-point")),
                        Some(piece) => piece * 10 + digit,
                    });
                    if ipv4_piece.is_some_and(|p| p > 255) {
                        return Err(UrlError::Invalid("IPv4-in-IPv6-out-of-range-part"));
                    }
                    pointer += 1;
                }
                address[piece_index] =
                    address[piece_index] * 0x100 + ipv4_piece.unwrap_or(0) as u16;
                numbers_seen += 1;
                if numbers_seen == 2 || numbers_seen == 4 {
                    piece_index += 1;
                }
            }
            if numbers_seen != 4 {
                return Err(UrlError::Invalid("IPv4-in-IPv6-too-few-parts"));
            }
            break;
        } else if chars.get(pointer) == Some(&':') {
            pointer += 1;
            if pointer == chars.len() {
                return Err(UrlError::Invalid("IPv6-invalid-code-point"));
            }
        } else if pointer < chars.len() {
            return Err(UrlError::Invalid("IPv6-invalid-code-point"));
        }
        address[piece_index] = value as u16;
        piece_index += 1;
    }

    if let Some(compress) = compress {
        let mut swaps = piece_index - compress;
        piece_index = 7;
        while piece_index != 0 && swaps > 0 {
            address.swap(piece_index, compress + swaps - 1);
            piece_index -= 1;
            swaps -= 1;
        }
    } else if piece_index != 8 {
        return Err(UrlError::Invalid("IPv6-too-few-pieces"));
    }
    Ok(address)
}

/// Longest run (length >= 2) of zero pieces, for `::` compression.
fn longest_zero_run(pieces: &[u16; 8]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    let mut current: Option<(usize, usize)> = None;
    for (index, &piece) in pieces.iter().enumerate() {
        if piece == 0 {
            current = match current {
                Some((start, len)) => Some((start, len + 1)),
                None => Some((index, 1)),
            };
            if let Some((_, len)) = current {
                if len >= 2 && best.map_or(true, |(_, best_len)| len > best_len) {
                    best = current;
                }
            }
        } else {
            current = None;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_parsing() {
        assert_eq!(
            Host::parse("Example.COM", true).unwrap(),
            Host::Domain("example.com".to_string())
        );
        assert_eq!(
            Host::parse("łąka.pl", true).unwrap(),
            Host::Domain("xn--ka-2ia6b.pl".to_string())
        );
        // Percent-encoded input decodes before IDNA.
        assert_eq!(
            Host::parse("ex%61mple.com", true).unwrap(),
            Host::Domain("example.com".to_string())
        );
    }

    #[test]
    fn test_forbidden_domain_code_points() {
        assert!(Host::parse("exa mple.com", true).is_err());
        assert!(Host::parse("exa%23mple.com", true).is_err());
    }

    #[test]
    fn test_opaque_host() {
        assert_eq!(
            Host::parse("ExAmple.com", false).unwrap(),
            Host::Opaque("ExAmple.com".to_string())
        );
        assert!(Host::parse("bad host", false).is_err());
        assert!(Host::parse("bad<host", false).is_err());
    }

    #[test]
    fn test_ipv4_forms() {
        assert_eq!(Host::parse("127.0.0.1", true).unwrap(), Host::Ipv4(0x7F000001));
        assert_eq!(Host::parse("0x7f.0.0.1", true).unwrap(), Host::Ipv4(0x7F000001));
        // Octal part.
        assert_eq!(Host::parse("0177.0.0.1", true).unwrap(), Host::Ipv4(0x7F000001));
        // The last part absorbs the remaining bytes.
        assert_eq!(Host::parse("127.1", true).unwrap(), Host::Ipv4(0x7F000001));
        assert_eq!(Host::parse("2130706433", true).unwrap(), Host::Ipv4(0x7F000001));
        // Trailing dot is tolerated.
        assert_eq!(Host::parse("127.0.0.1.", true).unwrap(), Host::Ipv4(0x7F000001));
    }

    #[test]
    fn test_ipv4_failures() {
        assert!(Host::parse("1.2.3.4.5", true).is_err());
        assert!(Host::parse("256.256.256.256.", true).is_err());
        assert!(Host::parse("4294967296", true).is_err());
    }

    #[test]
    fn test_not_an_ipv4_stays_domain() {
        assert_eq!(
            Host::parse("127.0.0.1x", true).unwrap(),
            Host::Domain("127.0.0.1x".to_string())
        );
        assert_eq!(
            Host::parse("example.1com", true).unwrap(),
            Host::Domain("example.1com".to_string())
        );
    }

    #[test]
    fn test_ipv6_parsing() {
        assert_eq!(
            Host::parse("[::1]", true).unwrap(),
            Host::Ipv6([0, 0, 0, 0, 0, 0, 0, 1])
        );
        assert_eq!(
            Host::parse("[2001:db8::ff00:42:8329]", true).unwrap(),
            Host::Ipv6([0x2001, 0x0db8, 0, 0, 0, 0xff00, 0x42, 0x8329])
        );
        assert_eq!(
            Host::parse("[::ffff:192.168.0.1]", true).unwrap(),
            Host::Ipv6([0, 0, 0, 0, 0, 0xffff, 0xc0a8, 0x0001])
        );
    }

    #[test]
    fn test_ipv6_failures() {
        assert!(Host::parse("[1:2:3:4:5:6:7:8:9]", true).is_err());
        assert!(Host::parse("[1::2::3]", true).is_err());
        assert!(Host::parse("[::ffff:192.168.0]", true).is_err());
        assert!(Host::parse("[zz::]", true).is_err());
    }

    #[test]
    fn test_serialization() {
        assert_eq!(Host::Ipv4(0x7F000001).to_string(), "127.0.0.1");
        assert_eq!(
            Host::parse("[2001:0:0:0:0:0:0:1]", true).unwrap().to_string(),
            "[2001::1]"
        );
        assert_eq!(
            Host::parse("[::ffff:c0a8:1]", true).unwrap().to_string(),
            "[::ffff:c0a8:1]"
        );
        assert_eq!(Host::Domain("example.com".into()).to_string(), "example.com");
        assert_eq!(Host::Null.to_string(), "");
    }
}
