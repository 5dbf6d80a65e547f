//! Punycode (RFC 3492) with the IDNA parameters.

const BASE: u32 = 36;
const TMIN: u32 = 1;
const TMAX: u32 = 26;
const SKEW: u32 = 38;
const DAMP: u32 = 700;
const INITIAL_BIAS: u32 = 72;
const INITIAL_N: u32 = 128;

const DELIMITER: char = '-';

fn adapt(mut delta: u32, num_points: u32, first_time: bool) -> u32 {
    delta /= if first_time { DAMP } else { 2 };
    delta += delta / num_points;
    let mut k = 0;
    while delta > ((BASE - TMIN) * TMAX) / 2 {
        delta /= BASE - TMIN;
        k += BASE;
    }
    k + (((BASE - TMIN + 1) * delta) / (delta + SKEW))
}

fn encode_digit(digit: u32) -> char {
    match digit {
        0..=25 => (b'a' + digit as u8) as char,
        26..=35 => (b'0' + (digit - 26) as u8) as char,
        _ => unreachable!("digit out of range"),
    }
}

fn decode_digit(ch: char) -> Option<u32> {
    match ch {
        'a'..='z' => Some(ch as u32 - 'a' as u32),
        'A'..='Z' => Some(ch as u32 - 'A' as u32),
        '0'..='9' => Some(ch as u32 - '0' as u32 + 26),
        _ => None,
    }
}

/// Encode a Unicode label to its Punycode form (without the `xn--` prefix).
///
/// Returns `None` on overflow, which cannot happen for inputs within DNS
/// label lengths.
pub fn encode(input: &str) -> Option<String> {
    let mut output = String::new();
    let mut extended: Vec<u32> = Vec::new();
    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
        } else {
            extended.push(ch as u32);
        }
    }
    let basic_count = output.len() as u32;
    let mut handled = basic_count;
    if basic_count > 0 {
        output.push(DELIMITER);
    }
    if extended.is_empty() {
        return Some(output);
    }
    extended.sort_unstable();
    extended.dedup();

    let mut n = INITIAL_N;
    let mut delta: u32 = 0;
    let mut bias = INITIAL_BIAS;
    let mut first_time = true;

    for &m in &extended {
        delta = delta.checked_add((m - n).checked_mul(handled + 1)?)?;
        n = m;
        for ch in input.chars() {
            let c = ch as u32;
            if c < n {
                delta = delta.checked_add(1)?;
            }
            if c == n {
                // Represent delta as a variable-length integer.
                let mut q = delta;
                let mut k = BASE;
                loop {
                    let t = if k <= bias {
                        TMIN
                    } else if k >= bias + TMAX {
                        TMAX
                    } else {
                        k - bias
                    };
                    if q < t {
                        break;
                    }
                    output.push(encode_digit(t + (q - t) % (BASE - t)));
                    q = (q - t) / (BASE - t);
                    k += BASE;
                }
                output.push(encode_digit(q));
                bias = adapt(delta, handled + 1, first_time);
                first_time = false;
                delta = 0;
                handled += 1;
            }
        }
        delta = delta.checked_add(1)?;
        n = n.checked_add(1)?;
    }
    Some(output)
}

/// Decode a Punycode label (without the `xn--` prefix) back to Unicode.
pub fn decode(input: &str) -> Option<String> {
    let mut output: Vec<char> = Vec::new();
    let rest = match input.rfind(DELIMITER) {
        Some(pos) => {
            for ch in input[..pos].chars() {
                if !ch.is_ascii() {
                    return None;
                }
                output.push(ch);
            }
            &input[pos + 1..]
        }
        None => input,
    };

    let mut n = INITIAL_N;
    let mut i: u32 = 0;
    let mut bias = INITIAL_BIAS;
    let mut chars = rest.chars().peekable();
    let mut first_time = true;

    while chars.peek().is_some() {
        let old_i = i;
        let mut weight: u32 = 1;
        let mut k = BASE;
        loop {
            let digit = decode_digit(chars.next()?)?;
            i = i.checked_add(digit.checked_mul(weight)?)?;
            let t = if k <= bias {
                TMIN
            } else if k >= bias + TMAX {
                TMAX
            } else {
                k - bias
            };
            if digit < t {
                break;
            }
            weight = weight.checked_mul(BASE - t)?;
            k += BASE;
        }
        let len = output.len() as u32 + 1;
        bias = adapt(i - old_i, len, first_time);
        first_time = false;
        n = n.checked_add(i / len)?;
        i %= len;
        let ch = char::from_u32(n)?;
        if ch.is_ascii() {
            return None;
        }
        output.insert(i as usize, ch);
        i += 1;
    }
    Some(output.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_mixed_label() {
        // The example from the URL standard's IDNA section.
        assert_eq!(encode("łąka").as_deref(), Some("ka-2ia6b"));
        assert_eq!(encode("bücher").as_deref(), Some("bcher-kva"));
        assert_eq!(encode("münchen").as_deref(), Some("mnchen-3ya"));
    }

    #[test]
    fn test_encode_all_unicode() {
        assert_eq!(encode("日本語").as_deref(), Some("wgv71a119e"));
    }

    #[test]
    fn test_ascii_only_keeps_trailing_delimiter() {
        assert_eq!(encode("plain").as_deref(), Some("plain-"));
    }

    #[test]
    fn test_decode_round_trip() {
        for label in ["łąka", "bücher", "日本語", "ascii", "mix-あa"] {
            let encoded = encode(label).unwrap();
            assert_eq!(decode(&encoded).as_deref(), Some(label));
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode("!!!"), None);
    }
}
