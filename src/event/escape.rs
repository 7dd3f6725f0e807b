//! Text escaping for the three places event text ends up.
//!
//! - The query string, written by the sensor with [`escape`] and read back by
//!   the collector with [`unescape`].
//! - The pipe-delimited event log. Query-borne fields use
//!   [`log_query_field`]; the description may carry markup and uses
//!   [`log_markup_field`] instead.
//! - A single-quoted script literal, via [`js_string`].
//!
//! Each destination has its own function. A value escaped for one of them is
//! not safe for any other, so they are never chained.

/// Characters left as-is by [`escape`].
fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '@' | '*' | '_' | '-' | '.' | '/')
}

/// Percent-escape text for a query parameter.
///
/// Code units below 256 become `%XX`, everything else `%uXXXX` (one per UTF-16
/// code unit). `+` is escaped too, since the collector reads `+` as a space.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if is_unreserved(c) {
            out.push(c);
            continue;
        }
        let mut units = [0u16; 2];
        for unit in c.encode_utf16(&mut units) {
            if *unit < 0x100 {
                out.push_str(&format!("%{:02X}", unit));
            } else {
                out.push_str(&format!("%u{:04X}", unit));
            }
        }
    }
    out
}

/// Reverse of [`escape`]. Malformed escapes are kept literally.
pub fn unescape(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut units: Vec<u16> = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '%' => {
                if chars.get(i + 1) == Some(&'u') {
                    if let Some(unit) = hex_value(&chars, i + 2, 4) {
                        units.push(unit);
                        i += 6;
                        continue;
                    }
                } else if let Some(unit) = hex_value(&chars, i + 1, 2) {
                    units.push(unit);
                    i += 3;
                    continue;
                }
                units.push('%' as u16);
            }
            '+' => units.push(' ' as u16),
            c => {
                let mut buf = [0u16; 2];
                units.extend_from_slice(c.encode_utf16(&mut buf));
            }
        }
        i += 1;
    }

    String::from_utf16_lossy(&units)
}

fn hex_value(chars: &[char], start: usize, len: usize) -> Option<u16> {
    let digits = chars.get(start..start + len)?;
    let mut value: u16 = 0;
    for d in digits {
        value = value * 16 + d.to_digit(16)? as u16;
    }
    Some(value)
}

/// Escape a query-borne field (name, class, ids, referrer) for the event log.
pub fn log_query_field(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '%' => out.push_str("%25"),
            '|' => out.push_str("%7C"),
            '\n' => out.push_str("%0A"),
            '\r' => out.push_str("%0D"),
            c => out.push(c),
        }
    }
    out
}

/// Decode a field written with [`log_query_field`].
pub fn decode_log_query_field(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let decoded = tail.get(1..3).and_then(|code| {
            match code.to_ascii_uppercase().as_str() {
                "25" => Some('%'),
                "7C" => Some('|'),
                "0A" => Some('\n'),
                "0D" => Some('\r'),
                _ => None,
            }
        });
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[3..];
            }
            None => {
                out.push('%');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

const MARKUP_ENTITIES: [(&str, char); 4] = [
    ("&amp;", '&'),
    ("&#124;", '|'),
    ("&#10;", '\n'),
    ("&#13;", '\r'),
];

/// Escape the description field for the event log using HTML entities.
pub fn log_markup_field(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match MARKUP_ENTITIES.iter().find(|(_, raw)| *raw == c) {
            Some((entity, _)) => out.push_str(entity),
            None => out.push(c),
        }
    }
    out
}

/// Decode a field written with [`log_markup_field`].
pub fn decode_log_markup_field(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match MARKUP_ENTITIES
            .iter()
            .find(|(entity, _)| tail.starts_with(entity))
        {
            Some((entity, raw)) => {
                out.push(*raw);
                rest = &tail[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render text as a single-quoted script string literal, quotes included.
pub fn js_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('\'');
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            // keeps `</script>` out of the body
            '<' => out.push_str("\\x3C"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
