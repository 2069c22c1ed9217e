//! Logging helpers for room content. Chat text and narrator replies are
//! multi-line and arbitrarily long; these keep every log record on one line.

use std::fmt::Write;

/// Longest content preview written to the log.
pub const MAX_PREVIEW: usize = 160;

/// Escape a string for single-line logging and cap it at [`MAX_PREVIEW`] chars.
///
/// Newlines, carriage returns and tabs become `\n`, `\r`, `\t`; backslashes are
/// doubled; other control characters are written as `\xNN`.
pub fn escape_log(s: &str) -> String {
    escape_with_limit(s, MAX_PREVIEW)
}

pub fn escape_with_limit(s: &str, limit: usize) -> String {
    let mut out = String::with_capacity(s.len().min(limit) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= limit {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Short label for a credential so tokens never reach the log in full.
pub fn redact_token(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    if token.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}
