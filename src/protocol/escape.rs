use std::borrow::Cow;

/// Escape a protocol token so embedded tabs, newlines and backslashes cannot
/// be confused with field or line delimiters.
pub fn escape(token: &str) -> Cow<'_, str> {
    if !token.contains(['\\', '\t', '\n']) {
        return Cow::Borrowed(token);
    }

    let mut out = String::with_capacity(token.len() + 8);
    for ch in token.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

/// Reverse [`escape`]. Unknown escape sequences and a trailing lone
/// backslash are kept verbatim.
pub fn unescape(token: &str) -> String {
    if !token.contains('\\') {
        return token.to_string();
    }

    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
