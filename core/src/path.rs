//! Path normalisation and URL-safe encoding of REST actions.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters that cannot appear verbatim in a URI path. Quotes, commas
/// and parentheses stay readable because OData function calls use them.
const ACTION: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Normalise a logical path to `/a/b` form, or `""` for the root.
///
/// Opaque identifiers pass through untouched: anything starting with
/// `id:` or `rev:`, or with `ns:` followed by at least one digit. Only the
/// prefix is checked, so `ns:42abc` is opaque too.
pub fn normalize_path(path: &str) -> String {
    if is_opaque_identifier(path) {
        return path.to_string();
    }
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn is_opaque_identifier(path: &str) -> bool {
    if path.starts_with("id:") || path.starts_with("rev:") {
        return true;
    }
    let Some(rest) = path.strip_prefix("ns:") else {
        return false;
    };
    rest.bytes().next().is_some_and(|b| b.is_ascii_digit())
}

/// Split a path into its parent folder and final segment. Both halves are
/// returned without leading or trailing slashes.
pub fn split_parent(path: &str) -> (String, String) {
    let trimmed = path.trim_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, name)) => (parent.trim_matches('/').to_string(), name.to_string()),
        None => (String::new(), trimmed.to_string()),
    }
}

/// Quote a value as an OData string literal.
pub fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Percent-encode an action path so it can be appended to a URL.
pub fn encode_action(action: &str) -> String {
    utf8_percent_encode(action, ACTION).to_string()
}
