//! Sender identifier tokenizer.
//!
//! A personal sender looks like `<digits>@s.whatsapp.net`, optionally with a
//! device suffix (`<digits>:<device>@s.whatsapp.net`). The token may be
//! embedded in a longer string; it must sit on word boundaries on both sides.

/// Domain of an individual (non-group) sender.
pub const USER_DOMAIN: &str = "@s.whatsapp.net";

/// Substring that marks a group chat sender.
pub const GROUP_MARKER: &str = "@g.us";

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_local_char(c: char) -> bool {
    c.is_ascii_digit() || c == ':'
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// True when `from` refers to a group rather than an individual.
pub fn is_group(from: &str) -> bool {
    from.contains(GROUP_MARKER)
}

/// Validate a local part of the form `<digits>` or `<digits>:<digits>` and
/// return the leading digits.
fn parse_local(local: &str) -> Option<&str> {
    match local.split_once(':') {
        Some((user, device)) if is_digits(user) && is_digits(device) => Some(user),
        Some(_) => None,
        None if is_digits(local) => Some(local),
        None => None,
    }
}

/// Find the first identifier token in `from` and return its digits, with
/// any device suffix dropped.
///
/// Later tokens are ignored even when the first one is followed by more.
pub fn find_identifier(from: &str) -> Option<&str> {
    let mut cursor = 0;
    while let Some(offset) = from[cursor..].find(USER_DOMAIN) {
        let at = cursor + offset;
        let end = at + USER_DOMAIN.len();
        // '@' is a single byte, so this stays on a char boundary.
        cursor = at + 1;

        if from[end..].chars().next().is_some_and(is_word_char) {
            continue;
        }

        let head = &from[..at];
        let start = head
            .char_indices()
            .rev()
            .find(|(_, c)| !is_local_char(*c))
            .map_or(0, |(i, c)| i + c.len_utf8());

        if head[..start].chars().next_back().is_some_and(is_word_char) {
            continue;
        }

        if let Some(digits) = parse_local(&head[start..]) {
            return Some(digits);
        }
    }
    None
}

/// Canonical `<digits>@s.whatsapp.net` form of the first token in `from`.
pub fn canonicalize(from: &str) -> Option<String> {
    find_identifier(from).map(|digits| format!("{digits}{USER_DOMAIN}"))
}
