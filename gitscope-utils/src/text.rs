//! Text helpers for diagnostics and document rendering

/// Keep at most the last `max_bytes` of captured stderr, on a char
/// boundary, prefixing `…` when truncated.
pub fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &text[start..])
}

/// Lowercase an author email for use as a join key.
///
/// Display names keep their original casing everywhere; only join keys
/// are folded.
pub fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Domain part of an email address, lowercased; `None` when there is no
/// `@` or the domain is empty.
pub fn email_domain(email: &str) -> Option<String> {
    let at = email.rfind('@')?;
    let domain = email[at + 1..].trim().to_lowercase();
    if domain.is_empty() {
        None
    } else {
        Some(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_short_input() {
        assert_eq!(tail("hello", 10), "hello");
    }

    #[test]
    fn test_tail_truncates() {
        let out = tail("abcdefghij", 4);
        assert_eq!(out, "…ghij");
    }

    #[test]
    fn test_email_key() {
        assert_eq!(email_key(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn test_email_domain() {
        assert_eq!(email_domain("alice@Example.com"), Some("example.com".to_string()));
        assert_eq!(email_domain("no-at-sign"), None);
        assert_eq!(email_domain("trailing@"), None);
    }
}
