pub mod auth;
pub mod user;
pub mod direction;
pub mod service;
pub mod audit_log;
pub mod notification;
pub mod analytics;

/// Interprets an optional text field of an update request:
/// absent → keep, blank → clear, otherwise the trimmed value.
pub fn patch_text(value: Option<&str>) -> Option<Option<String>> {
    value.map(|v| {
        let v = v.trim();
        if v.is_empty() { None } else { Some(v.to_string()) }
    })
}

/// Trimmed value or `None` for blank input.
pub fn clean_text(value: Option<&str>) -> Option<String> {
    patch_text(value).flatten()
}

/// Suffix for every `LIKE` built from [`contains_pattern`].
pub const LIKE_ESCAPE: &str = r" ESCAPE '\'";

/// Lowercased `%term%` pattern for `LIKE ... ESCAPE '\'`, with the term's own
/// wildcards matched literally.
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_text_semantics() {
        assert_eq!(patch_text(None), None);
        assert_eq!(patch_text(Some("   ")), Some(None));
        assert_eq!(patch_text(Some(" Bureau 12 ")), Some(Some("Bureau 12".to_string())));
        assert_eq!(clean_text(Some("")), None);
    }

    #[test]
    fn search_terms_escape_like_wildcards() {
        assert_eq!(contains_pattern("Accueil"), "%accueil%");
        assert_eq!(contains_pattern("100%"), r"%100\%%");
        assert_eq!(contains_pattern("j_doe"), r"%j\_doe%");
        assert_eq!(contains_pattern(r"a\b"), r"%a\\b%");
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("jane.doe@cagpu.org"));
        assert!(!is_valid_email("jane.doe"));
        assert!(!is_valid_email("@cagpu.org"));
        assert!(!is_valid_email("jane@localhost"));
        assert!(!is_valid_email("jane@@cagpu.org"));
        assert!(!is_valid_email("jane doe@cagpu.org"));
        assert!(!is_valid_email("jane@cagpu."));
    }
}
