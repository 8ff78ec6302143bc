//! URL slug helpers for posts.

use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_SLUG_LEN: usize = 100;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_-]+").expect("valid regex"));
static SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid regex"));

/// Lowercase, hyphen-separated form of `title`, at most 100 characters.
pub fn generate_slug(title: &str) -> String {
    let lowered = title.trim().to_lowercase();
    let words = NON_WORD.replace_all(&lowered, " ");
    let joined = SEPARATORS.replace_all(&words, "-");
    let slug: String = joined.trim_matches('-').chars().take(MAX_SLUG_LEN).collect();
    // Truncation can leave a dangling separator.
    slug.trim_end_matches('-').to_string()
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slug.len() <= MAX_SLUG_LEN && SLUG.is_match(slug)
}

/// Slug for `input`, or an empty string when nothing usable remains.
pub fn clean_slug(input: &str) -> String {
    let slug = generate_slug(input);
    if is_valid_slug(&slug) {
        slug
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_collapses_punctuation_and_separators() {
        assert_eq!(generate_slug("  Dental Services: What to Expect! "), "dental-services-what-to-expect");
        assert_eq!(generate_slug("COVID-19 -- vaccine_update"), "covid-19-vaccine-update");
        assert_eq!(generate_slug("---"), "");
    }

    #[test]
    fn generate_caps_length() {
        let slug = generate_slug(&"ab ".repeat(80));
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
        assert!(is_valid_slug(&slug));
    }

    #[test]
    fn validity() {
        assert!(is_valid_slug("healthy-living-2024"));
        assert!(!is_valid_slug("Healthy-Living"));
        assert!(!is_valid_slug("double--hyphen"));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("3f2b8c1e_4a"));
        assert!(!is_valid_slug(&"a".repeat(101)));
    }

    #[test]
    fn clean_returns_empty_for_unusable_input() {
        assert_eq!(clean_slug("Family Planning"), "family-planning");
        assert_eq!(clean_slug("!!!"), "");
        // \w keeps non-ASCII letters, which a slug cannot hold.
        assert_eq!(clean_slug("Café"), "");
    }
}
