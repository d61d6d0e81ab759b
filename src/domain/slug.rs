//! Slug helpers shared by routes and the category write path.

use slug::slugify;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
}

/// Derive a slug from human-readable text, e.g. a category name.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Normalize a slug taken from a request path.
///
/// Path captures may carry trailing slashes (`/blog/hello//`); lookups always
/// use the bare slug.
pub fn route_slug(raw: &str) -> &str {
    raw.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_slug_lowercases_and_hyphenates() {
        assert_eq!(derive_slug("Rust & Tokio").unwrap(), "rust-tokio");
    }

    #[test]
    fn derive_slug_rejects_blank_input() {
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
    }

    #[test]
    fn derive_slug_rejects_symbols_only() {
        assert!(matches!(
            derive_slug("!!!"),
            Err(SlugError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn route_slug_strips_trailing_slashes() {
        assert_eq!(route_slug("hello/"), "hello");
        assert_eq!(route_slug("hello//"), "hello");
        assert_eq!(route_slug("hello"), "hello");
    }
}
