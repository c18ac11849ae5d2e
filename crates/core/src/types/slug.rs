//! URL-safe product slugs.
//!
//! Slugs are derived from product names: lowercase ASCII letters and digits,
//! with every other run of characters collapsed into a single hyphen.
//! Uniqueness is not a property of this module; the catalog store appends a
//! numeric suffix (`-2`, `-3`, ...) when a base slug is already taken.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Base slug used when a name contains nothing sluggable (e.g. `"!!!"`).
pub const FALLBACK_SLUG: &str = "product";

/// A URL-safe slug.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Derive the base slug for a name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self(slugify(name))
    }

    /// Append a numeric suffix: `base` + `-n`.
    #[must_use]
    pub fn with_suffix(&self, n: usize) -> Self {
        Self(format!("{}-{n}", self.0))
    }

    /// Wrap a slug read back from storage without re-normalizing it.
    #[must_use]
    pub const fn from_stored(slug: String) -> Self {
        Self(slug)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize a name into a base slug.
///
/// ```
/// use souk_core::slugify;
///
/// assert_eq!(slugify("Test Product"), "test-product");
/// assert_eq!(slugify("  Ça va?  Très bien!  "), "a-va-tr-s-bien");
/// assert_eq!(slugify("!!!"), "product");
/// ```
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_owned()
    } else {
        slug
    }
}

/// Case-insensitive-ready regex matching a base slug and its numbered
/// siblings: `^(base)(-[0-9]*)?$`.
///
/// The pattern is valid for both the `regex` crate and `PostgreSQL`'s `~*`.
#[must_use]
pub fn slug_family_pattern(base: &Slug) -> String {
    // Slugs only contain [a-z0-9-], none of which are regex metacharacters.
    format!("^({})(-[0-9]*)?$", base.as_str())
}
