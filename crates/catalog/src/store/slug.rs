//! Slug assignment for new and renamed products.
//!
//! The first candidate comes from counting the existing slug family
//! (`base`, `base-2`, `base-3`, ...): with `n` members the product gets
//! `base-(n+1)`, or plain `base` when the family is empty. Counting is not
//! atomic with the write, so the repository's unique constraint has the final
//! word and a conflict moves on to the next suffix.

use souk_core::Slug;

/// Write attempts before a slug collision is reported as a conflict.
pub const MAX_SLUG_ATTEMPTS: usize = 5;

/// Candidate slug for the given attempt, where `taken` is the size of the
/// slug family when it was counted.
#[must_use]
pub fn next_slug(base: &Slug, taken: usize, attempt: usize) -> Slug {
    match taken + attempt {
        0 => base.clone(),
        n => base.with_suffix(n + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_uses_family_size() {
        let base = Slug::from_name("Test Product");
        assert_eq!(next_slug(&base, 0, 0).as_str(), "test-product");
        assert_eq!(next_slug(&base, 1, 0).as_str(), "test-product-2");
        assert_eq!(next_slug(&base, 2, 0).as_str(), "test-product-3");
    }

    #[test]
    fn test_retries_move_to_next_suffix() {
        let base = Slug::from_name("x");
        assert_eq!(next_slug(&base, 0, 1).as_str(), "x-2");
        assert_eq!(next_slug(&base, 2, 1).as_str(), "x-4");
        assert_eq!(next_slug(&base, 2, 2).as_str(), "x-5");
    }
}
