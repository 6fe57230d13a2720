//! Thread-local cache of compiled terminal patterns
//!
//! Terminals are matched anchored at the current position, so patterns are
//! compiled in the form `\A(?:pattern)` and cached under the raw pattern.
//! Every parse session of the same grammar on the same thread reuses them.

use hashbrown::HashMap;
use regex::Regex;
use std::cell::RefCell;

thread_local! {
    static ANCHORED: RefCell<HashMap<String, Regex>> = RefCell::new(HashMap::new());
}

/// Get or compile the anchored form of `pattern`
pub fn get_or_compile_anchored(pattern: &str) -> Result<Regex, regex::Error> {
    ANCHORED.with(|cache| {
        if let Some(regex) = cache.borrow().get(pattern) {
            return Ok(regex.clone());
        }

        let regex = Regex::new(&format!(r"\A(?:{})", pattern))?;
        cache
            .borrow_mut()
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    })
}

/// Check that `pattern` compiles, without caching it
pub fn validate(pattern: &str) -> Result<(), regex::Error> {
    Regex::new(pattern).map(|_| ())
}

/// Clear the cache
pub fn clear_cache() {
    ANCHORED.with(|cache| cache.borrow_mut().clear());
}

/// Number of cached patterns
pub fn cache_size() -> usize {
    ANCHORED.with(|cache| cache.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_reuses_compiled_pattern() {
        clear_cache();

        get_or_compile_anchored("[0-9]+").unwrap();
        assert_eq!(cache_size(), 1);
        get_or_compile_anchored("[0-9]+").unwrap();
        assert_eq!(cache_size(), 1);
        get_or_compile_anchored("[a-z]+").unwrap();
        assert_eq!(cache_size(), 2);
    }

    #[test]
    fn test_invalid_pattern() {
        clear_cache();

        assert!(get_or_compile_anchored("[invalid").is_err());
        assert!(validate("(unclosed").is_err());
        assert_eq!(cache_size(), 0);
    }

    #[test]
    fn test_match_is_anchored() {
        let regex = get_or_compile_anchored("[a-z]+").unwrap();
        assert!(regex.find("123abc").is_none());
        assert_eq!(regex.find("abc123").map(|m| m.end()), Some(3));
    }

    #[test]
    fn test_alternation_stays_anchored() {
        let regex = get_or_compile_anchored("a|b").unwrap();
        assert!(regex.find("xb").is_none());
        assert_eq!(regex.find("b").map(|m| m.end()), Some(1));
    }
}
