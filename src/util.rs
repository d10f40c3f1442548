use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::config::Config;

lazy_static! {
    pub static ref PAGE_CURSOR_REGEX: Regex =
        Regex::new(r"^(a|b)(\d+)$").expect("Failed to compile regex");
}

pub struct OptFmt<T>(pub Option<T>);

impl<T: fmt::Display> fmt::Display for OptFmt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref t) = self.0 {
            fmt::Display::fmt(t, f)
        } else {
            f.write_str("-")
        }
    }
}

/// Translate a user supplied wildcard pattern to a LIKE pattern, escaping literal `%`.
pub fn parse_wildcards(pattern: &str, wildcard_character: char) -> String {
    let mut result = String::with_capacity(pattern.len() + 4);
    for c in pattern.chars() {
        if c == '%' {
            result.push_str("\\%");
        } else if c == wildcard_character {
            result.push('%');
        } else {
            result.push(c);
        }
    }
    result
}

/// Set difference in both directions, returns `(added, removed)` preserving the order of the inputs.
pub fn find_differences<T: PartialEq + Clone>(old: &[T], new: &[T]) -> (Vec<T>, Vec<T>) {
    let added = new.iter().filter(|e| !old.contains(e)).cloned().collect();
    let removed = old.iter().filter(|e| !new.contains(e)).cloned().collect();
    (added, removed)
}

/// Parse a boolean-ish string, returns `None` for unrecognized values.
pub fn parse_boolean(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "y" => Some(true),
        "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Parse a numeric id, treating non-numeric and zero values as absent.
pub fn parse_id(s: &str) -> Option<i64> {
    s.trim().parse::<i64>().ok().filter(|id| *id != 0)
}

pub fn is_valid_num(s: &str) -> bool {
    s.trim().parse::<f64>().map(|n| n.is_finite()).unwrap_or(false)
}

/// Remove duplicates while keeping the first occurrence of every element in place.
pub fn dedup_preserve_order<T: PartialEq>(vec: &mut Vec<T>) {
    let mut i = 0;
    while i < vec.len() {
        if vec[..i].contains(&vec[i]) {
            vec.remove(i);
        } else {
            i += 1;
        }
    }
}

pub fn dedup_vec<T: PartialEq + Ord>(vec: &mut Vec<T>) {
    vec.sort_unstable();
    vec.dedup();
}

/// Largest offset postgres accepts, OFFSET is a bigint.
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// Resolve the effective limit and offset for a page.
///
/// An invalid or zero limit falls back to `default_limit`, the result is clamped to the configured bounds.
/// Pages are either 1-based page numbers or cursors: `a<id>` starts at offset `id`, `b<id>` ends at it.
pub fn parse_limit(
    limit: Option<&str>,
    page: Option<&str>,
    default_limit: u32,
    config: &Config,
) -> (u32, u64) {
    let limit = match limit.and_then(|l| l.trim().parse::<i64>().ok()) {
        Some(0) | None => i64::from(default_limit),
        Some(l) => l,
    };
    let limit = limit.clamp(
        i64::from(config.min_post_limit),
        i64::from(config.max_post_limit),
    ) as u32;

    let offset = match page.map(str::trim) {
        Some(page) => {
            if let Some(captures) = PAGE_CURSOR_REGEX.captures(page) {
                let num = captures[2].parse::<u64>().unwrap_or(MAX_OFFSET);
                match &captures[1] {
                    "a" => num,
                    _ => num.saturating_sub(u64::from(limit)),
                }
            } else {
                page.parse::<u64>()
                    .map(|page| page.saturating_sub(1).saturating_mul(u64::from(limit)))
                    .unwrap_or(0)
            }
        }
        None => 0,
    };

    (limit, offset.min(MAX_OFFSET))
}

pub fn deserialize_string_from_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
        Float(f64),
        Bool(bool),
    }

    match Option::<StringOrNumber>::deserialize(deserializer)? {
        Some(StringOrNumber::String(s)) => Ok(Some(s)),
        Some(StringOrNumber::Number(i)) => Ok(Some(i.to_string())),
        Some(StringOrNumber::Float(f)) => Ok(Some(f.to_string())),
        Some(StringOrNumber::Bool(b)) => Ok(Some(b.to_string())),
        None => Ok(None),
    }
}

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`).
pub fn deserialize_double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::{
        MAX_OFFSET, dedup_preserve_order, find_differences, is_valid_num, parse_boolean, parse_id,
        parse_limit, parse_wildcards,
    };
    use crate::config::Config;

    #[test]
    fn test_parse_wildcards() {
        assert_eq!(parse_wildcards("100%*done", '*'), "100\\%%done");
        assert_eq!(parse_wildcards("fox_*", '*'), "fox_%");
        assert_eq!(parse_wildcards("a?b*", '?'), "a%b*");
    }

    #[test]
    fn test_find_differences() {
        let old = vec!["a", "b", "c"];
        let new = vec!["b", "c", "d", "e"];
        let (added, removed) = find_differences(&old, &new);
        assert_eq!(added, vec!["d", "e"]);
        assert_eq!(removed, vec!["a"]);
    }

    #[test]
    fn test_parse_boolean() {
        assert_eq!(parse_boolean("yes"), Some(true));
        assert_eq!(parse_boolean("N"), Some(false));
        assert_eq!(parse_boolean("maybe"), None);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_id("12"), Some(12));
        assert_eq!(parse_id("0"), None);
        assert_eq!(parse_id("abc"), None);
        assert!(is_valid_num("1.5"));
        assert!(!is_valid_num("NaN"));
    }

    #[test]
    fn test_parse_limit() {
        let config = Config::default();
        assert_eq!(parse_limit(None, None, 75, &config), (75, 0));
        assert_eq!(parse_limit(Some("0"), Some("3"), 50, &config), (50, 100));
        assert_eq!(parse_limit(Some("abc"), None, 20, &config), (20, 0));
        assert_eq!(parse_limit(Some("5000"), None, 75, &config), (320, 0));
        assert_eq!(parse_limit(Some("-3"), None, 75, &config), (1, 0));
        assert_eq!(parse_limit(Some("10"), Some("a500"), 75, &config), (10, 500));
        assert_eq!(parse_limit(Some("10"), Some("b500"), 75, &config), (10, 490));
        assert_eq!(parse_limit(Some("10"), Some("b5"), 75, &config), (10, 0));
        assert_eq!(parse_limit(Some("10"), Some("zzz"), 75, &config), (10, 0));
    }

    #[test]
    fn test_parse_limit_extreme_pages() {
        let config = Config::default();
        assert_eq!(parse_limit(Some("10"), Some("0"), 75, &config), (10, 0));
        assert_eq!(parse_limit(Some("10"), Some("1"), 75, &config), (10, 0));
        assert_eq!(parse_limit(Some("10"), Some("-4"), 75, &config), (10, 0));
        assert_eq!(parse_limit(Some("10"), Some("two"), 75, &config), (10, 0));
        assert_eq!(
            parse_limit(Some("10"), Some("18446744073709551615"), 75, &config),
            (10, MAX_OFFSET)
        );
        // too large to parse at all
        assert_eq!(
            parse_limit(Some("10"), Some("99999999999999999999999"), 75, &config),
            (10, 0)
        );
        assert_eq!(
            parse_limit(Some("10"), Some("a18446744073709551615"), 75, &config),
            (10, MAX_OFFSET)
        );
        assert_eq!(
            parse_limit(Some("10"), Some("a99999999999999999999999"), 75, &config),
            (10, MAX_OFFSET)
        );
        assert_eq!(
            parse_limit(Some("99999999999999999999"), None, 75, &config),
            (75, 0)
        );
    }

    #[test]
    fn test_dedup_preserve_order() {
        let mut v = vec!["b", "a", "b", "c", "a"];
        dedup_preserve_order(&mut v);
        assert_eq!(v, vec!["b", "a", "c"]);
    }
}
