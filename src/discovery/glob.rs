//! Glob filtering of entity names
//!
//! Supports `*`, `?` and `[abc]` / `[a-z]` / `[!abc]` classes. Patterns are
//! anchored and matched against the whole entity name.

use crate::error::{Error, Result};
use regex::Regex;

/// Include/exclude filter over entity names
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl NameFilter {
    /// Compile include and exclude globs
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: include.iter().map(|p| glob_to_regex(p)).collect::<Result<_>>()?,
            exclude: exclude.iter().map(|p| glob_to_regex(p)).collect::<Result<_>>()?,
        })
    }

    /// An empty include list admits everything; exclude always wins
    pub fn matches(&self, name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|r| r.is_match(name));
        included && !self.exclude.iter().any(|r| r.is_match(name))
    }
}

/// Translate a glob pattern into an anchored regex
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    class.push(c);
                }
                if !closed || class.is_empty() {
                    return Err(Error::discovery(format!(
                        "invalid entity pattern '{pattern}': unterminated character class"
                    )));
                }
                out.push('[');
                let body = match class.strip_prefix('!') {
                    Some(rest) => {
                        out.push('^');
                        rest
                    }
                    None => class.as_str(),
                };
                for c in body.chars() {
                    if matches!(c, '\\' | '[' | ']' | '^') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push(']');
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }

    out.push('$');
    Regex::new(&out)
        .map_err(|e| Error::discovery(format!("invalid entity pattern '{pattern}': {e}")))
}

#[cfg(test)]
mod glob_tests {
    use super::*;
    use test_case::test_case;

    #[test_case("item", "item" => true)]
    #[test_case("item", "items" => false)]
    #[test_case("item*", "item_location" => true)]
    #[test_case("*_log", "audit_log" => true)]
    #[test_case("?tem", "item" => true)]
    #[test_case("?tem", "tem" => false)]
    #[test_case("[ab]*", "bin" => true)]
    #[test_case("[ab]*", "cart" => false)]
    #[test_case("[!ab]*", "cart" => true)]
    #[test_case("[a-c]art", "cart" => true)]
    #[test_case("a.b", "axb" => false)]
    fn test_glob_match(pattern: &str, name: &str) -> bool {
        glob_to_regex(pattern).unwrap().is_match(name)
    }

    #[test]
    fn test_unterminated_class_is_rejected() {
        assert!(glob_to_regex("[abc").is_err());
    }

    #[test]
    fn test_filter_exclude_wins() {
        let filter = NameFilter::new(
            &["item*".to_string()],
            &["item_history".to_string()],
        )
        .unwrap();

        assert!(filter.matches("item"));
        assert!(filter.matches("item_location"));
        assert!(!filter.matches("item_history"));
        assert!(!filter.matches("order"));
    }

    #[test]
    fn test_empty_filter_admits_all() {
        let filter = NameFilter::default();
        assert!(filter.matches("anything"));
    }
}
