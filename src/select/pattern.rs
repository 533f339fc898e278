//! Name and content matchers
//!
//! A pattern written as `/body/flags` is a regular expression (flags from
//! `imsx`). Anything else is a glob for names and a literal substring for
//! content.

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex_lite::Regex;

use super::SelectError;

const REGEX_FLAGS: &str = "imsx";

/// Split a `/body/flags` pattern, `None` when it is not delimited
fn split_delimited(pattern: &str) -> Option<(&str, &str)> {
    let rest = pattern.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let (body, flags) = (&rest[..end], &rest[end + 1..]);
    if body.is_empty() || !flags.chars().all(|c| REGEX_FLAGS.contains(c)) {
        return None;
    }
    Some((body, flags))
}

fn compile_regex(pattern: &str, body: &str, flags: &str) -> Result<Regex, SelectError> {
    let source = if flags.is_empty() {
        body.to_string()
    } else {
        format!("(?{}){}", flags, body)
    };
    Regex::new(&source).map_err(|source| SelectError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

/// Matches a file's base name against globs and regexes
#[derive(Debug)]
pub struct NameMatcher {
    globs: GlobSet,
    regexes: Vec<Regex>,
    len: usize,
}

impl NameMatcher {
    pub fn new<'a>(patterns: impl IntoIterator<Item = &'a String>) -> Result<Self, SelectError> {
        let mut builder = GlobSetBuilder::new();
        let mut regexes = Vec::new();
        let mut len = 0;

        for pattern in patterns {
            len += 1;
            match split_delimited(pattern) {
                Some((body, flags)) => regexes.push(compile_regex(pattern, body, flags)?),
                None => {
                    let glob = Glob::new(pattern).map_err(|source| SelectError::InvalidGlob {
                        pattern: pattern.clone(),
                        source,
                    })?;
                    builder.add(glob);
                }
            }
        }

        let globs = builder.build().map_err(|source| SelectError::InvalidGlob {
            pattern: String::new(),
            source,
        })?;

        Ok(Self {
            globs,
            regexes,
            len,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if any pattern matches
    pub fn is_match(&self, name: &str) -> bool {
        self.globs.is_match(name) || self.regexes.iter().any(|re| re.is_match(name))
    }
}

/// Matches file contents against literal substrings and regexes
#[derive(Debug, Default)]
pub struct ContentMatcher {
    literals: Vec<Vec<u8>>,
    regexes: Vec<Regex>,
}

impl ContentMatcher {
    pub fn new<'a>(patterns: impl IntoIterator<Item = &'a String>) -> Result<Self, SelectError> {
        let mut matcher = Self::default();
        for pattern in patterns {
            match split_delimited(pattern) {
                Some((body, flags)) => matcher.regexes.push(compile_regex(pattern, body, flags)?),
                None => matcher.literals.push(pattern.as_bytes().to_vec()),
            }
        }
        Ok(matcher)
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty() && self.regexes.is_empty()
    }

    /// True if any pattern occurs in `contents`
    pub fn is_match(&self, contents: &[u8]) -> bool {
        if self
            .literals
            .iter()
            .any(|needle| contains_bytes(contents, needle))
        {
            return true;
        }
        if self.regexes.is_empty() {
            return false;
        }
        let text = String::from_utf8_lossy(contents);
        self.regexes.iter().any(|re| re.is_match(&text))
    }
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_split_delimited() {
        assert_eq!(split_delimited("/foo/"), Some(("foo", "")));
        assert_eq!(split_delimited("/a/b/i"), Some(("a/b", "i")));
        assert_eq!(split_delimited("/Test\\.php$/ix"), Some(("Test\\.php$", "ix")));
        assert_eq!(split_delimited("*.php"), None);
        assert_eq!(split_delimited("/"), None);
        assert_eq!(split_delimited("//"), None);
        assert_eq!(split_delimited("/foo/q"), None);
    }

    #[test]
    fn test_name_globs() {
        let matcher = NameMatcher::new(&strings(&["*.php", "README*"])).unwrap();
        assert!(matcher.is_match("index.php"));
        assert!(matcher.is_match("README.md"));
        assert!(!matcher.is_match("index.js"));
        assert!(!matcher.is_match("INDEX.PHP"));
    }

    #[test]
    fn test_name_regex_with_flags() {
        let matcher = NameMatcher::new(&strings(&["/test\\.php$/i"])).unwrap();
        assert!(matcher.is_match("FooTest.PHP"));
        assert!(!matcher.is_match("test.php.bak"));
    }

    #[test]
    fn test_empty_name_matcher() {
        let matcher = NameMatcher::new(&Vec::<String>::new()).unwrap();
        assert!(matcher.is_empty());
        assert!(!matcher.is_match("anything"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(
            NameMatcher::new(&strings(&["a[b"])),
            Err(SelectError::InvalidGlob { .. })
        ));
        assert!(matches!(
            NameMatcher::new(&strings(&["/a(b/"])),
            Err(SelectError::InvalidRegex { .. })
        ));
        assert!(matches!(
            ContentMatcher::new(&strings(&["/[z-a]/"])),
            Err(SelectError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_content_literal_and_regex() {
        let matcher = ContentMatcher::new(&strings(&["namespace App", "/^class\\s+\\w+/m"])).unwrap();
        assert!(matcher.is_match(b"<?php\nnamespace App;\n"));
        assert!(matcher.is_match(b"<?php\nclass   Foo {}\n"));
        assert!(!matcher.is_match(b"<?php\n// class Foo\n"));
    }

    #[test]
    fn test_content_literal_is_not_regex() {
        let matcher = ContentMatcher::new(&strings(&["a.c"])).unwrap();
        assert!(matcher.is_match(b"xa.cx"));
        assert!(!matcher.is_match(b"abc"));
    }

    #[test]
    fn test_content_regex_over_invalid_utf8() {
        let matcher = ContentMatcher::new(&strings(&["/needle/"])).unwrap();
        assert!(matcher.is_match(&[0xff, 0xfe, b'n', b'e', b'e', b'd', b'l', b'e']));
    }
}
