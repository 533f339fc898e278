//! Per-file content transforms
//!
//! Turns the bytes read from disk into the bytes stored in the archive:
//! optional comment/whitespace stripping, `LICENSE` wrapping and version
//! placeholder substitution.

mod strip;

pub use strip::{strip_source, Syntax};

use std::path::Path;

/// Token replaced with the project version
pub const VERSION_PLACEHOLDER: &str = "@package_version@";

/// Base name of files that are stored verbatim between newlines
pub const LICENSE_NAME: &str = "LICENSE";

/// Number of leading bytes inspected by the binary heuristic
const BINARY_SNIFF_LEN: usize = 8000;

/// Produce the stored bytes for one file
pub fn transform(contents: &[u8], relative_path: &str, version: &str, strip: bool) -> Vec<u8> {
    let staged = if is_license(relative_path) {
        let mut wrapped = Vec::with_capacity(contents.len() + 2);
        wrapped.push(b'\n');
        wrapped.extend_from_slice(contents);
        wrapped.push(b'\n');
        wrapped
    } else if strip {
        strip_whitespace(contents, relative_path)
    } else {
        contents.to_vec()
    };

    replace_bytes(&staged, VERSION_PLACEHOLDER.as_bytes(), version.as_bytes())
}

/// Whether the base name of `relative_path` is exactly `LICENSE`
pub fn is_license(relative_path: &str) -> bool {
    relative_path.rsplit(|c| c == '/' || c == '\\').next() == Some(LICENSE_NAME)
}

/// Text files have no NUL byte near the start and decode as UTF-8
pub fn is_binary(contents: &[u8]) -> bool {
    let sniff = &contents[..contents.len().min(BINARY_SNIFF_LEN)];
    sniff.contains(&0) || std::str::from_utf8(contents).is_err()
}

/// Strip comments and non-semantic whitespace when the language is known
fn strip_whitespace(contents: &[u8], relative_path: &str) -> Vec<u8> {
    let Some(syntax) = Syntax::for_path(Path::new(relative_path)) else {
        return contents.to_vec();
    };
    if is_binary(contents) {
        return contents.to_vec();
    }
    match std::str::from_utf8(contents) {
        Ok(text) => strip_source(text, syntax).into_bytes(),
        Err(_) => contents.to_vec(),
    }
}

/// Literal substring replacement over bytes
pub fn replace_bytes(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return haystack.to_vec();
    }

    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            out.extend_from_slice(replacement);
            i += needle.len();
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_placeholder_replaced() {
        let out = transform(b"v=@package_version@; again @package_version@", "a.txt", "1.2.3", true);
        assert_eq!(out, b"v=1.2.3; again 1.2.3");
    }

    #[test]
    fn test_placeholder_is_literal_not_regex() {
        let out = transform(b"@package.version@ $1 @package_version@", "a.txt", "$1", false);
        assert_eq!(out, b"@package.version@ $1 $1");
    }

    #[test]
    fn test_license_wrapped_regardless_of_flag() {
        assert_eq!(transform(b"MIT", "LICENSE", "1.0.0", true), b"\nMIT\n");
        assert_eq!(transform(b"MIT", "LICENSE", "1.0.0", false), b"\nMIT\n");
        assert_eq!(transform(b"MIT", "vendor/pkg/LICENSE", "1.0.0", true), b"\nMIT\n");
    }

    #[test]
    fn test_license_never_stripped() {
        let text = b"Copyright  (c)   // not a comment\n\n\n";
        let out = transform(text, "LICENSE", "1.0.0", true);
        assert_eq!(&out[1..out.len() - 1], text);
    }

    #[test]
    fn test_only_exact_license_name() {
        assert!(is_license("LICENSE"));
        assert!(is_license("docs\\LICENSE"));
        assert!(!is_license("LICENSE.md"));
        assert!(!is_license("license"));
        assert_eq!(transform(b"MIT", "LICENSE.md", "1.0.0", true), b"MIT");
    }

    #[test]
    fn test_strip_applies_to_known_languages() {
        let src = b"<?php\n// comment\n$a   =  1; /* note */\n\n\necho $a;\n";
        let out = transform(src, "src/a.php", "1.0.0", true);
        assert_eq!(out, b"<?php\n$a = 1;\necho $a;\n");

        let unchanged = transform(src, "src/a.php", "1.0.0", false);
        assert_eq!(unchanged, src);
    }

    #[test]
    fn test_unknown_extension_untouched() {
        let src = b"some   text // kept\n\n";
        assert_eq!(transform(src, "notes.txt", "1.0.0", true), src);
    }

    #[test]
    fn test_binary_content_untouched() {
        let mut bin = b"// looks like code\n".to_vec();
        bin.extend_from_slice(&[0, 159, 146, 150]);
        assert!(is_binary(&bin));
        assert_eq!(transform(&bin, "blob.js", "1.0.0", true), bin);
    }

    #[test]
    fn test_placeholder_applied_after_strip() {
        let src = b"const V = '@package_version@'; // version\n";
        assert_eq!(transform(src, "v.js", "2.0.0", true), b"const V = '2.0.0';\n");
    }

    #[test]
    fn test_replace_bytes_edges() {
        assert_eq!(replace_bytes(b"abc", b"", b"x"), b"abc");
        assert_eq!(replace_bytes(b"ab", b"abc", b"x"), b"ab");
        assert_eq!(replace_bytes(b"aaa", b"aa", b"b"), b"ba");
    }
}
