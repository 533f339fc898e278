//! Comment and whitespace stripping
//!
//! A small single-pass scanner that understands just enough of each
//! language (string literals, comment markers, PHP open/close tags) to drop
//! comments and redundant blanks without touching anything semantic.

use std::path::Path;

/// How `#` is treated outside strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HashComments {
    Off,
    /// `#` starts a comment anywhere
    Anywhere,
    /// `#` starts a comment only at the start of a token
    TokenStart,
    /// `#` starts a comment unless it opens a `#[` attribute
    NotAttribute,
}

/// Comment and string rules for one family of languages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Syntax {
    slash_comments: bool,
    block_comments: bool,
    hash_comments: HashComments,
    quotes: &'static [char],
    triple_quotes: bool,
    multiline_strings: bool,
    keep_indent: bool,
    php_tags: bool,
    /// `<<<LABEL` heredoc and `<<<'LABEL'` nowdoc bodies are literal
    heredocs: bool,
    /// `'x'` char literals next to `'a` lifetimes, plus `r#"..."#` raw strings
    rust_literals: bool,
    /// Lines under a `|` or `>` header are literal text
    block_scalars: bool,
}

impl Syntax {
    pub const C_FAMILY: Syntax = Syntax {
        slash_comments: true,
        block_comments: true,
        hash_comments: HashComments::Off,
        quotes: &['"', '\'', '`'],
        triple_quotes: false,
        multiline_strings: true,
        keep_indent: false,
        php_tags: false,
        heredocs: false,
        rust_literals: false,
        block_scalars: false,
    };

    /// `'` introduces lifetimes as well as chars, so it is handled apart from `"`
    pub const RUST: Syntax = Syntax {
        quotes: &['"'],
        rust_literals: true,
        ..Syntax::C_FAMILY
    };

    pub const CSS: Syntax = Syntax {
        slash_comments: false,
        quotes: &['"', '\''],
        ..Syntax::C_FAMILY
    };

    pub const PHP: Syntax = Syntax {
        hash_comments: HashComments::NotAttribute,
        php_tags: true,
        heredocs: true,
        ..Syntax::C_FAMILY
    };

    pub const SCRIPT: Syntax = Syntax {
        slash_comments: false,
        block_comments: false,
        hash_comments: HashComments::Anywhere,
        quotes: &['"', '\''],
        triple_quotes: true,
        multiline_strings: false,
        keep_indent: true,
        php_tags: false,
        heredocs: false,
        rust_literals: false,
        block_scalars: false,
    };

    pub const YAML: Syntax = Syntax {
        hash_comments: HashComments::TokenStart,
        triple_quotes: false,
        block_scalars: true,
        ..Syntax::SCRIPT
    };

    /// Pick the rules for a file by extension; `None` means leave it alone
    pub fn for_path(path: &Path) -> Option<Syntax> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "js" | "mjs" | "cjs" | "ts" | "c" | "h" | "cc" | "cpp" | "hpp" | "java" | "go"
            | "swift" | "kt" | "scala" => Some(Syntax::C_FAMILY),
            "rs" => Some(Syntax::RUST),
            "css" | "scss" | "less" => Some(Syntax::CSS),
            "php" | "phtml" | "inc" => Some(Syntax::PHP),
            "py" | "rb" | "toml" => Some(Syntax::SCRIPT),
            "yml" | "yaml" => Some(Syntax::YAML),
            _ => None,
        }
    }
}

/// Strip comments and redundant whitespace from `text`
pub fn strip_source(text: &str, syntax: Syntax) -> String {
    Scanner::new(text, syntax).run()
}

struct Scanner {
    chars: Vec<char>,
    syntax: Syntax,
    pos: usize,
    out: String,
    indent: String,
    at_line_start: bool,
    line_has_content: bool,
    pending_space: bool,
    in_code: bool,
}

impl Scanner {
    fn new(text: &str, syntax: Syntax) -> Self {
        Self {
            chars: text.chars().collect(),
            syntax,
            pos: 0,
            out: String::with_capacity(text.len()),
            indent: String::new(),
            at_line_start: true,
            line_has_content: false,
            pending_space: false,
            in_code: !syntax.php_tags,
        }
    }

    fn run(mut self) -> String {
        if self.in_code && self.starts_with("#!") {
            let end = self.find_from(self.pos, "\n").map_or(self.chars.len(), |i| i + 1);
            self.emit_range(self.pos, end);
            self.pos = end;
            self.at_line_start = true;
            self.line_has_content = false;
        }

        while self.pos < self.chars.len() {
            if self.in_code {
                self.step_code();
            } else {
                self.step_inline();
            }
        }
        self.out
    }

    /// Outside `<?php ... ?>`: copy verbatim until an open tag
    fn step_inline(&mut self) {
        for tag in ["<?php", "<?=", "<?"] {
            if self.starts_with(tag) {
                self.out.push_str(tag);
                self.pos += tag.chars().count();
                self.in_code = true;
                self.line_has_content = true;
                self.at_line_start = false;
                return;
            }
        }

        let c = self.chars[self.pos];
        self.out.push(c);
        self.pos += 1;
        self.at_line_start = c == '\n';
        self.line_has_content = c != '\n';
    }

    fn step_code(&mut self) {
        let c = self.chars[self.pos];

        if self.syntax.php_tags && self.starts_with("?>") {
            self.flush_space();
            self.out.push_str("?>");
            self.pos += 2;
            self.in_code = false;
            self.line_has_content = true;
            return;
        }

        if let Some(end) = self.literal_block_end(c) {
            self.copy_verbatim(end);
            return;
        }

        match c {
            '\n' => {
                self.newline();
                self.pos += 1;
            }
            ' ' | '\t' | '\r' => {
                if self.at_line_start && self.syntax.keep_indent {
                    self.indent.push(c);
                } else {
                    self.pending_space = true;
                }
                self.pos += 1;
            }
            _ if self.is_line_comment() => self.skip_line_comment(),
            _ if self.syntax.block_comments && self.starts_with("/*") => self.skip_block_comment(),
            _ if self.syntax.triple_quotes && (self.starts_with("\"\"\"") || self.starts_with("'''")) => {
                let delim: String = self.chars[self.pos..self.pos + 3].iter().collect();
                self.copy_string(&delim, true);
            }
            _ if self.syntax.quotes.contains(&c) => {
                self.copy_string(&c.to_string(), self.syntax.multiline_strings);
            }
            '\\' if self.pos + 1 < self.chars.len() => {
                self.flush_space();
                self.emit_range(self.pos, self.pos + 2);
                self.pos += 2;
            }
            _ => {
                self.flush_space();
                self.out.push(c);
                self.line_has_content = true;
                self.pos += 1;
            }
        }
    }

    /// End of a heredoc, Rust literal or YAML block scalar starting here
    fn literal_block_end(&self, c: char) -> Option<usize> {
        match c {
            '<' if self.syntax.heredocs && self.starts_with("<<<") => self.heredoc_end(),
            '\'' if self.syntax.rust_literals => self.char_literal_end(),
            'r' | 'b' if self.syntax.rust_literals => self.raw_string_end(),
            '|' | '>' if self.syntax.block_scalars => self.block_scalar_end(),
            _ => None,
        }
    }

    /// `<<<ID`, `<<<"ID"` or `<<<'ID'` up to the closing `ID` line
    fn heredoc_end(&self) -> Option<usize> {
        let mut i = self.skip_blanks(self.pos + 3);
        let quote = match self.chars.get(i) {
            Some(&q) if q == '\'' || q == '"' => {
                i += 1;
                Some(q)
            }
            _ => None,
        };

        let label_start = i;
        while self.chars.get(i).map_or(false, |c| is_ident_char(*c)) {
            i += 1;
        }
        if i == label_start || self.chars[label_start].is_ascii_digit() {
            return None;
        }
        let label: String = self.chars[label_start..i].iter().collect();

        if let Some(q) = quote {
            if self.chars.get(i) != Some(&q) {
                return None;
            }
            i += 1;
        }
        let mut line = self.line_after(i)?;

        while line < self.chars.len() {
            let at = self.skip_blanks(line);
            let after = at + label.len();
            if self.starts_with_at(at, &label)
                && !self.chars.get(after).map_or(false, |c| is_ident_char(*c))
            {
                return Some(after);
            }
            line = self.find_from(line, "\n")? + 1;
        }
        None
    }

    /// `'x'` or `'\n'`; `None` for a lifetime such as `'a`
    fn char_literal_end(&self) -> Option<usize> {
        match *self.chars.get(self.pos + 1)? {
            '\n' => None,
            '\\' => {
                let close = self.find_from(self.pos + 3, "'")?;
                let escape = &self.chars[self.pos + 1..close];
                if escape.len() > 10 || escape.contains(&'\n') {
                    return None;
                }
                Some(close + 1)
            }
            _ if self.chars.get(self.pos + 2) == Some(&'\'') => Some(self.pos + 3),
            _ => None,
        }
    }

    /// `r"..."`, `r#"..."#` and the `br` byte forms
    fn raw_string_end(&self) -> Option<usize> {
        if self.pos > 0 && is_ident_char(self.chars[self.pos - 1]) {
            return None;
        }
        let mut i = self.pos;
        if self.chars.get(i) == Some(&'b') {
            i += 1;
        }
        if self.chars.get(i) != Some(&'r') {
            return None;
        }
        i += 1;

        let hashes = i;
        while self.chars.get(i) == Some(&'#') {
            i += 1;
        }
        if self.chars.get(i) != Some(&'"') {
            return None;
        }

        let mut closing = String::from("\"");
        closing.extend(std::iter::repeat('#').take(i - hashes));
        let end = self.find_from(i + 1, &closing)?;
        Some(end + closing.len())
    }

    /// A `|`/`>` header with optional indicators, through its more-indented lines
    fn block_scalar_end(&self) -> Option<usize> {
        if self.pos > 0 && !matches!(self.chars[self.pos - 1], ' ' | '\t' | '\n') {
            return None;
        }
        let mut i = self.pos + 1;
        while self
            .chars
            .get(i)
            .map_or(false, |c| c.is_ascii_digit() || *c == '+' || *c == '-')
        {
            i += 1;
        }
        i = self.skip_blanks(i);
        if self.chars.get(i) == Some(&'#') {
            i = self.find_from(i, "\n").unwrap_or(self.chars.len());
        }
        if i >= self.chars.len() {
            return Some(i);
        }
        let mut line = self.line_after(i)?;

        let parent = self.indent_of_line(self.pos);
        while line < self.chars.len() {
            let next = self.find_from(line, "\n").map_or(self.chars.len(), |n| n + 1);
            let text = &self.chars[line..next];
            let blank = text.iter().all(|c| c.is_whitespace());
            let indent = text.iter().take_while(|c| **c == ' ').count();
            if !blank && indent <= parent {
                break;
            }
            line = next;
        }
        Some(line)
    }

    /// Index just past the newline at `at` (optionally preceded by `\r`)
    fn line_after(&self, at: usize) -> Option<usize> {
        let at = if self.chars.get(at) == Some(&'\r') { at + 1 } else { at };
        (self.chars.get(at) == Some(&'\n')).then_some(at + 1)
    }

    fn skip_blanks(&self, mut at: usize) -> usize {
        while matches!(self.chars.get(at), Some(' ') | Some('\t')) {
            at += 1;
        }
        at
    }

    /// Leading spaces of the source line containing `at`
    fn indent_of_line(&self, at: usize) -> usize {
        let start = self.chars[..at]
            .iter()
            .rposition(|c| *c == '\n')
            .map_or(0, |i| i + 1);
        self.chars[start..].iter().take_while(|c| **c == ' ').count()
    }

    fn is_line_comment(&self) -> bool {
        if self.syntax.slash_comments && self.starts_with("//") {
            return true;
        }
        if self.chars[self.pos] != '#' {
            return false;
        }
        match self.syntax.hash_comments {
            HashComments::Off => false,
            HashComments::Anywhere => true,
            HashComments::TokenStart => {
                self.at_line_start || self.pending_space || !self.line_has_content
            }
            HashComments::NotAttribute => self.chars.get(self.pos + 1) != Some(&'['),
        }
    }

    /// Skip to the end of the line, leaving the newline (or PHP close tag) in place
    fn skip_line_comment(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
            if self.syntax.php_tags && self.starts_with("?>") {
                break;
            }
            self.pos += 1;
        }
        self.mark_gap();
    }

    /// Newlines inside the comment survive so statements stay separated
    fn skip_block_comment(&mut self) {
        let end = self
            .find_from(self.pos + 2, "*/")
            .map_or(self.chars.len(), |i| i + 2);
        let newlines = self.chars[self.pos..end].iter().filter(|c| **c == '\n').count();
        for _ in 0..newlines {
            self.newline();
        }
        self.pos = end;
        self.mark_gap();
    }

    /// Copy a string literal verbatim, honoring backslash escapes
    fn copy_string(&mut self, delim: &str, multiline: bool) {
        self.flush_space();
        let start = self.pos;
        let delim_len = delim.chars().count();
        let mut i = self.pos + delim_len;

        while i < self.chars.len() {
            let c = self.chars[i];
            if c == '\\' {
                i += 2;
                continue;
            }
            if c == '\n' && !multiline {
                break;
            }
            if self.starts_with_at(i, delim) {
                i += delim_len;
                break;
            }
            i += 1;
        }

        let end = i.min(self.chars.len());
        self.emit_range(start, end);
        self.pos = end;
    }

    /// Emit `pos..end` untouched, resuming at a line start if it ended with a newline
    fn copy_verbatim(&mut self, end: usize) {
        self.flush_space();
        self.emit_range(self.pos, end);
        self.pos = end;
        if self.out.ends_with('\n') {
            self.indent.clear();
            self.pending_space = false;
            self.line_has_content = false;
            self.at_line_start = true;
        }
    }

    fn newline(&mut self) {
        if self.line_has_content {
            self.out.push('\n');
        }
        self.indent.clear();
        self.pending_space = false;
        self.line_has_content = false;
        self.at_line_start = true;
    }

    /// A removed comment separates tokens like a blank would
    fn mark_gap(&mut self) {
        if !self.at_line_start {
            self.pending_space = true;
        }
    }

    fn flush_space(&mut self) {
        if self.at_line_start {
            if self.syntax.keep_indent {
                self.out.push_str(&self.indent);
            }
            self.indent.clear();
            self.at_line_start = false;
        } else if self.pending_space && self.line_has_content {
            self.out.push(' ');
        }
        self.pending_space = false;
    }

    fn emit_range(&mut self, start: usize, end: usize) {
        self.out.extend(&self.chars[start..end]);
        self.line_has_content = true;
        self.at_line_start = false;
    }

    fn starts_with(&self, pat: &str) -> bool {
        self.starts_with_at(self.pos, pat)
    }

    fn starts_with_at(&self, at: usize, pat: &str) -> bool {
        let mut i = at;
        for p in pat.chars() {
            if self.chars.get(i) != Some(&p) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn find_from(&self, from: usize, pat: &str) -> Option<usize> {
        (from..self.chars.len()).find(|&i| self.starts_with_at(i, pat))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(text: &str, file: &str) -> String {
        strip_source(text, Syntax::for_path(Path::new(file)).unwrap())
    }

    #[test]
    fn test_syntax_by_extension() {
        assert_eq!(Syntax::for_path(Path::new("a.PHP")), Some(Syntax::PHP));
        assert_eq!(Syntax::for_path(Path::new("lib/a.rs")), Some(Syntax::RUST));
        assert_eq!(Syntax::for_path(Path::new("conf.yaml")), Some(Syntax::YAML));
        assert_eq!(Syntax::for_path(Path::new("README")), None);
        assert_eq!(Syntax::for_path(Path::new("data.bin")), None);
    }

    #[test]
    fn test_c_family_comments_and_blanks() {
        let src = "int main() {\n    // say hi\n    int  x = 1;   /* one */\n\n    return x;\n}\n";
        assert_eq!(strip(src, "a.c"), "int main() {\nint x = 1;\nreturn x;\n}\n");
    }

    #[test]
    fn test_strings_are_verbatim() {
        let src = "const url = \"http://example.com  /* x */\"; // trailing\n";
        assert_eq!(strip(src, "a.js"), "const url = \"http://example.com  /* x */\";\n");

        let escaped = "s = 'it\\'s // fine';\n";
        assert_eq!(strip(escaped, "a.js"), escaped);
    }

    #[test]
    fn test_multiline_template_literal_kept() {
        let src = "const t = `line one\n\n    line two`;\n";
        assert_eq!(strip(src, "a.ts"), src);
    }

    #[test]
    fn test_block_comment_keeps_statement_boundary() {
        let src = "a = 1 /* start\nend */ b = 2\n";
        assert_eq!(strip(src, "a.js"), "a = 1\nb = 2\n");
    }

    #[test]
    fn test_escaped_slashes_outside_strings() {
        let src = "re = /https?:\\/\\//;\n";
        assert_eq!(strip(src, "a.js"), src);
    }

    #[test]
    fn test_php_tags_and_inline_html() {
        let src = "<html>  // not code\n<?php # comment\n$x = 1; ?>\n<p>  hi  </p>\n";
        assert_eq!(
            strip(src, "page.php"),
            "<html>  // not code\n<?php\n$x = 1; ?>\n<p>  hi  </p>\n"
        );
    }

    #[test]
    fn test_php_attribute_not_comment() {
        let src = "<?php\n#[Route('/')]\nfunction f() {}\n";
        assert_eq!(strip(src, "a.php"), src);
    }

    #[test]
    fn test_php_line_comment_ends_at_close_tag() {
        let src = "<?php echo 1; // done ?>tail";
        assert_eq!(strip(src, "a.php"), "<?php echo 1; ?>tail");
    }

    #[test]
    fn test_python_keeps_indentation() {
        let src = "#!/usr/bin/env python\ndef f(x):\n    # note\n    if x:   # trailing\n        return  '#'\n\n    return None\n";
        assert_eq!(
            strip(src, "tool.py"),
            "#!/usr/bin/env python\ndef f(x):\n    if x:\n        return '#'\n    return None\n"
        );
    }

    #[test]
    fn test_python_triple_quoted_docstring() {
        let src = "def f():\n    \"\"\"Doc # not comment\n\n    more\"\"\"\n    pass\n";
        assert_eq!(strip(src, "a.py"), src);
    }

    #[test]
    fn test_yaml_hash_needs_token_start() {
        let src = "color: blue#1 # comment\nitems:\n  - a\n";
        assert_eq!(strip(src, "a.yml"), "color: blue#1\nitems:\n  - a\n");
    }

    #[test]
    fn test_rust_lifetimes_not_strings() {
        let src = "fn f<'a>(s: &'a str) -> &'a str { s } // id\n";
        assert_eq!(strip(src, "lib.rs"), "fn f<'a>(s: &'a str) -> &'a str { s }\n");
    }

    #[test]
    fn test_php_heredoc_body_verbatim() {
        let src = "<?php\n$s = <<<EOT\nsee http://example.com    now\n    # keep\nEOT;\n// gone\n";
        assert_eq!(
            strip(src, "a.php"),
            "<?php\n$s = <<<EOT\nsee http://example.com    now\n    # keep\nEOT;\n"
        );
    }

    #[test]
    fn test_php_nowdoc_and_indented_close() {
        let src = "<?php\n$s = <<<'SQL'\n    SELECT *  /* hint */ FROM t\n    SQL;\n$t  = 1;\n";
        assert_eq!(
            strip(src, "a.php"),
            "<?php\n$s = <<<'SQL'\n    SELECT *  /* hint */ FROM t\n    SQL;\n$t = 1;\n"
        );
    }

    #[test]
    fn test_php_shift_operator_is_code() {
        let src = "<?php\n$a = $b <<  2; // shift\n";
        assert_eq!(strip(src, "a.php"), "<?php\n$a = $b << 2;\n");
    }

    #[test]
    fn test_rust_char_literals() {
        let src = "let q = '\"'; let u = \"http://x\";\nlet z = 1;\n";
        assert_eq!(strip(src, "lib.rs"), src);

        let escaped = "let a = '\\''; let b = '\\\\'; // c\nlet d = '\\u{1F600}';\n";
        assert_eq!(
            strip(escaped, "lib.rs"),
            "let a = '\\''; let b = '\\\\';\nlet d = '\\u{1F600}';\n"
        );
    }

    #[test]
    fn test_rust_raw_strings() {
        let src = "let s = r#\"a // \"b\"   c\"#; // x\nlet t = br\"/* y */\";\n";
        assert_eq!(
            strip(src, "lib.rs"),
            "let s = r#\"a // \"b\"   c\"#;\nlet t = br\"/* y */\";\n"
        );
    }

    #[test]
    fn test_rust_identifier_ending_in_r() {
        let src = "let bar = \"x\";  // y\n";
        assert_eq!(strip(src, "lib.rs"), "let bar = \"x\";\n");
    }

    #[test]
    fn test_yaml_block_scalar_verbatim() {
        let src = "script: |\n  echo 'a'   # literal\n  x    y\n\nnext:   1 # note\n";
        assert_eq!(
            strip(src, "ci.yml"),
            "script: |\n  echo 'a'   # literal\n  x    y\n\nnext: 1\n"
        );
    }

    #[test]
    fn test_yaml_folded_scalar_in_list() {
        let src = "steps:\n  - run: >-\n      make   all # not a comment\n  - name: x\n";
        assert_eq!(strip(src, "ci.yaml"), src);
    }

    #[test]
    fn test_yaml_comparison_is_not_block() {
        let src = "expr: a > b   # cmp\n";
        assert_eq!(strip(src, "a.yml"), "expr: a > b\n");
    }

    #[test]
    fn test_css_block_comments_only() {
        let src = "a { background: url(http://x/y.png); } /* c */\n";
        assert_eq!(strip(src, "s.css"), "a { background: url(http://x/y.png); }\n");
    }
}
