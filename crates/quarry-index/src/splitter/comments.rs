//! Leading-comment scanner.
//!
//! Walks upward from a chunk's first line through contiguous comment
//! lines so the chunk captures its doc block. Blank lines continue the
//! scan inside a block comment and terminate it otherwise.

use crate::languages::CommentSyntax;

/// First line of the comment block immediately above `start_line`, or
/// `start_line` itself when no comment is attached.
///
/// `lines` is the whole file, 0-indexed; `start_line` is 1-based.
#[must_use]
pub fn leading_comment_start(lines: &[&str], start_line: usize, syntax: &CommentSyntax) -> usize {
    let mut attached = start_line;
    let mut in_block = false;
    let mut line_no = start_line.saturating_sub(1);

    while line_no >= 1 {
        let text = lines[line_no - 1].trim();

        if in_block {
            attached = line_no;
            if let Some((open, _)) = syntax.block
                && text.starts_with(open)
            {
                in_block = false;
            }
            line_no -= 1;
            continue;
        }

        if text.is_empty() {
            break;
        }

        if syntax.line.iter().any(|prefix| text.starts_with(prefix)) {
            attached = line_no;
            line_no -= 1;
            continue;
        }

        if let Some((open, close)) = syntax.block
            && text.ends_with(close)
        {
            attached = line_no;
            if !text.starts_with(open) {
                in_block = true;
            }
            line_no -= 1;
            continue;
        }

        // Continuation marker of a doc block written without the
        // closing marker on this line (` * ...`).
        if syntax.block.is_some() && text.starts_with('*') {
            attached = line_no;
            line_no -= 1;
            continue;
        }

        break;
    }

    attached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::Lang;

    fn scan(source: &str, start_line: usize, lang: Lang) -> usize {
        let lines: Vec<&str> = source.lines().collect();
        leading_comment_start(&lines, start_line, &lang.comment_syntax())
    }

    #[test]
    fn no_comment_keeps_start() {
        let src = "fn a() {}\nfn b() {}";
        assert_eq!(scan(src, 2, Lang::Rust), 2);
    }

    #[test]
    fn line_comments_attach() {
        let src = "// first\n// second\nfn a() {}";
        assert_eq!(scan(src, 3, Lang::Rust), 1);
    }

    #[test]
    fn doc_comments_attach() {
        let src = "/// docs\nfn a() {}";
        assert_eq!(scan(src, 2, Lang::Rust), 1);
    }

    #[test]
    fn single_line_block_attaches() {
        let src = "/** doc */\npublic class A {}";
        assert_eq!(scan(src, 2, Lang::Java), 1);
    }

    #[test]
    fn multi_line_block_attaches_to_open() {
        let src = "/*\n * body\n\n * more\n */\nfn a() {}";
        assert_eq!(scan(src, 6, Lang::Rust), 1);
    }

    #[test]
    fn blank_line_outside_block_terminates() {
        let src = "// far away\n\nfn a() {}";
        assert_eq!(scan(src, 3, Lang::Rust), 3);
    }

    #[test]
    fn code_line_terminates() {
        let src = "let x = 1;\n// near\nfn a() {}";
        assert_eq!(scan(src, 3, Lang::Rust), 2);
    }

    #[test]
    fn python_hash_comments() {
        let src = "# helper\n# does things\ndef f():\n    pass";
        assert_eq!(scan(src, 3, Lang::Python), 1);
    }

    #[test]
    fn python_has_no_block_comments() {
        let src = "*/\ndef f():\n    pass";
        assert_eq!(scan(src, 2, Lang::Python), 2);
    }

    #[test]
    fn scan_stops_at_file_start() {
        let src = "// only comments above\nfn a() {}";
        assert_eq!(scan(src, 2, Lang::Rust), 1);
    }
}
