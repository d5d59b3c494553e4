//! Line-window fallback splitter.
//!
//! Used when no grammar applies, parsing fails, or an AST node's text
//! exceeds the chunk size. Packs whole lines greedily up to
//! `chunk_size` characters and carries up to `chunk_overlap` trailing
//! characters of context into the next window. A single line longer
//! than `chunk_size` becomes its own window; lines are never split.

/// One window over a run of source lines. Lines are 1-based, inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
}

#[derive(Debug, Clone, Copy)]
pub struct WindowSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl WindowSplitter {
    #[must_use]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    /// Split full text into windows. Empty text yields no windows.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<Window> {
        let lines: Vec<&str> = text.lines().collect();
        self.split_lines(&lines, 1)
    }

    /// Split a run of lines whose first line has number `first_line`.
    #[must_use]
    pub fn split_lines(&self, lines: &[&str], first_line: usize) -> Vec<Window> {
        let mut windows = Vec::new();
        let mut start = 0usize;

        while start < lines.len() {
            let mut end = start;
            let mut len = 0usize;
            while end < lines.len() {
                let add = lines[end].len() + 1;
                if len > 0 && len + add > self.chunk_size {
                    break;
                }
                len += add;
                end += 1;
            }

            windows.push(Window {
                start_line: first_line + start,
                end_line: first_line + end - 1,
                content: lines[start..end].join("\n"),
            });

            if end >= lines.len() {
                break;
            }

            // Walk back whole lines totalling at most chunk_overlap
            // characters; always keep at least one fresh line of progress.
            let mut back = end;
            let mut overlap_len = 0usize;
            while back > start + 1 {
                let line_len = lines[back - 1].len() + 1;
                if overlap_len + line_len > self.chunk_overlap {
                    break;
                }
                overlap_len += line_len;
                back -= 1;
            }
            start = back;
        }

        windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_nothing() {
        let splitter = WindowSplitter::new(100, 10);
        assert!(splitter.split("").is_empty());
    }

    #[test]
    fn small_text_is_one_window() {
        let splitter = WindowSplitter::new(100, 10);
        let windows = splitter.split("line one\nline two");
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start_line, 1);
        assert_eq!(windows[0].end_line, 2);
        assert_eq!(windows[0].content, "line one\nline two");
    }

    #[test]
    fn windows_respect_chunk_size() {
        let text = (0..20).map(|i| format!("line number {i:03}")).collect::<Vec<_>>().join("\n");
        let splitter = WindowSplitter::new(64, 0);
        let windows = splitter.split(&text);
        assert!(windows.len() > 1);
        for w in &windows {
            assert!(w.content.len() <= 64);
            assert_eq!(w.content.lines().count(), w.end_line - w.start_line + 1);
        }
    }

    #[test]
    fn never_splits_inside_a_line() {
        let long = "x".repeat(500);
        let text = format!("short\n{long}\nshort again");
        let splitter = WindowSplitter::new(64, 0);
        let windows = splitter.split(&text);
        assert!(windows.iter().any(|w| w.content == long));
    }

    #[test]
    fn overlap_repeats_trailing_lines() {
        let text = (0..10).map(|i| format!("l{i} aaaaaaaaaa")).collect::<Vec<_>>().join("\n");
        let splitter = WindowSplitter::new(40, 15);
        let windows = splitter.split(&text);
        assert!(windows.len() > 1);
        // Each window after the first starts at or before the previous end.
        for pair in windows.windows(2) {
            assert!(pair[1].start_line <= pair[0].end_line + 1);
            assert!(pair[1].start_line > pair[0].start_line);
        }
    }

    #[test]
    fn split_lines_offsets_line_numbers() {
        let lines = ["a", "b", "c"];
        let splitter = WindowSplitter::new(100, 0);
        let windows = splitter.split_lines(&lines, 10);
        assert_eq!(windows[0].start_line, 10);
        assert_eq!(windows[0].end_line, 12);
    }

    #[test]
    fn overlap_never_stalls_progress() {
        // Overlap larger than the window must still advance.
        let text = (0..6).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let splitter = WindowSplitter::new(12, 1000);
        let windows = splitter.split(&text);
        assert!(windows.len() >= 3);
        for pair in windows.windows(2) {
            assert!(pair[1].start_line > pair[0].start_line);
        }
    }
}
