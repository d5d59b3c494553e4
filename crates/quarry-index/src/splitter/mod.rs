//! AST-aware code splitter.
//!
//! Parses a file with the tree-sitter grammar for its language and
//! carves it into chunks along chunkable nodes: classes, interfaces,
//! methods, constructors, and top-level functions. Members nested in a
//! container become sibling chunks; the container chunk covers its
//! declaration up to the first member. Each chunk is extended upward
//! over its leading comment block, and a comment block is attributed to
//! at most one chunk. Files without a grammar, or that fail to parse,
//! fall back to the line-window splitter.

mod comments;
mod window;

use std::collections::BTreeSet;

use tree_sitter::{Node, Parser};

pub use window::{Window, WindowSplitter};

use crate::languages::{Lang, NodeKind};

/// A contiguous slice of a source file with its line span.
///
/// `start_line..=end_line` is 1-based inclusive and `content` holds
/// exactly those lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChunk {
    pub content: String,
    /// `None` for files split without a grammar.
    pub language: Option<Lang>,
    /// Absolute path of the source file.
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub node_kind: NodeKind,
    pub node_name: Option<String>,
}

impl CodeChunk {
    /// Language tag for metadata and logs.
    #[must_use]
    pub fn language_tag(&self) -> &'static str {
        self.language.map_or("text", Lang::id)
    }
}

/// A chunkable node with its raw span, before comment extension.
struct RawNode {
    start_line: usize,
    end_line: usize,
    start_byte: usize,
    end_byte: usize,
    kind: NodeKind,
    name: Option<String>,
    container: bool,
}

/// Splits source files into [`CodeChunk`]s.
#[derive(Debug, Clone, Copy)]
pub struct AstSplitter {
    chunk_size: usize,
    window: WindowSplitter,
}

impl AstSplitter {
    #[must_use]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            window: WindowSplitter::new(chunk_size, chunk_overlap),
        }
    }

    /// Split `source` into ordered chunks.
    ///
    /// Chunks come back in ascending `start_line` order; an empty file
    /// yields an empty sequence.
    #[must_use]
    pub fn split(&self, source: &str, language: Option<Lang>, file_path: &str) -> Vec<CodeChunk> {
        if source.is_empty() {
            return Vec::new();
        }

        let Some(lang) = language else {
            return self.window_fallback(source, None, file_path);
        };

        let mut parser = Parser::new();
        if parser.set_language(&lang.grammar()).is_err() {
            tracing::debug!(file = file_path, "grammar rejected, using window splitter");
            return self.window_fallback(source, Some(lang), file_path);
        }
        let Some(tree) = parser.parse(source, None) else {
            tracing::debug!(file = file_path, "parse failed, using window splitter");
            return self.window_fallback(source, Some(lang), file_path);
        };

        let mut raw = Vec::new();
        collect_chunkable(&tree.root_node(), source, lang, &mut raw);
        if raw.is_empty() {
            return self.window_fallback(source, Some(lang), file_path);
        }
        raw.sort_by_key(|r| r.start_line);

        let lines: Vec<&str> = source.lines().collect();
        let syntax = lang.comment_syntax();

        // Comment extension first, in ascending order, so a block
        // between two chunks is claimed exactly once.
        let mut claimed: BTreeSet<usize> = BTreeSet::new();
        let extended: Vec<usize> = raw
            .iter()
            .map(|r| {
                let ext = comments::leading_comment_start(&lines, r.start_line, &syntax);
                if ext < r.start_line {
                    if (ext..r.start_line).any(|l| claimed.contains(&l)) {
                        return r.start_line;
                    }
                    claimed.extend(ext..r.start_line);
                }
                ext
            })
            .collect();

        let mut chunks = Vec::new();
        for (i, node) in raw.iter().enumerate() {
            let start = extended[i];
            let end = if node.container {
                container_end(&raw, &extended, i)
            } else {
                node.end_line
            };

            let span = &lines[start - 1..end];
            let span_len: usize = span.iter().map(|l| l.len() + 1).sum();
            if span_len > self.chunk_size && end > start {
                for w in self.window.split_lines(span, start) {
                    chunks.push(CodeChunk {
                        content: w.content,
                        language: Some(lang),
                        file_path: file_path.to_owned(),
                        start_line: w.start_line,
                        end_line: w.end_line,
                        node_kind: node.kind,
                        node_name: node.name.clone(),
                    });
                }
            } else {
                // Containers take whole declaration lines; leaves take
                // the node's exact text so two nodes sharing a line do
                // not duplicate each other's characters.
                let content = if node.container {
                    span.join("\n")
                } else {
                    leaf_content(source, &lines, start, node)
                };
                chunks.push(CodeChunk {
                    content,
                    language: Some(lang),
                    file_path: file_path.to_owned(),
                    start_line: start,
                    end_line: end,
                    node_kind: node.kind,
                    node_name: node.name.clone(),
                });
            }
        }

        chunks.sort_by_key(|c| c.start_line);
        chunks
    }

    fn window_fallback(
        &self,
        source: &str,
        language: Option<Lang>,
        file_path: &str,
    ) -> Vec<CodeChunk> {
        self.window
            .split(source)
            .into_iter()
            .map(|w| CodeChunk {
                content: w.content,
                language,
                file_path: file_path.to_owned(),
                start_line: w.start_line,
                end_line: w.end_line,
                node_kind: NodeKind::Unknown,
                node_name: None,
            })
            .collect()
    }
}

/// End line of a container chunk: its declaration runs up to the line
/// before its first member's (extended) start. A member opening on the
/// declaration line itself leaves the container a single line.
fn container_end(raw: &[RawNode], extended: &[usize], i: usize) -> usize {
    let node = &raw[i];
    let first_member = raw
        .iter()
        .enumerate()
        .skip(i + 1)
        .find(|(_, r)| r.start_line <= node.end_line)
        .map(|(j, _)| extended[j]);
    match first_member {
        Some(member_start) => member_start
            .saturating_sub(1)
            .clamp(node.start_line, node.end_line),
        None => node.end_line,
    }
}

fn collect_chunkable(node: &Node, source: &str, lang: Lang, out: &mut Vec<RawNode>) {
    for i in 0..node.named_child_count() {
        let Some(child) = node.named_child(i) else {
            continue;
        };
        let kind_str = child.kind();
        if let Some(kind) = lang.leaf_kind(kind_str) {
            out.push(raw_node(&child, source, kind, false));
        } else if let Some(kind) = lang.container_kind(kind_str) {
            out.push(raw_node(&child, source, kind, true));
            collect_chunkable(&child, source, lang, out);
        } else {
            collect_chunkable(&child, source, lang, out);
        }
    }
}

/// Leading comment lines followed by the node's own text.
fn leaf_content(source: &str, lines: &[&str], ext_start: usize, node: &RawNode) -> String {
    let mut content = String::new();
    for line in &lines[ext_start - 1..node.start_line - 1] {
        content.push_str(line);
        content.push('\n');
    }
    content.push_str(&source[node.start_byte..node.end_byte]);
    content
}

fn raw_node(node: &Node, source: &str, kind: NodeKind, container: bool) -> RawNode {
    RawNode {
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        kind,
        name: node_name(node, source),
        container,
    }
}

fn node_name(node: &Node, source: &str) -> Option<String> {
    // tree-sitter-rust impl_item exposes "type"; most grammars use "name".
    node.child_by_field_name("name")
        .or_else(|| node.child_by_field_name("type"))
        .map(|n| source[n.byte_range()].to_string())
}
