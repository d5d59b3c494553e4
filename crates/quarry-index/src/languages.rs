//! Language detection, tree-sitter grammar registry, and per-language
//! splitting rules.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Kind of AST node a chunk was carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Class,
    Interface,
    Method,
    Constructor,
    /// Window-splitter output or an unclassified node.
    Unknown,
}

impl NodeKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Method => "method",
            Self::Constructor => "constructor",
            Self::Unknown => "unknown",
        }
    }
}

/// Comment markers used by the leading-comment scanner.
#[derive(Debug, Clone, Copy)]
pub struct CommentSyntax {
    /// Line-comment prefixes (`//` also covers `///`).
    pub line: &'static [&'static str],
    /// Block comment open/close markers, if the language has them.
    pub block: Option<(&'static str, &'static str)>,
}

const C_STYLE: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: Some(("/*", "*/")),
};

const HASH_STYLE: CommentSyntax = CommentSyntax {
    line: &["#"],
    block: None,
};

/// Supported language with its tree-sitter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
    Java,
}

impl Lang {
    /// Identifier used in document metadata and logs.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Go => "go",
            Self::Java => "java",
        }
    }

    /// Get the tree-sitter grammar for this language.
    #[must_use]
    pub fn grammar(self) -> tree_sitter::Language {
        match self {
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            Self::Java => tree_sitter_java::LANGUAGE.into(),
        }
    }

    /// Chunkable node kinds that are emitted whole and not descended
    /// into (methods, constructors, top-level functions, leaf types).
    #[must_use]
    pub fn leaf_kind(self, node_kind: &str) -> Option<NodeKind> {
        match (self, node_kind) {
            (Self::Rust, "function_item") => Some(NodeKind::Method),
            (Self::Rust, "struct_item" | "enum_item") => Some(NodeKind::Class),
            (Self::Python, "function_definition") => Some(NodeKind::Method),
            (
                Self::JavaScript | Self::TypeScript | Self::Tsx,
                "function_declaration" | "generator_function_declaration" | "method_definition",
            ) => Some(NodeKind::Method),
            (Self::TypeScript | Self::Tsx, "interface_declaration") => Some(NodeKind::Interface),
            (Self::TypeScript | Self::Tsx, "enum_declaration") => Some(NodeKind::Class),
            (Self::Go, "function_declaration" | "method_declaration") => Some(NodeKind::Method),
            (Self::Go, "type_declaration") => Some(NodeKind::Class),
            (Self::Java, "method_declaration") => Some(NodeKind::Method),
            (Self::Java, "constructor_declaration") => Some(NodeKind::Constructor),
            _ => None,
        }
    }

    /// Chunkable container kinds. A container is emitted as a chunk for
    /// its declaration and descended into for member chunks.
    #[must_use]
    pub fn container_kind(self, node_kind: &str) -> Option<NodeKind> {
        match (self, node_kind) {
            (Self::Rust, "impl_item") => Some(NodeKind::Class),
            (Self::Rust, "trait_item") => Some(NodeKind::Interface),
            (Self::Python, "class_definition") => Some(NodeKind::Class),
            (Self::JavaScript | Self::TypeScript | Self::Tsx, "class_declaration") => {
                Some(NodeKind::Class)
            }
            (Self::TypeScript | Self::Tsx, "abstract_class_declaration") => Some(NodeKind::Class),
            (Self::Java, "class_declaration" | "enum_declaration") => Some(NodeKind::Class),
            (Self::Java, "interface_declaration") => Some(NodeKind::Interface),
            _ => None,
        }
    }

    /// Comment markers for the leading-comment scanner.
    #[must_use]
    pub fn comment_syntax(self) -> CommentSyntax {
        match self {
            Self::Python => HASH_STYLE,
            _ => C_STYLE,
        }
    }
}

/// Detect the language of a file from its extension.
#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "rs" => Some(Lang::Rust),
        "py" => Some(Lang::Python),
        "js" | "jsx" | "mjs" | "cjs" => Some(Lang::JavaScript),
        "ts" => Some(Lang::TypeScript),
        "tsx" => Some(Lang::Tsx),
        "go" => Some(Lang::Go),
        "java" => Some(Lang::Java),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_by_extension() {
        assert_eq!(detect_language(Path::new("src/main.rs")), Some(Lang::Rust));
        assert_eq!(detect_language(Path::new("a/b/App.TSX")), Some(Lang::Tsx));
        assert_eq!(detect_language(Path::new("x.java")), Some(Lang::Java));
        assert_eq!(detect_language(Path::new("notes.txt")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
    }

    #[test]
    fn rust_kinds() {
        assert_eq!(Lang::Rust.leaf_kind("function_item"), Some(NodeKind::Method));
        assert_eq!(Lang::Rust.container_kind("impl_item"), Some(NodeKind::Class));
        assert_eq!(
            Lang::Rust.container_kind("trait_item"),
            Some(NodeKind::Interface)
        );
        assert_eq!(Lang::Rust.leaf_kind("expression_statement"), None);
    }

    #[test]
    fn java_kinds() {
        assert_eq!(
            Lang::Java.container_kind("class_declaration"),
            Some(NodeKind::Class)
        );
        assert_eq!(
            Lang::Java.leaf_kind("constructor_declaration"),
            Some(NodeKind::Constructor)
        );
    }

    #[test]
    fn python_uses_hash_comments() {
        assert!(Lang::Python.comment_syntax().block.is_none());
        assert_eq!(Lang::Python.comment_syntax().line, &["#"]);
        assert_eq!(Lang::Go.comment_syntax().block, Some(("/*", "*/")));
    }

    #[test]
    fn grammars_load() {
        for lang in [
            Lang::Rust,
            Lang::Python,
            Lang::JavaScript,
            Lang::TypeScript,
            Lang::Tsx,
            Lang::Go,
            Lang::Java,
        ] {
            let mut parser = tree_sitter::Parser::new();
            parser.set_language(&lang.grammar()).unwrap();
        }
    }
}
