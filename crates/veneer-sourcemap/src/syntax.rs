// Dweve Veneer - Surface Syntax Language Bridge
//
// Copyright (c) 2025 Dweve IP B.V. and individual contributors.
//
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository or at: http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Ground-truth statement and comment positions for generated Go code.
//!
//! The generated file is parsed with tree-sitter's Go grammar. Only two things
//! are kept: every statement (classified for marker binding) and every comment
//! (where transformation markers live).

use crate::error::{SourceMapError, SourceMapResult};
use crate::text::byte_to_char_column;
use std::path::Path;
use tree_sitter::{Node, Parser, Point};

/// Statement classes in binding priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatementKind {
    /// `x = ...`, `x := ...`, `var x = ...`, `const x = ...`.
    Assignment,
    /// Expression statements and their simple relatives (`x++`, `ch <- v`).
    Expression,
    /// Control flow, `defer`, `return`, `go` and every other statement.
    Other,
}

impl StatementKind {
    fn classify(kind: &str) -> Option<Self> {
        match kind {
            "assignment_statement" | "short_var_declaration" | "var_declaration"
            | "const_declaration" => Some(Self::Assignment),
            "expression_statement" | "inc_statement" | "dec_statement" | "send_statement" => {
                Some(Self::Expression)
            }
            "return_statement" | "defer_statement" | "go_statement" | "if_statement"
            | "for_statement" | "expression_switch_statement" | "type_switch_statement"
            | "select_statement" | "labeled_statement" | "break_statement"
            | "continue_statement" | "goto_statement" | "fallthrough_statement"
            | "type_declaration" => Some(Self::Other),
            _ => None,
        }
    }
}

/// A statement with its 1-based start position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
}

/// A comment with its 1-based start position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub line: u32,
    pub column: u32,
    pub text: String,
}

/// Statements and comments of a parsed Go file, each in source order.
#[derive(Debug, Clone, Default)]
pub struct SyntaxIndex {
    statements: Vec<Statement>,
    comments: Vec<Comment>,
}

impl SyntaxIndex {
    /// Parse Go source. Any syntax error fails the whole parse.
    pub fn parse(path: &Path, source: &str) -> SourceMapResult<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|e| SourceMapError::Io {
                path: path.to_path_buf(),
                message: format!("failed to load Go grammar: {}", e),
            })?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| SourceMapError::GeneratedParse {
                path: path.to_path_buf(),
                line: 1,
                column: 1,
            })?;

        let root = tree.root_node();
        let lines: Vec<&str> = source.split('\n').collect();

        if root.has_error() {
            let point = first_error(&root).unwrap_or(root.start_position());
            let (line, column) = to_line_col(&lines, point);
            return Err(SourceMapError::GeneratedParse {
                path: path.to_path_buf(),
                line,
                column,
            });
        }

        let mut index = SyntaxIndex::default();
        let mut cursor = root.walk();
        let mut stack = vec![root];
        // Iterative pre-order walk keeps deep generated code off the call stack.
        while let Some(node) = stack.pop() {
            if node.kind() == "comment" {
                let (line, column) = to_line_col(&lines, node.start_position());
                let text = node
                    .utf8_text(source.as_bytes())
                    .unwrap_or_default()
                    .to_string();
                index.comments.push(Comment { line, column, text });
            } else if let Some(kind) = StatementKind::classify(node.kind()) {
                let (line, column) = to_line_col(&lines, node.start_position());
                index.statements.push(Statement {
                    kind,
                    line,
                    column,
                    end_line: node.end_position().row as u32 + 1,
                });
            }

            let children: Vec<Node> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }

        index.statements.sort_by_key(|s| (s.line, s.column));
        index.comments.sort_by_key(|c| (c.line, c.column));
        Ok(index)
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }
}

fn to_line_col(lines: &[&str], point: Point) -> (u32, u32) {
    let text = lines.get(point.row).copied().unwrap_or_default();
    let column = byte_to_char_column(text, point.column) as u32 + 1;
    (point.row as u32 + 1, column)
}

fn first_error(node: &Node) -> Option<Point> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position());
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .iter()
        .filter(|child| child.has_error() || child.is_missing())
        .find_map(first_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "package main

import \"fmt\"

func run() error {
\tx, err := load() // veneer:e0
\tif err != nil {
\t\treturn err
\t}
\tfmt.Println(x)
\tdefer cleanup()
\treturn nil
}
";

    #[test]
    fn test_statements_are_classified() {
        let index = SyntaxIndex::parse(Path::new("main.go"), SAMPLE).unwrap();
        let kinds: Vec<(u32, StatementKind)> = index
            .statements()
            .iter()
            .map(|s| (s.line, s.kind))
            .collect();

        assert!(kinds.contains(&(6, StatementKind::Assignment)));
        assert!(kinds.contains(&(7, StatementKind::Other)));
        assert!(kinds.contains(&(8, StatementKind::Other)));
        assert!(kinds.contains(&(10, StatementKind::Expression)));
        assert!(kinds.contains(&(11, StatementKind::Other)));
    }

    #[test]
    fn test_statement_columns_are_one_based_chars() {
        let index = SyntaxIndex::parse(Path::new("main.go"), SAMPLE).unwrap();
        let assign = index
            .statements()
            .iter()
            .find(|s| s.kind == StatementKind::Assignment)
            .unwrap();
        assert_eq!((assign.line, assign.column), (6, 2));
        let if_stmt = index.statements().iter().find(|s| s.line == 7).unwrap();
        assert_eq!(if_stmt.end_line, 9);
    }

    #[test]
    fn test_comments_are_collected() {
        let index = SyntaxIndex::parse(Path::new("main.go"), SAMPLE).unwrap();
        assert_eq!(index.comments().len(), 1);
        let comment = &index.comments()[0];
        assert_eq!(comment.line, 6);
        assert_eq!(comment.text, "// veneer:e0");
    }

    #[test]
    fn test_syntax_error_fails() {
        let err = SyntaxIndex::parse(Path::new("bad.go"), "package main\n\nfunc (\n").unwrap_err();
        match err {
            SourceMapError::GeneratedParse { path, line, .. } => {
                assert_eq!(path, Path::new("bad.go"));
                assert!(line >= 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
