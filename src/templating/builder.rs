//! The `req` builder block.
//!
//! ```text
//! {% req userCount main %}
//! select count(*) from user where id = {{ params.userId }};
//! {% endreq %}
//! ```
//!
//! [`BuilderTag`] parses the block into a [`NodeKind::Builder`] node and
//! [`BuilderDeclarations`] checks the whole-template rules: names are unique
//! and at most one block is marked `main`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::ast::{Ast, Location, NodeId, NodeKind};
use super::error::CompileError;
use super::extension::{AstVisitor, TagExtension};
use super::lexer::{Token, TokenKind};
use super::parser::{Parser, check_not_reserved};
use crate::constants::{BUILDER_END_TAG, BUILDER_METADATA_NAME, BUILDER_TAG, MAIN_KEYWORD};

/// A builder declared in a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderDeclaration {
    pub name: String,
    pub main: bool,
    /// Position of the builder name in the source
    pub location: Location,
    /// The raw template fragment between the opening and closing tags
    pub source_text: String,
}

pub struct BuilderTag;

impl TagExtension for BuilderTag {
    fn tag(&self) -> &'static str {
        BUILDER_TAG
    }

    fn parse(&self, parser: &mut Parser<'_>, tag: &Token) -> Result<NodeId, CompileError> {
        let name_token = parser.next_token();
        let name = match name_token.kind {
            TokenKind::Symbol(name) => name,
            TokenKind::BlockEnd => {
                return Err(CompileError::new("Expected a variable", name_token.location));
            }
            other => {
                return Err(CompileError::new(
                    format!("Expected a symbol, but got {}", other.describe()),
                    name_token.location,
                ));
            }
        };
        check_not_reserved(&name, name_token.location)?;

        let main = match &parser.peek().kind {
            TokenKind::BlockEnd => false,
            TokenKind::Symbol(keyword) if keyword == MAIN_KEYWORD => true,
            other => {
                return Err(CompileError::new(
                    format!("Expected a symbol \"{MAIN_KEYWORD}\", but got {}", describe_argument(other)),
                    parser.peek().location,
                ));
            }
        };
        if main {
            parser.next_token();
        }

        let open_end = parser.expect_block_end()?;
        let body_start = open_end.offset + 2;
        let body = parser.parse_body(&[BUILDER_END_TAG], (BUILDER_TAG, tag.location))?;
        parser.expect_block_end()?;
        let source_text = parser.source()[body_start..body.end_offset].to_string();

        tracing::trace!(builder = %name, main, "Parsed builder block");
        Ok(parser.push(
            NodeKind::Builder {
                name,
                main,
                body: body.nodes,
                source_text,
            },
            name_token.location,
        ))
    }
}

fn describe_argument(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Symbol(symbol) => format!("symbol \"{symbol}\""),
        TokenKind::Str(value) => format!("string \"{value}\""),
        other => other.describe().to_string(),
    }
}

/// Collects builder declarations and enforces naming rules across the template.
#[derive(Debug, Default)]
pub struct BuilderDeclarations {
    declarations: Vec<BuilderDeclaration>,
    seen: HashMap<String, Location>,
    main: Option<Location>,
}

impl AstVisitor for BuilderDeclarations {
    fn on_visit(&mut self, ast: &Ast, node: NodeId) -> Result<(), CompileError> {
        let NodeKind::Builder {
            name,
            main,
            source_text,
            ..
        } = ast.kind(node)
        else {
            return Ok(());
        };
        let location = ast.location(node);

        if let Some(first) = self.seen.get(name) {
            return Err(CompileError::new(
                format!(
                    "We can't declare multiple builder with same name. Duplicated name: {name} (declared at {first} and {location})"
                ),
                location,
            ));
        }
        if *main {
            if self.main.is_some() {
                return Err(CompileError::new("Only one main builder is allowed.", location));
            }
            self.main = Some(location);
        }

        self.seen.insert(name.clone(), location);
        self.declarations.push(BuilderDeclaration {
            name: name.clone(),
            main: *main,
            location,
            source_text: source_text.clone(),
        });
        Ok(())
    }

    fn metadata_name(&self) -> Option<&'static str> {
        Some(BUILDER_METADATA_NAME)
    }

    fn metadata(&self) -> Option<Value> {
        serde_json::to_value(&self.declarations).ok()
    }
}
