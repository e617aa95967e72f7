//! Recursive-descent parser producing an arena [`Ast`].
//!
//! Built-in tags are `if`/`elif`/`else`/`endif` and `for`/`endfor`. Any other
//! tag name is looked up in the [`ExtensionRegistry`]; extensions drive the
//! parser through its public methods to read arguments and bodies.
//!
//! Nested blocks, parenthesised expressions and access chains all count
//! towards one nesting depth. Past [`CompileOptions::max_nesting_depth`]
//! parsing stops with a [`CompileError`].
//!
//! [`CompileOptions::max_nesting_depth`]: super::CompileOptions::max_nesting_depth

use serde_json::{Number, Value};

use super::ast::{Ast, Branch, Location, NodeId, NodeKind};
use super::error::CompileError;
use super::extension::ExtensionRegistry;
use super::lexer::{Token, TokenKind};
use crate::constants::{MAX_NESTING_DEPTH, is_reserved};

/// Result of parsing a block body up to one of its terminating tags.
#[derive(Debug)]
pub struct Body {
    pub nodes: Vec<NodeId>,
    /// Name of the tag that ended the body
    pub end_tag: String,
    /// Byte offset of the `{%` that opened the terminating tag
    pub end_offset: usize,
}

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    ast: Ast,
    registry: &'a ExtensionRegistry,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    #[must_use]
    pub fn new(source: &'a str, tokens: Vec<Token>, registry: &'a ExtensionRegistry) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            ast: Ast::new(),
            registry,
            depth: 0,
            max_depth: MAX_NESTING_DEPTH,
        }
    }

    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn parse(mut self) -> Result<Ast, CompileError> {
        let children = self.parse_nodes(&[])?.map_or_else(Vec::new, |body| body.nodes);
        let root = self.ast.push(
            NodeKind::Root {
                children,
            },
            Location::default(),
        );
        self.ast.set_root(root);
        Ok(self.ast)
    }

    #[must_use]
    pub fn source(&self) -> &'a str {
        self.source
    }

    #[must_use]
    pub fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    pub fn next_token(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub fn push(&mut self, kind: NodeKind, location: Location) -> NodeId {
        self.ast.push(kind, location)
    }

    fn descend(&mut self, location: Location) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(CompileError::new("Max depth reached", location));
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn expect_block_end(&mut self) -> Result<Token, CompileError> {
        let token = self.next_token();
        if token.kind == TokenKind::BlockEnd {
            Ok(token)
        } else {
            Err(CompileError::new(
                format!("Expected a block end, but got {}", token.kind.describe()),
                token.location,
            ))
        }
    }

    /// Parse template content until one of `end_tags` is reached.
    ///
    /// The terminating tag name is consumed, its closing `%}` is not.
    /// `opening` names the block being parsed for the "unclosed" error.
    pub fn parse_body(
        &mut self,
        end_tags: &[&str],
        opening: (&str, Location),
    ) -> Result<Body, CompileError> {
        self.descend(opening.1)?;
        let body = self.parse_nodes(end_tags)?;
        self.ascend();
        body.ok_or_else(|| {
            CompileError::new(
                format!(
                    "Unclosed \"{}\" block, expected {}",
                    opening.0,
                    end_tags.iter().map(|t| format!("\"{t}\"")).collect::<Vec<_>>().join(" or ")
                ),
                opening.1,
            )
        })
    }

    /// Returns `None` when the end of input is reached before any end tag.
    fn parse_nodes(&mut self, end_tags: &[&str]) -> Result<Option<Body>, CompileError> {
        let mut nodes = Vec::new();
        loop {
            let token = self.next_token();
            match token.kind {
                TokenKind::Eof => {
                    if end_tags.is_empty() {
                        return Ok(Some(Body {
                            nodes,
                            end_tag: String::new(),
                            end_offset: token.offset,
                        }));
                    }
                    return Ok(None);
                }
                TokenKind::Text(text) => {
                    nodes.push(self.ast.push(NodeKind::Text(text), token.location));
                }
                TokenKind::VariableStart => {
                    let expr = self.parse_expression()?;
                    let end = self.next_token();
                    if end.kind != TokenKind::VariableEnd {
                        return Err(CompileError::new(
                            format!("Expected a variable end, but got {}", end.kind.describe()),
                            end.location,
                        ));
                    }
                    nodes.push(self.ast.push(
                        NodeKind::Output {
                            expr,
                        },
                        token.location,
                    ));
                }
                TokenKind::BlockStart => {
                    let tag = self.next_token();
                    let TokenKind::Symbol(name) = &tag.kind else {
                        return Err(CompileError::new(
                            format!("Expected a block tag, but got {}", tag.kind.describe()),
                            tag.location,
                        ));
                    };
                    if end_tags.contains(&name.as_str()) {
                        return Ok(Some(Body {
                            nodes,
                            end_tag: name.clone(),
                            end_offset: token.offset,
                        }));
                    }
                    let node = match name.as_str() {
                        "if" => self.parse_if(&tag)?,
                        "for" => self.parse_for(&tag)?,
                        other => match self.registry.tag(other) {
                            Some(extension) => extension.parse(self, &tag)?,
                            None if other.starts_with("end") || other == "else" || other == "elif" => {
                                return Err(CompileError::new(
                                    format!("Unexpected block tag \"{other}\""),
                                    tag.location,
                                ));
                            }
                            None => {
                                return Err(CompileError::new(
                                    format!("Unknown block tag \"{other}\""),
                                    tag.location,
                                ));
                            }
                        },
                    };
                    nodes.push(node);
                }
                other => {
                    return Err(CompileError::new(
                        format!("Unexpected {}", other.describe()),
                        token.location,
                    ));
                }
            }
        }
    }

    fn parse_if(&mut self, tag: &Token) -> Result<NodeId, CompileError> {
        let mut branches = Vec::new();
        let mut otherwise = None;
        let mut condition = self.parse_expression()?;
        self.expect_block_end()?;
        loop {
            let body = self.parse_body(&["elif", "else", "endif"], ("if", tag.location))?;
            branches.push(Branch {
                condition,
                body: body.nodes,
            });
            match body.end_tag.as_str() {
                "elif" => {
                    condition = self.parse_expression()?;
                    self.expect_block_end()?;
                }
                "else" => {
                    self.expect_block_end()?;
                    let body = self.parse_body(&["endif"], ("if", tag.location))?;
                    otherwise = Some(body.nodes);
                    self.expect_block_end()?;
                    break;
                }
                _ => {
                    self.expect_block_end()?;
                    break;
                }
            }
        }
        Ok(self.ast.push(
            NodeKind::If {
                branches,
                otherwise,
            },
            tag.location,
        ))
    }

    fn parse_for(&mut self, tag: &Token) -> Result<NodeId, CompileError> {
        let binding_token = self.next_token();
        let TokenKind::Symbol(binding) = binding_token.kind else {
            return Err(CompileError::new(
                format!("Expected a loop variable, but got {}", binding_token.kind.describe()),
                binding_token.location,
            ));
        };
        check_not_reserved(&binding, binding_token.location)?;

        let keyword = self.next_token();
        if keyword.kind != TokenKind::Symbol("in".to_string()) {
            return Err(CompileError::new(
                format!("Expected \"in\", but got {}", keyword.kind.describe()),
                keyword.location,
            ));
        }
        let iterable = self.parse_expression()?;
        self.expect_block_end()?;
        let body = self.parse_body(&["endfor"], ("for", tag.location))?;
        self.expect_block_end()?;
        Ok(self.ast.push(
            NodeKind::For {
                binding,
                iterable,
                body: body.nodes,
            },
            tag.location,
        ))
    }

    pub fn parse_expression(&mut self) -> Result<NodeId, CompileError> {
        let start = self.peek().location;
        self.descend(start)?;
        let expr = self.parse_or()?;
        self.ascend();
        Ok(expr)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Symbol(s) if s == keyword)
    }

    fn parse_or(&mut self) -> Result<NodeId, CompileError> {
        let mut lhs = self.parse_and()?;
        while self.is_keyword("or") {
            self.next_token();
            let rhs = self.parse_and()?;
            let location = self.ast.location(lhs);
            lhs = self.ast.push(NodeKind::Or(lhs, rhs), location);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<NodeId, CompileError> {
        let mut lhs = self.parse_not()?;
        while self.is_keyword("and") {
            self.next_token();
            let rhs = self.parse_not()?;
            let location = self.ast.location(lhs);
            lhs = self.ast.push(NodeKind::And(lhs, rhs), location);
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<NodeId, CompileError> {
        if self.is_keyword("not") {
            let token = self.next_token();
            self.descend(token.location)?;
            let operand = self.parse_not()?;
            self.ascend();
            return Ok(self.ast.push(NodeKind::Not(operand), token.location));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<NodeId, CompileError> {
        let lhs = self.parse_postfix()?;
        if let TokenKind::Compare(op) = self.peek().kind {
            self.next_token();
            let rhs = self.parse_postfix()?;
            if let TokenKind::Compare(next) = self.peek().kind {
                return Err(CompileError::new(
                    format!("Comparisons cannot be chained, found \"{}\"", next.symbol()),
                    self.peek().location,
                ));
            }
            let location = self.ast.location(lhs);
            return Ok(self.ast.push(
                NodeKind::Compare {
                    op,
                    lhs,
                    rhs,
                },
                location,
            ));
        }
        Ok(lhs)
    }

    /// Member access, indexing and calls. Chain nodes take the location of
    /// the chain's first token so every reference reports where it starts.
    fn parse_postfix(&mut self) -> Result<NodeId, CompileError> {
        let mut node = self.parse_primary()?;
        let location = self.ast.location(node);
        let entered = self.depth;
        loop {
            match self.peek().kind {
                TokenKind::Dot | TokenKind::LeftBracket | TokenKind::LeftParen => {
                    let step = self.peek().location;
                    self.descend(step)?;
                }
                _ => {
                    self.depth = entered;
                    return Ok(node);
                }
            }
            match self.next_token().kind {
                TokenKind::Dot => {
                    let name = self.next_token();
                    let TokenKind::Symbol(field) = name.kind else {
                        return Err(CompileError::new(
                            format!("Expected a symbol, but got {}", name.kind.describe()),
                            name.location,
                        ));
                    };
                    let key = self.ast.push(NodeKind::Literal(Value::String(field)), name.location);
                    node = self.ast.push(
                        NodeKind::Lookup {
                            target: node,
                            key,
                        },
                        location,
                    );
                }
                TokenKind::LeftBracket => {
                    let key = self.parse_expression()?;
                    self.expect(&TokenKind::RightBracket)?;
                    node = self.ast.push(
                        NodeKind::Lookup {
                            target: node,
                            key,
                        },
                        location,
                    );
                }
                _ => {
                    let args = self.parse_list(&TokenKind::RightParen)?;
                    node = self.ast.push(
                        NodeKind::Call {
                            callee: node,
                            args,
                        },
                        location,
                    );
                }
            }
        }
    }

    fn parse_primary(&mut self) -> Result<NodeId, CompileError> {
        let token = self.next_token();
        let kind = match token.kind {
            TokenKind::Symbol(name) => match name.as_str() {
                "true" => NodeKind::Literal(Value::Bool(true)),
                "false" => NodeKind::Literal(Value::Bool(false)),
                "none" => NodeKind::Literal(Value::Null),
                _ => NodeKind::Symbol(name),
            },
            TokenKind::Str(value) => NodeKind::Literal(Value::String(value)),
            TokenKind::Int(value) => NodeKind::Literal(Value::Number(value.into())),
            TokenKind::Float(value) => {
                NodeKind::Literal(Number::from_f64(value).map_or(Value::Null, Value::Number))
            }
            TokenKind::LeftParen => {
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RightParen)?;
                return Ok(inner);
            }
            TokenKind::LeftBracket => NodeKind::List(self.parse_list(&TokenKind::RightBracket)?),
            other => {
                return Err(CompileError::new(
                    format!("Unexpected {} in expression", other.describe()),
                    token.location,
                ));
            }
        };
        Ok(self.ast.push(kind, token.location))
    }

    /// Comma separated expressions; the opening delimiter is already consumed.
    fn parse_list(&mut self, close: &TokenKind) -> Result<Vec<NodeId>, CompileError> {
        let mut items = Vec::new();
        if &self.peek().kind == close {
            self.next_token();
            return Ok(items);
        }
        loop {
            items.push(self.parse_expression()?);
            let token = self.next_token();
            if &token.kind == close {
                return Ok(items);
            }
            if token.kind != TokenKind::Comma {
                return Err(CompileError::new(
                    format!("Expected a comma or {}, but got {}", close.describe(), token.kind.describe()),
                    token.location,
                ));
            }
        }
    }

    fn expect(&mut self, expected: &TokenKind) -> Result<Token, CompileError> {
        let token = self.next_token();
        if &token.kind == expected {
            Ok(token)
        } else {
            Err(CompileError::new(
                format!("Expected a {}, but got {}", expected.describe(), token.kind.describe()),
                token.location,
            ))
        }
    }
}

/// Reject declarations that would shadow an engine binding.
pub fn check_not_reserved(name: &str, location: Location) -> Result<(), CompileError> {
    if is_reserved(name) {
        return Err(CompileError::new(
            format!("\"{name}\" is a reserved identifier and cannot be redeclared"),
            location,
        ));
    }
    Ok(())
}
