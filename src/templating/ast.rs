//! Arena-allocated abstract syntax tree for templates.
//!
//! Nodes are stored in a flat `Vec` and refer to each other by [`NodeId`].
//! The tree is immutable once the parser hands it over, which lets a compiled
//! template be shared across concurrent executions without locking.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 0-based line/column position in the template source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Index of a node inside an [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        }
    }
}

/// One `if`/`elif` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: NodeId,
    pub body: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root {
        children: Vec<NodeId>,
    },
    Text(String),
    Output {
        expr: NodeId,
    },
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<NodeId>>,
    },
    For {
        binding: String,
        iterable: NodeId,
        body: Vec<NodeId>,
    },
    /// Builder construction node produced by the `req` tag extension.
    Builder {
        name: String,
        main: bool,
        body: Vec<NodeId>,
        source_text: String,
    },
    Symbol(String),
    Literal(Value),
    List(Vec<NodeId>),
    /// Member or index access: `target.key` / `target[key]`.
    Lookup {
        target: NodeId,
        key: NodeId,
    },
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    Compare {
        op: CompareOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    And(NodeId, NodeId),
    Or(NodeId, NodeId),
    Not(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub location: Location,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ast {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Ast {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: NodeKind, location: Location) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            location,
        });
        id
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    /// The root node. An empty arena reports the first slot, which callers
    /// never reach because the parser always pushes a root.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root.unwrap_or(NodeId(0))
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[must_use]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    #[must_use]
    pub fn location(&self, id: NodeId) -> Location {
        self.node(id).location
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct children of a node in lexical order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match self.kind(id) {
            NodeKind::Root {
                children,
            } => children.clone(),
            NodeKind::Text(_) | NodeKind::Symbol(_) | NodeKind::Literal(_) => Vec::new(),
            NodeKind::Output {
                expr,
            } => vec![*expr],
            NodeKind::If {
                branches,
                otherwise,
            } => {
                let mut out = Vec::new();
                for branch in branches {
                    out.push(branch.condition);
                    out.extend(&branch.body);
                }
                if let Some(otherwise) = otherwise {
                    out.extend(otherwise);
                }
                out
            }
            NodeKind::For {
                iterable,
                body,
                ..
            } => std::iter::once(*iterable).chain(body.iter().copied()).collect(),
            NodeKind::Builder {
                body,
                ..
            } => body.clone(),
            NodeKind::List(items) => items.clone(),
            NodeKind::Lookup {
                target,
                key,
            } => vec![*target, *key],
            NodeKind::Call {
                callee,
                args,
            } => std::iter::once(*callee).chain(args.iter().copied()).collect(),
            NodeKind::Compare {
                lhs,
                rhs,
                ..
            } => vec![*lhs, *rhs],
            NodeKind::And(lhs, rhs) | NodeKind::Or(lhs, rhs) => vec![*lhs, *rhs],
            NodeKind::Not(operand) => vec![*operand],
        }
    }

    /// Pre-order traversal from the root, following lexical order.
    #[must_use]
    pub fn walk(&self) -> Walk<'_> {
        let stack = if self.nodes.is_empty() {
            Vec::new()
        } else {
            vec![self.root()]
        };
        Walk {
            ast: self,
            stack,
        }
    }
}

/// Iterator returned by [`Ast::walk`]. Uses an explicit stack, so deeply
/// nested templates do not grow the call stack.
pub struct Walk<'a> {
    ast: &'a Ast,
    stack: Vec<NodeId>,
}

impl Iterator for Walk<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        let children = self.ast.children(id);
        self.stack.extend(children.into_iter().rev());
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_walk_is_lexical_pre_order() {
        let mut ast = Ast::new();
        let at = Location::default();
        let text = ast.push(NodeKind::Text("select ".into()), at);
        let target = ast.push(NodeKind::Symbol("params".into()), at);
        let key = ast.push(NodeKind::Literal(json!("id")), at);
        let lookup = ast.push(
            NodeKind::Lookup {
                target,
                key,
            },
            at,
        );
        let output = ast.push(
            NodeKind::Output {
                expr: lookup,
            },
            at,
        );
        let root = ast.push(
            NodeKind::Root {
                children: vec![text, output],
            },
            at,
        );
        ast.set_root(root);

        let order: Vec<NodeId> = ast.walk().collect();
        assert_eq!(order, vec![root, text, output, lookup, target, key]);
    }

    #[test]
    fn test_location_display() {
        let location = Location {
            line: 1,
            column: 7,
        };
        assert_eq!(location.to_string(), "1:7");
    }
}
