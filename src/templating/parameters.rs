//! Discovery of caller-parameter references.
//!
//! For every access chain the checker walks from the outermost access back
//! to the root identifier, building a dotted path. Calls are crossed through
//! their callee. Chains rooted at `params` are recorded; everything else is
//! ignored. The walk is a bounded loop, not recursion.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::ast::{Ast, Location, NodeId, NodeKind};
use super::error::CompileError;
use super::extension::AstVisitor;
use crate::constants::{PARAMETER_METADATA_NAME, PARAMS_BINDING};

/// All occurrences of one caller parameter path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterReference {
    /// Dotted path below `params`, e.g. `user.id`
    pub name: String,
    pub locations: Vec<Location>,
}

impl ParameterReference {
    /// First path segment, the name of the request field this path reads.
    #[must_use]
    pub fn root_name(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }
}

#[derive(Debug)]
pub struct ParametersChecker {
    max_depth: usize,
    references: Vec<(String, Location)>,
    /// Inner lookups already covered by an enclosing chain
    covered: HashSet<NodeId>,
}

impl ParametersChecker {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            references: Vec::new(),
            covered: HashSet::new(),
        }
    }

    /// References grouped by path, in order of first occurrence.
    #[must_use]
    pub fn grouped(&self) -> Vec<ParameterReference> {
        let mut groups: Vec<ParameterReference> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (name, location) in &self.references {
            if let Some(&at) = index.get(name.as_str()) {
                groups[at].locations.push(*location);
            } else {
                index.insert(name, groups.len());
                groups.push(ParameterReference {
                    name: name.clone(),
                    locations: vec![*location],
                });
            }
        }
        groups
    }
}

fn segment(ast: &Ast, key: NodeId) -> String {
    match ast.kind(key) {
        NodeKind::Literal(Value::String(field)) => field.clone(),
        NodeKind::Literal(Value::Number(index)) => index.to_string(),
        _ => "*".to_string(),
    }
}

impl AstVisitor for ParametersChecker {
    fn on_visit(&mut self, ast: &Ast, node: NodeId) -> Result<(), CompileError> {
        if self.covered.contains(&node) {
            return Ok(());
        }
        let NodeKind::Lookup {
            target,
            key,
        } = ast.kind(node)
        else {
            return Ok(());
        };

        let location = ast.location(node);
        let mut name = segment(ast, *key);
        let mut parent = Some(*target);
        let mut depth = 0;
        while let Some(current) = parent {
            depth += 1;
            if depth > self.max_depth {
                return Err(CompileError::new("Max depth reached", location));
            }
            parent = match ast.kind(current) {
                NodeKind::Lookup {
                    target,
                    key,
                } => {
                    self.covered.insert(current);
                    name = format!("{}.{}", segment(ast, *key), name);
                    Some(*target)
                }
                NodeKind::Call {
                    callee,
                    ..
                } => Some(*callee),
                NodeKind::Symbol(root) => {
                    if root == PARAMS_BINDING {
                        tracing::trace!(parameter = %name, %location, "Found parameter reference");
                        self.references.push((name.clone(), location));
                    }
                    None
                }
                _ => None,
            };
        }
        Ok(())
    }

    fn metadata_name(&self) -> Option<&'static str> {
        Some(PARAMETER_METADATA_NAME)
    }

    fn metadata(&self) -> Option<Value> {
        serde_json::to_value(self.grouped()).ok()
    }
}
