//! Per-execution inputs and the positional parameter table.
//!
//! An [`ExecutionContext`] is supplied fresh for every execution and is never
//! shared between executions. A [`ParameterTable`] belongs to a single
//! builder's rendering: every caller-supplied value that reaches the output
//! is appended here and replaced in the text by its `$n` token.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::constants::TOKEN_PREFIX;

/// Identity of the caller, exposed to templates as `user`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    /// Free-form attributes such as roles or tenant ids
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl UserInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Map::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Runtime inputs for one execution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Caller parameters, exposed as `params`
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub user: Option<UserInfo>,
    /// Data profile to run against; the engine default applies when unset
    #[serde(default)]
    pub profile: Option<String>,
}

impl ExecutionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user = Some(user);
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}

/// Values bound to positional tokens, in allocation order.
///
/// Token `$n` maps to the n-th bound value. Every occurrence allocates a new
/// token, even when the same value was bound before, so the table always
/// lines up with the rendered text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterTable {
    values: Vec<Value>,
}

impl ParameterTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` and return the token to place in the query text.
    pub fn bind(&mut self, value: Value) -> String {
        self.values.push(value);
        format!("{TOKEN_PREFIX}{}", self.values.len())
    }

    /// Look up a value by its token (`"$1"`).
    #[must_use]
    pub fn get(&self, token: &str) -> Option<&Value> {
        let position: usize = token.strip_prefix(TOKEN_PREFIX)?.parse().ok()?;
        position.checked_sub(1).and_then(|index| self.values.get(index))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bound values in token order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (String, &Value)> {
        self.values.iter().enumerate().map(|(i, value)| (format!("{TOKEN_PREFIX}{}", i + 1), value))
    }
}

impl Serialize for ParameterTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (token, value) in self.iter() {
            map.serialize_entry(&token, value)?;
        }
        map.end()
    }
}
