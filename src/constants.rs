//! Reserved identifiers and limits shared by the compiler and the execution engine.
//!
//! The binding names below are injected into every rendering scope by the
//! engine. Templates cannot redeclare them, so a builder or loop variable can
//! never shadow caller input.

/// Root binding for caller-supplied parameters (`{{ params.userId }}`).
pub const PARAMS_BINDING: &str = "params";

/// Root binding for execution metadata: the caller identity
/// (`{{ context.user.name }}`) and the active profile (`{{ context.profile }}`).
pub const CONTEXT_BINDING: &str = "context";

/// Keyword marking a builder block as the primary result (`{% req users main %}`).
pub const MAIN_KEYWORD: &str = "main";

/// Identifiers template authors may not declare.
pub const RESERVED_IDENTIFIERS: [&str; 3] = [PARAMS_BINDING, CONTEXT_BINDING, MAIN_KEYWORD];

/// Opening tag of a builder block.
pub const BUILDER_TAG: &str = "req";

/// Closing tag of a builder block.
pub const BUILDER_END_TAG: &str = "endreq";

/// Default bound on access-chain length walked by the parameter resolver.
pub const REFERENCE_SEARCH_MAX_DEPTH: usize = 100;

/// Default bound on nested blocks, parentheses and access chains in a template.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Metadata key under which grouped parameter references are stored.
pub const PARAMETER_METADATA_NAME: &str = "parameters";

/// Metadata key under which builder declarations are stored.
pub const BUILDER_METADATA_NAME: &str = "builders";

/// Prefix of generated positional tokens (`$1`, `$2`, ...).
pub const TOKEN_PREFIX: char = '$';

/// Data profile used when the execution context does not name one.
pub const DEFAULT_PROFILE: &str = "default";

/// Configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "sqlweave.toml";

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV_VAR: &str = "SQLWEAVE_CONFIG";

/// Returns true when `name` is one of [`RESERVED_IDENTIFIERS`].
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_IDENTIFIERS.contains(&name)
}
