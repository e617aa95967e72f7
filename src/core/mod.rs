//! Core types shared by the CLI layers.
//!
//! Currently this is the application error type and the user-facing error
//! reporting built on it. See [`error`] for details.

pub mod error;

pub use error::{ErrorContext, SqlweaveError, user_friendly_error};
