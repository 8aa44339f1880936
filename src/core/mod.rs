//! Core types shared across the workflow.

pub mod error;

pub use error::{BlobupError, ErrorContext, user_friendly_error};
