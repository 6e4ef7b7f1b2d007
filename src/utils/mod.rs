//! Shared utilities

pub mod error;
pub mod validation;

pub use error::{
    CredentialError, DelegationFailure, DelegationResult, ErrorScope, LibraryError, SigningError,
    StatusCode,
};
