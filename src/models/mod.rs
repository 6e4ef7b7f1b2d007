//! Data models

mod delegation;

pub use delegation::*;
