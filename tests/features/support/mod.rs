//! Cucumber test support


pub use world::*;
