//! # burrow-core
//!
//! Domain models, error types and storage ports for the Burrow forum
//! data service. Storage backends implement the traits in [`traits`];
//! delivery layers talk to those traits only.

pub mod error;
pub mod models;
pub mod traits;

pub use error::{AppError, Result};
