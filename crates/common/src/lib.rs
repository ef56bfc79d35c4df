//! Common types for the credential gateway workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
