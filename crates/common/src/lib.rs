//! Shared types for the WeCom notification workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
