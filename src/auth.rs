//! Credential model shared by the store, the token lifecycle, and the pipeline.

pub mod credential;
pub mod secret;

pub use credential::*;
pub use secret::*;
