//! Adapter error types.

/// Errors crossing the adapter boundary.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("login failed: {0}")]
    Login(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("order form error: {0}")]
    Form(String),

    #[error("submission error: {0}")]
    Submit(String),
}
