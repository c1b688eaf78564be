//! Authentication collaborator boundary.
//!
//! The core only needs a bearer credential at connect time; how the token
//! is obtained, refreshed, or stored is the caller's concern.

/// Supplies the bearer credential attached to the transport handshake.
///
/// Returning `None` means connecting without credentials; whether the
/// server accepts that is its own policy.
pub trait TokenProvider: Send + Sync + 'static {
    fn token(&self) -> Option<String>;
}

/// A fixed token, convenient for tests and short-lived CLI tools.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// No credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToken;

impl TokenProvider for NoToken {
    fn token(&self) -> Option<String> {
        None
    }
}
