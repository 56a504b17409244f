//! OAuth2 Core Components
//!
//! Core infrastructure for the login handshake.

pub mod cookie;
pub mod discovery;
pub mod state;
pub mod transport;

pub use discovery::*;
pub use state::*;
pub use transport::*;
