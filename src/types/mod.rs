//! OAuth2 Login Types
//!
//! Data types shared by the handshake stages.

pub mod callback;
pub mod config;
pub mod cookie;
pub mod state;
pub mod token;

pub use callback::*;
pub use config::*;
pub use cookie::*;
pub use state::*;
pub use token::*;
