//! OAuth2 Flows
//!
//! The **Authorization Code Flow** (RFC 6749 Section 4.1) is the only grant
//! this crate drives.

pub mod authorization_code;

pub use authorization_code::{
    parse_token_response, AuthorizationCodeFlow, AuthorizationCodeFlowImpl,
};

#[cfg(test)]
pub use authorization_code::MockAuthorizationCodeFlow;
