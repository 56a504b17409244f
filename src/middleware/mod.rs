//! Handshake Stages
//!
//! Tower services composing the login handshake:
//!
//! - [`CsrfLayer`]: issue or reuse the correlation value and set the state cookie
//! - [`LoginService`]: redirect to the provider's authorization endpoint
//! - [`CallbackLayer`]: validate the redirect back and exchange the code
//!
//! Each stage recovers its own failures through a failure service that reads
//! the error with [`LoginError`](crate::context::LoginError).

mod callback;
mod csrf;
mod failure;
mod login;

pub use callback::{CallbackLayer, CallbackService, MAX_CALLBACK_FORM_BYTES};
pub use csrf::{CsrfLayer, CsrfService, StateMode};
pub use failure::{DefaultFailureHandler, DEFAULT_FAILURE_BODY};
pub use login::LoginService;

pub(crate) use failure::respond_with_failure;

/// Boxed future returned by the stage services.
pub type BoxFuture<T> = futures::future::BoxFuture<'static, T>;
