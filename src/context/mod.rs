//! Request Scope
//!
//! Typed values passed forward between handshake stages through
//! `http::Extensions`. Each value lives exactly as long as its request.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use http::Extensions;
use std::convert::Infallible;
use std::sync::Arc;

use crate::error::{ContextError, OAuth2Error};
use crate::types::TokenResponse;

// Private keys; nothing outside this module can shadow or forge a slot.
#[derive(Clone)]
struct StateSlot(String);

#[derive(Clone)]
struct TokenSlot(TokenResponse);

#[derive(Clone)]
struct UserSlot<U>(U);

#[derive(Clone)]
struct ErrorSlot(Arc<OAuth2Error>);

/// Publish the correlation state.
pub fn with_state(extensions: &mut Extensions, state: impl Into<String>) {
    extensions.insert(StateSlot(state.into()));
}

/// Read the correlation state.
pub fn state_from(extensions: &Extensions) -> Result<&str, OAuth2Error> {
    extensions
        .get::<StateSlot>()
        .map(|slot| slot.0.as_str())
        .ok_or(ContextError::MissingState.into())
}

/// Publish the token obtained by the callback stage.
pub fn with_token(extensions: &mut Extensions, token: TokenResponse) {
    extensions.insert(TokenSlot(token));
}

/// Read the token.
pub fn token_from(extensions: &Extensions) -> Result<&TokenResponse, OAuth2Error> {
    extensions
        .get::<TokenSlot>()
        .map(|slot| &slot.0)
        .ok_or(ContextError::MissingToken.into())
}

/// Publish the provider user.
pub fn with_user<U>(extensions: &mut Extensions, user: U)
where
    U: Clone + Send + Sync + 'static,
{
    extensions.insert(UserSlot(user));
}

/// Read the provider user.
pub fn user_from<U>(extensions: &Extensions) -> Result<&U, OAuth2Error>
where
    U: Clone + Send + Sync + 'static,
{
    extensions
        .get::<UserSlot<U>>()
        .map(|slot| &slot.0)
        .ok_or(ContextError::MissingUser.into())
}

/// Publish the error that sent the request to a failure handler.
pub fn with_error(extensions: &mut Extensions, error: OAuth2Error) {
    extensions.insert(ErrorSlot(Arc::new(error)));
}

/// Read the error handed to a failure handler.
pub fn error_from(extensions: &Extensions) -> Option<Arc<OAuth2Error>> {
    extensions.get::<ErrorSlot>().map(|slot| slot.0.clone())
}

/// Rejection for extractors whose slot is empty: the stage that fills it was
/// not applied to the route.
#[derive(Debug)]
pub struct ContextRejection(pub ContextError);

impl IntoResponse for ContextRejection {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "login stage missing from route");
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

fn rejection(error: OAuth2Error) -> ContextRejection {
    match error {
        OAuth2Error::Context(e) => ContextRejection(e),
        _ => ContextRejection(ContextError::MissingState),
    }
}

/// Extracts the correlation state.
#[derive(Clone, Debug)]
pub struct OAuth2State(pub String);

impl<S> FromRequestParts<S> for OAuth2State
where
    S: Send + Sync,
{
    type Rejection = ContextRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        state_from(&parts.extensions)
            .map(|state| Self(state.to_string()))
            .map_err(rejection)
    }
}

/// Extracts the token published by the callback stage.
#[derive(Clone, Debug)]
pub struct OAuth2Token(pub TokenResponse);

impl<S> FromRequestParts<S> for OAuth2Token
where
    S: Send + Sync,
{
    type Rejection = ContextRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        token_from(&parts.extensions)
            .map(|token| Self(token.clone()))
            .map_err(rejection)
    }
}

/// Extracts the user published by a provider stage.
#[derive(Clone, Debug)]
pub struct LoginUser<U>(pub U);

impl<S, U> FromRequestParts<S> for LoginUser<U>
where
    S: Send + Sync,
    U: Clone + Send + Sync + 'static,
{
    type Rejection = ContextRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_from::<U>(&parts.extensions)
            .map(|user| Self(user.clone()))
            .map_err(rejection)
    }
}

/// Extracts the error in a failure handler. `None` outside failure handlers.
#[derive(Clone, Debug)]
pub struct LoginError(pub Option<Arc<OAuth2Error>>);

impl<S> FromRequestParts<S> for LoginError
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(error_from(&parts.extensions)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CallbackError, ErrorKind};

    #[derive(Clone, Debug, PartialEq)]
    struct User {
        id: String,
    }

    #[test]
    fn test_slots_round_trip() {
        let mut extensions = Extensions::new();
        with_state(&mut extensions, "state-1");
        with_token(&mut extensions, TokenResponse::bearer("at"));
        with_user(&mut extensions, User { id: "u1".into() });

        assert_eq!(state_from(&extensions).unwrap(), "state-1");
        assert_eq!(token_from(&extensions).unwrap().access_token, "at");
        assert_eq!(user_from::<User>(&extensions).unwrap().id, "u1");
    }

    #[test]
    fn test_missing_slots_are_typed_errors() {
        let extensions = Extensions::new();
        assert_eq!(state_from(&extensions).unwrap_err().kind(), ErrorKind::MissingState);
        assert_eq!(token_from(&extensions).unwrap_err().kind(), ErrorKind::MissingToken);
        assert_eq!(
            user_from::<User>(&extensions).unwrap_err().kind(),
            ErrorKind::MissingUser
        );
        assert!(error_from(&extensions).is_none());
    }

    #[test]
    fn test_user_slot_is_keyed_by_type() {
        let mut extensions = Extensions::new();
        with_user(&mut extensions, "just a string".to_string());
        assert!(user_from::<User>(&extensions).is_err());
        // A bare String in extensions is not the state slot.
        extensions.insert("forged".to_string());
        assert!(state_from(&extensions).is_err());
    }

    #[test]
    fn test_error_slot_keeps_latest() {
        let mut extensions = Extensions::new();
        with_error(&mut extensions, ContextError::MissingState.into());
        with_error(&mut extensions, CallbackError::InvalidState.into());
        assert_eq!(
            error_from(&extensions).unwrap().kind(),
            ErrorKind::InvalidState
        );
    }

    #[tokio::test]
    async fn test_extractors() {
        let (mut parts, _) = http::Request::new(()).into_parts();
        with_state(&mut parts.extensions, "state-1");
        with_user(&mut parts.extensions, User { id: "u1".into() });

        let OAuth2State(state) = OAuth2State::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(state, "state-1");

        let LoginUser(user) = LoginUser::<User>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(user.id, "u1");

        let rejection = OAuth2Token::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(rejection.0, ContextError::MissingToken);
        assert_eq!(
            rejection.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let LoginError(error) = LoginError::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(error.is_none());
    }
}
