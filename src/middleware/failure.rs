//! Failure Handling
//!
//! Every stage recovers its own errors: the error is published to the
//! request scope and the request is handed to a failure service.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::convert::Infallible;
use std::future::{ready, Ready};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Service, ServiceExt};

use crate::context;
use crate::error::OAuth2Error;
use crate::telemetry::HandshakeMetrics;

/// Body of the default failure response.
pub const DEFAULT_FAILURE_BODY: &str = "Internal Server Error, Unauthorized";

/// Failure service used when the caller supplies none.
///
/// Responds 500 with a fixed body; the error itself is only logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFailureHandler;

impl Service<Request> for DefaultFailureHandler {
    type Response = Response;
    type Error = Infallible;
    type Future = Ready<Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        if let Some(error) = context::error_from(req.extensions()) {
            tracing::debug!(kind = %error.kind(), "default failure handler: {error}");
        }
        ready(Ok(
            (StatusCode::INTERNAL_SERVER_ERROR, DEFAULT_FAILURE_BODY).into_response()
        ))
    }
}

/// Publish `error` and run the failure service.
pub(crate) async fn respond_with_failure<F>(
    failure: F,
    mut req: Request,
    error: OAuth2Error,
    stage: &'static str,
    metrics: &Arc<dyn HandshakeMetrics>,
) -> Response
where
    F: Service<Request, Response = Response, Error = Infallible>,
{
    let kind = error.kind();
    metrics.record_failure(stage, kind);
    tracing::warn!(stage, kind = %kind, code = error.error_code(), "login handshake failed: {error}");

    context::with_error(req.extensions_mut(), error);
    match failure.oneshot(req).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CallbackError, ErrorKind};
    use crate::telemetry::InMemoryMetrics;
    use axum::body::{to_bytes, Body};

    #[tokio::test]
    async fn test_default_failure_handler() {
        let response = DefaultFailureHandler
            .oneshot(Request::new(Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], DEFAULT_FAILURE_BODY.as_bytes());
    }

    #[tokio::test]
    async fn test_respond_with_failure_publishes_error() {
        let memory = Arc::new(InMemoryMetrics::new());
        let metrics: Arc<dyn HandshakeMetrics> = memory.clone();

        let failure = tower::service_fn(|req: Request| async move {
            let kind = context::error_from(req.extensions()).map(|e| e.kind());
            assert_eq!(kind, Some(ErrorKind::InvalidState));
            Ok::<_, Infallible>(StatusCode::FORBIDDEN.into_response())
        });

        let response = respond_with_failure(
            failure,
            Request::new(Body::empty()),
            CallbackError::InvalidState.into(),
            "callback",
            &metrics,
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(memory.count("oauth2_failures_total"), 1);
    }
}
