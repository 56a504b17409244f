//! End-to-end login handshake against a mock provider.

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::response::Response;
use axum::Router;
use http::header::{COOKIE, LOCATION, SET_COOKIE};
use http::StatusCode;
use oauth2_login::providers::amazon::{AmazonAdapter, AmazonUser};
use oauth2_login::{
    oauth2_config, ExtendedState, LoginError, LoginUser, OAuth2Login, OAuth2Token, Transport,
};
use serde_json::json;
use tower::{Layer, ServiceExt};
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn login_for(server: &MockServer) -> OAuth2Login {
    init_tracing();
    let config = oauth2_config()
        .client_id("client-id")
        .client_secret("client-secret")
        .authorization_endpoint("https://provider.example.com/authorize")
        .token_endpoint(format!("{}/token", server.uri()))
        .redirect_uri("https://app.example.com/callback")
        .add_scope("profile")
        .build()
        .unwrap();
    OAuth2Login::new(config).unwrap()
}

fn failure() -> Router {
    Router::new().fallback(|LoginError(error): LoginError| async move {
        let kind = error.map(|e| e.kind().to_string()).unwrap_or_default();
        (StatusCode::UNAUTHORIZED, format!("failure: {kind}"))
    })
}

fn token_success() -> Router {
    Router::new().fallback(|OAuth2Token(token): OAuth2Token| async move {
        format!("token: {}", token.access_token)
    })
}

fn user_success() -> Router {
    Router::new().fallback(|LoginUser(user): LoginUser<AmazonUser>| async move {
        format!("welcome: {}", user.name)
    })
}

fn app(login: &OAuth2Login, server: &MockServer) -> Router {
    let amazon = AmazonAdapter::new(login.transport()).with_base_url(server.uri());
    Router::new()
        .route_service("/login", login.login_handler_with(failure()))
        .route_service(
            "/callback",
            login.provider_callback_handler(amazon, user_success(), failure()),
        )
}

async fn send(app: &Router, uri: &str, cookie: Option<&str>) -> Response {
    let mut request = http::Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(COOKIE, cookie);
    }
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// `name=value` pair of a Set-Cookie header.
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

fn location_state(response: &Response) -> String {
    let location = Url::parse(response.headers()[LOCATION].to_str().unwrap()).unwrap();
    location
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "at-1", "token_type": "bearer"})),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_profile(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/user/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_without_cookie_redirects_with_cookie_state() {
    let server = MockServer::start().await;
    let login = login_for(&server);
    let app = app(&login, &server);

    let response = send(&app, "/login", None).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    let state = location_state(&response);
    assert_eq!(cookie_pair(&cookies[0]), format!("oauth2-login-state={state}"));
    assert!(cookies[0].contains("HttpOnly"));
    assert!(cookies[0].contains("Secure"));

    let location = response.headers()[LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://provider.example.com/authorize?"));
    assert!(location.contains("response_type=code"));
    assert!(location.contains("client_id=client-id"));
}

#[tokio::test]
async fn login_with_cookie_reuses_its_value() {
    let server = MockServer::start().await;
    let login = login_for(&server);
    let app = app(&login, &server);

    let response = send(&app, "/login", Some("oauth2-login-state=prior-value")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(location_state(&response), "prior-value");
}

#[tokio::test]
async fn full_round_trip_publishes_user() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_profile(
        &server,
        json!({"user_id": "amzn1.account.54638001", "name": "Ivy Crimson"}),
    )
    .await;
    let login = login_for(&server);
    let app = app(&login, &server);

    let response = send(&app, "/login", None).await;
    let cookie = cookie_pair(&set_cookies(&response)[0]);
    let state = location_state(&response);

    let response = send(
        &app,
        &format!("/callback?code=abc&state={state}"),
        Some(&cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(body_string(response).await, "welcome: Ivy Crimson");
}

#[tokio::test]
async fn state_mismatch_is_invalid_state() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    let login = login_for(&server);
    let app = app(&login, &server);

    let response = send(
        &app,
        "/callback?code=abc&state=X",
        Some("oauth2-login-state=Y"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "failure: invalid_state");
}

#[tokio::test]
async fn callback_without_csrf_stage_is_missing_state() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    let login = login_for(&server);

    let service = login
        .callback_layer()
        .failure_handler(failure())
        .layer(token_success());
    let request: Request = http::Request::builder()
        .uri("/callback?code=abc&state=X")
        .body(Body::empty())
        .unwrap();
    let response = service.oneshot(request).await.unwrap();
    assert_eq!(body_string(response).await, "failure: missing_state");
}

#[tokio::test]
async fn token_endpoint_error_is_token_exchange_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    let login = login_for(&server);
    let app = Router::new().route_service(
        "/callback",
        login.callback_handler_with(token_success(), failure()),
    );

    let response = send(
        &app,
        "/callback?code=abc&state=S1",
        Some("oauth2-login-state=S1"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "failure: token_exchange_failed");
}

#[tokio::test]
async fn empty_profile_identity_is_provider_user_fetch_failed() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_profile(&server, json!({"user_id": "", "name": "Ivy Crimson"})).await;
    let login = login_for(&server);
    let app = app(&login, &server);

    let response = send(
        &app,
        "/callback?code=abc&state=S1",
        Some("oauth2-login-state=S1"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_string(response).await,
        "failure: provider_user_fetch_failed"
    );
}

#[tokio::test]
async fn missing_code_is_malformed_callback() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    let login = login_for(&server);
    let app = app(&login, &server);

    let response = send(&app, "/callback?state=S1", Some("oauth2-login-state=S1")).await;
    assert_eq!(body_string(response).await, "failure: malformed_callback");
}

#[tokio::test]
async fn default_failure_handler_hides_error() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    let login = login_for(&server);
    let app = Router::new().route_service("/callback", login.callback_handler(token_success()));

    let response = send(
        &app,
        "/callback?code=abc&state=X",
        Some("oauth2-login-state=Y"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_string(response).await,
        "Internal Server Error, Unauthorized"
    );
}

#[tokio::test]
async fn single_use_state_rejects_replayed_callback() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    let login = login_for(&server).single_use_state();
    let app = Router::new().route_service(
        "/callback",
        login.callback_handler_with(token_success(), failure()),
    );

    let first = send(
        &app,
        "/callback?code=abc&state=S1",
        Some("oauth2-login-state=S1"),
    )
    .await;
    assert_eq!(body_string(first).await, "token: at-1");

    let replay = send(
        &app,
        "/callback?code=abc&state=S1",
        Some("oauth2-login-state=S1"),
    )
    .await;
    assert_eq!(body_string(replay).await, "failure: invalid_state");
}

#[tokio::test]
async fn extended_state_carries_redirect_intent() {
    let server = MockServer::start().await;
    let login = login_for(&server).extended_state();
    let app = Router::new().route_service("/login", login.login_handler());

    let response = send(&app, "/login?redirectTo=%2Fdashboard&transport=hash", None).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let state = location_state(&response);
    assert_eq!(
        cookie_pair(&set_cookies(&response)[0]),
        format!("oauth2-login-state={state}")
    );
    let decoded = ExtendedState::decode(&state).unwrap();
    assert_eq!(decoded.redirect_to, "/dashboard");
    assert_eq!(decoded.transport, Transport::Hash);
}
