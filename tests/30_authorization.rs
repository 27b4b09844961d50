mod common;

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    middleware, routing::get, Router,
};
use tower::ServiceExt;

use marquee_api::database::models::{Identity, MOVIES_READ, MOVIES_WRITE};
use marquee_api::middleware::{authenticate, require_activated, require_authenticated};

#[tokio::test]
async fn anonymous_requests_need_authentication() -> Result<()> {
    let app = common::spawn_app();

    let res = app.request(Method::GET, "/v1/movies/1", None, None).await?;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        res.body["message"],
        "you must be authenticated to access this resource"
    );
    assert!(res.vary().contains(&"Authorization".to_string()));
    Ok(())
}

#[tokio::test]
async fn malformed_authorization_header_is_rejected() -> Result<()> {
    let app = common::spawn_app();
    let peer = "127.0.0.1:40100".parse()?;

    for value in ["Token abc", "Bearer", "Bearer a b", "bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ"] {
        let request = Request::builder()
            .uri("/v1/healthcheck")
            .header(header::AUTHORIZATION, value)
            .body(Body::empty())?;
        let res = app.send_from(request, peer).await?;

        assert_eq!(res.status, StatusCode::UNAUTHORIZED, "{value}");
        assert_eq!(res.headers[header::WWW_AUTHENTICATE], "Bearer");
        assert_eq!(res.body["message"], "invalid or missing authentication token");
        assert!(res.vary().contains(&"Authorization".to_string()));
    }
    Ok(())
}

#[tokio::test]
async fn unknown_or_badly_shaped_token_is_rejected() -> Result<()> {
    let app = common::spawn_app();

    // Well formed but never issued
    let res = app
        .request(Method::GET, "/v1/healthcheck", Some("ABCDEFGHIJKLMNOPQRSTUVWXYZ"), None)
        .await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers[header::WWW_AUTHENTICATE], "Bearer");

    // Lowercase is outside the token alphabet
    let res = app
        .request(Method::GET, "/v1/healthcheck", Some("abcdefghijklmnopqrstuvwxyz"), None)
        .await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn inactive_account_is_forbidden() -> Result<()> {
    let app = common::spawn_app();
    let (_, token) = app
        .seed_user("inactive@example.com", false, &[MOVIES_READ])
        .await?;

    let res = app.request(Method::GET, "/v1/movies", Some(&token), None).await?;

    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(
        res.body["message"],
        "your user account must be activated to access this resource"
    );
    Ok(())
}

#[tokio::test]
async fn missing_permission_is_forbidden() -> Result<()> {
    let app = common::spawn_app();
    let (_, token) = app
        .seed_user("reader@example.com", true, &[MOVIES_READ])
        .await?;

    let res = app.request(Method::GET, "/v1/movies", Some(&token), None).await?;
    assert_eq!(res.status, StatusCode::OK);

    let res = app
        .request(
            Method::POST,
            "/v1/movies",
            Some(&token),
            Some(serde_json::json!({"title": "Up", "year": 2009, "runtime": 96, "genres": ["animation"]})),
        )
        .await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(
        res.body["message"],
        "your user account doesn't have the necessary permissions to access this resource"
    );
    Ok(())
}

#[tokio::test]
async fn permission_changes_apply_on_next_request() -> Result<()> {
    let app = common::spawn_app();
    let (user, token) = app
        .seed_user("promoted@example.com", true, &[MOVIES_READ])
        .await?;

    let res = app.request(Method::DELETE, "/v1/movies/1", Some(&token), None).await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    app.state
        .models
        .permissions
        .add_for_user(user.id, &[MOVIES_WRITE])
        .await?;

    let res = app.request(Method::DELETE, "/v1/movies/1", Some(&token), None).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    Ok(())
}

async fn whoami(identity: Identity) -> String {
    match identity.user() {
        Some(user) => user.email.clone(),
        None => "anonymous".to_string(),
    }
}

#[tokio::test]
async fn composable_gates_on_custom_routes() -> Result<()> {
    let app = common::spawn_app();
    let (_, active) = app.seed_user("active@example.com", true, &[]).await?;
    let (_, inactive) = app.seed_user("pending@example.com", false, &[]).await?;

    let router = Router::new()
        .route(
            "/authenticated",
            get(whoami).route_layer(middleware::from_fn(require_authenticated)),
        )
        .route(
            "/activated",
            get(whoami).route_layer(middleware::from_fn(require_activated)),
        )
        .route("/open", get(whoami))
        .layer(middleware::from_fn_with_state(app.state.clone(), authenticate));

    let call = |uri: &'static str, token: Option<String>| {
        let router = router.clone();
        async move {
            let mut builder = Request::builder().uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let response = router.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
            let status = response.status();
            let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, String::from_utf8_lossy(&body).to_string())
        }
    };

    let (status, body) = call("/open", None).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "anonymous"));

    assert_eq!(call("/authenticated", None).await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(call("/activated", None).await.0, StatusCode::UNAUTHORIZED);

    let (status, body) = call("/authenticated", Some(inactive.clone())).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "pending@example.com"));
    assert_eq!(call("/activated", Some(inactive)).await.0, StatusCode::FORBIDDEN);

    let (status, body) = call("/activated", Some(active)).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "active@example.com"));
    Ok(())
}
