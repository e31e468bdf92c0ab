mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{bearer, json_body, send, test_app, token_for};

#[tokio::test]
async fn security_metrics_requires_session() {
    let res = send(
        test_app(),
        Request::get("/api/analytics/security-metrics").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(json_body(res).await["error"].is_string());
}

#[tokio::test]
async fn security_metrics_rejects_non_admins() {
    for role in ["user", "service_user"] {
        let res = send(test_app(), bearer("GET", "/api/analytics/security-metrics?days=30", role)).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN, "{role}");
        assert_eq!(json_body(res).await["error"], "Only admins can view security metrics");
    }
}

#[tokio::test]
async fn session_cookie_is_accepted_by_the_gate() {
    let req = Request::get("/api/analytics/security-metrics")
        .header(header::COOKIE, format!("theme=dark; cagpu_session={}", token_for("user")))
        .body(Body::empty())
        .unwrap();
    // Authenticated through the cookie, then stopped by the role check.
    assert_eq!(send(test_app(), req).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_days_is_a_bad_request() {
    let res = send(test_app(), bearer("GET", "/api/analytics/security-metrics?days=lots", "admin")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(res).await["error"].is_string());
}
