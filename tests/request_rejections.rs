mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{bearer, json_body, send, test_app};

fn login_request(body: &str) -> Request<Body> {
    Request::post("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn missing_body_field_is_a_json_bad_request() {
    let res = send(test_app(), login_request(r#"{"username": "jdoe"}"#)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
    let body = json_body(res).await;
    assert!(body["error"].as_str().unwrap().contains("password"));
}

#[tokio::test]
async fn malformed_json_is_a_json_bad_request() {
    let res = send(test_app(), login_request(r#"{"username": "jdoe", "#)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(res).await["error"].is_string());
}

#[tokio::test]
async fn wrong_content_type_is_a_json_bad_request() {
    let req = Request::post("/api/auth/login")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(r#"{"username": "jdoe", "password": "x"}"#))
        .unwrap();
    let res = send(test_app(), req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(res).await["error"].is_string());
}

#[tokio::test]
async fn non_numeric_id_is_a_json_bad_request() {
    let res = send(test_app(), bearer("GET", "/api/services/abc", "user")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(res).await["error"].is_string());
}

#[tokio::test]
async fn malformed_filter_is_a_json_bad_request() {
    let res = send(test_app(), bearer("GET", "/api/services?is_active=maybe", "user")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(res).await["error"].is_string());
}

#[tokio::test]
async fn unknown_route_is_a_json_not_found() {
    let res = send(test_app(), Request::get("/nope").body(Body::empty()).unwrap()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(res).await["error"], "Route not found");
}

#[tokio::test]
async fn admins_cannot_delete_themselves() {
    // Tokens from `bearer` carry user id 7.
    let res = send(test_app(), bearer("DELETE", "/api/users/7", "admin")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "You cannot delete your own account");
}
