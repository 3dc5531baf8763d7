use actix_web::{dev::Payload, test, FromRequest};
use serial_test::serial;
use std::env;

use tasklist::auth::{create_jwt, Auth};

// Helper that guarantees a sufficiently long secret for tests.
fn set_secret() {
    env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
}

#[actix_web::test]
#[serial]
async fn jwt_roundtrip_ok() {
    set_secret();
    let token = create_jwt(42, "tester", "tester@example.com").expect("token");
    // The Auth extractor is the public way to validate, so use it here.
    let req = test::TestRequest::default()
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_http_request();
    let mut pl = Payload::None;
    let auth = Auth::from_request(&req, &mut pl).await.expect("extract");
    assert_eq!(auth.0.sub, "42");
    assert_eq!(auth.0.user_id(), Some(42));
    assert_eq!(auth.0.username, "tester");
    assert_eq!(auth.0.email, "tester@example.com");
}

#[actix_web::test]
#[serial]
async fn extractor_rejects_garbage_token() {
    set_secret();
    let req = test::TestRequest::default()
        .insert_header(("Authorization", "Bearer notatoken"))
        .to_http_request();
    let mut pl = Payload::None;
    assert!(Auth::from_request(&req, &mut pl).await.is_err());
}

#[actix_web::test]
#[serial]
async fn extractor_rejects_missing_header() {
    set_secret();
    let req = test::TestRequest::default().to_http_request();
    let mut pl = Payload::None;
    assert!(Auth::from_request(&req, &mut pl).await.is_err());
}

#[actix_web::test]
#[serial]
async fn token_signed_with_other_secret_is_rejected() {
    env::set_var("JWT_SECRET", "first-secret-must-be-32-bytes-long!");
    let token = create_jwt(7, "mallory", "mallory@example.com").expect("token");
    env::set_var("JWT_SECRET", "other-secret-must-be-32-bytes-long!");
    let req = test::TestRequest::default()
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_http_request();
    let mut pl = Payload::None;
    assert!(Auth::from_request(&req, &mut pl).await.is_err());
}
