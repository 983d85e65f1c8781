mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use kitabya_api::build_router;

use common::TestApp;

const BOUNDARY: &str = "kitabya-test-boundary";

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut req = Request::get(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    req.body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn public_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn multipart(uri: &str, token: Option<&str>, fields: &[(&str, &str)], files: &[&str]) -> Request<Body> {
    form_request("POST", uri, token, fields, "images", files)
}

fn form_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    fields: &[(&str, &str)],
    file_field: &str,
    files: &[&str],
) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            BOUNDARY, name, value
        ));
    }
    for file in files {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/jpeg\r\n\r\nfake-bytes\r\n",
            BOUNDARY, file_field, file
        ));
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));

    let mut req = Request::builder().method(method).uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={}", BOUNDARY),
    );
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    req.body(Body::from(body)).unwrap()
}

const LISTING_FIELDS: &[(&str, &str)] = &[
    ("title", "Algebra"),
    ("price", "15"),
    ("condition", "good"),
    ("type", "book"),
    ("language", "en"),
    ("description", "Linear algebra, second edition"),
    ("locationAddress", "Main St 1"),
];

#[tokio::test]
async fn health_is_public() {
    let app = build_router(TestApp::new().state);
    let (status, body) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn writes_need_a_valid_bearer_token() {
    let app = build_router(TestApp::new().state);

    let (status, body) = send(&app, multipart("/v1/products", None, LISTING_FIELDS, &["a.jpg"])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "UNAUTHORIZED");

    let (status, _) = send(&app, get("/v1/users/profile", Some("forged"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, get("/v1/users/profile", Some("provider-down"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "UPSTREAM_ERROR");
}

#[tokio::test]
async fn first_authenticated_call_creates_the_user() {
    let app = build_router(TestApp::new().state);
    let (status, body) = send(&app, get("/v1/users/profile", Some("token-amina"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "amina@example.com");
    assert_eq!(body["data"]["name"], "amina");
    assert_eq!(body["data"]["isAdmin"], false);
}

#[tokio::test]
async fn create_read_and_search_over_http() {
    let app = build_router(TestApp::new().state);

    let (status, body) = send(
        &app,
        multipart("/v1/products", Some("token-amina"), LISTING_FIELDS, &["front.jpg", "back.jpg"]),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["images"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["user"]["email"], "amina@example.com");

    let (status, body) = send(&app, get(&format!("/v1/products/{}", id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["viewCount"], 1);
    assert_eq!(body["data"]["type"], "book");

    let (status, body) = send(&app, get("/v1/products/search?query=alge&maxPrice=20", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], id.as_str());
    assert_eq!(body["pagination"]["total"], 1);

    let (status, body) = send(&app, get("/v1/products/search?minPrice=30&maxPrice=20", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn create_without_images_is_a_validation_error() {
    let app = build_router(TestApp::new().state);
    let (status, body) = send(&app, multipart("/v1/products", Some("token-amina"), LISTING_FIELDS, &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn malformed_and_missing_ids() {
    let app = build_router(TestApp::new().state);

    let (status, body) = send(&app, get("/v1/products/not-a-uuid", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let missing = format!("/v1/products/{}", kitabya_db::new_id());
    let (status, body) = send(&app, get(&missing, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Product not found");
}

#[tokio::test]
async fn duplicate_report_is_a_conflict() {
    let app = build_router(TestApp::new().state);
    let (_, body) = send(
        &app,
        multipart("/v1/products", Some("token-amina"), LISTING_FIELDS, &["a.jpg"]),
    )
    .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/v1/products/{}/report", id);
    let report = json!({ "reason": "spam", "description": "x" });

    let (status, body) = send(&app, json_request("POST", &uri, "token-bilal", report.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "pending");

    // A repeat report is 409 CONFLICT, not a 400
    let (status, body) = send(&app, json_request("POST", &uri, "token-bilal", report)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "CONFLICT");
}

#[tokio::test]
async fn admin_routes_reject_regular_users() {
    let app = build_router(TestApp::new().state);

    let (status, body) = send(&app, get("/v1/notifications/broadcasts", Some("token-amina"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "FORBIDDEN");

    let (status, body) = send(&app, get("/v1/notifications/broadcasts", Some("token-admin"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn recent_searches_round_trip_over_http() {
    let app = build_router(TestApp::new().state);
    let (_, body) = send(
        &app,
        multipart("/v1/products", Some("token-amina"), LISTING_FIELDS, &["a.jpg"]),
    )
    .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/v1/products/recent-searches",
                "token-bilal",
                json!({ "productId": id }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app, get("/v1/products/recent-searches", Some("token-bilal"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["product"]["title"], "Algebra");

    let (status, body) = send(
        &app,
        json_request("DELETE", "/v1/products/recent-searches", "token-bilal", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], 1);
}

#[tokio::test]
async fn searching_non_latin_titles_ignores_case() {
    let app = build_router(TestApp::new().state);
    let fields = [
        ("title", "Алгебра"),
        ("price", "12"),
        ("condition", "good"),
        ("type", "book"),
        ("language", "ru"),
        ("description", "Учебник"),
        ("locationAddress", "Main St 1"),
    ];
    let (status, _) = send(&app, multipart("/v1/products", Some("token-amina"), &fields, &["a.jpg"])).await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/v1/products/search?query={}", "%D0%90%D0%9B%D0%93%D0%95");
    let (status, body) = send(&app, get(&uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["title"], "Алгебра");
}

#[tokio::test]
async fn profile_photo_upload_and_replacement() {
    let test_app = TestApp::new();
    let blobs = test_app.blobs.clone();
    let app = build_router(test_app.state);

    let (status, body) = send(
        &app,
        form_request(
            "PUT",
            "/v1/users/profile",
            Some("token-amina"),
            &[("location", "Rabat")],
            "photo",
            &["me.jpg"],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let first = body["data"]["photoUrl"].as_str().unwrap().to_string();
    assert!(first.starts_with("https://blobs.test/profiles/"));
    assert_eq!(body["data"]["location"], "Rabat");

    let (status, body) = send(
        &app,
        form_request("PUT", "/v1/users/profile", Some("token-amina"), &[], "photo", &["new.jpg"]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["data"]["photoUrl"], first.as_str());
    assert_eq!(body["data"]["location"], "Rabat");
    assert_eq!(*blobs.deleted.lock().unwrap(), vec![first]);
}

#[tokio::test]
async fn invalid_date_of_birth_is_rejected_before_upload() {
    let test_app = TestApp::new();
    let blobs = test_app.blobs.clone();
    let app = build_router(test_app.state);

    let (status, body) = send(
        &app,
        form_request(
            "PUT",
            "/v1/users/profile",
            Some("token-amina"),
            &[("dateOfBirth", "31/12/1990")],
            "photo",
            &["me.jpg"],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert_eq!(blobs.live_count(), 0);
}

#[tokio::test]
async fn picture_claim_seeds_the_photo() {
    let app = build_router(TestApp::new().state);
    let (status, body) = send(&app, get("/v1/users/profile", Some("token-pictured"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["photoUrl"], "https://idp.test/pictured.png");
}

#[tokio::test]
async fn login_and_me_return_the_resolved_user() {
    let app = build_router(TestApp::new().state);

    let (status, _) = send(&app, get("/v1/auth/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, json_request("POST", "/v1/auth/login", "token-amina", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    let id = body["data"]["user"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["user"]["email"], "amina@example.com");

    let (status, body) = send(&app, get("/v1/auth/me", Some("token-amina"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["id"], id.as_str());

    let (_, body) = send(&app, get("/v1/auth/me", Some("token-admin"))).await;
    assert_eq!(body["data"]["user"]["isAdmin"], true);
}

#[tokio::test]
async fn registration_is_public_and_linked_on_sign_in() {
    let app = build_router(TestApp::new().state);

    let (status, body) = send(&app, public_json("/v1/users/register", json!({ "name": "Hana" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Name and email are required");

    let (status, body) = send(
        &app,
        public_json(
            "/v1/users/register",
            json!({ "name": "Hana", "email": "hana@example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = send(&app, get("/v1/users/profile", Some("token-hana"))).await;
    assert_eq!(body["data"]["id"], id.as_str());
    assert_eq!(body["data"]["name"], "Hana");
}

#[tokio::test]
async fn questionnaire_upserts_one_record_per_user() {
    let app = build_router(TestApp::new().state);

    let (status, body) = send(&app, get("/v1/questionnaire", Some("token-amina"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], Value::Null);

    let answers = json!({
        "profession": "student",
        "booksInterest": ["fiction", "history"],
        "ageRange": "18-24",
        "city": "Tunis"
    });
    let (status, body) = send(&app, json_request("POST", "/v1/questionnaire", "token-amina", answers)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Questionnaire submitted successfully");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let update = json!({
        "profession": "engineer",
        "booksInterest": ["science"],
        "ageRange": "25-34",
        "city": "Tunis"
    });
    let (_, body) = send(&app, json_request("POST", "/v1/questionnaire", "token-amina", update)).await;
    assert_eq!(body["data"]["id"], id.as_str());

    let (_, body) = send(&app, get("/v1/questionnaire", Some("token-amina"))).await;
    assert_eq!(body["data"]["profession"], "engineer");
    assert_eq!(body["data"]["ageRange"], "25-34");
    assert_eq!(body["data"]["booksInterest"], json!(["science"]));

    let bad = json!({
        "profession": "student",
        "booksInterest": ["fiction"],
        "ageRange": "60+",
        "city": "Tunis"
    });
    let (status, body) = send(&app, json_request("POST", "/v1/questionnaire", "token-amina", bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}
