//! HTTP-level tests for admin and maintenance endpoints.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use clipflow_core::lock::lock_key;
use clipflow_core::status::VideoStatus;
use common::{body_json, build_test_app};

#[tokio::test]
async fn health_reports_store_connectivity() {
    let app = build_test_app();
    let response = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["lock_store"]["healthy"], true);

    app.kv.set_available(false);
    let response = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["record_store"]["healthy"], true);
}

#[tokio::test]
async fn lock_store_outage_is_503() {
    let app = build_test_app();
    let video = app.seed_video("a.mp4", VideoStatus::NotAnnotated).await;
    let token = app.token(1, "annotator");
    app.kv.set_available(false);

    let response = app.post(&format!("/api/v1/videos/{}/lock", video.id), &token).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "UNAVAILABLE");
}

#[tokio::test]
async fn admin_deletes_a_locked_video() {
    let app = build_test_app();
    let video = app.seed_video("a.mp4", VideoStatus::NotAnnotated).await;
    let annotator = app.token(2, "annotator");
    let admin = app.token(1, "admin");
    let uri = format!("/api/v1/videos/{}", video.id);
    app.post(&format!("{uri}/lock"), &annotator).await;

    let response = app.delete(&uri, &annotator).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.delete(&uri, &admin).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["lock_released"], true);

    let response = app.get(&format!("{uri}/status"), &admin).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn force_release_requires_super_admin() {
    let app = build_test_app();
    let a = app.seed_video("a.mp4", VideoStatus::NotAnnotated).await;
    let b = app.seed_video("b.mp4", VideoStatus::NotAnnotated).await;
    let annotator = app.token(2, "annotator");
    app.post(&format!("/api/v1/videos/{}/lock", a.id), &annotator).await;
    app.post(&format!("/api/v1/videos/{}/lock", b.id), &annotator).await;

    let response = app.delete("/api/v1/locks", &app.token(1, "admin")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.delete("/api/v1/locks", &app.token(0, "super_admin")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["removed"], 2);
}

#[tokio::test]
async fn lock_sweep_removes_persistent_keys() {
    let app = build_test_app();
    app.kv.insert_persistent(&lock_key(5), "{}").await;
    let admin = app.token(1, "admin");

    let response = app.post("/api/v1/locks/sweep", &admin).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["removed"], 1);
}

#[tokio::test]
async fn maintenance_sweep_repairs_orphans() {
    let app = build_test_app();
    let orphan = app.seed_video("orphan.mp4", VideoStatus::InProgress).await;
    let admin = app.token(1, "admin");

    let response = app.post("/api/v1/maintenance/sweep", &admin).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["orphans_repaired"]["result"], "ok");
    assert_eq!(json["data"]["orphans_repaired"]["count"], 1);

    let response = app.get(&format!("/api/v1/videos/{}/status", orphan.id), &admin).await;
    assert_eq!(body_json(response).await["data"]["status"], "not_annotated");
}

#[tokio::test]
async fn unknown_job_is_404() {
    let app = build_test_app();
    let response = app.get("/api/v1/jobs/77", &app.token(1, "annotator")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
