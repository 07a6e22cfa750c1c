mod common;

use common::{read_json, TestApp};

#[tokio::test]
async fn health_check_reports_healthy() {
    let app = TestApp::spawn().await;

    let res = app.get("/health").await;
    assert_eq!(res.status(), 200);

    let body = read_json(res).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"], "up");
}
