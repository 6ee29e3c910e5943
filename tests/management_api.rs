//! Management API integration tests.

use serde_json::json;

mod common;

#[tokio::test]
async fn health_reports_ok() {
    let cluster = common::start_proxy(28580, 28581, "secret", vec![]).await;

    let res = common::client()
        .get("http://127.0.0.1:28581/health")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), r#"{"status":"ok"}"#);

    cluster.stop();
}

#[tokio::test]
async fn routes_require_the_bearer_key() {
    let cluster = common::start_proxy(28582, 28583, "secret", vec![]).await;
    let client = common::client();

    let res = client
        .get("http://127.0.0.1:28583/routes")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
    assert_eq!(
        res.text().await.unwrap(),
        "Not authorized. Missing \"Authorization\" header"
    );

    let res = client
        .get("http://127.0.0.1:28583/routes")
        .header("Authorization", "Bearer ")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
    assert_eq!(res.text().await.unwrap(), "Missing API key");

    let res = client
        .get("http://127.0.0.1:28583/routes")
        .header("Authorization", "Bearer wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
    assert_eq!(res.text().await.unwrap(), "API key invalid");

    // No separating space means no bearer token, even if the rest happens
    // to spell the key.
    let res = client
        .get("http://127.0.0.1:28583/routes")
        .header("Authorization", "Bearersecret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
    assert_eq!(res.text().await.unwrap(), "Missing API key");

    cluster.stop();
}

#[tokio::test]
async fn route_replace_via_api_serves_static_files() {
    let fixtures = std::env::temp_dir().join("maegashira-api-fixtures");
    std::fs::create_dir_all(&fixtures).unwrap();
    std::fs::write(fixtures.join("readme.txt"), "hello from fixtures").unwrap();

    let cluster = common::start_proxy(28584, 28585, "secret", vec![]).await;
    let client = common::client();

    let table = json!([{
        "hostname": "127.0.0.1",
        "path": "",
        "targets": [{"type": "static", "directory": fixtures.to_str().unwrap()}]
    }]);
    let res = client
        .post("http://127.0.0.1:28585/routes")
        .header("Authorization", "Bearer secret")
        .json(&table)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "OK");

    // The broadcast table is live on the worker.
    let res = client
        .get("http://127.0.0.1:28584/readme.txt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(res.text().await.unwrap(), "hello from fixtures");

    // And readable back through the API, structurally equal.
    let res = client
        .get("http://127.0.0.1:28585/routes")
        .header("Authorization", "Bearer secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let fetched: serde_json::Value = res.json().await.unwrap();
    assert_eq!(fetched, table);

    cluster.stop();
}

#[tokio::test]
async fn invalid_candidate_is_rejected_with_the_error_list() {
    let cluster = common::start_proxy(28586, 28587, "secret", vec![]).await;
    let client = common::client();

    // Empty targets fails semantic validation.
    let res = client
        .post("http://127.0.0.1:28587/routes")
        .header("Authorization", "Bearer secret")
        .json(&json!([{"hostname": "127.0.0.1", "targets": []}]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let errors: serde_json::Value = res.json().await.unwrap();
    assert_eq!(errors[0]["field"], "targets");

    // Unknown fields fail the closed-world schema.
    let res = client
        .post("http://127.0.0.1:28587/routes")
        .header("Authorization", "Bearer secret")
        .json(&json!([{
            "hostname": "127.0.0.1",
            "targets": [{"type": "forward", "url": "http://127.0.0.1:1", "weight": 3}]
        }]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    // The current table stays empty.
    let res = client
        .get("http://127.0.0.1:28587/routes")
        .header("Authorization", "Bearer secret")
        .send()
        .await
        .unwrap();
    let table: serde_json::Value = res.json().await.unwrap();
    assert_eq!(table, json!([]));

    cluster.stop();
}

#[tokio::test]
async fn metrics_expose_response_code_counters() {
    let cluster = common::start_proxy(28588, 28589, "secret", vec![]).await;
    let client = common::client();

    // Produce one 404 on the public listener.
    let res = client
        .get("http://127.0.0.1:28588/nothing-here")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let res = client
        .get("http://127.0.0.1:28589/metrics")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body = res.text().await.unwrap();
    assert!(
        body.contains("responses_codes"),
        "metrics body should contain responses_codes: {body}"
    );

    cluster.stop();
}

#[tokio::test]
async fn openapi_and_explorer_are_served() {
    let cluster = common::start_proxy(28590, 28591, "secret", vec![]).await;
    let client = common::client();

    let res = client.get("http://127.0.0.1:28591/").send().await.unwrap();
    assert_eq!(res.status(), 200);
    let doc: serde_json::Value = res.json().await.unwrap();
    assert_eq!(doc["openapi"], "3.0.3");
    assert!(doc["paths"]["/routes"]["post"].is_object());

    let res = client
        .get("http://127.0.0.1:28591/explorer")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.text().await.unwrap().contains("<html"));

    cluster.stop();
}
