mod common;

use common::TestServer;
use serde_json::{Value, json};

async fn signup(base_url: &str, company: &str, username: &str) -> String {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base_url}/auth/signup"))
        .json(&json!({
            "company": company,
            "username": username,
            "password": "hunter2",
        }))
        .send()
        .await
        .expect("signup");
    assert_eq!(resp.status(), 201);

    let body: Value = resp.json().await.expect("parse signup response");
    body["data"]["token"].as_str().expect("token").to_string()
}

async fn create_project(base_url: &str, token: &str, name: &str) -> String {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base_url}/admin/project"))
        .bearer_auth(token)
        .json(&json!({ "name": name }))
        .send()
        .await
        .expect("create project");
    assert_eq!(resp.status(), 201);

    let body: Value = resp.json().await.expect("parse project response");
    body["data"]["id"].as_str().expect("project id").to_string()
}

async fn create_key(base_url: &str, token: &str, project_id: &str, name: &str) -> (String, String) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base_url}/admin/apikey"))
        .bearer_auth(token)
        .json(&json!({ "project_id": project_id, "name": name }))
        .send()
        .await
        .expect("create key");
    assert_eq!(resp.status(), 201);

    let body: Value = resp.json().await.expect("parse key response");
    (
        body["data"]["id"].as_str().expect("key id").to_string(),
        body["data"]["key"].as_str().expect("raw key").to_string(),
    )
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let resp = reqwest::get(format!("{}/health", server.base_url))
        .await
        .expect("health");

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    let server = TestServer::start().await;
    let resp = reqwest::get(format!("{}/metrics", server.base_url))
        .await
        .expect("metrics");

    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_signup_login_verify_flow() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let token = signup(base, "acme", "alice").await;

    // Bearer auth works.
    let resp = client
        .get(format!("{base}/auth/verify"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["username"], "alice");

    // Cookie auth works too.
    let resp = client
        .get(format!("{base}/auth/verify"))
        .header("Cookie", format!("session={token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // No credentials at all.
    let resp = client
        .get(format!("{base}/auth/verify"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Login with the right and wrong password.
    let resp = client
        .post(format!("{base}/auth/login"))
        .json(&json!({ "company": "acme", "username": "alice", "password": "hunter2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{base}/auth/login"))
        .json(&json!({ "company": "acme", "username": "alice", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Unknown company is a plain 404.
    let resp = client
        .post(format!("{base}/auth/login"))
        .json(&json!({ "company": "nowhere", "username": "alice", "password": "hunter2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Duplicate signup in the same company.
    let resp = client
        .post(format!("{base}/auth/signup"))
        .json(&json!({ "company": "acme", "username": "alice", "password": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_garbage_session_token_rejected() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/auth/verify", server.base_url))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_project_lifecycle() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;
    let token = signup(base, "acme", "alice").await;

    let project_id = create_project(base, &token, "alpha").await;

    // Duplicate name in the same company conflicts.
    let resp = client
        .post(format!("{base}/admin/project"))
        .bearer_auth(&token)
        .json(&json!({ "name": "alpha" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Empty name is rejected.
    let resp = client
        .post(format!("{base}/admin/project"))
        .bearer_auth(&token)
        .json(&json!({ "name": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // List includes the project with its key count.
    let resp = client
        .get(format!("{base}/admin/projects"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let projects = body["data"].as_array().unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0]["name"], "alpha");
    assert_eq!(projects[0]["key_count"], 0);
    assert_eq!(projects[0]["status"], "active");

    // Delete, then delete again.
    let resp = client
        .delete(format!("{base}/admin/project/{project_id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .delete(format!("{base}/admin/project/{project_id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_tenant_isolation() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let token_a = signup(base, "acme", "alice").await;
    let token_b = signup(base, "globex", "bob").await;

    let project_a = create_project(base, &token_a, "alpha").await;

    // The other tenant sees nothing.
    let resp = client
        .get(format!("{base}/admin/projects"))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    // Foreign project ids behave exactly like missing ones.
    let resp = client
        .delete(format!("{base}/admin/project/{project_a}"))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .get(format!("{base}/admin/apikeys?project_id={project_a}"))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("{base}/admin/apikey"))
        .bearer_auth(&token_b)
        .json(&json!({ "project_id": project_a, "name": "sneaky" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // And the owner still sees their project untouched.
    let resp = client
        .get(format!("{base}/admin/projects"))
        .bearer_auth(&token_a)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_api_key_lifecycle() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;
    let token = signup(base, "acme", "alice").await;
    let project_id = create_project(base, &token, "alpha").await;

    let (key_id, raw_key) = create_key(base, &token, &project_id, "prod").await;
    assert!(raw_key.starts_with("fsk_"));

    // Duplicate active name conflicts.
    let resp = client
        .post(format!("{base}/admin/apikey"))
        .bearer_auth(&token)
        .json(&json!({ "project_id": project_id, "name": "prod" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Listing never exposes the raw key, only the prefix.
    let resp = client
        .get(format!("{base}/admin/apikeys?project_id={project_id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let keys = body["data"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert!(keys[0]["key"].is_null());
    let prefix = keys[0]["key_prefix"].as_str().unwrap();
    assert_eq!(prefix.len(), 8);
    assert!(raw_key.starts_with(prefix));
    assert_eq!(keys[0]["request_count"], 0);

    // Revoke is idempotent.
    for _ in 0..2 {
        let resp = client
            .post(format!("{base}/admin/apikey/{key_id}/revoke"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    // Revoked name can be reused, and restoring then conflicts.
    let resp = client
        .post(format!("{base}/admin/apikey"))
        .bearer_auth(&token)
        .json(&json!({ "project_id": project_id, "name": "prod" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .post(format!("{base}/admin/apikey/{key_id}/restore"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn test_default_key_is_get_or_create() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;
    let token = signup(base, "acme", "alice").await;
    let project_id = create_project(base, &token, "alpha").await;

    let resp = client
        .post(format!("{base}/admin/apikey/default"))
        .bearer_auth(&token)
        .json(&json!({ "project_id": project_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let first: Value = resp.json().await.unwrap();

    let resp = client
        .post(format!("{base}/admin/apikey/default"))
        .bearer_auth(&token)
        .json(&json!({ "project_id": project_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let second: Value = resp.json().await.unwrap();

    assert_eq!(first["data"]["id"], second["data"]["id"]);
    assert_eq!(first["data"]["key"], second["data"]["key"]);
}

#[tokio::test]
async fn test_generate_auth_failures() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;
    let token = signup(base, "acme", "alice").await;
    let project_id = create_project(base, &token, "alpha").await;
    let (key_id, raw_key) = create_key(base, &token, &project_id, "prod").await;

    // Missing or empty key header is malformed input, not an auth failure.
    let resp = client
        .post(format!("{base}/generate"))
        .json(&json!({ "prompt": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}/generate"))
        .header("x-api-key", "")
        .json(&json!({ "prompt": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Unknown key.
    let resp = client
        .post(format!("{base}/generate"))
        .header("x-api-key", "fsk_00000000000000000000000000000000")
        .json(&json!({ "prompt": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Empty prompt with a valid key.
    let resp = client
        .post(format!("{base}/generate"))
        .header("x-api-key", &raw_key)
        .json(&json!({ "prompt": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Revoked key is indistinguishable from an unknown one.
    client
        .post(format!("{base}/admin/apikey/{key_id}/revoke"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let resp = client
        .post(format!("{base}/generate"))
        .header("x-api-key", &raw_key)
        .json(&json!({ "prompt": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_generate_with_unreachable_upstream_is_502() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;
    let token = signup(base, "acme", "alice").await;
    let project_id = create_project(base, &token, "alpha").await;
    let (_, raw_key) = create_key(base, &token, &project_id, "prod").await;

    let resp = client
        .post(format!("{base}/generate"))
        .header("x-api-key", &raw_key)
        .json(&json!({ "prompt": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);

    // Failed calls are not metered.
    let resp = client
        .get(format!("{base}/admin/apikeys?project_id={project_id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"][0]["request_count"], 0);
}

#[tokio::test]
async fn test_generate_with_orphaned_key_is_404() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;
    let token = signup(base, "acme", "alice").await;
    let project_id = create_project(base, &token, "alpha").await;
    let (_, raw_key) = create_key(base, &token, &project_id, "prod").await;

    // Sever the key from its project directly in the database; a fresh
    // connection has foreign keys off, so the key row survives.
    let conn = rusqlite::Connection::open(server.data_dir().join("test.db")).unwrap();
    // The bundled SQLite is built with SQLITE_DEFAULT_FOREIGN_KEYS=1, so
    // turn enforcement off explicitly to keep the key row orphaned.
    conn.pragma_update(None, "foreign_keys", false).unwrap();
    conn.execute("DELETE FROM projects WHERE id = ?1", [project_id.as_str()])
        .unwrap();
    drop(conn);

    let resp = client
        .post(format!("{base}/generate"))
        .header("x-api-key", &raw_key)
        .json(&json!({ "prompt": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_stats_endpoints_shapes() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;
    let token = signup(base, "acme", "alice").await;
    let project_id = create_project(base, &token, "alpha").await;
    let (key_id, _) = create_key(base, &token, &project_id, "prod").await;
    create_key(base, &token, &project_id, "staging").await;
    client
        .post(format!("{base}/admin/apikey/{key_id}/revoke"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    let resp = client
        .get(format!("{base}/admin/stats/summary"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["projects"]["total"], 1);
    assert_eq!(body["data"]["api_keys"]["total"], 2);
    assert_eq!(body["data"]["api_keys"]["active"], 1);
    assert_eq!(body["data"]["requests"]["total"], 0);

    let resp = client
        .get(format!("{base}/admin/stats/projects/status"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["active"], 1);
    assert_eq!(body["data"]["total"], 1);

    let resp = client
        .get(format!("{base}/admin/stats/apikeys/status"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["active"], 1);
    assert_eq!(body["data"]["revoked"], 1);

    // Series are zero-filled to their full width even with no traffic.
    let resp = client
        .get(format!("{base}/admin/stats/requests/weekly"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 7);

    let resp = client
        .get(format!("{base}/admin/metrics/requests/24h"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 24);

    let resp = client
        .get(format!("{base}/admin/metrics/latency/histogram"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_system_health_reports_upstream_down() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;
    let token = signup(base, "acme", "alice").await;

    let resp = client
        .get(format!("{base}/admin/system/health"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["database"], "ok");
    assert_eq!(body["data"]["model_server"], "down");
    assert_eq!(body["data"]["status"], "degraded");
}

#[tokio::test]
async fn test_user_management() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;
    let token = signup(base, "acme", "alice").await;

    let resp = client
        .post(format!("{base}/admin/users"))
        .bearer_auth(&token)
        .json(&json!({ "username": "bob", "password": "hunter2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let bob_id = body["data"]["id"].as_str().unwrap().to_string();

    // Duplicate username in the company.
    let resp = client
        .post(format!("{base}/admin/users"))
        .bearer_auth(&token)
        .json(&json!({ "username": "bob", "password": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let resp = client
        .get(format!("{base}/admin/users"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    // Bob can't delete Alice (he didn't create her) or himself.
    let resp = client
        .post(format!("{base}/auth/login"))
        .json(&json!({ "company": "acme", "username": "bob", "password": "hunter2" }))
        .send()
        .await
        .unwrap();
    let bob_token: String = resp.json::<Value>().await.unwrap()["data"]["token"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = client
        .get(format!("{base}/auth/verify"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let alice_id = resp.json::<Value>().await.unwrap()["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = client
        .delete(format!("{base}/admin/users/{alice_id}"))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .delete(format!("{base}/admin/users/{bob_id}"))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Alice created Bob, so she can delete him.
    let resp = client
        .delete(format!("{base}/admin/users/{bob_id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .delete(format!("{base}/admin/users/{bob_id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_model_download_job_round_trip() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;
    let token = signup(base, "acme", "alice").await;

    // Curated list requires a session.
    let resp = client.get(format!("{base}/models/curated")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("{base}/models/curated"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(!body["data"].as_array().unwrap().is_empty());

    // Malformed repo id.
    let resp = client
        .post(format!("{base}/models/download"))
        .bearer_auth(&token)
        .json(&json!({ "repo_id": "no-slash" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Submit and poll to completion.
    let resp = client
        .post(format!("{base}/models/download"))
        .bearer_auth(&token)
        .json(&json!({ "repo_id": "org/model" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let body: Value = resp.json().await.unwrap();
    let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

    let mut last = Value::Null;
    for _ in 0..100 {
        let resp = client
            .get(format!("{base}/models/jobs/{job_id}"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        last = resp.json().await.unwrap();
        let status = last["data"]["status"].as_str().unwrap();
        if status == "done" || status == "error" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(last["data"]["status"], "done");
    assert_eq!(last["data"]["percent"], 100);

    let model_dir = server.data_dir().join("models").join("org--model");
    assert!(model_dir.join("model.bin").exists());
    assert!(model_dir.join("meta.json").exists());

    // Unknown job id.
    let resp = client
        .get(format!("{base}/models/jobs/nope"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
