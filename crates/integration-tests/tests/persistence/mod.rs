use indoc::indoc;
use integration_tests::TestServer;
use serde_json::json;

const CONFIG: &str = indoc! {r#"
    [limits]
    initial_tokens = 100
    max_tokens = 100
    refill_rate_per_second = 0

    [services.search]
    usage_price = 1

    [[rules]]
    id = "search-acme-carol"
    service_id = "search"
    client_id = "acme"
    user_id = "carol"
    usage_price = 1
    refill_rate_per_second = 0
    max_tokens = 50
"#};

fn spend(user: &str, amount: u64) -> serde_json::Value {
    json!({
        "service_id": "search",
        "client_id": "acme",
        "user_id": user,
        "usage_amount": amount,
    })
}

#[tokio::test]
async fn buckets_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    let server = TestServer::start_with_snapshots(CONFIG, dir.path()).await;
    let (_, body) = server.client.access(spend("bob", 30)).await;
    assert_eq!(body["is_allowed"], true);
    server.stop().await;

    assert!(dir.path().join("search%3Aacme%3Abob.json").is_file());

    let server = TestServer::start_with_snapshots(CONFIG, dir.path()).await;

    let (_, body) = server.client.access(spend("bob", 71)).await;
    assert_eq!(body["is_allowed"], false);

    let (_, body) = server.client.access(spend("bob", 70)).await;
    assert_eq!(body["is_allowed"], true);
}

#[tokio::test]
async fn restored_state_wins_over_rule_provisioning() {
    let dir = tempfile::tempdir().unwrap();

    let server = TestServer::start_with_snapshots(CONFIG, dir.path()).await;
    let (_, body) = server.client.access(spend("carol", 45)).await;
    assert_eq!(body["is_allowed"], true);
    server.stop().await;

    let server = TestServer::start_with_snapshots(CONFIG, dir.path()).await;

    let (_, body) = server.client.access(spend("carol", 6)).await;
    assert_eq!(body["is_allowed"], false);

    let (_, body) = server.client.access(spend("carol", 5)).await;
    assert_eq!(body["is_allowed"], true);
}

#[tokio::test]
async fn snapshot_files_hold_bucket_state() {
    let dir = tempfile::tempdir().unwrap();

    let server = TestServer::start_with_snapshots(CONFIG, dir.path()).await;
    server.client.access(spend("bob", 40)).await;
    server.stop().await;

    let content = std::fs::read_to_string(dir.path().join("search%3Aacme%3Abob.json")).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&content).unwrap();

    assert_eq!(snapshot["id"], "search:acme:bob");
    assert_eq!(snapshot["tokens"], 60);
    assert_eq!(snapshot["max_tokens"], 100);
    assert_eq!(snapshot["refill_rate_per_second"], 0);
    assert!(snapshot["created_at"].is_string());
    assert!(snapshot["last_refill"].is_string());
}

#[tokio::test]
async fn corrupt_snapshots_do_not_prevent_startup() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

    let server = TestServer::start_with_snapshots(CONFIG, dir.path()).await;

    let (status, body) = server.client.access(spend("bob", 1)).await;
    assert_eq!(status, 200);
    assert_eq!(body["is_allowed"], true);
}
