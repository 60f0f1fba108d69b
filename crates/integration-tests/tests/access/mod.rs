use indoc::indoc;
use integration_tests::TestServer;
use serde::Serialize;
use serde_json::json;

#[derive(Serialize)]
struct Attempt {
    request: u32,
    status: u16,
    body: serde_json::Value,
}

const CONFIG: &str = indoc! {r#"
    [limits]
    initial_tokens = 100
    max_tokens = 100
    refill_rate_per_second = 0

    [services.search]
    usage_price = 20

    [services.maps]
    usage_price = 5

    [[rules]]
    id = "maps-acme"
    service_id = "maps"
    client_id = "acme"
    usage_price = 5
    refill_rate_per_second = 1
    max_tokens = 12
"#};

#[tokio::test]
async fn requests_are_charged_until_the_bucket_runs_dry() {
    let server = TestServer::start(CONFIG).await;

    let mut results = Vec::new();

    for request in 1..=6 {
        let (status, body) = server
            .client
            .access(json!({
                "service_id": "search",
                "client_id": "acme",
                "user_id": "bob",
            }))
            .await;

        results.push(Attempt { request, status, body });
    }

    insta::assert_json_snapshot!(results, @r#"
    [
      {
        "request": 1,
        "status": 200,
        "body": {
          "is_allowed": true,
          "retry_after_seconds": 0
        }
      },
      {
        "request": 2,
        "status": 200,
        "body": {
          "is_allowed": true,
          "retry_after_seconds": 0
        }
      },
      {
        "request": 3,
        "status": 200,
        "body": {
          "is_allowed": true,
          "retry_after_seconds": 0
        }
      },
      {
        "request": 4,
        "status": 200,
        "body": {
          "is_allowed": true,
          "retry_after_seconds": 0
        }
      },
      {
        "request": 5,
        "status": 200,
        "body": {
          "is_allowed": true,
          "retry_after_seconds": 0
        }
      },
      {
        "request": 6,
        "status": 200,
        "body": {
          "is_allowed": false,
          "retry_after_seconds": null
        }
      }
    ]
    "#);
}

#[tokio::test]
async fn users_and_clients_have_separate_buckets() {
    let server = TestServer::start(CONFIG).await;

    let spend_all = |client: &'static str, user: &'static str| {
        json!({
            "service_id": "search",
            "client_id": client,
            "user_id": user,
            "usage_amount": 5,
        })
    };

    let (_, bob) = server.client.access(spend_all("acme", "bob")).await;
    let (_, alice) = server.client.access(spend_all("acme", "alice")).await;
    let (_, other_client) = server.client.access(spend_all("globex", "bob")).await;
    let (_, bob_again) = server.client.access(spend_all("acme", "bob")).await;

    assert_eq!(bob["is_allowed"], true);
    assert_eq!(alice["is_allowed"], true);
    assert_eq!(other_client["is_allowed"], true);
    assert_eq!(bob_again["is_allowed"], false);
}

#[tokio::test]
async fn rule_templates_size_new_buckets() {
    let server = TestServer::start(CONFIG).await;

    let request = json!({
        "service_id": "maps",
        "client_id": "acme",
        "user_id": "bob",
        "usage_amount": 2,
    });

    let (status, body) = server.client.access(request.clone()).await;
    assert_eq!(status, 200);
    assert_eq!(body["is_allowed"], true);

    // 12 tokens, 10 spent, 10 more requested: 8 missing at one token per second.
    let (status, body) = server.client.access(request).await;
    assert_eq!(status, 200);
    assert_eq!(body["is_allowed"], false);

    let retry = body["retry_after_seconds"].as_u64().unwrap();
    assert!((7..=8).contains(&retry), "{retry}");
}

#[tokio::test]
async fn cost_above_capacity_has_unknown_wait() {
    let server = TestServer::start(CONFIG).await;

    let (status, body) = server
        .client
        .access(json!({
            "service_id": "maps",
            "client_id": "acme",
            "usage_amount": 3,
        }))
        .await;

    assert_eq!(status, 200);

    insta::assert_json_snapshot!(body, @r#"
    {
      "is_allowed": false,
      "retry_after_seconds": null
    }
    "#);
}

#[tokio::test]
async fn unknown_service_is_not_found() {
    let server = TestServer::start(CONFIG).await;

    let (status, body) = server
        .client
        .access(json!({
            "service_id": "video",
            "client_id": "acme",
            "user_id": "bob",
        }))
        .await;

    assert_eq!(status, 404);

    insta::assert_json_snapshot!(body, @r#"
    {
      "error": "Service 'video' not found"
    }
    "#);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let server = TestServer::start(CONFIG).await;

    let response = server.client.post_raw("/access", r#"{"client_id":"acme"}"#).await;
    let status = response.status().as_u16();
    let body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(status, 422);
    assert!(body["error"].as_str().unwrap().contains("service_id"), "{body}");
}

#[tokio::test]
async fn get_is_not_allowed_on_access() {
    let server = TestServer::start(CONFIG).await;

    let response = server.client.get("/access").await;

    assert_eq!(response.status(), 405);
}
