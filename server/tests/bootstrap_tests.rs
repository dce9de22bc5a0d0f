use bootstrap::{BootstrapError, LifecycleManager, Phase, ServiceGraph, ServicesConfig, ServiceState};
use reqwest::StatusCode;
use serde_json::Value;
use std::net::TcpListener;

use server::middleware::authorization_value;
use server::services::{self, ApiEndpoint};

// Cheapest cost bcrypt accepts.
const FAST_HASH: &str = "bcrypt_cost = 4";

fn graph_from(toml: &str) -> ServiceGraph {
    let config = ServicesConfig::from_toml(toml).expect("valid services file");
    ServiceGraph::build(config.services).expect("valid graph")
}

fn memory_stack(api_extra: &str) -> String {
    format!(
        r#"
[[services]]
name = "api"
handler = {{ module = "api", constructor = "http" }}
depends_on = ["accounts-db"]
store = "accounts-db"
host = "127.0.0.1"
{api_extra}

[[services]]
name = "accounts-db"
handler = {{ module = "store", constructor = "memory" }}
"#
    )
}

#[tokio::test]
async fn test_bootstrap_serves_account_flow_over_http() {
    let graph = graph_from(&memory_stack(&format!("port = 0\n{FAST_HASH}")));
    assert_eq!(graph.linear_ordering(), vec!["accounts-db", "api"]);

    let running = LifecycleManager::new(services::registry())
        .bootstrap(&graph)
        .await
        .expect("bootstrap succeeds");
    assert_eq!(running.names(), vec!["accounts-db", "api"]);
    assert_eq!(running.state("api"), Some(ServiceState::Started));

    let endpoint: ApiEndpoint = running.export("api").expect("api exports its endpoint");
    let base = endpoint.base_url;
    let client = reqwest::Client::new();
    let form = [("uname", "u1"), ("pass", "p1")];

    let resp = client
        .post(format!("{base}/accounts"))
        .form(&form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(
        resp.headers()[reqwest::header::CONTENT_TYPE].to_str().unwrap(),
        "application/json"
    );

    let resp = client
        .post(format!("{base}/accounts"))
        .form(&[("uname", "u1"), ("pass", "p2")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = client
        .post(format!("{base}/sessions"))
        .form(&form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    let session_id = body["sessionID"].as_str().unwrap().to_string();

    let resp = client
        .get(format!("{base}/sessions"))
        .header(reqwest::header::AUTHORIZATION, authorization_value(&session_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["sessions"][0]["sessionID"], session_id.as_str());

    let resp = client
        .head(format!("{base}/sessions/{session_id}"))
        .header(reqwest::header::AUTHORIZATION, authorization_value(&session_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.bytes().await.unwrap().is_empty());

    let resp = client
        .get(format!("{base}/sessions"))
        .header(
            reqwest::header::AUTHORIZATION,
            authorization_value("0123456789abcdef0123456789abcdef"),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    running.shutdown().await.expect("clean shutdown");
    let after = reqwest::Client::new().get(format!("{base}/health")).send().await;
    assert!(after.is_err(), "listener must be closed after shutdown");
}

#[tokio::test]
async fn test_api_initialize_failure_rolls_back_store() {
    // bcrypt rejects costs below 4, so preparing the account manager fails.
    let graph = graph_from(&memory_stack("port = 0\nbcrypt_cost = 3"));

    let err = LifecycleManager::new(services::registry())
        .bootstrap(&graph)
        .await
        .err()
        .expect("bootstrap must fail");

    match &err {
        BootstrapError::ServiceFailed {
            service,
            phase,
            rollback_failures,
            ..
        } => {
            assert_eq!(service, "api");
            assert_eq!(*phase, Phase::Initialize);
            assert!(rollback_failures.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.state("api"), Some(ServiceState::Failed));
    assert_eq!(err.state("accounts-db"), Some(ServiceState::Stopped));
}

#[tokio::test]
async fn test_port_in_use_fails_at_start() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let graph = graph_from(&memory_stack(&format!("port = {port}\n{FAST_HASH}")));

    let err = LifecycleManager::new(services::registry())
        .bootstrap(&graph)
        .await
        .err()
        .expect("bootstrap must fail");

    assert_eq!(err.service(), "api");
    assert!(matches!(
        err,
        BootstrapError::ServiceFailed {
            phase: Phase::Start,
            ..
        }
    ));
}

#[tokio::test]
async fn test_unknown_handler_fails_bootstrap() {
    let graph = graph_from(
        r#"
[[services]]
name = "accounts-db"
handler = { module = "store", constructor = "redis" }
"#,
    );

    let err = LifecycleManager::new(services::registry())
        .bootstrap(&graph)
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err,
        BootstrapError::ServiceFailed {
            phase: Phase::Instantiate,
            ..
        }
    ));
    assert!(err.to_string().contains("store::redis"));
}

#[tokio::test]
async fn test_api_without_declared_store_is_rejected() {
    let graph = graph_from(
        r#"
[[services]]
name = "accounts-db"
handler = { module = "store", constructor = "memory" }

[[services]]
name = "api"
handler = { module = "api", constructor = "http" }
store = "accounts-db"
port = 0
"#,
    );

    let err = LifecycleManager::new(services::registry())
        .bootstrap(&graph)
        .await
        .err()
        .unwrap();

    assert_eq!(err.service(), "api");
    assert!(err.to_string().contains("depends_on"));
}
