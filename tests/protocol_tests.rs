//! Coordination protocol tests against a real loopback server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tandem::api::{create_router, AppState};
use tandem::client::{ApiClient, ApiClientManager, PollingIntervals, RetryPolicies};
use tandem::components::{Component, ComponentDependencies, StateSynchronization};
use tandem::engine::RuntimeContext;
use tandem::errors::{classify, ErrorReason};
use tandem::lifecycle::{run_component, ComponentState};
use tandem::storage::InMemoryStateStore;
use tandem::types::{ClientInstance, ClientServerState, ClientServerStatus, EnvironmentLayout};

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}

async fn spawn_agent(runtime: Arc<RuntimeContext>) -> String {
    spawn(create_router(AppState {
        store: Arc::new(InMemoryStateStore::new()),
        runtime,
    }))
    .await
}

fn fast_retries() -> RetryPolicies {
    RetryPolicies::default().map(|p| {
        p.with_max_retries(3)
            .with_backoff_step(Duration::from_millis(5))
    })
}

/// Serves a fixed status on the state route and counts hits.
async fn counting_server(status: StatusCode) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route(
            "/api/state/:id",
            get(|State((hits, status)): State<(Arc<AtomicUsize>, StatusCode)>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                status
            }),
        )
        .with_state((hits.clone(), status));
    (spawn(router).await, hits)
}

#[tokio::test]
async fn test_not_found_read_is_not_retried() {
    let (base_url, hits) = counting_server(StatusCode::NOT_FOUND).await;
    let client = ApiClient::new(base_url).unwrap().with_retry_policies(fast_retries());

    let response = client.get_state("missing").await.unwrap();

    assert_eq!(response.status, 404);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unavailable_read_is_retried_up_to_the_limit() {
    let (base_url, hits) = counting_server(StatusCode::SERVICE_UNAVAILABLE).await;
    let client = ApiClient::new(base_url).unwrap().with_retry_policies(fast_retries());

    let response = client.get_state("busy").await.unwrap();

    assert_eq!(response.status, 503);
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_state_round_trip_through_the_server() {
    let runtime = Arc::new(RuntimeContext::new("agent-1", Uuid::new_v4()));
    let base_url = spawn_agent(runtime).await;
    let client = ApiClient::new(base_url).unwrap();

    let created = client
        .get_or_create_state_typed("ServerState", ClientServerState::new(ClientServerStatus::Ready))
        .await
        .unwrap();
    assert_eq!(created.definition.status, ClientServerStatus::Ready);

    let mut state = created.clone();
    state.definition.status = ClientServerStatus::ExecutionStarted;
    client.update_state_typed(&state).await.unwrap();

    let existing = client
        .get_or_create_state_typed("ServerState", ClientServerState::default())
        .await
        .unwrap();
    assert_eq!(existing.definition.status, ClientServerStatus::ExecutionStarted);

    assert_eq!(client.delete_state("ServerState").await.unwrap().status, 204);
    assert!(client
        .get_state_typed::<ClientServerState>("ServerState")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_upsert_creates_then_replaces_with_a_single_put() {
    let runtime = Arc::new(RuntimeContext::new("agent-1", Uuid::new_v4()));
    let base_url = spawn_agent(runtime).await;
    let client = ApiClient::new(base_url).unwrap();

    let created = client
        .upsert_state("ServerState", ClientServerState::new(ClientServerStatus::Ready))
        .await
        .unwrap();
    assert_eq!(created.definition.status, ClientServerStatus::Ready);

    client
        .upsert_state("ServerState", ClientServerState::new(ClientServerStatus::ExecutionStarted))
        .await
        .unwrap();
    let stored = client
        .get_state_typed::<ClientServerState>("ServerState")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.definition.status, ClientServerStatus::ExecutionStarted);
}

#[tokio::test]
async fn test_get_or_create_returns_existing_document() {
    let runtime = Arc::new(RuntimeContext::new("agent-1", Uuid::new_v4()));
    let base_url = spawn_agent(runtime).await;
    let client = ApiClient::new(base_url).unwrap();

    let first = client
        .get_or_create_state("Barrier", &json!({ "Count": 1 }))
        .await
        .unwrap();
    assert_eq!(first.status, 201);

    let second = client
        .get_or_create_state("Barrier", &json!({ "Count": 2 }))
        .await
        .unwrap();
    assert_eq!(second.status, 200);
    assert_eq!(second.json::<serde_json::Value>().unwrap()["definition"]["Count"], 1);
}

#[tokio::test]
async fn test_polling_timeout_names_the_state() {
    let runtime = Arc::new(RuntimeContext::new("agent-1", Uuid::new_v4()));
    let base_url = spawn_agent(runtime).await;
    let client = ApiClient::new(base_url)
        .unwrap()
        .with_polling_intervals(PollingIntervals::uniform(Duration::from_millis(20)));

    client
        .create_state("Barrier", &json!({ "Status": "Waiting" }))
        .await
        .unwrap();

    let err = client
        .poll_for_expected_state(
            "Barrier",
            &json!({ "Status": "Ready" }),
            |actual, expected| actual == expected,
            Duration::from_millis(150),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Barrier"));
    assert!(err.to_string().contains("Waiting"));
    let reason = classify(&err).and_then(|e| e.reason());
    assert_eq!(reason, Some(ErrorReason::ApiStatePollingTimeout));
}

#[tokio::test]
async fn test_polling_stops_quietly_on_cancellation() {
    let runtime = Arc::new(RuntimeContext::new("agent-1", Uuid::new_v4()));
    let base_url = spawn_agent(runtime).await;
    let client = ApiClient::new(base_url)
        .unwrap()
        .with_polling_intervals(PollingIntervals::uniform(Duration::from_millis(20)));

    let cancellation = CancellationToken::new();
    let canceller = cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        canceller.cancel();
    });

    let state = client
        .synchronize_state(
            "NeverReady",
            || ClientServerState::new(ClientServerStatus::Ready),
            Some(Duration::from_secs(30)),
            &cancellation,
        )
        .await
        .unwrap();
    assert!(state.is_none());
}

#[tokio::test]
async fn test_unreachable_server_is_polled_until_timeout() {
    // Nothing listens on this port; transport errors keep polling alive until the deadline.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = ApiClient::new(format!("http://127.0.0.1:{}", port))
        .unwrap()
        .with_polling_intervals(PollingIntervals::uniform(Duration::from_millis(20)));

    let err = client
        .poll_for_heartbeat(Duration::from_millis(150), &CancellationToken::new())
        .await
        .unwrap_err();
    let reason = classify(&err).and_then(|e| e.reason());
    assert_eq!(reason, Some(ErrorReason::ApiStatePollingTimeout));
}

#[tokio::test]
async fn test_client_waits_for_server_to_publish_ready() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_port = listener.local_addr().unwrap().port();

    let mut server_instance = ClientInstance::new("server-1", "127.0.0.1", Some("Server"));
    server_instance.extensions.insert("ApiPort", server_port as i64);
    let layout = EnvironmentLayout::new(vec![
        ClientInstance::new("client-1", "127.0.0.1", Some("Client")),
        server_instance,
    ]);

    let experiment_id = Uuid::new_v4();
    let server_runtime =
        Arc::new(RuntimeContext::new("server-1", experiment_id).with_layout(layout.clone()));
    let router = create_router(AppState {
        store: Arc::new(InMemoryStateStore::new()),
        runtime: server_runtime.clone(),
    });
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let polling = PollingIntervals::uniform(Duration::from_millis(25));
    let client_runtime = Arc::new(RuntimeContext::new("client-1", experiment_id).with_layout(layout));
    let client_component = StateSynchronization::new(
        ComponentDependencies::new(
            client_runtime,
            Arc::new(ApiClientManager::new(server_port).with_polling_intervals(polling)),
        ),
        [("Timeout", 10i64)].into_iter().collect(),
    );

    let waiting = tokio::spawn(async move {
        run_component(&client_component, &CancellationToken::new()).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiting.is_finished());

    let server_component = StateSynchronization::new(
        ComponentDependencies::new(server_runtime.clone(), Arc::new(ApiClientManager::new(server_port))),
        Default::default(),
    );
    run_component(&server_component, &CancellationToken::new())
        .await
        .unwrap();
    assert!(server_runtime.is_online());
    assert_eq!(server_component.context().state(), ComponentState::Succeeded);

    tokio::time::timeout(Duration::from_secs(5), waiting)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
