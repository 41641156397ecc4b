//! Integration tests for the batch generation HTTP surface.
//!
//! Each test spins up an Axum server on a random port with a stub job
//! handler (no upstream calls) and drives the REST contract end to end:
//! submit a batch, poll job and batch status to terminal states, and
//! exercise the error paths.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use bulk_studio::api::{AppState, routes};
use bulk_studio::config::{GenerationConfig, QueueConfig};
use bulk_studio::generation::GenerationPayload;
use bulk_studio::prompts::PromptClassifier;
use bulk_studio::queue::{Job, JobHandler, QueueManager};
use bulk_studio::store::LibSqlStore;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stub generation handler: succeeds unless the prompt asks it not to.
struct StubGeneration;

#[async_trait]
impl JobHandler for StubGeneration {
    async fn handle(&self, job: &Job) -> anyhow::Result<Value> {
        let payload: GenerationPayload = serde_json::from_value(job.payload.clone())?;
        if payload.prompt_data.prompt.contains("explode") {
            anyhow::bail!("upstream rejected the prompt");
        }
        Ok(json!({
            "generationId": format!("gen-{}", payload.prompt_index),
            "images": [format!("/outputs/p_{}.png", payload.prompt_index)],
        }))
    }
}

/// Start a server on a random port with two workers and a stub handler.
async fn start_server() -> (u16, Arc<QueueManager>) {
    let queue = Arc::new(QueueManager::with_handler(
        QueueConfig::default(),
        Arc::new(StubGeneration),
    ));
    queue.start(2).await.unwrap();

    let state = AppState {
        queue: Arc::clone(&queue),
        store: Arc::new(LibSqlStore::new_memory().await.unwrap()),
        generation: GenerationConfig::default(),
        classifier: Arc::new(PromptClassifier::new()),
    };
    let app = routes(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, queue)
}

async fn get_json(client: &reqwest::Client, port: u16, path: &str) -> (u16, Value) {
    let response = client
        .get(format!("http://127.0.0.1:{port}{path}"))
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

/// Poll batch status until every job has reached a terminal state.
async fn wait_for_batch(
    client: &reqwest::Client,
    port: u16,
    batch_id: &str,
    total: u64,
) -> Value {
    loop {
        let (_, body) = get_json(client, port, &format!("/api/batches/{batch_id}")).await;
        let done = body["completed"].as_u64().unwrap() + body["failed"].as_u64().unwrap();
        if done == total {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn batch_runs_to_terminal_states() {
    timeout(TEST_TIMEOUT, async {
        let (port, _queue) = start_server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://127.0.0.1:{port}/api/generate/batch"))
            .json(&json!({
                "apiKey": "test-key",
                "items": [
                    { "prompt": "a fox in the snow", "modelId": "m1" },
                    { "prompt": "please explode", "modelId": "m1" },
                    { "prompt": "a second fox", "modelId": "m1" }
                ]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();

        let batch_id = body["batchId"].as_str().unwrap().to_string();
        let job_ids: Vec<String> = body["jobIds"]
            .as_array()
            .unwrap()
            .iter()
            .map(|id| id.as_str().unwrap().to_string())
            .collect();
        assert_eq!(job_ids.len(), 3);
        assert_eq!(body["message"], "Queued 3 jobs");

        let summary = wait_for_batch(&client, port, &batch_id, 3).await;
        assert_eq!(summary["total"], 3);
        assert_eq!(summary["completed"], 2);
        assert_eq!(summary["failed"], 1);
        assert_eq!(summary["processing"], 0);
        assert_eq!(summary["queued"], 0);

        // The failing prompt carries its handler error verbatim; the
        // successes carry the handler result.
        let (status, good) = get_json(&client, port, &format!("/api/jobs/{}", job_ids[0])).await;
        assert_eq!(status, 200);
        assert_eq!(good["status"], "completed");
        assert_eq!(good["result"]["generationId"], "gen-1");
        assert!(good["error"].is_null());

        let (_, bad) = get_json(&client, port, &format!("/api/jobs/{}", job_ids[1])).await;
        assert_eq!(bad["status"], "failed");
        assert_eq!(bad["error"], "upstream rejected the prompt");
        assert!(bad["result"].is_null());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn submission_returns_before_jobs_finish() {
    timeout(TEST_TIMEOUT, async {
        let (port, queue) = start_server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://127.0.0.1:{port}/api/generate/batch"))
            .json(&json!({
                "items": [{ "prompt": "a fox", "modelId": "m1" }]
            }))
            .send()
            .await
            .unwrap();
        let body: Value = response.json().await.unwrap();
        let job_id = body["jobIds"][0].as_str().unwrap().to_string();

        // Fire-and-forget contract: the job exists immediately, whatever
        // state it is in by now.
        let (status, job) = get_json(&client, port, &format!("/api/jobs/{job_id}")).await;
        assert_eq!(status, 200);
        assert!(["queued", "processing", "completed"]
            .contains(&job["status"].as_str().unwrap()));

        let batch_id = body["batchId"].as_str().unwrap().to_string();
        wait_for_batch(&client, port, &batch_id, 1).await;
        queue.stop().await;
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    timeout(TEST_TIMEOUT, async {
        let (port, _queue) = start_server().await;
        let client = reqwest::Client::new();

        let (status, body) = get_json(
            &client,
            port,
            &format!("/api/jobs/{}", uuid::Uuid::new_v4()),
        )
        .await;
        assert_eq!(status, 404);
        assert_eq!(body["detail"], "Job not found");

        // An unknown batch id is an empty aggregate, not an error.
        let (status, body) = get_json(&client, port, "/api/batches/nope1234").await;
        assert_eq!(status, 200);
        assert_eq!(body["total"], 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn classification_over_http() {
    timeout(TEST_TIMEOUT, async {
        let (port, _queue) = start_server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://127.0.0.1:{port}/api/classify-prompts"))
            .json(&json!({
                "prompts": [
                    { "number": "101", "prompt": "crystal gem emblem, no cape" },
                    { "number": "102", "prompt": "no emblem at all" }
                ]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();

        assert_eq!(body["total"], 2);
        assert_eq!(body["valid"], 1);
        assert_eq!(body["results"][0]["group"], 6);
        assert_eq!(body["results"][0]["chest_type"], "Gem");
        assert_eq!(body["results"][1]["is_valid"], false);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn health_endpoint_responds() {
    timeout(TEST_TIMEOUT, async {
        let (port, _queue) = start_server().await;
        let client = reqwest::Client::new();

        let (status, body) = get_json(&client, port, "/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "bulk-studio");
    })
    .await
    .expect("test timed out");
}
