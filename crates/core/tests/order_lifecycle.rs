//! Order lifecycle integration tests.
//!
//! These tests drive the orchestrator end-to-end against an in-memory
//! SQLite store and mock provider, object store and broadcaster:
//! created -> uploading -> uploaded -> processing -> completed | failed

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use uuid::Uuid;

use bracketeer_core::{
    broadcast::{order_topic, user_topic},
    orchestrator::{
        BracketGrouping, DownloadRequest, GroupingStrategy, ProcessOptions, Quality, UploadStage,
        WebhookAck, WebhookPayload,
    },
    order::{ListPage, OrderStatus, OrderStore},
    provider::{DownloadOptions, EnhancementProvider},
    testing::{fixtures, MockBroadcaster, MockObjectStore, MockProvider},
    Orchestrator, OrchestratorConfig, OrchestratorError, SqliteOrderStore,
};

const S1_ORDER: &str = "550e8400-e29b-41d4-a716-446655440000";

/// Test helper holding the orchestrator and handles on every mock.
struct TestHarness {
    orchestrator: Orchestrator,
    provider: Arc<MockProvider>,
    objects: Arc<MockObjectStore>,
    broadcaster: Arc<MockBroadcaster>,
    store: Arc<SqliteOrderStore>,
    user: Uuid,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(fixtures::fast_config())
    }

    fn with_config(config: OrchestratorConfig) -> Self {
        let provider = Arc::new(MockProvider::new());
        let objects = Arc::new(MockObjectStore::new());
        let broadcaster = Arc::new(MockBroadcaster::new());
        let store = Arc::new(SqliteOrderStore::in_memory().expect("Failed to open store"));

        let orchestrator = Orchestrator::new(
            config,
            provider.clone(),
            objects.clone(),
            store.clone(),
            broadcaster.clone(),
        );

        Self {
            orchestrator,
            provider,
            objects,
            broadcaster,
            store,
            user: Uuid::new_v4(),
        }
    }

    async fn create_order(&self, name: &str) -> Uuid {
        self.orchestrator
            .create_order(self.user, Some(name.to_string()), None)
            .await
            .expect("Failed to create order")
            .id
    }

    async fn upload(&self, order_id: Uuid, n: usize) -> Vec<String> {
        self.orchestrator
            .upload_files(self.user, order_id, fixtures::numbered_files(n), None)
            .await
            .expect("Upload failed")
            .files
            .into_iter()
            .map(|f| f.bracket_id)
            .collect()
    }

    async fn process(&self, order_id: Uuid) {
        self.orchestrator
            .process_order(self.user, order_id, ProcessOptions::default())
            .await
            .expect("Process failed");
    }

    /// Deliver a webhook and wait for its background work.
    async fn webhook(&self, payload: WebhookPayload) -> WebhookAck {
        let dispatch = self
            .orchestrator
            .handle_webhook(payload)
            .expect("Webhook rejected");
        if let Some(task) = dispatch.task {
            task.await.expect("Webhook task panicked");
        }
        dispatch.ack
    }

    fn status(&self, order_id: Uuid) -> OrderStatus {
        self.store
            .get_order(order_id, self.user)
            .unwrap()
            .expect("Order missing")
            .status
    }

    async fn order_events(&self, order_id: Uuid) -> Vec<String> {
        self.broadcaster.events_on(&order_topic(order_id)).await
    }
}

fn image_processed(order_id: Uuid, image_id: Option<&str>, error: bool, processing: bool) -> WebhookPayload {
    WebhookPayload {
        event: "image_processed".to_string(),
        image_id: image_id.map(str::to_string),
        error,
        order_id: Some(order_id.to_string()),
        order_is_processing: processing,
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_happy_path() {
    let h = TestHarness::new();
    h.provider.queue_order_id(S1_ORDER).await;

    let order = h
        .orchestrator
        .create_order(h.user, Some("S1".to_string()), None)
        .await
        .unwrap();
    assert_eq!(order.id.to_string(), S1_ORDER);
    assert_eq!(order.status, OrderStatus::Created);
    assert_eq!(order.name.as_deref(), Some("S1"));

    let outcome = h
        .orchestrator
        .upload_files(h.user, order.id, fixtures::numbered_files(3), None)
        .await
        .unwrap();
    assert_eq!(outcome.status, OrderStatus::Uploaded);
    assert_eq!(outcome.files.len(), 3);
    assert!(outcome.errors.is_empty());
    assert!(outcome.files.iter().all(|f| f.verified));
    let group = &outcome.files[0].group_id;
    assert!(outcome.files.iter().all(|f| &f.group_id == group));

    let summary = h
        .orchestrator
        .process_order(
            h.user,
            order.id,
            ProcessOptions {
                enhance_type: Some("property".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(summary.status, OrderStatus::Processing);
    assert_eq!(summary.image_count, 1);

    let requests = h.provider.process_requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].images.len(), 1);
    assert_eq!(
        requests[0].images[0].bracket_ids,
        h.provider.bracket_ids(S1_ORDER).await
    );

    h.provider.add_image(S1_ORDER, "img1", "completed").await;
    h.provider.set_processing(S1_ORDER, false).await;
    let ack = h
        .webhook(image_processed(order.id, Some("img1"), false, false))
        .await;
    assert_eq!(ack, WebhookAck::Accepted);

    let stored = h.store.get_order(order.id, h.user).unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Completed);
    assert_eq!(stored.progress, 100);

    let files = h.orchestrator.get_files(h.user, order.id).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].provider_image_id.as_deref(), Some("img1"));
    assert!(files[0].is_final);
    assert_eq!(
        h.objects.fetch(&files[0].storage_url).await,
        Some(MockProvider::enhanced_bytes("img1", &DownloadOptions::default()))
    );

    assert_eq!(
        h.order_events(order.id).await,
        vec![
            "upload_started",
            "upload_completed",
            "processing_started",
            "webhook_image_processed",
            "download_ready",
            "processing_completed",
        ]
    );

    let published = h.broadcaster.published().await;
    let started = published
        .iter()
        .find(|m| m.event == "upload_started")
        .unwrap();
    assert_eq!(started.payload["file_count"], 3);
    let ready = published
        .iter()
        .find(|m| m.event == "download_ready")
        .unwrap();
    assert_eq!(ready.payload["storage_urls"], json!([files[0].storage_url]));

    assert_eq!(
        h.broadcaster.events_on(&user_topic(h.user)).await,
        vec!["download_ready"]
    );
}

#[tokio::test]
async fn test_grouped_multi_shot() {
    let h = TestHarness::new();
    let order_id = h.create_order("S2").await;

    let first = h.upload(order_id, 3).await;
    let second = h.upload(order_id, 3).await;
    assert_eq!(h.status(order_id), OrderStatus::Uploaded);

    h.process(order_id).await;
    let requests = h.provider.process_requests().await;
    let groups: Vec<Vec<String>> = requests[0]
        .images
        .iter()
        .map(|g| g.bracket_ids.clone())
        .collect();
    assert_eq!(groups, vec![first, second]);

    let provider_id = order_id.to_string();
    h.provider.add_image(&provider_id, "aaaaaaaa-1", "completed").await;
    h.provider.add_image(&provider_id, "bbbbbbbb-2", "completed").await;
    h.provider.set_processing(&provider_id, false).await;
    h.webhook(image_processed(order_id, Some("bbbbbbbb-2"), false, false))
        .await;

    let files = h.orchestrator.get_files(h.user, order_id).unwrap();
    assert_eq!(files.len(), 2);

    let ready: Vec<_> = h
        .broadcaster
        .published()
        .await
        .into_iter()
        .filter(|m| m.event == "download_ready" && m.topic == order_topic(order_id))
        .collect();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].payload["storage_urls"].as_array().unwrap().len(), 2);
    assert_eq!(h.status(order_id), OrderStatus::Completed);
}

#[tokio::test]
async fn test_partial_upload() {
    let h = TestHarness::new();
    let order_id = h.create_order("S3").await;
    h.provider.fail_matching("upload_blob", "3.jpg", 500).await;

    let outcome = h
        .orchestrator
        .upload_files(h.user, order_id, fixtures::numbered_files(5), None)
        .await
        .unwrap();

    assert_eq!(outcome.status, OrderStatus::Uploaded);
    assert_eq!(outcome.files.len(), 4);
    assert!(outcome.files.iter().all(|f| f.filename != "3.jpg"));
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].filename, "3.jpg");
    assert_eq!(outcome.errors[0].stage, UploadStage::Upload);

    // Three attempts for the failing PUT, one for each of the others.
    assert_eq!(h.provider.call_count("upload_blob").await, 4 + 3);
    assert_eq!(h.store.get_brackets_by_order(order_id).unwrap().len(), 4);

    let completed = h
        .broadcaster
        .published()
        .await
        .into_iter()
        .find(|m| m.event == "upload_completed")
        .unwrap();
    assert_eq!(completed.payload["file_count"], 4);
}

#[tokio::test]
async fn test_webhook_with_error() {
    let h = TestHarness::new();
    let order_id = h.create_order("S4").await;
    h.upload(order_id, 2).await;
    h.process(order_id).await;

    h.webhook(image_processed(order_id, Some("img1"), true, false))
        .await;

    let order = h.store.get_order(order_id, h.user).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(order.error_message.as_deref(), Some("image processing failed"));

    let events = h.order_events(order_id).await;
    assert_eq!(events.last().map(String::as_str), Some("processing_failed"));
    assert_eq!(
        h.broadcaster.events_on(&user_topic(h.user)).await,
        vec!["processing_failed"]
    );
    assert_eq!(h.provider.call_count("download_enhanced").await, 0);
}

#[tokio::test]
async fn test_webhook_mid_stream() {
    let h = TestHarness::new();
    let order_id = h.create_order("S5").await;
    h.orchestrator
        .upload_files(h.user, order_id, fixtures::numbered_files(6), Some("a,a,a,b,b,b"))
        .await
        .unwrap();
    h.process(order_id).await;
    h.provider
        .add_image(&order_id.to_string(), "img1", "completed")
        .await;

    h.webhook(image_processed(order_id, Some("img1"), false, true))
        .await;

    assert_eq!(h.status(order_id), OrderStatus::Processing);
    assert_eq!(h.provider.call_count("download_enhanced").await, 0);
    assert!(h.orchestrator.get_files(h.user, order_id).unwrap().is_empty());

    let events = h.order_events(order_id).await;
    assert!(events.contains(&"webhook_image_processed".to_string()));
    assert!(!events.contains(&"download_ready".to_string()));

    // Two images dispatched, one completed.
    let progress = h
        .broadcaster
        .published()
        .await
        .into_iter()
        .find(|m| m.event == "processing_progress")
        .unwrap();
    assert_eq!(progress.payload["progress"], 50);
}

#[tokio::test]
async fn test_explicit_grouping() {
    let h = TestHarness::new();
    let order_id = h.create_order("S6").await;
    let ids = h.upload(order_id, 6).await;

    let requested = vec![ids[0..3].to_vec(), ids[3..6].to_vec()];
    let summary = h
        .orchestrator
        .process_order(
            h.user,
            order_id,
            ProcessOptions {
                bracket_grouping: Some(BracketGrouping::Explicit(requested.clone())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(summary.grouping, "explicit");
    assert_eq!(summary.image_count, 2);

    let dispatched: Vec<Vec<String>> = h.provider.process_requests().await[0]
        .images
        .iter()
        .map(|g| g.bracket_ids.clone())
        .collect();
    assert_eq!(dispatched, requested);
}

// =============================================================================
// Boundaries and failure paths
// =============================================================================

#[tokio::test]
async fn test_upload_boundaries() {
    let h = TestHarness::new();
    let order_id = h.create_order("bounds").await;

    let empty = h
        .orchestrator
        .upload_files(h.user, order_id, vec![], None)
        .await;
    assert!(matches!(empty, Err(OrchestratorError::Validation(_))));

    let mismatch = h
        .orchestrator
        .upload_files(h.user, order_id, fixtures::numbered_files(3), Some("a,b"))
        .await;
    assert!(matches!(mismatch, Err(OrchestratorError::Validation(_))));

    // Neither call touched the order.
    assert_eq!(h.status(order_id), OrderStatus::Created);
    assert_eq!(h.provider.call_count("create_bracket").await, 0);

    let missing = h
        .orchestrator
        .upload_files(h.user, Uuid::new_v4(), fixtures::numbered_files(1), None)
        .await;
    assert!(matches!(missing, Err(OrchestratorError::NotFound(_))));
}

#[tokio::test]
async fn test_process_without_brackets() {
    let h = TestHarness::new();
    let order_id = h.create_order("empty").await;

    let result = h
        .orchestrator
        .process_order(h.user, order_id, ProcessOptions::default())
        .await;
    assert!(matches!(result, Err(OrchestratorError::Validation(_))));
    assert_eq!(h.provider.call_count("process_order").await, 0);
}

#[tokio::test]
async fn test_process_twice_is_invalid_state() {
    let h = TestHarness::new();
    let order_id = h.create_order("twice").await;
    h.upload(order_id, 3).await;
    h.process(order_id).await;

    let again = h
        .orchestrator
        .process_order(h.user, order_id, ProcessOptions::default())
        .await;
    assert!(matches!(again, Err(OrchestratorError::InvalidState(_))));

    let upload = h
        .orchestrator
        .upload_files(h.user, order_id, fixtures::numbered_files(1), None)
        .await;
    assert!(matches!(upload, Err(OrchestratorError::InvalidState(_))));
}

#[tokio::test]
async fn test_all_uploads_failing_fails_order() {
    let h = TestHarness::new();
    let order_id = h.create_order("doomed").await;
    h.provider.fail_matching("create_bracket", ".jpg", 500).await;

    let result = h
        .orchestrator
        .upload_files(h.user, order_id, fixtures::numbered_files(2), None)
        .await;
    match result {
        Err(OrchestratorError::UploadFailed(errors)) => {
            assert_eq!(errors.len(), 2);
            assert!(errors.iter().all(|e| e.stage == UploadStage::CreateBracket));
        }
        other => panic!("expected UploadFailed, got {:?}", other.map(|o| o.files.len())),
    }
    assert_eq!(h.status(order_id), OrderStatus::Failed);
    assert!(h
        .order_events(order_id)
        .await
        .contains(&"processing_failed".to_string()));
}

#[tokio::test]
async fn test_unconfirmed_upload_is_a_warning() {
    let h = TestHarness::new();
    let order_id = h.create_order("slow").await;
    h.provider.set_confirm_uploads(false).await;

    let outcome = h
        .orchestrator
        .upload_files(h.user, order_id, fixtures::numbered_files(1), None)
        .await
        .unwrap();
    assert_eq!(outcome.files.len(), 1);
    assert!(!outcome.files[0].verified);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].stage, UploadStage::Verify);
    assert_eq!(outcome.status, OrderStatus::Uploaded);
}

#[tokio::test]
async fn test_transient_provider_errors_are_retried() {
    let h = TestHarness::new();
    h.provider.fail_times("create_order", 2, 503).await;

    let order_id = h.create_order("flaky").await;
    assert_eq!(h.provider.call_count("create_order").await, 3);
    assert_eq!(h.status(order_id), OrderStatus::Created);
}

#[tokio::test]
async fn test_process_dispatch_failure_fails_order() {
    let h = TestHarness::new();
    let order_id = h.create_order("reject").await;
    h.upload(order_id, 3).await;
    h.provider.fail_times("process_order", 1, 400).await;

    let result = h
        .orchestrator
        .process_order(h.user, order_id, ProcessOptions::default())
        .await;
    assert!(matches!(result, Err(OrchestratorError::Provider(_))));
    // Client errors are not retried.
    assert_eq!(h.provider.call_count("process_order").await, 1);

    let order = h.store.get_order(order_id, h.user).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Failed);
    assert!(order.error_message.unwrap().contains("process dispatch failed"));
}

#[tokio::test]
async fn test_failure_after_completion_is_ignored() {
    let h = TestHarness::new();
    let order_id = h.create_order("late").await;
    h.upload(order_id, 3).await;
    h.process(order_id).await;

    let provider_id = order_id.to_string();
    h.provider.add_image(&provider_id, "img1", "completed").await;
    h.provider.set_processing(&provider_id, false).await;
    h.webhook(image_processed(order_id, Some("img1"), false, false))
        .await;
    assert_eq!(h.status(order_id), OrderStatus::Completed);

    h.webhook(image_processed(order_id, Some("img1"), true, false))
        .await;
    let order = h.store.get_order(order_id, h.user).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert!(order.error_message.is_none());
}

#[tokio::test]
async fn test_completion_replay_is_idempotent() {
    let h = TestHarness::new();
    let order_id = h.create_order("replay").await;
    h.upload(order_id, 3).await;
    h.process(order_id).await;

    let provider_id = order_id.to_string();
    h.provider.add_image(&provider_id, "img1", "completed").await;
    h.provider.set_processing(&provider_id, false).await;

    h.webhook(image_processed(order_id, Some("img1"), false, false))
        .await;
    h.webhook(image_processed(order_id, Some("img1"), false, false))
        .await;

    let events = h.order_events(order_id).await;
    assert_eq!(events.iter().filter(|e| *e == "download_ready").count(), 2);

    let order = h.store.get_order(order_id, h.user).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.progress, 100);

    // Filenames carry second-resolution timestamps: a replay within the same
    // second rewrites the existing row, a later one adds a row. Either way
    // every row points at its own stored blob.
    let files = h.orchestrator.get_files(h.user, order_id).unwrap();
    assert!(!files.is_empty() && files.len() <= 2);
    assert!(files.iter().all(|f| f.is_final));
    assert_eq!(files.len(), h.objects.paths().await.len());
}

#[tokio::test]
async fn test_completion_replay_after_a_second_adds_fresh_files() {
    let h = TestHarness::new();
    let order_id = h.create_order("replay-later").await;
    h.upload(order_id, 3).await;
    h.process(order_id).await;

    let provider_id = order_id.to_string();
    h.provider.add_image(&provider_id, "img1", "completed").await;
    h.provider.set_processing(&provider_id, false).await;

    h.webhook(image_processed(order_id, Some("img1"), false, false))
        .await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    h.webhook(image_processed(order_id, Some("img1"), false, false))
        .await;

    let files = h.orchestrator.get_files(h.user, order_id).unwrap();
    assert_eq!(files.len(), 2);
    assert_ne!(files[0].storage_path, files[1].storage_path);
    assert!(files.iter().all(|f| f.is_final));
    assert_eq!(h.status(order_id), OrderStatus::Completed);
    assert_eq!(
        h.order_events(order_id)
            .await
            .iter()
            .filter(|e| *e == "download_ready")
            .count(),
        2
    );
}

#[tokio::test]
async fn test_completion_during_dispatch_settles_order() {
    let h = TestHarness::new();
    let order_id = h.create_order("race").await;
    h.upload(order_id, 3).await;
    h.provider
        .set_delay("process_order", Duration::from_millis(200))
        .await;

    let orchestrator = h.orchestrator.clone();
    let user = h.user;
    let dispatch = tokio::spawn(async move {
        orchestrator
            .process_order(user, order_id, ProcessOptions::default())
            .await
    });

    for _ in 0..100 {
        if h.provider.call_count("process_order").await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.status(order_id), OrderStatus::Processing);

    h.provider
        .add_image(&order_id.to_string(), "img1", "completed")
        .await;
    h.webhook(image_processed(order_id, Some("img1"), false, false))
        .await;
    assert_eq!(h.status(order_id), OrderStatus::Completed);

    let summary = dispatch.await.unwrap().unwrap();
    assert_eq!(summary.status, OrderStatus::Completed);

    let order = h.store.get_order(order_id, h.user).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.progress, 100);
    assert!(!order.is_processing);
    assert_eq!(h.orchestrator.get_files(h.user, order_id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_dispatch_marks_processing_before_provider_call() {
    let h = TestHarness::new();
    let order_id = h.create_order("early").await;
    h.upload(order_id, 3).await;
    h.provider
        .set_delay("process_order", Duration::from_millis(100))
        .await;

    let orchestrator = h.orchestrator.clone();
    let user = h.user;
    let dispatch = tokio::spawn(async move {
        orchestrator
            .process_order(user, order_id, ProcessOptions::default())
            .await
    });
    for _ in 0..100 {
        if h.provider.call_count("process_order").await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.status(order_id), OrderStatus::Processing);

    let summary = dispatch.await.unwrap().unwrap();
    assert_eq!(summary.status, OrderStatus::Processing);
    let order = h.store.get_order(order_id, h.user).unwrap().unwrap();
    assert!(order.is_processing);
}

#[tokio::test]
async fn test_completion_with_no_finished_images_keeps_status() {
    let h = TestHarness::new();
    let order_id = h.create_order("nothing").await;
    h.upload(order_id, 3).await;
    h.process(order_id).await;
    h.provider
        .add_image(&order_id.to_string(), "img1", "processing")
        .await;

    h.webhook(image_processed(order_id, Some("img1"), false, false))
        .await;

    assert_eq!(h.status(order_id), OrderStatus::Processing);
    assert!(!h
        .order_events(order_id)
        .await
        .contains(&"download_ready".to_string()));
}

#[tokio::test]
async fn test_webhook_structural_errors() {
    let h = TestHarness::new();

    let missing = h.orchestrator.handle_webhook(WebhookPayload {
        event: "image_processed".to_string(),
        image_id: None,
        error: false,
        order_id: None,
        order_is_processing: false,
    });
    assert!(matches!(missing, Err(OrchestratorError::Validation(_))));

    let bad = h.orchestrator.handle_webhook(WebhookPayload {
        event: "image_processed".to_string(),
        image_id: None,
        error: false,
        order_id: Some("not-a-uuid".to_string()),
        order_is_processing: false,
    });
    assert!(matches!(bad, Err(OrchestratorError::Validation(_))));

    let updated = h
        .webhook(WebhookPayload {
            event: "webhook_updated".to_string(),
            image_id: None,
            error: false,
            order_id: None,
            order_is_processing: false,
        })
        .await;
    assert_eq!(updated, WebhookAck::Updated);

    let ignored = h
        .webhook(WebhookPayload {
            event: "something_else".to_string(),
            image_id: None,
            error: false,
            order_id: None,
            order_is_processing: false,
        })
        .await;
    assert_eq!(ignored, WebhookAck::Ignored);
}

#[tokio::test]
async fn test_webhook_for_unknown_order_is_dropped() {
    let h = TestHarness::new();
    let unknown = Uuid::new_v4();

    h.webhook(image_processed(unknown, None, true, false)).await;
    h.webhook(image_processed(unknown, None, false, false)).await;

    // The webhook event is still announced on the order topic.
    assert_eq!(
        h.order_events(unknown).await,
        vec!["webhook_image_processed", "webhook_image_processed"]
    );
}

// =============================================================================
// Order management
// =============================================================================

#[tokio::test]
async fn test_orders_are_scoped_to_their_owner() {
    let h = TestHarness::new();
    let order_id = h.create_order("mine").await;
    let stranger = Uuid::new_v4();

    assert!(matches!(
        h.orchestrator.get_order(stranger, order_id).await,
        Err(OrchestratorError::NotFound(_))
    ));
    assert!(h
        .orchestrator
        .list_orders(stranger, Default::default())
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        h.orchestrator.delete_order(stranger, order_id).await,
        Err(OrchestratorError::NotFound(_))
    ));
    assert_eq!(
        h.orchestrator
            .list_orders(h.user, Default::default())
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_delete_order_removes_everything() {
    let h = TestHarness::new();
    let order_id = h.create_order("gone").await;
    h.upload(order_id, 3).await;
    h.process(order_id).await;

    let provider_id = order_id.to_string();
    h.provider.add_image(&provider_id, "img1", "completed").await;
    h.provider.set_processing(&provider_id, false).await;
    h.webhook(image_processed(order_id, Some("img1"), false, false))
        .await;
    assert_eq!(h.objects.paths().await.len(), 1);

    h.orchestrator.delete_order(h.user, order_id).await.unwrap();

    assert!(!h.provider.has_order(&provider_id).await);
    assert!(h.objects.paths().await.is_empty());
    assert!(h.store.get_order(order_id, h.user).unwrap().is_none());
    assert!(h.store.get_brackets_by_order(order_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_order_tolerates_missing_provider_order() {
    let h = TestHarness::new();
    let order_id = h.create_order("orphan").await;
    h.provider
        .set_next_error(bracketeer_core::ProviderError::NotFound("order".to_string()))
        .await;

    h.orchestrator.delete_order(h.user, order_id).await.unwrap();
    assert!(h.store.get_order(order_id, h.user).unwrap().is_none());
}

#[tokio::test]
async fn test_delete_order_keeps_rows_when_provider_fails() {
    let h = TestHarness::new();
    let order_id = h.create_order("stuck").await;
    h.provider.fail_times("delete_order", 3, 500).await;

    let result = h.orchestrator.delete_order(h.user, order_id).await;
    assert!(matches!(result, Err(OrchestratorError::Provider(_))));
    assert!(h.store.get_order(order_id, h.user).unwrap().is_some());
}

#[tokio::test]
async fn test_delete_bracket_by_provider_id() {
    let h = TestHarness::new();
    let order_id = h.create_order("trim").await;
    let ids = h.upload(order_id, 3).await;

    let removed = h
        .orchestrator
        .delete_bracket(h.user, order_id, &ids[1])
        .unwrap();
    assert_eq!(removed.bracket_id, ids[1]);

    let left: Vec<String> = h
        .orchestrator
        .get_brackets(h.user, order_id)
        .unwrap()
        .into_iter()
        .map(|b| b.bracket_id)
        .collect();
    assert_eq!(left, vec![ids[0].clone(), ids[2].clone()]);

    assert!(matches!(
        h.orchestrator.delete_bracket(h.user, order_id, "nope"),
        Err(OrchestratorError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_verify_adopts_image_ids() {
    let h = TestHarness::new();
    let order_id = h.create_order("verify").await;
    let ids = h.upload(order_id, 3).await;

    h.provider.set_bracket_image(&ids[0], "img-x").await;
    h.provider.forget_bracket(&ids[2]).await;

    let report = h.orchestrator.verify_order(h.user, order_id).await.unwrap();
    assert_eq!(report.local_brackets, 3);
    assert_eq!(report.provider_brackets, 2);
    assert_eq!(report.uploaded_on_provider, 2);
    assert_eq!(report.missing_on_provider, vec![ids[2].clone()]);
    assert!(report.unknown_locally.is_empty());
    assert_eq!(report.image_ids_adopted, 1);
    assert_eq!(report.brackets[0].image_id.as_deref(), Some("img-x"));

    let again = h.orchestrator.verify_order(h.user, order_id).await.unwrap();
    assert_eq!(again.image_ids_adopted, 0);
}

#[tokio::test]
async fn test_status_view_counts() {
    let h = TestHarness::new();
    let order_id = h.create_order("status").await;
    h.upload(order_id, 2).await;

    let view = h.orchestrator.order_status(h.user, order_id).unwrap();
    assert_eq!(view.status, OrderStatus::Uploaded);
    assert_eq!(view.bracket_count, 2);
    assert_eq!(view.file_count, 0);
}

// =============================================================================
// On-demand downloads
// =============================================================================

#[tokio::test]
async fn test_on_demand_download_and_delete() {
    let h = TestHarness::new();
    let order_id = h.create_order("downloads").await;
    h.provider
        .add_image(&order_id.to_string(), "img1", "completed")
        .await;

    let outcome = h
        .orchestrator
        .download_image(
            h.user,
            order_id,
            "img1",
            DownloadRequest {
                quality: Quality::Thumbnail,
                watermark: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(outcome.consumes_credits);
    assert_eq!(outcome.file.filename, "img1_thumbnail.jpg");
    assert!(outcome.message.contains("credits"));

    // Same quality again refreshes the same row.
    h.orchestrator
        .download_image(
            h.user,
            order_id,
            "img1",
            DownloadRequest {
                quality: Quality::Thumbnail,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(h.orchestrator.get_files(h.user, order_id).unwrap().len(), 1);

    let listing = h.orchestrator.list_images(h.user, order_id).await.unwrap();
    assert!(listing.provider_reachable);
    assert_eq!(listing.images.len(), 1);
    assert!(listing.images[0].downloaded);

    let removed = h
        .orchestrator
        .delete_image(h.user, order_id, "img1")
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(h.objects.paths().await.is_empty());
    assert!(matches!(
        h.orchestrator.delete_image(h.user, order_id, "img1").await,
        Err(OrchestratorError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_download_unknown_image() {
    let h = TestHarness::new();
    let order_id = h.create_order("unknown").await;

    let result = h
        .orchestrator
        .download_image(h.user, order_id, "ghost", DownloadRequest::default())
        .await;
    assert!(matches!(result, Err(OrchestratorError::NotFound(_))));
}

#[tokio::test]
async fn test_list_images_when_provider_unreachable() {
    let h = TestHarness::new();
    let order_id = h.create_order("offline").await;
    h.provider
        .add_image(&order_id.to_string(), "img1", "completed")
        .await;
    h.orchestrator
        .download_image(h.user, order_id, "img1", DownloadRequest::default())
        .await
        .unwrap();

    h.provider
        .set_next_error(bracketeer_core::ProviderError::Timeout)
        .await;
    let listing = h.orchestrator.list_images(h.user, order_id).await.unwrap();
    assert!(!listing.provider_reachable);
    assert_eq!(listing.images.len(), 1);
    assert_eq!(listing.images[0].image_id, "img1");
}

#[tokio::test]
async fn test_auto_grouping_override() {
    let h = TestHarness::new();
    let order_id = h.create_order("auto").await;
    h.upload(order_id, 5).await;

    let summary = h
        .orchestrator
        .process_order(
            h.user,
            order_id,
            ProcessOptions {
                bracket_grouping: Some(BracketGrouping::Strategy(GroupingStrategy::Auto)),
                brackets_per_image: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(summary.image_count, 3);
    assert_eq!(summary.grouping, "auto");
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn test_listing_fills_unnamed_orders_from_provider() {
    let h = TestHarness::new();
    let order = h.orchestrator.create_order(h.user, None, None).await.unwrap();
    assert!(order.name.is_none());

    let mut provider_order = h.provider.get_order(&order.id.to_string()).await.unwrap();
    provider_order.name = Some("named later".to_string());
    h.provider.insert_order(provider_order).await;

    let orders = h
        .orchestrator
        .list_orders(h.user, ListPage::default())
        .await
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].name.as_deref(), Some("named later"));
}

#[tokio::test]
async fn test_listing_does_not_wait_on_slow_provider() {
    let h = TestHarness::with_config(OrchestratorConfig {
        refresh_timeout_ms: 50,
        ..fixtures::fast_config()
    });
    for _ in 0..4 {
        h.orchestrator.create_order(h.user, None, None).await.unwrap();
    }
    h.orchestrator
        .create_order(h.user, Some("named".to_string()), None)
        .await
        .unwrap();
    h.provider
        .set_delay("get_order", Duration::from_secs(2))
        .await;

    let started = Instant::now();
    let orders = h
        .orchestrator
        .list_orders(h.user, ListPage::default())
        .await
        .unwrap();

    assert!(
        started.elapsed() < Duration::from_secs(1),
        "listing took {:?}",
        started.elapsed()
    );
    assert_eq!(orders.len(), 5);
    assert_eq!(orders.iter().filter(|o| o.name.is_none()).count(), 4);
    // Only unnamed rows hit the provider.
    assert_eq!(h.provider.call_count("get_order").await, 4);
}
