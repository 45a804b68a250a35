use serde_json::{json, Value};
use uuid::Uuid;

pub fn order_topic(order_id: Uuid) -> String {
    format!("order:{}", order_id)
}

pub fn user_topic(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

/// The closed set of events clients can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    UploadStarted {
        order_id: Uuid,
        file_count: usize,
    },
    UploadCompleted {
        order_id: Uuid,
        file_count: usize,
    },
    ProcessingStarted {
        order_id: Uuid,
    },
    ProcessingProgress {
        order_id: Uuid,
        progress: u8,
    },
    /// Raw provider callback, forwarded as received.
    WebhookImageProcessed {
        order_id: Uuid,
        image_id: Option<String>,
        error: bool,
        order_is_processing: bool,
    },
    DownloadReady {
        order_id: Uuid,
        storage_urls: Vec<String>,
    },
    ProcessingCompleted {
        order_id: Uuid,
        file_count: usize,
    },
    ProcessingFailed {
        order_id: Uuid,
        error: String,
    },
}

impl OrderEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::UploadStarted { .. } => "upload_started",
            OrderEvent::UploadCompleted { .. } => "upload_completed",
            OrderEvent::ProcessingStarted { .. } => "processing_started",
            OrderEvent::ProcessingProgress { .. } => "processing_progress",
            OrderEvent::WebhookImageProcessed { .. } => "webhook_image_processed",
            OrderEvent::DownloadReady { .. } => "download_ready",
            OrderEvent::ProcessingCompleted { .. } => "processing_completed",
            OrderEvent::ProcessingFailed { .. } => "processing_failed",
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            OrderEvent::UploadStarted { order_id, .. }
            | OrderEvent::UploadCompleted { order_id, .. }
            | OrderEvent::ProcessingStarted { order_id }
            | OrderEvent::ProcessingProgress { order_id, .. }
            | OrderEvent::WebhookImageProcessed { order_id, .. }
            | OrderEvent::DownloadReady { order_id, .. }
            | OrderEvent::ProcessingCompleted { order_id, .. }
            | OrderEvent::ProcessingFailed { order_id, .. } => *order_id,
        }
    }

    /// Events also mirrored on the owner's `user:` topic.
    pub fn is_user_scoped(&self) -> bool {
        matches!(
            self,
            OrderEvent::DownloadReady { .. } | OrderEvent::ProcessingFailed { .. }
        )
    }

    /// Payload without the timestamp (the broadcaster adds it).
    pub fn payload(&self) -> Value {
        match self {
            OrderEvent::UploadStarted {
                order_id,
                file_count,
            } => json!({
                "order_id": order_id,
                "status": "uploading",
                "file_count": file_count,
            }),
            OrderEvent::UploadCompleted {
                order_id,
                file_count,
            } => json!({
                "order_id": order_id,
                "status": "uploaded",
                "file_count": file_count,
            }),
            OrderEvent::ProcessingStarted { order_id } => json!({
                "order_id": order_id,
                "status": "processing",
            }),
            OrderEvent::ProcessingProgress { order_id, progress } => json!({
                "order_id": order_id,
                "progress": progress,
            }),
            OrderEvent::WebhookImageProcessed {
                order_id,
                image_id,
                error,
                order_is_processing,
            } => json!({
                "order_id": order_id,
                "image_id": image_id,
                "error": error,
                "order_is_processing": order_is_processing,
            }),
            OrderEvent::DownloadReady {
                order_id,
                storage_urls,
            } => json!({
                "order_id": order_id,
                "status": "previews_ready",
                "storage_urls": storage_urls,
            }),
            OrderEvent::ProcessingCompleted {
                order_id,
                file_count,
            } => json!({
                "order_id": order_id,
                "status": "completed",
                "progress": 100,
                "file_count": file_count,
            }),
            OrderEvent::ProcessingFailed { order_id, error } => json!({
                "order_id": order_id,
                "status": "failed",
                "error": error,
            }),
        }
    }

    /// Payload with an RFC3339 `timestamp` added.
    pub fn stamped_payload(&self) -> Value {
        let mut payload = self.payload();
        if let Value::Object(map) = &mut payload {
            map.insert(
                "timestamp".to_string(),
                Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shapes() {
        let id = Uuid::new_v4();

        let started = OrderEvent::UploadStarted {
            order_id: id,
            file_count: 3,
        };
        assert_eq!(started.name(), "upload_started");
        assert_eq!(started.payload()["status"], "uploading");
        assert_eq!(started.payload()["file_count"], 3);
        assert_eq!(started.payload()["order_id"], id.to_string());

        let ready = OrderEvent::DownloadReady {
            order_id: id,
            storage_urls: vec!["u1".to_string(), "u2".to_string()],
        };
        assert_eq!(ready.payload()["status"], "previews_ready");
        assert_eq!(ready.payload()["storage_urls"][1], "u2");

        let done = OrderEvent::ProcessingCompleted {
            order_id: id,
            file_count: 2,
        };
        assert_eq!(done.payload()["progress"], 100);
    }

    #[test]
    fn test_stamped_payload_has_rfc3339_timestamp() {
        let event = OrderEvent::ProcessingFailed {
            order_id: Uuid::new_v4(),
            error: "boom".to_string(),
        };
        let payload = event.stamped_payload();
        let ts = payload["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        assert_eq!(payload["error"], "boom");
    }

    #[test]
    fn test_topics() {
        let id = Uuid::nil();
        assert_eq!(
            order_topic(id),
            "order:00000000-0000-0000-0000-000000000000"
        );
        assert!(user_topic(id).starts_with("user:"));
    }
}
