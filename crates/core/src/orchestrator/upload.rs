//! Upload pipeline: per-file bracket creation, PUT, verification, record.

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::service::Orchestrator;
use super::types::{
    OrchestratorError, UploadError, UploadFile, UploadOutcome, UploadStage, UploadedFile,
};
use crate::broadcast::OrderEvent;
use crate::metrics::UPLOAD_FILES;
use crate::order::{NewBracket, OrderStatus};
use crate::provider::{retry, ProviderBracket};

/// MIME type inferred from the filename suffix.
pub fn mime_for_filename(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".heic") {
        "image/heic"
    } else if lower.ends_with(".cr2") {
        "image/x-canon-cr2"
    } else {
        "image/jpeg"
    }
}

/// Group id per file: one fresh id for the whole request, or the
/// comma-separated `groups` field split to exactly one entry per file.
pub fn assign_groups(groups: Option<&str>, file_count: usize) -> Result<Vec<String>, OrchestratorError> {
    let Some(raw) = groups.filter(|g| !g.trim().is_empty()) else {
        let shared = Uuid::new_v4().to_string();
        return Ok(vec![shared; file_count]);
    };

    let parsed: Vec<String> = raw.split(',').map(|g| g.trim().to_string()).collect();
    if parsed.len() != file_count {
        return Err(OrchestratorError::Validation(format!(
            "groups has {} entries but {} files were uploaded",
            parsed.len(),
            file_count
        )));
    }
    if parsed.iter().any(|g| g.is_empty()) {
        return Err(OrchestratorError::Validation(
            "groups contains an empty entry".to_string(),
        ));
    }
    Ok(parsed)
}

/// Provider metadata (when it is an object) with `group_id` on top.
fn bracket_metadata(remote: &Value, group_id: &str) -> Value {
    let mut map = match remote {
        Value::Object(m) => m.clone(),
        _ => Map::new(),
    };
    map.insert("group_id".to_string(), json!(group_id));
    Value::Object(map)
}

/// Per-file result: the uploaded file plus an optional non-fatal warning.
type FileResult = Result<(UploadedFile, Option<UploadError>), UploadError>;

impl Orchestrator {
    /// Upload a batch of exposures into an order.
    ///
    /// Files are handled sequentially and fail independently. The call only
    /// fails as a whole when every file failed.
    pub async fn upload_files(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        files: Vec<UploadFile>,
        groups: Option<&str>,
    ) -> Result<UploadOutcome, OrchestratorError> {
        if files.is_empty() {
            return Err(OrchestratorError::Validation("no files provided".to_string()));
        }

        let order = self.owned_order(user_id, order_id)?;
        if !order.status.can_transition_to(OrderStatus::Uploading) {
            return Err(OrchestratorError::InvalidState(format!(
                "cannot upload to an order in status {}",
                order.status
            )));
        }

        let group_ids = assign_groups(groups, files.len())?;
        let file_count = files.len();

        self.store
            .update_order_status(order_id, OrderStatus::Uploading, 0)?;
        self.publish(
            OrderEvent::UploadStarted {
                order_id,
                file_count,
            },
            Some(user_id),
        )
        .await;

        info!(order_id = %order_id, files = file_count, "Upload started");

        let mut uploaded = Vec::new();
        let mut errors = Vec::new();
        for (file, group_id) in files.into_iter().zip(group_ids) {
            match self.upload_one(order_id, file, &group_id).await {
                Ok((done, warning)) => {
                    UPLOAD_FILES.with_label_values(&["stored"]).inc();
                    if let Some(w) = warning {
                        UPLOAD_FILES.with_label_values(&[w.stage.as_str()]).inc();
                        errors.push(w);
                    }
                    uploaded.push(done);
                }
                Err(e) => {
                    warn!(
                        order_id = %order_id,
                        filename = %e.filename,
                        stage = e.stage.as_str(),
                        error = %e.message,
                        "File upload failed"
                    );
                    UPLOAD_FILES.with_label_values(&[e.stage.as_str()]).inc();
                    errors.push(e);
                }
            }
        }

        if uploaded.is_empty() {
            let message = format!("all {} files failed to upload", file_count);
            self.store.update_order_error(order_id, &message)?;
            self.publish(
                OrderEvent::ProcessingFailed {
                    order_id,
                    error: message,
                },
                Some(user_id),
            )
            .await;
            return Err(OrchestratorError::UploadFailed(errors));
        }

        let order = self
            .store
            .update_order_status(order_id, OrderStatus::Uploaded, 0)?;
        self.publish(
            OrderEvent::UploadCompleted {
                order_id,
                file_count: uploaded.len(),
            },
            Some(user_id),
        )
        .await;

        info!(
            order_id = %order_id,
            uploaded = uploaded.len(),
            failed = file_count - uploaded.len(),
            "Upload finished"
        );

        Ok(UploadOutcome {
            order_id,
            status: order.status,
            files: uploaded,
            errors,
        })
    }

    async fn upload_one(&self, order_id: Uuid, file: UploadFile, group_id: &str) -> FileResult {
        let filename = file.filename;
        let mime = mime_for_filename(&filename);
        let fail = |stage: UploadStage, message: String| UploadError {
            filename: filename.clone(),
            stage,
            message,
        };

        let provider_order_id = order_id.to_string();
        let bracket = retry(&self.policy(), "create_bracket", || {
            self.provider.create_bracket(&provider_order_id, &filename)
        })
        .await
        .map_err(|e| fail(UploadStage::CreateBracket, e.to_string()))?;

        let upload_url = match bracket.upload_url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => {
                return Err(fail(
                    UploadStage::CreateBracket,
                    "provider returned no upload URL".to_string(),
                ))
            }
        };

        retry(&self.policy(), "upload_blob", || {
            self.provider.upload_blob(&upload_url, &file.bytes, mime)
        })
        .await
        .map_err(|e| fail(UploadStage::Upload, e.to_string()))?;

        debug!(order_id = %order_id, bracket_id = %bracket.bracket_id, "Blob uploaded");

        let verified = self.verify_bracket(&bracket.bracket_id).await;
        let warning = if verified.is_none() {
            Some(fail(
                UploadStage::Verify,
                format!(
                    "provider did not confirm bracket {} after {} checks",
                    bracket.bracket_id, self.config.verify_attempts
                ),
            ))
        } else {
            None
        };

        let remote = verified.unwrap_or(bracket);
        let record = NewBracket {
            order_id,
            bracket_id: remote.bracket_id.clone(),
            image_id: remote.image_id.clone(),
            filename: filename.clone(),
            upload_url: Some(upload_url),
            is_uploaded: true,
            metadata: bracket_metadata(&remote.metadata, group_id),
        };
        let stored = self
            .store
            .create_bracket(record)
            .map_err(|e| fail(UploadStage::Persist, e.to_string()))?;

        Ok((
            UploadedFile {
                filename,
                id: stored.id,
                bracket_id: stored.bracket_id,
                image_id: stored.image_id,
                group_id: group_id.to_string(),
                mime_type: mime.to_string(),
                size: file.bytes.len(),
                verified: warning.is_none(),
            },
            warning,
        ))
    }

    /// Poll the provider until it reports the bracket uploaded.
    async fn verify_bracket(&self, bracket_id: &str) -> Option<ProviderBracket> {
        let attempts = self.config.verify_attempts.max(1);
        for attempt in 1..=attempts {
            match self.provider.get_bracket(bracket_id).await {
                Ok(remote) if remote.is_uploaded => return Some(remote),
                Ok(_) => debug!(bracket_id, attempt, "Bracket not yet confirmed"),
                Err(e) => debug!(bracket_id, attempt, error = %e, "Bracket check failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.verify_interval()).await;
            }
        }
        None
    }
}
