//! Client-driven image downloads and stored-image management.

use tracing::{info, warn};
use uuid::Uuid;

use super::service::Orchestrator;
use super::types::{
    DownloadOutcome, DownloadRequest, ImageEntry, ImageListing, OrchestratorError, Quality,
};
use crate::metrics::ARTIFACTS;
use crate::order::{NewStoredFile, StoredFile};
use crate::provider::{retry, DownloadOptions};

/// Provider download options for a request, validated.
pub fn download_options(request: &DownloadRequest) -> Result<DownloadOptions, OrchestratorError> {
    let mut options = DownloadOptions {
        watermark: Some(request.watermark.unwrap_or(true)),
        ..Default::default()
    };

    match request.quality {
        Quality::Custom => match (request.max_width, request.scale) {
            (Some(0), _) => {
                return Err(OrchestratorError::Validation(
                    "max_width must be positive".to_string(),
                ))
            }
            (Some(width), _) => options.max_width = Some(width),
            (None, Some(scale)) if scale > 0.0 && scale.is_finite() => {
                options.scale = Some(scale)
            }
            (None, Some(_)) => {
                return Err(OrchestratorError::Validation(
                    "scale must be a positive number".to_string(),
                ))
            }
            (None, None) => {
                return Err(OrchestratorError::Validation(
                    "custom quality needs max_width or scale".to_string(),
                ))
            }
        },
        named => options.max_width = named.max_width(),
    }

    Ok(options)
}

impl Orchestrator {
    /// Fetch one enhanced image at the requested quality and keep a copy.
    pub async fn download_image(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        image_id: &str,
        request: DownloadRequest,
    ) -> Result<DownloadOutcome, OrchestratorError> {
        let order = self.owned_order(user_id, order_id)?;
        let options = download_options(&request)?;
        let watermark = options.watermark.unwrap_or(true);

        let provider_id = order_id.to_string();
        let provider_order = retry(&self.policy(), "get_order", || {
            self.provider.get_order(&provider_id)
        })
        .await?;
        if !provider_order.images.iter().any(|i| i.image_id == image_id) {
            return Err(OrchestratorError::NotFound(format!("image {}", image_id)));
        }

        let bytes = retry(&self.policy(), "download_enhanced", || {
            self.provider.download_enhanced(image_id, &options)
        })
        .await?;

        let filename = format!("{}_{}.jpg", image_id, request.quality.as_str());
        let size = bytes.len() as i64;
        let object = self
            .objects
            .upload(order.user_id, order.id, &filename, bytes, "image/jpeg")
            .await?;

        let file = self.store.create_stored_file(NewStoredFile {
            order_id,
            user_id,
            filename,
            provider_image_id: Some(image_id.to_string()),
            storage_path: object.storage_path,
            storage_url: object.public_url,
            file_size: size,
            mime_type: "image/jpeg".to_string(),
            is_final: true,
        })?;
        ARTIFACTS.with_label_values(&["on_demand", "stored"]).inc();

        let mut message = format!(
            "Downloaded {} image ({} bytes)",
            request.quality.as_str(),
            size
        );
        if !watermark {
            message.push_str("; unwatermarked downloads consume credits");
        }

        info!(
            order_id = %order_id,
            image_id,
            quality = request.quality.as_str(),
            watermark,
            "Stored on-demand download"
        );

        Ok(DownloadOutcome {
            image_id: image_id.to_string(),
            quality: request.quality,
            watermark,
            consumes_credits: !watermark,
            file,
            message,
        })
    }

    /// Provider images joined with stored files. Falls back to stored files
    /// alone when the provider cannot be reached.
    pub async fn list_images(&self, user_id: Uuid, order_id: Uuid) -> Result<ImageListing, OrchestratorError> {
        self.owned_order(user_id, order_id)?;
        let files = self.store.get_stored_files(order_id, user_id)?;

        let files_for = |image_id: &str| -> Vec<StoredFile> {
            files
                .iter()
                .filter(|f| f.provider_image_id.as_deref() == Some(image_id))
                .cloned()
                .collect()
        };

        match self.provider.get_order(&order_id.to_string()).await {
            Ok(provider_order) => {
                let images = provider_order
                    .images
                    .iter()
                    .map(|image| {
                        let stored = files_for(&image.image_id);
                        ImageEntry {
                            image_id: image.image_id.clone(),
                            status: image.status.clone(),
                            status_reason: image.status_reason.clone(),
                            downloaded: !stored.is_empty(),
                            files: stored,
                        }
                    })
                    .collect();
                Ok(ImageListing {
                    order_id,
                    provider_reachable: true,
                    images,
                })
            }
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Provider unreachable, listing stored images only");
                let mut seen: Vec<&str> = Vec::new();
                for file in &files {
                    if let Some(id) = file.provider_image_id.as_deref() {
                        if !seen.contains(&id) {
                            seen.push(id);
                        }
                    }
                }
                let images = seen
                    .into_iter()
                    .map(|id| ImageEntry {
                        image_id: id.to_string(),
                        status: None,
                        status_reason: None,
                        downloaded: true,
                        files: files_for(id),
                    })
                    .collect();
                Ok(ImageListing {
                    order_id,
                    provider_reachable: false,
                    images,
                })
            }
        }
    }

    /// Delete stored copies matching a stored-file id or provider image id.
    /// Blobs go before rows. Returns the number of files removed.
    pub async fn delete_image(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        image: &str,
    ) -> Result<usize, OrchestratorError> {
        self.owned_order(user_id, order_id)?;
        let targets: Vec<StoredFile> = self
            .store
            .get_stored_files(order_id, user_id)?
            .into_iter()
            .filter(|f| f.id.to_string() == image || f.provider_image_id.as_deref() == Some(image))
            .collect();

        if targets.is_empty() {
            return Err(OrchestratorError::NotFound(format!("image {}", image)));
        }

        for file in &targets {
            self.objects.delete(&file.storage_path).await?;
            self.store.delete_stored_file(file.id)?;
        }

        info!(order_id = %order_id, image, removed = targets.len(), "Deleted stored image");
        Ok(targets.len())
    }
}
