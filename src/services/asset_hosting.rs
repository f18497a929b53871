//! Asset hosting
//!
//! Provider media URLs expire, so every generated asset is downloaded into the
//! media directory and served from our own `/media` prefix. Platforms that
//! pull media by URL are given the hosted copy.

use crate::config::MediaConfig;
use crate::db::repositories::AssetRepository;
use crate::models::{Asset, AssetKind, HostingStatus};
use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Outcome of retrying hosting for a user's unhosted assets
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RehostSummary {
    pub attempted: usize,
    pub hosted: usize,
    pub failed: usize,
}

pub struct AssetHostingService {
    repo: Arc<dyn AssetRepository>,
    client: reqwest::Client,
    config: MediaConfig,
}

impl AssetHostingService {
    pub fn new(repo: Arc<dyn AssetRepository>, client: reqwest::Client, config: MediaConfig) -> Self {
        Self {
            repo,
            client,
            config,
        }
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    /// Store a newly generated asset and host it
    pub async fn create_and_host(&self, asset: Asset) -> Result<Asset, AssetError> {
        let created = self
            .repo
            .create(&asset)
            .await
            .context("Failed to create asset")?;
        self.host(created).await
    }

    /// Copy the asset's source into the media directory.
    ///
    /// Download failures are recorded on the asset (status Failed) rather
    /// than returned; only storage errors are.
    pub async fn host(&self, mut asset: Asset) -> Result<Asset, AssetError> {
        match self.download(&asset).await {
            Ok((file_name, content_type, size)) => {
                asset.hosted_url = Some(format!(
                    "{}/{}",
                    self.config.public_prefix.trim_end_matches('/'),
                    file_name
                ));
                asset.file_name = Some(file_name);
                asset.content_type = Some(content_type);
                asset.size_bytes = Some(size as i64);
                asset.hosting_status = HostingStatus::Hosted;
                asset.error = None;
                info!(asset_id = asset.id, size, "Hosted asset");
            }
            Err(e) => {
                warn!(asset_id = asset.id, error = %e, "Failed to host asset");
                asset.hosting_status = HostingStatus::Failed;
                asset.error = Some(format!("{:#}", e));
            }
        }
        asset.updated_at = Utc::now();

        let updated = self
            .repo
            .update(&asset)
            .await
            .context("Failed to update asset")?;
        Ok(updated)
    }

    /// Retry hosting for every Pending or Failed asset of the user
    pub async fn rehost_failed(&self, user_id: i64) -> Result<RehostSummary, AssetError> {
        let assets = self
            .repo
            .list_unhosted(user_id)
            .await
            .context("Failed to list unhosted assets")?;

        let mut summary = RehostSummary::default();
        for asset in assets {
            summary.attempted += 1;
            if self.host(asset).await?.is_hosted() {
                summary.hosted += 1;
            } else {
                summary.failed += 1;
            }
        }
        info!(user_id, ?summary, "Rehosted assets");
        Ok(summary)
    }

    pub async fn list(&self, user_id: i64, campaign_id: Option<i64>) -> Result<Vec<Asset>, AssetError> {
        let assets = self
            .repo
            .list(user_id, campaign_id)
            .await
            .context("Failed to list assets")?;
        Ok(assets)
    }

    /// Get an asset owned by `user_id`
    pub async fn get(&self, user_id: i64, id: i64) -> Result<Asset, AssetError> {
        match self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get asset")?
        {
            Some(asset) if asset.user_id == user_id => Ok(asset),
            _ => Err(AssetError::NotFound(id)),
        }
    }

    /// Delete the asset row and its hosted file
    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), AssetError> {
        let asset = self.get(user_id, id).await?;
        self.remove_file(&asset).await;
        self.repo
            .delete(asset.id)
            .await
            .context("Failed to delete asset")?;
        Ok(())
    }

    /// Remove hosted files of a campaign's assets; rows go with the campaign
    pub async fn remove_campaign_files(&self, user_id: i64, campaign_id: i64) -> Result<(), AssetError> {
        for asset in self.list(user_id, Some(campaign_id)).await? {
            self.remove_file(&asset).await;
        }
        Ok(())
    }

    async fn remove_file(&self, asset: &Asset) {
        let Some(file_name) = &asset.file_name else {
            return;
        };
        let path = self.config.dir.join(file_name);
        match fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "Removed hosted file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove hosted file"),
        }
    }

    /// Download to `{uuid}.{ext}`, returning file name, content type and size
    async fn download(&self, asset: &Asset) -> anyhow::Result<(String, String, u64)> {
        let limit = self.config.max_download_bytes;
        let mut response = self
            .client
            .get(&asset.source_url)
            .send()
            .await
            .context("Download request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Download returned {}", status);
        }
        if let Some(len) = response.content_length() {
            if len > limit {
                anyhow::bail!("Asset is {} bytes, the limit is {}", len, limit);
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_string())
            .filter(|ct| ct.starts_with("image/") || ct.starts_with("video/"))
            .unwrap_or_else(|| default_content_type(asset.kind).to_string());

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.context("Download interrupted")? {
            if (bytes.len() + chunk.len()) as u64 > limit {
                anyhow::bail!("Asset exceeds the {} byte limit", limit);
            }
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            anyhow::bail!("Downloaded asset is empty");
        }

        fs::create_dir_all(&self.config.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.config.dir.display()))?;
        let file_name = format!(
            "{}.{}",
            Uuid::new_v4(),
            MediaConfig::extension_for(&content_type)
        );
        let path: PathBuf = self.config.dir.join(&file_name);
        fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok((file_name, content_type, bytes.len() as u64))
    }
}

fn default_content_type(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Image => "image/png",
        AssetKind::Video => "video/mp4",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxAssetRepository;
    use crate::models::Platform;
    use crate::test_support::{insert_campaign, insert_user, migrated_pool, spawn_fake};
    use axum::http::header::CONTENT_TYPE;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake image bytes";

    struct Fixture {
        service: AssetHostingService,
        user_id: i64,
        campaign_id: i64,
        base: String,
        dir: TempDir,
    }

    async fn setup(max_download_bytes: u64) -> Fixture {
        let pool = migrated_pool().await;
        let user_id = insert_user(&pool, "marketer", 10).await;
        let campaign_id = insert_campaign(&pool, user_id, Platform::Instagram, "generated").await;
        let dir = TempDir::new().unwrap();
        let base = spawn_fake(
            Router::new()
                .route("/img.png", get(|| async { ([(CONTENT_TYPE, "image/png")], PNG) }))
                .route("/gone.png", get(|| async { StatusCode::NOT_FOUND }))
                .route(
                    "/flaky.png",
                    get(|State(calls): State<Arc<AtomicU32>>| async move {
                        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                            return StatusCode::SERVICE_UNAVAILABLE.into_response();
                        }
                        ([(CONTENT_TYPE, "image/png")], PNG).into_response()
                    }),
                )
                .with_state(Arc::new(AtomicU32::new(0))),
        )
        .await;

        let service = AssetHostingService::new(
            SqlxAssetRepository::boxed(pool),
            reqwest::Client::new(),
            MediaConfig {
                dir: dir.path().to_path_buf(),
                public_prefix: "/media".into(),
                max_download_bytes,
            },
        );
        Fixture {
            service,
            user_id,
            campaign_id,
            base,
            dir,
        }
    }

    fn asset(f: &Fixture, path: &str) -> Asset {
        Asset::new(
            f.user_id,
            f.campaign_id,
            AssetKind::Image,
            "openai".into(),
            "a cold brew bottle".into(),
            format!("{}{}", f.base, path),
        )
    }

    #[tokio::test]
    async fn test_host_writes_file_and_sets_url() {
        let f = setup(1024).await;
        let hosted = f.service.create_and_host(asset(&f, "/img.png")).await.unwrap();

        assert_eq!(hosted.hosting_status, HostingStatus::Hosted);
        assert_eq!(hosted.content_type.as_deref(), Some("image/png"));
        assert_eq!(hosted.size_bytes, Some(PNG.len() as i64));
        let file_name = hosted.file_name.clone().unwrap();
        assert!(file_name.ends_with(".png"));
        assert_eq!(hosted.hosted_url, Some(format!("/media/{}", file_name)));
        assert_eq!(std::fs::read(f.dir.path().join(&file_name)).unwrap(), PNG);
    }

    #[tokio::test]
    async fn test_failed_download_marks_asset_failed() {
        let f = setup(1024).await;
        let failed = f.service.create_and_host(asset(&f, "/gone.png")).await.unwrap();

        assert_eq!(failed.hosting_status, HostingStatus::Failed);
        assert!(failed.error.unwrap().contains("404"));
        assert!(failed.hosted_url.is_none());
    }

    #[tokio::test]
    async fn test_size_cap() {
        let f = setup(4).await;
        let failed = f.service.create_and_host(asset(&f, "/img.png")).await.unwrap();

        assert_eq!(failed.hosting_status, HostingStatus::Failed);
        assert_eq!(std::fs::read_dir(f.dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rehost_counts() {
        let f = setup(1024).await;
        let flaky = f.service.create_and_host(asset(&f, "/flaky.png")).await.unwrap();
        assert_eq!(flaky.hosting_status, HostingStatus::Failed);
        f.service.create_and_host(asset(&f, "/gone.png")).await.unwrap();

        let summary = f.service.rehost_failed(f.user_id).await.unwrap();
        assert_eq!(
            summary,
            RehostSummary {
                attempted: 2,
                hosted: 1,
                failed: 1
            }
        );
        assert!(f.service.get(f.user_id, flaky.id).await.unwrap().is_hosted());
    }

    #[tokio::test]
    async fn test_delete_removes_file_and_checks_owner() {
        let f = setup(1024).await;
        let hosted = f.service.create_and_host(asset(&f, "/img.png")).await.unwrap();
        let path = f.dir.path().join(hosted.file_name.as_ref().unwrap());

        assert!(matches!(
            f.service.delete(f.user_id + 1, hosted.id).await,
            Err(AssetError::NotFound(_))
        ));
        f.service.delete(f.user_id, hosted.id).await.unwrap();
        assert!(!path.exists());
        assert!(matches!(
            f.service.get(f.user_id, hosted.id).await,
            Err(AssetError::NotFound(_))
        ));
    }
}
