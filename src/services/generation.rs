//! AI generation
//!
//! Charges credits, drives the campaign through Generating, calls the chosen
//! provider and stores the result. Credits are refunded when the provider
//! produced nothing.

use super::asset_hosting::{AssetError, AssetHostingService};
use super::campaign::{CampaignService, CampaignServiceError};
use super::credits::{CreditError, CreditService};
use super::prompt_library::{build_media_prompt, PromptLibrary};
use super::rate_limiter::GenerationRateLimiter;
use crate::models::{Asset, AssetKind, Campaign, CampaignStatus, GenerationKind};
use crate::providers::{parse_generated_copy, ProviderError, ProviderKind, ProviderRegistry};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Campaign(#[from] CampaignServiceError),

    #[error(transparent)]
    Credit(#[from] CreditError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Cannot generate while campaign is {0}")]
    NotAllowed(CampaignStatus),

    #[error("Too many generation requests, try again in a minute")]
    RateLimited,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A generation result with the balance left after paying for it
#[derive(Debug, Clone, Serialize)]
pub struct Generated<T> {
    #[serde(flatten)]
    pub item: T,
    pub credits_remaining: i64,
}

pub struct GenerationService {
    campaigns: Arc<CampaignService>,
    credits: Arc<CreditService>,
    providers: Arc<ProviderRegistry>,
    prompts: Arc<PromptLibrary>,
    assets: Arc<AssetHostingService>,
    limiter: Arc<GenerationRateLimiter>,
}

impl GenerationService {
    pub fn new(
        campaigns: Arc<CampaignService>,
        credits: Arc<CreditService>,
        providers: Arc<ProviderRegistry>,
        prompts: Arc<PromptLibrary>,
        assets: Arc<AssetHostingService>,
        limiter: Arc<GenerationRateLimiter>,
    ) -> Self {
        Self {
            campaigns,
            credits,
            providers,
            prompts,
            assets,
            limiter,
        }
    }

    /// Generate social copy for the campaign's brief
    #[instrument(skip(self))]
    pub async fn generate_copy(
        &self,
        user_id: i64,
        campaign_id: i64,
        preferred: Option<ProviderKind>,
    ) -> Result<Generated<Campaign>, GenerationError> {
        self.check_rate(user_id).await?;
        let campaign = self.campaigns.get(user_id, campaign_id).await?;
        if !campaign.status.can_generate() {
            return Err(GenerationError::NotAllowed(campaign.status));
        }

        let provider = self.providers.text_provider(preferred)?;
        let built = self.prompts.build_prompt(&campaign.brief, campaign.platform)?;

        let cost = self.credits.cost(GenerationKind::Text);
        let balance = self
            .credits
            .debit(
                user_id,
                GenerationKind::Text,
                Some(campaign.id),
                &format!("Copy for campaign {}", campaign.id),
            )
            .await?;

        if let Err(e) = self
            .campaigns
            .move_status(&campaign, CampaignStatus::Generating)
            .await
        {
            self.refund(user_id, cost, campaign.id, "campaign changed status").await;
            return Err(e.into());
        }
        let mut generating = campaign;
        generating.status = CampaignStatus::Generating;

        let output = match provider.generate_text(&built.prompt).await {
            Ok(output) => output,
            Err(e) => {
                error!(campaign_id, provider = %provider.kind(), error = %e, "Copy generation failed");
                self.refund(user_id, cost, campaign_id, "copy generation failed").await;
                self.mark_failed(&generating).await;
                return Err(e.into());
            }
        };

        let mut content = parse_generated_copy(&output.text);
        content.provider = provider.kind().to_string();
        content.model = output.model;

        let stored = match self
            .campaigns
            .store_generated(&generating, content, Some(built.template_id))
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                self.refund(user_id, cost, campaign_id, "copy could not be stored").await;
                self.mark_failed(&generating).await;
                return Err(e.into());
            }
        };

        info!(campaign_id, user_id, provider = %provider.kind(), "Generated copy");
        Ok(Generated {
            item: stored,
            credits_remaining: balance,
        })
    }

    /// Generate an image or video and host it.
    ///
    /// A hosting failure keeps the charge: the provider did produce the
    /// media and the asset can be rehosted later. If the asset cannot be
    /// stored at all the charge is refunded.
    #[instrument(skip(self, prompt_override))]
    pub async fn generate_media(
        &self,
        user_id: i64,
        campaign_id: i64,
        kind: AssetKind,
        preferred: Option<ProviderKind>,
        prompt_override: Option<String>,
    ) -> Result<Generated<Asset>, GenerationError> {
        self.check_rate(user_id).await?;
        let campaign = self.campaigns.get(user_id, campaign_id).await?;
        if matches!(
            campaign.status,
            CampaignStatus::Archived | CampaignStatus::Generating
        ) {
            return Err(GenerationError::NotAllowed(campaign.status));
        }

        let provider = self.providers.media_provider(kind, preferred)?;
        let prompt = match prompt_override.map(|p| p.trim().to_string()) {
            Some(p) if !p.is_empty() => p,
            _ => build_media_prompt(
                &campaign.brief,
                campaign.platform,
                kind,
                campaign.generated_content.as_ref(),
            ),
        };

        let generation_kind = GenerationKind::from(kind);
        let cost = self.credits.cost(generation_kind);
        let balance = self
            .credits
            .debit(
                user_id,
                generation_kind,
                Some(campaign.id),
                &format!("{} for campaign {}", kind, campaign.id),
            )
            .await?;

        let result = match kind {
            AssetKind::Image => provider.generate_image(&prompt).await,
            AssetKind::Video => provider.generate_video(&prompt).await,
        };
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                error!(campaign_id, provider = %provider.kind(), %kind, error = %e, "Media generation failed");
                self.refund(user_id, cost, campaign_id, &format!("{} generation failed", kind))
                    .await;
                return Err(e.into());
            }
        };

        let asset = Asset::new(
            user_id,
            campaign.id,
            kind,
            provider.kind().to_string(),
            prompt,
            output.url,
        );
        let hosted = match self.assets.create_and_host(asset).await {
            Ok(hosted) => hosted,
            Err(e) => {
                error!(campaign_id, %kind, error = %e, "Failed to store generated media");
                self.refund(user_id, cost, campaign_id, &format!("{} could not be stored", kind))
                    .await;
                return Err(e.into());
            }
        };

        info!(campaign_id, asset_id = hosted.id, status = %hosted.hosting_status, "Generated media");
        Ok(Generated {
            item: hosted,
            credits_remaining: balance,
        })
    }

    async fn check_rate(&self, user_id: i64) -> Result<(), GenerationError> {
        if self.limiter.check(user_id).await {
            Ok(())
        } else {
            Err(GenerationError::RateLimited)
        }
    }

    async fn refund(&self, user_id: i64, amount: i64, campaign_id: i64, reason: &str) {
        if let Err(e) = self
            .credits
            .refund(user_id, amount, Some(campaign_id), reason)
            .await
        {
            error!(user_id, amount, campaign_id, error = %e, "Failed to refund credits");
        }
    }

    async fn mark_failed(&self, generating: &Campaign) {
        if let Err(e) = self
            .campaigns
            .move_status(generating, CampaignStatus::Failed)
            .await
        {
            error!(campaign_id = generating.id, error = %e, "Failed to mark campaign failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CreditsConfig, MediaConfig};
    use crate::db::repositories::{SqlxAssetRepository, SqlxCampaignRepository, SqlxCreditRepository};
    use crate::db::{DatabasePool, DynDatabasePool};
    use crate::models::{HostingStatus, Platform};
    use crate::providers::fake::FakeProvider;
    use crate::providers::GenerationProvider;
    use crate::test_support::{credits_of, insert_campaign, insert_user, migrated_pool, spawn_fake};
    use axum::http::header::CONTENT_TYPE;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    const COPY: &str = r##"{"headline": "Stay up, stay sharp", "body": "Twenty hours of steeping.", "hashtags": ["coldbrew"], "call_to_action": "Grab a can"}"##;

    struct Fixture {
        service: GenerationService,
        pool: DynDatabasePool,
        user_id: i64,
        _media: TempDir,
    }

    async fn setup(
        credits: i64,
        providers: Vec<Arc<dyn GenerationProvider>>,
        per_minute: usize,
    ) -> Fixture {
        let pool = migrated_pool().await;
        let user_id = insert_user(&pool, "marketer", credits).await;
        let media = TempDir::new().unwrap();

        let campaigns = Arc::new(CampaignService::new(SqlxCampaignRepository::boxed(pool.clone())));
        let credit_service = Arc::new(CreditService::new(
            SqlxCreditRepository::boxed(pool.clone()),
            CreditsConfig::default(),
        ));
        let assets = Arc::new(AssetHostingService::new(
            SqlxAssetRepository::boxed(pool.clone()),
            reqwest::Client::new(),
            MediaConfig {
                dir: media.path().to_path_buf(),
                ..Default::default()
            },
        ));

        let service = GenerationService::new(
            campaigns,
            credit_service,
            Arc::new(ProviderRegistry::with_providers(providers)),
            Arc::new(PromptLibrary::embedded().unwrap()),
            assets,
            Arc::new(GenerationRateLimiter::new(per_minute)),
        );
        Fixture {
            service,
            pool,
            user_id,
            _media: media,
        }
    }

    #[tokio::test]
    async fn test_copy_generation_stores_content_and_charges() {
        let f = setup(10, vec![Arc::new(FakeProvider::text(COPY))], 0).await;
        let id = insert_campaign(&f.pool, f.user_id, Platform::Instagram, "draft").await;

        let generated = f.service.generate_copy(f.user_id, id, None).await.unwrap();
        let campaign = generated.item;
        assert_eq!(campaign.status, CampaignStatus::Generated);
        let content = campaign.generated_content.unwrap();
        assert_eq!(content.headline, "Stay up, stay sharp");
        assert_eq!(content.provider, "openai");
        assert_eq!(content.model, "fake-text");
        assert!(campaign.prompt_template_id.is_some());

        assert_eq!(generated.credits_remaining, 9);
        assert_eq!(credits_of(&f.pool, f.user_id).await, 9);
    }

    #[tokio::test]
    async fn test_copy_failure_refunds_and_marks_failed() {
        let failing = Arc::new(FakeProvider::failing(
            ProviderKind::Gemini,
            vec![GenerationKind::Text],
        ));
        let f = setup(10, vec![failing.clone()], 0).await;
        let id = insert_campaign(&f.pool, f.user_id, Platform::Facebook, "draft").await;

        let err = f.service.generate_copy(f.user_id, id, None).await.unwrap_err();
        assert!(matches!(err, GenerationError::Provider(ProviderError::Api { status: 503, .. })));
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(credits_of(&f.pool, f.user_id).await, 10);

        let campaign = f.service.campaigns.get(f.user_id, id).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Failed);

        // Failed campaigns can be generated again
        assert!(campaign.status.can_generate());
    }

    #[tokio::test]
    async fn test_insufficient_credits_leaves_campaign_untouched() {
        let provider = Arc::new(FakeProvider::text(COPY));
        let f = setup(0, vec![provider.clone()], 0).await;
        let id = insert_campaign(&f.pool, f.user_id, Platform::Instagram, "draft").await;

        let err = f.service.generate_copy(f.user_id, id, None).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Credit(CreditError::InsufficientCredits {
                required: 1,
                available: 0
            })
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        let campaign = f.service.campaigns.get(f.user_id, id).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Draft);
    }

    #[tokio::test]
    async fn test_published_campaign_cannot_regenerate_copy() {
        let f = setup(10, vec![Arc::new(FakeProvider::text(COPY))], 0).await;
        let id = insert_campaign(&f.pool, f.user_id, Platform::Instagram, "published").await;

        let err = f.service.generate_copy(f.user_id, id, None).await.unwrap_err();
        assert!(matches!(err, GenerationError::NotAllowed(CampaignStatus::Published)));
        assert_eq!(credits_of(&f.pool, f.user_id).await, 10);
    }

    #[tokio::test]
    async fn test_no_text_provider_configured() {
        let f = setup(10, vec![Arc::new(FakeProvider::media("http://x/a.png"))], 0).await;
        let id = insert_campaign(&f.pool, f.user_id, Platform::Instagram, "draft").await;

        let err = f.service.generate_copy(f.user_id, id, None).await.unwrap_err();
        assert!(matches!(err, GenerationError::Provider(ProviderError::NotConfigured(_))));
        assert_eq!(credits_of(&f.pool, f.user_id).await, 10);
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let f = setup(10, vec![Arc::new(FakeProvider::text(COPY))], 1).await;
        let id = insert_campaign(&f.pool, f.user_id, Platform::Instagram, "draft").await;

        f.service.generate_copy(f.user_id, id, None).await.unwrap();
        let err = f.service.generate_copy(f.user_id, id, None).await.unwrap_err();
        assert!(matches!(err, GenerationError::RateLimited));
    }

    #[tokio::test]
    async fn test_image_generation_hosts_asset() {
        let base = spawn_fake(Router::new().route(
            "/out.png",
            get(|| async { ([(CONTENT_TYPE, "image/png")], b"png-bytes".as_slice()) }),
        ))
        .await;
        let provider = Arc::new(FakeProvider::media(&format!("{}/out.png", base)));
        let f = setup(10, vec![provider], 0).await;
        let id = insert_campaign(&f.pool, f.user_id, Platform::Instagram, "generated").await;

        let generated = f
            .service
            .generate_media(f.user_id, id, AssetKind::Image, None, None)
            .await
            .unwrap();
        let asset = generated.item;
        assert_eq!(asset.hosting_status, HostingStatus::Hosted);
        assert_eq!(asset.provider, "replicate");
        assert!(asset.prompt.contains("Night Owl Cold Brew"));
        assert_eq!(generated.credits_remaining, 5);
    }

    #[tokio::test]
    async fn test_hosting_failure_keeps_charge() {
        let provider = Arc::new(FakeProvider::media("http://127.0.0.1:9/never.png"));
        let f = setup(10, vec![provider], 0).await;
        let id = insert_campaign(&f.pool, f.user_id, Platform::Facebook, "draft").await;

        let generated = f
            .service
            .generate_media(f.user_id, id, AssetKind::Image, None, Some("a bottle".into()))
            .await
            .unwrap();
        assert_eq!(generated.item.hosting_status, HostingStatus::Failed);
        assert_eq!(generated.item.prompt, "a bottle");
        assert_eq!(credits_of(&f.pool, f.user_id).await, 5);
    }

    #[tokio::test]
    async fn test_media_failure_refunds() {
        let failing = Arc::new(FakeProvider::failing(
            ProviderKind::Replicate,
            vec![GenerationKind::Video],
        ));
        let f = setup(30, vec![failing], 0).await;
        let id = insert_campaign(&f.pool, f.user_id, Platform::TikTok, "generated").await;

        let err = f
            .service
            .generate_media(f.user_id, id, AssetKind::Video, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Provider(_)));
        assert_eq!(credits_of(&f.pool, f.user_id).await, 30);
    }

    #[tokio::test]
    async fn test_asset_storage_failure_refunds() {
        let provider = Arc::new(FakeProvider::media("http://127.0.0.1:9/never.png"));
        let f = setup(10, vec![provider], 0).await;
        let id = insert_campaign(&f.pool, f.user_id, Platform::Facebook, "generated").await;
        f.pool.execute("DROP TABLE assets").await.unwrap();

        let err = f
            .service
            .generate_media(f.user_id, id, AssetKind::Image, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Asset(_)));
        assert_eq!(credits_of(&f.pool, f.user_id).await, 10);
    }
}
