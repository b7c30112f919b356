use crate::config::AppConfig;
use crate::db;
use crate::inference::Pipeline;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let db = db::connect(&config.database_url).await?;

        let model_cfg = config.models.clone();
        let confidence = config.confidence;
        let pipeline = tokio::task::spawn_blocking(move || Pipeline::load(&model_cfg, confidence))
            .await?;
        if !pipeline.is_ready() {
            tracing::warn!("models not loaded; /predict will answer 503");
        }

        Ok(Self {
            db,
            config,
            pipeline: Arc::new(pipeline),
        })
    }

    #[cfg(test)]
    pub async fn fake(pipeline: Pipeline) -> Self {
        use crate::config::{ConfidenceMode, JwtConfig, ModelConfig};

        let db = db::test_pool().await;
        let config = Arc::new(AppConfig {
            database_url: "sqlite::memory:".into(),
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 30,
            },
            models: ModelConfig {
                gate_path: "fake".into(),
                traits_path: "fake".into(),
            },
            confidence: ConfidenceMode::Fixed,
        });
        Self {
            db,
            config,
            pipeline: Arc::new(pipeline),
        }
    }
}
