use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub gate_path: String,
    pub traits_path: String,
}

/// How the overall confidence of a prediction is reported.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceMode {
    /// Gate probability scaled to 0..=100.
    Gate,
    /// Constant 95, kept for older clients.
    Fixed,
}

impl FromStr for ConfidenceMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gate" => Ok(Self::Gate),
            "fixed" => Ok(Self::Fixed),
            other => anyhow::bail!("unknown CONFIDENCE_MODE {other:?} (expected gate or fixed)"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub models: ModelConfig,
    pub confidence: ConfidenceMode,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://scriptsense.db".into());

        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;
        anyhow::ensure!(!secret.is_empty(), "JWT_SECRET must not be empty");

        let ttl_minutes = parse_ttl(std::env::var("JWT_TTL_MINUTES").ok())?;

        let jwt = JwtConfig {
            secret,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "scriptsense".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "scriptsense-users".into()),
            ttl_minutes,
        };

        let models = ModelConfig {
            gate_path: std::env::var("GATE_MODEL_PATH")
                .unwrap_or_else(|_| "models/handwriting_gate.onnx".into()),
            traits_path: std::env::var("TRAIT_MODEL_PATH")
                .unwrap_or_else(|_| "models/personality_traits.onnx".into()),
        };

        let confidence = match std::env::var("CONFIDENCE_MODE") {
            Ok(v) => v.parse()?,
            Err(_) => ConfidenceMode::Gate,
        };

        Ok(Self {
            database_url,
            jwt,
            models,
            confidence,
        })
    }
}

fn parse_ttl(raw: Option<String>) -> anyhow::Result<i64> {
    let Some(raw) = raw else {
        return Ok(30);
    };
    let ttl = raw
        .trim()
        .parse::<i64>()
        .with_context(|| format!("JWT_TTL_MINUTES must be an integer, got {raw:?}"))?;
    anyhow::ensure!(ttl > 0, "JWT_TTL_MINUTES must be positive");
    Ok(ttl)
}
