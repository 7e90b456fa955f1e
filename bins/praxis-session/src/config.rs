// Service configuration for the Praxis session service
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    /// Exercise-content service (coding challenges, single or plan).
    pub content_url: String,
    /// Orchestration service (report_success endpoint).
    pub orchestrator_url: String,
    /// Debug-challenge service (get-challenge and verify endpoints).
    pub debugger_url: String,
    /// Bearer token for the external services. The auth collaborator that
    /// issues it is out of scope; we only carry the token.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub image: String,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
    /// Wall-clock cap per execution. A hung learner program is killed and
    /// recorded as a per-case error instead of hanging the engine.
    pub execution_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub services: ServiceEndpoints,
    pub sandbox: SandboxConfig,
    /// Visual pause between a received orchestration action and the actual
    /// session replacement.
    #[serde(default = "default_redirect_delay_ms")]
    pub redirect_delay_ms: u64,
    /// How many debug challenges to fetch per session.
    #[serde(default = "default_challenge_batch")]
    pub challenge_batch: u32,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_redirect_delay_ms() -> u64 {
    2500
}

fn default_challenge_batch() -> u32 {
    5
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            image: "python:3.12-slim".to_string(),
            memory_limit_mb: 256,
            cpu_limit: 0.5,
            execution_timeout_ms: 5000,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            listen_addr: default_listen_addr(),
            services: ServiceEndpoints {
                content_url: "http://127.0.0.1:8000/api/code".to_string(),
                orchestrator_url: "http://127.0.0.1:8000/api/main-agent".to_string(),
                debugger_url: "http://127.0.0.1:8000/api/debugger".to_string(),
                bearer_token: None,
            },
            sandbox: SandboxConfig::default(),
            redirect_delay_ms: default_redirect_delay_ms(),
            challenge_batch: default_challenge_batch(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .context("failed to read config file")?;

        let mut settings: Settings = serde_json::from_str(&content)
            .context("failed to parse config file")?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Load from PRAXIS_CONFIG (or config/praxis.json), falling back to
    /// built-in defaults when no file is present.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var("PRAXIS_CONFIG")
            .unwrap_or_else(|_| "config/praxis.json".to_string());
        let path = Path::new(&path);

        if path.exists() {
            Self::load(path)
        } else {
            let mut settings = Settings::default();
            settings.apply_env_overrides();
            Ok(settings)
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("PRAXIS_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Ok(token) = std::env::var("PRAXIS_SERVICE_TOKEN") {
            self.services.bearer_token = Some(token);
        }
    }
}
