use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use triage_core::TriageConfig;

/// Jira REST endpoint and credentials.
#[derive(Debug, Clone)]
pub struct JiraEndpoint {
    pub server: String,
    pub user: String,
    pub api_token: String,
    pub project_key: String,
}

/// OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingEndpoint {
    /// Base URL; `/embeddings` is appended.
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimensions: usize,
}

/// Chroma server and collection.
#[derive(Debug, Clone)]
pub struct ChromaEndpoint {
    pub url: String,
    pub collection: String,
}

/// Top-level service configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jira: JiraEndpoint,
    pub embedding: EmbeddingEndpoint,
    pub chroma: ChromaEndpoint,
    /// Notification webhook (None = log notifications instead of sending).
    pub notify_webhook_url: Option<String>,
    /// `from` address stamped on outgoing notifications.
    pub notify_sender: String,
    /// Triage TOML (None = built-in defaults).
    pub triage_config_path: Option<PathBuf>,
    /// JSONL run log (None = no run log).
    pub run_log_path: Option<PathBuf>,
    /// Per-request timeout for every bridge.
    pub http_timeout_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jira: JiraEndpoint {
                server: env_or("JIRA_SERVER", "http://localhost:8080"),
                user: env_or("JIRA_USER", ""),
                api_token: env_or("JIRA_API_TOKEN", ""),
                project_key: env_or("JIRA_PROJECT_KEY", "AWR"),
            },
            embedding: EmbeddingEndpoint {
                url: env_or("EMBEDDING_URL", "http://localhost:11434/v1"),
                model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
                api_key: env_opt("EMBEDDING_API_KEY"),
                dimensions: std::env::var("EMBEDDING_DIMENSIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1536),
            },
            chroma: ChromaEndpoint {
                url: env_or("CHROMA_URL", "http://localhost:8000"),
                collection: env_or("CHROMA_COLLECTION", "awr"),
            },
            notify_webhook_url: env_opt("NOTIFY_WEBHOOK_URL"),
            notify_sender: env_or("NOTIFY_SENDER", "awr-triage@localhost"),
            triage_config_path: env_opt("TRIAGE_CONFIG").map(PathBuf::from),
            run_log_path: env_opt("TRIAGE_RUN_LOG").map(PathBuf::from),
            http_timeout_secs: std::env::var("TRIAGE_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

impl AppConfig {
    /// Load the triage TOML named by `override_path`, else `TRIAGE_CONFIG`,
    /// else fall back to defaults. A notification recipient set in the
    /// environment (`TRIAGE_RECIPIENT`) wins over the file.
    pub fn load_triage_config(&self, override_path: Option<&PathBuf>) -> Result<Arc<TriageConfig>> {
        let path = override_path.or(self.triage_config_path.as_ref());
        let mut config = match path {
            Some(p) => TriageConfig::from_file(p)
                .with_context(|| format!("Failed to load triage config {}", p.display()))?,
            None => TriageConfig::default(),
        };
        if let Some(recipient) = env_opt("TRIAGE_RECIPIENT") {
            config = config.with_recipient(recipient);
        }
        Ok(Arc::new(config))
    }

    /// A webhook with no recipient would fail every DUPLICATE, REVIEW and
    /// ESCALATED notice, so refuse to start.
    pub fn check_notification_setup(&self, config: &TriageConfig) -> Result<()> {
        if self.notify_webhook_url.is_some() && config.recipient.trim().is_empty() {
            bail!(
                "NOTIFY_WEBHOOK_URL is set but no notification recipient is configured; \
                 set `recipient` in the triage config or TRIAGE_RECIPIENT"
            );
        }
        Ok(())
    }

    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.http_timeout_secs))
            .build()
            .context("Failed to build HTTP client")
    }
}

/// Check if an HTTP endpoint answers at all.
pub async fn check_endpoint(client: &reqwest::Client, url: &str) -> bool {
    match client
        .get(url)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => !resp.status().is_server_error(),
        Err(_) => false,
    }
}
