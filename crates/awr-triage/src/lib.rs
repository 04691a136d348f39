//! AWR triage orchestrator.
//!
//! Wires the deterministic `triage-core` pipeline to real services:
//! - [`jira_bridge`]: Jira REST as the issue tracker
//! - [`embedding_client`]: OpenAI-compatible embeddings
//! - [`chroma_bridge`]: Chroma as the similarity store
//! - [`notify_bridge`]: webhook or log-only notifications
//!
//! plus corpus loading ([`sample_data`]), document indexing
//! ([`document_index`]) and the JSONL run log ([`telemetry`]).

pub mod chroma_bridge;
pub mod config;
pub mod document_index;
pub mod embedding_client;
pub mod jira_bridge;
pub mod notify_bridge;
pub mod sample_data;
pub mod telemetry;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use triage_core::{
    BatchRunner, Embedder, EscalationScheduler, IssueTracker, Notifier, SimilarityStore,
    TriageConfig, TriageWorkflow,
};

use crate::chroma_bridge::ChromaBridge;
use crate::config::AppConfig;
use crate::embedding_client::EmbeddingClient;
use crate::jira_bridge::JiraBridge;
use crate::notify_bridge::{LogNotifier, WebhookNotifier};

/// The four collaborators plus the triage config, built once per process.
#[derive(Clone)]
pub struct Services {
    pub tracker: Arc<dyn IssueTracker>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn SimilarityStore>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<TriageConfig>,
}

impl Services {
    pub fn connect(app: &AppConfig, config: Arc<TriageConfig>) -> Result<Self> {
        let client = app.http_client()?;
        let notifier: Arc<dyn Notifier> = match &app.notify_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(client.clone(), url, &app.notify_sender)),
            None => {
                info!("NOTIFY_WEBHOOK_URL not set, notifications are logged only");
                Arc::new(LogNotifier)
            }
        };
        Ok(Self {
            tracker: Arc::new(JiraBridge::new(client.clone(), app.jira.clone())),
            embedder: Arc::new(EmbeddingClient::new(client.clone(), app.embedding.clone())),
            store: Arc::new(ChromaBridge::new(client, app.chroma.clone())),
            notifier,
            config,
        })
    }

    pub fn workflow(&self) -> Arc<TriageWorkflow> {
        Arc::new(TriageWorkflow::new(
            Arc::clone(&self.tracker),
            Arc::clone(&self.embedder),
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
            Arc::clone(&self.config),
        ))
    }

    pub fn batch_runner(&self, concurrency: Option<usize>) -> BatchRunner {
        let workflow = self.workflow();
        match concurrency {
            Some(n) => BatchRunner::with_concurrency(workflow, n),
            None => BatchRunner::new(workflow),
        }
    }

    pub fn scheduler(&self) -> EscalationScheduler {
        EscalationScheduler::new(
            Arc::clone(&self.tracker),
            Arc::clone(&self.notifier),
            Arc::clone(&self.config),
        )
    }
}
