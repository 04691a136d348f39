//! In-process collaborators: a ticket map, a cosine vector store, a hashing
//! embedder and a notifier that records what it was asked to send.
//!
//! Used by the test suites and by dry runs of the binary. The hash embedder
//! captures lexical overlap only; identical texts map to identical vectors.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{
    EmbeddingError, NotificationError, SimilarityStoreError, TrackerError, TrackerErrorKind,
};
use crate::ports::{
    Embedder, IndexEntry, IssueTracker, NewTicket, Notification, Notifier, SimilarityHit,
    SimilarityStore, TicketQuery, TicketUpdate,
};
use crate::ticket::{Priority, Ticket};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;
const MIN_TOKEN_LEN: usize = 2;

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Embedder ──────────────────────────────────────────────────────────

/// FNV-1a bag-of-words embedder, l2-normalised.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// A zero dimension is bumped to 1.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];
        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let index = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 1 { 1.0 } else { -1.0 };
            embedding[index] += sign;
        }
        l2_normalize(&mut embedding);
        embedding
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// `1 − cos(a, b)`; zero vectors are at distance 1 from everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let na: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if na <= f64::EPSILON || nb <= f64::EPSILON {
        return 1.0;
    }
    1.0 - dot / (na * nb)
}

// ── Similarity store ──────────────────────────────────────────────────

/// Exhaustive cosine search over an id-keyed map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, IndexEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        guard(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<IndexEntry> {
        guard(&self.entries).get(id).cloned()
    }
}

#[async_trait]
impl SimilarityStore for MemoryStore {
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SimilarityHit>, SimilarityStoreError> {
        let entries = guard(&self.entries);
        let mut hits = Vec::with_capacity(entries.len());
        for entry in entries.values() {
            if entry.embedding.len() != embedding.len() {
                return Err(SimilarityStoreError::DimensionMismatch {
                    expected: entry.embedding.len(),
                    actual: embedding.len(),
                });
            }
            hits.push(SimilarityHit {
                id: entry.id.clone(),
                distance: cosine_distance(embedding, &entry.embedding),
                document: Some(entry.document.clone()),
                metadata: entry.metadata.clone(),
            });
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn upsert(&self, entry: IndexEntry) -> Result<(), SimilarityStoreError> {
        guard(&self.entries).insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn count(&self) -> Result<usize, SimilarityStoreError> {
        Ok(self.len())
    }

    async fn contains(&self, id: &str) -> Result<bool, SimilarityStoreError> {
        Ok(guard(&self.entries).contains_key(id))
    }
}

// ── Issue tracker ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct TrackerState {
    tickets: BTreeMap<String, Ticket>,
    comments: BTreeMap<String, Vec<String>>,
    next_id: usize,
}

/// Ticket map with tracker semantics: label merges, `updated` bumped on write.
#[derive(Debug)]
pub struct MemoryTracker {
    project: String,
    state: Mutex<TrackerState>,
    updates: AtomicUsize,
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::with_project("AWR")
    }

    pub fn with_project(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            state: Mutex::new(TrackerState::default()),
            updates: AtomicUsize::new(0),
        }
    }

    /// Seed a ticket as-is, replacing any existing one with the same id.
    pub fn insert(&self, ticket: Ticket) {
        guard(&self.state).tickets.insert(ticket.id.clone(), ticket);
    }

    pub fn snapshot(&self, id: &str) -> Option<Ticket> {
        guard(&self.state).tickets.get(id).cloned()
    }

    pub fn comments(&self, id: &str) -> Vec<String> {
        guard(&self.state)
            .comments
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Successful `update` calls so far.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IssueTracker for MemoryTracker {
    async fn get(&self, id: &str) -> Result<Option<Ticket>, TrackerError> {
        Ok(self.snapshot(id))
    }

    async fn update(&self, id: &str, update: &TicketUpdate) -> Result<(), TrackerError> {
        let mut state = guard(&self.state);
        let ticket = state
            .tickets
            .get_mut(id)
            .ok_or_else(|| TrackerError::new(TrackerErrorKind::NotFound, id))?;

        ticket.labels = update.merged_labels(&ticket.labels);
        if let Some(summary) = &update.summary {
            ticket.summary = summary.clone();
        }
        ticket.updated = Utc::now();

        if let Some(comment) = &update.comment {
            state
                .comments
                .entry(id.to_string())
                .or_default()
                .push(comment.clone());
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn search(&self, query: &TicketQuery) -> Result<Vec<Ticket>, TrackerError> {
        let state = guard(&self.state);
        let tickets = state.tickets.values();
        let found = match query {
            TicketQuery::StaleWithLabel {
                label,
                updated_before,
            } => tickets
                .filter(|t| t.has_label(label) && t.updated < *updated_before)
                .cloned()
                .collect(),
            TicketQuery::Untriaged { max_results } => tickets
                .filter(|t| !t.is_triaged())
                .take(*max_results)
                .cloned()
                .collect(),
            TicketQuery::Raw { query, .. } => {
                return Err(TrackerError::rejected(format!(
                    "raw queries are not supported in memory: {query}"
                )))
            }
        };
        Ok(found)
    }

    async fn create(&self, new: &NewTicket) -> Result<String, TrackerError> {
        let mut state = guard(&self.state);
        state.next_id += 1;
        let id = format!("{}-{}", self.project, state.next_id);
        let now = Utc::now();
        state.tickets.insert(
            id.clone(),
            Ticket {
                id: id.clone(),
                summary: new.summary.clone(),
                description: new.description.clone(),
                priority: new.priority.unwrap_or(Priority::Medium),
                labels: new.labels.iter().cloned().collect::<BTreeSet<_>>(),
                created: now,
                updated: now,
            },
        );
        Ok(id)
    }
}

// ── Notifier ──────────────────────────────────────────────────────────

/// Keeps every notification it is handed.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        guard(&self.sent).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        if notification.recipient.trim().is_empty() {
            return Err(NotificationError::MissingRecipient);
        }
        guard(&self.sent).push(notification.clone());
        Ok(())
    }
}
