//! Integration tests for the triage pipeline
//!
//! Drives `TriageWorkflow` against in-memory collaborators, with mockall
//! doubles standing in for collaborators that fail.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;

use triage_core::in_memory::{HashEmbedder, MemoryStore, MemoryTracker, RecordingNotifier};
use triage_core::{
    labels, Classification, Embedder, EmbeddingError, IndexEntry, IssueTracker, NewTicket,
    Notification, NotificationError, Notifier, Priority, SimilarityHit, SimilarityStore,
    SimilarityStoreError, Ticket, TicketQuery, TicketUpdate, TrackerError, TriageConfig,
    TriageError, TriageWorkflow,
};

mock! {
    pub FailingNotifier {}

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
    }
}

mock! {
    pub BrokenEmbedder {}

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
        fn dimension(&self) -> usize;
    }
}

mock! {
    pub FlakyStore {}

    #[async_trait]
    impl SimilarityStore for FlakyStore {
        async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SimilarityHit>, SimilarityStoreError>;
        async fn upsert(&self, entry: IndexEntry) -> Result<(), SimilarityStoreError>;
        async fn count(&self) -> Result<usize, SimilarityStoreError>;
        async fn contains(&self, id: &str) -> Result<bool, SimilarityStoreError>;
    }
}

mock! {
    pub FailingTracker {}

    #[async_trait]
    impl IssueTracker for FailingTracker {
        async fn get(&self, id: &str) -> Result<Option<Ticket>, TrackerError>;
        async fn update(&self, id: &str, update: &TicketUpdate) -> Result<(), TrackerError>;
        async fn search(&self, query: &TicketQuery) -> Result<Vec<Ticket>, TrackerError>;
        async fn create(&self, ticket: &NewTicket) -> Result<String, TrackerError>;
    }
}

fn ticket(id: &str, summary: &str, description: &str, priority: Priority) -> Ticket {
    Ticket {
        id: id.into(),
        summary: summary.into(),
        description: description.into(),
        priority,
        labels: Default::default(),
        created: Utc::now(),
        updated: Utc::now(),
    }
}

fn config() -> Arc<TriageConfig> {
    Arc::new(TriageConfig::default().with_recipient("awr-ops@example.com"))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("triage_core=debug")
        .try_init();
}

/// Test: NEW, then an exact resubmission is a DUPLICATE, an unrelated ticket is NEW
#[tokio::test]
async fn test_corpus_grows_only_with_new_tickets() {
    init_tracing();
    let tracker = Arc::new(MemoryTracker::new());
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let workflow = TriageWorkflow::new(
        tracker.clone(),
        Arc::new(HashEmbedder::new(256)),
        store.clone(),
        notifier.clone(),
        config(),
    );

    tracker.insert(ticket(
        "AWR-10",
        "Customer portal single sign-on",
        "Integrate portal login with corporate SAML identity provider",
        Priority::High,
    ));
    tracker.insert(ticket(
        "AWR-11",
        "Customer portal single sign-on",
        "Integrate portal login with corporate SAML identity provider",
        Priority::High,
    ));
    tracker.insert(ticket(
        "AWR-12",
        "Quarterly invoice PDF layout",
        "Finance wants VAT numbers printed on every invoice page",
        Priority::Low,
    ));

    let first = workflow.process("AWR-10").await.unwrap();
    let second = workflow.process("AWR-11").await.unwrap();
    let third = workflow.process("AWR-12").await.unwrap();

    assert_eq!(first.classification, Some(Classification::New));
    assert_eq!(second.classification, Some(Classification::Duplicate));
    assert_eq!(third.classification, Some(Classification::New));

    assert_eq!(store.len(), 2);
    assert!(store.get("AWR-11").is_none());
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(notifier.sent()[0].recipient, "awr-ops@example.com");
}

/// Test: re-processing a labelled ticket never duplicates a label or marker
#[tokio::test]
async fn test_reprocessing_is_idempotent() {
    let tracker = Arc::new(MemoryTracker::new());
    let store = Arc::new(MemoryStore::new());
    let workflow = TriageWorkflow::new(
        tracker.clone(),
        Arc::new(HashEmbedder::new(64)),
        store.clone(),
        Arc::new(RecordingNotifier::new()),
        config(),
    );
    tracker.insert(ticket("AWR-1", "Firewall rule audit", "Review rules", Priority::Medium));
    tracker.insert(ticket("AWR-2", "Firewall rule audit", "Review rules", Priority::Medium));

    workflow.process("AWR-1").await.unwrap();
    workflow.process("AWR-2").await.unwrap();
    let before = tracker.snapshot("AWR-2").unwrap();

    let again = workflow.process("AWR-2").await.unwrap();
    assert!(again.skipped);
    assert_eq!(tracker.snapshot("AWR-2").unwrap(), before);
    assert_eq!(before.summary.matches("[DUPLICATE:").count(), 1);
    assert!(before.has_label(labels::AI_DUPLICATE));
}

/// Test: a failing notifier leaves the committed classification intact
#[tokio::test]
async fn test_notification_failure_is_non_fatal() {
    let tracker = Arc::new(MemoryTracker::new());
    let store = Arc::new(MemoryStore::new());

    let mut notifier = MockFailingNotifier::new();
    notifier
        .expect_send()
        .times(1)
        .returning(|_| Err(NotificationError::Transport("smtp relay down".into())));

    let workflow = TriageWorkflow::new(
        tracker.clone(),
        Arc::new(HashEmbedder::new(64)),
        store,
        Arc::new(notifier),
        config(),
    );
    tracker.insert(ticket("AWR-1", "Backup job fails", "Nightly job exits 137", Priority::Urgent));
    tracker.insert(ticket("AWR-2", "Backup job fails", "Nightly job exits 137", Priority::Urgent));

    workflow.process("AWR-1").await.unwrap();
    let outcome = workflow.process("AWR-2").await.unwrap();

    assert_eq!(outcome.classification, Some(Classification::Duplicate));
    assert!(!outcome.notified);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(tracker.snapshot("AWR-2").unwrap().has_label(labels::AI_DUPLICATE));
}

/// Test: embedding failure aborts with no tracker mutation
#[tokio::test]
async fn test_embedding_failure_fails_closed() {
    let tracker = Arc::new(MemoryTracker::new());
    let mut embedder = MockBrokenEmbedder::new();
    embedder
        .expect_embed()
        .returning(|_| Err(EmbeddingError::Request("connection refused".into())));
    embedder.expect_dimension().return_const(64usize);

    let workflow = TriageWorkflow::new(
        tracker.clone(),
        Arc::new(embedder),
        Arc::new(MemoryStore::new()),
        Arc::new(RecordingNotifier::new()),
        config(),
    );
    tracker.insert(ticket("AWR-1", "Mail bounce", "", Priority::High));

    let err = workflow.process("AWR-1").await.unwrap_err();
    assert!(matches!(err, TriageError::Embedding(_)));
    assert!(err.is_retryable());
    assert_eq!(tracker.update_count(), 0);
    assert!(tracker.snapshot("AWR-1").unwrap().labels.is_empty());
}

/// Test: query failure aborts; no upsert is attempted
#[tokio::test]
async fn test_query_failure_fails_closed() {
    let tracker = Arc::new(MemoryTracker::new());
    let mut store = MockFlakyStore::new();
    store
        .expect_query()
        .returning(|_, _| Err(SimilarityStoreError::Request("503".into())));
    store.expect_upsert().never();

    let workflow = TriageWorkflow::new(
        tracker.clone(),
        Arc::new(HashEmbedder::new(64)),
        Arc::new(store),
        Arc::new(RecordingNotifier::new()),
        config(),
    );
    tracker.insert(ticket("AWR-1", "Mail bounce", "SPF record", Priority::High));

    let err = workflow.process("AWR-1").await.unwrap_err();
    assert!(matches!(err, TriageError::SimilarityStore(_)));
    assert_eq!(tracker.update_count(), 0);
}

/// Test: upsert failure after the tracker write leaves a labelled, unindexed ticket
#[tokio::test]
async fn test_upsert_failure_is_degraded_not_fatal() {
    let tracker = Arc::new(MemoryTracker::new());
    let mut store = MockFlakyStore::new();
    store.expect_query().returning(|_, _| Ok(Vec::new()));
    store
        .expect_upsert()
        .times(1)
        .returning(|_| Err(SimilarityStoreError::Request("disk full".into())));

    let workflow = TriageWorkflow::new(
        tracker.clone(),
        Arc::new(HashEmbedder::new(64)),
        Arc::new(store),
        Arc::new(RecordingNotifier::new()),
        config(),
    );
    tracker.insert(ticket("AWR-1", "Mail bounce", "SPF record", Priority::High));

    let outcome = workflow.process("AWR-1").await.unwrap();
    assert_eq!(outcome.classification, Some(Classification::New));
    assert!(!outcome.indexed);
    assert!(tracker.snapshot("AWR-1").unwrap().has_label(labels::AI_NEW));
}

/// Test: thresholds are applied per priority to the same similarity score
#[tokio::test]
async fn test_review_band_depends_on_priority() {
    let tracker = Arc::new(MemoryTracker::new());
    let mut store = MockFlakyStore::new();
    store.expect_query().returning(|_, _| {
        let mut hit = SimilarityHit {
            id: "legacy-1".into(),
            distance: 0.18,
            document: None,
            metadata: Default::default(),
        };
        hit.metadata.insert("AWR_DOC_JIRA_REF".into(), "AWR-500".into());
        hit.metadata.insert("JIRA_AWR_Title".into(), "Legacy SSO rollout".into());
        Ok(vec![hit])
    });
    store.expect_upsert().returning(|_| Ok(()));

    let notifier = Arc::new(RecordingNotifier::new());
    let workflow = TriageWorkflow::new(
        tracker.clone(),
        Arc::new(HashEmbedder::new(64)),
        Arc::new(store),
        notifier.clone(),
        config(),
    );
    tracker.insert(ticket("AWR-1", "SSO", "x", Priority::High));
    tracker.insert(ticket("AWR-2", "SSO", "x", Priority::Low));

    let high = workflow.process("AWR-1").await.unwrap();
    let low = workflow.process("AWR-2").await.unwrap();

    assert_eq!(high.classification, Some(Classification::Review));
    assert_eq!(low.classification, Some(Classification::Duplicate));

    let reviewed = tracker.snapshot("AWR-1").unwrap();
    assert_eq!(reviewed.summary, "SSO [REVIEW NEEDED: AWR-500]");
    let comment = &tracker.comments("AWR-1")[0];
    assert!(comment.contains("Legacy SSO rollout"));
    assert_eq!(notifier.sent().len(), 2);
}

/// Test: a NEW ticket whose upsert failed is indexed when processed again,
/// without a second tracker write
#[tokio::test]
async fn test_failed_upsert_is_restored_on_reprocess() {
    let tracker = Arc::new(MemoryTracker::new());
    let mut store = MockFlakyStore::new();
    let upserts = AtomicUsize::new(0);
    store.expect_query().returning(|_, _| Ok(Vec::new()));
    store.expect_contains().times(1).returning(|_| Ok(false));
    store
        .expect_upsert()
        .times(2)
        .withf(|entry| entry.id == "AWR-1" && entry.metadata["ticket_id"] == "AWR-1")
        .returning(move |_| {
            if upserts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SimilarityStoreError::Request("disk full".into()))
            } else {
                Ok(())
            }
        });

    let notifier = Arc::new(RecordingNotifier::new());
    let workflow = TriageWorkflow::new(
        tracker.clone(),
        Arc::new(HashEmbedder::new(64)),
        Arc::new(store),
        notifier.clone(),
        config(),
    );
    tracker.insert(ticket("AWR-1", "Mail bounce", "SPF record", Priority::High));

    let first = workflow.process("AWR-1").await.unwrap();
    assert_eq!(first.classification, Some(Classification::New));
    assert!(!first.indexed);

    let second = workflow.process("AWR-1").await.unwrap();
    assert!(second.skipped);
    assert!(second.indexed);
    assert!(second.classification.is_none());
    assert_eq!(tracker.update_count(), 1);
    assert_eq!(tracker.comments("AWR-1").len(), 1);
    assert!(notifier.sent().is_empty());
}

fn failing_tracker(t: Ticket) -> MockFailingTracker {
    let mut tracker = MockFailingTracker::new();
    tracker
        .expect_get()
        .returning(move |_| Ok(Some(t.clone())));
    tracker
        .expect_update()
        .times(1)
        .returning(|_, _| Err(TrackerError::transient("HTTP 503: maintenance")));
    tracker.expect_search().never();
    tracker.expect_create().never();
    tracker
}

/// Test: a failed tracker write on a NEW ticket is an error and nothing is indexed
#[tokio::test]
async fn test_tracker_failure_on_new_skips_index() {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let workflow = TriageWorkflow::new(
        Arc::new(failing_tracker(ticket("AWR-1", "Mail bounce", "SPF record", Priority::High))),
        Arc::new(HashEmbedder::new(64)),
        store.clone(),
        notifier.clone(),
        config(),
    );

    let err = workflow.process("AWR-1").await.unwrap_err();
    assert!(matches!(err, TriageError::Tracker(_)));
    assert!(err.is_retryable());
    assert_eq!(store.len(), 0);
    assert!(notifier.sent().is_empty());
}

/// Test: a failed tracker write on a DUPLICATE sends no notification
#[tokio::test]
async fn test_tracker_failure_on_duplicate_skips_notification() {
    let embedder = Arc::new(HashEmbedder::new(64));
    let original = ticket("AWR-1", "Backup job fails", "Nightly job exits 137", Priority::Urgent);
    let text = original.embedding_text();
    let store = Arc::new(MemoryStore::new());
    store
        .upsert(IndexEntry {
            id: "AWR-1".into(),
            embedding: embedder.embed(&text).await.unwrap(),
            document: text,
            metadata: Default::default(),
        })
        .await
        .unwrap();

    let notifier = Arc::new(RecordingNotifier::new());
    let workflow = TriageWorkflow::new(
        Arc::new(failing_tracker(ticket(
            "AWR-2",
            "Backup job fails",
            "Nightly job exits 137",
            Priority::Urgent,
        ))),
        embedder,
        store.clone(),
        notifier.clone(),
        config(),
    );

    let err = workflow.process("AWR-2").await.unwrap_err();
    assert!(matches!(err, TriageError::Tracker(_)));
    assert_eq!(store.len(), 1);
    assert!(store.get("AWR-2").is_none());
    assert!(notifier.sent().is_empty());
}
