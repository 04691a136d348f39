//! Jira REST (v2) bridge implementing [`IssueTracker`].
//!
//! Issues are translated into [`Ticket`] at the boundary. Label changes go
//! through Jira's `update.labels` add/remove operations, so every write is a
//! set merge on the server. A classification edit (labels plus comment) is a
//! single `PUT`, so the ticket is never labelled without its comment.
//! Transient failures (network, 429, 5xx) are retried with the configured
//! [`RetryPolicy`]; a write carrying a comment is only resent when the server
//! cannot have applied it.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use triage_core::{
    labels, IssueTracker, NewTicket, Priority, RetryPolicy, Ticket, TicketQuery, TicketUpdate,
    TrackerError, TrackerErrorKind,
};

use crate::config::JiraEndpoint;

const ISSUE_FIELDS: &str = "summary,description,priority,labels,created,updated";
const STALE_SEARCH_LIMIT: usize = 200;
const DEFAULT_ISSUE_TYPE: &str = "Task";

/// Raw issue as returned by `/rest/api/2/issue` and `/rest/api/2/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct JiraIssue {
    pub key: String,
    pub fields: JiraFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JiraFields {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub priority: Option<NamedField>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedField {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<JiraIssue>,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    key: String,
}

/// Parse Jira's `2024-03-01T09:00:00.000+0000` (or RFC 3339) timestamps.
pub fn parse_jira_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

/// Translate a Jira issue into a [`Ticket`].
pub fn translate_issue(issue: JiraIssue) -> Result<Ticket, TrackerError> {
    let JiraIssue { key, fields } = issue;
    let timestamp = |name: &str, raw: Option<&String>| {
        raw.and_then(|r| parse_jira_timestamp(r)).ok_or_else(|| {
            TrackerError::new(
                TrackerErrorKind::InvalidResponse,
                format!("issue {key} has missing or unparseable `{name}`"),
            )
        })
    };
    let created = timestamp("created", fields.created.as_ref())?;
    let updated = timestamp("updated", fields.updated.as_ref())?;

    Ok(Ticket {
        summary: fields.summary.unwrap_or_default(),
        description: fields.description.unwrap_or_default(),
        priority: fields
            .priority
            .map(|p| Priority::from_tracker_name(&p.name))
            .unwrap_or(Priority::Medium),
        labels: fields.labels.into_iter().collect(),
        created,
        updated,
        id: key,
    })
}

/// Render a structured query as JQL.
pub fn render_jql(query: &TicketQuery, project_key: &str) -> String {
    render_jql_at(query, project_key, Utc::now())
}

/// Render as of `now`.
///
/// Jira reads absolute date literals in the API user's timezone, so a stale
/// bound is sent as a relative offset (`-Nm`) which the server resolves
/// against its own clock. Minutes are truncated, so the server bound is never
/// earlier than `updated_before`.
pub fn render_jql_at(query: &TicketQuery, project_key: &str, now: DateTime<Utc>) -> String {
    match query {
        TicketQuery::StaleWithLabel {
            label,
            updated_before,
        } => {
            let minutes = (now - *updated_before).num_minutes();
            if minutes > 0 {
                format!("labels = {label} AND updated < \"-{minutes}m\"")
            } else {
                format!("labels = {label} AND updated < now()")
            }
        }
        TicketQuery::Untriaged { .. } => format!(
            "project = {} AND statusCategory != Done AND (labels IS EMPTY OR labels NOT IN ({})) ORDER BY created ASC",
            project_key,
            labels::TRIAGE_LABELS.join(", ")
        ),
        TicketQuery::Raw { query, .. } => query.clone(),
    }
}

fn max_results(query: &TicketQuery) -> usize {
    match query {
        TicketQuery::StaleWithLabel { .. } => STALE_SEARCH_LIMIT,
        TicketQuery::Untriaged { max_results } | TicketQuery::Raw { max_results, .. } => {
            *max_results
        }
    }
}

/// Body for `PUT /issue/{id}`; `None` for an empty update.
///
/// Labels, summary and comment travel in one request so that Jira applies
/// them together or not at all.
pub fn update_payload(update: &TicketUpdate) -> Option<Value> {
    if update.is_empty() {
        return None;
    }
    let mut label_ops: Vec<Value> = update
        .remove_labels
        .iter()
        .map(|l| json!({ "remove": l }))
        .collect();
    label_ops.extend(update.add_labels.iter().map(|l| json!({ "add": l })));

    let mut ops = Map::new();
    if !label_ops.is_empty() {
        ops.insert("labels".into(), Value::Array(label_ops));
    }
    if let Some(comment) = &update.comment {
        ops.insert("comment".into(), json!([{ "add": { "body": comment } }]));
    }

    let mut body = json!({});
    if !ops.is_empty() {
        body["update"] = Value::Object(ops);
    }
    if let Some(summary) = &update.summary {
        body["fields"] = json!({ "summary": summary });
    }
    Some(body)
}

/// Body for `POST /issue`.
pub fn create_payload(ticket: &NewTicket, project_key: &str) -> Value {
    let mut fields = json!({
        "project": { "key": project_key },
        "summary": ticket.summary,
        "description": ticket.description,
        "issuetype": { "name": DEFAULT_ISSUE_TYPE },
    });
    if !ticket.labels.is_empty() {
        fields["labels"] = json!(ticket.labels);
    }
    if let Some(priority) = ticket.priority {
        fields["priority"] = json!({ "name": jira_priority_name(priority) });
    }
    json!({ "fields": fields })
}

fn jira_priority_name(priority: Priority) -> &'static str {
    match priority {
        Priority::ShowStopper => "Highest",
        Priority::Urgent => "Critical",
        Priority::High => "High",
        Priority::Medium => "Medium",
        Priority::Low => "Low",
    }
}

/// Retry semantics of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    /// Safe to resend after any transient failure.
    Idempotent,
    /// Resent only when the connection was never established.
    Once,
}

fn classify_transport_error(err: &reqwest::Error, replay: Replay) -> TrackerError {
    if err.is_decode() {
        TrackerError::new(TrackerErrorKind::InvalidResponse, err.to_string())
    } else if err.is_builder() {
        TrackerError::rejected(err.to_string())
    } else {
        transport_kind(err.is_connect(), replay, err.to_string())
    }
}

/// Only connection failures are replayable for a non-idempotent write.
fn transport_kind(connect_failed: bool, replay: Replay, detail: String) -> TrackerError {
    if replay == Replay::Idempotent || connect_failed {
        TrackerError::transient(detail)
    } else {
        TrackerError::new(TrackerErrorKind::Unconfirmed, detail)
    }
}

/// 429 and 503 mean the request was refused; any other 5xx may have been
/// applied before the failure.
fn status_error(status: StatusCode, body: &str, replay: Replay) -> TrackerError {
    let err = TrackerError::from_status(status.as_u16(), body);
    let refused = matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    );
    if replay == Replay::Once && err.is_retryable() && !refused {
        TrackerError::new(TrackerErrorKind::Unconfirmed, err.detail)
    } else {
        err
    }
}

/// Send one request and decode its body.
async fn send_once(
    req: reqwest::RequestBuilder,
    allow_missing: bool,
    replay: Replay,
) -> Result<Option<Value>, TrackerError> {
    let resp = req
        .send()
        .await
        .map_err(|e| classify_transport_error(&e, replay))?;
    let status = resp.status();
    if allow_missing && status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let text = resp
        .text()
        .await
        .map_err(|e| classify_transport_error(&e, replay))?;
    if !status.is_success() {
        return Err(status_error(status, &text, replay));
    }
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str::<Value>(&text)
        .map(Some)
        .map_err(|e| TrackerError::new(TrackerErrorKind::InvalidResponse, e.to_string()))
}

/// Jira REST client with retry.
pub struct JiraBridge {
    client: reqwest::Client,
    endpoint: JiraEndpoint,
    retry: RetryPolicy,
}

impl JiraBridge {
    pub fn new(client: reqwest::Client, endpoint: JiraEndpoint) -> Self {
        Self::with_retry(client, endpoint, RetryPolicy::default())
    }

    pub fn with_retry(client: reqwest::Client, endpoint: JiraEndpoint, retry: RetryPolicy) -> Self {
        Self {
            client,
            endpoint,
            retry,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/api/2{}", self.endpoint.server.trim_end_matches('/'), path)
    }

    /// One retried request. `Ok(None)` for an empty body or a 404 when
    /// `allow_missing` is set.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        allow_missing: bool,
        replay: Replay,
    ) -> Result<Option<Value>, TrackerError> {
        let url = self.url(path);
        let label = format!("jira {method} {path}");
        self.retry
            .run(&label, |attempt| {
                let mut req = self
                    .client
                    .request(method.clone(), &url)
                    .basic_auth(&self.endpoint.user, Some(&self.endpoint.api_token))
                    .query(query);
                if let Some(b) = body {
                    req = req.json(b);
                }
                debug!(%url, attempt, "Jira request");
                send_once(req, allow_missing, replay)
            })
            .await
            .into_result()
    }
}

#[async_trait]
impl IssueTracker for JiraBridge {
    async fn get(&self, id: &str) -> Result<Option<Ticket>, TrackerError> {
        let path = format!("/issue/{id}");
        let query = [("fields", ISSUE_FIELDS.to_string())];
        let Some(value) = self
            .request(Method::GET, &path, &query, None, true, Replay::Idempotent)
            .await? else {
            return Ok(None);
        };
        let issue: JiraIssue = serde_json::from_value(value)
            .map_err(|e| TrackerError::new(TrackerErrorKind::InvalidResponse, e.to_string()))?;
        translate_issue(issue).map(Some)
    }

    async fn update(&self, id: &str, update: &TicketUpdate) -> Result<(), TrackerError> {
        let Some(body) = update_payload(update) else {
            return Ok(());
        };
        let path = format!("/issue/{id}");
        // Label and summary edits are set operations; an added comment is not.
        let replay = if update.comment.is_some() {
            Replay::Once
        } else {
            Replay::Idempotent
        };
        self.request(Method::PUT, &path, &[], Some(&body), false, replay)
            .await?;
        info!(ticket = %id, add = ?update.add_labels, remove = ?update.remove_labels, "Jira issue updated");
        Ok(())
    }

    async fn search(&self, query: &TicketQuery) -> Result<Vec<Ticket>, TrackerError> {
        let jql = render_jql(query, &self.endpoint.project_key);
        debug!(%jql, "Jira search");
        let params = [
            ("jql", jql),
            ("maxResults", max_results(query).to_string()),
            ("fields", ISSUE_FIELDS.to_string()),
        ];
        let value = self
            .request(Method::GET, "/search", &params, None, false, Replay::Idempotent)
            .await?
            .unwrap_or_else(|| json!({ "issues": [] }));
        let response: SearchResponse = serde_json::from_value(value)
            .map_err(|e| TrackerError::new(TrackerErrorKind::InvalidResponse, e.to_string()))?;
        response.issues.into_iter().map(translate_issue).collect()
    }

    async fn create(&self, ticket: &NewTicket) -> Result<String, TrackerError> {
        let body = create_payload(ticket, &self.endpoint.project_key);
        let value = self
            .request(Method::POST, "/issue", &[], Some(&body), false, Replay::Once)
            .await?
            .ok_or_else(|| {
                TrackerError::new(TrackerErrorKind::InvalidResponse, "empty create response")
            })?;
        let created: CreatedIssue = serde_json::from_value(value)
            .map_err(|e| TrackerError::new(TrackerErrorKind::InvalidResponse, e.to_string()))?;
        info!(ticket = %created.key, summary = %ticket.summary, "Jira issue created");
        Ok(created.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn issue_json() -> Value {
        json!({
            "key": "AWR-42",
            "fields": {
                "summary": "Enable SSO",
                "description": null,
                "priority": { "name": "Show Stopper" },
                "labels": ["customer", "AI_REVIEW"],
                "created": "2024-03-01T09:00:00.000+0000",
                "updated": "2024-03-02T10:30:00.000+0100"
            }
        })
    }

    #[test]
    fn test_translate_issue() {
        let issue: JiraIssue = serde_json::from_value(issue_json()).unwrap();
        let ticket = translate_issue(issue).unwrap();
        assert_eq!(ticket.id, "AWR-42");
        assert_eq!(ticket.description, "");
        assert_eq!(ticket.priority, Priority::ShowStopper);
        assert!(ticket.has_label("AI_REVIEW"));
        assert_eq!(ticket.created, Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        assert_eq!(ticket.updated, Utc.with_ymd_and_hms(2024, 3, 2, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_translate_issue_missing_timestamps() {
        let mut value = issue_json();
        value["fields"]["updated"] = Value::Null;
        let issue: JiraIssue = serde_json::from_value(value).unwrap();
        let err = translate_issue(issue).unwrap_err();
        assert_eq!(err.kind, TrackerErrorKind::InvalidResponse);
    }

    #[test]
    fn test_unknown_priority_defaults_to_medium() {
        let mut value = issue_json();
        value["fields"]["priority"] = json!({ "name": "P3-ish" });
        let issue: JiraIssue = serde_json::from_value(value).unwrap();
        assert_eq!(translate_issue(issue).unwrap().priority, Priority::Medium);
    }

    #[test]
    fn test_render_stale_jql_is_relative() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 8, 6, 30).unwrap();
        let q = TicketQuery::StaleWithLabel {
            label: "AI_REVIEW".into(),
            updated_before: now - chrono::Duration::hours(24),
        };
        assert_eq!(
            render_jql_at(&q, "AWR", now),
            "labels = AI_REVIEW AND updated < \"-1440m\""
        );
    }

    /// Test: the stale bound does not depend on the timezone the cutoff was
    /// computed in, so a Jira user east of UTC sees the same window.
    #[test]
    fn test_render_stale_jql_ignores_timezone_of_cutoff() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        let tokyo = chrono::FixedOffset::east_opt(9 * 3600).unwrap();
        let cutoff_local = (now - chrono::Duration::minutes(90)).with_timezone(&tokyo);
        let q = TicketQuery::StaleWithLabel {
            label: "AI_REVIEW".into(),
            updated_before: cutoff_local.with_timezone(&Utc),
        };
        let jql = render_jql_at(&q, "AWR", now);
        assert_eq!(jql, "labels = AI_REVIEW AND updated < \"-90m\"");
        assert!(!jql.contains("2024-"));
    }

    #[test]
    fn test_render_stale_jql_partial_minute_widens_bound() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 59).unwrap();
        let q = TicketQuery::StaleWithLabel {
            label: "AI_REVIEW".into(),
            updated_before: now - chrono::Duration::seconds(119),
        };
        assert!(render_jql_at(&q, "AWR", now).ends_with("\"-1m\""));

        let future = TicketQuery::StaleWithLabel {
            label: "AI_REVIEW".into(),
            updated_before: now + chrono::Duration::hours(1),
        };
        assert_eq!(
            render_jql_at(&future, "AWR", now),
            "labels = AI_REVIEW AND updated < now()"
        );
    }

    #[test]
    fn test_render_untriaged_jql() {
        let jql = render_jql(&TicketQuery::Untriaged { max_results: 10 }, "AWR");
        assert!(jql.starts_with("project = AWR AND statusCategory != Done"));
        assert!(jql.contains("AI_NEW, AI_REVIEW, AI_DUPLICATE, ESCALATED"));
    }

    #[test]
    fn test_update_payload_uses_label_operations() {
        let update = TicketUpdate::default()
            .remove_label("AI_REVIEW")
            .add_label("ESCALATED")
            .with_comment("Auto-escalated");
        let body = update_payload(&update).unwrap();
        assert_eq!(
            body,
            json!({ "update": {
                "labels": [ { "remove": "AI_REVIEW" }, { "add": "ESCALATED" } ],
                "comment": [ { "add": { "body": "Auto-escalated" } } ]
            } })
        );
    }

    /// Test: labels, summary and comment go out in a single edit request
    #[test]
    fn test_classification_update_is_one_request_body() {
        let update = TicketUpdate::default()
            .add_label("AI_NEW")
            .with_summary("Portal SSO")
            .with_comment("*AI Classification: NEW TICKET*");
        let body = update_payload(&update).unwrap();
        assert_eq!(body["update"]["labels"][0]["add"], "AI_NEW");
        assert_eq!(body["update"]["comment"][0]["add"]["body"], "*AI Classification: NEW TICKET*");
        assert_eq!(body["fields"]["summary"], "Portal SSO");
    }

    #[test]
    fn test_unconfirmed_write_is_not_retried() {
        let err = transport_kind(false, Replay::Once, "timed out".into());
        assert_eq!(err.kind, TrackerErrorKind::Unconfirmed);
        assert!(!err.is_retryable());

        assert!(transport_kind(true, Replay::Once, "refused".into()).is_retryable());
        assert!(transport_kind(false, Replay::Idempotent, "timed out".into()).is_retryable());
    }

    #[test]
    fn test_gateway_timeout_on_comment_write_is_unconfirmed() {
        let err = status_error(StatusCode::GATEWAY_TIMEOUT, "", Replay::Once);
        assert_eq!(err.kind, TrackerErrorKind::Unconfirmed);
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, "", Replay::Once).is_retryable());
        assert!(status_error(StatusCode::GATEWAY_TIMEOUT, "", Replay::Idempotent).is_retryable());
        assert_eq!(
            status_error(StatusCode::BAD_REQUEST, "bad", Replay::Once).kind,
            TrackerErrorKind::Rejected
        );
    }

    #[test]
    fn test_update_payload_summary() {
        let update = TicketUpdate::default()
            .add_label("AI_DUPLICATE")
            .with_summary("X [DUPLICATE: AWR-1]");
        let body = update_payload(&update).unwrap();
        assert_eq!(body["fields"]["summary"], "X [DUPLICATE: AWR-1]");
        assert_eq!(body["update"]["labels"][0]["add"], "AI_DUPLICATE");
    }

    #[test]
    fn test_comment_only_update() {
        let body = update_payload(&TicketUpdate::default().with_comment("hi")).unwrap();
        assert_eq!(body, json!({ "update": { "comment": [ { "add": { "body": "hi" } } ] } }));
        assert!(update_payload(&TicketUpdate::default()).is_none());
    }

    #[test]
    fn test_create_payload() {
        let ticket = NewTicket {
            summary: "Portal SSO".into(),
            description: "desc".into(),
            priority: Some(Priority::Urgent),
            labels: BTreeSet::from([labels::AUTO_LOADED.to_string()]),
        };
        let body = create_payload(&ticket, "AWR");
        assert_eq!(body["fields"]["project"]["key"], "AWR");
        assert_eq!(body["fields"]["issuetype"]["name"], "Task");
        assert_eq!(body["fields"]["labels"][0], "auto-loaded");
        assert_eq!(body["fields"]["priority"]["name"], "Critical");
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_jira_timestamp("2024-03-01T09:00:00Z").is_some());
        assert!(parse_jira_timestamp("2024-03-01T09:00:00.123+0530").is_some());
        assert!(parse_jira_timestamp("2024-03-01T09:00:00.123").is_some());
        assert!(parse_jira_timestamp("yesterday").is_none());
    }
}
