use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use awr_triage::config::{check_endpoint, AppConfig};
use awr_triage::document_index::{document_sections, index_sections, load_paragraphs};
use awr_triage::sample_data::{build_corpus, create_tickets, index_corpus, load_records};
use awr_triage::telemetry::{append_run_record, init_tracing, RunLogReader, RunRecord};
use awr_triage::Services;
use triage_core::{labels, Notification, Notifier, TicketQuery};

#[derive(Debug, Parser)]
#[command(name = "awr-triage", about = "Similarity-based triage for AWR tickets")]
struct Cli {
    /// Triage TOML (overrides TRIAGE_CONFIG).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Embed sample AWR records into the similarity store.
    LoadSample {
        #[arg(long)]
        records: PathBuf,
        /// Also create one tracker ticket per record.
        #[arg(long)]
        create_tickets: bool,
    },
    /// Classify one ticket.
    ProcessSingle {
        #[arg(long)]
        ticket_id: String,
    },
    /// Classify every untriaged ticket, or those matched by `--jql`.
    ProcessBatch {
        #[arg(long)]
        jql: Option<String>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long, default_value_t = 50)]
        max_results: usize,
    },
    /// Restore index entries for NEW tickets missing from the similarity store.
    Reindex {
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long, default_value_t = 500)]
        max_results: usize,
    },
    /// Escalate stale REVIEW tickets.
    Escalate {
        /// Keep sweeping until Ctrl-C.
        #[arg(long)]
        watch: bool,
        #[arg(long, default_value_t = 60)]
        interval_mins: u64,
    },
    SendTestNotification {
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "[Triage] test notification")]
        subject: String,
        #[arg(long, default_value = "This is a test notification from awr-triage.")]
        body: String,
    },
    /// Print the flattened target sections of a paragraph-stream document.
    ExtractSections {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        separator: Option<String>,
    },
    /// Embed and index the target sections of one document.
    IndexDocument {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        doc_id: String,
    },
    /// Summarise the run log.
    RunSummary,
    /// Check that every configured service answers.
    Health,
}

impl Command {
    /// Commands whose classification or escalation notices go to the
    /// configured recipient.
    fn notifies_recipient(&self) -> bool {
        matches!(
            self,
            Self::ProcessSingle { .. } | Self::ProcessBatch { .. } | Self::Escalate { .. }
        )
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn record_run(app: &AppConfig, record: RunRecord) {
    if let Some(path) = &app.run_log_path {
        append_run_record(&record, path);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let app = AppConfig::default();
    let triage = app.load_triage_config(cli.config.as_ref())?;
    info!(
        jira = %app.jira.server,
        chroma = %app.chroma.url,
        embedding = %app.embedding.url,
        "AWR triage starting"
    );
    let started = Utc::now();

    match cli.command {
        Command::ExtractSections { input, separator } => {
            let paragraphs = load_paragraphs(&input)?;
            let separator = separator.unwrap_or_else(|| triage.section_separator.clone());
            print_json(&document_sections(&paragraphs, &triage, &separator))?;
        }
        Command::RunSummary => {
            let path = app
                .run_log_path
                .as_ref()
                .context("TRIAGE_RUN_LOG is not set")?;
            let reader = RunLogReader::read_from_file(path)
                .with_context(|| format!("Failed to read run log {}", path.display()))?;
            print_json(&reader.summary())?;
        }
        Command::Health => {
            let client = app.http_client()?;
            let checks = [
                ("jira", format!("{}/rest/api/2/serverInfo", app.jira.server.trim_end_matches('/'))),
                ("chroma", format!("{}/api/v1/heartbeat", app.chroma.url.trim_end_matches('/'))),
                ("embedding", app.embedding.url.clone()),
            ];
            let mut status = serde_json::Map::new();
            for (name, url) in checks {
                let up = check_endpoint(&client, &url).await;
                if !up {
                    warn!(service = name, %url, "Service unreachable");
                }
                status.insert(name.to_string(), up.into());
            }
            print_json(&status)?;
        }
        command => {
            if command.notifies_recipient() {
                app.check_notification_setup(&triage)?;
            }
            let services = Services::connect(&app, triage)?;
            run_service_command(command, &services, &app, started).await?;
        }
    }
    Ok(())
}

async fn run_service_command(
    command: Command,
    services: &Services,
    app: &AppConfig,
    started: chrono::DateTime<Utc>,
) -> Result<()> {
    match command {
        Command::LoadSample {
            records,
            create_tickets: create,
        } => {
            let records = load_records(&records)?;
            let corpus = build_corpus(&records);
            let mut report =
                index_corpus(corpus, services.embedder.as_ref(), services.store.as_ref())
                    .await
                    .context("Failed to load sample corpus")?;
            if create {
                let (created, failed) = create_tickets(&records, services.tracker.as_ref()).await;
                report.created_tickets = created;
                report.failed_tickets = failed;
            }
            record_run(
                app,
                RunRecord::new("load-sample", started)
                    .with_counts(report.indexed, report.skipped)
                    .with_detail(&report),
            );
            print_json(&report)?;
        }
        Command::ProcessSingle { ticket_id } => {
            let result = services.workflow().process(&ticket_id).await;
            let record = RunRecord::new("process-single", started);
            match result {
                Ok(outcome) => {
                    let mut record = record.with_counts(usize::from(!outcome.skipped), 0);
                    record.skipped = usize::from(outcome.skipped);
                    if let Some(c) = outcome.classification {
                        record.classifications.insert(c.label().to_string(), 1);
                    }
                    record_run(app, record.with_detail(&outcome));
                    print_json(&outcome)?;
                }
                Err(e) => {
                    record_run(app, record.with_counts(0, 1).with_detail(e.to_string()));
                    return Err(e).with_context(|| format!("Failed to triage {ticket_id}"));
                }
            }
        }
        Command::ProcessBatch {
            jql,
            concurrency,
            max_results,
        } => {
            let runner = services.batch_runner(concurrency);
            let query = match jql {
                Some(query) => TicketQuery::Raw { query, max_results },
                None => TicketQuery::Untriaged { max_results },
            };
            let ids = runner.select(&query).await.context("Ticket selection failed")?;
            let report = runner.run(ids).await;
            record_run(app, RunRecord::from_batch("process-batch", started, &report));
            print_json(&report)?;
        }
        Command::Reindex {
            concurrency,
            max_results,
        } => {
            let runner = services.batch_runner(concurrency);
            let query = TicketQuery::Raw {
                query: format!(
                    "project = {} AND labels = {} ORDER BY created ASC",
                    app.jira.project_key,
                    labels::AI_NEW
                ),
                max_results,
            };
            let ids = runner.select(&query).await.context("Ticket selection failed")?;
            let report = runner.run(ids).await;
            record_run(app, RunRecord::from_batch("reindex", started, &report));
            print_json(&report)?;
        }
        Command::Escalate {
            watch,
            interval_mins,
        } => {
            let scheduler = services.scheduler();
            if watch {
                let period = Duration::from_secs(interval_mins.max(1) * 60);
                info!(interval_mins, "Escalation watch started, Ctrl-C to stop");
                let shutdown = async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for Ctrl-C: {e}");
                    }
                };
                let reports = scheduler.run_periodic(period, shutdown).await;
                for report in &reports {
                    let at = report.swept_at.unwrap_or(started);
                    record_run(app, RunRecord::from_sweep(at, report));
                }
                print_json(&reports)?;
            } else {
                let report = scheduler
                    .sweep_report(Utc::now())
                    .await
                    .context("Escalation sweep failed")?;
                record_run(app, RunRecord::from_sweep(started, &report));
                print_json(&report)?;
            }
        }
        Command::SendTestNotification { to, subject, body } => {
            let notification = Notification {
                recipient: to,
                subject,
                body,
            };
            services
                .notifier
                .send(&notification)
                .await
                .context("Test notification failed")?;
            print_json(&notification)?;
        }
        Command::IndexDocument { input, doc_id } => {
            let paragraphs = load_paragraphs(&input)?;
            let sections =
                document_sections(&paragraphs, &services.config, &services.config.section_separator);
            let report = index_sections(
                &doc_id,
                &sections,
                services.embedder.as_ref(),
                services.store.as_ref(),
            )
            .await
            .with_context(|| format!("Failed to index document {doc_id}"))?;
            record_run(
                app,
                RunRecord::new("index-document", started)
                    .with_counts(report.indexed, report.skipped.len())
                    .with_detail(&report),
            );
            print_json(&report)?;
        }
        Command::ExtractSections { .. } | Command::RunSummary | Command::Health => {}
    }
    Ok(())
}
