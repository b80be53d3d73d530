//! Sequential download pipeline. Each message moves through
//! `listed → fetched → parsed → persisted → marked`; a failure stops that
//! message only.
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use futures::TryStreamExt;
use tracing::{debug, info, warn};

use crate::errors::AppResult;
use crate::gmail::{GmailClient, RawMessage};
use crate::parse::parse_message;
use crate::storage::{files, AttachmentRow, Database};
use crate::types::{Label, MessageRecord, ParsedMessage};

/// Progress line cadence on stdout.
const PROGRESS_EVERY: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Listed,
    Fetched,
    Parsed,
    Persisted,
    Marked,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Listed => "listed",
            Stage::Fetched => "fetched",
            Stage::Parsed => "parsed",
            Stage::Persisted => "persisted",
            Stage::Marked => "marked",
        };
        f.write_str(name)
    }
}

/// What to download in one run.
#[derive(Clone, Debug)]
pub struct DownloadPlan {
    /// Resolved labels in the order the user asked for them.
    pub labels: Vec<Label>,
    /// Every label on the account, for recording label names per message.
    pub all_labels: Vec<Label>,
    pub query: Option<String>,
    pub max: Option<u32>,
    pub tracking_label: Option<Label>,
}

/// A message id together with the requested label it was listed under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedMessage {
    pub gmail_id: String,
    pub label: Label,
}

/// Where one message ended up.
#[derive(Clone, Debug)]
pub struct MessageReport {
    pub gmail_id: String,
    /// Last stage completed.
    pub stage: Stage,
    pub attachments: usize,
    pub error: Option<String>,
}

impl MessageReport {
    fn new(gmail_id: &str) -> Self {
        Self {
            gmail_id: gmail_id.to_string(),
            stage: Stage::Listed,
            attachments: 0,
            error: None,
        }
    }

    pub fn persisted(&self) -> bool {
        self.stage >= Stage::Persisted
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub listed: usize,
    pub persisted: usize,
    pub failed: usize,
    pub marked: usize,
    pub mark_failed: usize,
    pub attachments: usize,
    /// Gmail id and error of every message that was not persisted.
    pub failures: Vec<(String, String)>,
}

impl RunSummary {
    pub fn record(&mut self, report: &MessageReport, marking: bool) {
        self.listed += 1;
        if report.persisted() {
            self.persisted += 1;
            self.attachments += report.attachments;
            if marking {
                if report.stage == Stage::Marked {
                    self.marked += 1;
                } else {
                    self.mark_failed += 1;
                }
            }
        } else {
            self.failed += 1;
            self.failures.push((
                report.gmail_id.clone(),
                report.error.clone().unwrap_or_default(),
            ));
        }
    }

    /// Exit policy: success unless a message failed before it was persisted.
    /// Marking failures are reported but do not fail the run.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

pub struct Downloader<'a> {
    gmail: &'a GmailClient,
    db: &'a Database,
    emails_dir: PathBuf,
}

impl<'a> Downloader<'a> {
    pub fn new(gmail: &'a GmailClient, db: &'a Database, emails_dir: &Path) -> Self {
        Self {
            gmail,
            db,
            emails_dir: emails_dir.to_path_buf(),
        }
    }

    /// List ids for every requested label, in label order, skipping ids seen
    /// under an earlier label. `max` caps the total across labels.
    pub async fn list_targets(&self, plan: &DownloadPlan) -> AppResult<Vec<ListedMessage>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        let cap = plan.max.map(|m| m as usize);
        let full = |out: &Vec<ListedMessage>| cap.is_some_and(|c| out.len() >= c);

        for label in &plan.labels {
            if full(&out) {
                break;
            }

            // Duplicates of earlier labels do not count against `max`.
            let limit = if seen.is_empty() { plan.max } else { None };
            let ids = self
                .gmail
                .lister(&label.id, plan.query.as_deref(), limit)
                .into_stream();
            futures::pin_mut!(ids);
            while let Some(id) = ids.try_next().await? {
                if !seen.insert(id.clone()) {
                    continue;
                }
                out.push(ListedMessage {
                    gmail_id: id,
                    label: label.clone(),
                });
                if full(&out) {
                    break;
                }
            }
            debug!(label = %label.name, total = out.len(), "Listed label");
        }
        Ok(out)
    }

    pub async fn run(&self, plan: &DownloadPlan) -> AppResult<RunSummary> {
        let started = Instant::now();
        let targets = self.list_targets(plan).await?;
        println!("Found {} messages", targets.len());

        let names_by_id: HashMap<&str, &str> = plan
            .all_labels
            .iter()
            .map(|l| (l.id.as_str(), l.name.as_str()))
            .collect();

        let mut summary = RunSummary::default();
        let total = targets.len();
        for (idx, target) in targets.iter().enumerate() {
            let report = self
                .process(target, &names_by_id, plan.tracking_label.as_ref())
                .await;
            summary.record(&report, plan.tracking_label.is_some());

            let n = idx + 1;
            if n % PROGRESS_EVERY == 0 || n == total {
                println!(
                    "Processed {n}/{total} (label: {}, attachments: {})",
                    target.label.name, report.attachments
                );
            }
        }

        info!(
            listed = summary.listed,
            persisted = summary.persisted,
            failed = summary.failed,
            marked = summary.marked,
            mark_failed = summary.mark_failed,
            elapsed_ms = ?started.elapsed().as_millis(),
            "Download run finished"
        );
        Ok(summary)
    }

    /// Drive one message as far as it goes. Never returns an error: the
    /// report carries the stage reached and the failure, if any.
    pub async fn process(
        &self,
        target: &ListedMessage,
        names_by_id: &HashMap<&str, &str>,
        tracking: Option<&Label>,
    ) -> MessageReport {
        let mut report = MessageReport::new(&target.gmail_id);

        let fetched = match self.gmail.get_message_raw(&target.gmail_id).await {
            Ok(m) => m,
            Err(e) => {
                warn!(gmail_id = %target.gmail_id, error = %e, "Fetch failed; skipping message");
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.stage = Stage::Fetched;

        let parsed = parse_message(&fetched.raw);
        report.stage = Stage::Parsed;

        match self.persist(target, &fetched, parsed, names_by_id).await {
            Ok(attachments) => {
                report.attachments = attachments;
                report.stage = Stage::Persisted;
            }
            Err(e) => {
                warn!(gmail_id = %target.gmail_id, error = %e, "Persisting failed");
                report.error = Some(format!("{e:#}"));
                return report;
            }
        }

        if let Some(label) = tracking {
            match self.gmail.add_label_to_message(&target.gmail_id, &label.id).await {
                Ok(()) => report.stage = Stage::Marked,
                Err(e) => {
                    warn!(gmail_id = %target.gmail_id, label = %label.name, error = %e, "Marking failed");
                    report.error = Some(e.to_string());
                }
            }
        }

        report
    }

    async fn persist(
        &self,
        target: &ListedMessage,
        fetched: &RawMessage,
        parsed: ParsedMessage,
        names_by_id: &HashMap<&str, &str>,
    ) -> Result<usize> {
        let label_dir = files::label_dir(&self.emails_dir, &target.label.name);
        let eml_path = files::save_eml(&fetched.raw, &label_dir, &target.gmail_id)?;

        let record = MessageRecord::from_parsed(
            &target.gmail_id,
            fetched.thread_id.clone(),
            fetched.snippet.clone(),
            &parsed,
            eml_path.clone(),
        );
        let email_id = self.db.upsert_email(&record).await?;

        let labels: Vec<Label> = fetched
            .label_ids
            .iter()
            .filter_map(|id| {
                names_by_id.get(id.as_str()).map(|name| Label {
                    id: id.clone(),
                    name: name.to_string(),
                })
            })
            .collect();
        self.db
            .replace_email_labels(email_id, &labels)
            .await
            .context("recording labels")?;

        files::clear_attachments_dir(&label_dir, &target.gmail_id)?;
        let mut rows = Vec::with_capacity(parsed.attachments.len());
        for attachment in &parsed.attachments {
            match files::save_attachment(
                &attachment.data,
                &label_dir,
                &target.gmail_id,
                &attachment.filename,
            ) {
                Ok(path) => rows.push(AttachmentRow {
                    filename: attachment.filename.clone(),
                    content_type: attachment.content_type.clone(),
                    size: attachment.size() as i64,
                    file_path: path,
                }),
                Err(e) => warn!(
                    gmail_id = %target.gmail_id,
                    filename = %attachment.filename,
                    error = %e,
                    "Failed to save attachment"
                ),
            }
        }
        self.db
            .replace_attachments(email_id, &rows)
            .await
            .context("recording attachments")?;

        debug!(gmail_id = %target.gmail_id, path = %eml_path.display(), attachments = rows.len(), "Persisted message");
        Ok(rows.len())
    }
}
