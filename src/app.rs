use crate::cli::Cli;
use crate::config::{AppDefaults, Settings};
use crate::download::{DownloadPlan, Downloader, RunSummary};
use crate::errors::AppError;
use crate::gmail::{build_query, resolve_labels, GmailClient};
use crate::oauth;
use crate::storage::Database;
use anyhow::{Context, Result};
use tracing::info;

pub async fn run(cli: Cli) -> Result<RunSummary> {
    let defaults = AppDefaults::load()?;
    let settings = Settings::resolve(&cli, &defaults);
    run_with(cli, settings).await
}

/// Same as [`run`] with settings already resolved.
pub async fn run_with(cli: Cli, settings: Settings) -> Result<RunSummary> {
    let label_names = cli.label_names();
    if !cli.list_labels && label_names.is_empty() {
        return Err(AppError::Config(
            "--labels is required (comma-separated names), or use --list-labels to view options"
                .into(),
        )
        .into());
    }

    let token =
        oauth::load_credentials(&settings.credentials, &settings.token, &settings.endpoints).await?;
    let gmail = GmailClient::new(token.access_token, settings.endpoints.api_base.clone());
    let all_labels = gmail.list_labels().await?;

    if cli.list_labels {
        let mut sorted = all_labels;
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        for label in &sorted {
            println!("{}: {}", label.name, label.id);
        }
        return Ok(RunSummary::default());
    }

    let labels = resolve_labels(&all_labels, &label_names)?;

    std::fs::create_dir_all(&settings.emails_dir)
        .with_context(|| format!("creating {}", settings.emails_dir.display()))?;
    let db = Database::open(&settings.db).await?;
    info!(path = %db.path().display(), "Using SQLite store");

    let tracking_label = match cli.mark_downloaded.as_deref() {
        Some(name) => {
            let label = gmail.ensure_label(name).await?;
            println!("Will mark downloaded emails with label: {}", label.name);
            Some(label)
        }
        None => None,
    };

    let plan = DownloadPlan {
        query: build_query(
            cli.query.as_deref(),
            tracking_label.as_ref().map(|l| l.name.as_str()),
        ),
        labels,
        all_labels,
        max: cli.max,
        tracking_label,
    };

    println!("Listing messages for labels: {}", label_names.join(", "));
    let downloader = Downloader::new(&gmail, &db, &settings.emails_dir);
    let summary = downloader.run(&plan).await?;

    if !cli.no_export {
        let csv_path = settings.csv_path();
        let rows = db.export_csv(&csv_path).await?;
        println!("Exported {rows} emails to {}", csv_path.display());
    }

    if summary.mark_failed > 0 {
        println!("{} messages could not be marked", summary.mark_failed);
    }
    if summary.failed > 0 {
        println!("{} of {} messages failed:", summary.failed, summary.listed);
        for (gmail_id, error) in &summary.failures {
            println!("  {gmail_id}: {error}");
        }
    }
    println!("Done.");
    Ok(summary)
}
