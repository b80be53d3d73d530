use clap::Parser;
use std::path::PathBuf;

use crate::types::DEFAULT_TRACKING_LABEL;

/// Download Gmail messages by label as .eml files and index them in SQLite.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// OAuth client secrets JSON downloaded from Google Cloud Console
    #[arg(long, value_name = "PATH")]
    pub credentials: Option<PathBuf>,

    /// OAuth token JSON (created on first consent, refreshed when expired)
    #[arg(long, value_name = "PATH")]
    pub token: Option<PathBuf>,

    /// Comma-separated label names, e.g. INBOX,Work. Required unless --list-labels
    #[arg(long, value_delimiter = ',', value_name = "NAMES")]
    pub labels: Vec<String>,

    /// List available labels and exit
    #[arg(long)]
    pub list_labels: bool,

    /// Directory receiving per-label .eml files and attachments
    #[arg(long, value_name = "PATH")]
    pub emails_dir: Option<PathBuf>,

    /// SQLite database path (default: <emails-dir>/emails.db)
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Max number of messages to fetch across all labels
    #[arg(long, value_name = "N")]
    pub max: Option<u32>,

    /// Additional Gmail search query, e.g. 'newer_than:1y'
    #[arg(long, value_name = "QUERY")]
    pub query: Option<String>,

    /// Apply this label to each downloaded message, creating it if needed
    #[arg(
        long,
        value_name = "LABEL",
        num_args = 0..=1,
        default_missing_value = DEFAULT_TRACKING_LABEL
    )]
    pub mark_downloaded: Option<String>,

    /// Skip writing emails.csv next to the database
    #[arg(long)]
    pub no_export: bool,
}

impl Cli {
    /// Requested label names with surrounding whitespace and empty entries removed.
    pub fn label_names(&self) -> Vec<String> {
        self.labels
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_split_on_commas_and_trim() {
        let cli = Cli::parse_from(["labelmail", "--labels", "INBOX, Work ,,Receipts"]);
        assert_eq!(cli.label_names(), vec!["INBOX", "Work", "Receipts"]);
    }

    #[test]
    fn bare_mark_downloaded_uses_reserved_label() {
        let cli = Cli::parse_from(["labelmail", "--labels", "INBOX", "--mark-downloaded"]);
        assert_eq!(cli.mark_downloaded.as_deref(), Some(DEFAULT_TRACKING_LABEL));
    }

    #[test]
    fn mark_downloaded_accepts_custom_name() {
        let cli = Cli::parse_from([
            "labelmail",
            "--labels",
            "INBOX",
            "--mark-downloaded",
            "My Downloaded",
        ]);
        assert_eq!(cli.mark_downloaded.as_deref(), Some("My Downloaded"));
    }

    #[test]
    fn marking_is_off_by_default() {
        let cli = Cli::parse_from(["labelmail", "--list-labels"]);
        assert!(cli.mark_downloaded.is_none());
        assert!(cli.label_names().is_empty());
    }
}
