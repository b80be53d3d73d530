use anyhow::Result;
use std::env;
use std::path::PathBuf;

use crate::cli::Cli;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Google endpoints. Overridable so tests and proxies can stand in for Google.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub api_base: String,
    pub auth_url: String,
    pub token_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: GMAIL_API_BASE.to_string(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }
}

/// Application-wide defaults. These can be overridden by env vars but do not
/// require any user-authored config files. Relative paths resolve against the
/// directory the command runs in.
#[derive(Debug, Clone)]
pub struct AppDefaults {
    pub credentials: PathBuf,
    pub token: PathBuf,
    pub emails_dir: PathBuf,
    pub db: Option<PathBuf>,
    pub endpoints: Endpoints,
}

impl AppDefaults {
    pub fn load() -> Result<Self> {
        let fallback = Endpoints::default();
        Ok(Self {
            credentials: path_from_env("LABELMAIL_CREDENTIALS")
                .unwrap_or_else(|| PathBuf::from("credentials.json")),
            token: path_from_env("LABELMAIL_TOKEN").unwrap_or_else(|| PathBuf::from("token.json")),
            emails_dir: path_from_env("LABELMAIL_EMAILS_DIR")
                .unwrap_or_else(|| PathBuf::from("emails")),
            db: path_from_env("LABELMAIL_DB"),
            endpoints: Endpoints {
                api_base: string_from_env("LABELMAIL_API_BASE").unwrap_or(fallback.api_base),
                auth_url: string_from_env("LABELMAIL_AUTH_URL").unwrap_or(fallback.auth_url),
                token_url: string_from_env("LABELMAIL_TOKEN_URL").unwrap_or(fallback.token_url),
            },
        })
    }
}

/// Effective settings for one run: CLI flags win over env defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: PathBuf,
    pub token: PathBuf,
    pub emails_dir: PathBuf,
    pub db: PathBuf,
    pub endpoints: Endpoints,
}

impl Settings {
    pub fn resolve(cli: &Cli, defaults: &AppDefaults) -> Self {
        let emails_dir = cli
            .emails_dir
            .clone()
            .unwrap_or_else(|| defaults.emails_dir.clone());
        let db = cli
            .db
            .clone()
            .or_else(|| defaults.db.clone())
            .unwrap_or_else(|| emails_dir.join("emails.db"));
        Self {
            credentials: cli
                .credentials
                .clone()
                .unwrap_or_else(|| defaults.credentials.clone()),
            token: cli.token.clone().unwrap_or_else(|| defaults.token.clone()),
            emails_dir,
            db,
            endpoints: defaults.endpoints.clone(),
        }
    }

    /// CSV export lands next to the database.
    pub fn csv_path(&self) -> PathBuf {
        self.db
            .parent()
            .map(|p| p.join("emails.csv"))
            .unwrap_or_else(|| PathBuf::from("emails.csv"))
    }
}

fn path_from_env(key: &str) -> Option<PathBuf> {
    string_from_env(key).map(PathBuf::from)
}

fn string_from_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn defaults() -> AppDefaults {
        AppDefaults {
            credentials: PathBuf::from("credentials.json"),
            token: PathBuf::from("token.json"),
            emails_dir: PathBuf::from("emails"),
            db: None,
            endpoints: Endpoints::default(),
        }
    }

    #[test]
    fn db_defaults_under_emails_dir() {
        let cli = Cli::parse_from(["labelmail", "--emails-dir", "/tmp/out"]);
        let settings = Settings::resolve(&cli, &defaults());
        assert_eq!(settings.db, PathBuf::from("/tmp/out/emails.db"));
        assert_eq!(settings.csv_path(), PathBuf::from("/tmp/out/emails.csv"));
    }

    #[test]
    fn cli_flags_override_defaults() {
        let cli = Cli::parse_from([
            "labelmail",
            "--credentials",
            "c.json",
            "--token",
            "t.json",
            "--db",
            "/var/mail/index.db",
        ]);
        let settings = Settings::resolve(&cli, &defaults());
        assert_eq!(settings.credentials, PathBuf::from("c.json"));
        assert_eq!(settings.token, PathBuf::from("t.json"));
        assert_eq!(settings.db, PathBuf::from("/var/mail/index.db"));
        assert_eq!(settings.emails_dir, PathBuf::from("emails"));
    }

    #[test]
    fn env_db_default_is_used_when_flag_absent() {
        let mut d = defaults();
        d.db = Some(PathBuf::from("/data/mail.db"));
        let cli = Cli::parse_from(["labelmail"]);
        assert_eq!(Settings::resolve(&cli, &d).db, PathBuf::from("/data/mail.db"));
    }
}
