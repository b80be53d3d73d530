use crate::types::{HeaderBag, Label, MessageRecord};
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

/// Attachment metadata recorded alongside the file written to disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentRow {
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub file_path: PathBuf,
}

/// A stored `emails` row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredEmail {
    pub id: i64,
    pub record: MessageRecord,
    pub created_at: String,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    /// Open (creating if needed) the database file and ensure the schema.
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        // One writer, one connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("connecting to sqlite at {}", db_path.display()))?;

        let db = Database {
            pool,
            path: db_path.to_path_buf(),
        };
        db.migrate().await?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                gmail_id TEXT NOT NULL UNIQUE,
                thread_id TEXT,
                message_id TEXT,
                subject TEXT,
                from_addr TEXT,
                to_addrs TEXT,
                cc_addrs TEXT,
                bcc_addrs TEXT,
                date TEXT,
                snippet TEXT,
                text_body TEXT,
                html_body TEXT,
                headers_json TEXT,
                raw_eml_path TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email_id INTEGER NOT NULL,
                filename TEXT NOT NULL,
                content_type TEXT,
                size INTEGER,
                file_path TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (email_id) REFERENCES emails(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_attachments_email_id ON attachments(email_id);

            CREATE TABLE IF NOT EXISTS email_labels (
                email_id INTEGER NOT NULL,
                label_name TEXT NOT NULL,
                label_id TEXT NOT NULL,
                PRIMARY KEY (email_id, label_name),
                FOREIGN KEY (email_id) REFERENCES emails(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_email_labels_label_name ON email_labels(label_name);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("running migrations")?;
        Ok(())
    }

    /// Insert or refresh a message row keyed by Gmail id. `created_at` keeps
    /// its first-insert value. Returns the internal row id.
    pub async fn upsert_email(&self, message: &MessageRecord) -> Result<i64> {
        sqlx::query(
            r#"
            INSERT INTO emails (
                gmail_id, thread_id, message_id, subject, from_addr, to_addrs, cc_addrs, bcc_addrs,
                date, snippet, text_body, html_body, headers_json, raw_eml_path
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(gmail_id) DO UPDATE SET
                thread_id = excluded.thread_id,
                message_id = excluded.message_id,
                subject = excluded.subject,
                from_addr = excluded.from_addr,
                to_addrs = excluded.to_addrs,
                cc_addrs = excluded.cc_addrs,
                bcc_addrs = excluded.bcc_addrs,
                date = excluded.date,
                snippet = excluded.snippet,
                text_body = excluded.text_body,
                html_body = excluded.html_body,
                headers_json = excluded.headers_json,
                raw_eml_path = excluded.raw_eml_path;
            "#,
        )
        .bind(&message.gmail_id)
        .bind(&message.thread_id)
        .bind(&message.message_id)
        .bind(&message.subject)
        .bind(&message.from)
        .bind(&message.to)
        .bind(&message.cc)
        .bind(&message.bcc)
        .bind(&message.date)
        .bind(&message.snippet)
        .bind(&message.text_body)
        .bind(&message.html_body)
        .bind(message.headers.to_json())
        .bind(message.raw_eml_path.to_string_lossy().into_owned())
        .execute(&self.pool)
        .await
        .with_context(|| format!("upserting email {}", message.gmail_id))?;

        self.email_id_by_gmail_id(&message.gmail_id)
            .await?
            .with_context(|| format!("email {} missing after upsert", message.gmail_id))
    }

    pub async fn email_id_by_gmail_id(&self, gmail_id: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT id FROM emails WHERE gmail_id = ?1")
            .bind(gmail_id)
            .fetch_optional(&self.pool)
            .await
            .context("looking up email id")?;
        Ok(row.map(|r| r.get::<i64, _>(0)))
    }

    pub async fn load_email(&self, gmail_id: &str) -> Result<Option<StoredEmail>> {
        let row = sqlx::query(
            r#"
            SELECT id, gmail_id, thread_id, message_id, subject, from_addr, to_addrs, cc_addrs,
                   bcc_addrs, date, snippet, text_body, html_body, headers_json, raw_eml_path,
                   CAST(created_at AS TEXT)
            FROM emails
            WHERE gmail_id = ?1;
            "#,
        )
        .bind(gmail_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading email")?;

        Ok(row.map(|row| {
            let headers: HeaderBag = row
                .get::<Option<String>, _>(13)
                .and_then(|raw| serde_json::from_str(&raw).ok())
                .unwrap_or_default();
            StoredEmail {
                id: row.get(0),
                record: MessageRecord {
                    gmail_id: row.get(1),
                    thread_id: row.get(2),
                    message_id: row.get(3),
                    subject: row.get(4),
                    from: row.get(5),
                    to: row.get(6),
                    cc: row.get(7),
                    bcc: row.get(8),
                    date: row.get(9),
                    snippet: row.get(10),
                    text_body: row.get::<Option<String>, _>(11).unwrap_or_default(),
                    html_body: row.get::<Option<String>, _>(12).unwrap_or_default(),
                    headers,
                    raw_eml_path: PathBuf::from(
                        row.get::<Option<String>, _>(14).unwrap_or_default(),
                    ),
                },
                created_at: row.get::<Option<String>, _>(15).unwrap_or_default(),
            }
        }))
    }

    pub async fn count_emails(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM emails")
            .fetch_one(&self.pool)
            .await
            .context("counting emails")?;
        Ok(row.get::<i64, _>(0))
    }

    /// Replace the label associations of one email.
    pub async fn replace_email_labels(&self, email_id: i64, labels: &[Label]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("beginning label tx")?;
        sqlx::query("DELETE FROM email_labels WHERE email_id = ?1")
            .bind(email_id)
            .execute(&mut *tx)
            .await
            .context("clearing email labels")?;
        for label in labels {
            sqlx::query(
                "INSERT OR REPLACE INTO email_labels (email_id, label_name, label_id) VALUES (?1, ?2, ?3)",
            )
            .bind(email_id)
            .bind(&label.name)
            .bind(&label.id)
            .execute(&mut *tx)
            .await
            .context("inserting email label")?;
        }
        tx.commit().await.context("committing label tx")?;
        Ok(())
    }

    pub async fn load_email_labels(&self, email_id: i64) -> Result<Vec<Label>> {
        let rows = sqlx::query(
            "SELECT label_id, label_name FROM email_labels WHERE email_id = ?1 ORDER BY label_name",
        )
        .bind(email_id)
        .fetch_all(&self.pool)
        .await
        .context("loading email labels")?;
        Ok(rows
            .into_iter()
            .map(|r| Label {
                id: r.get(0),
                name: r.get(1),
            })
            .collect())
    }

    /// Replace the attachment rows of one email in a single transaction.
    pub async fn replace_attachments(&self, email_id: i64, rows: &[AttachmentRow]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("beginning attachment tx")?;
        sqlx::query("DELETE FROM attachments WHERE email_id = ?1")
            .bind(email_id)
            .execute(&mut *tx)
            .await
            .context("clearing attachments")?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO attachments (email_id, filename, content_type, size, file_path)
                VALUES (?1, ?2, ?3, ?4, ?5);
                "#,
            )
            .bind(email_id)
            .bind(&row.filename)
            .bind(&row.content_type)
            .bind(row.size)
            .bind(row.file_path.to_string_lossy().into_owned())
            .execute(&mut *tx)
            .await
            .context("inserting attachment")?;
        }
        tx.commit().await.context("committing attachment tx")?;
        Ok(())
    }

    pub async fn load_attachments(&self, email_id: i64) -> Result<Vec<AttachmentRow>> {
        let rows = sqlx::query(
            "SELECT filename, content_type, size, file_path FROM attachments WHERE email_id = ?1 ORDER BY id",
        )
        .bind(email_id)
        .fetch_all(&self.pool)
        .await
        .context("loading attachments")?;
        Ok(rows
            .into_iter()
            .map(|r| AttachmentRow {
                filename: r.get(0),
                content_type: r.get::<Option<String>, _>(1).unwrap_or_default(),
                size: r.get::<Option<i64>, _>(2).unwrap_or_default(),
                file_path: PathBuf::from(r.get::<String, _>(3)),
            })
            .collect())
    }

    /// Write every email row to `csv_path`, oldest insert first. Returns the row count.
    pub async fn export_csv(&self, csv_path: &Path) -> Result<usize> {
        const COLUMNS: [&str; 13] = [
            "gmail_id",
            "thread_id",
            "message_id",
            "subject",
            "from_addr",
            "to_addrs",
            "cc_addrs",
            "bcc_addrs",
            "date",
            "snippet",
            "text_body",
            "html_body",
            "raw_eml_path",
        ];

        // created_at is always an ISO timestamp; `date` may hold a verbatim
        // RFC 2822 string that does not sort chronologically.
        let sql = format!(
            "SELECT {} FROM emails ORDER BY created_at, id",
            COLUMNS.join(", ")
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("reading emails for export")?;

        if let Some(parent) = csv_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut writer = csv::Writer::from_path(csv_path)
            .with_context(|| format!("opening {}", csv_path.display()))?;
        writer.write_record(COLUMNS).context("writing csv header")?;
        for row in &rows {
            let values: Vec<String> = (0..COLUMNS.len())
                .map(|i| row.get::<Option<String>, _>(i).unwrap_or_default())
                .collect();
            writer.write_record(&values).context("writing csv row")?;
        }
        writer.flush().context("flushing csv")?;
        Ok(rows.len())
    }
}
