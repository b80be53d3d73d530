use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reserved tracking label applied when `--mark-downloaded` is given without a name.
pub const DEFAULT_TRACKING_LABEL: &str = "00downloaded";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// Header section in wire order. Keys repeat (`Received`, `DKIM-Signature`...).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderBag(Vec<(String, String)>);

impl HeaderBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for `name`, compared case-insensitively.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "[]".into())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Fields decoded from a raw RFC 822 message. Absent values stay `None`/empty.
#[derive(Clone, Debug, Default)]
pub struct ParsedMessage {
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub date: Option<String>,
    pub text_body: String,
    pub html_body: String,
    pub headers: HeaderBag,
    pub attachments: Vec<Attachment>,
}

/// One row of the `emails` table, keyed by the Gmail message id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    pub gmail_id: String,
    pub thread_id: Option<String>,
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub date: Option<String>,
    pub snippet: Option<String>,
    pub text_body: String,
    pub html_body: String,
    pub headers: HeaderBag,
    pub raw_eml_path: PathBuf,
}

impl MessageRecord {
    pub fn from_parsed(
        gmail_id: &str,
        thread_id: Option<String>,
        snippet: Option<String>,
        parsed: &ParsedMessage,
        raw_eml_path: PathBuf,
    ) -> Self {
        Self {
            gmail_id: gmail_id.to_string(),
            thread_id,
            message_id: parsed.message_id.clone(),
            subject: parsed.subject.clone(),
            from: parsed.from.clone(),
            to: parsed.to.clone(),
            cc: parsed.cc.clone(),
            bcc: parsed.bcc.clone(),
            date: parsed.date.clone(),
            snippet,
            text_body: parsed.text_body.clone(),
            html_body: parsed.html_body.clone(),
            headers: parsed.headers.clone(),
            raw_eml_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_bag_keeps_order_and_duplicates() {
        let mut bag = HeaderBag::new();
        bag.push("Received", "from a");
        bag.push("Subject", "hi");
        bag.push("received", "from b");

        assert_eq!(bag.first("RECEIVED"), Some("from a"));
        assert_eq!(bag.get_all("Received").collect::<Vec<_>>(), vec!["from a", "from b"]);
        assert_eq!(
            bag.to_json(),
            r#"[["Received","from a"],["Subject","hi"],["received","from b"]]"#
        );
    }
}
