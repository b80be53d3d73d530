use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailHeader, ParsedMail};
use tracing::{debug, warn};

use crate::types::{Attachment, HeaderBag, ParsedMessage};

/// Outlook/Exchange metadata parts that carry form properties, not files.
const OUTLOOK_JUNK_MARKERS: [&str; 2] = ["EML*OECUSTOMPROPERTY", "EML*OECUSTOMHTML"];

/// Decode a raw RFC 822 message. Never fails: undecodable input yields a
/// partial record with whatever could be recovered.
pub fn parse_message(raw: &[u8]) -> ParsedMessage {
    match mailparse::parse_mail(raw) {
        Ok(parsed) => from_parsed_mail(&parsed),
        Err(e) => {
            warn!(error = %e, "MIME parse failed; keeping headers only");
            match mailparse::parse_headers(raw) {
                Ok((headers, _)) => from_headers(&headers),
                Err(e) => {
                    warn!(error = %e, "Header parse failed; storing empty record");
                    ParsedMessage::default()
                }
            }
        }
    }
}

fn from_headers(headers: &[MailHeader]) -> ParsedMessage {
    let mut bag = HeaderBag::new();
    for h in headers {
        bag.push(h.get_key(), h.get_value());
    }
    let field = |name: &str| {
        bag.first(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    ParsedMessage {
        message_id: field("Message-ID"),
        subject: field("Subject"),
        from: field("From"),
        to: field("To"),
        cc: field("Cc"),
        bcc: field("Bcc"),
        date: field("Date").map(|d| normalize_date(&d)),
        text_body: String::new(),
        html_body: String::new(),
        headers: bag.clone(),
        attachments: Vec::new(),
    }
}

fn from_parsed_mail(parsed: &ParsedMail) -> ParsedMessage {
    let mut message = from_headers(&parsed.headers);
    let mut walker = PartWalker::default();
    walker.visit(parsed);
    message.text_body = walker.text.unwrap_or_default();
    message.html_body = walker.html.unwrap_or_default();
    message.attachments = walker.attachments;
    message
}

#[derive(Default)]
struct PartWalker {
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
}

impl PartWalker {
    fn visit(&mut self, part: &ParsedMail) {
        let mimetype = part.ctype.mimetype.to_ascii_lowercase();
        if !part.subparts.is_empty() || mimetype.starts_with("multipart/") {
            for sub in &part.subparts {
                self.visit(sub);
            }
            return;
        }

        let disposition = part.get_content_disposition();
        let filename = disposition
            .params
            .get("filename")
            .or_else(|| part.ctype.params.get("name"))
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());

        if let Some(name) = &filename {
            let upper = name.to_ascii_uppercase();
            if OUTLOOK_JUNK_MARKERS.iter().any(|m| upper.contains(m)) {
                debug!(filename = %name, "Skipping Outlook metadata part");
                return;
            }
        }

        let is_attachment =
            disposition.disposition == DispositionType::Attachment || filename.is_some();
        if is_attachment {
            self.push_attachment(part, &mimetype, filename);
            return;
        }

        match mimetype.as_str() {
            "text/plain" if self.text.is_none() => self.text = Some(body_text(part)),
            "text/html" if self.html.is_none() => self.html = Some(body_text(part)),
            _ => {}
        }
    }

    fn push_attachment(&mut self, part: &ParsedMail, mimetype: &str, filename: Option<String>) {
        let data = match part.get_body_raw() {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Skipping undecodable attachment");
                return;
            }
        };
        if data.is_empty() {
            debug!(filename = ?filename, "Skipping empty attachment");
            return;
        }
        let index = self.attachments.len() + 1;
        let filename = filename.unwrap_or_else(|| placeholder_name(index, mimetype));
        self.attachments.push(Attachment {
            filename,
            content_type: mimetype.to_string(),
            data,
        });
    }
}

fn body_text(part: &ParsedMail) -> String {
    part.get_body().unwrap_or_else(|_| {
        String::from_utf8_lossy(&part.get_body_raw().unwrap_or_default()).into_owned()
    })
}

/// Name for an attachment that declares none, e.g. `attachment-2.pdf`.
pub fn placeholder_name(index: usize, mimetype: &str) -> String {
    format!("attachment-{index}.{}", extension_for(mimetype))
}

fn extension_for(mimetype: &str) -> &'static str {
    match mimetype {
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "application/json" => "json",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "text/plain" => "txt",
        "text/html" => "html",
        "text/csv" => "csv",
        "text/calendar" => "ics",
        "message/rfc822" => "eml",
        _ => "bin",
    }
}

/// Render an RFC 2822 date as `yyyy/mm/dd hh:mm` in its own offset. Values
/// that cannot be parsed are returned unchanged.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    // Drop a trailing comment such as "(UTC)" or "(PDT)".
    let without_comment = match trimmed.rfind(" (") {
        Some(idx) if trimmed.ends_with(')') => &trimmed[..idx],
        _ => trimmed,
    };
    if let Ok(dt) = DateTime::parse_from_rfc2822(without_comment) {
        return dt.format("%Y/%m/%d %H:%M").to_string();
    }
    match mailparse::dateparse(trimmed)
        .ok()
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
    {
        Some(dt) => dt.format("%Y/%m/%d %H:%M").to_string(),
        None => raw.to_string(),
    }
}
