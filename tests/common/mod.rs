#![allow(dead_code)]

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_PREFIX: &str = "/gmail/v1/users/me";

pub fn api_base(server: &MockServer) -> String {
    format!("{}{}", server.uri(), API_PREFIX)
}

pub fn api_path(suffix: &str) -> String {
    format!("{API_PREFIX}{suffix}")
}

/// Multipart message: text + html alternatives, one named attachment and
/// one attachment without any filename.
pub fn rich_message() -> Vec<u8> {
    concat!(
        "From: \"Alice\" <alice@example.com>\r\n",
        "To: bob@example.com, carol@example.com\r\n",
        "Cc: dave@example.com\r\n",
        "Subject: =?UTF-8?B?SGVsbG8gV29ybGQ=?=\r\n",
        "Date: Tue, 1 Jul 2003 10:52:37 +0200\r\n",
        "Message-ID: <abc@example.com>\r\n",
        "Received: from a\r\n",
        "Received: from b\r\n",
        "MIME-Version: 1.0\r\n",
        "Content-Type: multipart/mixed; boundary=\"outer\"\r\n",
        "\r\n",
        "--outer\r\n",
        "Content-Type: multipart/alternative; boundary=\"inner\"\r\n",
        "\r\n",
        "--inner\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "\r\n",
        "Plain body\r\n",
        "--inner\r\n",
        "Content-Type: text/html; charset=utf-8\r\n",
        "\r\n",
        "<p>HTML body</p>\r\n",
        "--inner--\r\n",
        "--outer\r\n",
        "Content-Type: application/pdf; name=\"report.pdf\"\r\n",
        "Content-Disposition: attachment; filename=\"report.pdf\"\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "SGVsbG8=\r\n",
        "--outer\r\n",
        "Content-Type: application/octet-stream\r\n",
        "Content-Disposition: attachment\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "AAEC\r\n",
        "--outer--\r\n",
    )
    .as_bytes()
    .to_vec()
}

/// Single-part plain text message, no html, no attachments.
pub fn plain_message() -> Vec<u8> {
    concat!(
        "From: carol@example.com\r\n",
        "To: bob@example.com\r\n",
        "Subject: Lunch\r\n",
        "Date: Mon, 3 Feb 2025 08:05:00 +0000\r\n",
        "Message-ID: <lunch@example.com>\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "\r\n",
        "Noon works.\r\n",
    )
    .as_bytes()
    .to_vec()
}

pub fn raw_response(id: &str, label_ids: &[&str], raw: &[u8]) -> Value {
    json!({
        "id": id,
        "threadId": format!("thread-{id}"),
        "labelIds": label_ids,
        "snippet": format!("snippet of {id}"),
        "raw": URL_SAFE.encode(raw),
    })
}

pub async fn mount_labels(server: &MockServer, labels: &[(&str, &str)]) {
    let labels: Vec<Value> = labels
        .iter()
        .map(|(id, name)| json!({ "id": id, "name": name, "type": "user" }))
        .collect();
    Mock::given(method("GET"))
        .and(path(api_path("/labels")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "labels": labels })))
        .mount(server)
        .await;
}

pub async fn mount_raw(server: &MockServer, id: &str, label_ids: &[&str], raw: &[u8]) {
    Mock::given(method("GET"))
        .and(path(api_path(&format!("/messages/{id}"))))
        .and(query_param("format", "raw"))
        .respond_with(ResponseTemplate::new(200).set_body_json(raw_response(id, label_ids, raw)))
        .mount(server)
        .await;
}
