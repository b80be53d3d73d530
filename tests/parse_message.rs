mod common;

use labelmail::parse::parse_message;

#[test]
fn rich_message_yields_fields_bodies_and_attachments() {
    let parsed = parse_message(&common::rich_message());

    assert_eq!(parsed.subject.as_deref(), Some("Hello World"));
    assert_eq!(parsed.message_id.as_deref(), Some("<abc@example.com>"));
    assert!(parsed.from.as_deref().unwrap().contains("<alice@example.com>"));
    assert_eq!(parsed.to.as_deref(), Some("bob@example.com, carol@example.com"));
    assert_eq!(parsed.cc.as_deref(), Some("dave@example.com"));
    assert_eq!(parsed.bcc, None);
    assert_eq!(parsed.date.as_deref(), Some("2003/07/01 10:52"));

    assert_eq!(parsed.text_body.trim(), "Plain body");
    assert!(parsed.html_body.contains("<p>HTML body</p>"));

    let names: Vec<&str> = parsed.attachments.iter().map(|a| a.filename.as_str()).collect();
    assert_eq!(names, vec!["report.pdf", "attachment-2.bin"]);
    assert_eq!(parsed.attachments[0].data, b"Hello".to_vec());
    assert_eq!(parsed.attachments[0].content_type, "application/pdf");
    assert_eq!(parsed.attachments[1].data, vec![0u8, 1, 2]);
}

#[test]
fn header_bag_preserves_order_and_repeats() {
    let parsed = parse_message(&common::rich_message());
    assert!(parsed.headers.to_json().starts_with(r#"[["From","#));
    assert_eq!(
        parsed.headers.get_all("Received").collect::<Vec<_>>(),
        vec!["from a", "from b"]
    );
}

#[test]
fn plain_message_has_empty_html_and_no_attachments() {
    let parsed = parse_message(&common::plain_message());
    assert_eq!(parsed.text_body.trim(), "Noon works.");
    assert_eq!(parsed.html_body, "");
    assert!(parsed.attachments.is_empty());
    assert_eq!(parsed.date.as_deref(), Some("2025/02/03 08:05"));
}

#[test]
fn single_part_attachment_without_filename_gets_placeholder() {
    let raw = concat!(
        "Subject: scan\r\n",
        "Content-Type: image/png\r\n",
        "Content-Disposition: attachment\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "iVBORw0KGgo=\r\n",
    );
    let parsed = parse_message(raw.as_bytes());
    assert_eq!(parsed.attachments.len(), 1);
    assert_eq!(parsed.attachments[0].filename, "attachment-1.png");
    assert_eq!(parsed.text_body, "");
}

#[test]
fn outlook_metadata_parts_are_skipped() {
    let raw = concat!(
        "Subject: outlook\r\n",
        "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
        "\r\n",
        "--b\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "hi\r\n",
        "--b\r\n",
        "Content-Type: application/octet-stream; name=\"EML*OECUSTOMPROPERTY.dat\"\r\n",
        "Content-Disposition: attachment; filename=\"EML*OECUSTOMPROPERTY.dat\"\r\n",
        "\r\n",
        "junk\r\n",
        "--b--\r\n",
    );
    let parsed = parse_message(raw.as_bytes());
    assert!(parsed.attachments.is_empty());
    assert_eq!(parsed.text_body.trim(), "hi");
}

#[test]
fn inline_part_with_filename_counts_as_attachment() {
    let raw = concat!(
        "Subject: inline\r\n",
        "Content-Type: multipart/related; boundary=\"b\"\r\n",
        "\r\n",
        "--b\r\n",
        "Content-Type: text/html\r\n",
        "\r\n",
        "<img src=\"cid:logo\">\r\n",
        "--b\r\n",
        "Content-Type: image/gif\r\n",
        "Content-Disposition: inline; filename=\"logo.gif\"\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "R0lGODlh\r\n",
        "--b--\r\n",
    );
    let parsed = parse_message(raw.as_bytes());
    assert_eq!(parsed.attachments.len(), 1);
    assert_eq!(parsed.attachments[0].filename, "logo.gif");
    assert!(parsed.html_body.contains("cid:logo"));
    assert_eq!(parsed.text_body, "");
}

#[test]
fn truncated_message_is_best_effort() {
    let raw = concat!(
        "Subject: partial\r\n",
        "Content-Type: multipart/mixed; boundary=\"x\"\r\n",
        "\r\n",
        "--x\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "cut off mid",
    );
    let parsed = parse_message(raw.as_bytes());
    assert_eq!(parsed.subject.as_deref(), Some("partial"));
}

#[test]
fn empty_input_does_not_panic() {
    let parsed = parse_message(b"");
    assert!(parsed.subject.is_none());
    assert!(parsed.attachments.is_empty());
}
