//! On-disk layout under the emails directory:
//!
//! ```text
//! <emails-dir>/<label>/<gmail-id>.eml
//! <emails-dir>/<label>/attachments/<gmail-id>/<filename>
//! ```
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory for one label. Nested Gmail labels (`Work/Clients`) become
/// nested directories; `.`/`..` components are dropped.
pub fn label_dir(emails_dir: &Path, label_name: &str) -> PathBuf {
    let mut dir = emails_dir.to_path_buf();
    let mut pushed = false;
    for component in label_name.split('/').map(str::trim) {
        if component.is_empty() || component == "." || component == ".." {
            continue;
        }
        dir.push(sanitize_filename(component));
        pushed = true;
    }
    if !pushed {
        dir.push("_unlabeled");
    }
    dir
}

pub fn attachments_dir(label_dir: &Path, gmail_id: &str) -> PathBuf {
    label_dir.join("attachments").join(sanitize_filename(gmail_id))
}

pub fn save_eml(raw: &[u8], label_dir: &Path, gmail_id: &str) -> Result<PathBuf> {
    fs::create_dir_all(label_dir)
        .with_context(|| format!("creating {}", label_dir.display()))?;
    let path = label_dir.join(format!("{}.eml", sanitize_filename(gmail_id)));
    fs::write(&path, raw).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Remove a message's attachment directory so a re-run leaves no orphans.
pub fn clear_attachments_dir(label_dir: &Path, gmail_id: &str) -> Result<()> {
    let dir = attachments_dir(label_dir, gmail_id);
    if dir.exists() {
        fs::remove_dir_all(&dir).with_context(|| format!("removing {}", dir.display()))?;
    }
    Ok(())
}

/// Write one attachment; a taken name gets `_1`, `_2`... before the extension.
pub fn save_attachment(
    data: &[u8],
    label_dir: &Path,
    gmail_id: &str,
    filename: &str,
) -> Result<PathBuf> {
    let dir = attachments_dir(label_dir, gmail_id);
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let safe = sanitize_filename(filename);
    let mut path = dir.join(&safe);
    let (stem, ext) = split_extension(&safe);
    let mut counter = 1;
    while path.exists() {
        path = dir.join(format!("{stem}_{counter}{ext}"));
        counter += 1;
    }

    fs::write(&path, data).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Reduce an arbitrary declared filename to one safe path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}
