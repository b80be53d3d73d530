mod db;
pub mod files;

pub use db::{AttachmentRow, Database, StoredEmail};
