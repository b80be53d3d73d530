use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Labels not found: {}. Run with --list-labels to see the exact names.", .0.join(", "))]
    LabelNotFound(Vec<String>),
    #[error("Network error: {0}")]
    Network(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    /// Errors that stop a run before any message is touched.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            AppError::Config(_) | AppError::Auth(_) | AppError::LabelNotFound(_)
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}
