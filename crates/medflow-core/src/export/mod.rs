//! Document sinks: paginated PDF and Markdown.

mod markdown;
mod pdf;

pub use pdf::*;

use thiserror::Error;

/// Errors raised while writing a rendered document.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF error: {0}")]
    Pdf(String),
}

pub type ExportResult<T> = Result<T, ExportError>;
