use rootcause::Report;
use thiserror::Error;

/// Errors produced while reading or writing MST streams.
#[derive(Error, Debug)]
pub enum MstError {
    #[error("truncated input at 0x{offset:X}: {detail}")]
    TruncatedInput { offset: usize, detail: String },
    #[error("I/O error: {0}")]
    Io(String),
}

impl MstError {
    /// Build a [`MstError::TruncatedInput`] from a winnow failure.
    ///
    /// `consumed` is how far into the stream the parser got before failing.
    pub fn truncated(
        consumed: usize,
        e: winnow::error::ErrMode<winnow::error::ContextError>,
    ) -> Self {
        MstError::TruncatedInput {
            offset: consumed,
            detail: format!("{e}"),
        }
    }
}

impl From<std::io::Error> for MstError {
    fn from(e: std::io::Error) -> Self {
        MstError::Io(e.to_string())
    }
}

pub type MstResult<T> = Result<T, Report<MstError>>;
