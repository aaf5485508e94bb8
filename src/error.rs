use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    InitiationError(String),
    #[error("Payment status check failed: {0}")]
    TransientPollError(String),
    #[error("Mobile-money payment was cancelled or timed out. Please try again.")]
    UserCancelled,
    #[error(
        "The payment request timed out. Please check your mobile-money account and try again if necessary."
    )]
    TimedOut,
    #[error(
        "Payment {reference} was received but could not be recorded against your loan ({reason}). Please contact support quoting this reference."
    )]
    RecordingFailed { reference: String, reason: String },
    #[error("Repayment flow stopped before completing: {0}")]
    FlowAborted(String),
    #[error("Invalid payment session transition: {0}")]
    InvalidTransition(String),
    #[error("Your session has expired. Please log in again.")]
    Unauthorized,
    #[error("Session error: {0}")]
    SessionError(String),
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
