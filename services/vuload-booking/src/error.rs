/// Errors of the booking load client
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("users file {path} has no rows")]
    NoUsers { path: String },

    #[error("{0}")]
    Load(#[from] vuload_core::LoadError),

    #[error("{0}")]
    Http(#[from] vuload_http::ClientError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, BookingError>;
