use crate::table::TableError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to encode fitted model")]
    Encode(#[source] Box<bincode::error::EncodeError>),

    #[error("Failed to decode fitted model")]
    Decode(#[source] Box<bincode::error::DecodeError>),

    #[error("Fitted model is not valid base64")]
    Base64(#[from] base64::DecodeError),

    #[error("No average temperature for calendar month {0}")]
    MissingAverage(u32),

    #[error(transparent)]
    Table(#[from] TableError),
}
