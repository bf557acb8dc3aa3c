use thiserror::Error;

/// Malformed external input: webhook bodies, payment payloads, catalog codes.
/// Never retried; maps to a 400-class rejection at the HTTP boundary.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid payment payload: {0}")]
    InvalidPayload(String),

    #[error("unknown product code: {0}")]
    UnknownProduct(String),

    #[error("unknown catalog item: {0}")]
    UnknownItem(String),

    #[error("malformed webhook body: {0}")]
    MalformedBody(String),

    #[error("unexpected currency: {0}")]
    WrongCurrency(String),

    #[error("invalid webhook signature")]
    BadSignature,
}
