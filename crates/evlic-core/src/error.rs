use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Wire format errors
    #[error("Invalid TLV structure: {0}")]
    InvalidTlv(String),

    #[error("Invalid NDEF record: {0}")]
    InvalidNdef(String),

    #[error("Invalid text encoding: {0}")]
    InvalidEncoding(String),

    #[error("Payload too large: {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    // Card data errors
    #[error("Invalid UID: {0}")]
    InvalidUid(String),

    #[error("Invalid block length: expected {expected} bytes, got {actual}")]
    InvalidBlockLength { expected: usize, actual: usize },

    #[error("Block index {0} is outside the card layout")]
    BlockOutOfRange(u16),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
