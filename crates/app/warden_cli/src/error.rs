use thiserror::Error;
use warden_core::auth::SigningKeyError;
use warden_core::crypto::CodecError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Custom(String),

    #[error("IO::{:?}: {}", .0, .0)]
    Io(#[from] std::io::Error),

    #[error("FlexiLogger::{:?}: {}", .0, .0)]
    FlexiLogger(#[from] flexi_logger::FlexiLoggerError),

    #[error("Codec: {}", .0)]
    Codec(#[from] CodecError),

    #[error("Signing secret rejected: {}", .0)]
    SigningKey(#[from] SigningKeyError),
}
