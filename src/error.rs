use thiserror::Error;

use crate::account::auth::AuthError;
use crate::backend::BackendError;
use crate::billing::BillingError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Store backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

pub type AppResult<T> = Result<T, AppError>;
