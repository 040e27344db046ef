// Error types shared by the background tasks.

use thiserror::Error;

use crate::discord::MessengerError;
use crate::http::FetchError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Messenger(#[from] MessengerError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}
