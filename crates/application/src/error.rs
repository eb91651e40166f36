use domain::{ConnectionId, DomainError};
use thiserror::Error;

use crate::history::StoreError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("session not found: {0}")]
    SessionNotFound(ConnectionId),
    #[error("session {0} is closed")]
    SessionClosed(ConnectionId),
    #[error("session {0} has not joined yet")]
    NotIdentified(ConnectionId),
    #[error("gateway hub is not running")]
    HubUnavailable,
}
