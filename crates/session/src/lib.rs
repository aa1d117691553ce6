//! Emergency SOS session.
//!
//! Wires the motion detector, location provider, contact registry and
//! activation engine to persisted preferences, and turns user actions into
//! notifications.

mod config;
mod session;

pub use config::SosConfig;
pub use session::{SessionDeps, SosSession};

use sos_contacts::ContactError;
use sos_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Contact(#[from] ContactError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
