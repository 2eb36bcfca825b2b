//! Error taxonomy for the proxy core

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// An entry with this identity is already in the tab list.
    #[error("tab list already contains an entry for {0}")]
    DuplicateEntry(Uuid),

    /// The entry was built by a different tab list.
    #[error("entry {0} was not created by this tab list")]
    ForeignEntry(Uuid),

    /// A backend sent an add without the profile name or properties.
    #[error("backend sent an incomplete add for {0}")]
    CorruptRemoteUpsert(Uuid),

    #[error("expected connection to be awaiting a status request")]
    UnexpectedRequest,

    #[error("tab list has been torn down")]
    StoreClosed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Why a single backend probe produced no usable reply. Never leaves the
/// status aggregator.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("could not connect to {0}")]
    Connect(String),

    #[error("probe timed out")]
    Timeout,

    #[error("unexpected reply from backend")]
    UnexpectedReply,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
