use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("{op}: {source}")]
    #[diagnostic(code(fleet::store::query))]
    Store {
        op: &'static str,
        #[source]
        source: tokio_rusqlite::Error,
    },

    #[error("{kind} {id} not found")]
    #[diagnostic(code(fleet::store::not_found))]
    NotFound { kind: &'static str, id: String },

    #[error("installation {0} carries merged group overrides and cannot be saved")]
    #[diagnostic(
        code(fleet::installation::merged_config),
        help("re-fetch the installation and apply changes to the stored record instead")
    )]
    GroupConfigNotStorable(String),

    #[error("{kind} cannot be triggered while the installation is '{from}'")]
    #[diagnostic(
        code(fleet::installation::invalid_transition),
        help("the installation must be stable or hibernating before an operation can start")
    )]
    InvalidStateTransition { kind: &'static str, from: String },

    #[error("unknown {kind} state '{value}'")]
    #[diagnostic(code(fleet::model::unknown_state))]
    UnknownState { kind: &'static str, value: String },

    #[error("database schema version {found} is newer than this binary supports ({supported})")]
    #[diagnostic(
        code(fleet::schema::too_new),
        help("upgrade the supervisor binary before pointing it at this database")
    )]
    SchemaVersionTooNew { found: i64, supported: i64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Wrap a backing-store failure with the name of the failing operation.
    pub(crate) fn store(op: &'static str) -> impl FnOnce(tokio_rusqlite::Error) -> Error {
        move |source| Error::Store { op, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
