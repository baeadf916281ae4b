//! Error types shared by the CouchDB record store.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Convenient result alias returning [`CouchDaoError`] failures.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures that can occur while interacting with CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Required environment variable is missing.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB rejected a GET against the target database.
    #[error("failed to query CouchDB database `{database}`")]
    DatabaseQuery {
        /// Database name.
        database: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB rejected a database creation request.
    #[error("failed to create CouchDB database `{database}`")]
    DatabaseCreate {
        /// Database name.
        database: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB returned an unexpected status code for a database operation.
    #[error("unexpected CouchDB database response status {status} for `{database}`")]
    DatabaseStatus {
        /// Database name.
        database: String,
        /// HTTP status returned.
        status: StatusCode,
    },
    /// A request to a document endpoint could not be sent.
    #[error("failed to send CouchDB request to `{path}`")]
    RequestSend {
        /// Request path.
        path: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB returned an unexpected status code for a document endpoint.
    #[error("unexpected CouchDB response status {status} for `{path}`")]
    RequestStatus {
        /// Request path.
        path: String,
        /// HTTP status returned.
        status: StatusCode,
    },
    /// Response payload could not be parsed into JSON.
    #[error("failed to decode CouchDB response for `{path}`")]
    DecodeResponse {
        /// Request path.
        path: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },
    /// Decoding a JSON value into the expected model failed.
    #[error("failed to deserialize CouchDB value for `{path}`")]
    DeserializeValue {
        /// Request path.
        path: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// The target document does not exist (or was deleted).
    #[error("CouchDB document `{doc_id}` not found")]
    MissingDocument {
        /// Document `_id`.
        doc_id: String,
    },
    /// The document kept changing under us while merging an update.
    #[error("CouchDB document `{doc_id}` still conflicting after {attempts} attempts")]
    RevisionConflict {
        /// Document `_id`.
        doc_id: String,
        /// Merge attempts made.
        attempts: u32,
    },
    /// Another record already claimed the invite code.
    #[error("invite code `{code}` already in use")]
    DuplicateCode {
        /// The taken code.
        code: String,
    },
    /// Failed to parse a document ID back into a record identifier.
    #[error("invalid document ID `{doc_id}`: {kind}")]
    InvalidDocId {
        /// Offending document `_id`.
        doc_id: String,
        /// What is wrong with it.
        kind: &'static str,
    },
}

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        match err {
            CouchDaoError::MissingDocument { doc_id } => StorageError::not_found(doc_id),
            CouchDaoError::DuplicateCode { code } => StorageError::Conflict {
                message: format!("code `{code}` already in use"),
            },
            CouchDaoError::RevisionConflict { doc_id, attempts } => StorageError::Conflict {
                message: format!("document `{doc_id}` conflicted {attempts} times"),
            },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
