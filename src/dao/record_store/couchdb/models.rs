//! Document shapes exchanged with CouchDB.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao::{
    models::{GameRecord, Guess, NewGameRecord, RecordId, Role, Warnings},
    record_store::couchdb::error::CouchDaoError,
};

/// Prefix of every game document `_id`.
pub const GAME_PREFIX: &str = "game::";

/// A game record as stored in CouchDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRecordDocument {
    /// `game::<record id>`.
    #[serde(rename = "_id")]
    pub id: String,
    /// Current revision; absent on insert.
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: RecordBody,
}

/// Record fields as persisted; the identifier lives in the document `_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordBody {
    pub code: String,
    pub player1: String,
    #[serde(default)]
    pub player2: Option<String>,
    #[serde(default)]
    pub secret_player1: Option<String>,
    #[serde(default)]
    pub secret_player2: Option<String>,
    pub current_turn: Role,
    #[serde(default)]
    pub guesses: Vec<Guess>,
    #[serde(default)]
    pub warnings: Warnings,
    #[serde(default)]
    pub winner: Option<String>,
}

impl CouchRecordDocument {
    /// Document for a record about to be inserted under `id`.
    pub fn from_new(id: &RecordId, record: NewGameRecord) -> Self {
        Self::from_record(record.into_record(id.clone()), None)
    }

    /// Document replacing revision `rev` with `record`.
    pub fn from_record(record: GameRecord, rev: Option<String>) -> Self {
        Self {
            id: game_doc_id(&record.id),
            rev,
            body: RecordBody {
                code: record.code,
                player1: record.player1,
                player2: record.player2,
                secret_player1: record.secret_player1,
                secret_player2: record.secret_player2,
                current_turn: record.current_turn,
                guesses: record.guesses,
                warnings: record.warnings,
                winner: record.winner,
            },
        }
    }

    /// Split the document into its record and revision.
    pub fn into_record(self) -> Result<(GameRecord, Option<String>), CouchDaoError> {
        let id = extract_record_id(&self.id)?;
        let body = self.body;
        let record = GameRecord {
            id,
            code: body.code,
            player1: body.player1,
            player2: body.player2,
            secret_player1: body.secret_player1,
            secret_player2: body.secret_player2,
            current_turn: body.current_turn,
            guesses: body.guesses,
            warnings: body.warnings,
            winner: body.winner,
        };
        Ok((record, self.rev))
    }
}

/// Body returned by document writes.
#[derive(Debug, Deserialize)]
pub struct WriteResponse {
    pub rev: String,
}

/// Body of a `_find` query.
#[derive(Debug, Deserialize)]
pub struct FindResponse {
    pub docs: Vec<Value>,
}

/// Body of a `_changes` long-poll.
#[derive(Debug, Deserialize)]
pub struct ChangesResponse {
    pub results: Vec<ChangeRow>,
    /// Sequence to resume from.
    pub last_seq: Value,
}

/// One entry of the changes feed.
#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    /// Document `_id` the change applies to.
    pub id: String,
    /// The document was deleted.
    #[serde(default)]
    pub deleted: bool,
    /// Document body when requested with `include_docs`.
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Document `_id` for a record identifier.
pub fn game_doc_id(id: &str) -> String {
    format!("{GAME_PREFIX}{id}")
}

/// Inverse of [`game_doc_id`].
pub fn extract_record_id(doc_id: &str) -> Result<RecordId, CouchDaoError> {
    doc_id
        .strip_prefix(GAME_PREFIX)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_string(),
            kind: "missing game prefix",
        })
}
