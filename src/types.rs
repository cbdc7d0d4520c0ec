use serde::{Deserialize, Serialize};

/// Request verb as seen by the embedding router. The mutating endpoints
/// answer anything but `Post` with 405.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Body of `POST /vote/{id}/sign`.
#[derive(Debug, Deserialize)]
pub struct SignRequest {
    /// Base64 of the blinded 256-byte integer chosen by the voter's client.
    pub blinded_message: String,
}

#[derive(Debug, Serialize)]
pub struct SignResponse {
    /// Base64 of the 256-byte blind signature.
    pub signature: String,
    /// Set to `"already_signed_retry"` when a genuine retry was replayed
    /// from the memoized signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Form fields of `POST /vote/{id}/submit`. The urlencoded decoding is the
/// router's job; `data` must reach this struct byte-for-byte as received.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitForm {
    pub data: String,
    pub token: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: String,
    pub message: String,
    pub bulletin_id: String,
    pub is_new: bool,
}

impl SubmitResponse {
    /// 201 for a fresh ballot, 200 for an idempotent retry.
    pub fn http_status(&self) -> u16 {
        if self.is_new { 201 } else { 200 }
    }
}

/// Verbatim PEM export of an election public key.
#[derive(Debug)]
pub struct PemExport {
    pub content_type: &'static str,
    pub body: String,
}

/// One urn entry as listed by `GET /data/ballots/{id}/`.
#[derive(Debug, Serialize)]
pub struct BallotView {
    pub token: String,
    pub result: serde_json::Value,
}

/// Entry of the open-elections listing.
#[derive(Debug, Serialize)]
pub struct ElectionSummary {
    pub id: String,
    pub name: String,
}
