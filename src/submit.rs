/*!  submit.rs — anonymous ballot submission
The ballot authorizes itself: the unblinded server signature over
`token:data` is verified arithmetically, then the exact canonical bytes are
appended to the urn. */

use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use num_bigint_dig::BigUint;
use rsa::RsaPublicKey;
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::database::{BallotRecord, Database};
use crate::election::Election;
use crate::error::ServiceError;
use crate::types::{SubmitForm, SubmitResponse};

/// Verify and store one ballot. Insertion is append-only and idempotent: a
/// byte-identical resubmission of an accepted ballot succeeds with
/// `is_new: false`, any divergence under the same token is rejected.
pub async fn submit_ballot(
    db: &Database,
    election: &Election,
    public_key: &RsaPublicKey,
    form: &SubmitForm,
) -> Result<SubmitResponse, ServiceError> {
    let parsed: serde_json::Value = serde_json::from_str(&form.data)
        .map_err(|_| ServiceError::BadRequest("data is not valid JSON".to_string()))?;

    // The signature covers the bytes on the wire, not a re-serialization.
    let mut message = Vec::with_capacity(form.token.len() + 1 + form.data.len());
    message.extend_from_slice(form.token.as_bytes());
    message.push(b':');
    message.extend_from_slice(form.data.as_bytes());
    let digest = Sha256::digest(&message);
    let m = BigUint::from_bytes_be(digest.as_slice());

    let signature_bytes = general_purpose::STANDARD
        .decode(&form.signature)
        .map_err(|_| ServiceError::BadRequest("signature is not valid base64".to_string()))?;
    let signature = BigUint::from_bytes_be(&signature_bytes);

    // Arithmetic check, not length-based: any encoding that reduces to the
    // right integer passes.
    if signature.modpow(public_key.e(), public_key.n()) != m {
        log::warn!("Rejected ballot with an invalid signature");
        return Err(ServiceError::BadRequest(
            "invalid ballot signature".to_string(),
        ));
    }

    // Only the canonical form is storable; the urn digest depends on exact
    // bytes, so sorted keys and minimal separators are enforced on write.
    let canonical =
        serde_json::to_string(&parsed).map_err(|e| ServiceError::Internal(e.into()))?;
    if canonical != form.data {
        log::warn!("Rejected ballot whose data is not in canonical form");
        return Err(ServiceError::BadRequest(
            "data is not canonical JSON".to_string(),
        ));
    }

    let ballot = BallotRecord {
        id: Uuid::new_v4().to_string(),
        election_id: election.id.to_string(),
        token: form.token.clone(),
        result: form.data.clone(),
        server_signature: form.signature.clone(),
        created_at: Utc::now().timestamp(),
    };
    if db.insert_ballot(&ballot).await? {
        log::info!("Ballot stored for election {}", election.id);
        return Ok(SubmitResponse {
            status: "success".to_string(),
            message: "ballot recorded".to_string(),
            bulletin_id: form.token.clone(),
            is_new: true,
        });
    }

    // The token is already in the urn: an identical ballot is a client retry
    // of a write that succeeded, anything else is a client bug or tampering.
    let existing = db
        .get_ballot(&election.id.to_string(), &form.token)
        .await?
        .ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!("ballot vanished after a conflicting insert"))
        })?;
    if existing.result == form.data && existing.server_signature == form.signature {
        log::info!("Accepted idempotent ballot resubmission for election {}", election.id);
        return Ok(SubmitResponse {
            status: "success".to_string(),
            message: "ballot already recorded".to_string(),
            bulletin_id: form.token.clone(),
            is_new: false,
        });
    }
    log::warn!("Rejected conflicting ballot under an existing token");
    Err(ServiceError::BadRequest(
        "a different ballot with this token already exists".to_string(),
    ))
}
