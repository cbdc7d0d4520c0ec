/*!  signer.rs — blind-signing endpoint logic
Issues at most one blind signature per voter per election, idempotently. */

use base64::{Engine as _, engine::general_purpose};
use num_bigint_dig::BigUint;
use rsa::RsaPrivateKey;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};

use crate::database::{Database, VoterStatusRecord};
use crate::election::Election;
use crate::error::ServiceError;
use crate::keys::SIGNATURE_LEN;
use crate::types::{SignRequest, SignResponse};
use crate::util::{sha256_hex, to_fixed_be_bytes};

/// Status value returned when a genuine retry was served from the memoized
/// signature.
pub const ALREADY_SIGNED_RETRY: &str = "already_signed_retry";

/// Sign the blinded message for an authenticated, eligible voter.
///
/// The signature is raw modular exponentiation over whatever integer the
/// voter blinded; the client is required to blind a full-domain SHA-256 hash
/// of `token:data`, which is the form the submission endpoint verifies. The
/// signature is memoized rather than recomputed on retry, so a retry carrying
/// a *different* blinded value can never extract a second signature.
pub async fn sign_blinded_message(
    db: &Database,
    election: &Election,
    private_key: &RsaPrivateKey,
    voter_id: &str,
    request: &SignRequest,
) -> Result<SignResponse, ServiceError> {
    let election_id = election.id.to_string();
    let incoming_hash = sha256_hex(request.blinded_message.as_bytes());

    let status = db.get_or_create_voter_status(&election_id, voter_id).await?;
    if status.has_signed {
        return replay_or_reject(&status, &incoming_hash);
    }

    let blinded = general_purpose::STANDARD
        .decode(&request.blinded_message)
        .map_err(|_| ServiceError::BadRequest("blinded_message is not valid base64".to_string()))?;
    let m = BigUint::from_bytes_be(&blinded);
    let signature = m.modpow(private_key.d(), private_key.n());
    let signature_b64 = general_purpose::STANDARD.encode(to_fixed_be_bytes(&signature, SIGNATURE_LEN));

    // Write before responding, guarded by the unique row: a lost connection
    // leaves the voter able to retry into the replay branch, and a concurrent
    // duplicate request falls through to the same rules.
    let won = db
        .mark_signed(&election_id, voter_id, &incoming_hash, &signature_b64)
        .await?;
    if !won {
        let status = db.get_or_create_voter_status(&election_id, voter_id).await?;
        return replay_or_reject(&status, &incoming_hash);
    }

    log::info!("Blind signature issued for election {election_id}");
    Ok(SignResponse {
        signature: signature_b64,
        status: None,
    })
}

/// A voter who already signed either retries the identical payload (replay
/// the memoized signature) or is after a second ballot (reject). This
/// rejection is the single-vote guarantee.
fn replay_or_reject(
    status: &VoterStatusRecord,
    incoming_hash: &str,
) -> Result<SignResponse, ServiceError> {
    if status.blinded_message_hash.as_deref() == Some(incoming_hash) {
        let signature = status.generated_signature.clone().ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!(
                "voter status is signed but carries no memoized signature"
            ))
        })?;
        log::info!("Replaying memoized signature for a retried sign request");
        return Ok(SignResponse {
            signature,
            status: Some(ALREADY_SIGNED_RETRY.to_string()),
        });
    }
    log::warn!("Refused second signature over a different blinded message");
    Err(ServiceError::Forbidden(
        "already obtained a signature for a different ballot".to_string(),
    ))
}
