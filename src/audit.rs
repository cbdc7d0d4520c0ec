/*!  audit.rs — public auditing of the urn
Streaming content-addressed digest plus ballot listing and retrieval. */

use anyhow::{Context, Result};
use futures::TryStreamExt;
use sha2::{Digest, Sha256};
use sqlx::Row;

use crate::database::Database;
use crate::types::BallotView;

/// Hex SHA-256 of `token:result` entries ordered by token ascending and
/// joined by a newline. Streams the cursor so the urn never has to fit in
/// memory; the digest is a pure function of the set of ballots.
pub async fn urn_digest(db: &Database, election_id: &str) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut first = true;
    let mut rows =
        sqlx::query("SELECT token, result FROM ballots WHERE election_id = ? ORDER BY token ASC")
            .bind(election_id)
            .fetch(db.pool());

    while let Some(row) = rows.try_next().await? {
        if !first {
            hasher.update(b"\n");
        }
        first = false;
        let token: String = row.get("token");
        let result: String = row.get("result");
        hasher.update(token.as_bytes());
        hasher.update(b":");
        hasher.update(result.as_bytes());
    }

    Ok(hex::encode(hasher.finalize()))
}

/// All ballots of an election as (token, parsed result) pairs.
pub async fn list_ballots(db: &Database, election_id: &str) -> Result<Vec<BallotView>> {
    let ballots = db.list_ballots(election_id).await?;
    ballots
        .into_iter()
        .map(|ballot| {
            let result = serde_json::from_str(&ballot.result)
                .with_context(|| format!("stored ballot {} is not valid JSON", ballot.token))?;
            Ok(BallotView {
                token: ballot.token,
                result,
            })
        })
        .collect()
}

/// The stored `result` bytes of one ballot, verbatim.
pub async fn ballot_result(
    db: &Database,
    election_id: &str,
    token: &str,
) -> Result<Option<String>> {
    Ok(db
        .get_ballot(election_id, token)
        .await?
        .map(|ballot| ballot.result))
}
