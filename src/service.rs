/*!  service.rs — the endpoint facade
Typed handlers for every public endpoint. The embedding HTTP router decodes
requests into these calls and maps `ServiceError` onto status codes; the
authenticated voter identity is threaded in explicitly, never read from
ambient request state. */

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit;
use crate::database::Database;
use crate::election::Election;
use crate::error::ServiceError;
use crate::keys::KeyStore;
use crate::signer;
use crate::submit;
use crate::tally::{self, TallyOutcome};
use crate::types::{
    BallotView, ElectionSummary, Method, PemExport, SignRequest, SignResponse, SubmitForm,
    SubmitResponse,
};

pub const PEM_MIME: &str = "application/x-pem-file";

pub struct VotingService {
    db: Arc<Database>,
    keys: KeyStore,
}

impl VotingService {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            keys: KeyStore::new(),
        }
    }

    /// Store handle for the administrative collaborators that create
    /// elections outside this core.
    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn load_election(&self, election_id: &str) -> Result<Election, ServiceError> {
        let id = Uuid::parse_str(election_id)
            .map_err(|_| ServiceError::NotFound("unknown election".to_string()))?;
        self.db
            .load_election(&id.to_string())
            .await?
            .ok_or_else(|| ServiceError::NotFound("unknown election".to_string()))
    }

    /// GET /vote/{id}/public-key
    ///
    /// Exports the stored PEM verbatim, generating the keypair if this is
    /// the first key-needing access to the election.
    pub async fn public_key(&self, election_id: &str) -> Result<PemExport, ServiceError> {
        let election = self.load_election(election_id).await?;
        if let Some(pem) = &election.public_key_pem {
            return Ok(PemExport {
                content_type: PEM_MIME,
                body: pem.clone(),
            });
        }

        self.keys.get_keys(&self.db, &election).await?;
        let record = self
            .db
            .get_election_record(&election.id.to_string())
            .await?
            .ok_or_else(|| ServiceError::NotFound("unknown election".to_string()))?;
        let body = record
            .public_key_pem
            .ok_or_else(|| anyhow::anyhow!("public key missing after generation"))?;
        Ok(PemExport {
            content_type: PEM_MIME,
            body,
        })
    }

    /// POST /vote/{id}/sign
    ///
    /// `voter` is the authenticated identity supplied by the session layer;
    /// `body` is the raw JSON request body.
    pub async fn sign(
        &self,
        method: Method,
        voter: Option<&str>,
        election_id: &str,
        body: &str,
    ) -> Result<SignResponse, ServiceError> {
        if method != Method::Post {
            return Err(ServiceError::MethodNotAllowed);
        }
        let election = self.load_election(election_id).await?;
        let request: SignRequest = serde_json::from_str(body).map_err(|_| {
            ServiceError::BadRequest("expected a JSON body with blinded_message".to_string())
        })?;

        election
            .can_vote(voter, Utc::now().timestamp())
            .map_err(|refusal| ServiceError::Forbidden(refusal.message().to_string()))?;
        let voter_id = voter.ok_or_else(|| {
            ServiceError::Forbidden("you are not allowed to vote in this election".to_string())
        })?;

        let (_, private_key) = self.keys.get_keys(&self.db, &election).await?;
        signer::sign_blinded_message(&self.db, &election, &private_key, voter_id, &request).await
    }

    /// POST /vote/{id}/submit
    ///
    /// Deliberately unauthenticated; the ballot's signature is its only
    /// authorization. No window check either: a ballot blind-signed during
    /// the window stays redeemable afterwards, so submission time cannot be
    /// correlated with the signing session.
    pub async fn submit(
        &self,
        method: Method,
        election_id: &str,
        form: &SubmitForm,
    ) -> Result<SubmitResponse, ServiceError> {
        if method != Method::Post {
            return Err(ServiceError::MethodNotAllowed);
        }
        let election = self.load_election(election_id).await?;
        let (public_key, _) = self.keys.get_keys(&self.db, &election).await?;
        submit::submit_ballot(&self.db, &election, &public_key, form).await
    }

    /// GET /vote/{id}/hash
    pub async fn urn_hash(&self, election_id: &str) -> Result<String, ServiceError> {
        let election = self.load_election(election_id).await?;
        Ok(audit::urn_digest(&self.db, &election.id.to_string()).await?)
    }

    /// GET /vote/{id}/results
    pub async fn results(&self, election_id: &str) -> Result<TallyOutcome, ServiceError> {
        let election = self.load_election(election_id).await?;
        let ballots = self.db.list_ballots(&election.id.to_string()).await?;
        Ok(tally::tally(&election, &ballots))
    }

    /// GET /data/ballots/{id}/
    pub async fn list_ballots(&self, election_id: &str) -> Result<Vec<BallotView>, ServiceError> {
        let election = self.load_election(election_id).await?;
        Ok(audit::list_ballots(&self.db, &election.id.to_string()).await?)
    }

    /// GET /data/ballots/{id}/{token}
    ///
    /// Returns the stored `result` bytes verbatim; the router serves them as
    /// `application/json`.
    pub async fn ballot(&self, election_id: &str, token: &str) -> Result<String, ServiceError> {
        let election = self.load_election(election_id).await?;
        audit::ballot_result(&self.db, &election.id.to_string(), token)
            .await?
            .ok_or_else(|| ServiceError::NotFound("unknown ballot".to_string()))
    }

    /// Ballot form metadata for the client renderer. Requires the same
    /// eligibility as signing so the form never leaks to outsiders.
    pub async fn ballot_form(
        &self,
        voter: Option<&str>,
        election_id: &str,
    ) -> Result<Value, ServiceError> {
        let election = self.load_election(election_id).await?;
        election
            .can_vote(voter, Utc::now().timestamp())
            .map_err(|refusal| ServiceError::Forbidden(refusal.message().to_string()))?;
        Ok(election.form_schema())
    }

    /// Keyless metadata for one election.
    pub async fn election_info(&self, election_id: &str) -> Result<Value, ServiceError> {
        let election = self.load_election(election_id).await?;
        Ok(election.summary_json())
    }

    /// Elections whose voting window is currently open, ordered by name.
    pub async fn open_elections(&self) -> Result<Vec<ElectionSummary>, ServiceError> {
        let rows = self.db.list_open_elections(Utc::now().timestamp()).await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| ElectionSummary { id, name })
            .collect())
    }
}
