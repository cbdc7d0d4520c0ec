use anyhow::Result;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use std::{fs, path::Path};

use crate::election::{Election, ElectionKind};

/// Database connection pool
pub struct Database {
    pool: Pool<Sqlite>,
}

/// Election record for database
#[derive(Debug, Clone)]
pub struct ElectionRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: String,
    pub start_time: i64,
    pub end_time: i64,
    pub public_key_pem: Option<String>,
    pub private_key_pem: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Per (voter, election) signing state
#[derive(Debug, Clone)]
pub struct VoterStatusRecord {
    pub election_id: String,
    pub voter_id: String,
    pub has_signed: bool,
    pub blinded_message_hash: Option<String>,
    pub generated_signature: Option<String>,
}

/// One accepted ballot. `result` holds the exact canonical bytes received.
#[derive(Debug, Clone)]
pub struct BallotRecord {
    pub id: String,
    pub election_id: String,
    pub token: String,
    pub result: String,
    pub server_signature: String,
    pub created_at: i64,
}

/// Candidate record for person elections
#[derive(Debug, Clone)]
pub struct CandidateRecord {
    pub election_id: String,
    pub candidate_id: i64,
    pub name: String,
}

/// Proposition record for choice elections
#[derive(Debug, Clone)]
pub struct PropositionRecord {
    pub election_id: String,
    pub proposition_id: i64,
    pub text: String,
}

impl Database {
    /// Initialize database connection and create tables
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        if !db_path.exists() {
            log::info!("Creating new database at: {}", db_path.display());
            fs::File::create(db_path)?;
        }

        let db_url = format!("sqlite://{}", db_path.display());
        let pool = SqlitePool::connect(&db_url).await?;

        let db = Database { pool };
        db.create_tables().await?;

        Ok(db)
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Create database tables if they don't exist
    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS elections (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                kind TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                public_key_pem TEXT,
                private_key_pem TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS election_voters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                election_id TEXT NOT NULL,
                voter_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (election_id) REFERENCES elections(id),
                UNIQUE(election_id, voter_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candidates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                election_id TEXT NOT NULL,
                candidate_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                FOREIGN KEY (election_id) REFERENCES elections(id),
                UNIQUE(election_id, candidate_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS propositions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                election_id TEXT NOT NULL,
                proposition_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                FOREIGN KEY (election_id) REFERENCES elections(id),
                UNIQUE(election_id, proposition_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // One row per (voter, election); the unique index is what serializes
        // concurrent signing attempts.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS voter_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                election_id TEXT NOT NULL,
                voter_id TEXT NOT NULL,
                has_signed INTEGER NOT NULL DEFAULT 0,
                blinded_message_hash TEXT,
                generated_signature TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (election_id) REFERENCES elections(id),
                UNIQUE(election_id, voter_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // The urn. No column references a voter identity.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ballots (
                id TEXT PRIMARY KEY,
                election_id TEXT NOT NULL,
                token TEXT NOT NULL,
                result TEXT NOT NULL,
                server_signature TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (election_id) REFERENCES elections(id),
                UNIQUE(election_id, token)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        log::info!("Database tables created successfully");
        Ok(())
    }

    /// Insert a new election together with its voters and its candidates or
    /// propositions. Administrative creation happens outside the core; this
    /// is the interface it goes through.
    pub async fn insert_election(&self, election: &Election) -> Result<()> {
        let now = Utc::now().timestamp();
        let id = election.id.to_string();

        sqlx::query(
            r#"
            INSERT INTO elections
            (id, name, description, kind, start_time, end_time, public_key_pem, private_key_pem, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&election.name)
        .bind(&election.description)
        .bind(election.kind.tag())
        .bind(election.start_time)
        .bind(election.end_time)
        .bind(&election.public_key_pem)
        .bind(&election.private_key_pem)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        for voter in &election.allowed_voters {
            sqlx::query(
                r#"
                INSERT INTO election_voters (election_id, voter_id, created_at)
                VALUES (?, ?, ?)
                ON CONFLICT(election_id, voter_id) DO NOTHING
                "#,
            )
            .bind(&id)
            .bind(voter)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }

        match &election.kind {
            ElectionKind::Choice { propositions } => {
                for p in propositions {
                    sqlx::query(
                        "INSERT INTO propositions (election_id, proposition_id, text) VALUES (?, ?, ?)",
                    )
                    .bind(&id)
                    .bind(p.id)
                    .bind(&p.text)
                    .execute(&self.pool)
                    .await?;
                }
            }
            ElectionKind::Person { candidates } => {
                for c in candidates {
                    sqlx::query(
                        "INSERT INTO candidates (election_id, candidate_id, name) VALUES (?, ?, ?)",
                    )
                    .bind(&id)
                    .bind(c.id)
                    .bind(&c.name)
                    .execute(&self.pool)
                    .await?;
                }
            }
        }

        log::info!("Inserted new election {} into database", id);
        Ok(())
    }

    pub async fn get_election_record(&self, election_id: &str) -> Result<Option<ElectionRecord>> {
        let row = sqlx::query("SELECT * FROM elections WHERE id = ?")
            .bind(election_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| ElectionRecord {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            kind: row.get("kind"),
            start_time: row.get("start_time"),
            end_time: row.get("end_time"),
            public_key_pem: row.get("public_key_pem"),
            private_key_pem: row.get("private_key_pem"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    /// Load one election with its voters and candidates or propositions.
    pub async fn load_election(&self, election_id: &str) -> Result<Option<Election>> {
        let Some(record) = self.get_election_record(election_id).await? else {
            return Ok(None);
        };
        let voters = self.load_election_voters(election_id).await?;
        let candidates = self.get_candidates(election_id).await?;
        let propositions = self.get_propositions(election_id).await?;
        Election::from_database(record, voters, candidates, propositions).map(Some)
    }

    /// Load authorized voters for an election
    pub async fn load_election_voters(&self, election_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT voter_id FROM election_voters WHERE election_id = ?")
            .bind(election_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|row| row.get("voter_id")).collect())
    }

    /// Get candidates for an election
    pub async fn get_candidates(&self, election_id: &str) -> Result<Vec<CandidateRecord>> {
        let rows =
            sqlx::query("SELECT * FROM candidates WHERE election_id = ? ORDER BY candidate_id")
                .bind(election_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|row| CandidateRecord {
                election_id: row.get("election_id"),
                candidate_id: row.get("candidate_id"),
                name: row.get("name"),
            })
            .collect())
    }

    /// Get propositions for an election
    pub async fn get_propositions(&self, election_id: &str) -> Result<Vec<PropositionRecord>> {
        let rows =
            sqlx::query("SELECT * FROM propositions WHERE election_id = ? ORDER BY proposition_id")
                .bind(election_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|row| PropositionRecord {
                election_id: row.get("election_id"),
                proposition_id: row.get("proposition_id"),
                text: row.get("text"),
            })
            .collect())
    }

    /// Elections whose window contains `now`, ordered by name.
    pub async fn list_open_elections(&self, now: i64) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT id, name FROM elections WHERE start_time <= ? AND end_time >= ? ORDER BY name",
        )
        .bind(now)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("id"), row.get("name")))
            .collect())
    }

    /// Persist a freshly generated keypair, unless a concurrent writer beat
    /// us to it. Returns whether this call stored its keys.
    pub async fn set_election_keys_if_absent(
        &self,
        election_id: &str,
        public_key_pem: &str,
        private_key_pem: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE elections
            SET public_key_pem = ?, private_key_pem = ?, updated_at = ?
            WHERE id = ? AND public_key_pem IS NULL AND private_key_pem IS NULL
            "#,
        )
        .bind(public_key_pem)
        .bind(private_key_pem)
        .bind(Utc::now().timestamp())
        .bind(election_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Fetch the voter status row, creating an unsigned one on first contact.
    pub async fn get_or_create_voter_status(
        &self,
        election_id: &str,
        voter_id: &str,
    ) -> Result<VoterStatusRecord> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO voter_status (election_id, voter_id, has_signed, created_at, updated_at)
            VALUES (?, ?, 0, ?, ?)
            ON CONFLICT(election_id, voter_id) DO NOTHING
            "#,
        )
        .bind(election_id)
        .bind(voter_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row =
            sqlx::query("SELECT * FROM voter_status WHERE election_id = ? AND voter_id = ?")
                .bind(election_id)
                .bind(voter_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(VoterStatusRecord {
            election_id: row.get("election_id"),
            voter_id: row.get("voter_id"),
            has_signed: row.get::<i64, _>("has_signed") != 0,
            blinded_message_hash: row.get("blinded_message_hash"),
            generated_signature: row.get("generated_signature"),
        })
    }

    /// Memoize the signature and flip `has_signed`, but only if no concurrent
    /// request flipped it first. Returns whether this call won the race.
    pub async fn mark_signed(
        &self,
        election_id: &str,
        voter_id: &str,
        blinded_message_hash: &str,
        generated_signature: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE voter_status
            SET has_signed = 1, blinded_message_hash = ?, generated_signature = ?, updated_at = ?
            WHERE election_id = ? AND voter_id = ? AND has_signed = 0
            "#,
        )
        .bind(blinded_message_hash)
        .bind(generated_signature)
        .bind(Utc::now().timestamp())
        .bind(election_id)
        .bind(voter_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Append a ballot to the urn. Returns false when the `(election, token)`
    /// key already exists; the caller decides between retry and rejection.
    pub async fn insert_ballot(&self, ballot: &BallotRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO ballots (id, election_id, token, result, server_signature, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(election_id, token) DO NOTHING
            "#,
        )
        .bind(&ballot.id)
        .bind(&ballot.election_id)
        .bind(&ballot.token)
        .bind(&ballot.result)
        .bind(&ballot.server_signature)
        .bind(ballot.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_ballot(&self, election_id: &str, token: &str) -> Result<Option<BallotRecord>> {
        let row = sqlx::query("SELECT * FROM ballots WHERE election_id = ? AND token = ?")
            .bind(election_id)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Self::ballot_from_row))
    }

    /// All ballots of an election, token ascending.
    pub async fn list_ballots(&self, election_id: &str) -> Result<Vec<BallotRecord>> {
        let rows = sqlx::query("SELECT * FROM ballots WHERE election_id = ? ORDER BY token ASC")
            .bind(election_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Self::ballot_from_row).collect())
    }

    fn ballot_from_row(row: sqlx::sqlite::SqliteRow) -> BallotRecord {
        BallotRecord {
            id: row.get("id"),
            election_id: row.get("election_id"),
            token: row.get("token"),
            result: row.get("result"),
            server_signature: row.get("server_signature"),
            created_at: row.get("created_at"),
        }
    }
}
