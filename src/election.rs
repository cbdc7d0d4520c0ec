/*!  election.rs — election domain model
Kinds, eligibility checks and the ballot form metadata served to clients. */

use anyhow::{Result, bail};
use serde_json::{Value, json};
use std::collections::HashSet;
use uuid::Uuid;

use crate::database::{CandidateRecord, ElectionRecord, PropositionRecord};

/// The seven majority-judgment grades, best first. A ballot grade `g` indexes
/// `GRADE_LABELS[g - 1]`.
pub const GRADE_LABELS: [&str; 7] = [
    "Très bien",
    "Bien",
    "Assez bien",
    "Passable",
    "Insuffisant",
    "À rejeter",
    "Ne sait pas",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposition {
    pub id: i64,
    pub text: String,
}

/// Tagged election kind. Choice votes answer yes/no/don't-know; person votes
/// grade every candidate on the majority-judgment scale.
#[derive(Debug, Clone)]
pub enum ElectionKind {
    Choice { propositions: Vec<Proposition> },
    Person { candidates: Vec<Candidate> },
}

impl ElectionKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ElectionKind::Choice { .. } => "choice",
            ElectionKind::Person { .. } => "person",
        }
    }
}

/// Reason a voter may not take part right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    NotStarted,
    Ended,
    User,
}

impl Refusal {
    pub fn tag(&self) -> &'static str {
        match self {
            Refusal::NotStarted => "not_started",
            Refusal::Ended => "ended",
            Refusal::User => "user",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Refusal::NotStarted => "the vote has not started yet",
            Refusal::Ended => "the vote has ended",
            Refusal::User => "you are not allowed to vote in this election",
        }
    }
}

/// Immutable per-vote parameters. Loaded from the database for each request;
/// there is no ambient shared election state.
#[derive(Debug, Clone)]
pub struct Election {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub kind: ElectionKind,
    pub start_time: i64,
    pub end_time: i64,
    pub allowed_voters: HashSet<String>,
    pub public_key_pem: Option<String>,
    pub private_key_pem: Option<String>,
}

impl Election {
    pub fn new(
        name: String,
        description: String,
        kind: ElectionKind,
        start_time: i64,
        end_time: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            kind,
            start_time,
            end_time,
            allowed_voters: HashSet::new(),
            public_key_pem: None,
            private_key_pem: None,
        }
    }

    /// Restore an election from database records.
    pub fn from_database(
        record: ElectionRecord,
        voters: Vec<String>,
        candidates: Vec<CandidateRecord>,
        propositions: Vec<PropositionRecord>,
    ) -> Result<Self> {
        let kind = match record.kind.as_str() {
            "choice" => ElectionKind::Choice {
                propositions: propositions
                    .into_iter()
                    .map(|p| Proposition {
                        id: p.proposition_id,
                        text: p.text,
                    })
                    .collect(),
            },
            "person" => ElectionKind::Person {
                candidates: candidates
                    .into_iter()
                    .map(|c| Candidate {
                        id: c.candidate_id,
                        name: c.name,
                    })
                    .collect(),
            },
            other => bail!("unknown election kind in database: {other}"),
        };

        Ok(Self {
            id: Uuid::parse_str(&record.id)?,
            name: record.name,
            description: record.description,
            kind,
            start_time: record.start_time,
            end_time: record.end_time,
            allowed_voters: voters.into_iter().collect(),
            public_key_pem: record.public_key_pem,
            private_key_pem: record.private_key_pem,
        })
    }

    /// Voting-window check for signing, returning the refusal reason.
    pub fn check_window(&self, now: i64) -> Result<(), Refusal> {
        if now < self.start_time {
            return Err(Refusal::NotStarted);
        }
        if now > self.end_time {
            return Err(Refusal::Ended);
        }
        Ok(())
    }

    /// Full eligibility: an authenticated voter on the allowed list, inside
    /// the voting window.
    pub fn can_vote(&self, voter: Option<&str>, now: i64) -> Result<(), Refusal> {
        match voter {
            Some(v) if self.allowed_voters.contains(v) => self.check_window(now),
            _ => Err(Refusal::User),
        }
    }

    /// Keyless metadata used by clients to render the election.
    pub fn summary_json(&self) -> Value {
        let mut summary = json!({
            "id": self.id.to_string(),
            "name": self.name,
            "description": self.description,
            "kind": self.kind.tag(),
            "start_time": self.start_time,
            "end_time": self.end_time,
        });
        match &self.kind {
            ElectionKind::Choice { propositions } => {
                summary["propositions"] = propositions
                    .iter()
                    .map(|p| json!({ "id": p.id, "text": p.text }))
                    .collect();
            }
            ElectionKind::Person { candidates } => {
                summary["candidates"] = candidates
                    .iter()
                    .map(|c| json!({ "id": c.id, "name": c.name }))
                    .collect();
            }
        }
        summary
    }

    /// Field specifications the client renders into a ballot form. Choice
    /// votes are one radio group; person votes get one graded field per
    /// candidate, initially on the worst grade.
    pub fn form_schema(&self) -> Value {
        match &self.kind {
            ElectionKind::Choice { .. } => json!({
                "fields": {
                    "choice": {
                        "label": "Choice",
                        "choices": [["yes", "Yes"], ["no", "No"], ["dont_know", "Don't know"]],
                        "initial": "dont_know",
                    }
                },
                "field_order": ["choice"],
            }),
            ElectionKind::Person { candidates } => {
                let grade_choices: Vec<Value> = GRADE_LABELS
                    .iter()
                    .enumerate()
                    .map(|(i, label)| json!([i as u64 + 1, label]))
                    .collect();
                let mut fields = serde_json::Map::new();
                let mut field_order = Vec::new();
                for candidate in candidates {
                    let field_name = format!("person_{}", candidate.id);
                    fields.insert(
                        field_name.clone(),
                        json!({
                            "label": candidate.name,
                            "choices": grade_choices,
                            "initial": GRADE_LABELS.len(),
                        }),
                    );
                    field_order.push(Value::String(field_name));
                }
                json!({ "fields": fields, "field_order": field_order })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person_election() -> Election {
        let mut election = Election::new(
            "Board election".to_string(),
            String::new(),
            ElectionKind::Person {
                candidates: vec![
                    Candidate {
                        id: 1,
                        name: "Alice".to_string(),
                    },
                    Candidate {
                        id: 2,
                        name: "Bob".to_string(),
                    },
                ],
            },
            1_000,
            2_000,
        );
        election.allowed_voters.insert("carol".to_string());
        election
    }

    #[test]
    fn eligibility_refuses_anonymous_and_unknown_voters() {
        let election = person_election();
        assert_eq!(election.can_vote(None, 1_500), Err(Refusal::User));
        assert_eq!(election.can_vote(Some("mallory"), 1_500), Err(Refusal::User));
        assert_eq!(election.can_vote(Some("carol"), 1_500), Ok(()));
    }

    #[test]
    fn refusal_reasons_carry_stable_tags() {
        assert_eq!(Refusal::NotStarted.tag(), "not_started");
        assert_eq!(Refusal::Ended.tag(), "ended");
        assert_eq!(Refusal::User.tag(), "user");
    }

    #[test]
    fn eligibility_refuses_outside_the_window() {
        let election = person_election();
        assert_eq!(election.can_vote(Some("carol"), 999), Err(Refusal::NotStarted));
        assert_eq!(election.can_vote(Some("carol"), 2_001), Err(Refusal::Ended));
        // The window is inclusive on both ends.
        assert_eq!(election.can_vote(Some("carol"), 1_000), Ok(()));
        assert_eq!(election.can_vote(Some("carol"), 2_000), Ok(()));
    }

    #[test]
    fn person_form_schema_has_one_graded_field_per_candidate() {
        let schema = person_election().form_schema();
        let order = schema["field_order"].as_array().unwrap();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0], "person_1");

        let field = &schema["fields"]["person_1"];
        assert_eq!(field["label"], "Alice");
        assert_eq!(field["choices"].as_array().unwrap().len(), 7);
        assert_eq!(field["choices"][0], serde_json::json!([1, "Très bien"]));
        assert_eq!(field["initial"], 7);
    }

    #[test]
    fn choice_form_schema_defaults_to_dont_know() {
        let election = Election::new(
            "Budget".to_string(),
            String::new(),
            ElectionKind::Choice {
                propositions: vec![Proposition {
                    id: 1,
                    text: "Approve the budget".to_string(),
                }],
            },
            0,
            10,
        );
        let schema = election.form_schema();
        assert_eq!(schema["field_order"], serde_json::json!(["choice"]));
        assert_eq!(schema["fields"]["choice"]["initial"], "dont_know");
    }

    #[test]
    fn summary_never_contains_key_material() {
        let mut election = person_election();
        election.public_key_pem = Some("PUBLIC".to_string());
        election.private_key_pem = Some("PRIVATE".to_string());
        let summary = serde_json::to_string(&election.summary_json()).unwrap();
        assert!(!summary.contains("PUBLIC"));
        assert!(!summary.contains("PRIVATE"));
        assert!(summary.contains("Alice"));
    }
}
