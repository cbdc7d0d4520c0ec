/*!  tally.rs — counting the urn
Majority judgment for person elections, yes/no/don't-know counts for choice
elections. Ballots whose payload does not fit the election are skipped, never
fatal: the urn is public and anyone can recount. */

use serde::Serialize;
use serde_json::Value;

use crate::database::BallotRecord;
use crate::election::{Candidate, Election, ElectionKind, GRADE_LABELS};

pub const GRADE_COUNT: usize = GRADE_LABELS.len();

/// Score profile of one candidate, as published by the results endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateScore {
    pub candidate_id: i64,
    pub name: String,
    /// Number of grades counted for this candidate.
    pub total: u64,
    /// 1..=7, lower is better. The worst grade still held by an absolute
    /// majority of the voters.
    pub median_grade: u8,
    pub median_label: &'static str,
    /// Percentage of grades strictly better than the median.
    pub p_plus: f64,
    /// Percentage of grades strictly worse than the median.
    pub p_minus: f64,
    /// Percentage per grade, index 0 being "Très bien".
    pub grade_percentages: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChoiceCount {
    pub yes: u64,
    pub no: u64,
    pub dont_know: u64,
    pub total: u64,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TallyOutcome {
    Choice { counts: ChoiceCount },
    Person { ranking: Vec<CandidateScore> },
}

/// Count all ballots of the election.
pub fn tally(election: &Election, ballots: &[BallotRecord]) -> TallyOutcome {
    match &election.kind {
        ElectionKind::Choice { .. } => TallyOutcome::Choice {
            counts: tally_choice(ballots),
        },
        ElectionKind::Person { candidates } => TallyOutcome::Person {
            ranking: tally_person(candidates, ballots),
        },
    }
}

fn tally_choice(ballots: &[BallotRecord]) -> ChoiceCount {
    let mut counts = ChoiceCount::default();
    for ballot in ballots {
        let Ok(value) = serde_json::from_str::<Value>(&ballot.result) else {
            continue;
        };
        match value.get("choice") {
            Some(Value::Bool(true)) => counts.yes += 1,
            Some(Value::Bool(false)) => counts.no += 1,
            Some(Value::Null) => counts.dont_know += 1,
            _ => continue,
        }
        counts.total += 1;
    }
    counts
}

fn tally_person(candidates: &[Candidate], ballots: &[BallotRecord]) -> Vec<CandidateScore> {
    let mut ranking: Vec<CandidateScore> = candidates
        .iter()
        .map(|candidate| score_candidate(candidate, ballots))
        .collect();
    ranking.sort_by_key(rank_key);
    ranking
}

fn score_candidate(candidate: &Candidate, ballots: &[BallotRecord]) -> CandidateScore {
    let counts = grade_counts(candidate.id, ballots);
    let total: u64 = counts.iter().sum();
    let median_grade = majority_grade(&counts);
    let better: u64 = counts[..median_grade as usize - 1].iter().sum();
    let worse: u64 = counts[median_grade as usize..].iter().sum();

    CandidateScore {
        candidate_id: candidate.id,
        name: candidate.name.clone(),
        total,
        median_grade,
        median_label: GRADE_LABELS[median_grade as usize - 1],
        p_plus: percentage(better, total),
        p_minus: percentage(worse, total),
        grade_percentages: counts.iter().map(|&c| percentage(c, total)).collect(),
    }
}

/// Grades 1..=7 given to one candidate across the urn, as counts indexed by
/// grade - 1. Out-of-range grades and malformed entries are ignored.
fn grade_counts(candidate_id: i64, ballots: &[BallotRecord]) -> [u64; GRADE_COUNT] {
    let key = candidate_id.to_string();
    let mut counts = [0u64; GRADE_COUNT];
    for ballot in ballots {
        let Ok(value) = serde_json::from_str::<Value>(&ballot.result) else {
            continue;
        };
        let grade = value
            .get("persons")
            .and_then(|p| p.get(&key))
            .and_then(Value::as_u64);
        if let Some(grade @ 1..=7) = grade {
            counts[grade as usize - 1] += 1;
        }
    }
    counts
}

/// The majority grade: iterate from the worst grade down, accumulating
/// counts; the first grade whose cumulative count reaches an absolute
/// majority is the median. With no grades at all, the worst grade stands.
pub fn majority_grade(counts: &[u64; GRADE_COUNT]) -> u8 {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return GRADE_COUNT as u8;
    }
    let majority = total / 2 + 1;
    let mut cumulative = 0;
    for grade in (1..=GRADE_COUNT as u8).rev() {
        cumulative += counts[grade as usize - 1];
        if cumulative >= majority {
            return grade;
        }
    }
    1
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 * 100.0 / total as f64 * 100.0).round() / 100.0
}

/// Ascending sort key, best candidate first: lower median wins, then the
/// dominant-positive profile, then the magnitude of the dominant side
/// (larger `p_plus` when positives dominate, smaller `p_minus` otherwise).
/// Percentages are compared in hundredths so the key stays totally ordered.
fn rank_key(score: &CandidateScore) -> (u8, u8, i64) {
    let p_plus = (score.p_plus * 100.0).round() as i64;
    let p_minus = (score.p_minus * 100.0).round() as i64;
    if p_plus > p_minus {
        (score.median_grade, 0, -p_plus)
    } else {
        (score.median_grade, 1, p_minus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::Proposition;

    fn person_ballot(token: &str, grades: &[(i64, u64)]) -> BallotRecord {
        let persons: serde_json::Map<String, Value> = grades
            .iter()
            .map(|(id, grade)| (id.to_string(), Value::from(*grade)))
            .collect();
        let result = serde_json::to_string(&serde_json::json!({ "persons": persons })).unwrap();
        BallotRecord {
            id: format!("id-{token}"),
            election_id: "e".to_string(),
            token: token.to_string(),
            result,
            server_signature: String::new(),
            created_at: 0,
        }
    }

    fn choice_ballot(token: &str, choice: Value) -> BallotRecord {
        BallotRecord {
            id: format!("id-{token}"),
            election_id: "e".to_string(),
            token: token.to_string(),
            result: serde_json::to_string(&serde_json::json!({ "choice": choice })).unwrap(),
            server_signature: String::new(),
            created_at: 0,
        }
    }

    fn person_election(candidates: &[(i64, &str)]) -> Election {
        Election::new(
            "MJ".to_string(),
            String::new(),
            ElectionKind::Person {
                candidates: candidates
                    .iter()
                    .map(|(id, name)| Candidate {
                        id: *id,
                        name: name.to_string(),
                    })
                    .collect(),
            },
            0,
            10,
        )
    }

    #[test]
    fn majority_grade_takes_the_worst_majority_grade() {
        // A: grades [1, 2, 2, 3, 4], absolute majority at 3 of 5.
        let counts = [1, 2, 1, 1, 0, 0, 0];
        assert_eq!(majority_grade(&counts), 2);

        // B: grades [3, 3, 4, 5, 6].
        let counts = [0, 0, 2, 1, 1, 1, 0];
        assert_eq!(majority_grade(&counts), 4);
    }

    #[test]
    fn majority_grade_of_an_empty_profile_is_the_worst_grade() {
        assert_eq!(majority_grade(&[0; GRADE_COUNT]), 7);
    }

    #[test]
    fn two_candidate_ranking_follows_the_medians() {
        let election = person_election(&[(1, "A"), (2, "B")]);
        let grades_per_ballot = [
            [(1, 1), (2, 3)],
            [(1, 2), (2, 3)],
            [(1, 2), (2, 4)],
            [(1, 3), (2, 5)],
            [(1, 4), (2, 6)],
        ];
        let ballots: Vec<BallotRecord> = grades_per_ballot
            .iter()
            .enumerate()
            .map(|(i, grades)| {
                person_ballot(
                    &format!("tk-{i}"),
                    &grades.map(|(id, g)| (id as i64, g as u64)),
                )
            })
            .collect();

        let TallyOutcome::Person { ranking } = tally(&election, &ballots) else {
            panic!("expected a person tally");
        };
        assert_eq!(ranking[0].name, "A");
        assert_eq!(ranking[0].median_grade, 2);
        assert_eq!(ranking[0].median_label, "Bien");
        assert_eq!(ranking[0].total, 5);
        assert_eq!(ranking[0].p_plus, 20.0);
        assert_eq!(ranking[0].p_minus, 40.0);

        assert_eq!(ranking[1].name, "B");
        assert_eq!(ranking[1].median_grade, 4);
        assert_eq!(ranking[1].median_label, "Passable");
    }

    #[test]
    fn equal_medians_prefer_the_dominant_positive_side() {
        let election = person_election(&[(1, "Neg"), (2, "Pos")]);
        // Both medians are 4. Pos has more grades above the median than
        // below, Neg the opposite.
        let ballots = vec![
            person_ballot("t1", &[(1, 4), (2, 2)]),
            person_ballot("t2", &[(1, 4), (2, 4)]),
            person_ballot("t3", &[(1, 6), (2, 4)]),
        ];
        let TallyOutcome::Person { ranking } = tally(&election, &ballots) else {
            panic!("expected a person tally");
        };
        assert_eq!(ranking[0].name, "Pos");
        assert!(ranking[0].p_plus > ranking[0].p_minus);
        assert!(ranking[1].p_minus >= ranking[1].p_plus);
    }

    #[test]
    fn negative_dominant_tie_break_prefers_the_smaller_p_minus() {
        let election = person_election(&[(1, "Worse"), (2, "Better")]);
        // Both medians are 2 and both profiles are negative-dominant;
        // "Better" has the smaller share of grades below the median.
        let ballots = vec![
            person_ballot("t1", &[(1, 2), (2, 2)]),
            person_ballot("t2", &[(1, 2), (2, 2)]),
            person_ballot("t3", &[(1, 5), (2, 2)]),
            person_ballot("t4", &[(1, 6), (2, 7)]),
        ];
        let TallyOutcome::Person { ranking } = tally(&election, &ballots) else {
            panic!("expected a person tally");
        };
        assert_eq!(ranking[0].name, "Better");
        assert!(ranking[0].p_minus < ranking[1].p_minus);
    }

    #[test]
    fn ungraded_candidates_rank_last() {
        let election = person_election(&[(1, "Ghost"), (2, "Seen")]);
        let ballots = vec![person_ballot("t1", &[(2, 3)])];
        let TallyOutcome::Person { ranking } = tally(&election, &ballots) else {
            panic!("expected a person tally");
        };
        assert_eq!(ranking[0].name, "Seen");
        assert_eq!(ranking[1].name, "Ghost");
        assert_eq!(ranking[1].total, 0);
        assert_eq!(ranking[1].median_grade, 7);
    }

    #[test]
    fn out_of_range_grades_and_junk_ballots_are_skipped() {
        let election = person_election(&[(1, "A")]);
        let mut junk = person_ballot("t1", &[]);
        junk.result = r#"{"persons":{"1":9}}"#.to_string();
        let ballots = vec![junk, person_ballot("t2", &[(1, 3)])];
        let TallyOutcome::Person { ranking } = tally(&election, &ballots) else {
            panic!("expected a person tally");
        };
        assert_eq!(ranking[0].total, 1);
        assert_eq!(ranking[0].median_grade, 3);
    }

    #[test]
    fn choice_tally_counts_yes_no_and_dont_know() {
        let election = Election::new(
            "Budget".to_string(),
            String::new(),
            ElectionKind::Choice {
                propositions: vec![Proposition {
                    id: 1,
                    text: "Approve".to_string(),
                }],
            },
            0,
            10,
        );
        let ballots = vec![
            choice_ballot("t1", Value::Bool(true)),
            choice_ballot("t2", Value::Bool(true)),
            choice_ballot("t3", Value::Bool(false)),
            choice_ballot("t4", Value::Null),
        ];
        let TallyOutcome::Choice { counts } = tally(&election, &ballots) else {
            panic!("expected a choice tally");
        };
        assert_eq!(counts.yes, 2);
        assert_eq!(counts.no, 1);
        assert_eq!(counts.dont_know, 1);
        assert_eq!(counts.total, 4);
    }
}
