//! Six Perfections assessment scoring
//!
//! Responses are answered on a 1-7 scale. Each perfection's score is the
//! average of its responses expressed as a percentage of the maximum, rounded
//! to the nearest integer; a perfection with no responses scores 0.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::store::UserRecord;

/// Lowest and highest accepted response values
pub const MIN_RESPONSE_SCORE: u8 = 1;
pub const MAX_RESPONSE_SCORE: u8 = 7;

/// The six perfections
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Paramita {
    Dana,
    Sila,
    Ksanti,
    Virya,
    Dhyana,
    Prajna,
}

impl Paramita {
    pub const ALL: [Paramita; 6] = [
        Paramita::Dana,
        Paramita::Sila,
        Paramita::Ksanti,
        Paramita::Virya,
        Paramita::Dhyana,
        Paramita::Prajna,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Paramita::Dana => "dana",
            Paramita::Sila => "sila",
            Paramita::Ksanti => "ksanti",
            Paramita::Virya => "virya",
            Paramita::Dhyana => "dhyana",
            Paramita::Prajna => "prajna",
        }
    }

    /// English name of the perfection
    pub fn english(&self) -> &'static str {
        match self {
            Paramita::Dana => "Generosity",
            Paramita::Sila => "Ethics",
            Paramita::Ksanti => "Patience",
            Paramita::Virya => "Energy",
            Paramita::Dhyana => "Meditation",
            Paramita::Prajna => "Wisdom",
        }
    }
}

impl std::fmt::Display for Paramita {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentage score (0-100) for each perfection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamitaScores {
    #[serde(default)]
    pub dana: u8,
    #[serde(default)]
    pub sila: u8,
    #[serde(default)]
    pub ksanti: u8,
    #[serde(default)]
    pub virya: u8,
    #[serde(default)]
    pub dhyana: u8,
    #[serde(default)]
    pub prajna: u8,
}

impl ParamitaScores {
    pub fn get(&self, paramita: Paramita) -> u8 {
        match paramita {
            Paramita::Dana => self.dana,
            Paramita::Sila => self.sila,
            Paramita::Ksanti => self.ksanti,
            Paramita::Virya => self.virya,
            Paramita::Dhyana => self.dhyana,
            Paramita::Prajna => self.prajna,
        }
    }

    fn set(&mut self, paramita: Paramita, score: u8) {
        let slot = match paramita {
            Paramita::Dana => &mut self.dana,
            Paramita::Sila => &mut self.sila,
            Paramita::Ksanti => &mut self.ksanti,
            Paramita::Virya => &mut self.virya,
            Paramita::Dhyana => &mut self.dhyana,
            Paramita::Prajna => &mut self.prajna,
        };
        *slot = score;
    }

    /// Rounded mean across all six perfections
    pub fn overall(&self) -> u8 {
        let total: u32 = Paramita::ALL.iter().map(|p| u32::from(self.get(*p))).sum();
        (f64::from(total) / Paramita::ALL.len() as f64).round() as u8
    }
}

/// One answered question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResponse {
    pub question_id: String,
    pub paramita: Paramita,
    pub score: u8,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Summary of a completed assessment kept in the user's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRecord {
    pub id: String,
    pub completed_at: DateTime<Utc>,
    pub scores: ParamitaScores,
    pub response_count: usize,
}

/// Reject empty batches and scores outside the 1-7 scale
pub fn validate_responses(responses: &[AssessmentResponse]) -> Result<(), String> {
    if responses.is_empty() {
        return Err("At least one response is required".to_string());
    }

    if let Some(bad) = responses
        .iter()
        .find(|r| !(MIN_RESPONSE_SCORE..=MAX_RESPONSE_SCORE).contains(&r.score))
    {
        return Err(format!(
            "Response '{}' has score {}; scores must be between {} and {}",
            bad.question_id, bad.score, MIN_RESPONSE_SCORE, MAX_RESPONSE_SCORE
        ));
    }

    Ok(())
}

/// Per-perfection percentage scores for a batch of responses
pub fn calculate_scores(responses: &[AssessmentResponse]) -> ParamitaScores {
    let mut totals: BTreeMap<Paramita, (u32, u32)> = BTreeMap::new();
    for response in responses {
        let entry = totals.entry(response.paramita).or_default();
        entry.0 += u32::from(response.score);
        entry.1 += 1;
    }

    let mut scores = ParamitaScores::default();
    for (paramita, (sum, count)) in totals {
        let average = f64::from(sum) / f64::from(count);
        let percent = (average / f64::from(MAX_RESPONSE_SCORE) * 100.0).round();
        scores.set(paramita, percent.clamp(0.0, 100.0) as u8);
    }
    scores
}

/// Practice level label for a percentage score
pub fn level_for_score(score: u8) -> &'static str {
    match score {
        90.. => "Bodhisattva Level",
        75.. => "Advanced Practitioner",
        60.. => "Dedicated Student",
        40.. => "Growing Seeker",
        20.. => "Beginning Path",
        _ => "New to Practice",
    }
}

/// Record a completed assessment on the user: progress is replaced, history appended
pub fn apply_assessment(
    record: &mut UserRecord,
    scores: ParamitaScores,
    response_count: usize,
) -> AssessmentRecord {
    let entry = AssessmentRecord {
        id: uuid::Uuid::new_v4().to_string(),
        completed_at: Utc::now(),
        scores,
        response_count,
    };

    record.paramita_progress = scores;
    record.assessment_history.push(entry.clone());
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(paramita: Paramita, score: u8) -> AssessmentResponse {
        AssessmentResponse {
            question_id: format!("{paramita}-{score}"),
            paramita,
            score,
            timestamp: None,
        }
    }

    #[test]
    fn test_scores_are_rounded_percentages() {
        let responses = vec![
            response(Paramita::Dana, 7),
            response(Paramita::Dana, 6),
            response(Paramita::Sila, 4),
            response(Paramita::Prajna, 1),
        ];

        let scores = calculate_scores(&responses);
        // (6.5 / 7) * 100 = 92.86
        assert_eq!(scores.dana, 93);
        // (4 / 7) * 100 = 57.14
        assert_eq!(scores.sila, 57);
        // (1 / 7) * 100 = 14.29
        assert_eq!(scores.prajna, 14);
        assert_eq!(scores.ksanti, 0);
        assert_eq!(scores.virya, 0);
        assert_eq!(scores.dhyana, 0);
    }

    #[test]
    fn test_all_max_is_one_hundred() {
        let responses: Vec<_> = Paramita::ALL.iter().map(|p| response(*p, 7)).collect();
        let scores = calculate_scores(&responses);
        for paramita in Paramita::ALL {
            assert_eq!(scores.get(paramita), 100);
        }
        assert_eq!(scores.overall(), 100);
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(level_for_score(100), "Bodhisattva Level");
        assert_eq!(level_for_score(90), "Bodhisattva Level");
        assert_eq!(level_for_score(89), "Advanced Practitioner");
        assert_eq!(level_for_score(75), "Advanced Practitioner");
        assert_eq!(level_for_score(60), "Dedicated Student");
        assert_eq!(level_for_score(40), "Growing Seeker");
        assert_eq!(level_for_score(20), "Beginning Path");
        assert_eq!(level_for_score(19), "New to Practice");
        assert_eq!(level_for_score(0), "New to Practice");
    }

    #[test]
    fn test_validation() {
        assert!(validate_responses(&[]).is_err());
        assert!(validate_responses(&[response(Paramita::Virya, 0)]).is_err());
        assert!(validate_responses(&[response(Paramita::Virya, 8)]).is_err());
        assert!(validate_responses(&[response(Paramita::Virya, 1), response(Paramita::Sila, 7)]).is_ok());
    }

    #[test]
    fn test_unknown_paramita_rejected_by_serde() {
        let json = r#"{"questionId": "q1", "paramita": "karuna", "score": 3}"#;
        assert!(serde_json::from_str::<AssessmentResponse>(json).is_err());

        let json = r#"{"questionId": "q1", "paramita": "ksanti", "score": 3}"#;
        let parsed: AssessmentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.paramita, Paramita::Ksanti);
    }

    #[test]
    fn test_apply_assessment_replaces_progress_and_appends_history() {
        let mut user = UserRecord::new(
            "seeker@example.com".into(),
            "$argon2id$placeholder".into(),
            "Ada".into(),
            "Lovelace".into(),
        );

        let first = calculate_scores(&[response(Paramita::Dana, 7)]);
        apply_assessment(&mut user, first, 1);
        let second = calculate_scores(&[response(Paramita::Sila, 7)]);
        let entry = apply_assessment(&mut user, second, 1);

        assert_eq!(user.paramita_progress, second);
        assert_eq!(user.paramita_progress.dana, 0);
        assert_eq!(user.assessment_history.len(), 2);
        assert_eq!(user.assessment_history[1], entry);
        assert_eq!(entry.response_count, 1);
    }
}
