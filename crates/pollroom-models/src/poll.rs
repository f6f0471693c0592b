use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::wire;

/// Vote counts keyed by the option ordinal rendered as a string.
pub type Tally = BTreeMap<String, u64>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    #[serde(deserialize_with = "wire::i64_from_string_or_number")]
    pub id: i64,
    pub text: String,
    /// Presenter-side rendering only; never used to score votes.
    #[serde(default)]
    pub correct: bool,
}

impl PollOption {
    /// Tally key for this option.
    pub fn key(&self) -> String {
        self.id.to_string()
    }
}

/// Payload of a presenter's `createPoll` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPoll {
    pub question: String,
    pub options: Vec<PollOption>,
    #[serde(deserialize_with = "wire::u32_from_string_or_number")]
    pub timer: u32,
    #[serde(default)]
    pub teacher_username: String,
}

/// A poll as it crosses the durable-store boundary, before an identity is
/// attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRecord {
    pub question: String,
    pub options: Vec<PollOption>,
    pub timer: u32,
    pub teacher_username: String,
    #[serde(default)]
    pub votes: Tally,
    pub created_at: DateTime<Utc>,
}

impl PollRecord {
    pub fn from_new(poll: NewPoll, created_at: DateTime<Utc>) -> Self {
        Self {
            question: poll.question,
            options: poll.options,
            timer: poll.timer,
            teacher_username: poll.teacher_username,
            votes: Tally::new(),
            created_at,
        }
    }

    pub fn has_option(&self, key: &str) -> bool {
        self.options.iter().any(|option| option.key() == key)
    }
}

/// A poll addressed by its canonical ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub record: PollRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_poll_accepts_string_timer_and_option_ids() {
        let poll: NewPoll = serde_json::from_value(json!({
            "question": "Q1",
            "options": [{"id": "1", "text": "A", "correct": true}, {"id": 2, "text": "B"}],
            "timer": "30",
            "teacherUsername": "teacher1",
        }))
        .unwrap();
        assert_eq!(poll.timer, 30);
        assert_eq!(poll.options[0].id, 1);
        assert!(poll.options[0].correct);
        assert!(!poll.options[1].correct);
        assert_eq!(poll.teacher_username, "teacher1");
    }

    #[test]
    fn string_timer_reads_leading_digits() {
        for (raw, expected) in [("30.5", 30), ("30s", 30), (" 45 ", 45)] {
            let poll: NewPoll = serde_json::from_value(json!({
                "question": "Q1",
                "options": [],
                "timer": raw,
            }))
            .unwrap();
            assert_eq!(poll.timer, expected, "timer {raw:?}");
        }
    }

    #[test]
    fn new_poll_rejects_garbage_timer() {
        let result: Result<NewPoll, _> = serde_json::from_value(json!({
            "question": "Q1",
            "options": [],
            "timer": "soon",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn poll_serializes_with_underscore_id_and_camel_case_fields() {
        let created_at = "2024-05-01T10:00:00Z".parse().unwrap();
        let mut record = PollRecord::from_new(
            NewPoll {
                question: "Q1".into(),
                options: vec![PollOption { id: 1, text: "A".into(), correct: false }],
                timer: 30,
                teacher_username: "teacher1".into(),
            },
            created_at,
        );
        record.votes.insert("1".into(), 2);
        let poll = Poll { id: "abc".into(), record };

        let value = serde_json::to_value(&poll).unwrap();
        assert_eq!(value["_id"], "abc");
        assert_eq!(value["teacherUsername"], "teacher1");
        assert_eq!(value["votes"], json!({"1": 2}));
        assert_eq!(value["createdAt"], "2024-05-01T10:00:00Z");

        let back: Poll = serde_json::from_value(value).unwrap();
        assert_eq!(back, poll);
    }

    #[test]
    fn has_option_matches_stringified_ordinals() {
        let record = PollRecord::from_new(
            NewPoll {
                question: "Q".into(),
                options: vec![
                    PollOption { id: 1, text: "A".into(), correct: false },
                    PollOption { id: 2, text: "B".into(), correct: true },
                ],
                timer: 10,
                teacher_username: String::new(),
            },
            Utc::now(),
        );
        assert!(record.has_option("2"));
        assert!(!record.has_option("3"));
        assert!(!record.has_option("B"));
    }
}
