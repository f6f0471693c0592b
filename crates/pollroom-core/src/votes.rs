use thiserror::Error;

use crate::session::{SessionState, TallySnapshot};

/// Which votes the aggregator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotePolicy {
    /// Reject option keys that the live poll does not declare.
    pub validate_options: bool,
    /// Reject a participant's second vote in the same poll.
    pub one_vote_per_participant: bool,
}

impl Default for VotePolicy {
    fn default() -> Self {
        Self {
            validate_options: true,
            one_vote_per_participant: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vote {
    pub participant: String,
    pub option: String,
    pub poll_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteRejection {
    #[error("no poll is open")]
    NoActivePoll,
    #[error("vote targets poll {0}, which is no longer live")]
    StalePoll(String),
    #[error("option {0:?} is not part of the live poll")]
    UnknownOption(String),
    #[error("{0} already voted in this poll")]
    AlreadyVoted(String),
}

/// Validate `vote` against the live poll and apply it to the tally.
///
/// A vote naming a poll ID is only checked against the live poll once that
/// poll's canonical ID is known; while the save is pending any ID is taken to
/// mean the live poll.
pub fn submit_answer(
    state: &mut SessionState,
    policy: &VotePolicy,
    vote: &Vote,
) -> Result<TallySnapshot, VoteRejection> {
    let live = state.current_poll().ok_or(VoteRejection::NoActivePoll)?;

    if let (Some(target), Some(live_id)) = (vote.poll_id.as_deref(), live.id.as_deref()) {
        if target != live_id {
            return Err(VoteRejection::StalePoll(target.to_string()));
        }
    }

    if policy.validate_options && !live.record.has_option(&vote.option) {
        return Err(VoteRejection::UnknownOption(vote.option.clone()));
    }

    let participant = vote.participant.trim();
    if policy.one_vote_per_participant && !participant.is_empty() {
        if state.has_voted(participant) {
            return Err(VoteRejection::AlreadyVoted(participant.to_string()));
        }
        state.mark_voter(participant);
    }

    Ok(state.record_vote(&vote.option))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pollroom_models::poll::{PollOption, PollRecord, Tally};

    fn open_poll(state: &mut SessionState, id: Option<&str>) {
        let generation = state.set_current_poll(PollRecord {
            question: "Q1".into(),
            options: vec![
                PollOption { id: 1, text: "A".into(), correct: false },
                PollOption { id: 2, text: "B".into(), correct: false },
            ],
            timer: 30,
            teacher_username: "teacher1".into(),
            votes: Tally::new(),
            created_at: Utc::now(),
        });
        if let Some(id) = id {
            state.assign_poll_id(generation, id);
        }
    }

    fn vote(participant: &str, option: &str, poll_id: Option<&str>) -> Vote {
        Vote {
            participant: participant.to_string(),
            option: option.to_string(),
            poll_id: poll_id.map(str::to_string),
        }
    }

    #[test]
    fn rejects_vote_without_live_poll() {
        let mut state = SessionState::new();
        let err = submit_answer(&mut state, &VotePolicy::default(), &vote("s1", "1", None))
            .unwrap_err();
        assert_eq!(err, VoteRejection::NoActivePoll);
    }

    #[test]
    fn tally_counts_every_call_by_default() {
        let mut state = SessionState::new();
        open_poll(&mut state, Some("p1"));
        let policy = VotePolicy::default();

        submit_answer(&mut state, &policy, &vote("s1", "1", Some("p1"))).unwrap();
        submit_answer(&mut state, &policy, &vote("s1", "1", Some("p1"))).unwrap();
        let snapshot = submit_answer(&mut state, &policy, &vote("", "2", Some("p1"))).unwrap();

        assert_eq!(snapshot.votes.get("1"), Some(&2));
        assert_eq!(snapshot.votes.get("2"), Some(&1));
        assert_eq!(snapshot.poll_id.as_deref(), Some("p1"));
    }

    #[test]
    fn rejects_vote_for_retired_poll() {
        let mut state = SessionState::new();
        open_poll(&mut state, Some("p1"));
        open_poll(&mut state, Some("p2"));

        let err = submit_answer(&mut state, &VotePolicy::default(), &vote("s1", "1", Some("p1")))
            .unwrap_err();
        assert_eq!(err, VoteRejection::StalePoll("p1".into()));
        assert!(state.tally().is_empty());
    }

    #[test]
    fn accepts_vote_while_canonical_id_is_pending() {
        let mut state = SessionState::new();
        open_poll(&mut state, None);

        let snapshot =
            submit_answer(&mut state, &VotePolicy::default(), &vote("s1", "1", Some("whatever")))
                .unwrap();
        assert_eq!(snapshot.votes.get("1"), Some(&1));
        assert!(snapshot.poll_id.is_none());
    }

    #[test]
    fn rejects_unknown_option_when_validating() {
        let mut state = SessionState::new();
        open_poll(&mut state, Some("p1"));

        let err = submit_answer(&mut state, &VotePolicy::default(), &vote("s1", "9", None))
            .unwrap_err();
        assert_eq!(err, VoteRejection::UnknownOption("9".into()));
        assert!(state.tally().is_empty());
    }

    #[test]
    fn records_unknown_option_as_is_when_not_validating() {
        let mut state = SessionState::new();
        open_poll(&mut state, Some("p1"));
        let policy = VotePolicy {
            validate_options: false,
            ..VotePolicy::default()
        };

        let snapshot = submit_answer(&mut state, &policy, &vote("s1", "banana", None)).unwrap();
        assert_eq!(snapshot.votes.get("banana"), Some(&1));
    }

    #[test]
    fn one_vote_per_participant_rejects_repeat_votes() {
        let mut state = SessionState::new();
        open_poll(&mut state, Some("p1"));
        let policy = VotePolicy {
            one_vote_per_participant: true,
            ..VotePolicy::default()
        };

        submit_answer(&mut state, &policy, &vote("s1", "1", None)).unwrap();
        let err = submit_answer(&mut state, &policy, &vote("s1", "2", None)).unwrap_err();
        assert_eq!(err, VoteRejection::AlreadyVoted("s1".into()));

        // Anonymous votes cannot be de-duplicated.
        submit_answer(&mut state, &policy, &vote("", "2", None)).unwrap();
        submit_answer(&mut state, &policy, &vote("", "2", None)).unwrap();
        assert_eq!(state.tally().get("1"), Some(&1));
        assert_eq!(state.tally().get("2"), Some(&2));
    }

    #[test]
    fn repeat_vote_allowed_again_in_next_poll() {
        let mut state = SessionState::new();
        let policy = VotePolicy {
            one_vote_per_participant: true,
            ..VotePolicy::default()
        };
        open_poll(&mut state, Some("p1"));
        submit_answer(&mut state, &policy, &vote("s1", "1", None)).unwrap();

        open_poll(&mut state, Some("p2"));
        submit_answer(&mut state, &policy, &vote("s1", "1", Some("p2"))).unwrap();
        assert_eq!(state.tally().get("1"), Some(&1));
    }
}
