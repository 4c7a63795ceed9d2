use crate::logstore::{ClientSession, LogIndex};
use crate::replica::{StateMachineOutput, Term};
use std::collections::{HashMap, VecDeque};

/// How many recent outputs are kept per client to answer retried proposals.
const OUTPUT_WINDOW: usize = 16;

/// ClientSessions tracks, per client, the highest applied `seq_num`. It is updated only while
/// applying committed entries, so it evolves identically on every replica and a retried request is
/// never applied twice regardless of who is leader.
///
/// The leader additionally remembers which sessions are sitting in its log uncommitted, so a retry
/// that arrives before the original commits waits on the existing entry.
#[derive(Default)]
pub(crate) struct ClientSessions {
    applied: HashMap<u64, AppliedSession>,
    in_flight: HashMap<ClientSession, (LogIndex, Term)>,
}

#[derive(Default)]
struct AppliedSession {
    last_seq_num: u64,
    recent: VecDeque<(u64, CachedResult)>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CachedResult {
    pub(crate) index: LogIndex,
    pub(crate) term: Term,
    pub(crate) output: StateMachineOutput,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Admission {
    Fresh,
    /// Already applied. The result is `None` once it has aged out of the window.
    Applied(Option<CachedResult>),
    InFlight(LogIndex, Term),
}

impl ClientSessions {
    pub(crate) fn check_admission(&self, session: &ClientSession) -> Admission {
        if let Some(applied) = self.duplicate_of(session) {
            return Admission::Applied(applied);
        }
        match self.in_flight.get(session) {
            Some((index, term)) => Admission::InFlight(*index, *term),
            None => Admission::Fresh,
        }
    }

    /// `Some(_)` if `session` was already applied, with the cached result when still available.
    pub(crate) fn duplicate_of(&self, session: &ClientSession) -> Option<Option<CachedResult>> {
        let applied = self.applied.get(&session.client_id)?;
        if session.seq_num > applied.last_seq_num {
            return None;
        }

        let cached = applied
            .recent
            .iter()
            .find(|(seq_num, _)| *seq_num == session.seq_num)
            .map(|(_, result)| result.clone());
        Some(cached)
    }

    pub(crate) fn mark_in_flight(&mut self, session: ClientSession, index: LogIndex, term: Term) {
        self.in_flight.insert(session, (index, term));
    }

    /// The log was truncated at `index`; sessions in the removed suffix are no longer in flight.
    pub(crate) fn forget_in_flight_from(&mut self, index: LogIndex) {
        self.in_flight.retain(|_, (i, _)| *i < index);
    }

    pub(crate) fn clear_in_flight(&mut self) {
        self.in_flight.clear();
    }

    pub(crate) fn record_applied(&mut self, session: ClientSession, result: CachedResult) {
        self.in_flight.remove(&session);

        let applied = self.applied.entry(session.client_id).or_default();
        applied.last_seq_num = session.seq_num;
        applied.recent.push_back((session.seq_num, result));
        while applied.recent.len() > OUTPUT_WINDOW {
            applied.recent.pop_front();
        }
    }

    /// Mark `session` as applied when its output is no longer known, e.g. while rebuilding the
    /// table from the log on open.
    pub(crate) fn record_replayed(&mut self, session: ClientSession) {
        let applied = self.applied.entry(session.client_id).or_default();
        applied.last_seq_num = std::cmp::max(applied.last_seq_num, session.seq_num);
    }

    /// `(client_id, last applied seq_num)` for every client, ordered by client.
    pub(crate) fn snapshot(&self) -> Vec<ClientSession> {
        let mut sessions: Vec<ClientSession> = self
            .applied
            .iter()
            .map(|(client_id, applied)| ClientSession {
                client_id: *client_id,
                seq_num: applied.last_seq_num,
            })
            .collect();
        sessions.sort_by_key(|s| s.client_id);
        sessions
    }

    /// Replace everything with a table shipped in a snapshot. Cached outputs don't travel.
    pub(crate) fn restore(&mut self, sessions: &[ClientSession]) {
        self.in_flight.clear();
        self.applied = sessions
            .iter()
            .map(|s| {
                (
                    s.client_id,
                    AppliedSession {
                        last_seq_num: s.seq_num,
                        recent: VecDeque::new(),
                    },
                )
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn session(client_id: u64, seq_num: u64) -> ClientSession {
        ClientSession { client_id, seq_num }
    }

    fn result(index: u64) -> CachedResult {
        CachedResult {
            index: LogIndex::new(index),
            term: Term::new(1),
            output: StateMachineOutput::Data(Bytes::from(format!("out-{}", index))),
        }
    }

    #[test]
    fn admission_lifecycle() {
        let mut sessions = ClientSessions::default();
        assert_eq!(sessions.check_admission(&session(1, 1)), Admission::Fresh);

        sessions.mark_in_flight(session(1, 1), LogIndex::new(5), Term::new(1));
        assert_eq!(
            sessions.check_admission(&session(1, 1)),
            Admission::InFlight(LogIndex::new(5), Term::new(1))
        );

        sessions.record_applied(session(1, 1), result(5));
        assert_eq!(
            sessions.check_admission(&session(1, 1)),
            Admission::Applied(Some(result(5)))
        );
        assert_eq!(sessions.check_admission(&session(1, 2)), Admission::Fresh);
        assert_eq!(sessions.check_admission(&session(2, 1)), Admission::Fresh);
    }

    #[test]
    fn outputs_age_out_of_window() {
        let mut sessions = ClientSessions::default();
        for seq in 1..=(OUTPUT_WINDOW as u64 + 1) {
            sessions.record_applied(session(7, seq), result(seq));
        }

        // Still a duplicate, but the output is gone.
        assert_eq!(sessions.duplicate_of(&session(7, 1)), Some(None));
        assert_eq!(sessions.duplicate_of(&session(7, 2)), Some(Some(result(2))));
    }

    #[test]
    fn truncation_forgets_in_flight_suffix() {
        let mut sessions = ClientSessions::default();
        sessions.mark_in_flight(session(1, 1), LogIndex::new(3), Term::new(1));
        sessions.mark_in_flight(session(2, 1), LogIndex::new(4), Term::new(1));

        sessions.forget_in_flight_from(LogIndex::new(4));

        assert!(matches!(sessions.check_admission(&session(1, 1)), Admission::InFlight(..)));
        assert_eq!(sessions.check_admission(&session(2, 1)), Admission::Fresh);
    }

    #[test]
    fn snapshot_and_restore() {
        let mut sessions = ClientSessions::default();
        sessions.record_applied(session(9, 4), result(1));
        sessions.record_applied(session(3, 2), result(2));
        let table = sessions.snapshot();
        assert_eq!(table, vec![session(3, 2), session(9, 4)]);

        let mut restored = ClientSessions::default();
        restored.restore(&table);
        assert_eq!(restored.duplicate_of(&session(9, 3)), Some(None));
        assert_eq!(restored.duplicate_of(&session(9, 5)), None);
    }
}
