use crate::actor::Callback;
use crate::logstore::LogIndex;
use crate::replica::{ProposeError, ProposeOutcome, ProposeOutput, Term};
use std::collections::BTreeMap;

/// PendingProposals holds the callers waiting for their entry to be applied, keyed by log index.
#[derive(Default)]
pub(crate) struct PendingProposals {
    waiters: BTreeMap<LogIndex, Vec<Waiter>>,
}

struct Waiter {
    term: Term,
    callback: Callback<ProposeOutput, ProposeError>,
}

impl PendingProposals {
    pub(crate) fn register(&mut self, index: LogIndex, term: Term, callback: Callback<ProposeOutput, ProposeError>) {
        self.waiters
            .entry(index)
            .or_insert_with(Vec::new)
            .push(Waiter { term, callback });
    }

    /// The entry at (`index`, `term`) was applied. Waiters that expected a different term at this
    /// index lost their entry to another leader.
    pub(crate) fn resolve_applied(&mut self, index: LogIndex, term: Term, outcome: &ProposeOutcome) {
        for waiter in self.waiters.remove(&index).unwrap_or_default() {
            if waiter.term == term {
                waiter.callback.send(Ok(ProposeOutput {
                    index,
                    term,
                    outcome: outcome.clone(),
                }));
            } else {
                waiter.callback.send(Err(ProposeError::NotLeader { leader_hint: None }));
            }
        }
    }

    /// Fail every waiter at `index` or later.
    pub(crate) fn fail_from(&mut self, index: LogIndex, error: ProposeError) {
        let failed = self.waiters.split_off(&index);
        for waiter in failed.into_iter().flat_map(|(_, waiters)| waiters) {
            waiter.callback.send(Err(error.clone()));
        }
    }

    pub(crate) fn fail_all(&mut self, error: ProposeError) {
        self.fail_from(LogIndex::NONE, error);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.waiters.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::StateMachineOutput;

    #[tokio::test]
    async fn resolve_and_fail() {
        let mut pending = PendingProposals::default();
        let (cb1, rx1) = Callback::new();
        let (cb2, rx2) = Callback::new();
        let (cb3, rx3) = Callback::new();
        let (cb4, rx4) = Callback::new();
        pending.register(LogIndex::new(1), Term::new(2), cb1);
        pending.register(LogIndex::new(2), Term::new(1), cb2);
        pending.register(LogIndex::new(3), Term::new(2), cb3);
        pending.register(LogIndex::new(4), Term::new(2), cb4);
        assert_eq!(pending.len(), 4);

        let outcome = ProposeOutcome::Committed(StateMachineOutput::NoData);
        pending.resolve_applied(LogIndex::new(1), Term::new(2), &outcome);
        assert_eq!(
            rx1.await.unwrap(),
            Ok(ProposeOutput {
                index: LogIndex::new(1),
                term: Term::new(2),
                outcome: outcome.clone(),
            })
        );

        // Index 2 was overwritten by a term 2 entry.
        pending.resolve_applied(LogIndex::new(2), Term::new(2), &outcome);
        assert_eq!(rx2.await.unwrap(), Err(ProposeError::NotLeader { leader_hint: None }));

        pending.fail_from(LogIndex::new(4), ProposeError::StorageUnavailable);
        assert_eq!(rx4.await.unwrap(), Err(ProposeError::StorageUnavailable));
        assert_eq!(pending.len(), 1);

        pending.fail_all(ProposeError::NodeStopped);
        assert_eq!(rx3.await.unwrap(), Err(ProposeError::NodeStopped));
        assert_eq!(pending.len(), 0);
    }
}
