mod election_timer;
mod periodic_timer;
mod shared;
mod time;

#[cfg(test)]
mod test_utils;

pub(crate) use election_timer::ElectionTimerHandle;
pub(crate) use periodic_timer::PeriodicTimerHandle;
