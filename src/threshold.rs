//! Classifies users between two consecutive results of the same watcher.
//!
//! A user who is over threshold for the first time, or who dropped back
//! under it, is always reported. A user who stays over threshold is only
//! reported again once usage grows by more than [`ESCALATION_FACTOR`] over
//! the last recorded value.

use crate::watchers::UsageByUser;

/// Growth over the previous value a continued user needs to be reported again.
pub const ESCALATION_FACTOR: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Over threshold now, not on the previous run.
    Started,
    /// Over threshold on both runs and usage escalated.
    Escalated,
    /// Over threshold on the previous run, not anymore.
    Finished,
}

/// One user whose state warrants a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub user: String,
    pub previous: Option<f64>,
    pub current: Option<f64>,
}

impl Change {
    pub fn transition(&self) -> Transition {
        match (self.previous, self.current) {
            (None, _) => Transition::Started,
            (Some(_), Some(_)) => Transition::Escalated,
            (Some(_), None) => Transition::Finished,
        }
    }
}

pub fn is_escalation(previous: f64, current: f64) -> bool {
    current > previous * ESCALATION_FACTOR
}

/// Returns every change between `previous` and `current`, sorted by user
/// within started, escalated and finished groups.
pub fn changes(previous: &UsageByUser, current: &UsageByUser) -> Vec<Change> {
    let mut started = Vec::new();
    let mut escalated = Vec::new();
    let mut finished = Vec::new();

    for (user, &usage) in current {
        match previous.get(user) {
            None => started.push(Change {
                user: user.clone(),
                previous: None,
                current: Some(usage),
            }),
            Some(&before) if is_escalation(before, usage) => escalated.push(Change {
                user: user.clone(),
                previous: Some(before),
                current: Some(usage),
            }),
            Some(_) => {}
        }
    }

    for (user, &usage) in previous {
        if !current.contains_key(user) {
            finished.push(Change {
                user: user.clone(),
                previous: Some(usage),
                current: None,
            });
        }
    }

    for group in [&mut started, &mut escalated, &mut finished] {
        group.sort_by(|a, b| a.user.cmp(&b.user));
    }

    started.into_iter().chain(escalated).chain(finished).collect()
}
