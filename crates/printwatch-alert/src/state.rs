use chrono::{DateTime, Duration, Utc};
use printwatch_common::types::{AlertRecord, AlertStatus};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Idle,
    Active {
        status: AlertStatus,
        since: DateTime<Utc>,
    },
}

/// Edge-triggered alerting for one (device, parameter) pair.
///
/// Raising an alert moves the machine to `Active`; the same status only
/// re-emits once it has been active for longer than the cooldown. A
/// `NoAlert` classification while active emits a single clear record.
///
/// Independently of that, every record about to be emitted is hashed and
/// checked against a bounded FIFO of recently emitted hashes, so replayed
/// input never produces the same record twice.
pub struct AlertStateMachine {
    parameter: String,
    state: AlertState,
    cooldown: Duration,
    seen: VecDeque<String>,
    seen_set: HashSet<String>,
    cache_size: usize,
}

impl AlertStateMachine {
    pub fn new(parameter: impl Into<String>, cooldown: Duration, cache_size: usize) -> Self {
        Self {
            parameter: parameter.into(),
            state: AlertState::Idle,
            cooldown,
            seen: VecDeque::new(),
            seen_set: HashSet::new(),
            cache_size: cache_size.max(1),
        }
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    /// Active status, or `NoAlert` when idle.
    pub fn status(&self) -> AlertStatus {
        match self.state {
            AlertState::Idle => AlertStatus::NoAlert,
            AlertState::Active { status, .. } => status,
        }
    }

    pub fn triggered_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            AlertState::Idle => None,
            AlertState::Active { since, .. } => Some(since),
        }
    }

    /// Back to `Idle` with an empty replay cache.
    pub fn reset(&mut self) {
        self.state = AlertState::Idle;
        self.seen.clear();
        self.seen_set.clear();
    }

    /// Feeds one classification. `timestamp` is the sample time and doubles
    /// as "now" for the cooldown.
    pub fn update(
        &mut self,
        status: AlertStatus,
        value: f64,
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Option<AlertRecord> {
        if !value.is_finite() {
            tracing::warn!(
                parameter = %self.parameter,
                %status,
                value,
                "Ignoring non-finite value in alert state machine"
            );
            return None;
        }

        let next = match (self.state, status.is_alert()) {
            (AlertState::Idle, false) => return None,
            (AlertState::Active { .. }, false) => AlertState::Idle,
            (AlertState::Idle, true) => AlertState::Active {
                status,
                since: timestamp,
            },
            (AlertState::Active { status: current, since }, true) => {
                if current == status && timestamp - since <= self.cooldown {
                    tracing::debug!(
                        parameter = %self.parameter,
                        %status,
                        "Alert suppressed (cooldown)"
                    );
                    return None;
                }
                AlertState::Active {
                    status,
                    since: timestamp,
                }
            }
        };

        let record = AlertRecord {
            status,
            parameter: self.parameter.clone(),
            value,
            timestamp,
            message: message.into(),
        };

        if !self.remember(record.content_hash()) {
            tracing::debug!(
                parameter = %self.parameter,
                %status,
                "Alert suppressed (already emitted)"
            );
            return None;
        }

        self.state = next;
        Some(record)
    }

    /// Records `hash`; false if it was already present.
    fn remember(&mut self, hash: String) -> bool {
        if self.seen_set.contains(&hash) {
            return false;
        }
        self.seen_set.insert(hash.clone());
        self.seen.push_back(hash);
        while self.seen.len() > self.cache_size {
            if let Some(oldest) = self.seen.pop_front() {
                self.seen_set.remove(&oldest);
            }
        }
        true
    }
}
