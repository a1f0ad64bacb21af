use crate::config::WindowPolicy;
use chrono::{DateTime, Duration, Utc};
use printwatch_common::types::Sample;
use std::collections::VecDeque;

/// Recent samples of one (device, parameter) pair, bounded by a
/// [`WindowPolicy`].
///
/// Samples are kept in arrival order. The bound holds after every public
/// mutation; `append` trims before returning.
pub struct SampleWindow {
    policy: WindowPolicy,
    data: VecDeque<Sample>,
    newest: Option<DateTime<Utc>>,
}

impl SampleWindow {
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            policy,
            data: VecDeque::new(),
            newest: None,
        }
    }

    pub fn append(&mut self, sample: Sample) {
        self.append_with(sample, |_| {});
    }

    /// Appends, hands the untrimmed contents to `before_trim`, then trims.
    pub fn append_with<F>(&mut self, sample: Sample, before_trim: F)
    where
        F: FnOnce(&[Sample]),
    {
        self.observe(sample.timestamp);
        self.data.push_back(sample);
        before_trim(self.data.make_contiguous());
        self.trim();
    }

    /// Drops entries outside the active bound. Returns how many were evicted.
    pub fn trim(&mut self) -> usize {
        let before = self.data.len();
        match self.policy {
            WindowPolicy::Count { max_count } => {
                while self.data.len() > max_count {
                    self.data.pop_front();
                }
            }
            WindowPolicy::Duration { max_age_secs } => {
                if let Some(latest) = self.data.back().map(|s| s.timestamp) {
                    let cutoff = latest - Duration::seconds(max_age_secs as i64);
                    self.data.retain(|s| s.timestamp >= cutoff);
                }
            }
        }
        before - self.data.len()
    }

    /// The retained samples in order. Does not touch the window.
    pub fn snapshot(&self) -> Vec<Sample> {
        match self.policy {
            WindowPolicy::Count { max_count } => {
                let skip = self.data.len().saturating_sub(max_count);
                self.data.iter().skip(skip).cloned().collect()
            }
            WindowPolicy::Duration { max_age_secs } => {
                let Some(latest) = self.data.back().map(|s| s.timestamp) else {
                    return Vec::new();
                };
                let cutoff = latest - Duration::seconds(max_age_secs as i64);
                self.data
                    .iter()
                    .filter(|s| s.timestamp >= cutoff)
                    .cloned()
                    .collect()
            }
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.data.iter().map(|s| s.value).collect()
    }

    /// Most recently appended sample.
    pub fn latest(&self) -> Option<&Sample> {
        self.data.back()
    }

    /// Latest timestamp ever appended, even if that sample was trimmed or
    /// arrived before a later out-of-order one.
    pub fn newest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.newest
    }

    /// Refills the window from a checkpoint, keeping the bound.
    pub fn restore(&mut self, samples: Vec<Sample>) {
        for sample in &samples {
            self.observe(sample.timestamp);
        }
        self.data.extend(samples);
        self.trim();
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.newest = None;
    }

    fn observe(&mut self, timestamp: DateTime<Utc>) {
        if self.newest.map_or(true, |newest| timestamp > newest) {
            self.newest = Some(timestamp);
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
