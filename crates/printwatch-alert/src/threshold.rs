use crate::config::Threshold;
use printwatch_common::types::AlertStatus;

/// Where a value sits relative to a [`Threshold`] band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Under,
    Within,
    Over,
}

impl Band {
    /// Status for a reading that is out of band right now.
    pub fn now_status(self) -> AlertStatus {
        match self {
            Band::Under => AlertStatus::UnderNow,
            Band::Over => AlertStatus::OverNow,
            Band::Within => AlertStatus::NoAlert,
        }
    }

    /// Status for a forecast run that leaves the band.
    pub fn forecast_status(self) -> AlertStatus {
        match self {
            Band::Under => AlertStatus::UnderForecast,
            Band::Over => AlertStatus::OverForecast,
            Band::Within => AlertStatus::NoAlert,
        }
    }
}

/// Result of scanning a sequence: the band of the first qualifying run and
/// the offset where it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceMatch {
    pub band: Band,
    pub index: Option<usize>,
}

impl SequenceMatch {
    fn within() -> Self {
        Self {
            band: Band::Within,
            index: None,
        }
    }
}

/// `value <= low` is Under, `value >= high` is Over.
pub fn classify_instant(value: f64, low: f64, high: f64) -> Band {
    if value <= low {
        Band::Under
    } else if value >= high {
        Band::Over
    } else {
        Band::Within
    }
}

/// Finds the first `run_length` consecutive values that are all strictly
/// below `low` or all strictly above `high`.
///
/// The run must fit inside `values`. At each offset the Under run is checked
/// before the Over run.
///
/// # Examples
///
/// ```
/// use printwatch_alert::threshold::{classify_sequence, Band};
///
/// let m = classify_sequence(&[50.1, 50.0, 44.0, 43.5, 43.0], 45.0, 55.0, 3);
/// assert_eq!(m.band, Band::Under);
/// assert_eq!(m.index, Some(2));
/// ```
pub fn classify_sequence(values: &[f64], low: f64, high: f64, run_length: usize) -> SequenceMatch {
    let run_length = run_length.max(1);
    if values.len() < run_length {
        return SequenceMatch::within();
    }

    for (i, run) in values.windows(run_length).enumerate() {
        if run.iter().all(|v| *v < low) {
            return SequenceMatch {
                band: Band::Under,
                index: Some(i),
            };
        }
        if run.iter().all(|v| *v > high) {
            return SequenceMatch {
                band: Band::Over,
                index: Some(i),
            };
        }
    }

    SequenceMatch::within()
}

/// A parameter's band together with the forecast run length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdEvaluator {
    threshold: Threshold,
    run_length: usize,
}

impl ThresholdEvaluator {
    pub fn new(threshold: Threshold, run_length: usize) -> Self {
        Self {
            threshold,
            run_length,
        }
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    pub fn classify_instant(&self, value: f64) -> Band {
        classify_instant(value, self.threshold.low, self.threshold.high)
    }

    pub fn classify_sequence(&self, values: &[f64]) -> SequenceMatch {
        classify_sequence(
            values,
            self.threshold.low,
            self.threshold.high,
            self.run_length,
        )
    }
}
