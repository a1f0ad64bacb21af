use crate::config::EngineConfig;
use crate::error::ForecastError;
use chrono::Duration;
use printwatch_common::types::{ForecastPoint, Sample};

/// Least-squares quadratic over sample indices.
///
/// Indices are scaled into `[0, 1]` before solving so the normal equations
/// stay well conditioned for long windows; `evaluate` takes the unscaled index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadratic {
    pub c0: f64,
    pub c1: f64,
    pub c2: f64,
    scale: f64,
}

impl Quadratic {
    /// Fits `values[i]` against `x = i`.
    pub fn fit(values: &[f64]) -> Result<Self, ForecastError> {
        let n = values.len();
        if n < 3 {
            return Err(ForecastError::NotEnoughPoints { have: n });
        }
        let scale = (n - 1) as f64;

        // Power sums accumulated in index order so the fit is reproducible.
        let mut sx = [0.0f64; 5];
        let mut sxy = [0.0f64; 3];
        for (i, y) in values.iter().enumerate() {
            let x = i as f64 / scale;
            let mut p = 1.0;
            for k in 0..5 {
                sx[k] += p;
                if k < 3 {
                    sxy[k] += p * y;
                }
                p *= x;
            }
        }

        let mut a = [
            [sx[0], sx[1], sx[2], sxy[0]],
            [sx[1], sx[2], sx[3], sxy[1]],
            [sx[2], sx[3], sx[4], sxy[2]],
        ];
        let [c0, c1, c2] = solve3(&mut a)?;

        Ok(Self { c0, c1, c2, scale })
    }

    pub fn evaluate(&self, index: f64) -> f64 {
        let x = index / self.scale;
        self.c0 + self.c1 * x + self.c2 * x * x
    }
}

/// Gaussian elimination with partial pivoting on an augmented 3x4 matrix.
fn solve3(a: &mut [[f64; 4]; 3]) -> Result<[f64; 3], ForecastError> {
    let norm = a
        .iter()
        .flat_map(|row| row[..3].iter())
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    if !norm.is_finite() || norm == 0.0 {
        return Err(ForecastError::Singular);
    }
    let tolerance = norm * 1e-12;

    for col in 0..3 {
        let pivot_row = (col..3)
            .max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))
            .unwrap_or(col);
        if a[pivot_row][col].abs() <= tolerance {
            return Err(ForecastError::Singular);
        }
        a.swap(col, pivot_row);

        for row in (col + 1)..3 {
            let factor = a[row][col] / a[col][col];
            for k in col..4 {
                a[row][k] -= factor * a[col][k];
            }
        }
    }

    let mut x = [0.0f64; 3];
    for row in (0..3).rev() {
        let tail: f64 = ((row + 1)..3).map(|k| a[row][k] * x[k]).sum();
        x[row] = (a[row][3] - tail) / a[row][row];
    }

    if x.iter().all(|c| c.is_finite()) {
        Ok(x)
    } else {
        Err(ForecastError::Singular)
    }
}

/// Trailing time-based moving average over `(t_i - span, t_i]`.
///
/// Positions with no finite value in their span take the next smoothed value
/// (or the previous one at the tail), so the output always matches the input
/// length.
pub fn smooth(samples: &[Sample], span: Duration) -> Vec<f64> {
    let mut smoothed: Vec<Option<f64>> = Vec::with_capacity(samples.len());
    let mut start = 0;

    for (i, current) in samples.iter().enumerate() {
        let cutoff = current.timestamp - span;
        while start < i && samples[start].timestamp <= cutoff {
            start += 1;
        }
        let (sum, count) = samples[start..=i]
            .iter()
            .filter(|s| s.timestamp > cutoff && s.value.is_finite())
            .fold((0.0, 0usize), |(sum, count), s| (sum + s.value, count + 1));
        smoothed.push((count > 0).then(|| sum / count as f64));
    }

    let mut next = None;
    for slot in smoothed.iter_mut().rev() {
        if let Some(v) = *slot {
            next = Some(v);
        } else {
            *slot = next;
        }
    }
    let mut prev = None;
    smoothed
        .into_iter()
        .map(|slot| {
            let value = slot.or(prev).unwrap_or(f64::NAN);
            prev = Some(value);
            value
        })
        .collect()
}

/// Projects a window forward with a quadratic trend.
pub struct TrendForecaster {
    horizon: usize,
    step: Duration,
    smoothing_span: Option<Duration>,
}

impl TrendForecaster {
    pub fn new(horizon: usize, step: Duration, smoothing_span: Option<Duration>) -> Self {
        Self {
            horizon,
            step,
            smoothing_span,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let smoothing_span = (config.smoothing_span_secs > 0)
            .then(|| Duration::seconds(config.smoothing_span_secs as i64));
        Self::new(
            config.forecast_length,
            Duration::milliseconds(config.forecast_step_ms as i64),
            smoothing_span,
        )
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Fits `window_values` at indices `0..n` and evaluates indices
    /// `n..n + horizon`.
    pub fn fit_and_forecast(
        window_values: &[f64],
        horizon: usize,
    ) -> Result<Vec<f64>, ForecastError> {
        let model = Quadratic::fit(window_values)?;
        let n = window_values.len();
        Ok((n..n + horizon).map(|i| model.evaluate(i as f64)).collect())
    }

    /// Forecast points starting one step after the newest sample.
    pub fn forecast(&self, samples: &[Sample]) -> Result<Vec<ForecastPoint>, ForecastError> {
        let latest = samples
            .last()
            .ok_or(ForecastError::NotEnoughPoints { have: 0 })?
            .timestamp;

        let input = match self.smoothing_span {
            Some(span) => smooth(samples, span),
            None => samples.iter().map(|s| s.value).collect(),
        };

        let values = Self::fit_and_forecast(&input, self.horizon)?;
        Ok(values
            .into_iter()
            .enumerate()
            .map(|(k, value)| ForecastPoint {
                timestamp: latest + self.step * (k as i32 + 1),
                value,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn samples(values: &[f64]) -> Vec<Sample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new("printer-1", "ambient_temperature", at(i as i64), *v))
            .collect()
    }

    #[test]
    fn recovers_exact_quadratic() {
        let f = |x: f64| 2.0 + 0.5 * x - 0.1 * x * x;
        let values: Vec<f64> = (0..10).map(|i| f(i as f64)).collect();

        let forecast = TrendForecaster::fit_and_forecast(&values, 5).unwrap();
        assert_eq!(forecast.len(), 5);
        for (k, v) in forecast.iter().enumerate() {
            let expected = f((10 + k) as f64);
            assert!((v - expected).abs() < 1e-9, "{v} vs {expected}");
        }
    }

    #[test]
    fn continues_a_line() {
        let values = [50.0, 49.0, 48.0, 47.0];
        let forecast = TrendForecaster::fit_and_forecast(&values, 3).unwrap();
        let expected = [46.0, 45.0, 44.0];
        for (v, e) in forecast.iter().zip(expected) {
            assert!((v - e).abs() < 1e-9);
        }
    }

    #[test]
    fn constant_series_stays_flat() {
        let forecast = TrendForecaster::fit_and_forecast(&[50.0; 8], 4).unwrap();
        assert!(forecast.iter().all(|v| (v - 50.0).abs() < 1e-9));
    }

    #[test]
    fn fewer_than_three_points_fails() {
        let err = TrendForecaster::fit_and_forecast(&[1.0, 2.0], 3).unwrap_err();
        assert_eq!(err, ForecastError::NotEnoughPoints { have: 2 });
    }

    #[test]
    fn non_finite_input_is_singular() {
        let err = TrendForecaster::fit_and_forecast(&[1.0, f64::NAN, 2.0], 3).unwrap_err();
        assert_eq!(err, ForecastError::Singular);
    }

    #[test]
    fn fit_is_deterministic() {
        let values: Vec<f64> = (0..50).map(|i| 50.0 + (i as f64 * 0.37).sin()).collect();
        let a = TrendForecaster::fit_and_forecast(&values, 10).unwrap();
        let b = TrendForecaster::fit_and_forecast(&values, 10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn forecast_points_step_forward_from_latest() {
        let forecaster = TrendForecaster::new(5, Duration::seconds(2), None);
        let window = samples(&[50.0, 50.5, 51.0, 51.5]);

        let points = forecaster.forecast(&window).unwrap();
        assert_eq!(points.len(), 5);
        assert_eq!(points[0].timestamp, at(3) + Duration::seconds(2));
        for pair in points.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, Duration::seconds(2));
        }
    }

    #[test]
    fn smoothing_averages_trailing_span() {
        let window = samples(&[10.0, 20.0, 30.0, 40.0]);
        // 2s span at 1s spacing covers (t-2, t]: the point and its predecessor.
        let smoothed = smooth(&window, Duration::seconds(2));
        assert_eq!(smoothed, vec![10.0, 15.0, 25.0, 35.0]);
    }

    #[test]
    fn smoothing_backfills_leading_gaps() {
        let window = samples(&[f64::NAN, 20.0, 30.0]);
        let smoothed = smooth(&window, Duration::milliseconds(500));
        assert_eq!(smoothed, vec![20.0, 20.0, 30.0]);
    }

    #[test]
    fn smoothed_forecast_uses_whole_window() {
        let forecaster = TrendForecaster::new(3, Duration::seconds(1), Some(Duration::seconds(36)));
        let window = samples(&[50.0; 10]);
        let points = forecaster.forecast(&window).unwrap();
        assert!(points.iter().all(|p| (p.value - 50.0).abs() < 1e-9));
    }
}
