//! Average True Range with Wilder smoothing (`alpha = 1 / window`).

use common::Bar;

use super::moving_average::ewm;

/// `max(high - low, |high - prev_close|, |low - prev_close|)`.
/// Row 0 has no previous close and uses `high - low`.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let high_low = bar.high - bar.low;
            match i.checked_sub(1).map(|p| bars[p].close) {
                None => high_low,
                Some(prev_close) => high_low
                    .max((bar.high - prev_close).abs())
                    .max((bar.low - prev_close).abs()),
            }
        })
        .collect()
}

/// Wilder smoothing: an exponential mean with `alpha = 1 / window`.
pub fn wilder(values: &[f64], window: usize) -> Vec<f64> {
    ewm(values, 1.0 / window.max(1) as f64)
}

pub fn atr(bars: &[Bar], window: usize) -> Vec<f64> {
    wilder(&true_range(bars), window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(day: u32, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn true_range_uses_previous_close_gap() {
        let bars = vec![bar(1, 11.0, 9.0, 10.0), bar(2, 16.0, 14.0, 15.0)];
        let tr = true_range(&bars);
        assert_eq!(tr[0], 2.0);
        // gap up: high - prev_close = 6
        assert_eq!(tr[1], 6.0);
    }

    #[test]
    fn atr_smooths_toward_true_range() {
        let bars: Vec<Bar> = (1..=20).map(|d| bar(d, 12.0, 10.0, 11.0)).collect();
        let values = atr(&bars, 14);
        assert!(values.iter().all(|&v| (v - 2.0).abs() < 1e-12));
    }
}
