//! Plain-f64 indicator series. Leading entries that do not have enough
//! history yet are NaN, so callers can take the last finite value.

/// EMA seeded with the SMA of the first `period` values.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;
    let k = 2.0 / (period as f64 + 1.0);
    let mut prev = seed;
    for i in period..values.len() {
        prev = (values[i] - prev) * k + prev;
        out[i] = prev;
    }
    out
}

/// Wilder-smoothed RSI.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let delta = values[i] - values[i - 1];
        if delta >= 0.0 {
            avg_gain += delta;
        } else {
            avg_loss -= delta;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = rsi_from_averages(avg_gain, avg_loss);

    for i in (period + 1)..values.len() {
        let delta = values[i] - values[i - 1];
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = rsi_from_averages(avg_gain, avg_loss);
    }
    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

/// MACD line, signal line and histogram for the (fast, slow, signal) periods.
pub fn macd(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = values.len();
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);

    let mut macd_line = vec![f64::NAN; n];
    for i in 0..n {
        if fast_ema[i].is_finite() && slow_ema[i].is_finite() {
            macd_line[i] = fast_ema[i] - slow_ema[i];
        }
    }

    let mut signal_line = vec![f64::NAN; n];
    let valid_start = macd_line.iter().position(|v| v.is_finite());
    if let Some(start) = valid_start {
        let valid: Vec<f64> = macd_line[start..].to_vec();
        let sig = ema(&valid, signal);
        for (i, v) in sig.into_iter().enumerate() {
            signal_line[start + i] = v;
        }
    }

    let mut histogram = vec![f64::NAN; n];
    for i in 0..n {
        if macd_line[i].is_finite() && signal_line[i].is_finite() {
            histogram[i] = macd_line[i] - signal_line[i];
        }
    }
    (macd_line, signal_line, histogram)
}

/// Bollinger bands: SMA(period) ± 2 population standard deviations.
pub fn bollinger(values: &[f64], period: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = values.len();
    let mut upper = vec![f64::NAN; n];
    let mut middle = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];
    if period == 0 || n < period {
        return (upper, middle, lower);
    }
    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        let sd = var.sqrt();
        middle[i] = mean;
        upper[i] = mean + 2.0 * sd;
        lower[i] = mean - 2.0 * sd;
    }
    (upper, middle, lower)
}

pub fn last_finite(values: &[f64]) -> Option<f64> {
    values.iter().rev().copied().find(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} vs {b}");
    }

    #[test]
    fn ema_seeds_with_sma() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let e = ema(&values, 3);
        assert!(e[0].is_nan() && e[1].is_nan());
        close(e[2], 2.0);
        // k = 0.5: 2.0 -> 3.0 -> 4.0
        close(e[3], 3.0);
        close(e[4], 4.0);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let values: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let r = rsi(&values, 14);
        close(*r.last().unwrap(), 100.0);
        assert!(r[13].is_nan());
        assert!(r[14].is_finite());
    }

    #[test]
    fn rsi_flat_series_has_no_losses() {
        let values = vec![5.0; 20];
        let r = rsi(&values, 14);
        close(*r.last().unwrap(), 100.0);
    }

    #[test]
    fn bollinger_flat_series_collapses() {
        let values = vec![10.0; 25];
        let (u, m, l) = bollinger(&values, 20);
        close(*u.last().unwrap(), 10.0);
        close(*m.last().unwrap(), 10.0);
        close(*l.last().unwrap(), 10.0);
        assert!(u[18].is_nan());
    }

    #[test]
    fn macd_converges_on_constant_series() {
        let values = vec![42.0; 60];
        let (line, signal, hist) = macd(&values, 12, 26, 9);
        close(*line.last().unwrap(), 0.0);
        close(*signal.last().unwrap(), 0.0);
        close(*hist.last().unwrap(), 0.0);
    }

    #[test]
    fn last_finite_skips_nan_tail() {
        let values = [1.0, 2.0, f64::NAN];
        close(last_finite(&values).unwrap(), 2.0);
        assert!(last_finite(&[f64::NAN]).is_none());
    }
}
