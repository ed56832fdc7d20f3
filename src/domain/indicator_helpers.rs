//! Causal window helpers shared by the indicator modules.
//!
//! Every helper returns a vector the same length as its input. Rows without
//! enough history are NaN, and a NaN input poisons only the windows that
//! contain it.

/// Simple moving average over `period` rows.
///
/// O(n) running sum. Warmup: first (n-1) rows are NaN.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }

    let mut sum = 0.0;
    let mut nan_in_window = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            nan_in_window += 1;
        } else {
            sum += v;
        }
        if i >= period {
            let old = values[i - period];
            if old.is_nan() {
                nan_in_window -= 1;
            } else {
                sum -= old;
            }
        }
        if i + 1 >= period && nan_in_window == 0 {
            out[i] = sum / period as f64;
        }
    }
    out
}

/// Wilder RSI.
///
/// First average gain/loss is the simple mean of the first n changes, then
/// avg = (prev_avg * (n-1) + current) / n. RSI = 100 - 100 / (1 + gain/loss),
/// or 100 when the average loss is zero. Warmup: first n rows are NaN.
/// A NaN close restarts the warmup.
pub fn wilder_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    if period == 0 {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    let mut changes = 0usize;

    for i in 1..closes.len() {
        let change = closes[i] - closes[i - 1];
        if change.is_nan() {
            avg_gain = 0.0;
            avg_loss = 0.0;
            changes = 0;
            continue;
        }
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        changes += 1;

        if changes <= period {
            avg_gain += gain / period as f64;
            avg_loss += loss / period as f64;
            if changes < period {
                continue;
            }
        } else {
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        }

        out[i] = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
        };
    }
    out
}
