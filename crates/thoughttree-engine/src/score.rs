use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SCORE_TAG: Regex = Regex::new(r"<output>\s*(-?\d+)\s*</output>")
        .expect("score tag regex");
}

/// Extract the embedded score tag from an evaluation reply.
///
/// Replies may ramble; the last `<output>N</output>` occurrence wins and
/// everything else is discarded. `None` means the reply is unusable and the
/// call should be retried.
pub fn extract_score_tag(reply: &str) -> Option<i64> {
    SCORE_TAG
        .captures_iter(reply)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

/// Clamp a raw reward sample to [-100, 100] and apply the overscore penalty.
///
/// Samples above 95 get the penalty subtracted once, which keeps the
/// evaluator from pinning everything at the ceiling.
pub fn adjust_sample(raw: i64, overscore_penalty: f64) -> f64 {
    let clamped = raw.clamp(-100, 100) as f64;
    if clamped > 95.0 {
        clamped - overscore_penalty
    } else {
        clamped
    }
}

/// Pessimistic blend of the adjusted reward samples:
/// `0.5 * (min + mean)`. Lies in [min, mean] and collapses to the common
/// value when all samples agree, so one lucky high sample cannot carry a
/// candidate.
pub fn aggregate(samples: &[f64]) -> f64 {
    debug_assert!(!samples.is_empty());
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    0.5 * (min + mean)
}
