//! Rhythm evaluation over a sliding window of clap timestamps.
//!
//! Regularity is judged from the spread of consecutive inter-clap
//! intervals: with at least `min_claps` claps in the window, the population
//! standard deviation of the intervals must stay strictly below
//! `max_std_dev_ms`. Tempo does not matter, only steadiness.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::analysis::clap::ClapEvent;
use crate::config::RhythmConfig;

/// Interval statistics for one window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalStats {
    pub interval_count: usize,
    pub mean_ms: f64,
    pub std_dev_ms: f64,
}

/// Outcome of evaluating the window after a clap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RhythmVerdict {
    pub timestamp_ms: u64,
    /// Claps currently inside the window (including the new one)
    pub clap_count: usize,
    /// `None` when the window held too few claps to judge
    pub stats: Option<IntervalStats>,
    pub is_rhythmic: bool,
}

impl RhythmVerdict {
    /// Whether the window was large enough for statistics
    pub fn is_evaluated(&self) -> bool {
        self.stats.is_some()
    }
}

/// Mean and population standard deviation of consecutive intervals.
///
/// Returns `None` for fewer than two timestamps.
pub fn interval_stats<'a, I>(timestamps: I) -> Option<IntervalStats>
where
    I: IntoIterator<Item = &'a u64>,
{
    let mut previous: Option<u64> = None;
    let mut intervals = Vec::new();
    for &ts in timestamps {
        if let Some(prev) = previous {
            intervals.push(ts.saturating_sub(prev) as f64);
        }
        previous = Some(ts);
    }

    if intervals.is_empty() {
        return None;
    }

    let count = intervals.len() as f64;
    let mean = intervals.iter().sum::<f64>() / count;
    // Divisor is the interval count (population variance)
    let variance = intervals
        .iter()
        .map(|interval| (interval - mean).powi(2))
        .sum::<f64>()
        / count;

    Some(IntervalStats {
        interval_count: intervals.len(),
        mean_ms: mean,
        std_dev_ms: variance.sqrt(),
    })
}

/// Sliding-window rhythm classifier
#[derive(Debug)]
pub struct RhythmEvaluator {
    window: VecDeque<u64>,
    window_ms: u64,
    min_claps: usize,
    max_std_dev_ms: f64,
}

impl RhythmEvaluator {
    pub fn new(config: &RhythmConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(32),
            window_ms: config.window_ms,
            min_claps: config.min_claps.max(2),
            max_std_dev_ms: config.max_std_dev_ms,
        }
    }

    /// Append the clap, evict stale entries, then classify the window.
    ///
    /// Eviction runs before the minimum-count check so claps older than the
    /// window never count toward rhythm.
    pub fn on_clap(&mut self, event: &ClapEvent, now_ms: u64) -> RhythmVerdict {
        self.window.push_back(event.timestamp_ms);
        self.evict(now_ms);

        let clap_count = self.window.len();
        if clap_count < self.min_claps {
            tracing::debug!(
                "[RhythmEvaluator] {} / {} claps in window",
                clap_count,
                self.min_claps
            );
            return RhythmVerdict {
                timestamp_ms: now_ms,
                clap_count,
                stats: None,
                is_rhythmic: false,
            };
        }

        let stats = interval_stats(self.window.iter());
        let is_rhythmic = stats
            .map(|s| s.std_dev_ms < self.max_std_dev_ms)
            .unwrap_or(false);

        if let Some(s) = stats {
            tracing::debug!(
                "[RhythmEvaluator] avg interval {:.0}ms, std dev {:.0}ms over {} claps -> rhythmic={}",
                s.mean_ms,
                s.std_dev_ms,
                clap_count,
                is_rhythmic
            );
        }

        RhythmVerdict {
            timestamp_ms: now_ms,
            clap_count,
            stats,
            is_rhythmic,
        }
    }

    fn evict(&mut self, now_ms: u64) {
        let window_ms = self.window_ms;
        self.window
            .retain(|&ts| now_ms.saturating_sub(ts) < window_ms);
    }

    /// Claps currently retained
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Retained timestamps, oldest first
    pub fn timestamps(&self) -> impl Iterator<Item = u64> + '_ {
        self.window.iter().copied()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clap(timestamp_ms: u64) -> ClapEvent {
        ClapEvent {
            timestamp_ms,
            level: 200.0,
            peak: 200.0,
        }
    }

    fn run(evaluator: &mut RhythmEvaluator, times: &[u64]) -> RhythmVerdict {
        let mut last = None;
        for &t in times {
            last = Some(evaluator.on_clap(&clap(t), t));
        }
        last.expect("at least one clap")
    }

    #[test]
    fn test_even_claps_are_rhythmic() {
        let mut evaluator = RhythmEvaluator::new(&RhythmConfig::default());
        let verdict = run(&mut evaluator, &[0, 500, 1000]);
        assert!(verdict.is_rhythmic);
        let stats = verdict.stats.unwrap();
        assert_eq!(stats.interval_count, 2);
        assert_eq!(stats.mean_ms, 500.0);
        assert_eq!(stats.std_dev_ms, 0.0);
    }

    #[test]
    fn test_uneven_claps_are_not_rhythmic() {
        let mut evaluator = RhythmEvaluator::new(&RhythmConfig::default());
        let verdict = run(&mut evaluator, &[0, 500, 2400]);
        assert!(verdict.is_evaluated());
        assert!(!verdict.is_rhythmic);
        let stats = verdict.stats.unwrap();
        assert_eq!(stats.mean_ms, 1200.0);
        assert_eq!(stats.std_dev_ms, 700.0);
    }

    #[test]
    fn test_two_claps_never_rhythmic() {
        let mut evaluator = RhythmEvaluator::new(&RhythmConfig::default());
        let verdict = run(&mut evaluator, &[0, 500]);
        assert!(!verdict.is_rhythmic);
        assert!(!verdict.is_evaluated());
        assert_eq!(verdict.clap_count, 2);
    }

    #[test]
    fn test_stale_clap_is_evicted_before_count_check() {
        let mut evaluator = RhythmEvaluator::new(&RhythmConfig::default());
        // First clap is exactly 4000ms old when the third arrives
        let verdict = run(&mut evaluator, &[0, 3000, 4000]);
        assert_eq!(verdict.clap_count, 2);
        assert!(!verdict.is_rhythmic);
        assert_eq!(evaluator.timestamps().collect::<Vec<_>>(), vec![3000, 4000]);
    }

    #[test]
    fn test_std_dev_equal_to_limit_is_not_rhythmic() {
        let config = RhythmConfig {
            max_std_dev_ms: 300.0,
            ..RhythmConfig::default()
        };
        let mut evaluator = RhythmEvaluator::new(&config);
        // Intervals 200 and 800: mean 500, std dev exactly 300
        let verdict = run(&mut evaluator, &[0, 200, 1000]);
        assert_eq!(verdict.stats.unwrap().std_dev_ms, 300.0);
        assert!(!verdict.is_rhythmic);

        let mut evaluator = RhythmEvaluator::new(&config);
        // Intervals 201 and 799: std dev 299
        let verdict = run(&mut evaluator, &[0, 201, 1000]);
        assert!(verdict.is_rhythmic);
    }

    #[test]
    fn test_window_keeps_sliding() {
        let mut evaluator = RhythmEvaluator::new(&RhythmConfig::default());
        let times: Vec<u64> = (0..20).map(|i| i * 600).collect();
        let verdict = run(&mut evaluator, &times);
        // 4000 / 600 -> claps at 7800..11400 survive
        assert_eq!(verdict.clap_count, 7);
        assert!(verdict.is_rhythmic);
    }

    #[test]
    fn test_interval_stats_needs_two_points() {
        assert!(interval_stats([0u64; 0].iter()).is_none());
        assert!(interval_stats([5u64].iter()).is_none());
        let stats = interval_stats([0u64, 100].iter()).unwrap();
        assert_eq!(stats.interval_count, 1);
        assert_eq!(stats.std_dev_ms, 0.0);
    }
}
