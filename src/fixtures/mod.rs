//! Fixture utilities for the deterministic CLI harness.
//!
//! This module discovers amplitude trace assets, parses their optional
//! expectations, and replays them offline through the clap detector and
//! rhythm evaluator, without timers, so CI and QA get reproducible
//! reports. It can also synthesize traces for a given tempo.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::alarm::{AlarmMachine, AlarmState};
use crate::analysis::{AmplitudeSample, ClapDetector, ClapEvent, RhythmEvaluator, RhythmVerdict};
use crate::config::AppConfig;
use crate::engine::ScriptedSource;

/// Default location for trace JSON assets.
pub const DEFAULT_FIXTURE_ROOT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures");

/// Fear signal change at a trace-relative time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FearMark {
    pub timestamp_ms: u64,
    pub present: bool,
}

/// Recorded or synthesized amplitude input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmplitudeTrace {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub samples: Vec<AmplitudeSample>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fear: Vec<FearMark>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<TraceExpectations>,
}

impl AmplitudeTrace {
    pub fn from_json(json: &str) -> Result<Self> {
        let mut trace: Self = serde_json::from_str(json).context("parsing amplitude trace")?;
        trace.samples.sort_by_key(|sample| sample.timestamp_ms);
        trace.fear.sort_by_key(|mark| mark.timestamp_ms);
        Ok(trace)
    }

    pub fn duration_ms(&self) -> u64 {
        let last_sample = self.samples.last().map(|s| s.timestamp_ms).unwrap_or(0);
        let last_fear = self.fear.last().map(|m| m.timestamp_ms).unwrap_or(0);
        last_sample.max(last_fear)
    }

    /// Scripted source replaying this trace's samples
    pub fn to_source(&self) -> ScriptedSource {
        ScriptedSource::new(self.samples.clone())
    }
}

/// Expectations embedded in a trace or supplied separately.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceExpectations {
    /// Exact number of detected claps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claps: Option<usize>,
    /// Whether any rhythm verdict was rhythmic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhythmic: Option<bool>,
    /// Number of alarm episodes given the trace's fear marks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_episodes: Option<u64>,
}

impl TraceExpectations {
    pub fn verify(&self, report: &ReplayReport) -> std::result::Result<(), ExpectationDiff> {
        let mut failures = Vec::new();

        if let Some(expected) = self.claps {
            if expected != report.claps.len() {
                failures.push(ExpectationFailure::new("claps", expected, report.claps.len()));
            }
        }
        if let Some(expected) = self.rhythmic {
            if expected != report.rhythmic_detected {
                failures.push(ExpectationFailure::new(
                    "rhythmic",
                    expected,
                    report.rhythmic_detected,
                ));
            }
        }
        if let Some(expected) = self.alarm_episodes {
            if expected != report.alarm_episodes {
                failures.push(ExpectationFailure::new(
                    "alarm_episodes",
                    expected,
                    report.alarm_episodes,
                ));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExpectationDiff { failures })
        }
    }
}

/// Outcome of comparing a replay with expectations.
#[derive(Debug)]
pub struct ExpectationDiff {
    pub failures: Vec<ExpectationFailure>,
}

impl ExpectationDiff {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "failures": self.failures.iter().map(|failure| {
                serde_json::json!({
                    "field": failure.field,
                    "expected": failure.expected,
                    "actual": failure.actual,
                })
            }).collect::<Vec<_>>()
        })
    }
}

/// Single mismatched field
#[derive(Debug)]
pub struct ExpectationFailure {
    pub field: &'static str,
    pub expected: serde_json::Value,
    pub actual: serde_json::Value,
}

impl ExpectationFailure {
    fn new<E: Serialize, A: Serialize>(field: &'static str, expected: E, actual: A) -> Self {
        Self {
            field,
            expected: serde_json::to_value(expected).unwrap_or(serde_json::Value::Null),
            actual: serde_json::to_value(actual).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Result of an offline replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub trace: String,
    pub sample_count: usize,
    pub duration_ms: u64,
    pub claps: Vec<ClapEvent>,
    pub verdicts: Vec<RhythmVerdict>,
    pub rhythmic_detected: bool,
    pub alarm_episodes: u64,
}

/// Catalog responsible for discovering traces on disk.
pub struct FixtureCatalog {
    root: PathBuf,
}

impl FixtureCatalog {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of all `*.json` traces, sorted.
    pub fn discover(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if !self.root.exists() {
            return Ok(names);
        }

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some("json")
            {
                match path.file_stem().and_then(|s| s.to_str()) {
                    Some(stem) if !stem.ends_with(".expect") => names.push(stem.to_string()),
                    _ => {}
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Load a trace by name or path; `override_expect` replaces embedded expectations.
    pub fn load(&self, trace: &str, override_expect: Option<&Path>) -> Result<AmplitudeTrace> {
        let path = self.resolve_trace_path(trace)?;
        let json =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let mut loaded = AmplitudeTrace::from_json(&json)
            .with_context(|| format!("loading trace {}", path.display()))?;

        if let Some(expect_path) = override_expect {
            let json = fs::read_to_string(expect_path)
                .with_context(|| format!("reading expectation {}", expect_path.display()))?;
            loaded.expect = Some(
                serde_json::from_str(&json)
                    .with_context(|| format!("parsing {}", expect_path.display()))?,
            );
        }
        Ok(loaded)
    }

    fn resolve_trace_path(&self, trace: &str) -> Result<PathBuf> {
        let as_path = Path::new(trace);
        if as_path.exists() {
            return Ok(as_path.to_path_buf());
        }

        let candidate = self.root.join(format!("{trace}.json"));
        if candidate.exists() {
            Ok(candidate)
        } else {
            Err(anyhow!(
                "Trace '{trace}' not found in {}",
                self.root.display()
            ))
        }
    }
}

impl Default for FixtureCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_FIXTURE_ROOT)
    }
}

/// Replays traces through detector and evaluator on trace time.
///
/// The rhythmic hold is modelled as an expiry timestamp instead of a timer,
/// and fear marks drive an [`AlarmMachine`] to count episodes.
pub struct TraceReplay {
    config: AppConfig,
}

impl TraceReplay {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, trace: &AmplitudeTrace) -> ReplayReport {
        let mut detector = ClapDetector::new(&self.config.clap);
        let mut evaluator = RhythmEvaluator::new(&self.config.rhythm);
        let mut machine = AlarmMachine::new();
        let hold_ms = self.config.rhythm.flag_hold_ms;

        let mut claps = Vec::new();
        let mut verdicts = Vec::new();
        let mut rhythmic_until: Option<u64> = None;
        let mut episodes = 0u64;
        let mut fear_marks = trace.fear.iter().peekable();

        let mut observe = |transition: Option<crate::alarm::AlarmTransition>| {
            if matches!(transition, Some(t) if t.to == AlarmState::Active) {
                episodes += 1;
            }
        };

        for sample in &trace.samples {
            let now = sample.timestamp_ms;

            while let Some(mark) = fear_marks.next_if(|mark| mark.timestamp_ms <= now) {
                expire_hold(&mut rhythmic_until, mark.timestamp_ms, &mut machine, &mut observe);
                observe(machine.set_fear(mark.present));
            }
            expire_hold(&mut rhythmic_until, now, &mut machine, &mut observe);

            let sample = sample.clamped(self.config.clap.max_level);
            let Some(clap) = detector.on_sample(sample) else {
                continue;
            };
            let verdict = evaluator.on_clap(&clap, now);
            if verdict.is_rhythmic {
                rhythmic_until = Some(now + hold_ms);
                observe(machine.set_rhythmic(true));
            } else if verdict.is_evaluated() {
                rhythmic_until = None;
                observe(machine.set_rhythmic(false));
            }
            claps.push(clap);
            verdicts.push(verdict);
        }

        for mark in fear_marks {
            expire_hold(&mut rhythmic_until, mark.timestamp_ms, &mut machine, &mut observe);
            observe(machine.set_fear(mark.present));
        }

        ReplayReport {
            trace: trace.name.clone(),
            sample_count: trace.samples.len(),
            duration_ms: trace.duration_ms(),
            rhythmic_detected: verdicts.iter().any(|v| v.is_rhythmic),
            claps,
            verdicts,
            alarm_episodes: episodes,
        }
    }
}

fn expire_hold<F>(until: &mut Option<u64>, now: u64, machine: &mut AlarmMachine, observe: &mut F)
where
    F: FnMut(Option<crate::alarm::AlarmTransition>),
{
    if matches!(*until, Some(deadline) if deadline <= now) {
        *until = None;
        observe(machine.set_rhythmic(false));
    }
}

/// Build a clap trace at `bpm` with up to `jitter_ms` of random timing error.
///
/// Quiet background readings every 50ms surround the claps. The same seed
/// always produces the same trace.
pub fn synthesize_claps(bpm: u32, count: usize, jitter_ms: u64, seed: u64) -> AmplitudeTrace {
    let mut rng = StdRng::seed_from_u64(seed);
    let interval_ms = 60_000 / u64::from(bpm.max(1));
    let jitter = jitter_ms as i64;

    let mut samples = Vec::new();
    let mut last_clap = 0u64;
    for i in 0..count as u64 {
        let offset = if jitter > 0 {
            rng.gen_range(-jitter..=jitter)
        } else {
            0
        };
        let t = (jitter_ms + i * interval_ms).saturating_add_signed(offset);
        samples.push(AmplitudeSample::new(rng.gen_range(180.0..240.0), t));
        last_clap = last_clap.max(t);
    }

    let end = last_clap + interval_ms;
    let mut t = 0;
    while t <= end {
        if !samples.iter().any(|s| s.timestamp_ms == t) {
            samples.push(AmplitudeSample::new(rng.gen_range(5.0..60.0), t));
        }
        t += 50;
    }
    samples.sort_by_key(|sample| sample.timestamp_ms);

    AmplitudeTrace {
        name: format!("synthetic_{bpm}bpm_{count}"),
        notes: Some(format!(
            "{count} claps at {bpm} BPM, +/-{jitter_ms}ms jitter, seed {seed}"
        )),
        samples,
        fear: Vec::new(),
        expect: None,
    }
}
