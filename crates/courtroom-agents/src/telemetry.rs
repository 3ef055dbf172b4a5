//! Structured telemetry for courtroom sequences.
//!
//! Captures per-sequence and per-phase metrics during `courtroom run`.
//! Output sink: an append-only JSONL file (one sequence per line) at the
//! configured `telemetry_path`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use coordination::courtroom::{Phase, PhaseResult, ReplySource};
use coordination::{StreamEvent, Verdict};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Metrics for one phase of a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub agent: Phase,
    pub source: ReplySource,
    /// Length of the final text in characters.
    pub chars: usize,
    /// Delta events seen (0 in blocking mode).
    pub delta_count: u32,
    /// Time from phase start to first delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_delta_ms: Option<u64>,
    /// Wall time of the phase; only measured in streaming mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

/// Metrics for a complete sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceMetrics {
    pub session_id: String,
    pub title: String,
    pub capability: String,
    pub streaming: bool,
    pub phases: Vec<PhaseMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    pub mock_phases: u32,
    pub failed_phases: u32,
    pub elapsed_ms: u64,
    pub timestamp: String,
}

/// Accumulates metrics while a sequence runs.
///
/// In streaming mode feed every event to `observe()`; in blocking mode
/// call `record_results()` once. Then `finalize()`.
pub struct MetricsCollector {
    session_id: String,
    title: String,
    capability: String,
    streaming: bool,
    sequence_start: Instant,
    phase_start: Instant,
    current: Option<PhaseBuilder>,
    phases: Vec<PhaseMetrics>,
    verdict: Option<Verdict>,
    confidence: Option<u8>,
}

/// In-flight state for the current streamed phase.
struct PhaseBuilder {
    agent: Phase,
    delta_count: u32,
    first_delta_ms: Option<u64>,
}

impl MetricsCollector {
    pub fn new(session_id: &str, title: &str, capability: &str, streaming: bool) -> Self {
        let now = Instant::now();
        Self {
            session_id: session_id.to_string(),
            title: title.to_string(),
            capability: capability.to_string(),
            streaming,
            sequence_start: now,
            phase_start: now,
            current: None,
            phases: Vec::new(),
            verdict: None,
            confidence: None,
        }
    }

    /// Record one streamed event.
    pub fn observe(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Delta { agent, .. } => {
                let phase_start = self.phase_start;
                let builder = self.builder_for(*agent);
                builder.delta_count += 1;
                if builder.first_delta_ms.is_none() {
                    builder.first_delta_ms = Some(phase_start.elapsed().as_millis() as u64);
                }
            }
            StreamEvent::Done {
                agent,
                text,
                verdict,
                confidence,
                source,
            } => {
                let builder = self.current.take().filter(|b| b.agent == *agent);
                self.phases.push(PhaseMetrics {
                    agent: *agent,
                    source: *source,
                    chars: text.chars().count(),
                    delta_count: builder.as_ref().map_or(0, |b| b.delta_count),
                    first_delta_ms: builder.and_then(|b| b.first_delta_ms),
                    elapsed_ms: Some(self.phase_start.elapsed().as_millis() as u64),
                });
                if verdict.is_some() {
                    self.verdict = *verdict;
                    self.confidence = *confidence;
                }
                self.phase_start = Instant::now();
            }
            StreamEvent::Error { .. } => {
                self.current = None;
            }
        }
    }

    /// Record blocking-mode results.
    pub fn record_results(&mut self, results: &[PhaseResult]) {
        for result in results {
            self.phases.push(PhaseMetrics {
                agent: result.agent,
                source: result.source,
                chars: result.text.chars().count(),
                delta_count: 0,
                first_delta_ms: None,
                elapsed_ms: None,
            });
            if result.verdict.is_some() {
                self.verdict = result.verdict;
                self.confidence = result.confidence;
            }
        }
    }

    fn builder_for(&mut self, agent: Phase) -> &mut PhaseBuilder {
        if self.current.as_ref().map(|b| b.agent) != Some(agent) {
            self.current = None;
        }
        self.current.get_or_insert_with(|| PhaseBuilder {
            agent,
            delta_count: 0,
            first_delta_ms: None,
        })
    }

    pub fn finalize(self) -> SequenceMetrics {
        let count = |source: ReplySource| {
            self.phases.iter().filter(|p| p.source == source).count() as u32
        };
        let mock_phases = count(ReplySource::Mock);
        let failed_phases = count(ReplySource::Failed);

        SequenceMetrics {
            session_id: self.session_id,
            title: self.title,
            capability: self.capability,
            streaming: self.streaming,
            elapsed_ms: self.sequence_start.elapsed().as_millis() as u64,
            phases: self.phases,
            verdict: self.verdict,
            confidence: self.confidence,
            mock_phases,
            failed_phases,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Append sequence metrics to a JSONL file.
///
/// Each line is a complete JSON object for easy streaming analysis.
pub fn append_telemetry(metrics: &SequenceMetrics, path: &Path) {
    match serde_json::to_string(metrics) {
        Ok(json) => {
            use std::io::Write;
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!("Failed to append telemetry: {e}");
                    } else {
                        info!(path = %path.display(), "Appended sequence telemetry");
                    }
                }
                Err(e) => warn!("Failed to open telemetry file: {e}"),
            }
        }
        Err(e) => warn!("Failed to serialize telemetry: {e}"),
    }
}

/// Aggregate view over many recorded sequences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateAnalytics {
    pub total_sequences: usize,
    /// Count per verdict label; `"none"` for unparsed jury output.
    pub verdicts: BTreeMap<String, usize>,
    /// Fraction of phases served by mock text.
    pub mock_rate: f64,
    /// Fraction of phases that ended in an error marker.
    pub failure_rate: f64,
    pub mean_elapsed_ms: f64,
}

/// Reads sequence telemetry back from a JSONL file.
pub struct TelemetryReader {
    sequences: Vec<SequenceMetrics>,
}

impl TelemetryReader {
    pub fn read_from_file(path: &Path) -> std::io::Result<Self> {
        use std::fs::File;
        use std::io::{BufRead, BufReader};

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut sequences = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let sequence: SequenceMetrics = serde_json::from_str(&line)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            sequences.push(sequence);
        }

        Ok(Self { sequences })
    }

    pub fn sequences(&self) -> &[SequenceMetrics] {
        &self.sequences
    }

    pub fn aggregate_analytics(&self) -> AggregateAnalytics {
        let total = self.sequences.len();
        let mut verdicts = BTreeMap::new();
        let mut phases = 0usize;
        let mut mock = 0usize;
        let mut failed = 0usize;
        let mut elapsed = 0u64;

        for seq in &self.sequences {
            let label = seq.verdict.map_or("none", Verdict::label);
            *verdicts.entry(label.to_string()).or_insert(0) += 1;
            phases += seq.phases.len();
            mock += seq.mock_phases as usize;
            failed += seq.failed_phases as usize;
            elapsed += seq.elapsed_ms;
        }

        let rate = |n: usize| if phases > 0 { n as f64 / phases as f64 } else { 0.0 };
        AggregateAnalytics {
            total_sequences: total,
            verdicts,
            mock_rate: rate(mock),
            failure_rate: rate(failed),
            mean_elapsed_ms: if total > 0 {
                elapsed as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}
