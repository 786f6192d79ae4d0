//! Step-by-step comparison of an observed scenario against its golden copy.

use log::debug;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::scenario::model::{ProtocolScenario, ScenarioStep};

pub const DEFAULT_TIMING_TOLERANCE: f64 = 0.2;

pub const RECOMMEND_NONE: &str = "no action required";
pub const RECOMMEND_UPDATE: &str = "minor drift, update scenario";
pub const RECOMMEND_INVESTIGATE: &str = "investigate protocol drift";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum DifferenceType {
    DataMismatch,
    TimingDrift,
    StepCountMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketDiff {
    pub step_index: usize,
    pub label: String,
    pub expected_hex: String,
    pub actual_hex: String,
    pub expected_delay_ms: u32,
    pub actual_delay_ms: u32,
    pub difference_type: DifferenceType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_match: bool,
    pub similarity_score: f64,
    pub differences: Vec<PacketDiff>,
    pub recommendation: String,
}

impl ValidationResult {
    pub fn count(&self, difference_type: DifferenceType) -> usize {
        self.differences
            .iter()
            .filter(|diff| diff.difference_type == difference_type)
            .count()
    }
}

/// True when `actual_ms` is within `tolerance` (a fraction) of `golden_ms`.
/// A golden delay of zero always passes.
pub fn is_timing_within_tolerance(actual_ms: u32, golden_ms: u32, tolerance: f64) -> bool {
    if golden_ms == 0 {
        return true;
    }
    let drift = (actual_ms as f64 - golden_ms as f64).abs();
    drift <= golden_ms as f64 * tolerance
}

pub fn validate(actual: &ProtocolScenario, golden: &ProtocolScenario, tolerance: f64) -> ValidationResult {
    let total = actual.steps.len().max(golden.steps.len());
    let mut differences = Vec::new();
    let mut matches = 0usize;

    for index in 0..total {
        let (actual_step, golden_step) = match (actual.steps.get(index), golden.steps.get(index)) {
            (Some(a), Some(g)) => (a, g),
            (a, g) => {
                differences.push(step_count_diff(index, a, g));
                continue;
            }
        };

        let data_match = actual_step.data_hex == golden_step.data_hex;
        let timing_match = is_timing_within_tolerance(actual_step.delay_ms, golden_step.delay_ms, tolerance);
        if data_match && timing_match {
            matches += 1;
            continue;
        }

        differences.push(PacketDiff {
            step_index: index,
            label: actual_step.label.clone(),
            expected_hex: golden_step.data_hex.clone(),
            actual_hex: actual_step.data_hex.clone(),
            expected_delay_ms: golden_step.delay_ms,
            actual_delay_ms: actual_step.delay_ms,
            difference_type: if data_match {
                DifferenceType::TimingDrift
            } else {
                DifferenceType::DataMismatch
            },
        });
    }

    let similarity_score = if total == 0 { 1.0 } else { matches as f64 / total as f64 };
    let recommendation = if differences.is_empty() {
        RECOMMEND_NONE
    } else if similarity_score > 0.9 {
        RECOMMEND_UPDATE
    } else {
        RECOMMEND_INVESTIGATE
    };

    debug!(
        "Validated '{}' against '{}': {}/{} steps match, {} differences",
        actual.name,
        golden.name,
        matches,
        total,
        differences.len()
    );

    ValidationResult {
        is_match: differences.is_empty(),
        similarity_score,
        differences,
        recommendation: recommendation.to_string(),
    }
}

/// Diff for an index only one side has. The present side fills its own
/// columns; the missing side stays empty.
fn step_count_diff(index: usize, actual: Option<&ScenarioStep>, golden: Option<&ScenarioStep>) -> PacketDiff {
    let label = actual
        .or(golden)
        .map(|step| step.label.clone())
        .unwrap_or_default();
    PacketDiff {
        step_index: index,
        label,
        expected_hex: golden.map(|s| s.data_hex.clone()).unwrap_or_default(),
        actual_hex: actual.map(|s| s.data_hex.clone()).unwrap_or_default(),
        expected_delay_ms: golden.map_or(0, |s| s.delay_ms),
        actual_delay_ms: actual.map_or(0, |s| s.delay_ms),
        difference_type: DifferenceType::StepCountMismatch,
    }
}
