use serde::Serialize;

use crate::error::{FitError, Result};
use crate::hardware::HardwareInput;
use crate::models::{Catalog, GpuProfile, GpuTable, ModelRequirement};

/// How well a hardware profile meets a model's requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityStatus {
    Compatible,   // Recommended memory met
    Limited,      // Minimum memory met, below recommended
    Incompatible, // Memory or storage below minimum
}

impl CompatibilityStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CompatibilityStatus::Compatible => "compatible",
            CompatibilityStatus::Limited => "limited",
            CompatibilityStatus::Incompatible => "incompatible",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceEstimate {
    pub tokens_per_second: u32,
    pub gpu_accelerated: bool,
    pub gpu_tier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompatibilityResult {
    pub model_id: String,
    pub display_name: String,
    pub compatible: bool,
    pub status: CompatibilityStatus,
    pub reasons: Vec<String>,
    pub recommendations: Vec<String>,
    /// Present if and only if `compatible`.
    pub performance: Option<PerformanceEstimate>,
}

impl CompatibilityResult {
    pub fn status_emoji(&self) -> &str {
        match self.status {
            CompatibilityStatus::Compatible => "🟢",
            CompatibilityStatus::Limited => "🟡",
            CompatibilityStatus::Incompatible => "🔴",
        }
    }

    pub fn status_text(&self) -> &str {
        match self.status {
            CompatibilityStatus::Compatible => "Compatible",
            CompatibilityStatus::Limited => "Limited",
            CompatibilityStatus::Incompatible => "Incompatible",
        }
    }

    pub fn tokens_per_second(&self) -> Option<u32> {
        self.performance.as_ref().map(|p| p.tokens_per_second)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentReport {
    /// One result per model requirement, in table order.
    pub results: Vec<CompatibilityResult>,
    pub input: HardwareInput,
}

impl AssessmentReport {
    pub fn compatible_count(&self) -> usize {
        self.results.iter().filter(|r| r.compatible).count()
    }

    /// The runnable model with the highest estimated throughput.
    /// Ties go to the earlier model in table order.
    pub fn best_result(&self) -> Option<&CompatibilityResult> {
        self.results
            .iter()
            .filter(|r| r.compatible)
            .fold(None, |best: Option<&CompatibilityResult>, r| match best {
                Some(b) if b.tokens_per_second() >= r.tokens_per_second() => Some(b),
                _ => Some(r),
            })
    }
}

/// Assess `input` against every model requirement.
///
/// Fails with [`FitError::Lookup`] before assessing anything if the selected
/// GPU is not in `gpus`. An empty `models` slice gives an empty report.
pub fn evaluate(
    input: &HardwareInput,
    models: &[ModelRequirement],
    gpus: &GpuTable,
) -> Result<AssessmentReport> {
    let gpu = gpus
        .get(&input.gpu_id)
        .ok_or_else(|| FitError::Lookup(input.gpu_id.clone()))?;

    let results = models.iter().map(|m| assess_model(input, m, gpu)).collect();

    Ok(AssessmentReport {
        results,
        input: input.clone(),
    })
}

impl Catalog {
    pub fn assess(&self, input: &HardwareInput) -> Result<AssessmentReport> {
        evaluate(input, self.models(), self.gpu_table())
    }
}

fn assess_model(
    input: &HardwareInput,
    model: &ModelRequirement,
    gpu: &GpuProfile,
) -> CompatibilityResult {
    let mut reasons = Vec::new();
    let mut recommendations = Vec::new();

    // Step 1: memory decides the tier
    let (mut compatible, mut status) = if input.memory_gb >= model.min_memory_gb {
        if input.memory_gb >= model.recommended_memory_gb {
            (true, CompatibilityStatus::Compatible)
        } else {
            reasons.push(format!(
                "Memory is below recommended ({}GB)",
                model.recommended_memory_gb
            ));
            recommendations.push("Consider upgrading memory for better performance".to_string());
            (true, CompatibilityStatus::Limited)
        }
    } else {
        reasons.push(format!(
            "Insufficient memory (minimum {}GB required)",
            model.min_memory_gb
        ));
        recommendations.push(format!(
            "Upgrade to at least {}GB of memory",
            model.min_memory_gb
        ));
        (false, CompatibilityStatus::Incompatible)
    };

    // Step 2: storage can veto a memory-compatible result
    if input.storage_gb < model.min_storage_gb {
        compatible = false;
        status = CompatibilityStatus::Incompatible;
        reasons.push(format!(
            "Insufficient storage ({}GB required)",
            model.min_storage_gb
        ));
        recommendations.push(format!(
            "Free up at least {}GB of storage space",
            model.min_storage_gb
        ));
    }

    // Step 3: throughput only for runnable models
    let performance = if compatible {
        let gpu_accelerated = input.has_gpu();
        if !gpu_accelerated {
            recommendations
                .push("Consider adding a GPU for significantly better performance".to_string());
            if model.warn_if_cpu_only {
                recommendations.push(format!(
                    "{} is very slow on CPU-only hardware - consider a smaller model instead",
                    model.display_name
                ));
            }
        }
        Some(PerformanceEstimate {
            tokens_per_second: estimate_tokens_per_second(
                model.baseline_cpu_tokens_per_sec,
                gpu.throughput_multiplier,
            ),
            gpu_accelerated,
            gpu_tier: gpu.performance_tier.clone(),
        })
    } else {
        None
    };

    CompatibilityResult {
        model_id: model.id.clone(),
        display_name: model.display_name.clone(),
        compatible,
        status,
        reasons,
        recommendations,
        performance,
    }
}

/// Baseline CPU rate scaled by the GPU multiplier, rounded half away from zero.
fn estimate_tokens_per_second(baseline: f64, multiplier: f64) -> u32 {
    let tps = (baseline * multiplier).round();
    if tps.is_finite() && tps > 0.0 {
        tps.min(u32::MAX as f64) as u32
    } else {
        0
    }
}
