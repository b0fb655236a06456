use colored::*;
use ossfit_core::fit::{AssessmentReport, CompatibilityResult, CompatibilityStatus};
use ossfit_core::hardware::HostSpecs;
use ossfit_core::models::{GpuProfile, ModelRequirement};
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Model")]
    name: String,
    #[tabled(rename = "tok/s")]
    tps: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "GPU Tier")]
    tier: String,
    #[tabled(rename = "Issues")]
    issues: String,
}

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Model")]
    name: String,
    #[tabled(rename = "Min RAM")]
    min_memory: String,
    #[tabled(rename = "Rec. RAM")]
    recommended_memory: String,
    #[tabled(rename = "Storage")]
    storage: String,
    #[tabled(rename = "CPU tok/s")]
    cpu_tps: String,
    #[tabled(rename = "GPU tok/s")]
    gpu_tps: String,
}

#[derive(Tabled)]
struct GpuRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "GPU")]
    name: String,
    #[tabled(rename = "VRAM")]
    vram: String,
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Speedup")]
    multiplier: String,
}

pub fn display_report(report: &AssessmentReport, gpu_label: &str) {
    let input = &report.input;
    println!("\n{}", "=== Hardware Profile ===".bold().cyan());
    println!("Memory: {} GB", input.memory_gb);
    println!("GPU: {}", gpu_label);
    println!("Storage: {} GB", input.storage_gb);
    println!("Usage: {}", input.usage);

    if report.results.is_empty() {
        println!("\n{}", "No models to assess.".yellow());
        return;
    }

    println!(
        "\n{}",
        "=== Compatibility Assessment Results ===".bold().cyan()
    );
    println!(
        "{} of {} model(s) can run on this hardware\n",
        report.compatible_count(),
        report.results.len()
    );

    let rows: Vec<ResultRow> = report
        .results
        .iter()
        .map(|r| ResultRow {
            status: format!("{} {}", r.status_emoji(), r.status_text()),
            name: r.display_name.clone(),
            tps: r
                .performance
                .as_ref()
                .map(|p| format!("~{}", p.tokens_per_second))
                .unwrap_or_else(|| "-".to_string()),
            mode: r
                .performance
                .as_ref()
                .map(|p| if p.gpu_accelerated { "GPU" } else { "CPU" }.to_string())
                .unwrap_or_else(|| "-".to_string()),
            tier: r
                .performance
                .as_ref()
                .map(|p| p.gpu_tier.clone())
                .unwrap_or_else(|| "-".to_string()),
            issues: r.reasons.len().to_string(),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);

    for result in &report.results {
        display_result_detail(result);
    }

    if let Some(best) = report.best_result() {
        println!(
            "{} {}",
            "Best pick:".bold().green(),
            best.display_name.bold()
        );
        println!();
    }
}

fn display_result_detail(result: &CompatibilityResult) {
    let status_color = match result.status {
        CompatibilityStatus::Compatible => "green",
        CompatibilityStatus::Limited => "yellow",
        CompatibilityStatus::Incompatible => "red",
    };

    println!(
        "\n{} {}",
        format!("=== {} ===", result.display_name).bold().cyan(),
        result.status_text().color(status_color)
    );

    if let Some(perf) = &result.performance {
        println!(
            "  {}: ~{} tokens/second ({})",
            "Expected Performance".bold(),
            perf.tokens_per_second,
            if perf.gpu_accelerated {
                "GPU accelerated"
            } else {
                "CPU only"
            }
        );
    }

    if !result.reasons.is_empty() {
        let heading = if result.compatible { "Notes" } else { "Issues" };
        println!("  {}: {}", heading.bold(), result.reasons.join(", "));
    }

    if !result.recommendations.is_empty() {
        println!("  {}", "Recommendations:".bold().underline());
        for rec in &result.recommendations {
            println!("    - {}", rec);
        }
    }
}

pub fn display_models(models: &[ModelRequirement]) {
    println!("\n{}", "=== Model Requirements ===".bold().cyan());
    println!("Total models: {}\n", models.len());

    let rows: Vec<ModelRow> = models
        .iter()
        .map(|m| ModelRow {
            id: m.id.clone(),
            name: if m.warn_if_cpu_only {
                format!("{} (GPU advised)", m.display_name)
            } else {
                m.display_name.clone()
            },
            min_memory: format!("{} GB", m.min_memory_gb),
            recommended_memory: format!("{} GB", m.recommended_memory_gb),
            storage: format!("{} GB", m.min_storage_gb),
            cpu_tps: format!("{:.1}", m.baseline_cpu_tokens_per_sec),
            gpu_tps: format!("{:.1}", m.gpu_token_multiplier_base),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn display_gpus(gpus: &[GpuProfile]) {
    println!("\n{}", "=== GPU Profiles ===".bold().cyan());
    println!("Total profiles: {}\n", gpus.len());

    let rows: Vec<GpuRow> = gpus
        .iter()
        .map(|g| GpuRow {
            id: g.id.clone(),
            name: g.label().to_string(),
            vram: if g.vram_gb > 0 {
                format!("{} GB", g.vram_gb)
            } else {
                "-".to_string()
            },
            tier: g.performance_tier.clone(),
            multiplier: format!("x{:.1}", g.throughput_multiplier),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn display_precache(origin: &str, version_tag: &str, cached: &[String]) {
    println!("\n{}", "=== Offline Cache ===".bold().cyan());
    println!("Origin: {}", origin);
    println!("Cache: {}", version_tag);
    println!("Cached {} asset(s):", cached.len());
    for path in cached {
        println!("  {} {}", "✓".green(), path);
    }
    println!();
}

// ────────────────────────────────────────────────────────────────────
// JSON output for machine consumption
// ────────────────────────────────────────────────────────────────────

pub fn display_json_report(report: &AssessmentReport) -> anyhow::Result<()> {
    print_json(&serde_json::json!({ "report": report }))
}

pub fn display_json_models(models: &[ModelRequirement]) -> anyhow::Result<()> {
    print_json(&serde_json::json!({ "models": models }))
}

pub fn display_json_gpus(gpus: &[GpuProfile]) -> anyhow::Result<()> {
    print_json(&serde_json::json!({ "gpus": gpus }))
}

pub fn display_json_system(specs: &HostSpecs) -> anyhow::Result<()> {
    print_json(&serde_json::json!({ "system": specs }))
}

pub fn display_json_precache(
    origin: &str,
    version_tag: &str,
    cached: &[String],
) -> anyhow::Result<()> {
    print_json(&serde_json::json!({
        "origin": origin,
        "cache": version_tag,
        "cached": cached,
    }))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
