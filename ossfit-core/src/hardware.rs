use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use sysinfo::{Disks, System};

use crate::error::{FitError, Result};
use crate::models::{Catalog, NO_GPU_ID, normalize_gpu_id};

/// What the user plans to do with the model. Not used in scoring yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageProfile {
    Chat,
    Development,
    Research,
    Production,
    Other(String),
}

impl UsageProfile {
    pub fn label(&self) -> &str {
        match self {
            UsageProfile::Chat => "chat",
            UsageProfile::Development => "development",
            UsageProfile::Research => "research",
            UsageProfile::Production => "production",
            UsageProfile::Other(label) => label,
        }
    }

    /// Parse a form label. Blank input falls back to `Chat`, the form's default option.
    pub fn from_label(raw: &str) -> Self {
        let label = raw.trim().to_lowercase();
        match label.as_str() {
            "" | "chat" | "assistant" => UsageProfile::Chat,
            "dev" | "development" | "coding" | "code" => UsageProfile::Development,
            "research" | "experimentation" => UsageProfile::Research,
            "prod" | "production" | "serving" => UsageProfile::Production,
            _ => UsageProfile::Other(label),
        }
    }
}

impl fmt::Display for UsageProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for UsageProfile {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Raw values as submitted by the hardware form.
#[derive(Debug, Clone, Default)]
pub struct HardwareForm {
    pub memory: String,
    pub gpu: String,
    pub storage: String,
    pub usage: String,
}

/// A validated hardware profile. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HardwareInput {
    pub memory_gb: u32,
    pub gpu_id: String,
    pub storage_gb: u32,
    pub usage: UsageProfile,
}

impl HardwareInput {
    pub fn new(memory_gb: u32, gpu_id: &str, storage_gb: u32, usage: UsageProfile) -> Self {
        HardwareInput {
            memory_gb,
            gpu_id: normalize_gpu_id(gpu_id),
            storage_gb,
            usage,
        }
    }

    /// Validate a submitted form. Numeric fields are never coerced: anything
    /// that is not a whole number of GB is a validation error.
    pub fn from_form(form: &HardwareForm) -> Result<Self> {
        let memory_gb = parse_whole_gb("memory", &form.memory)?;
        let storage_gb = parse_whole_gb("storage", &form.storage)?;

        let gpu_id = form.gpu.trim();
        if gpu_id.is_empty() {
            return Err(FitError::validation(
                "gpu",
                &form.gpu,
                format!("select a GPU (use '{NO_GPU_ID}' for none)"),
            ));
        }

        Ok(Self::new(
            memory_gb,
            gpu_id,
            storage_gb,
            UsageProfile::from_label(&form.usage),
        ))
    }

    pub fn has_gpu(&self) -> bool {
        self.gpu_id != NO_GPU_ID
    }
}

/// Parse a human-readable size into whole gigabytes.
/// Accepts "32", "32G", "32GB", "32GiB" and "2T"/"2TB" (x1024).
/// Returns `None` if the input is malformed or not a whole number of GB.
pub fn parse_size_gb(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let num_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num_str, suffix) = s.split_at(num_end);
    let value: u32 = num_str.parse().ok()?;

    let suffix = suffix.trim().to_lowercase();
    match suffix.as_str() {
        "" | "g" | "gb" | "gib" => Some(value),
        "t" | "tb" | "tib" => value.checked_mul(1024),
        _ => None,
    }
}

fn parse_whole_gb(field: &'static str, raw: &str) -> Result<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FitError::validation(field, raw, "a value is required"));
    }
    if trimmed.starts_with('-') {
        return Err(FitError::validation(field, raw, "must not be negative"));
    }
    parse_size_gb(trimmed).ok_or_else(|| {
        FitError::validation(field, raw, "expected a whole number of GB (e.g. 32, 32GB, 1TB)")
    })
}

/// A GPU found on the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedGpu {
    pub name: String,
    pub vram_gb: Option<f64>,
    pub count: u32,
}

/// What can be read off the local machine to pre-fill the hardware form.
#[derive(Debug, Clone, Serialize)]
pub struct HostSpecs {
    pub total_memory_gb: u32,
    pub cpu_name: String,
    pub cpu_cores: usize,
    /// Free space on the largest mounted disk.
    pub free_storage_gb: u32,
    pub gpus: Vec<DetectedGpu>,
}

impl HostSpecs {
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_gb = bytes_to_gb(sys.total_memory());
        let cpu_cores = sys.cpus().len();
        let cpu_name = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "Unknown CPU".to_string());

        let disks = Disks::new_with_refreshed_list();
        let free_storage_gb = disks
            .list()
            .iter()
            .max_by_key(|d| d.total_space())
            .map(|d| bytes_to_gb(d.available_space()))
            .unwrap_or(0);

        let gpus = Self::detect_nvidia_gpus();
        tracing::debug!(
            total_memory_gb,
            free_storage_gb,
            gpus = gpus.len(),
            "detected host hardware"
        );

        HostSpecs {
            total_memory_gb,
            cpu_name,
            cpu_cores,
            free_storage_gb,
            gpus,
        }
    }

    fn detect_nvidia_gpus() -> Vec<DetectedGpu> {
        let output = match std::process::Command::new("nvidia-smi")
            .arg("--query-gpu=memory.total,name")
            .arg("--format=csv,noheader,nounits")
            .output()
        {
            Ok(o) if o.status.success() => o,
            _ => return Vec::new(),
        };

        let text = match String::from_utf8(output.stdout) {
            Ok(t) => t,
            Err(_) => return Vec::new(),
        };

        Self::parse_nvidia_smi_list(&text)
    }

    /// Parse `nvidia-smi --query-gpu=memory.total,name` output, grouping
    /// identical cards. VRAM stays per card.
    fn parse_nvidia_smi_list(text: &str) -> Vec<DetectedGpu> {
        let mut grouped: BTreeMap<String, (u32, f64)> = BTreeMap::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, ',');
            let vram_mb = parts
                .next()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .unwrap_or(0.0);
            let name = parts
                .next()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .unwrap_or("NVIDIA GPU")
                .to_string();

            let entry = grouped.entry(name).or_insert((0, 0.0));
            entry.0 += 1;
            if vram_mb > entry.1 {
                entry.1 = vram_mb;
            }
        }

        grouped
            .into_iter()
            .map(|(name, (count, vram_mb))| DetectedGpu {
                name,
                vram_gb: (vram_mb > 0.0).then(|| vram_mb / 1024.0),
                count,
            })
            .collect()
    }

    /// Map the first detected GPU onto a catalog id, falling back to `none`.
    /// Matching compares names with spaces, dashes and vendor prefixes removed.
    pub fn suggest_gpu_id(&self, catalog: &Catalog) -> String {
        for gpu in &self.gpus {
            let detected = normalize_gpu_name(&gpu.name);
            let found = catalog.gpus().iter().find(|profile| {
                !profile.is_none()
                    && (detected.contains(&normalize_gpu_name(&profile.id))
                        || detected.contains(&normalize_gpu_name(profile.label())))
            });
            if let Some(profile) = found {
                return profile.id.clone();
            }
            tracing::debug!(gpu = %gpu.name, "detected GPU has no catalog profile");
        }
        NO_GPU_ID.to_string()
    }

    pub fn display(&self) {
        println!("\n=== System Specifications ===");
        println!("CPU: {} ({} cores)", self.cpu_name, self.cpu_cores);
        println!("Total RAM: {} GB", self.total_memory_gb);
        println!("Free storage: {} GB", self.free_storage_gb);

        if self.gpus.is_empty() {
            println!("GPU: Not detected");
        }
        for (i, gpu) in self.gpus.iter().enumerate() {
            let prefix = if self.gpus.len() > 1 {
                format!("GPU {}: ", i + 1)
            } else {
                "GPU: ".to_string()
            };
            let count = if gpu.count > 1 {
                format!(" x{}", gpu.count)
            } else {
                String::new()
            };
            match gpu.vram_gb {
                Some(vram) => println!("{}{}{} ({:.2} GB VRAM)", prefix, gpu.name, count, vram),
                None => println!("{}{}{} (VRAM unknown)", prefix, gpu.name, count),
            }
        }
        println!();
    }
}

fn bytes_to_gb(bytes: u64) -> u32 {
    (bytes as f64 / (1024.0 * 1024.0 * 1024.0)).round() as u32
}

fn normalize_gpu_name(name: &str) -> String {
    name.to_lowercase()
        .replace("nvidia", "")
        .replace("geforce", "")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}
