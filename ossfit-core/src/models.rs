use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// GPU id used by the hardware form for machines without a dedicated GPU.
pub const NO_GPU_ID: &str = "none";

/// Environment variable that points at a catalog file overriding the embedded one.
pub const CATALOG_ENV: &str = "OSSFIT_CATALOG";

const EMBEDDED_CATALOG_JSON: &str = include_str!("../data/catalog.json");

/// Hardware requirements for one model tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequirement {
    pub id: String,
    pub display_name: String,
    pub min_memory_gb: u32,
    pub recommended_memory_gb: u32,
    pub min_storage_gb: u32,
    pub baseline_cpu_tokens_per_sec: f64,
    /// Tokens/sec on a reference GPU. Informational only; estimates scale
    /// the CPU baseline by the selected GPU's multiplier.
    pub gpu_token_multiplier_base: f64,
    /// Emit an extra "too slow on CPU" recommendation when no GPU is selected.
    #[serde(default)]
    pub warn_if_cpu_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    pub vram_gb: u32,
    pub performance_tier: String,
    pub throughput_multiplier: f64,
}

impl GpuProfile {
    pub fn is_none(&self) -> bool {
        self.id == NO_GPU_ID
    }

    /// Display name, falling back to the id for catalogs that omit it.
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }
}

/// GPU profiles keyed by id.
pub type GpuTable = HashMap<String, GpuProfile>;

/// On-disk shape of a catalog document. Missing lists are caught by
/// validation instead of failing deserialization.
#[derive(Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    models: Vec<ModelRequirement>,
    #[serde(default)]
    gpus: Vec<GpuProfile>,
}

/// The static model and GPU tables. Built once at startup, never mutated.
#[derive(Debug, Clone)]
pub struct Catalog {
    models: Vec<ModelRequirement>,
    gpus: Vec<GpuProfile>,
    gpu_table: GpuTable,
}

impl Catalog {
    /// Build a catalog from in-memory tables, validating them first.
    /// GPU ids are trimmed and lowercased to match `HardwareInput::gpu_id`.
    pub fn new(models: Vec<ModelRequirement>, mut gpus: Vec<GpuProfile>) -> Result<Self> {
        for g in &mut gpus {
            g.id = normalize_gpu_id(&g.id);
        }
        validate_models(&models)?;
        validate_gpus(&gpus)?;

        let gpu_table = gpus.iter().map(|g| (g.id.clone(), g.clone())).collect();
        Ok(Catalog {
            models,
            gpus,
            gpu_table,
        })
    }

    /// The catalog compiled into the binary.
    pub fn embedded() -> Result<Self> {
        Self::from_json_str(EMBEDDED_CATALOG_JSON)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: CatalogDocument = serde_json::from_str(json)
            .map_err(|e| FitError::Configuration(format!("invalid catalog JSON: {e}")))?;
        Self::new(doc.models, doc.gpus)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            FitError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let catalog = Self::from_json_str(&json)?;
        tracing::debug!(
            path = %path.display(),
            models = catalog.models.len(),
            gpus = catalog.gpus.len(),
            "loaded catalog file"
        );
        Ok(catalog)
    }

    /// Resolve the catalog: explicit path, then `OSSFIT_CATALOG`, then embedded.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_path(path);
        }

        match std::env::var(CATALOG_ENV) {
            Ok(raw) if !raw.trim().is_empty() => {
                tracing::debug!("using catalog from {}", CATALOG_ENV);
                Self::from_path(Path::new(raw.trim()))
            }
            _ => Self::embedded(),
        }
    }

    pub fn models(&self) -> &[ModelRequirement] {
        &self.models
    }

    /// GPU profiles in catalog order.
    pub fn gpus(&self) -> &[GpuProfile] {
        &self.gpus
    }

    pub fn gpu_table(&self) -> &GpuTable {
        &self.gpu_table
    }

    pub fn gpu(&self, id: &str) -> Option<&GpuProfile> {
        self.gpu_table.get(&normalize_gpu_id(id))
    }

    pub fn find_models(&self, query: &str) -> Vec<&ModelRequirement> {
        let query_lower = query.to_lowercase();
        self.models
            .iter()
            .filter(|m| {
                m.id.to_lowercase().contains(&query_lower)
                    || m.display_name.to_lowercase().contains(&query_lower)
            })
            .collect()
    }
}

/// Canonical form of a GPU id: trimmed, lowercase.
pub fn normalize_gpu_id(id: &str) -> String {
    id.trim().to_lowercase()
}

fn validate_models(models: &[ModelRequirement]) -> Result<()> {
    if models.is_empty() {
        return Err(FitError::Configuration(
            "catalog has no model requirements".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for m in models {
        if m.id.trim().is_empty() {
            return Err(FitError::Configuration(
                "model requirement with empty id".to_string(),
            ));
        }
        if !seen.insert(m.id.as_str()) {
            return Err(FitError::Configuration(format!(
                "duplicate model id '{}'",
                m.id
            )));
        }
        if m.recommended_memory_gb < m.min_memory_gb {
            return Err(FitError::Configuration(format!(
                "model '{}': recommended memory ({}GB) is below minimum ({}GB)",
                m.id, m.recommended_memory_gb, m.min_memory_gb
            )));
        }
        check_rate(&m.id, "baseline_cpu_tokens_per_sec", m.baseline_cpu_tokens_per_sec)?;
        check_rate(&m.id, "gpu_token_multiplier_base", m.gpu_token_multiplier_base)?;
    }
    Ok(())
}

fn validate_gpus(gpus: &[GpuProfile]) -> Result<()> {
    if gpus.is_empty() {
        return Err(FitError::Configuration("catalog has no GPU profiles".to_string()));
    }

    let mut seen = HashSet::new();
    for g in gpus {
        if g.id.is_empty() {
            return Err(FitError::Configuration("GPU profile with empty id".to_string()));
        }
        if !seen.insert(g.id.as_str()) {
            return Err(FitError::Configuration(format!("duplicate GPU id '{}'", g.id)));
        }
        check_rate(&g.id, "throughput_multiplier", g.throughput_multiplier)?;
    }

    if !seen.contains(NO_GPU_ID) {
        return Err(FitError::Configuration(format!(
            "catalog must define a '{NO_GPU_ID}' GPU profile"
        )));
    }
    Ok(())
}

fn check_rate(id: &str, field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(FitError::Configuration(format!(
            "'{id}': {field} must be a non-negative number, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_model(id: &str, min: u32, rec: u32) -> ModelRequirement {
        ModelRequirement {
            id: id.to_string(),
            display_name: format!("Model {id}"),
            min_memory_gb: min,
            recommended_memory_gb: rec,
            min_storage_gb: 20,
            baseline_cpu_tokens_per_sec: 10.0,
            gpu_token_multiplier_base: 40.0,
            warn_if_cpu_only: false,
        }
    }

    fn test_gpu(id: &str, multiplier: f64) -> GpuProfile {
        GpuProfile {
            id: id.to_string(),
            display_name: String::new(),
            vram_gb: 0,
            performance_tier: "test".to_string(),
            throughput_multiplier: multiplier,
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Embedded catalog
    // ────────────────────────────────────────────────────────────────────

    #[test]
    fn test_embedded_catalog_loads() {
        let catalog = Catalog::embedded().expect("embedded catalog must be valid");
        assert!(!catalog.models().is_empty());
        assert!(catalog.gpu(NO_GPU_ID).is_some());
        assert!(catalog.gpu("rtx4090").is_some());
    }

    #[test]
    fn test_embedded_catalog_flags_largest_tier() {
        let catalog = Catalog::embedded().unwrap();
        let flagged: Vec<_> = catalog
            .models()
            .iter()
            .filter(|m| m.warn_if_cpu_only)
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(flagged, vec!["120b"]);
    }

    #[test]
    fn test_catalog_preserves_table_order() {
        let catalog = Catalog::new(
            vec![test_model("b", 8, 16), test_model("a", 4, 8)],
            vec![test_gpu("none", 1.0)],
        )
        .unwrap();
        let ids: Vec<_> = catalog.models().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    // ────────────────────────────────────────────────────────────────────
    // Validation
    // ────────────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_models_rejected() {
        let err = Catalog::new(vec![], vec![test_gpu("none", 1.0)]).unwrap_err();
        assert!(matches!(err, FitError::Configuration(_)));
    }

    #[test]
    fn test_missing_gpu_list_rejected() {
        let json = r#"{"models": [{"id": "x", "display_name": "X", "min_memory_gb": 1,
            "recommended_memory_gb": 2, "min_storage_gb": 1,
            "baseline_cpu_tokens_per_sec": 1.0, "gpu_token_multiplier_base": 1.0}]}"#;
        let err = Catalog::from_json_str(json).unwrap_err();
        assert_eq!(
            err,
            FitError::Configuration("catalog has no GPU profiles".to_string())
        );
    }

    #[test]
    fn test_missing_none_profile_rejected() {
        let err = Catalog::new(vec![test_model("a", 4, 8)], vec![test_gpu("rtx4090", 8.0)])
            .unwrap_err();
        assert!(err.to_string().contains("'none'"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = Catalog::new(
            vec![test_model("a", 4, 8), test_model("a", 8, 16)],
            vec![test_gpu("none", 1.0)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate model id"));

        let err = Catalog::new(
            vec![test_model("a", 4, 8)],
            vec![test_gpu("none", 1.0), test_gpu("none", 2.0)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate GPU id"));
    }

    #[test]
    fn test_recommended_below_minimum_rejected() {
        let err = Catalog::new(vec![test_model("a", 16, 8)], vec![test_gpu("none", 1.0)])
            .unwrap_err();
        assert!(matches!(err, FitError::Configuration(_)));
    }

    #[test]
    fn test_negative_multiplier_rejected() {
        let err = Catalog::new(
            vec![test_model("a", 4, 8)],
            vec![test_gpu("none", 1.0), test_gpu("bad", -2.0)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("throughput_multiplier"));
    }

    #[test]
    fn test_malformed_json_is_configuration_error() {
        let err = Catalog::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, FitError::Configuration(_)));
    }

    #[test]
    fn test_unreadable_path_is_configuration_error() {
        let err = Catalog::from_path(Path::new("/nonexistent/ossfit/catalog.json")).unwrap_err();
        assert!(matches!(err, FitError::Configuration(_)));
    }

    // ────────────────────────────────────────────────────────────────────
    // Queries
    // ────────────────────────────────────────────────────────────────────

    #[test]
    fn test_find_models_matches_id_and_name() {
        let catalog = Catalog::embedded().unwrap();
        assert_eq!(catalog.find_models("120").len(), 1);
        assert_eq!(catalog.find_models("GPT-OSS").len(), catalog.models().len());
        assert!(catalog.find_models("llama").is_empty());
    }

    #[test]
    fn test_gpu_label_falls_back_to_id() {
        assert_eq!(test_gpu("rtx4090", 8.0).label(), "rtx4090");
    }

    #[test]
    fn test_empty_gpu_id_rejected() {
        let err = Catalog::new(
            vec![test_model("a", 4, 8)],
            vec![test_gpu("none", 1.0), test_gpu("  ", 2.0)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty id"));
    }

    // ────────────────────────────────────────────────────────────────────
    // GPU id normalization
    // ────────────────────────────────────────────────────────────────────

    #[test]
    fn test_mixed_case_gpu_ids_are_selectable() {
        let catalog = Catalog::new(
            vec![test_model("a", 4, 8)],
            vec![test_gpu("None", 1.0), test_gpu(" RTX4090 ", 8.0)],
        )
        .unwrap();
        assert_eq!(catalog.gpus()[1].id, "rtx4090");
        assert!(catalog.gpu("RTX4090").is_some());
        assert!(catalog.gpu("rtx4090").is_some());

        let input = crate::hardware::HardwareInput::new(
            64,
            "RTX4090",
            100,
            crate::hardware::UsageProfile::Chat,
        );
        let report = catalog.assess(&input).expect("GPU id resolves case-insensitively");
        assert_eq!(report.results.len(), 1);
        assert!(report.results[0].performance.is_some());
    }

    #[test]
    fn test_gpu_ids_colliding_after_lowercase_rejected() {
        let err = Catalog::new(
            vec![test_model("a", 4, 8)],
            vec![
                test_gpu("none", 1.0),
                test_gpu("RTX4090", 8.0),
                test_gpu("rtx4090", 8.0),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate GPU id 'rtx4090'"));
    }

    // ────────────────────────────────────────────────────────────────────
    // Catalog resolution order
    // ────────────────────────────────────────────────────────────────────

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    const CUSTOM_CATALOG: &str = r#"{
        "models": [{"id": "custom", "display_name": "Custom", "min_memory_gb": 1,
            "recommended_memory_gb": 2, "min_storage_gb": 1,
            "baseline_cpu_tokens_per_sec": 1.0, "gpu_token_multiplier_base": 1.0}],
        "gpus": [{"id": "none", "vram_gb": 0, "performance_tier": "cpu-only",
            "throughput_multiplier": 1.0}]
    }"#;

    fn write_temp_catalog(name: &str, model_id: &str) -> std::path::PathBuf {
        let json = CUSTOM_CATALOG.replace(r#""id": "custom""#, &format!(r#""id": "{model_id}""#));
        let path = std::env::temp_dir().join(format!(
            "ossfit-catalog-{}-{}.json",
            std::process::id(),
            name
        ));
        std::fs::write(&path, json).unwrap();
        path
    }

    fn with_catalog_env<T>(value: Option<&Path>, f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: every test touching OSSFIT_CATALOG holds ENV_LOCK.
        unsafe {
            match value {
                Some(path) => std::env::set_var(CATALOG_ENV, path),
                None => std::env::remove_var(CATALOG_ENV),
            }
        }
        let result = f();
        unsafe {
            std::env::remove_var(CATALOG_ENV);
        }
        result
    }

    fn model_ids(catalog: &Catalog) -> Vec<&str> {
        catalog.models().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_load_defaults_to_embedded() {
        let catalog = with_catalog_env(None, || Catalog::load(None)).unwrap();
        assert_eq!(model_ids(&catalog), vec!["20b", "120b"]);
    }

    #[test]
    fn test_load_uses_env_catalog() {
        let path = write_temp_catalog("env", "from-env");
        let catalog = with_catalog_env(Some(&path), || Catalog::load(None)).unwrap();
        assert_eq!(model_ids(&catalog), vec!["from-env"]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_env_catalog_is_error() {
        let missing = std::env::temp_dir().join("ossfit-catalog-does-not-exist.json");
        let err = with_catalog_env(Some(&missing), || Catalog::load(None)).unwrap_err();
        assert!(matches!(err, FitError::Configuration(_)));
    }

    #[test]
    fn test_load_explicit_path_overrides_env() {
        let env_path = write_temp_catalog("env-overridden", "from-env");
        let flag_path = write_temp_catalog("flag", "from-flag");
        let catalog =
            with_catalog_env(Some(&env_path), || Catalog::load(Some(&flag_path))).unwrap();
        assert_eq!(model_ids(&catalog), vec!["from-flag"]);
        std::fs::remove_file(&env_path).ok();
        std::fs::remove_file(&flag_path).ok();
    }
}
