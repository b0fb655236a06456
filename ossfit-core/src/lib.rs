pub mod error;
pub mod fit;
pub mod hardware;
pub mod models;
pub mod offline;

// Re-export key types for convenience
pub use error::{FitError, Result};
pub use fit::{
    AssessmentReport, CompatibilityResult, CompatibilityStatus, PerformanceEstimate, evaluate,
};
pub use hardware::{HardwareForm, HardwareInput, HostSpecs, UsageProfile};
pub use models::{Catalog, GpuProfile, GpuTable, ModelRequirement, NO_GPU_ID};
pub use offline::{CacheStorage, MemoryCacheStorage, Network, OfflineCache};
