//! Model format adapters
//!
//! This module turns stored model binaries into invocable handles:
//!
//! - [`FormatAdapter`]: loader for one binary serialization format
//! - [`ModelHandle`]: capability-probed, invocable model
//! - [`AdapterRegistry`]: format → adapter lookup used by the executor
//! - Concrete adapters for PICKLE/JOBLIB, BOOSTER, and (feature `pmml`) PMML

pub mod adapter;
pub mod booster;
pub mod estimator;
#[cfg(feature = "pmml")]
pub mod pmml;
pub mod pickle;
pub mod registry;

pub use adapter::{engine_failure, FormatAdapter, ModelHandle, ModelMethod, ModelSignature};
pub use booster::{Booster, BoosterAdapter};
pub use estimator::{LinearEstimator, LinearEstimatorEngine};
#[cfg(feature = "pmml")]
pub use pmml::{PmmlAdapter, PmmlModel};
pub use pickle::{ObjectEngine, PickleAdapter};
pub use registry::AdapterRegistry;
