//! Prelude for embedding the runtime in a serving process.
//!
//! ```ignore
//! use modelrt_runtime::prelude::*;
//! ```

// Facade and configuration
pub use crate::config::RuntimeConfig;
pub use crate::ModelRuntime;

// Persistence seam
pub use crate::cache::BinaryLookup;
pub use crate::store::InMemoryBinaryStore;

// Extension points
pub use crate::models::{AdapterRegistry, FormatAdapter, ModelHandle, ModelMethod, ObjectEngine};
pub use crate::normalize::{InputNormalizer, ModelInput, OutputNormalizer, RawOutput};

// Request and response
pub use crate::types::{
    BinaryFormat, EndpointId, InputEncoding, OutputEncoding, Parameter, Prediction,
    PredictionRequest, RuntimeError, StoredBinary,
};
