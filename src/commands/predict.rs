//! `modelrt predict` subcommand: one request against a model binary

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use modelrt_runtime::{
    BinaryFormat, EndpointId, InMemoryBinaryStore, InputEncoding, ModelRuntime, OutputEncoding,
    PredictionRequest, RuntimeConfig, RuntimeError, StoredBinary,
};

use super::{fail, print_json, read_file};

/// Endpoint id the single CLI binary is stored under
const CLI_ENDPOINT: EndpointId = EndpointId(0);

pub struct PredictArgs {
    pub binary: PathBuf,
    pub format: BinaryFormat,
    pub input_encoding: InputEncoding,
    pub output_encoding: OutputEncoding,
    pub request: String,
    pub metadata: Option<PathBuf>,
}

pub async fn run(config: RuntimeConfig, args: PredictArgs) {
    let metadata = args.metadata.as_deref().map(|path| {
        serde_json::from_slice::<serde_json::Value>(&read_file(path)).unwrap_or_else(|e| {
            fail(&RuntimeError::Internal(format!(
                "metadata is not valid JSON: {}",
                e
            )))
        })
    });

    let stored = StoredBinary::new(read_file(&args.binary), args.format)
        .with_encodings(args.input_encoding, args.output_encoding)
        .with_metadata(metadata.as_ref(), &config.executor.info_field);

    let store = Arc::new(InMemoryBinaryStore::new());
    store.insert(CLI_ENDPOINT, stored);

    let runtime = ModelRuntime::new(config, store).unwrap_or_else(|e| fail(&e));
    let request = read_request(&args.request);

    match runtime.predict(CLI_ENDPOINT, request).await {
        Ok(Some(prediction)) => print_json(&prediction),
        Ok(None) => fail(&RuntimeError::Lookup(format!(
            "no binary stored for endpoint {}",
            CLI_ENDPOINT
        ))),
        Err(e) => fail(&e),
    }
}

fn read_request(source: &str) -> PredictionRequest {
    let payload = if source == "-" {
        let mut buffer = Vec::new();
        if let Err(e) = std::io::stdin().read_to_end(&mut buffer) {
            fail(&RuntimeError::Internal(format!("failed to read stdin: {}", e)));
        }
        buffer
    } else {
        read_file(source.as_ref())
    };

    serde_json::from_slice(&payload).unwrap_or_else(|e| {
        fail(&RuntimeError::TypeMismatch(format!(
            "request is not a parameter list: {}",
            e
        )))
    })
}
