//! Binary formats and the input/output encodings an endpoint declares

use serde::{Deserialize, Serialize};

/// Serialization scheme of a stored model binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BinaryFormat {
    /// Plain pickle object graph
    Pickle,
    /// Joblib dump, optionally zlib/gzip compressed
    Joblib,
    /// PMML document
    Pmml,
    /// Gradient-boosting Booster buffer
    #[serde(alias = "BST")]
    Booster,
}

impl BinaryFormat {
    pub const ALL: [BinaryFormat; 4] = [
        BinaryFormat::Pickle,
        BinaryFormat::Joblib,
        BinaryFormat::Pmml,
        BinaryFormat::Booster,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryFormat::Pickle => "PICKLE",
            BinaryFormat::Joblib => "JOBLIB",
            BinaryFormat::Pmml => "PMML",
            BinaryFormat::Booster => "BOOSTER",
        }
    }
}

impl std::fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BinaryFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PICKLE" | "PKL" => Ok(BinaryFormat::Pickle),
            "JOBLIB" => Ok(BinaryFormat::Joblib),
            "PMML" => Ok(BinaryFormat::Pmml),
            "BOOSTER" | "BST" => Ok(BinaryFormat::Booster),
            other => Err(format!("unknown binary format: {}", other)),
        }
    }
}

/// Representation the model expects its input in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputEncoding {
    /// Decided on the first invocation from the adapter
    #[default]
    Auto,
    List,
    NumpyArray,
    Dataframe,
    Dmatrix,
}

impl std::str::FromStr for InputEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Ok(InputEncoding::Auto),
            "LIST" => Ok(InputEncoding::List),
            "NUMPY_ARRAY" | "NDARRAY" => Ok(InputEncoding::NumpyArray),
            "DATAFRAME" => Ok(InputEncoding::Dataframe),
            "DMATRIX" => Ok(InputEncoding::Dmatrix),
            other => Err(format!("unknown input encoding: {}", other)),
        }
    }
}

/// Representation the model produces its raw result in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputEncoding {
    /// Decided from the runtime type of the first raw result
    #[default]
    Auto,
    NumpyArray,
    Dataframe,
    List,
}

impl std::str::FromStr for OutputEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Ok(OutputEncoding::Auto),
            "NUMPY_ARRAY" | "NDARRAY" => Ok(OutputEncoding::NumpyArray),
            "DATAFRAME" => Ok(OutputEncoding::Dataframe),
            "LIST" => Ok(OutputEncoding::List),
            other => Err(format!("unknown output encoding: {}", other)),
        }
    }
}
