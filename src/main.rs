#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use modelrt_runtime::{BinaryFormat, InputEncoding, OutputEncoding};

mod commands;

#[derive(Parser)]
#[command(name = "modelrt")]
#[command(about = "ModelRT - run predictions against stored model binaries")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a model binary and run one prediction request
    Predict {
        /// Model binary
        #[arg(long, value_name = "FILE")]
        binary: PathBuf,
        /// PICKLE, JOBLIB, PMML or BOOSTER
        #[arg(long, value_name = "FORMAT")]
        format: BinaryFormat,
        #[arg(long, value_name = "ENCODING", default_value = "AUTO")]
        input_encoding: InputEncoding,
        #[arg(long, value_name = "ENCODING", default_value = "AUTO")]
        output_encoding: OutputEncoding,
        /// Request payload, `-` for stdin
        #[arg(long, value_name = "FILE", default_value = "-")]
        request: String,
        /// Model configuration metadata (JSON) holding the auxiliary info field
        #[arg(long, value_name = "FILE")]
        metadata: Option<PathBuf>,
    },
    /// Report what a model binary declares about itself
    Inspect {
        #[arg(long, value_name = "FILE")]
        binary: PathBuf,
        #[arg(long, value_name = "FORMAT")]
        format: BinaryFormat,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref());
    commands::init_tracing(&config.logging);

    match cli.command {
        Commands::Predict {
            binary,
            format,
            input_encoding,
            output_encoding,
            request,
            metadata,
        } => {
            let args = commands::predict::PredictArgs {
                binary,
                format,
                input_encoding,
                output_encoding,
                request,
                metadata,
            };
            commands::predict::run(config, args).await;
        }
        Commands::Inspect { binary, format } => {
            commands::inspect::run(&binary, format);
        }
    }
}
