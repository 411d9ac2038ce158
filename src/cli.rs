use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "cartload",
    version,
    about = "Incremental product catalog partition and load tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Produce(ProduceArgs),
    Consume(ConsumeArgs),
    Status(StatusArgs),
    Watermark(WatermarkArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ProduceArgs {
    #[arg(long, env = "CARTLOAD_DATA_ROOT", default_value = ".cache/cartload")]
    pub data_root: PathBuf,

    #[arg(long, env = "CARTLOAD_SOURCE_URL")]
    pub source_url: String,

    #[arg(long, env = "CARTLOAD_BUCKET", default_value = "chunks")]
    pub bucket: String,

    #[arg(long, env = "CARTLOAD_CHUNK_CAPACITY", default_value_t = 5000)]
    pub chunk_capacity: usize,

    #[arg(long)]
    pub watermark: Option<String>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ConsumeArgs {
    #[arg(long, env = "CARTLOAD_DATA_ROOT", default_value = ".cache/cartload")]
    pub data_root: PathBuf,

    #[arg(long, env = "CARTLOAD_BUCKET", default_value = "chunks")]
    pub bucket: String,

    #[arg(long)]
    pub key: String,

    #[arg(long, env = "CARTLOAD_DB_PATH")]
    pub db_path: Option<PathBuf>,

    #[arg(long, env = "CARTLOAD_BATCH_SIZE", default_value_t = 100)]
    pub batch_size: usize,

    #[arg(long, value_enum, env = "CARTLOAD_COMPRESSION", default_value_t = CompressionMode::Auto)]
    pub compression: CompressionMode,

    #[arg(long, env = "CARTLOAD_LANG", default_value = "en")]
    pub lang: String,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompressionMode {
    Auto,
    On,
    Off,
}

impl CompressionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, env = "CARTLOAD_DATA_ROOT", default_value = ".cache/cartload")]
    pub data_root: PathBuf,

    #[arg(long, env = "CARTLOAD_DB_PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct WatermarkArgs {
    #[arg(long, env = "CARTLOAD_DATA_ROOT", default_value = ".cache/cartload")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub set: Option<String>,
}
