use clap::Parser;
use std::path::PathBuf;

/// s3pub - upload files to an S3-compatible store and print their public URLs
#[derive(Parser, Debug)]
#[command(name = "s3pub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Files to upload
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Object key prefix (e.g. xiaohongshu/2026-02-19)
    #[arg(long, env = "S3PUB_PREFIX")]
    pub prefix: Option<String>,

    /// Override the configured bucket
    #[arg(long)]
    pub bucket: Option<String>,

    /// YAML config file (environment variables are used when absent)
    #[arg(long, env = "S3PUB_CONFIG")]
    pub config: Option<String>,

    /// Profile to use from the config file
    #[arg(long, env = "S3PUB_PROFILE")]
    pub profile: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Pretty-print the JSON report
    #[arg(long)]
    pub pretty: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
