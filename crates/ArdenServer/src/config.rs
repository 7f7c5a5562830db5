//! Server configuration.
//!
//! Every option is settable as a command-line argument or an environment
//! variable; `SNOMEDCT_BASE_URL` keeps the name deployments already use for
//! the terminology server.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "arden-server",
    about = "CDS-Hooks rule-evaluation service",
    version
)]
pub struct ServerConfig {
    /// Host to bind
    #[arg(long, env = "ARDEN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind
    #[arg(long, env = "ARDEN_PORT", default_value_t = 8330)]
    pub port: u16,

    /// Directory holding services.json and per-service document files
    #[arg(long, env = "ARDEN_SPEC_DIR", default_value = "specs")]
    pub spec_dir: PathBuf,

    /// Base URL of the FHIR terminology server
    #[arg(long, env = "SNOMEDCT_BASE_URL")]
    pub terminology_url: String,

    /// TTL for cached terminology responses, in seconds
    #[arg(long, env = "ARDEN_CACHE_TTL", default_value_t = 3600)]
    pub cache_ttl_secs: u64,

    /// Log filter when RUST_LOG is unset (e.g. `info`, `arden_engine=debug`)
    #[arg(long, env = "ARDEN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
