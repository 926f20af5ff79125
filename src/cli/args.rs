//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::runtime::Mount;

#[derive(Parser, Debug)]
#[command(name = "agentpod")]
#[command(author, version, about = "Build, start and verify a containerized agent workload", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: SubCommand,

    /// Minimum log level (debug, info, warn, error, fatal)
    #[arg(long, global = true, env = "AGENTPOD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Directory for the structured log file
    #[arg(long, global = true, env = "AGENTPOD_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Do not write the structured log file
    #[arg(long, global = true)]
    pub no_log_file: bool,

    /// Suppress console log output (fatal errors are still shown)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Workload instance name
    #[arg(long, global = true, env = "AGENTPOD_NAME", default_value = "agentpod")]
    pub name: String,

    /// Image to build and run
    #[arg(long, global = true, env = "AGENTPOD_IMAGE", default_value = "agentpod:latest")]
    pub image: String,

    /// Container engine command line tool
    #[arg(long, global = true, env = "AGENTPOD_RUNTIME", default_value = "docker")]
    pub runtime: String,

    /// Directory holding the environment descriptor
    #[arg(long, global = true, default_value = ".")]
    pub workdir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum SubCommand {
    /// Validate credentials and build the image
    Build {
        /// AI provider credential (falls back to ANTHROPIC_API_KEY)
        #[arg(long)]
        credential: Option<String>,

        /// Source control token (falls back to GITHUB_TOKEN)
        #[arg(long)]
        github_token: Option<String>,

        /// Search capability key (falls back to SEARCH_API_KEY)
        #[arg(long)]
        search_api_key: Option<String>,

        /// Build context directory
        #[arg(long, default_value = ".")]
        context: PathBuf,

        /// Image tag (defaults to --image)
        #[arg(long)]
        tag: Option<String>,

        /// Build without the layer cache
        #[arg(long)]
        no_cache: bool,

        /// Push the image after a successful build
        #[arg(long)]
        push: bool,

        /// Registry to push to
        #[arg(long, env = "AGENTPOD_REGISTRY")]
        registry: Option<String>,
    },

    /// Start the workload, wait until ready and attach a session
    Start {
        /// Session mode: interactive or diagnostic
        #[arg(long, default_value = "interactive")]
        mode: String,

        /// Command for the interactive session
        #[arg(long, default_value = "claude")]
        command: String,

        /// Shell for diagnostic mode
        #[arg(long, default_value = "bash")]
        shell: String,

        /// Seconds between readiness probes
        #[arg(long, default_value = "2")]
        poll_interval: u64,

        /// Readiness probes before giving up
        #[arg(long, default_value = "30")]
        poll_attempts: u32,

        /// Bind mount HOST:/container/path (repeatable)
        #[arg(long = "mount", value_name = "HOST:CONTAINER")]
        mounts: Vec<Mount>,
    },

    /// Verify an already running workload
    Verify {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Configuration file that must parse as JSON
        #[arg(long)]
        config_path: Option<String>,

        /// Required mount point inside the workload (repeatable)
        #[arg(long = "mount-point", value_name = "PATH")]
        mount_points: Vec<String>,
    },

    /// Stop and remove the workload
    Stop,
}
