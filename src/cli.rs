// src/cli.rs
use clap::Parser;

/// ct-pack: compact Certificate Transparency log exporter
///
/// Reads a sequential CT log database and rewrites it as two deduplicated
/// binary files: one holding every submitted certificate with references to
/// its chain, one holding the distinct intermediate certificates.
#[derive(Parser, Debug, Clone)]
#[command(name = "ct-pack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    // ===== Input & Output =====
    /// Path to the source log database
    pub database: String,

    /// Directory to create for the output files (must not already exist)
    pub output_dir: String,

    // ===== Configuration =====
    /// Path to TOML config file
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    // ===== Display & Progress =====
    /// Expected number of entries in the database, used for ETA estimates
    #[arg(long = "expected-total")]
    pub expected_total: Option<u64>,

    /// Emit a progress line every N processed entries
    #[arg(long = "report-interval")]
    pub report_interval: Option<u64>,

    /// Disable the progress bar
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    // ===== Logging =====
    /// Verbose logging (set log level to debug)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet logging (set log level to warn)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

impl Cli {
    /// Validate flag combinations and return errors for invalid usage
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.verbose && self.quiet {
            anyhow::bail!("Cannot specify both --verbose and --quiet");
        }

        if self.report_interval == Some(0) {
            anyhow::bail!("--report-interval must be greater than 0");
        }

        if self.expected_total == Some(0) {
            anyhow::bail!("--expected-total must be greater than 0");
        }

        Ok(())
    }

    /// Determine log level based on verbose/quiet flags
    pub fn log_level(&self) -> Option<&str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("warn")
        } else {
            None
        }
    }

    /// Check if the progress bar should be enabled
    pub fn should_show_progress(&self) -> bool {
        !self.no_progress && is_terminal::is_terminal(std::io::stderr())
    }
}
