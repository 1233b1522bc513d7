mod config;
mod detect_cmd;
mod review_cmd;
mod run_cmd;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use mco_core::engine::{ReviewEngine, ReviewRequest};
use mco_core::report::OutputFormat;

/// Exit code for argument errors, matching clap's own usage errors.
const EXIT_USAGE: u8 = 2;
const EXIT_OK: u8 = 0;

#[derive(Parser)]
#[command(name = "mco", about = "Multi-provider code review orchestrator")]
struct Cli {
    /// Config file path (defaults to $XDG_CONFIG_HOME/mco/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Probe configured providers for presence, version, and auth
    Detect {
        /// Comma-separated provider list (defaults to configured providers)
        #[arg(long)]
        providers: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Dispatch the prompt to each provider and print raw run results
    Run {
        #[command(flatten)]
        task: TaskArgs,
    },
    /// Run a full review: fan out, aggregate findings, decide
    Review {
        #[command(flatten)]
        task: TaskArgs,
    },
}

#[derive(Args)]
struct TaskArgs {
    /// Repository to review (becomes each provider's working directory)
    #[arg(long)]
    repo: PathBuf,

    /// Review prompt handed to each provider
    #[arg(long)]
    prompt: String,

    /// Comma-separated provider list (defaults to configured providers)
    #[arg(long)]
    providers: Option<String>,

    /// Output format: json, markdown-pr, sarif
    #[arg(long, default_value = "json")]
    format: String,

    /// Artifact root (defaults to <repo>/<artifact_base>)
    #[arg(long)]
    artifact_root: Option<PathBuf>,

    /// Repo-relative paths to review (defaults to the policy's allow list)
    #[arg(long)]
    target: Vec<String>,

    /// Override the configured retry budget
    #[arg(long)]
    max_retries: Option<u32>,

    /// Override the per-provider timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// JSON schema file forwarded to providers that support one
    #[arg(long)]
    output_schema: Option<PathBuf>,
}

impl TaskArgs {
    fn to_request(&self) -> ReviewRequest {
        let mut request = ReviewRequest::new(self.prompt.clone(), self.repo.clone());
        request.target_paths = self.target.clone();
        request.artifact_root = self.artifact_root.clone();
        request.output_schema_path = self.output_schema.clone();
        request
    }
}

/// Parse and gate the output format for a subcommand.
///
/// `markdown-pr` and `sarif` are contracts of the review output layer and
/// are rejected everywhere else with a usage error.
fn resolve_format(format: &str, is_review: bool) -> Result<OutputFormat, String> {
    let format: OutputFormat = format.parse()?;
    if !is_review {
        format.ensure_allowed_outside_review()?;
    }
    Ok(format)
}

async fn execute(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Init { force } => {
            config::cmd_init(force)?;
            Ok(EXIT_OK)
        }
        Commands::Detect { providers, json } => {
            let resolved =
                config::resolve(cli.config.as_deref(), providers.as_deref(), None, None)?;
            detect_cmd::run_detect(&resolved, json).await?;
            Ok(EXIT_OK)
        }
        Commands::Run { task } => {
            let format = match resolve_format(&task.format, false) {
                Ok(format) => format,
                Err(message) => {
                    eprintln!("error: {message}");
                    return Ok(EXIT_USAGE);
                }
            };
            debug_assert_eq!(format, OutputFormat::Json);

            let resolved = config::resolve(
                cli.config.as_deref(),
                task.providers.as_deref(),
                task.max_retries,
                task.timeout,
            )?;
            let engine = ReviewEngine::from_config(resolved)?;
            run_cmd::run_dispatch(&engine, &task.to_request()).await?;
            Ok(EXIT_OK)
        }
        Commands::Review { task } => {
            let format = match resolve_format(&task.format, true) {
                Ok(format) => format,
                Err(message) => {
                    eprintln!("error: {message}");
                    return Ok(EXIT_USAGE);
                }
            };

            let resolved = config::resolve(
                cli.config.as_deref(),
                task.providers.as_deref(),
                task.max_retries,
                task.timeout,
            )?;
            let engine = ReviewEngine::from_config(resolved)?;
            review_cmd::run_review(&engine, &task.to_request(), format).await?;
            Ok(EXIT_OK)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match execute(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            eprintln!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_rejects_review_only_formats() {
        for format in ["markdown-pr", "sarif"] {
            let error = resolve_format(format, false).unwrap_err();
            assert!(
                error.contains("supported only for review"),
                "format {format}: {error}"
            );
        }
    }

    #[test]
    fn review_accepts_all_formats() {
        assert_eq!(resolve_format("json", true).unwrap(), OutputFormat::Json);
        assert_eq!(
            resolve_format("markdown-pr", true).unwrap(),
            OutputFormat::MarkdownPr
        );
        assert_eq!(resolve_format("sarif", true).unwrap(), OutputFormat::Sarif);
    }

    #[test]
    fn unknown_format_is_a_usage_error() {
        let error = resolve_format("yaml", true).unwrap_err();
        assert!(error.contains("unknown output format"));
    }

    #[tokio::test]
    async fn execute_run_with_report_format_exits_with_usage_error() {
        for format in ["markdown-pr", "sarif"] {
            let cli = Cli::try_parse_from([
                "mco", "run", "--repo", "/tmp", "--prompt", "x", "--format", format,
            ])
            .unwrap();
            assert_eq!(execute(cli).await.unwrap(), EXIT_USAGE);
        }
    }

    #[test]
    fn cli_parses_review_invocation() {
        let cli = Cli::try_parse_from([
            "mco",
            "review",
            "--repo",
            "/tmp/repo",
            "--prompt",
            "review this",
            "--providers",
            "claude,codex",
            "--format",
            "sarif",
        ])
        .unwrap();
        let Commands::Review { task } = cli.command else {
            panic!("expected review subcommand");
        };
        assert_eq!(task.repo, PathBuf::from("/tmp/repo"));
        assert_eq!(task.providers.as_deref(), Some("claude,codex"));
        assert_eq!(task.format, "sarif");
    }

    #[test]
    fn cli_format_defaults_to_json() {
        let cli = Cli::try_parse_from([
            "mco", "run", "--repo", "/tmp/repo", "--prompt", "go",
        ])
        .unwrap();
        let Commands::Run { task } = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(task.format, "json");
    }

    #[test]
    fn cli_requires_repo_and_prompt() {
        assert!(Cli::try_parse_from(["mco", "run", "--prompt", "go"]).is_err());
        assert!(Cli::try_parse_from(["mco", "run", "--repo", "/tmp"]).is_err());
    }

    #[test]
    fn task_args_build_a_request() {
        let cli = Cli::try_parse_from([
            "mco",
            "review",
            "--repo",
            "/tmp/repo",
            "--prompt",
            "check",
            "--target",
            "src",
            "--target",
            "tests",
            "--artifact-root",
            "/tmp/artifacts",
        ])
        .unwrap();
        let Commands::Review { task } = cli.command else {
            panic!("expected review subcommand");
        };
        let request = task.to_request();
        assert_eq!(request.prompt, "check");
        assert_eq!(request.target_paths, vec!["src", "tests"]);
        assert_eq!(request.artifact_root, Some(PathBuf::from("/tmp/artifacts")));
        assert!(request.task_id.starts_with("review-"));
    }
}
