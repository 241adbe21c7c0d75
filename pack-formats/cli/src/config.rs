//! Command-line and GitHub Actions input handling.
//!
//! Every flag can also be set through the matching `INPUT_*` variable that
//! the Actions runner exports for `with:` inputs. The runner exports unset
//! inputs as empty strings, so empty values are treated as absent.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use pack_formats_lib::UpdateOptions;
use pack_formats_lib::catalog::MANIFEST_URL;
use pack_formats_lib::planner::DEFAULT_CUTOFF;
use pack_formats_lib::publish::GITHUB_API_URL;
use pack_formats_lib::template::DEFAULT_COMMIT_TEMPLATE;

const DEFAULT_OUTPUT_PATH: &str = "formats.json";
const DEFAULT_COMMIT_TYPE: &str = "chore";
const DEFAULT_PR_BRANCH: &str = "pack-formats/update";
const DEFAULT_PR_BASE: &str = "main";

/// Track datapack and resourcepack formats for every game version.
///
/// Reads the existing mapping, resolves formats for versions it does not
/// know yet, writes the mapping back atomically, and optionally opens a
/// pull request with the result.
#[derive(Debug, Parser)]
#[command(name = "pack-formats")]
#[command(version)]
#[command(about = "Track datapack and resourcepack formats for every game version")]
pub struct Cli {
    /// Mapping file to read and update [default: formats.json]
    #[arg(long, env = "INPUT_OUTPUT_PATH", value_name = "PATH")]
    pub output_path: Option<String>,

    /// Oldest version whose client archive carries version.json [default: 18w47a]
    #[arg(long, env = "INPUT_CUTOFF_VERSION", value_name = "ID")]
    pub cutoff_version: Option<String>,

    /// Maximum simultaneous downloads; 0 picks one from CPU count and memory
    #[arg(long, env = "INPUT_CONCURRENCY", value_name = "N", value_parser = parse_concurrency, default_value = "0")]
    pub concurrency: usize,

    /// Version catalog URL
    #[arg(long, env = "INPUT_MANIFEST_URL", value_name = "URL")]
    pub manifest_url: Option<String>,

    /// Commit the mapping and open a pull request when it changed
    #[arg(long, env = "INPUT_COMMIT_ENABLED", value_parser = parse_flag, num_args = 0..=1, default_value = "false", default_missing_value = "true", action = ArgAction::Set)]
    pub commit_enabled: bool,

    /// Conventional commit type [default: chore]
    #[arg(long, env = "INPUT_COMMIT_TYPE")]
    pub commit_type: Option<String>,

    /// Conventional commit scope
    #[arg(long, env = "INPUT_COMMIT_SCOPE")]
    pub commit_scope: Option<String>,

    /// Commit message template ({{type}}, {{scope}}, {{versions}})
    #[arg(long, env = "INPUT_COMMIT_TEMPLATE", value_name = "TEMPLATE")]
    pub commit_template: Option<String>,

    /// Branch the pull request is opened from [default: pack-formats/update]
    #[arg(long, env = "INPUT_PR_BRANCH", value_name = "BRANCH")]
    pub pr_branch: Option<String>,

    /// Branch the pull request targets [default: main]
    #[arg(long, env = "INPUT_PR_BASE", value_name = "BRANCH")]
    pub pr_base: Option<String>,

    /// Enable squash auto-merge on the pull request
    #[arg(long, env = "INPUT_AUTO_MERGE", value_parser = parse_flag, num_args = 0..=1, default_value = "false", default_missing_value = "true", action = ArgAction::Set)]
    pub auto_merge: bool,

    /// GitHub token (falls back to GITHUB_TOKEN)
    #[arg(long, env = "INPUT_GITHUB_TOKEN", hide_env_values = true, value_name = "TOKEN")]
    pub github_token: Option<String>,

    /// Repository to publish to, as owner/repo
    #[arg(long, env = "GITHUB_REPOSITORY", value_name = "OWNER/REPO")]
    pub repository: Option<String>,

    /// GitHub REST API root [default: https://api.github.com]
    #[arg(long, env = "GITHUB_API_URL", value_name = "URL")]
    pub github_api_url: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = ArgAction::Count)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long)]
    pub json: bool,
}

/// Parses the concurrency input. Empty means automatic.
fn parse_concurrency(value: &str) -> Result<usize, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|_| format!("'{value}' is not a non-negative integer"))
}

/// Parses a boolean input the way Actions does (`true`/`false`, any case).
fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "false" => Ok(false),
        "true" => Ok(true),
        other => Err(format!("'{other}' is not a boolean (expected true or false)")),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Publishing settings, present only when committing is enabled.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub commit_type: String,
    pub commit_scope: Option<String>,
    pub commit_template: String,
    pub pr_branch: String,
    pub pr_base: String,
    pub auto_merge: bool,
    pub token: Option<String>,
    pub repository: Option<String>,
    pub api_url: String,
}

/// Fully resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub output_path: PathBuf,
    pub update: UpdateOptions,
    pub publish: Option<PublishSettings>,
}

impl Settings {
    /// Applies defaults and environment fallbacks to parsed arguments.
    pub fn from_cli(cli: Cli) -> Self {
        Self::resolve(cli, std::env::var("GITHUB_TOKEN").ok())
    }

    fn resolve(cli: Cli, fallback_token: Option<String>) -> Self {
        let update = UpdateOptions {
            manifest_url: non_empty(cli.manifest_url).unwrap_or_else(|| MANIFEST_URL.to_string()),
            cutoff: non_empty(cli.cutoff_version).unwrap_or_else(|| DEFAULT_CUTOFF.to_string()),
            concurrency: (cli.concurrency > 0).then_some(cli.concurrency),
        };

        let publish = cli.commit_enabled.then(|| PublishSettings {
            commit_type: non_empty(cli.commit_type)
                .unwrap_or_else(|| DEFAULT_COMMIT_TYPE.to_string()),
            commit_scope: non_empty(cli.commit_scope),
            commit_template: non_empty(cli.commit_template)
                .unwrap_or_else(|| DEFAULT_COMMIT_TEMPLATE.to_string()),
            pr_branch: non_empty(cli.pr_branch).unwrap_or_else(|| DEFAULT_PR_BRANCH.to_string()),
            pr_base: non_empty(cli.pr_base).unwrap_or_else(|| DEFAULT_PR_BASE.to_string()),
            auto_merge: cli.auto_merge,
            token: non_empty(cli.github_token).or_else(|| non_empty(fallback_token)),
            repository: non_empty(cli.repository),
            api_url: non_empty(cli.github_api_url).unwrap_or_else(|| GITHUB_API_URL.to_string()),
        });

        Self {
            output_path: PathBuf::from(
                non_empty(cli.output_path).unwrap_or_else(|| DEFAULT_OUTPUT_PATH.to_string()),
            ),
            update,
            publish,
        }
    }

    /// Path of the mapping file inside the repository.
    pub fn repo_path(&self) -> String {
        let path = self.output_path.to_string_lossy().replace('\\', "/");
        path.trim_start_matches("./").to_string()
    }
}
