//! Top-level CLI surface (spec §6): `lrc review` and `lrc hooks ...`.

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "lrc", version, about = "LiveReview command-line client")]
pub struct Cli {
    /// API base URL, overrides `API_URL`.
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit a diff for review, poll until it finishes, print results.
    Review {
        #[command(flatten)]
        source: DiffSourceArgs,

        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        output: OutputFormat,
    },
    /// Manage the local git hooks that trigger reviews automatically.
    Hooks {
        #[command(subcommand)]
        action: HookAction,
    },
}

#[derive(Debug, clap::Args)]
#[group(required = false, multiple = false)]
pub struct DiffSourceArgs {
    /// Review the staged diff (`git diff --cached`). Default when no other
    /// source flag is given.
    #[arg(long)]
    pub staged: bool,

    /// Review the working-tree diff (`git diff`).
    #[arg(long)]
    pub working: bool,

    /// Review a commit range, e.g. `main..HEAD`.
    #[arg(long, value_name = "FROM..TO")]
    pub range: Option<String>,

    /// Review a unified-diff file on disk instead of asking git.
    #[arg(long, value_name = "PATH")]
    pub diff_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum HookAction {
    /// Install the prepare-commit-msg hook, idempotently.
    Install {
        /// Overwrite an existing non-lrc hook.
        #[arg(long)]
        force: bool,
    },
    /// Remove the hook if it was installed by `lrc`.
    Uninstall,
    /// Re-enable a previously disabled hook.
    Enable,
    /// Disable the hook without removing it.
    Disable,
    /// Report whether the hook is installed and enabled.
    Status,
    /// Invoked by the installed hook script itself; not meant to be run
    /// by hand.
    #[command(hide = true)]
    Run,
}
