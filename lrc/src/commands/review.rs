//! `lrc review`: submit a diff, poll until it finishes, print results
//! (spec §6).

use colored::Colorize;

use crate::api_client::{ApiClient, ReviewStatus};
use crate::attestation::{self, Action};
use crate::cli::{DiffSourceArgs, OutputFormat};
use crate::error::{Error, Result};
use crate::git;

fn resolve_diff(source: &DiffSourceArgs) -> Result<(String, String, Option<String>)> {
    if let Some(path) = &source.diff_file {
        return Ok(("file".to_string(), git::diff_file(path)?, None));
    }
    if let Some(range) = &source.range {
        return Ok(("range".to_string(), git::range_diff(range)?, Some(range.clone())));
    }
    if source.working {
        return Ok(("working".to_string(), git::working_diff()?, None));
    }
    Ok(("staged".to_string(), git::staged_diff()?, None))
}

pub async fn run(
    source: &DiffSourceArgs,
    output: OutputFormat,
    api_url: &str,
    api_key: Option<String>,
) -> Result<()> {
    let (diff_source, diff, range) = resolve_diff(source)?;
    let repo_name = git::repo_name()?;

    let client = ApiClient::new(api_url, api_key);
    let submitted = client
        .submit(&repo_name, &diff_source, &diff, range.as_deref())
        .await?;

    if output == OutputFormat::Pretty {
        println!("{} review {}", "submitted".green(), submitted.review_id);
    }

    let snapshot = client.poll_until_terminal(&submitted.review_id).await?;

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        OutputFormat::Pretty => print_pretty(&snapshot),
    }

    // Only the staged diff feeds the hook's attestation check — the hook
    // re-derives the same tree hash from the index at commit time.
    if diff_source == "staged" {
        if let Ok(root) = git::find_git_root() {
            if let Ok(tree_hash) = git::staged_tree_hash() {
                let action = match snapshot.status {
                    ReviewStatus::Completed => Some(Action::Reviewed),
                    ReviewStatus::Cancelled => Some(Action::Skipped),
                    _ => None,
                };
                if let Some(action) = action {
                    let _ = attestation::record(&root, &tree_hash, action);
                }
            }
        }
    }

    match snapshot.status {
        ReviewStatus::Completed => Ok(()),
        ReviewStatus::Cancelled => Err(Error::UserSkipped),
        _ => Err(Error::Server(
            snapshot.error_summary.unwrap_or_else(|| "review failed".to_string()),
        )),
    }
}

fn print_pretty(snapshot: &crate::api_client::ReviewSnapshot) {
    println!();
    match snapshot.status {
        ReviewStatus::Completed => println!("{}", "review complete".green().bold()),
        ReviewStatus::Failed => println!("{}", "review failed".red().bold()),
        ReviewStatus::Cancelled => println!("{}", "review cancelled".yellow().bold()),
        _ => {}
    }
    if let Some(summary) = &snapshot.summary {
        println!("\n{summary}");
    }
    for comment in &snapshot.comments {
        println!(
            "\n{}:{} [{}]\n{}",
            comment.path.cyan(),
            comment.line,
            comment.severity,
            comment.body
        );
    }
}
