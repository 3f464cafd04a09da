//! `lrc hooks`: install/uninstall/enable/disable/status, and the hidden
//! `run` entry point the installed hook script shells out to (spec §6).
//!
//! Hook bodies live inside `__LRC_MARKER_BEGIN__`/`__LRC_MARKER_END__`
//! sentinels so re-installing is idempotent (teacher: `gcop-rs`'s own
//! `HOOK_MARKER`-tagged `prepare-commit-msg` script in
//! `commands/hook.rs`).

use std::io::IsTerminal;
use std::fs;

use colored::Colorize;

use crate::attestation;
use crate::error::{Error, Result};
use crate::git;

const MARKER_BEGIN: &str = "__LRC_MARKER_BEGIN__";
const MARKER_END: &str = "__LRC_MARKER_END__";
const DISABLED_MARKER: &str = "__LRC_DISABLED__";

fn hook_script() -> String {
    format!(
        "#!/bin/sh\n\
         {MARKER_BEGIN}\n\
         # Installed by: lrc hooks install\n\
         # To remove: lrc hooks uninstall\n\
         if [ -f \"$(dirname \"$0\")/.lrc-disabled\" ]; then\n\
         \x20   exit 0\n\
         fi\n\
         if ! command -v lrc >/dev/null 2>&1; then\n\
         \x20   exit 0\n\
         fi\n\
         lrc hooks run\n\
         {MARKER_END}\n"
    )
}

fn hook_path() -> Result<std::path::PathBuf> {
    let root = git::find_git_root()?;
    Ok(root.join(".git").join("hooks").join("pre-commit"))
}

fn disabled_flag_path() -> Result<std::path::PathBuf> {
    Ok(hook_path()?.with_file_name(".lrc-disabled"))
}

pub fn install(force: bool) -> Result<()> {
    let path = hook_path()?;
    fs::create_dir_all(path.parent().expect("hook path has a parent"))?;

    if path.exists() {
        let existing = fs::read_to_string(&path)?;
        if existing.contains(MARKER_BEGIN) {
            println!("{}", "hook already installed".yellow());
            return Ok(());
        }
        if !force {
            println!(
                "{}",
                "an existing pre-commit hook was found; pass --force to overwrite".yellow()
            );
            return Ok(());
        }
    }

    fs::write(&path, hook_script())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    }
    println!("{}", "hook installed".green());
    Ok(())
}

pub fn uninstall() -> Result<()> {
    let path = hook_path()?;
    if !path.exists() {
        println!("{}", "no hook found".yellow());
        return Ok(());
    }
    let content = fs::read_to_string(&path)?;
    if !content.contains(MARKER_BEGIN) {
        println!("{}", "existing hook was not installed by lrc, leaving it alone".yellow());
        return Ok(());
    }
    fs::remove_file(&path)?;
    let _ = fs::remove_file(disabled_flag_path()?);
    println!("{}", "hook uninstalled".green());
    Ok(())
}

pub fn enable() -> Result<()> {
    let flag = disabled_flag_path()?;
    if flag.exists() {
        fs::remove_file(flag)?;
    }
    println!("{}", "hook enabled".green());
    Ok(())
}

pub fn disable() -> Result<()> {
    fs::write(disabled_flag_path()?, DISABLED_MARKER)?;
    println!("{}", "hook disabled".yellow());
    Ok(())
}

pub fn status() -> Result<()> {
    let path = hook_path()?;
    if !path.exists() {
        println!("not installed");
        return Ok(());
    }
    let content = fs::read_to_string(&path)?;
    if !content.contains(MARKER_BEGIN) {
        println!("a foreign pre-commit hook is installed (not managed by lrc)");
        return Ok(());
    }
    let disabled = disabled_flag_path()?.exists();
    println!("installed, {}", if disabled { "disabled".yellow() } else { "enabled".green() });
    Ok(())
}

/// Entry point the installed hook script shells out to. Non-interactive
/// (CI) runs refuse to commit without a recorded attestation for the
/// staged tree hash; interactive shells just print a reminder and let the
/// commit through (spec §6).
pub fn run() -> Result<()> {
    let root = git::find_git_root()?;
    let tree_hash = git::staged_tree_hash()?;

    if attestation::exists(&root, &tree_hash) {
        return Ok(());
    }

    if std::io::stdin().is_terminal() {
        eprintln!(
            "{}",
            "lrc: this change has not been reviewed yet — run `lrc review` first".yellow()
        );
        return Ok(());
    }

    Err(Error::Server(format!(
        "no review attestation recorded for tree {tree_hash}; run `lrc review` before committing non-interactively"
    )))
}
