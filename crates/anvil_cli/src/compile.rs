//! `anvil compile` - compile through the daemon, falling back to in-process.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use anvil_client::{
    CommandEntryPoint, CompileOrchestrator, ConnectionRegistry, DaemonPolicy, FallbackCompiler, SocketTransport,
};
use anvil_diagnostics::{FilteringSink, TerminalSink};
use anvil_protocol::{CompilationOptions, IncrementalCompilationOptions};
use tracing::debug;

use crate::{identity, CompileArgs, GlobalArgs};

/// Runs `anvil compile`. Returns the compile's process exit code.
pub fn run(args: &CompileArgs, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let project_dir = global.project_dir()?;
    let config = anvil_config::load_config(&project_dir)?;
    let identity = identity::resolve(&args.compiler, &config.compiler)?;

    let mut policy = DaemonPolicy::from_config(&config);
    if args.no_daemon {
        policy.enabled = false;
    }
    let retry = policy.retry_on_connection_error && !args.no_retry;

    let transport = SocketTransport::from_config(&config.daemon).with_project_dir(&project_dir);
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(transport), config.daemon.marker_dir()));
    let fallback = FallbackCompiler::new(Arc::new(CommandEntryPoint::new(identity.artifact())));
    let orchestrator = CompileOrchestrator::new(registry, fallback, policy);

    let cwd = std::env::current_dir()?;
    let mut options = CompilationOptions::for_build_system(args.target.into(), global.verbose);
    if args.incremental {
        options = options.with_incremental(incremental_options(args, &project_dir, &cwd));
    }

    let arguments = resolve_paths(&args.args, &cwd);
    debug!(?arguments, "compiler arguments");

    let terminal = TerminalSink::stderr(global.color);
    let sink = FilteringSink::new(options.reporting_filter(), &terminal);
    let status = orchestrator.compile_with(&identity, &arguments, &options, retry, &sink);
    Ok(status.code())
}

/// Builds the incremental extension from the command line.
///
/// Passing `--modified` or `--deleted` means the caller knows its changes.
/// Changed files resolve against `cwd`, like the compiler arguments, so they
/// name the same cache entries.
fn incremental_options(args: &CompileArgs, project_dir: &Path, cwd: &Path) -> IncrementalCompilationOptions {
    let working_dir = args
        .working_dir
        .as_ref()
        .map(|dir| project_dir.join(dir))
        .unwrap_or_else(|| project_dir.to_path_buf());
    if args.modified.is_empty() && args.deleted.is_empty() {
        IncrementalCompilationOptions::with_unknown_changes(working_dir, &args.cache_version_file, args.cache_version)
    } else {
        IncrementalCompilationOptions::with_known_changes(
            args.modified.iter().map(|p| cwd.join(p)),
            args.deleted.iter().map(|p| cwd.join(p)),
            working_dir,
            &args.cache_version_file,
            args.cache_version,
        )
    }
}

/// Makes arguments naming existing relative paths absolute, so a daemon with a
/// different working directory sees the same files.
fn resolve_paths(arguments: &[String], cwd: &Path) -> Vec<String> {
    arguments
        .iter()
        .map(|arg| {
            let path = Path::new(arg);
            if path.is_relative() && !arg.starts_with('-') && cwd.join(path).exists() {
                cwd.join(path).to_string_lossy().into_owned()
            } else {
                arg.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    fn compile_args(extra: &[&str]) -> CompileArgs {
        let mut argv = vec!["anvil", "compile"];
        argv.extend_from_slice(extra);
        match crate::Cli::parse_from(argv).command {
            crate::Command::Compile(args) => args,
            _ => panic!("expected Compile command"),
        }
    }

    #[test]
    fn unknown_changes_by_default() {
        let args = compile_args(&["--incremental"]);
        let ic = incremental_options(&args, Path::new("/work/app"), Path::new("/home/dev"));
        assert!(ic.known_changes().is_none());
        assert_eq!(ic.working_dir, PathBuf::from("/work/app"));
        assert_eq!(ic.cache_version_path(), PathBuf::from("/work/app/cache-version.txt"));
    }

    #[test]
    fn modified_files_make_changes_known() {
        let args = compile_args(&["--incremental", "--working-dir", "ic", "--modified", "src/a.src"]);
        let ic = incremental_options(&args, Path::new("/work/app"), Path::new("/work/app"));
        let (modified, deleted) = ic.known_changes().unwrap();
        assert!(modified.contains(Path::new("/work/app/src/a.src")));
        assert!(deleted.is_empty());
        assert_eq!(ic.working_dir, PathBuf::from("/work/app/ic"));
    }

    #[test]
    fn changed_files_resolve_like_compiler_arguments() {
        let cwd = tempfile::tempdir().unwrap();
        std::fs::write(cwd.path().join("a.src"), "").unwrap();
        let args = compile_args(&[
            "--incremental",
            "--project-dir",
            "/elsewhere/project",
            "--modified",
            "a.src",
            "--deleted",
            "gone.src",
            "--",
            "a.src",
        ]);

        let ic = incremental_options(&args, Path::new("/elsewhere/project"), cwd.path());
        let resolved = resolve_paths(&args.args, cwd.path());
        let (modified, deleted) = ic.known_changes().unwrap();

        assert!(modified.contains(Path::new(&resolved[0])));
        assert!(deleted.contains(&cwd.path().join("gone.src")));
        assert_eq!(ic.working_dir, PathBuf::from("/elsewhere/project"));
    }

    #[test]
    fn existing_relative_paths_become_absolute() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.src"), "").unwrap();
        let args = vec!["-d".to_string(), "a.src".to_string(), "missing.src".to_string()];
        let resolved = resolve_paths(&args, dir.path());
        assert_eq!(resolved[0], "-d");
        assert_eq!(resolved[1], dir.path().join("a.src").to_string_lossy());
        assert_eq!(resolved[2], "missing.src");
    }
}
