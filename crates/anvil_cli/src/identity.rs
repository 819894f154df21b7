//! `anvil identity` and compiler resolution shared by the other commands.

use std::error::Error;

use anvil_common::CompilerIdentity;
use anvil_config::CompilerConfig;

use crate::{CompilerArgs, GlobalArgs};

/// Version used when neither the command line nor `anvil.toml` names one.
const UNKNOWN_VERSION: &str = "unknown";

/// Fingerprints the compiler named on the command line or in `[compiler]`.
pub fn resolve(args: &CompilerArgs, config: &CompilerConfig) -> Result<CompilerIdentity, Box<dyn Error>> {
    let path = args
        .compiler
        .clone()
        .or_else(|| config.path.clone())
        .ok_or("no compiler configured: pass --compiler or set [compiler] path in anvil.toml")?;
    let version = args
        .compiler_version
        .clone()
        .or_else(|| config.version.clone())
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
    let identity = CompilerIdentity::from_artifact(&path, &version)
        .map_err(|e| format!("cannot read compiler {}: {e}", path.display()))?;
    Ok(identity)
}

/// Runs `anvil identity`: prints the identity key and description.
pub fn run(args: &CompilerArgs, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let config = anvil_config::load_config(&global.project_dir()?)?;
    let identity = resolve(args, &config.compiler)?;
    println!("{}\t{identity}", identity.key());
    Ok(0)
}
