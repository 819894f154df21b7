//! `anvil daemon` - serve compiles for one compiler until killed.

use std::error::Error;
use std::sync::Arc;

use anvil_client::CommandEntryPoint;
use anvil_daemon::{DaemonServer, DaemonSettings};
use tracing::info;

use crate::{identity, DaemonArgs, GlobalArgs};

/// Runs the daemon in the foreground.
pub fn run(args: &DaemonArgs, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let config = anvil_config::load_config(&global.project_dir()?)?;
    let identity = identity::resolve(&args.compiler, &config.compiler)?;

    let mut settings = DaemonSettings::from_config(&config.daemon);
    if let Some(run_dir) = &args.run_dir {
        settings.run_dir = run_dir.clone();
    }

    let entry = Arc::new(CommandEntryPoint::new(identity.artifact()));
    let server = DaemonServer::bind(identity, entry, settings)?;
    info!(port = server.port(), "serving compiles");
    server.serve()?;
    Ok(0)
}
