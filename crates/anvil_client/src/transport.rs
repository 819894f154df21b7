//! The seam between the registry and a concrete daemon transport.

use std::path::Path;

use anvil_common::{CompilerIdentity, ExitStatus};
use anvil_diagnostics::MessageSink;
use anvil_protocol::{CompilationOptions, SessionId};

use crate::error::ConnectionError;

/// Establishes connections to a compile daemon.
pub trait DaemonTransport: Send + Sync {
    /// Connects to (starting if necessary) a daemon that runs `identity`.
    ///
    /// `marker` is the client liveness marker the daemon should watch.
    fn connect(&self, identity: &CompilerIdentity, marker: &Path) -> Result<Box<dyn DaemonChannel>, ConnectionError>;
}

/// One established daemon connection.
pub trait DaemonChannel: Send {
    /// Opens a session scoping one compile.
    fn open_session(&mut self) -> Result<SessionId, ConnectionError>;

    /// Runs a compile, delivering messages to `sink` as they arrive.
    ///
    /// `Ok(None)` means the daemon answered with a result this client does not
    /// recognise.
    fn compile(
        &mut self,
        session: SessionId,
        arguments: &[String],
        options: &CompilationOptions,
        sink: &dyn MessageSink,
    ) -> Result<Option<ExitStatus>, ConnectionError>;

    /// Releases a session.
    fn release_session(&mut self, session: SessionId) -> Result<(), ConnectionError>;

    /// Returns `false` once the channel is known to be broken.
    fn is_alive(&self) -> bool {
        true
    }
}
