use std::io;

use thiserror::Error;

/// Errors surfaced to the hosting application.
///
/// Steady-state failures such as malformed datagrams or individual send
/// errors are handled inside the engine and never reach the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind local endpoint: {0}")]
    Bind(#[source] io::Error),

    #[error("node has already joined a network")]
    AlreadyJoined,
}
