use std::error::Error;

/// Result codes produced by node operations.
///
/// Every failure surfaces as one of these; nothing is raised out-of-band.
/// `raw()` yields the negative integer used on the wire when a slot or an
/// IPC layer needs to carry the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeError {
    /// Malformed parameter, wrong media kind, sample format outside the
    /// kernel table, or buffer memory of an unsupported kind.
    Invalid,

    /// A required I/O slot is not bound.
    IoError,

    /// Unknown parameter kind or id.
    NotFound,

    /// The operation is not implemented by this node (unknown command,
    /// add/remove port, allocate buffers).
    Unsupported,

    /// No free output buffer was available at process time. Usually
    /// transient; recycling a buffer clears it.
    BrokenPipe,

    /// A query that requires a negotiated format was made on a port
    /// without one.
    NotInitialized,
}

impl NodeError {
    /// The negative wire representation of this code.
    pub fn raw(&self) -> i32 {
        match self {
            NodeError::Invalid => -22,
            NodeError::IoError => -5,
            NodeError::NotFound => -2,
            NodeError::Unsupported => -95,
            NodeError::BrokenPipe => -32,
            // Shares the I/O error code on the wire.
            NodeError::NotInitialized => -5,
        }
    }
}

impl Error for NodeError {}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeError::Invalid => write!(f, "invalid argument"),
            NodeError::IoError => write!(f, "I/O slot not bound"),
            NodeError::NotFound => write!(f, "no such parameter or id"),
            NodeError::Unsupported => write!(f, "operation not supported"),
            NodeError::BrokenPipe => write!(f, "no output buffer available"),
            NodeError::NotInitialized => write!(f, "port has no format"),
        }
    }
}

/// Why `ThreadLoop::start()` failed.
#[derive(Debug)]
pub enum LoopStartError {
    /// The loop already has a running worker thread.
    AlreadyStarted,

    /// The OS refused to spawn the worker thread.
    Spawn(std::io::Error),
}

impl Error for LoopStartError {}

impl std::fmt::Display for LoopStartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopStartError::AlreadyStarted => {
                write!(f, "Could not start loop. The worker thread is already running.")
            }
            LoopStartError::Spawn(e) => {
                write!(f, "Could not spawn the loop worker thread: {}", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes() {
        assert_eq!(NodeError::Invalid.raw(), -22);
        assert_eq!(NodeError::IoError.raw(), -5);
        assert_eq!(NodeError::NotFound.raw(), -2);
        assert_eq!(NodeError::Unsupported.raw(), -95);
        assert_eq!(NodeError::BrokenPipe.raw(), -32);
        assert_eq!(NodeError::NotInitialized.raw(), NodeError::IoError.raw());
    }
}
