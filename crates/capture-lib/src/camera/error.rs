use std::fmt;
use std::io;

use thiserror::Error;

use super::config::ReadErrorPolicy;

/// The step of an open sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStage {
    Connect,
    StreamInfo,
    Decoder,
    Conversion,
}

impl fmt::Display for OpenStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpenStage::Connect => "connect",
            OpenStage::StreamInfo => "stream info",
            OpenStage::Decoder => "decoder",
            OpenStage::Conversion => "conversion",
        };
        write!(f, "{}", name)
    }
}

/// Why a single packet read did not produce data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFailure {
    EndOfStream,
    /// A transport error code that means the producer went away.
    Disconnected(i32),
    /// The source has nothing right now; the next read may succeed.
    WouldBlock,
    Other(i32),
}

impl ReadFailure {
    /// Classifies a positive OS error number reported by the transport.
    pub fn from_errno(errno: i32) -> Self {
        match io::Error::from_raw_os_error(errno).kind() {
            io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => ReadFailure::Disconnected(errno),
            io::ErrorKind::WouldBlock => ReadFailure::WouldBlock,
            _ => ReadFailure::Other(errno),
        }
    }

    pub fn triggers_reopen(&self, policy: ReadErrorPolicy) -> bool {
        match self {
            ReadFailure::EndOfStream | ReadFailure::Disconnected(_) => true,
            ReadFailure::WouldBlock => false,
            ReadFailure::Other(_) => policy == ReadErrorPolicy::Reopen,
        }
    }
}

impl fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadFailure::EndOfStream => write!(f, "end of stream"),
            ReadFailure::Disconnected(code) => write!(
                f,
                "transport disconnected ({}, error {})",
                io::Error::from_raw_os_error(*code),
                code
            ),
            ReadFailure::WouldBlock => write!(f, "no data available yet"),
            ReadFailure::Other(code) => write!(f, "unexpected read error {}", code),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("{stage} failed: {message}")]
    Open { stage: OpenStage, message: String },
    #[error("capture is not ready")]
    NotReady,
    #[error("read failed: {failure}")]
    Read {
        failure: ReadFailure,
        reopening: bool,
    },
    #[error("a reopen is already in flight")]
    ReopenInFlight,
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("hardware format negotiation failed: {0}")]
    FormatNegotiation(String),
    #[error("engine stopped after a fatal error: {0}")]
    Failed(String),
    #[error("engine has been shut down")]
    ShutDown,
}

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        EngineError::Configuration(message.into())
    }

    pub fn open(stage: OpenStage, message: impl Into<String>) -> Self {
        EngineError::Open {
            stage,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        EngineError::Decode(message.into())
    }

    /// Errors that no amount of reopening will fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Configuration(_) | EngineError::Failed(_))
    }

    /// Errors after which the reopen loop must stop.
    pub(crate) fn is_terminal(&self) -> bool {
        self.is_fatal() || matches!(self, EngineError::ShutDown)
    }
}
