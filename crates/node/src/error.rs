//! A bunch of wrap errors.
use chordkv_core::dht::NodeRef;
use chordkv_core::dht::RingId;

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors enum mapping global custom errors.
/// The error type can be expressed in decimal, where the high decs represent
/// the error category and the low decs represent the error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
#[repr(u32)]
pub enum Error {
    #[error("Connect remote rpc server failed: {0}.")]
    RemoteRpcError(String) = 100,
    #[error("Unknown rpc error.")]
    UnknownRpcError = 101,
    #[error("Internal rpc services error: {0}.")]
    InternalRpcError(#[from] jsonrpc_core::Error) = 102,
    #[error("Http request failed: {0}.")]
    HttpRequestError(String) = 103,
    #[error("Decode error.")]
    DecodeError = 300,
    #[error("Encode error.")]
    EncodeError = 301,
    #[error("Invalid method.")]
    InvalidMethod = 500,
    #[error("Invalid params: {0}.")]
    InvalidParams(String) = 501,
    #[error("Peer {0} is unreachable")]
    PeerUnreachable(RingId) = 600,
    #[error("Lookup exceeded hop budget of {0}")]
    RoutingHopBudgetExceeded(u32) = 601,
    #[error("Ring inconsistent: {0}")]
    RingInconsistent(String) = 602,
    #[error("Node is leaving the ring")]
    NodeLeaving = 603,
    #[error("Invalid address: {0}")]
    InvalidAddress(String) = 804,
    #[error("Invalid logging level: {0}")]
    InvalidLoggingLevel(String) = 809,
    #[error("Invalid config: {0}")]
    InvalidConfig(String) = 810,
    #[error("Create File Error: {0}")]
    CreateFileError(String) = 900,
    #[error("Open File Error: {0}")]
    OpenFileError(String) = 901,
    #[error("Cannot find home directory")]
    HomeDirError = 903,
    #[error("Cannot find parent directory")]
    ParentDirError = 904,
    #[error("Serde json error: {0}")]
    SerdeJsonError(#[from] serde_json::Error) = 1000,
    #[error("Serde yaml error: {0}")]
    SerdeYamlError(#[from] serde_yaml::Error) = 1001,
    #[error("Core error: {0}")]
    CoreError(chordkv_core::error::Error) = 1102,
}

impl Error {
    fn discriminant(&self) -> u32 {
        // SAFETY: Because `Self` is marked `repr(u32)`, its layout is a `repr(C)` `union`
        // between `repr(C)` structs, each of which has the `u32` discriminant as its first
        // field, so we can read the discriminant without offsetting the pointer.
        // ref: https://doc.rust-lang.org/std/mem/fn.discriminant.html
        unsafe { *<*const _>::from(self).cast::<u32>() }
    }

    pub fn code(&self) -> u32 {
        self.discriminant()
    }

    /// Payload carried next to the code so the caller can rebuild the ring error.
    fn rpc_data(&self) -> Option<serde_json::Value> {
        match self {
            Error::PeerUnreachable(id) => Some(serde_json::json!(id.value())),
            Error::RoutingHopBudgetExceeded(budget) => Some(serde_json::json!(budget)),
            Error::RingInconsistent(reason) => Some(serde_json::json!(reason)),
            _ => None,
        }
    }

    /// Rebuild an error answered by a remote endpoint.
    pub fn from_rpc(err: jsonrpc_core::Error) -> Self {
        let code = match err.code {
            jsonrpc_core::ErrorCode::ServerError(code) => code,
            jsonrpc_core::ErrorCode::MethodNotFound => return Error::InvalidMethod,
            jsonrpc_core::ErrorCode::InvalidParams => return Error::InvalidParams(err.message),
            _ => return Error::RemoteRpcError(err.message),
        };
        let data = err.data.as_ref();
        match code {
            600 => match data.and_then(|d| d.as_u64()) {
                Some(id) => Error::PeerUnreachable(RingId::from(id)),
                None => Error::RemoteRpcError(err.message),
            },
            601 => match data.and_then(|d| d.as_u64()) {
                Some(budget) => Error::RoutingHopBudgetExceeded(budget as u32),
                None => Error::RemoteRpcError(err.message),
            },
            602 => Error::RingInconsistent(
                data.and_then(|d| d.as_str())
                    .map(str::to_string)
                    .unwrap_or(err.message),
            ),
            603 => Error::NodeLeaving,
            _ => Error::RemoteRpcError(err.message),
        }
    }

    /// Error reported to the core for a call to `target`.
    /// Anything that kept the request from reaching `target` counts against it.
    pub fn into_core(self, target: &NodeRef) -> chordkv_core::error::Error {
        use chordkv_core::error::Error as CoreError;
        match self {
            Error::HttpRequestError(_) | Error::NodeLeaving => CoreError::PeerUnreachable(target.id),
            Error::PeerUnreachable(id) => CoreError::PeerUnreachable(id),
            Error::RoutingHopBudgetExceeded(budget) => CoreError::RoutingHopBudgetExceeded(budget),
            Error::RingInconsistent(reason) => CoreError::RingInconsistent(reason),
            Error::CoreError(e) => e,
            e => CoreError::RemoteError(e.to_string()),
        }
    }
}

impl From<chordkv_core::error::Error> for Error {
    fn from(e: chordkv_core::error::Error) -> Self {
        use chordkv_core::error::Error as CoreError;
        match e {
            CoreError::PeerUnreachable(id) => Error::PeerUnreachable(id),
            CoreError::RoutingHopBudgetExceeded(budget) => Error::RoutingHopBudgetExceeded(budget),
            CoreError::RingInconsistent(reason) => Error::RingInconsistent(reason),
            CoreError::NodeLeaving => Error::NodeLeaving,
            e => Error::CoreError(e),
        }
    }
}

impl From<Error> for jsonrpc_core::Error {
    fn from(e: Error) -> Self {
        Self {
            code: jsonrpc_core::ErrorCode::ServerError(e.code().into()),
            message: e.to_string(),
            data: e.rpc_data(),
        }
    }
}
