//! Error type of the bridge facade.

use svm_bridge_codec::CodecError;
use svm_bridge_core::{ConfigError, ReceiptError};
use svm_bridge_host::HostError;
use svm_bridge_native::NativeError;
use thiserror::Error;

/// Errors from the SVM bridge.
#[derive(Debug, Error)]
pub enum SvmError {
    /// Invalid or unreadable configuration.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Native library error.
    #[error("Native error: {0}")]
    Native(#[from] NativeError),

    /// Codec error.
    #[error("Codec error: {0}")]
    Codec(CodecError),

    /// Host function error.
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// The operation completed with a failed receipt.
    #[error("Receipt error: {0}")]
    Receipt(#[from] ReceiptError),

    /// Neither a library nor a library path was given.
    #[error("No native library configured")]
    MissingLibrary,

    /// Neither codec bytes nor a codec path was given.
    #[error("No codec module configured")]
    MissingCodec,

    /// The import table was built for guests, not for the native runtime.
    #[error("Import table has no native imports; build it with build_native")]
    NotNative,
}

impl SvmError {
    /// Whether the codec guest violated its protocol or returned an
    /// undecodable payload.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Codec(err) if err.is_fatal())
    }
}

impl From<CodecError> for SvmError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Receipt(receipt) => Self::Receipt(receipt),
            other => Self::Codec(other),
        }
    }
}

/// Result type alias for bridge operations.
pub type SvmResult<T> = std::result::Result<T, SvmError>;

#[cfg(test)]
mod tests {
    use super::*;
    use svm_bridge_codec::GuestError;

    #[test]
    fn test_receipt_errors_are_surfaced() {
        let err = SvmError::from(CodecError::Receipt(ReceiptError::Oog));
        assert!(matches!(err, SvmError::Receipt(ReceiptError::Oog)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_protocol_violation_is_fatal() {
        let err = SvmError::from(CodecError::Guest(GuestError::InvalidMarker(7)));
        assert!(err.is_fatal());

        let err = SvmError::from(CodecError::Guest(GuestError::MalformedResponse(
            "unknown variant `burn-app`".into(),
        )));
        assert!(err.is_fatal());

        let err = SvmError::from(CodecError::Guest(GuestError::Domain("bad".into())));
        assert!(!err.is_fatal());
    }
}
