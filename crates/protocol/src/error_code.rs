//! Numeric error codes carried in wallet responses and connect errors.

use std::fmt;

/// Closed set of error codes understood by dApp SDKs.
///
/// RPC responses (`sendTransaction`, `signData`, `disconnect`) and
/// `connect_error` events share one numbering. `ManifestNotFound` and
/// `ManifestContent` only occur in connect errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unknown,
    BadRequest,
    ManifestNotFound,
    ManifestContent,
    UnknownApp,
    UserRejects,
    MethodNotSupported,
    /// Expired request. dApp SDKs have no dedicated timeout code, so this
    /// goes out as `BadRequest` on the wire.
    Timeout,
}

impl ErrorCode {
    /// Wire value.
    pub const fn code(self) -> u16 {
        match self {
            Self::Unknown => 0,
            Self::BadRequest | Self::Timeout => 1,
            Self::ManifestNotFound => 2,
            Self::ManifestContent => 3,
            Self::UnknownApp => 100,
            Self::UserRejects => 300,
            Self::MethodNotSupported => 400,
        }
    }

    /// Maps a wire value back to a code. `1` always reads as `BadRequest`.
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Unknown),
            1 => Some(Self::BadRequest),
            2 => Some(Self::ManifestNotFound),
            3 => Some(Self::ManifestContent),
            100 => Some(Self::UnknownApp),
            300 => Some(Self::UserRejects),
            400 => Some(Self::MethodNotSupported),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN_ERROR",
            Self::BadRequest => "BAD_REQUEST_ERROR",
            Self::ManifestNotFound => "MANIFEST_NOT_FOUND_ERROR",
            Self::ManifestContent => "MANIFEST_CONTENT_ERROR",
            Self::UnknownApp => "UNKNOWN_APP_ERROR",
            Self::UserRejects => "USER_REJECTS_ERROR",
            Self::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            Self::Timeout => "TIMEOUT_ERROR",
        };
        write!(f, "{name}({})", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes() {
        assert_eq!(ErrorCode::UserRejects.code(), 300);
        assert_eq!(ErrorCode::Timeout.code(), ErrorCode::BadRequest.code());
        assert_eq!(ErrorCode::from_code(100), Some(ErrorCode::UnknownApp));
        assert_eq!(ErrorCode::from_code(1), Some(ErrorCode::BadRequest));
        assert_eq!(ErrorCode::from_code(42), None);
    }
}
