//! Process exit codes
//!
//! Scripts rely on these values, so they never change meaning once released.

use cd_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// Bad arguments, paths or value strings
    UsageError = 2,
    /// Transport failures and retryable service errors
    NetworkError = 3,
    AuthError = 4,
    NotFound = 5,
    Conflict = 6,
    UnsupportedFeature = 7,
    Interrupted = 130,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_error(error: &Error) -> Self {
        match error {
            e if e.is_usage_error() => ExitCode::UsageError,
            Error::Network(_) => ExitCode::NetworkError,
            Error::Backend { status, .. } if cd_core::is_retryable_error(error) || *status >= 500 => {
                ExitCode::NetworkError
            }
            Error::Auth(_) => ExitCode::AuthError,
            Error::NotFound(_) | Error::DriveNotFound(_) => ExitCode::NotFound,
            Error::Conflict(_) => ExitCode::Conflict,
            Error::UnsupportedFeature(_) => ExitCode::UnsupportedFeature,
            _ => ExitCode::GeneralError,
        }
    }
}
