/// Which errors are worth an analytics event.
use crate::errors::{CdpError, HttpErrorType};

/// Classification hook for error types used with a
/// [`MethodRegistry`](super::MethodRegistry).
pub trait Trackable {
    fn is_trackable(&self) -> bool;
}

impl Trackable for CdpError {
    fn is_trackable(&self) -> bool {
        is_trackable(self)
    }
}

/// Default classification:
///
/// - input validation failures are caller-caused and never tracked
/// - network failures are always tracked
/// - classified API errors are expected rejections, except `unexpected_error`
/// - anything else is tracked
pub fn is_trackable(error: &CdpError) -> bool {
    match error {
        CdpError::UserInputValidation(_) => false,
        CdpError::Network { .. } => true,
        CdpError::Api { error_type, .. } => *error_type == HttpErrorType::UnexpectedError,
        _ => true,
    }
}
