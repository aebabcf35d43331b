//! # Status Codes
//!
//! HTTP-style status codes returned by the OpenBTS services, and the pure
//! partition that classifies them.

/// Request handled.
pub const STATUS_OK: i64 = 200;
/// Request handled, nothing to return.
pub const STATUS_NO_CONTENT: i64 = 204;
/// Update was a no-op (value unchanged).
pub const STATUS_NOT_MODIFIED: i64 = 304;
/// Request is missing or carries malformed fields.
pub const STATUS_BAD_REQUEST: i64 = 400;
/// Target of the request does not exist.
pub const STATUS_NOT_FOUND: i64 = 404;
/// Request is well formed but would violate a service rule.
pub const STATUS_NOT_ACCEPTABLE: i64 = 406;
/// Target already exists.
pub const STATUS_CONFLICT: i64 = 409;
/// Internal service failure.
pub const STATUS_SERVER_ERROR: i64 = 500;
/// Command or action is not implemented by this service.
pub const STATUS_NOT_IMPLEMENTED: i64 = 501;
/// Service cannot handle requests right now.
pub const STATUS_SERVICE_UNAVAILABLE: i64 = 503;

/// Outcome class of a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx and 3xx.
    Success,
    /// 4xx: the service rejected the request itself.
    InvalidRequest,
    /// 5xx: the service failed while handling the request.
    ServiceFailure,
    /// Outside every known range.
    Unrecognized,
}

impl StatusClass {
    /// Classifies a status code by range.
    pub const fn of(code: i64) -> Self {
        match code {
            200..=399 => StatusClass::Success,
            400..=499 => StatusClass::InvalidRequest,
            500..=599 => StatusClass::ServiceFailure,
            _ => StatusClass::Unrecognized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_boundaries() {
        assert_eq!(StatusClass::of(199), StatusClass::Unrecognized);
        assert_eq!(StatusClass::of(STATUS_OK), StatusClass::Success);
        assert_eq!(StatusClass::of(STATUS_NO_CONTENT), StatusClass::Success);
        assert_eq!(StatusClass::of(STATUS_NOT_MODIFIED), StatusClass::Success);
        assert_eq!(StatusClass::of(399), StatusClass::Success);
        assert_eq!(StatusClass::of(STATUS_BAD_REQUEST), StatusClass::InvalidRequest);
        assert_eq!(StatusClass::of(STATUS_NOT_FOUND), StatusClass::InvalidRequest);
        assert_eq!(StatusClass::of(STATUS_CONFLICT), StatusClass::InvalidRequest);
        assert_eq!(StatusClass::of(499), StatusClass::InvalidRequest);
        assert_eq!(StatusClass::of(STATUS_SERVER_ERROR), StatusClass::ServiceFailure);
        assert_eq!(StatusClass::of(STATUS_SERVICE_UNAVAILABLE), StatusClass::ServiceFailure);
        assert_eq!(StatusClass::of(600), StatusClass::Unrecognized);
        assert_eq!(StatusClass::of(-1), StatusClass::Unrecognized);
    }
}
