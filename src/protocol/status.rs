//! Status-code vocabulary for status lines and the error page.

use http::StatusCode;

/// Reason phrase for the status line.
pub fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown Status")
}

/// Longer, user-facing description rendered into the default error page.
pub fn describe(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "The server could not understand the request.",
        401 => "The requested resource requires authentication.",
        403 => "Access to the requested resource has been denied.",
        404 => "The requested resource could not be found on this server.",
        405 => "The requested method is not allowed for this resource.",
        408 => "The server timed out while waiting for the request.",
        413 => "The request entity is larger than the server is willing to process.",
        416 => "The requested range is not satisfiable by this resource.",
        500 => "The server encountered an internal error while handling the request.",
        501 => "The server does not support the functionality required by the request.",
        503 => "The server is currently unable to handle the request.",
        _ => "The request could not be completed.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_have_specific_descriptions() {
        assert_eq!(reason(StatusCode::NOT_FOUND), "Not Found");
        assert!(describe(StatusCode::NOT_FOUND).contains("could not be found"));
        assert!(describe(StatusCode::INTERNAL_SERVER_ERROR).contains("internal error"));
    }

    #[test]
    fn unknown_codes_fall_back() {
        let status = StatusCode::from_u16(599).unwrap();
        assert_eq!(describe(status), "The request could not be completed.");
    }
}
