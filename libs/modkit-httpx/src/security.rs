//! Credential helpers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// `Authorization` header value for HTTP Basic authentication.
#[must_use]
pub fn basic_auth(username: &str, password: &str) -> String {
    let credentials = STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {credentials}")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth() {
        assert_eq!(basic_auth("admin", "secret"), "Basic YWRtaW46c2VjcmV0");
        assert_eq!(basic_auth("", ""), "Basic Og==");
    }
}
