//! Response header policy: every response carries the shell's
//! Content-Security-Policy, whatever the server sent.

use tracing::debug;

use crate::config::PrivacyConfig;

const CSP_HEADER: &str = "Content-Security-Policy";

#[derive(Debug, Clone)]
pub struct ResponseHeaderPolicy {
    csp: String,
}

impl ResponseHeaderPolicy {
    pub fn new(csp: impl Into<String>) -> Self {
        Self { csp: csp.into() }
    }

    pub fn from_config(config: &PrivacyConfig) -> Self {
        Self::new(config.content_security_policy.clone())
    }

    /// Replaces any CSP header (name compared case-insensitively) with the
    /// configured one. Other headers are left as they are.
    pub fn apply(&self, headers: &mut Vec<(String, String)>) {
        let before = headers.len();
        headers.retain(|(name, _)| !name.eq_ignore_ascii_case(CSP_HEADER));
        if headers.len() != before {
            debug!("Server CSP replaced");
        }
        headers.push((CSP_HEADER.to_owned(), self.csp.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csp_is_added() {
        let policy = ResponseHeaderPolicy::from_config(&PrivacyConfig::default());
        let mut headers = vec![("Content-Type".to_string(), "text/html".to_string())];
        policy.apply(&mut headers);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[1].0, "Content-Security-Policy");
        assert!(headers[1].1.starts_with("default-src 'self'"));
    }

    #[test]
    fn test_server_csp_is_replaced() {
        let policy = ResponseHeaderPolicy::new("default-src 'none'");
        let mut headers = vec![
            ("content-security-policy".to_string(), "default-src *".to_string()),
            ("Set-Cookie".to_string(), "a=b".to_string()),
        ];
        policy.apply(&mut headers);
        let csp: Vec<_> = headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(CSP_HEADER))
            .collect();
        assert_eq!(csp.len(), 1);
        assert_eq!(csp[0].1, "default-src 'none'");
        assert!(headers.iter().any(|(n, _)| n == "Set-Cookie"));
    }
}
