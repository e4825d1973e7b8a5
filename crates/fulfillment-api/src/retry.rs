use std::collections::BTreeSet;

use crate::error::RequestFailure;

/// Response signatures that mean the access token should be replaced
///
/// The default matches a `401` status, a body `error` of
/// `invalid_request`, or a body `error_code` of `1100`. Older API revisions
/// only signalled `invalid_request`; use [`AuthRetryPolicy::without_error_code`]
/// to drop the vendor code when talking to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRetryPolicy {
    statuses: BTreeSet<u16>,
    errors: BTreeSet<String>,
    error_codes: BTreeSet<String>,
}

impl Default for AuthRetryPolicy {
    fn default() -> Self {
        Self::none()
            .with_status(401)
            .with_error("invalid_request")
            .with_error_code("1100")
    }
}

impl AuthRetryPolicy {
    /// A policy that never triggers a refresh
    pub fn none() -> Self {
        Self {
            statuses: BTreeSet::new(),
            errors: BTreeSet::new(),
            error_codes: BTreeSet::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.statuses.insert(status);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.insert(error.into());
        self
    }

    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_codes.insert(code.into());
        self
    }

    pub fn without_status(mut self, status: u16) -> Self {
        self.statuses.remove(&status);
        self
    }

    pub fn without_error(mut self, error: &str) -> Self {
        self.errors.remove(error);
        self
    }

    pub fn without_error_code(mut self, code: &str) -> Self {
        self.error_codes.remove(code);
        self
    }

    /// Whether `failure` carries one of the configured signatures
    pub fn matches(&self, failure: &RequestFailure) -> bool {
        if self.statuses.contains(&failure.status) {
            return true;
        }

        let parsed = failure.parsed();
        let error_matches = parsed
            .error()
            .is_some_and(|error| self.errors.contains(error));
        let code_matches = parsed
            .error_code()
            .is_some_and(|code| self.error_codes.contains(&code));

        error_matches || code_matches
    }
}
