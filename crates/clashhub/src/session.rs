//! Admin password gate.
//!
//! This is a shared string compared on the client; it keeps casual visitors
//! out of the admin commands and is not authentication. Anyone holding the
//! repository token can write regardless of the gate, and anyone able to
//! read the configuration can read the password.

use thiserror::Error;

/// Password used when none is configured.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("wrong admin password")]
    WrongPassword,
}

/// Compares password attempts against the configured shared string.
#[derive(Clone)]
pub struct AdminGate {
    password: String,
}

impl AdminGate {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    /// Exchange a password attempt for an [`AdminSession`].
    pub fn unlock(&self, attempt: &str) -> Result<AdminSession, GateError> {
        if attempt == self.password {
            tracing::debug!("Admin gate unlocked");
            Ok(AdminSession { _private: () })
        } else {
            Err(GateError::WrongPassword)
        }
    }
}

impl Default for AdminGate {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_PASSWORD)
    }
}

impl std::fmt::Debug for AdminGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminGate").finish_non_exhaustive()
    }
}

/// Proof that the admin gate was passed; required by every admin write.
#[derive(Debug)]
pub struct AdminSession {
    _private: (),
}

#[cfg(test)]
impl AdminSession {
    pub(crate) fn for_tests() -> Self {
        Self { _private: () }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gate_accepts_default_password() {
        assert!(AdminGate::default().unlock("admin").is_ok());
    }

    #[test]
    fn wrong_password_is_rejected() {
        let gate = AdminGate::new("s3cret");
        assert_eq!(gate.unlock("admin").unwrap_err(), GateError::WrongPassword);
        assert_eq!(gate.unlock("s3cret ").unwrap_err(), GateError::WrongPassword);
        assert!(gate.unlock("s3cret").is_ok());
    }

    #[test]
    fn debug_does_not_print_password() {
        assert!(!format!("{:?}", AdminGate::new("s3cret")).contains("s3cret"));
    }
}
