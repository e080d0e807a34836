use std::error::Error;
use std::fmt;

/// Describes failures when reading or writing the stored credential.
///
/// Recoverable errors indicate that the credential backend was
/// temporarily unavailable (for example when the keychain service is
/// locked or inaccessible). Permanent errors surface the underlying
/// cause directly so callers can report them to the user.
#[derive(Debug)]
pub enum KeyringAccessError {
    Recoverable(keyring::Error),
    Permanent(keyring::Error),
}

impl KeyringAccessError {
    fn inner(&self) -> &keyring::Error {
        match self {
            KeyringAccessError::Recoverable(err) | KeyringAccessError::Permanent(err) => err,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, KeyringAccessError::Recoverable(_))
    }

    /// Hint shown next to the error when the keyring cannot be used.
    pub fn hint(&self) -> &'static str {
        if self.is_recoverable() {
            "The system keyring is unavailable. Unlock it and retry, or set GEMINI_API_KEY."
        } else {
            "Use --no-keyring together with GEMINI_API_KEY to skip the system keyring."
        }
    }
}

impl From<keyring::Error> for KeyringAccessError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                KeyringAccessError::Recoverable(err)
            }
            other => KeyringAccessError::Permanent(other),
        }
    }
}

impl fmt::Display for KeyringAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner())
    }
}

impl Error for KeyringAccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_failures_are_recoverable() {
        let err = KeyringAccessError::from(keyring::Error::PlatformFailure("locked".into()));
        assert!(err.is_recoverable());
        assert!(err.hint().contains("GEMINI_API_KEY"));

        let err = KeyringAccessError::from(keyring::Error::TooLong("user".to_string(), 10));
        assert!(!err.is_recoverable());
    }
}
