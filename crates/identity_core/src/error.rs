use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no mapper found: {message}")]
    NoMapperFound { message: String },
    #[error("ambiguous result: {message}")]
    AmbiguousResult { message: String },
    #[error("missing session parameter: {message}")]
    MissingSessionParameter { message: String },
    #[error("encoding error: {message}")]
    Encoding { message: String },
    #[error("configuration integrity error: {message}")]
    ConfigurationIntegrity { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
}

impl IdentityError {
    pub fn no_mapper(message: impl Into<String>) -> Self {
        Self::NoMapperFound {
            message: message.into(),
        }
    }

    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self::AmbiguousResult {
            message: message.into(),
        }
    }

    pub fn missing_session(message: impl Into<String>) -> Self {
        Self::MissingSessionParameter {
            message: message.into(),
        }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::ConfigurationIntegrity {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

pub type IdentityResult<T> = Result<T, IdentityError>;

impl From<sea_orm::DbErr> for IdentityError {
    fn from(value: sea_orm::DbErr) -> Self {
        IdentityError::storage(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::IdentityError;

    #[test]
    fn helper_constructors_set_variants() {
        let err = IdentityError::no_mapper("User");
        assert!(matches!(err, IdentityError::NoMapperFound { .. }));
        let err = IdentityError::ambiguous("two realms");
        assert!(matches!(err, IdentityError::AmbiguousResult { .. }));
        let err = IdentityError::missing_session("ctx");
        assert!(matches!(err, IdentityError::MissingSessionParameter { .. }));
        let err = IdentityError::encoding("base64");
        assert!(matches!(err, IdentityError::Encoding { .. }));
        let err = IdentityError::integrity("configuration name");
        assert!(matches!(err, IdentityError::ConfigurationIntegrity { .. }));
        let err = IdentityError::storage("disk");
        assert!(matches!(err, IdentityError::Storage { .. }));
        let err = IdentityError::not_found("row");
        assert!(matches!(err, IdentityError::NotFound { .. }));
        let err = IdentityError::invalid("bad");
        assert!(matches!(err, IdentityError::Validation { .. }));
    }

    #[test]
    fn display_includes_message() {
        let err = IdentityError::no_mapper("type [Widget]");
        assert_eq!(err.to_string(), "no mapper found: type [Widget]");
    }
}
