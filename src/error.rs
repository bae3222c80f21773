/*!
 * Error Handling for the Vault Emulator
 *
 * Provides the error type shared by every store, engine and registry operation,
 * with numeric error codes, user-friendly messages, and suggested remediation.
 */

use std::collections::HashMap;
use thiserror::Error;

/// Error type for all vault operations
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Not found: {entity} {id}")]
    NotFound {
        entity: String,
        id: String,
        error_code: u32,
    },

    #[error("Already exists: {entity} {id}")]
    AlreadyExists {
        entity: String,
        id: String,
        error_code: u32,
    },

    #[error("Invalid argument: {parameter} - {expected} - got {actual}")]
    InvalidArgument {
        parameter: String,
        expected: String,
        actual: String,
        error_code: u32,
    },

    #[error("Invalid operation: {operation} - {reason}")]
    InvalidOperation {
        operation: String,
        reason: String,
        error_code: u32,
    },

    #[error("Invalid policy: {policy} - {details}")]
    InvalidPolicy {
        policy: String,
        details: String,
        error_code: u32,
    },

    #[error("Illegal state: {operation} - {cause}")]
    IllegalState {
        operation: String,
        cause: String,
        error_code: u32,
    },

    #[error("Cryptographic operation failed: {operation} - {cause}")]
    CryptoFailure {
        operation: String,
        cause: String,
        error_code: u32,
        context: HashMap<String, String>,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {setting} - {cause}")]
    ConfigurationError {
        setting: String,
        cause: String,
        error_code: u32,
    },
}

/// Field-less view of [`VaultError`] for matching on the error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    InvalidOperation,
    InvalidPolicy,
    IllegalState,
    CryptoFailure,
    Serialization,
    Configuration,
}

/// Error code constants for different error categories
pub mod error_codes {
    // Entity lifecycle errors: 1000-1999
    pub const ENTITY_NOT_FOUND: u32 = 1000;
    pub const VERSION_NOT_FOUND: u32 = 1001;
    pub const VAULT_NOT_FOUND: u32 = 1002;
    pub const ENTITY_ALREADY_EXISTS: u32 = 1100;
    pub const ENTITY_DELETED: u32 = 1101;
    pub const VAULT_ALREADY_EXISTS: u32 = 1102;
    pub const PURGE_NOT_ALLOWED: u32 = 1200;
    pub const VAULT_DELETE_NOT_ALLOWED: u32 = 1201;
    pub const LOCK_POISONED: u32 = 1202;
    pub const INCONSISTENT_STATE: u32 = 1203;

    // Argument errors: 2000-2999
    pub const INVALID_NAME: u32 = 2000;
    pub const INVALID_ARGUMENT: u32 = 2001;
    pub const INVALID_KEY_PARAMETERS: u32 = 2002;
    pub const INVALID_DIGEST_LENGTH: u32 = 2003;
    pub const INVALID_IV: u32 = 2004;
    pub const INVALID_BACKUP: u32 = 2005;
    pub const INVALID_TIME_SHIFT: u32 = 2006;
    pub const INVALID_CERTIFICATE_DATA: u32 = 2007;

    // Key operation errors: 3000-3999
    pub const OPERATION_NOT_ALLOWED: u32 = 3000;
    pub const OPERATION_NOT_SUPPORTED: u32 = 3001;
    pub const KEY_DISABLED: u32 = 3002;
    pub const MANAGED_ENTITY: u32 = 3003;
    pub const KEY_GENERATION_FAILED: u32 = 3100;
    pub const ENCRYPTION_FAILED: u32 = 3101;
    pub const DECRYPTION_FAILED: u32 = 3102;
    pub const SIGNING_FAILED: u32 = 3103;
    pub const KEY_ENCODING_FAILED: u32 = 3104;
    pub const CERTIFICATE_GENERATION_FAILED: u32 = 3105;
    pub const CERTIFICATE_PARSING_FAILED: u32 = 3106;

    // Policy errors: 4000-4999
    pub const INVALID_ROTATION_POLICY: u32 = 4000;
    pub const INVALID_LIFETIME_POLICY: u32 = 4001;
    pub const INVALID_RECOVERY_POLICY: u32 = 4002;
    pub const INVALID_CERTIFICATE_POLICY: u32 = 4003;

    // Serialization errors: 5000-5999
    pub const SERIALIZATION_FAILED: u32 = 5000;

    // Configuration errors: 6000-6999
    pub const INVALID_CONFIGURATION: u32 = 6000;
    pub const CONFIGURATION_IO: u32 = 6001;
}

impl VaultError {
    /// Get the error code for this error
    pub fn error_code(&self) -> u32 {
        match self {
            VaultError::NotFound { error_code, .. } => *error_code,
            VaultError::AlreadyExists { error_code, .. } => *error_code,
            VaultError::InvalidArgument { error_code, .. } => *error_code,
            VaultError::InvalidOperation { error_code, .. } => *error_code,
            VaultError::InvalidPolicy { error_code, .. } => *error_code,
            VaultError::IllegalState { error_code, .. } => *error_code,
            VaultError::CryptoFailure { error_code, .. } => *error_code,
            VaultError::SerializationError(_) => error_codes::SERIALIZATION_FAILED,
            VaultError::ConfigurationError { error_code, .. } => *error_code,
        }
    }

    /// Get the error category
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::NotFound { .. } => ErrorKind::NotFound,
            VaultError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            VaultError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            VaultError::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            VaultError::InvalidPolicy { .. } => ErrorKind::InvalidPolicy,
            VaultError::IllegalState { .. } => ErrorKind::IllegalState,
            VaultError::CryptoFailure { .. } => ErrorKind::CryptoFailure,
            VaultError::SerializationError(_) => ErrorKind::Serialization,
            VaultError::ConfigurationError { .. } => ErrorKind::Configuration,
        }
    }

    /// Get the error category/type as a string
    pub fn error_type(&self) -> &'static str {
        match self {
            VaultError::NotFound { .. } => "NotFound",
            VaultError::AlreadyExists { .. } => "AlreadyExists",
            VaultError::InvalidArgument { .. } => "InvalidArgument",
            VaultError::InvalidOperation { .. } => "InvalidOperation",
            VaultError::InvalidPolicy { .. } => "InvalidPolicy",
            VaultError::IllegalState { .. } => "IllegalState",
            VaultError::CryptoFailure { .. } => "CryptoFailure",
            VaultError::SerializationError(_) => "SerializationError",
            VaultError::ConfigurationError { .. } => "ConfigurationError",
        }
    }

    /// Get a user-friendly error message
    pub fn user_friendly_message(&self) -> String {
        match self {
            VaultError::NotFound { entity, id, .. } => {
                format!("The {} '{}' does not exist or is not active.", entity, id)
            }
            VaultError::AlreadyExists { entity, id, .. } => format!(
                "A {} named '{}' already exists, either active or deleted.",
                entity, id
            ),
            VaultError::InvalidArgument {
                parameter,
                expected,
                actual,
                ..
            } => format!(
                "Invalid value for '{}'. Expected {}, but got {}.",
                parameter, expected, actual
            ),
            VaultError::InvalidOperation {
                operation, reason, ..
            } => format!("The operation '{}' is not permitted: {}.", operation, reason),
            VaultError::InvalidPolicy { policy, details, .. } => {
                format!("The {} is not valid: {}.", policy, details)
            }
            VaultError::IllegalState {
                operation, cause, ..
            } => format!("Cannot {} in the current state: {}.", operation, cause),
            VaultError::CryptoFailure {
                operation, cause, ..
            } => format!("Cryptographic operation '{}' failed: {}.", operation, cause),
            VaultError::SerializationError(_) => {
                "Data serialization failed. Data format may be corrupted.".to_string()
            }
            VaultError::ConfigurationError { setting, cause, .. } => {
                format!("Configuration setting '{}' is invalid: {}.", setting, cause)
            }
        }
    }

    /// Get technical details for debugging
    pub fn technical_details(&self) -> HashMap<String, String> {
        let mut details = HashMap::new();

        details.insert("error_code".to_string(), self.error_code().to_string());
        details.insert("error_type".to_string(), self.error_type().to_string());

        match self {
            VaultError::NotFound { entity, id, .. } | VaultError::AlreadyExists { entity, id, .. } => {
                details.insert("entity".to_string(), entity.clone());
                details.insert("id".to_string(), id.clone());
            }
            VaultError::InvalidArgument {
                parameter,
                expected,
                actual,
                ..
            } => {
                details.insert("parameter".to_string(), parameter.clone());
                details.insert("expected".to_string(), expected.clone());
                details.insert("actual".to_string(), actual.clone());
            }
            VaultError::CryptoFailure {
                operation,
                cause,
                context,
                ..
            } => {
                details.insert("operation".to_string(), operation.clone());
                details.insert("cause".to_string(), cause.clone());
                details.extend(context.clone());
            }
            _ => {
                details.insert("details".to_string(), self.to_string());
            }
        }

        details
    }

    /// Get suggested remediation steps
    pub fn suggested_remediation(&self) -> Option<String> {
        match self {
            VaultError::AlreadyExists { error_code, .. } => match *error_code {
                error_codes::ENTITY_DELETED => Some(
                    "Recover or purge the deleted entity before creating it again.".to_string(),
                ),
                _ => Some("Choose a different name or restore into an empty name.".to_string()),
            },
            VaultError::IllegalState { error_code, .. } => match *error_code {
                error_codes::PURGE_NOT_ALLOWED => Some(
                    "Use a vault whose recovery level allows purging, or wait for the scheduled purge date."
                        .to_string(),
                ),
                error_codes::LOCK_POISONED => {
                    Some("Recreate the vault; a previous operation panicked while holding its lock.".to_string())
                }
                _ => None,
            },
            VaultError::InvalidOperation { error_code, .. } => match *error_code {
                error_codes::KEY_DISABLED => Some("Enable the key version before using it.".to_string()),
                error_codes::MANAGED_ENTITY => {
                    Some("Operate on the owning certificate instead.".to_string())
                }
                _ => Some(
                    "Check the allowed key operations and the algorithms supported by the key type."
                        .to_string(),
                ),
            },
            VaultError::InvalidPolicy { .. } => Some(
                "Review trigger bounds: rotation triggers need 7 days of headroom, certificate percentages must be 1-99."
                    .to_string(),
            ),
            VaultError::ConfigurationError { .. } => {
                Some("Check the vault configuration file for typos and bounds.".to_string())
            }
            _ => None,
        }
    }
}

/// Convenience constructors for common error types
impl VaultError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        VaultError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
            error_code: error_codes::ENTITY_NOT_FOUND,
        }
    }

    pub fn vault_not_found(uri: &str) -> Self {
        VaultError::NotFound {
            entity: "vault".to_string(),
            id: uri.to_string(),
            error_code: error_codes::VAULT_NOT_FOUND,
        }
    }

    pub fn already_exists(entity: &str, id: &str) -> Self {
        VaultError::AlreadyExists {
            entity: entity.to_string(),
            id: id.to_string(),
            error_code: error_codes::ENTITY_ALREADY_EXISTS,
        }
    }

    pub fn deleted_entity_exists(entity: &str, id: &str) -> Self {
        VaultError::AlreadyExists {
            entity: entity.to_string(),
            id: id.to_string(),
            error_code: error_codes::ENTITY_DELETED,
        }
    }

    pub fn invalid_argument(parameter: &str, expected: &str, actual: &str) -> Self {
        VaultError::InvalidArgument {
            parameter: parameter.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
            error_code: error_codes::INVALID_ARGUMENT,
        }
    }

    pub fn invalid_argument_with_code(
        parameter: &str,
        expected: &str,
        actual: &str,
        error_code: u32,
    ) -> Self {
        VaultError::InvalidArgument {
            parameter: parameter.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
            error_code,
        }
    }

    pub fn invalid_operation(operation: &str, reason: &str, error_code: u32) -> Self {
        VaultError::InvalidOperation {
            operation: operation.to_string(),
            reason: reason.to_string(),
            error_code,
        }
    }

    pub fn invalid_policy(policy: &str, details: &str, error_code: u32) -> Self {
        VaultError::InvalidPolicy {
            policy: policy.to_string(),
            details: details.to_string(),
            error_code,
        }
    }

    pub fn illegal_state(operation: &str, cause: &str, error_code: u32) -> Self {
        VaultError::IllegalState {
            operation: operation.to_string(),
            cause: cause.to_string(),
            error_code,
        }
    }

    pub fn crypto_failure(operation: &str, cause: &str, error_code: u32) -> Self {
        VaultError::CryptoFailure {
            operation: operation.to_string(),
            cause: cause.to_string(),
            error_code,
            context: HashMap::new(),
        }
    }

    pub fn crypto_failure_for_key(
        operation: &str,
        cause: &str,
        error_code: u32,
        key_type: &str,
    ) -> Self {
        let mut context = HashMap::new();
        context.insert("key_type".to_string(), key_type.to_string());

        VaultError::CryptoFailure {
            operation: operation.to_string(),
            cause: cause.to_string(),
            error_code,
            context,
        }
    }

    pub fn configuration(setting: &str, cause: &str) -> Self {
        VaultError::ConfigurationError {
            setting: setting.to_string(),
            cause: cause.to_string(),
            error_code: error_codes::INVALID_CONFIGURATION,
        }
    }

    pub fn lock_poisoned(resource: &str) -> Self {
        VaultError::illegal_state(
            &format!("lock {}", resource),
            "lock poisoned by a panicking writer",
            error_codes::LOCK_POISONED,
        )
    }
}

// From implementations for automatic error conversion
impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::ConfigurationError {
            setting: "file".to_string(),
            cause: format!("IO operation failed: {}", err),
            error_code: error_codes::CONFIGURATION_IO,
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::SerializationError(err.to_string())
    }
}

impl From<rsa::Error> for VaultError {
    fn from(err: rsa::Error) -> Self {
        VaultError::crypto_failure_for_key("rsa", &err.to_string(), error_codes::DECRYPTION_FAILED, "RSA")
    }
}

impl From<rcgen::Error> for VaultError {
    fn from(err: rcgen::Error) -> Self {
        VaultError::crypto_failure(
            "certificate generation",
            &err.to_string(),
            error_codes::CERTIFICATE_GENERATION_FAILED,
        )
    }
}

impl From<p12_keystore::error::Error> for VaultError {
    fn from(err: p12_keystore::error::Error) -> Self {
        VaultError::crypto_failure(
            "pkcs12",
            &err.to_string(),
            error_codes::CERTIFICATE_PARSING_FAILED,
        )
    }
}

/// Result type alias for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_and_kind() {
        let error = VaultError::deleted_entity_exists("key", "k1");
        assert_eq!(error.error_code(), error_codes::ENTITY_DELETED);
        assert_eq!(error.kind(), ErrorKind::AlreadyExists);
        assert_eq!(error.error_type(), "AlreadyExists");
    }

    #[test]
    fn test_user_friendly_message() {
        let error = VaultError::not_found("secret", "s1");
        let message = error.user_friendly_message();
        assert!(message.contains("s1"));
        assert!(message.contains("secret"));
    }

    #[test]
    fn test_technical_details() {
        let error = VaultError::crypto_failure_for_key(
            "decrypt",
            "bad padding",
            error_codes::DECRYPTION_FAILED,
            "RSA",
        );
        let details = error.technical_details();
        assert!(details.contains_key("error_code"));
        assert_eq!(details.get("cause").map(String::as_str), Some("bad padding"));
        assert_eq!(details.get("key_type").map(String::as_str), Some("RSA"));
    }

    #[test]
    fn test_remediation_suggestions() {
        let error = VaultError::illegal_state("purge", "not purgeable", error_codes::PURGE_NOT_ALLOWED);
        let suggestion = error.suggested_remediation();
        assert!(suggestion.is_some());
        assert!(suggestion.unwrap().contains("recovery level"));

        // Plain not-found errors carry no remediation
        assert!(VaultError::not_found("key", "k").suggested_remediation().is_none());
    }

    #[test]
    fn test_serde_json_errors_convert_to_serialization() {
        let err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let error: VaultError = err.into();
        assert_eq!(error.kind(), ErrorKind::Serialization);
    }
}
