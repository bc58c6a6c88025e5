/// Error code registry for config-transform
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Resolution errors
/// - 3000-3999: Backup and storage errors
/// - 4000-4999: Transform engine errors
/// - 5000-5999: Lock errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_PARSE_ERROR: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1003;

    // Resolution errors (2000-2999)
    pub const RESOLVE_GENERIC: u16 = 2000;
    pub const RESOLVE_TRANSFORM_MISSING: u16 = 2001;
    pub const RESOLVE_BASE_NOT_FOUND: u16 = 2002;

    // Backup and storage errors (3000-3999)
    pub const BACKUP_COPY_FAILED: u16 = 3001;
    pub const BACKUP_VERIFICATION_FAILED: u16 = 3002;
    pub const BACKUP_MISSING: u16 = 3003;
    pub const RESTORE_FAILED: u16 = 3004;

    // Transform engine errors (4000-4999)
    pub const ENGINE_MISSING_INPUT: u16 = 4001;
    pub const ENGINE_MALFORMED_DOCUMENT: u16 = 4002;
    pub const ENGINE_MALFORMED_DESCRIPTOR: u16 = 4003;
    pub const ENGINE_UNSUPPORTED_DIRECTIVE: u16 = 4004;
    pub const ENGINE_IO_ERROR: u16 = 4005;
    pub const ENGINE_PANICKED: u16 = 4006;

    // Lock errors (5000-5999)
    pub const LOCK_BUSY: u16 = 5001;
}

/// Get a human-readable description of an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        ErrorCode::CONFIG_GENERIC => "Configuration error",
        ErrorCode::CONFIG_NOT_FOUND => "Configuration file not found",
        ErrorCode::CONFIG_PARSE_ERROR => "Configuration file could not be parsed",
        ErrorCode::CONFIG_INVALID_VALUE => "Invalid configuration value",

        ErrorCode::RESOLVE_GENERIC => "Resolution error",
        ErrorCode::RESOLVE_TRANSFORM_MISSING => "Transform file does not exist",
        ErrorCode::RESOLVE_BASE_NOT_FOUND => "No base configuration file next to the transform",

        ErrorCode::BACKUP_COPY_FAILED => "Backup copy failed",
        ErrorCode::BACKUP_VERIFICATION_FAILED => "Backup does not match the base file",
        ErrorCode::BACKUP_MISSING => "Backup file not found",
        ErrorCode::RESTORE_FAILED => "Restoring the base file from backup failed",

        ErrorCode::ENGINE_MISSING_INPUT => "Transform input file not found",
        ErrorCode::ENGINE_MALFORMED_DOCUMENT => "Base document is not well-formed",
        ErrorCode::ENGINE_MALFORMED_DESCRIPTOR => "Transform descriptor is not well-formed",
        ErrorCode::ENGINE_UNSUPPORTED_DIRECTIVE => "Unsupported transform directive",
        ErrorCode::ENGINE_IO_ERROR => "Transform engine I/O error",
        ErrorCode::ENGINE_PANICKED => "Transform engine panicked",

        ErrorCode::LOCK_BUSY => "Another apply is in progress for this base file",

        _ => "Unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_have_descriptions() {
        for code in [
            ErrorCode::CONFIG_NOT_FOUND,
            ErrorCode::RESOLVE_BASE_NOT_FOUND,
            ErrorCode::BACKUP_COPY_FAILED,
            ErrorCode::ENGINE_MALFORMED_DESCRIPTOR,
            ErrorCode::LOCK_BUSY,
        ] {
            assert_ne!(describe_error_code(code), "Unknown error");
        }
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(describe_error_code(12345), "Unknown error");
    }
}
