/// Page used when a listing request omits it or sends zero
pub const DEFAULT_PAGE: u64 = 1;

/// Page size used when a listing request omits it or sends zero
pub const DEFAULT_PAGE_LIMIT: u64 = 10;

/// Default sort field for listings (newest first)
pub const DEFAULT_SORT_FIELD: &str = "createdAt";

/// Recipients per bulk-mail batch
pub const BULK_BATCH_SIZE: usize = 8;

/// Pause between bulk-mail batches in seconds (5 minutes)
/// Keeps the SMTP relay under its per-window sending quota
pub const BULK_INTERVAL_SECS: u64 = 300;

/// Number of digits in a one-time password
pub const OTP_DIGITS: usize = 6;

/// Default OTP lifetime, in the `<n><unit>` duration format
pub const DEFAULT_OTP_TTL: &str = "5m";

/// Default JWT lifetime in seconds (24 hours)
pub const DEFAULT_JWT_EXPIRATION_SECS: i64 = 86_400;

/// Default bcrypt work factor
pub const DEFAULT_BCRYPT_COST: u32 = 10;

// =============================================================================
// Error Messages
// =============================================================================

/// Returned when neither the Authorization header nor the query carries a token
pub const ERR_NO_TOKEN: &str = "No token provided";

/// Returned when the verifier rejects a token or a role check fails
pub const ERR_UNAUTHORIZED: &str = "Unauthorized";

/// Body message for every 500 response; the real cause is only logged
pub const ERR_INTERNAL: &str = "Internal Server Error";

/// Credential payloads must identify the user somehow
pub const ERR_EMAIL_OR_PHONE_REQUIRED: &str = "Email or phone number required";

/// Credential payloads must carry a password
pub const ERR_PASSWORD_REQUIRED: &str = "Password is required";

/// Sort keys must be plain field names
pub const ERR_INVALID_SORT: &str = "Sort must be a field name";

/// The requested page starts beyond any offset storage can address
pub const ERR_PAGE_OUT_OF_RANGE: &str = "Page is out of range";
