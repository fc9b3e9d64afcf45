use rand::Rng;

/// Expected database schema version
/// A database created by another version is refused at startup
pub const EXPECTED_DB_VERSION: &str = "1";

/// Default page size for instance listings
pub const DEFAULT_INSTANCE_LIMIT: i64 = 50;

/// Generate an opaque API token for a newly provisioned user
pub fn generate_api_token() -> String {
    format!(
        "pt_{}",
        rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(32)
            .map(char::from)
            .collect::<String>()
    )
}
