/// Path queried on every management address to learn the running version
pub const INFO_PATH: &str = "/info";

/// Prefix of every failure marker recorded in place of a version
pub const FAILURE_MARKER: &str = "Failed";

/// API path prefix
pub const API_PREFIX: &str = "/v1";

/// Declared-version keys end in `_<environment>` unless configured otherwise,
/// e.g. `foo_qa`, `bar_production`.
pub fn default_suffix(environment: &str) -> String {
    format!("_{}", environment)
}
