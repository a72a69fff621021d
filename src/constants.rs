// -
// Key namespace

/// Path separator of the remote key namespace
pub(crate) const KEY_SEPARATOR: char = '/';

/// Key read once at store construction to prove the service answers.
/// Absence is the expected outcome.
pub(crate) const PROBE_KEY: &str = "/confwatch/__probe__";

// -
// Config env

/// Environment variable naming an extra configuration file
pub(crate) const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Prefix for environment overrides, e.g. `CONFWATCH__CONNECTION__ENDPOINTS`
pub(crate) const ENV_PREFIX: &str = "CONFWATCH";
