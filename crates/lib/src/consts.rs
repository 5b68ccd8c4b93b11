pub const APP_NAME: &str = "stackdecl";

/// Environment variable overriding the state directory.
pub const HOME_ENV: &str = "STACKDECL_HOME";

/// Number of hex characters kept from a SHA-256 digest for object hashes.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Number of hex characters appended to auto-named provider IDs.
pub const AUTONAME_SUFFIX_LEN: usize = 7;

pub const DEFAULT_STACK: &str = "dev";
