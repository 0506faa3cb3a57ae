pub mod tokens {
    /// Wall-clock format the controller uses for `expiresAt` (interpreted as GMT).
    pub const EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    /// Sleep between re-reads while another process holds the refresh lock.
    pub const LOCK_WAIT_MS: u64 = 5_000;
    /// Re-reads of a freshly locked record before refreshing anyway.
    pub const LOCK_MAX_ATTEMPTS: u32 = 3;
    /// A lock older than this is abandoned and the record refreshed in place.
    pub const LOCK_STALE_AFTER_SECS: i64 = 60;
}

pub mod auth {
    /// Catalog entry holding the organization login path.
    pub const ORG_LOGIN_ENDPOINT: &str = "get_token";
    /// Catalog entry holding the tenant assume-role path.
    pub const TENANT_TOKEN_ENDPOINT: &str = "get_tenant_token";
    /// `errcode` value the controller returns on a successful login.
    pub const SUCCESS_ERRCODE: &str = "0";
    /// Header carrying the organization token on the assume-role call.
    pub const ACCESS_TOKEN_HEADER: &str = "X-ACCESS-TOKEN";
    /// Login password fallback, so the secret can stay off the process list.
    pub const PASSWORD_ENV: &str = "CLOUDHARVEST_PASSWORD";
}

pub mod http {
    /// Cap on response-body bytes captured for failure logs.
    pub const ERROR_PREVIEW_LIMIT: usize = 32 * 1024;
}

pub mod db {
    /// Pool cap per registry entry; invocations are short-lived and serial.
    pub const MAX_CONNECTIONS: u32 = 4;
}

pub mod catalog {
    pub const DEFAULT_RESPONSE_KEY: &str = "data";
    /// Output-configuration entry used when an endpoint has no entry of its own.
    pub const DEFAULT_HANDLER: &str = "default";
}

pub mod paths {
    pub const CONFIG_DIR_ENV: &str = "CLOUDHARVEST_CONFIG_DIR";
    pub const CREDENTIALS_DIR_ENV: &str = "CLOUDHARVEST_CREDENTIALS_DIR";
    pub const DEFAULT_CONFIG_DIR: &str = "config";
    pub const CREDENTIALS_SUBDIR: &str = "credentials";
    pub const API_CONFIG_FILE: &str = "api_config.json";
    pub const OUTPUT_CONFIG_FILE: &str = "output_config.json";
}

pub mod exit {
    pub const SUCCESS: i32 = 0;
    /// Authentication failures get their own code so schedulers can tell
    /// credential rot from endpoint trouble.
    pub const AUTH_FAILURE: i32 = 1;
    pub const FAILURE: i32 = 3;
}
