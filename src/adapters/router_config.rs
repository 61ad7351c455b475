//! Router connection settings
//!
//! Resolved once from the operator's environment at startup and handed to
//! every reconcile. Missing values are kept as `None` so that each reconcile
//! reports them as a permanent failure of that resource.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Router address (`host:port`)
pub const ENV_ROUTER: &str = "ROUTER";
/// Router API user
pub const ENV_USER: &str = "USER";
/// Router API password
pub const ENV_PASSWD: &str = "PASSWD";
/// TLS verification switch
pub const ENV_CA_VERIFY: &str = "CA_VERIFY";
/// Per-request deadline for router calls, in seconds
pub const ENV_ROUTER_TIMEOUT_SECS: &str = "ROUTER_TIMEOUT_SECS";

/// Default per-request deadline
pub const DEFAULT_ROUTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Whether the router's TLS certificate is verified
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TlsVerification {
    #[default]
    Enabled,
    Disabled,
}

impl TlsVerification {
    /// Interpret a `CA_VERIFY` value.
    ///
    /// | value                  | result     |
    /// |------------------------|------------|
    /// | unset or empty         | `Enabled`  |
    /// | `"false"`, `"False"`   | `Disabled` |
    /// | anything else          | `Enabled`  |
    ///
    /// Matching is exact: `"FALSE"`, `" false"` or `"0"` keep verification on.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some("false") | Some("False") => TlsVerification::Disabled,
            _ => TlsVerification::Enabled,
        }
    }

    pub fn is_enabled(self) -> bool {
        self == TlsVerification::Enabled
    }
}

/// Settings as found in the environment, possibly incomplete
#[derive(Clone, Debug, Default)]
pub struct RouterSettings {
    pub router: Option<String>,
    pub username: Option<String>,
    pub password: Option<Redacted>,
    pub tls_verification: TlsVerification,
    pub timeout: Option<Duration>,
}

impl RouterSettings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which returns the value of a variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let timeout = match non_empty(ENV_ROUTER_TIMEOUT_SECS) {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|e| {
                    Error::config(format!(
                        "Invalid {} '{}': {}",
                        ENV_ROUTER_TIMEOUT_SECS, raw, e
                    ))
                })?;
                if secs == 0 {
                    return Err(Error::config(format!(
                        "{} must be greater than zero",
                        ENV_ROUTER_TIMEOUT_SECS
                    )));
                }
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            router: non_empty(ENV_ROUTER),
            username: non_empty(ENV_USER),
            password: non_empty(ENV_PASSWD).map(Redacted),
            tls_verification: TlsVerification::from_env_value(lookup(ENV_CA_VERIFY).as_deref()),
            timeout,
        })
    }

    /// Validate into a complete [`RouterConfig`]
    pub fn resolve(&self) -> Result<RouterConfig> {
        let Some(host) = &self.router else {
            return Err(Error::config("ROUTER environment variable is not set!"));
        };

        let (Some(username), Some(password)) = (&self.username, &self.password) else {
            return Err(Error::config("USER and PASSWD environment variables not set!"));
        };

        Ok(RouterConfig {
            host: host.clone(),
            username: username.clone(),
            password: password.0.clone(),
            verify_tls: self.tls_verification.is_enabled(),
            timeout: self.timeout.unwrap_or(DEFAULT_ROUTER_TIMEOUT),
        })
    }
}

/// Complete router connection configuration
#[derive(Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Router address, `host:port` or a full base URL
    pub host: String,
    pub username: String,
    pub password: String,
    /// Verify the router's TLS certificate
    pub verify_tls: bool,
    /// Deadline for each router request
    pub timeout: Duration,
}

impl fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("verify_tls", &self.verify_tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Secret string that never shows up in logs
#[derive(Clone, PartialEq, Eq)]
pub struct Redacted(pub String);

impl fmt::Debug for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<RouterSettings> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RouterSettings::from_lookup(|key| env.get(key).cloned())
    }

    fn complete() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_ROUTER, "192.168.88.1:443"),
            (ENV_USER, "admin"),
            (ENV_PASSWD, "secret"),
        ]
    }

    #[test]
    fn test_tls_verification_table() {
        assert_eq!(TlsVerification::from_env_value(None), TlsVerification::Enabled);
        assert_eq!(TlsVerification::from_env_value(Some("")), TlsVerification::Enabled);
        assert_eq!(
            TlsVerification::from_env_value(Some("false")),
            TlsVerification::Disabled
        );
        assert_eq!(
            TlsVerification::from_env_value(Some("False")),
            TlsVerification::Disabled
        );
        for value in ["FALSE", "true", "True", "0", "no", " false", "false "] {
            assert_eq!(
                TlsVerification::from_env_value(Some(value)),
                TlsVerification::Enabled,
                "CA_VERIFY={:?} should keep verification on",
                value
            );
        }
    }

    #[test]
    fn test_resolve_complete_settings() {
        let mut vars = complete();
        vars.push((ENV_CA_VERIFY, "false"));
        vars.push((ENV_ROUTER_TIMEOUT_SECS, "3"));

        let cfg = settings(&vars).unwrap().resolve().unwrap();

        assert_eq!(cfg.host, "192.168.88.1:443");
        assert_eq!(cfg.username, "admin");
        assert_eq!(cfg.password, "secret");
        assert!(!cfg.verify_tls);
        assert_eq!(cfg.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_resolve_defaults() {
        let cfg = settings(&complete()).unwrap().resolve().unwrap();

        assert!(cfg.verify_tls);
        assert_eq!(cfg.timeout, DEFAULT_ROUTER_TIMEOUT);
    }

    #[test]
    fn test_resolve_missing_router() {
        let vars: Vec<_> = complete()
            .into_iter()
            .filter(|(k, _)| *k != ENV_ROUTER)
            .collect();

        let err = settings(&vars).unwrap().resolve().unwrap_err();
        assert!(err.to_string().contains("ROUTER"));
    }

    #[test]
    fn test_resolve_missing_credentials() {
        for missing in [ENV_USER, ENV_PASSWD] {
            let vars: Vec<_> = complete()
                .into_iter()
                .filter(|(k, _)| *k != missing)
                .collect();

            let err = settings(&vars).unwrap().resolve().unwrap_err();
            assert!(err.to_string().contains("USER and PASSWD"));
        }
    }

    #[test]
    fn test_empty_values_count_as_missing() {
        let vars = vec![(ENV_ROUTER, ""), (ENV_USER, "admin"), (ENV_PASSWD, "secret")];

        let s = settings(&vars).unwrap();
        assert!(s.router.is_none());
        assert!(s.resolve().is_err());
    }

    #[test]
    fn test_invalid_timeout_is_rejected() {
        let mut vars = complete();
        vars.push((ENV_ROUTER_TIMEOUT_SECS, "soon"));
        assert!(settings(&vars).is_err());

        let mut vars = complete();
        vars.push((ENV_ROUTER_TIMEOUT_SECS, "0"));
        assert!(settings(&vars).is_err());
    }

    #[test]
    fn test_password_is_redacted_in_debug() {
        let s = settings(&complete()).unwrap();
        assert!(!format!("{:?}", s).contains("secret"));
        assert!(!format!("{:?}", s.resolve().unwrap()).contains("secret"));
    }
}
