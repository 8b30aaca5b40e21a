use crate::NutritionApiError;
use secrecy::SecretString;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(1500);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct Config {
    pub base_url: String,
    /// Previously stored bearer token, if any.
    pub token: Option<SecretString>,
    pub save_debounce: Duration,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            token: None,
            save_debounce: DEFAULT_SAVE_DEBOUNCE,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, NutritionApiError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function instead of the process environment.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, NutritionApiError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let base_url = get("NUTRISCAN_BASE_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let token = get("NUTRISCAN_TOKEN")
            .filter(|s| !s.trim().is_empty())
            .map(|t| SecretString::new(t.into()));
        let save_debounce = match get("NUTRISCAN_SAVE_DEBOUNCE_MS") {
            Some(raw) => Duration::from_millis(raw.trim().parse::<u64>().map_err(|_| {
                NutritionApiError::Config(format!("NUTRISCAN_SAVE_DEBOUNCE_MS invalid: {raw}"))
            })?),
            None => DEFAULT_SAVE_DEBOUNCE,
        };
        let http_timeout = match get("NUTRISCAN_HTTP_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.trim().parse::<u64>().map_err(|_| {
                NutritionApiError::Config(format!("NUTRISCAN_HTTP_TIMEOUT_SECS invalid: {raw}"))
            })?),
            None => DEFAULT_HTTP_TIMEOUT,
        };
        Ok(Self {
            base_url,
            token,
            save_debounce,
            http_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn from_env_defaults() {
        let cfg = Config::from_env_with(|_| None).expect("cfg");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert!(cfg.token.is_none());
        assert_eq!(cfg.save_debounce, Duration::from_millis(1500));
    }

    #[test]
    fn from_env_reads_values() {
        let get = |k: &str| match k {
            "NUTRISCAN_BASE_URL" => Some("http://localhost:9000".into()),
            "NUTRISCAN_TOKEN" => Some("tok".into()),
            "NUTRISCAN_SAVE_DEBOUNCE_MS" => Some("250".into()),
            "NUTRISCAN_HTTP_TIMEOUT_SECS" => Some("5".into()),
            _ => None,
        };
        let cfg = Config::from_env_with(get).expect("cfg");
        assert_eq!(cfg.base_url, "http://localhost:9000");
        assert_eq!(cfg.token.unwrap().expose_secret(), "tok");
        assert_eq!(cfg.save_debounce, Duration::from_millis(250));
        assert_eq!(cfg.http_timeout, Duration::from_secs(5));
    }

    #[test]
    fn from_env_blank_token_is_absent() {
        let get = |k: &str| match k {
            "NUTRISCAN_TOKEN" => Some("  ".into()),
            _ => None,
        };
        let cfg = Config::from_env_with(get).expect("cfg");
        assert!(cfg.token.is_none());
    }

    #[test]
    fn from_env_invalid_debounce_errors() {
        let get = |k: &str| match k {
            "NUTRISCAN_SAVE_DEBOUNCE_MS" => Some("soon".into()),
            _ => None,
        };
        let res = Config::from_env_with(get);
        assert!(matches!(res, Err(NutritionApiError::Config(_))));
    }
}
