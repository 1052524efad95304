//! Gateway settings read from the environment.
use reqwest::Url;
use std::time::Duration;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid duration for {key}: {value}")]
    Duration { key: &'static str, value: String },

    #[error("invalid number for {key}: {value}")]
    Number { key: &'static str, value: String },

    #[error("invalid URL for {key}: {value}")]
    Url { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub functions_provider_url: Url,
    pub function_namespace: String,
    pub auth_token: Option<String>,
    pub scale_from_zero: bool,
    pub max_poll_count: u32,
    pub function_poll_interval: Duration,
    pub cache_expiry: Duration,
    pub cache_sweep_interval: Option<Duration>,
    pub single_flight: bool,
    pub upstream_timeout: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = get("functions_provider_url")
            .unwrap_or_else(|| "http://127.0.0.1:8081/".to_string());
        let functions_provider_url = Url::parse(&provider).map_err(|_| ConfigError::Url {
            key: "functions_provider_url",
            value: provider.clone(),
        })?;

        let max_poll_count = match get("max_poll_count") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Number {
                key: "max_poll_count",
                value: v,
            })?,
            None => 1000,
        };

        let cache_sweep_interval = get("cache_sweep_interval")
            .map(|v| match parse_duration("cache_sweep_interval", &v)? {
                d if d.is_zero() => Err(ConfigError::Duration {
                    key: "cache_sweep_interval",
                    value: v,
                }),
                d => Ok(d),
            })
            .transpose()?;

        Ok(Self {
            bind_addr: get("bind_addr").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            functions_provider_url,
            function_namespace: get("function_namespace").unwrap_or_default(),
            auth_token: get("auth_token"),
            scale_from_zero: parse_bool(get("scale_from_zero"), true),
            max_poll_count,
            function_poll_interval: duration_or(
                "function_poll_interval",
                get("function_poll_interval"),
                Duration::from_millis(50),
            )?,
            cache_expiry: duration_or(
                "cache_expiry",
                get("cache_expiry"),
                Duration::from_millis(250),
            )?,
            cache_sweep_interval,
            single_flight: parse_bool(get("single_flight"), false),
            upstream_timeout: duration_or(
                "upstream_timeout",
                get("upstream_timeout"),
                Duration::from_secs(60),
            )?,
        })
    }
}

fn duration_or(
    key: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    value.map_or(Ok(default), |v| parse_duration(key, &v))
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

/// Accepts `250ms`, `2s`, `1m`, `1h`, or a bare integer meaning seconds.
pub fn parse_duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::Duration {
        key,
        value: value.to_string(),
    };
    let v = value.trim();

    if let Ok(secs) = v.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let split = v.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
    let (digits, unit) = v.split_at(split);
    let n: u64 = digits.parse().map_err(|_| invalid())?;

    let secs_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(n)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(invalid()),
    };
    n.checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.functions_provider_url.as_str(), "http://127.0.0.1:8081/");
        assert!(cfg.scale_from_zero);
        assert!(!cfg.single_flight);
        assert_eq!(cfg.max_poll_count, 1000);
        assert_eq!(cfg.function_poll_interval, Duration::from_millis(50));
        assert_eq!(cfg.cache_expiry, Duration::from_millis(250));
        assert_eq!(cfg.cache_sweep_interval, None);
        assert_eq!(cfg.auth_token, None);
    }

    #[test]
    fn reads_overrides() {
        let cfg = config(&[
            ("max_poll_count", "20"),
            ("function_poll_interval", "100ms"),
            ("cache_expiry", "2"),
            ("cache_sweep_interval", "1m"),
            ("single_flight", "true"),
            ("scale_from_zero", "false"),
            ("function_namespace", "openfaas-fn"),
        ])
        .unwrap();
        assert_eq!(cfg.max_poll_count, 20);
        assert_eq!(cfg.function_poll_interval, Duration::from_millis(100));
        assert_eq!(cfg.cache_expiry, Duration::from_secs(2));
        assert_eq!(cfg.cache_sweep_interval, Some(Duration::from_secs(60)));
        assert!(cfg.single_flight);
        assert!(!cfg.scale_from_zero);
        assert_eq!(cfg.function_namespace, "openfaas-fn");
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            config(&[("cache_expiry", "soon")]).unwrap_err(),
            ConfigError::Duration {
                key: "cache_expiry",
                value: "soon".into()
            }
        );
        assert!(matches!(
            config(&[("max_poll_count", "-1")]),
            Err(ConfigError::Number { .. })
        ));
        assert!(matches!(
            config(&[("functions_provider_url", "not a url")]),
            Err(ConfigError::Url { .. })
        ));
        assert!(parse_duration("x", "10parsecs").is_err());
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        for value in ["0", "0ms", "0s"] {
            assert_eq!(
                config(&[("cache_sweep_interval", value)]).unwrap_err(),
                ConfigError::Duration {
                    key: "cache_sweep_interval",
                    value: value.into()
                }
            );
        }
        assert_eq!(
            config(&[("cache_sweep_interval", "30s")]).unwrap().cache_sweep_interval,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn oversized_durations_are_rejected() {
        assert!(parse_duration("cache_expiry", "400000000000000000m").is_err());
        assert!(parse_duration("cache_expiry", "400000000000000000h").is_err());
        assert_eq!(
            parse_duration("cache_expiry", "2h").unwrap(),
            Duration::from_secs(7200)
        );
    }
}
