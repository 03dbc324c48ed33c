use std::{collections::BTreeMap, str::FromStr};

/// A flattened key-value configuration store, parsed once from TOML and
/// queried with typed accessors.
#[derive(Debug, Default, Clone)]
pub struct Config {
    keys: BTreeMap<String, String>,
    pub errors: Vec<ConfigError>,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub key: String,
    pub reason: String,
}

impl Config {
    pub fn parse(text: &str) -> Self {
        let mut config = Config::default();
        match toml::from_str::<toml::Value>(text) {
            Ok(value) => config.flatten(String::new(), &value),
            Err(err) => config.errors.push(ConfigError {
                key: String::new(),
                reason: err.to_string(),
            }),
        }
        config
    }

    fn flatten(&mut self, prefix: String, value: &toml::Value) {
        match value {
            toml::Value::Table(map) => {
                for (k, v) in map {
                    let key = if prefix.is_empty() {
                        k.clone()
                    } else {
                        format!("{prefix}.{k}")
                    };
                    self.flatten(key, v);
                }
            }
            toml::Value::Array(items) => {
                for (idx, v) in items.iter().enumerate() {
                    self.flatten(format!("{prefix}.{idx}"), v);
                }
            }
            toml::Value::String(s) => {
                self.keys.insert(prefix, s.clone());
            }
            other => {
                self.keys.insert(prefix, other.to_string());
            }
        }
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(|s| s.as_str())
    }

    pub fn property<T: FromStr>(&self, key: &str) -> Option<T> {
        self.value(key).and_then(|v| v.parse().ok())
    }

    pub fn property_or_default<T: FromStr>(&self, key: &str, default: T) -> T {
        self.property(key).unwrap_or(default)
    }

    pub fn new_build_error(&mut self, key: &str, reason: impl ToString) {
        self.errors.push(ConfigError {
            key: key.to_string(),
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_tables() {
        let config = Config::parse(
            r#"
            [lmtp]
            max-message-size = 1048576
            greeting-domain = "mx.example.com"

            [lmtp.proxy]
            timeout-ms = 125000
            "#,
        );
        assert_eq!(config.property::<usize>("lmtp.max-message-size"), Some(1048576));
        assert_eq!(
            config.value("lmtp.greeting-domain"),
            Some("mx.example.com")
        );
        assert_eq!(config.property::<u64>("lmtp.proxy.timeout-ms"), Some(125000));
    }

    #[test]
    fn missing_key_is_none_not_panic() {
        let config = Config::parse("[lmtp]\nx = 1\n");
        assert_eq!(config.property::<u64>("lmtp.missing"), None);
    }
}
