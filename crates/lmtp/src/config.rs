//! Engine configuration (SPEC_FULL.md §3), parsed via `utils::config::Config`:
//! typed accessors over a flattened key-value store, with parse errors
//! collected rather than failing fast.

use std::{net::IpAddr, time::Duration};

use utils::config::Config;

/// Recommended in spec.md §6; override with `lmtp.max-in-memory-size`.
pub const DEFAULT_MAX_INMEMORY_SIZE: usize = 64 * 1024;
pub const LMTP_PROXY_DEFAULT_TIMEOUT_MSECS: u64 = 125_000;
pub const DEFAULT_LMTP_PORT: u16 = 24;
pub const DEFAULT_SMTP_PORT: u16 = 25;

#[derive(Debug, Clone)]
pub struct LmtpConfig {
    pub greeting_domain: String,
    pub max_message_size: usize,
    pub max_inmemory_size: usize,
    pub recipient_delimiter: Option<char>,
    pub trusted_ips: Vec<IpAddr>,
    pub proxy_timeout: Duration,
    pub proxy_enabled: bool,
    pub max_concurrent_per_user: usize,
    pub command_timeout: Duration,
    pub base_dir: std::path::PathBuf,
}

impl Default for LmtpConfig {
    fn default() -> Self {
        LmtpConfig {
            greeting_domain: "localhost".to_string(),
            max_message_size: 50 * 1024 * 1024,
            max_inmemory_size: DEFAULT_MAX_INMEMORY_SIZE,
            recipient_delimiter: Some('+'),
            trusted_ips: Vec::new(),
            proxy_timeout: Duration::from_millis(LMTP_PROXY_DEFAULT_TIMEOUT_MSECS),
            proxy_enabled: true,
            max_concurrent_per_user: 0,
            command_timeout: Duration::from_secs(300),
            base_dir: std::path::PathBuf::from("/tmp"),
        }
    }
}

impl LmtpConfig {
    pub fn parse(config: &mut Config) -> Self {
        let mut result = LmtpConfig::default();

        if let Some(domain) = config.value("lmtp.greeting-domain") {
            result.greeting_domain = domain.to_string();
        }
        if let Some(size) = config.property::<usize>("lmtp.max-message-size") {
            result.max_message_size = size;
        }
        if let Some(size) = config.property::<usize>("lmtp.max-in-memory-size") {
            result.max_inmemory_size = size;
        }
        match config.value("lmtp.recipient-delimiter") {
            Some(s) if s.is_empty() => result.recipient_delimiter = None,
            Some(s) => match s.chars().next() {
                Some(c) if s.chars().count() == 1 => result.recipient_delimiter = Some(c),
                _ => config.new_build_error(
                    "lmtp.recipient-delimiter",
                    "must be exactly one character",
                ),
            },
            None => {}
        }
        if let Some(ms) = config.property::<u64>("lmtp.proxy.timeout-ms") {
            result.proxy_timeout = Duration::from_millis(ms);
        }
        if let Some(enabled) = config.property::<bool>("lmtp.proxy.enable") {
            result.proxy_enabled = enabled;
        }
        if let Some(max) = config.property::<usize>("lmtp.concurrency.max-per-user") {
            result.max_concurrent_per_user = max;
        }
        if let Some(secs) = config.property::<u64>("lmtp.command-timeout-secs") {
            result.command_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = config.value("lmtp.base-dir") {
            result.base_dir = std::path::PathBuf::from(dir);
        }

        let mut idx = 0;
        loop {
            let key = format!("lmtp.trusted-ips.{idx}");
            match config.value(&key) {
                Some(ip) => {
                    match ip.parse::<IpAddr>() {
                        Ok(addr) => result.trusted_ips.push(addr),
                        Err(err) => config.new_build_error(&key, err),
                    }
                    idx += 1;
                }
                None => break,
            }
        }

        result
    }

    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.trusted_ips.iter().any(|trusted| trusted == ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = LmtpConfig::default();
        assert_eq!(
            config.proxy_timeout,
            Duration::from_millis(LMTP_PROXY_DEFAULT_TIMEOUT_MSECS)
        );
        assert_eq!(config.max_inmemory_size, DEFAULT_MAX_INMEMORY_SIZE);
    }

    #[test]
    fn parses_trusted_ips_and_overrides() {
        let mut raw = Config::parse(
            r#"
            [lmtp]
            greeting-domain = "mx.example.com"
            max-in-memory-size = 1024

            [lmtp.trusted-ips]
            0 = "10.0.0.1"
            1 = "10.0.0.2"
            "#,
        );
        let config = LmtpConfig::parse(&mut raw);
        assert_eq!(config.greeting_domain, "mx.example.com");
        assert_eq!(config.max_inmemory_size, 1024);
        assert!(config.is_trusted(&"10.0.0.2".parse().unwrap()));
        assert!(!config.is_trusted(&"10.0.0.3".parse().unwrap()));
    }
}
