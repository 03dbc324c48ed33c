//! Per-connection session state (spec.md §3).
//!
//! `SessionState` is the single record a connection's handler task owns; it
//! is never shared across connections. Recipients are appended by value and
//! never mutated once added (spec.md §3 Lifecycle).

pub mod dispatcher;

use std::net::IpAddr;

use chrono::{DateTime, Utc};

use utils::listener::limiter::InFlight;

use crate::grammar::params::Param;
use crate::grammar::SmtpAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyProtocol {
    Lmtp,
    Smtp,
}

impl ProxyProtocol {
    pub fn default_port(self) -> u16 {
        match self {
            ProxyProtocol::Lmtp => crate::config::DEFAULT_LMTP_PORT,
            ProxyProtocol::Smtp => crate::config::DEFAULT_SMTP_PORT,
        }
    }
}

/// Where a `RCPT TO` was routed to (spec.md §3).
#[derive(Debug, Clone)]
pub enum Routing {
    Local,
    Proxy(ProxyTarget),
}

#[derive(Debug, Clone)]
pub struct ProxyTarget {
    pub host: String,
    pub host_ip: Option<IpAddr>,
    pub port: u16,
    pub protocol: ProxyProtocol,
    pub timeout_ms: u64,
    pub rcpt_params: Vec<Param>,
}

/// Seeded once the first proxy recipient is accepted (spec.md §4.3 step 8).
#[derive(Debug, Clone)]
pub struct ProxySession {
    pub my_hostname: String,
    pub session_id: String,
    pub remote_ip: IpAddr,
    pub remote_port: u16,
    pub proxy_ttl: u32,
}

/// A slot reserved with the concurrency registry, released once the session
/// holding it ends (spec.md §3 `anvil_token?`).
#[derive(Debug, Clone)]
pub struct AnvilToken {
    pub service: String,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct Recipient {
    pub address: SmtpAddress,
    pub detail: Option<String>,
    pub params: Vec<Param>,
    pub session_id: String,
    pub routing: Routing,
    pub user_handle: Option<store::ResolvedUser>,
    pub anvil_token: Option<AnvilToken>,
}

#[derive(Debug, Clone)]
pub struct EnvelopeSender {
    pub address: SmtpAddress,
    pub params: Vec<Param>,
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub sender: EnvelopeSender,
    pub rcpts: Vec<Recipient>,
    pub mail_from_timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Session-id for the recipient about to be added at `rcpts.len()`
    /// (0-based): the base id for the first, `"{base}:{k}"` (1-based, k ≥ 2)
    /// for every subsequent one (spec.md §3, Testable Property 5).
    pub fn next_recipient_session_id(&self, base_session_id: &str) -> String {
        let k = self.rcpts.len() + 1;
        if k == 1 {
            base_session_id.to_string()
        } else {
            format!("{base_session_id}:{k}")
        }
    }

    /// All recipients accepted so far share this routing class, or `None` if
    /// there are none yet (spec.md §3 invariant: homogeneous routing).
    pub fn routing_class(&self) -> Option<RoutingClass> {
        self.rcpts.first().map(|r| match r.routing {
            Routing::Local => RoutingClass::Local,
            Routing::Proxy(_) => RoutingClass::Proxy,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingClass {
    Local,
    Proxy,
}

/// Tagged union for the message body under construction (spec.md §3).
pub enum PayloadSink {
    InMemory(Vec<u8>),
    Spilled {
        spill: store::spill::TempSpill,
        byte_count: u64,
    },
}

impl PayloadSink {
    pub fn len(&self) -> u64 {
        match self {
            PayloadSink::InMemory(buf) => buf.len() as u64,
            PayloadSink::Spilled { byte_count, .. } => *byte_count,
        }
    }
}

pub struct SessionState {
    pub session_id: String,
    pub greeting_name: Option<String>,
    pub tls: Option<utils::tls::TlsContext>,
    pub trusted: bool,
    pub proxy_ttl: u32,
    /// Proxy timeout override set by `XCLIENT TIMEOUT=`, in milliseconds
    /// (spec.md §6); takes priority over the passdb `proxy_timeout` field
    /// and the engine default. Persists for the session like `proxy_ttl`.
    pub proxy_timeout_override_ms: Option<u64>,
    pub remote_ip: IpAddr,
    pub remote_port: u16,
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub envelope: Option<Envelope>,
    pub payload: Option<PayloadSink>,
    pub added_headers: Option<String>,
    pub proxy_session: Option<ProxySession>,
    pub data_end_timestamp: Option<DateTime<Utc>>,
    /// RAII concurrency-limiter guards held for the lifetime of the
    /// connection (the connection-level slot, plus one per accepted local
    /// recipient pending release); dropping the session releases them all.
    pub in_flight: Vec<InFlight>,
}

impl SessionState {
    pub fn new(
        session_id: String,
        remote_ip: IpAddr,
        remote_port: u16,
        local_ip: IpAddr,
        local_port: u16,
        trusted: bool,
        proxy_ttl: u32,
    ) -> Self {
        SessionState {
            session_id,
            greeting_name: None,
            tls: None,
            trusted,
            proxy_ttl,
            proxy_timeout_override_ms: None,
            remote_ip,
            remote_port,
            local_ip,
            local_port,
            envelope: None,
            payload: None,
            added_headers: None,
            proxy_session: None,
            data_end_timestamp: None,
            in_flight: Vec::new(),
        }
    }

    pub fn has_envelope(&self) -> bool {
        self.envelope.is_some()
    }

    pub fn has_recipients(&self) -> bool {
        self.envelope
            .as_ref()
            .is_some_and(|e| !e.rcpts.is_empty())
    }

    pub fn is_tls_active(&self) -> bool {
        self.tls.is_some()
    }

    /// Clears envelope and payload state, as `LHLO`/`RSET`/`XCLIENT` all do
    /// before replying success (spec.md §4.2, §4.7). `greeting_name` is left
    /// untouched: callers that should also reset it (plain `LHLO`) do so
    /// separately, since `XCLIENT` preserves it (SPEC_FULL.md §5).
    pub fn reset_envelope(&mut self) {
        self.envelope = None;
        self.payload = None;
        self.added_headers = None;
        self.proxy_session = None;
        self.data_end_timestamp = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> EnvelopeSender {
        EnvelopeSender {
            address: SmtpAddress {
                localpart: "s".into(),
                domain: "x".into(),
                detail: None,
            },
            params: Vec::new(),
        }
    }

    fn recipient(routing: Routing, session_id: &str) -> Recipient {
        Recipient {
            address: SmtpAddress {
                localpart: "u".into(),
                domain: "local".into(),
                detail: None,
            },
            detail: None,
            params: Vec::new(),
            session_id: session_id.to_string(),
            routing,
            user_handle: None,
            anvil_token: None,
        }
    }

    #[test]
    fn recipient_session_ids_extend_the_base() {
        let mut envelope = Envelope {
            sender: sender(),
            rcpts: Vec::new(),
            mail_from_timestamp: Utc::now(),
        };
        let first_id = envelope.next_recipient_session_id("abc123");
        assert_eq!(first_id, "abc123");
        envelope.rcpts.push(recipient(Routing::Local, &first_id));

        let second_id = envelope.next_recipient_session_id("abc123");
        assert_eq!(second_id, "abc123:2");
        envelope.rcpts.push(recipient(Routing::Local, &second_id));

        let third_id = envelope.next_recipient_session_id("abc123");
        assert_eq!(third_id, "abc123:3");
    }

    #[test]
    fn routing_class_reflects_first_recipient() {
        let mut envelope = Envelope {
            sender: sender(),
            rcpts: Vec::new(),
            mail_from_timestamp: Utc::now(),
        };
        assert_eq!(envelope.routing_class(), None);
        envelope.rcpts.push(recipient(Routing::Local, "abc123"));
        assert_eq!(envelope.routing_class(), Some(RoutingClass::Local));
    }

    #[test]
    fn reset_envelope_clears_envelope_and_payload_but_not_greeting() {
        let mut state = SessionState::new(
            "abc123".into(),
            "127.0.0.1".parse().unwrap(),
            1234,
            "127.0.0.1".parse().unwrap(),
            24,
            false,
            5,
        );
        state.greeting_name = Some("client.example.org".into());
        state.envelope = Some(Envelope {
            sender: sender(),
            rcpts: Vec::new(),
            mail_from_timestamp: Utc::now(),
        });
        state.payload = Some(PayloadSink::InMemory(Vec::new()));

        state.reset_envelope();

        assert!(state.envelope.is_none());
        assert!(state.payload.is_none());
        assert_eq!(state.greeting_name.as_deref(), Some("client.example.org"));
    }
}
