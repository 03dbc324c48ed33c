//! Outbound proxy collaborator interface (spec.md §6 "Outbound proxy"):
//! `init(settings) → session`, `mail_from`, `add_rcpt`, `start(payload,
//! on_done)`, `deinit`. How the connection is actually multiplexed is a
//! Non-goal (spec.md §1); this fixes only the shape the engine drives it
//! through.

use async_trait::async_trait;

use crate::reply::Reply;
use crate::session::{ProxyTarget, Recipient};

/// One per-recipient relay to an upstream LMTP/SMTP server. The engine opens
/// one `ProxyClient` per accepted proxy recipient's target and drives it
/// through the same four-step protocol the original does.
#[async_trait]
pub trait ProxyClient: Send + Sync {
    /// Relay the composed payload to `target` on behalf of `recipient`,
    /// returning the reply to surface to our own client, relayed verbatim
    /// from upstream where possible (spec.md §4.6 "Per-recipient replies").
    async fn relay(&self, recipient: &Recipient, target: &ProxyTarget, composed: &[u8]) -> Reply;
}

/// A `ProxyClient` that fails closed: every relay is reported as a transient
/// backend error. Useful as the default until a real outbound connector is
/// wired in, and for engine tests that only exercise the local path.
pub struct UnavailableProxyClient;

#[async_trait]
impl ProxyClient for UnavailableProxyClient {
    async fn relay(&self, recipient: &Recipient, target: &ProxyTarget, _composed: &[u8]) -> Reply {
        trc::event!(
            trc::EventType::ProxyDispatchFailed,
            "address" => recipient.address.to_canonical(),
            "host" => target.host.clone(),
        )
        .log();
        crate::reply::codes::proxy_not_answering()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::SmtpAddress;
    use crate::session::{ProxyProtocol, Routing};

    #[tokio::test]
    async fn unavailable_client_always_refuses() {
        let client = UnavailableProxyClient;
        let recipient = Recipient {
            address: SmtpAddress {
                localpart: "u".into(),
                domain: "remote".into(),
                detail: None,
            },
            detail: None,
            params: Vec::new(),
            session_id: "abc123".into(),
            routing: Routing::Proxy(ProxyTarget {
                host: "mx2.example.com".into(),
                host_ip: None,
                port: 24,
                protocol: ProxyProtocol::Lmtp,
                timeout_ms: 125_000,
                rcpt_params: Vec::new(),
            }),
            user_handle: None,
            anvil_token: None,
        };
        let target = match &recipient.routing {
            Routing::Proxy(t) => t.clone(),
            Routing::Local => unreachable!(),
        };
        let reply = client.relay(&recipient, &target, b"body").await;
        assert_eq!(reply.code, 451);
    }
}
