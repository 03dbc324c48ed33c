//! Recipient Router (spec.md §4.3): decides, for each `RCPT TO`, whether the
//! recipient is served locally or proxied, enforcing envelope homogeneity,
//! proxy TTL, and the per-user concurrency gate.

use std::sync::Arc;

use directory::{ConnectionInfo, Directory, PassdbResult};
use store::MailStore;

use crate::grammar::SmtpAddress;
use crate::reply::{codes, Reply};
use crate::session::{
    AnvilToken, ProxyProtocol, ProxySession, ProxyTarget, Recipient, Routing, RoutingClass,
    SessionState,
};

/// Outcome of routing one `RCPT TO`: either the recipient (to be appended to
/// the envelope) and its reply, or just a refusal reply.
pub enum RouteOutcome {
    Accepted(Box<Recipient>, Reply),
    Refused(Reply),
}

pub struct Router {
    pub directory: Arc<dyn Directory>,
    pub store: Arc<dyn MailStore>,
    pub anvil: Arc<dyn anvil::ConcurrencyRegistry>,
    pub service_name: String,
    pub my_hostname: String,
    pub recipient_delimiter: Option<char>,
    pub proxying_enabled: bool,
    pub max_concurrent_per_user: usize,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub async fn route(
        &self,
        session: &mut SessionState,
        mut address: SmtpAddress,
        params: Vec<crate::grammar::params::Param>,
    ) -> RouteOutcome {
        let original_address = address.clone();
        address = address.with_detail(self.recipient_delimiter);
        let detail = address.detail.clone();

        let next_session_id = session
            .envelope
            .as_ref()
            .map(|e| e.next_recipient_session_id(&session.session_id))
            .unwrap_or_else(|| session.session_id.clone());

        if !self.proxying_enabled {
            return self
                .route_local(session, address, detail, params, next_session_id)
                .await;
        }

        let conn = ConnectionInfo {
            local_ip: session.local_ip,
            local_port: session.local_port,
            remote_ip: session.remote_ip,
            remote_port: session.remote_port,
            service: self.service_name.clone(),
        };

        match self.directory.lookup_passdb(&address.localpart, &conn).await {
            Err(err) => RouteOutcome::Refused(codes::passdb_error(
                &original_address.to_canonical(),
                &err.reason,
            )),
            Ok(PassdbResult::NotFound) => {
                self.route_local(session, address, detail, params, next_session_id)
                    .await
            }
            Ok(PassdbResult::Found(fields)) => {
                self.route_proxy_or_local(
                    session,
                    address,
                    detail,
                    params,
                    next_session_id,
                    &fields,
                )
                .await
            }
        }
    }

    async fn route_proxy_or_local(
        &self,
        session: &mut SessionState,
        mut address: SmtpAddress,
        detail: Option<String>,
        params: Vec<crate::grammar::params::Param>,
        next_session_id: String,
        fields: &[directory::PassdbField],
    ) -> RouteOutcome {
        let canonical = address.to_canonical();

        let proxy_requested = directory::field(fields, "proxy").is_some();
        if !proxy_requested {
            return self
                .route_local(session, address, detail, params, next_session_id)
                .await;
        }

        let host = match directory::field(fields, "host") {
            Some(h) => h.to_string(),
            None => {
                return RouteOutcome::Refused(Reply::new(
                    501,
                    Some("5.5.4"),
                    format!("{canonical} proxy configuration error: missing host"),
                ))
            }
        };
        let host_ip = directory::field(fields, "hostip").and_then(|ip| ip.parse().ok());
        let protocol = match directory::field(fields, "protocol") {
            Some(p) if p.eq_ignore_ascii_case("smtp") => ProxyProtocol::Smtp,
            _ => ProxyProtocol::Lmtp,
        };
        let port = directory::field(fields, "port")
            .and_then(|p| p.parse().ok())
            .unwrap_or_else(|| protocol.default_port());
        let timeout_ms = session.proxy_timeout_override_ms.unwrap_or_else(|| {
            directory::field(fields, "proxy_timeout")
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(crate::config::LMTP_PROXY_DEFAULT_TIMEOUT_MSECS)
        });

        if let Some(new_user) = directory::field(fields, "user").or_else(|| directory::field(fields, "destuser")) {
            address = SmtpAddress {
                localpart: new_user.to_string(),
                domain: address.domain.clone(),
                detail: None,
            }
            .with_detail(self.recipient_delimiter);
            if let Some(detail) = &detail {
                if address.detail.is_none() {
                    address.detail = Some(detail.clone());
                }
            }
        }
        let canonical = address.to_canonical();

        let targets_self = host_ip
            .map(|ip| ip == session.local_ip && port == session.local_port)
            .unwrap_or(false)
            || (host == self.my_hostname && port == session.local_port);
        if targets_self {
            return RouteOutcome::Refused(codes::proxy_loop(&canonical));
        }

        if session.proxy_ttl <= 1 {
            return RouteOutcome::Refused(codes::proxy_ttl_exhausted(&canonical));
        }

        if let Some(RoutingClass::Local) = session.envelope.as_ref().and_then(|e| e.routing_class()) {
            return RouteOutcome::Refused(codes::mixed_destinations(&canonical));
        }

        let target = ProxyTarget {
            host,
            host_ip,
            port,
            protocol,
            timeout_ms,
            rcpt_params: params.clone(),
        };

        if session.proxy_session.is_none() {
            session.proxy_session = Some(ProxySession {
                my_hostname: self.my_hostname.clone(),
                session_id: session.session_id.clone(),
                remote_ip: session.remote_ip,
                remote_port: session.remote_port,
                proxy_ttl: session.proxy_ttl - 1,
            });
            trc::event!(trc::EventType::ProxySessionStarted, "host" => target.host.clone()).log();
        }

        let recipient = Recipient {
            address,
            detail,
            params,
            session_id: next_session_id,
            routing: Routing::Proxy(target),
            user_handle: None,
            anvil_token: None,
        };

        trc::event!(trc::EventType::RcptAccepted, "address" => canonical).log();
        RouteOutcome::Accepted(Box::new(recipient), codes::rcpt_ok())
    }

    async fn route_local(
        &self,
        session: &mut SessionState,
        address: SmtpAddress,
        detail: Option<String>,
        params: Vec<crate::grammar::params::Param>,
        next_session_id: String,
    ) -> RouteOutcome {
        let canonical = address.to_canonical();

        if session.proxy_session.is_some() {
            return RouteOutcome::Refused(codes::mixed_destinations(&canonical));
        }
        if let Some(RoutingClass::Proxy) =
            session.envelope.as_ref().and_then(|e| e.routing_class())
        {
            return RouteOutcome::Refused(codes::mixed_destinations(&canonical));
        }

        let username = address.localpart.clone();
        let lookup = match self.store.lookup_user(&username).await {
            Err(_) => return RouteOutcome::Refused(codes::temp_mailbox_fail(&canonical)),
            Ok(store::UserLookup::NotFound) => {
                trc::event!(trc::EventType::RcptRejected, "address" => canonical.clone()).log();
                return RouteOutcome::Refused(codes::user_unknown(&canonical, &username));
            }
            Ok(store::UserLookup::Found(user)) => user,
        };

        let mut anvil_token = None;
        if self.max_concurrent_per_user > 0 {
            let allowed = self.anvil.query(&self.service_name, &username).await;
            if !allowed {
                trc::event!(trc::EventType::ConcurrencyRefused, "username" => username.clone()).log();
                return RouteOutcome::Refused(codes::too_many_concurrent(&canonical));
            }
            anvil_token = Some(AnvilToken {
                service: self.service_name.clone(),
                username: username.clone(),
            });
        }

        let recipient = Recipient {
            address,
            detail,
            params,
            session_id: next_session_id,
            routing: Routing::Local,
            user_handle: Some(lookup),
            anvil_token,
        };

        trc::event!(trc::EventType::RcptAccepted, "address" => canonical).log();
        RouteOutcome::Accepted(Box::new(recipient), codes::rcpt_ok())
    }
}
