//! Trace Header Synthesis (spec.md §4.5): the `added_headers` block is fully
//! assembled before the payload sink is even opened, so it is unit-testable
//! without a socket (SPEC_FULL.md §5).

use std::net::IpAddr;

use store::DeliveryAddressPolicy;

use crate::grammar::params;
use crate::grammar::SmtpAddress;
use crate::session::Recipient;

pub struct TraceContext<'a> {
    pub sender: &'a SmtpAddress,
    pub recipients: &'a [Recipient],
    pub greeting_name: Option<&'a str>,
    pub remote_ip: Option<IpAddr>,
    pub cipher_description: Option<&'a str>,
    pub my_domain: &'a str,
    pub session_id: &'a str,
    pub now: chrono::DateTime<chrono::Utc>,
}

/// Build the `added_headers` string prepended to the body before it reaches
/// the payload sink (spec.md §4.5). Returns an empty string if there are no
/// recipients yet — the dispatcher never calls this before at least one
/// `RCPT` has been accepted (spec.md §4.2 `DATA` ordering rule).
pub fn compose_added_headers(ctx: &TraceContext) -> String {
    if ctx.recipients.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str(&format!("Return-Path: {}\r\n", ctx.sender.to_canonical()));

    if ctx.recipients.len() == 1 {
        if let Some(line) = delivered_to_header(&ctx.recipients[0]) {
            out.push_str(&line);
        }
    }

    let lhlo = ctx.greeting_name.unwrap_or("unknown");
    match ctx.remote_ip {
        Some(ip) => out.push_str(&format!("Received: from {lhlo} ([{ip}])\r\n")),
        None => out.push_str(&format!("Received: from {lhlo}\r\n")),
    }
    if let Some(cipher) = ctx.cipher_description {
        out.push_str(&format!("\t(using {cipher})\r\n"));
    }
    out.push_str(&format!(
        "\tby {} with LMTP id {}\r\n",
        ctx.my_domain, ctx.session_id
    ));

    let date = utils::time::rfc5322(ctx.now);
    if ctx.recipients.len() == 1 {
        out.push_str(&format!(
            "\tfor {}; {date}\r\n",
            ctx.recipients[0].address.to_canonical()
        ));
    } else {
        out.push_str(&format!("\t; {date}\r\n"));
    }

    out.push_str("\r\n");
    out
}

fn delivered_to_header(recipient: &Recipient) -> Option<String> {
    let user = recipient.user_handle.as_ref()?;
    match user.delivery_address_policy {
        DeliveryAddressPolicy::None => None,
        DeliveryAddressPolicy::Final => Some(format!(
            "Delivered-To: {}\r\n",
            recipient.address.to_canonical()
        )),
        DeliveryAddressPolicy::Original => {
            let orcpt = params::find(&recipient.params, "ORCPT").and_then(|p| p.value.clone());
            let addr = orcpt.unwrap_or_else(|| recipient.address.to_canonical());
            Some(format!("Delivered-To: {addr}\r\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::params::Param;
    use crate::session::Routing;
    use chrono::TimeZone;
    use store::{DeliveryAddressPolicy as Policy, ResolvedUser};

    fn sender() -> SmtpAddress {
        SmtpAddress {
            localpart: "s".into(),
            domain: "x".into(),
            detail: None,
        }
    }

    fn recipient(policy: Policy, params: Vec<Param>) -> Recipient {
        Recipient {
            address: SmtpAddress {
                localpart: "u".into(),
                domain: "local".into(),
                detail: None,
            },
            detail: None,
            params,
            session_id: "abc123".into(),
            routing: Routing::Local,
            user_handle: Some(ResolvedUser {
                uid: 1000,
                gid: 1000,
                home_dir: "/home/u".into(),
                delivery_address_policy: policy,
            }),
            anvil_token: None,
        }
    }

    fn now() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap()
    }

    #[test]
    fn single_recipient_final_policy_adds_delivered_to() {
        let sender = sender();
        let rcpts = vec![recipient(Policy::Final, Vec::new())];
        let ctx = TraceContext {
            sender: &sender,
            recipients: &rcpts,
            greeting_name: Some("client.example.org"),
            remote_ip: Some("10.0.0.5".parse().unwrap()),
            cipher_description: None,
            my_domain: "mx.example.com",
            session_id: "abc123",
            now: now(),
        };
        let headers = compose_added_headers(&ctx);
        assert!(headers.starts_with("Return-Path: <s@x>\r\n"));
        assert!(headers.contains("Delivered-To: <u@local>\r\n"));
        assert!(headers.contains("Received: from client.example.org ([10.0.0.5])\r\n"));
        assert!(headers.contains("by mx.example.com with LMTP id abc123\r\n"));
        assert!(headers.contains("for <u@local>; Sun, 26 Jul 2026 12:00:00 +0000\r\n"));
        assert!(headers.ends_with("\r\n\r\n"));
    }

    #[test]
    fn original_policy_prefers_orcpt() {
        let sender = sender();
        let params = vec![Param {
            key: "ORCPT".into(),
            value: Some("rfc822;orig@local".into()),
        }];
        let rcpts = vec![recipient(Policy::Original, params)];
        let ctx = TraceContext {
            sender: &sender,
            recipients: &rcpts,
            greeting_name: None,
            remote_ip: None,
            cipher_description: None,
            my_domain: "mx.example.com",
            session_id: "abc123",
            now: now(),
        };
        let headers = compose_added_headers(&ctx);
        assert!(headers.contains("Delivered-To: rfc822;orig@local\r\n"));
        assert!(headers.contains("Received: from unknown\r\n"));
    }

    #[test]
    fn none_policy_omits_delivered_to() {
        let sender = sender();
        let rcpts = vec![recipient(Policy::None, Vec::new())];
        let ctx = TraceContext {
            sender: &sender,
            recipients: &rcpts,
            greeting_name: Some("client.example.org"),
            remote_ip: None,
            cipher_description: Some("TLS13_AES_256_GCM_SHA384"),
            my_domain: "mx.example.com",
            session_id: "abc123",
            now: now(),
        };
        let headers = compose_added_headers(&ctx);
        assert!(!headers.contains("Delivered-To"));
        assert!(headers.contains("\t(using TLS13_AES_256_GCM_SHA384)\r\n"));
    }

    #[test]
    fn multi_recipient_omits_for_clause() {
        let sender = sender();
        let rcpts = vec![
            recipient(Policy::Final, Vec::new()),
            recipient(Policy::Final, Vec::new()),
        ];
        let ctx = TraceContext {
            sender: &sender,
            recipients: &rcpts,
            greeting_name: Some("client.example.org"),
            remote_ip: Some("10.0.0.5".parse().unwrap()),
            cipher_description: None,
            my_domain: "mx.example.com",
            session_id: "abc123",
            now: now(),
        };
        let headers = compose_added_headers(&ctx);
        assert!(!headers.contains("Delivered-To"));
        assert!(headers.contains("\t; Sun, 26 Jul 2026 12:00:00 +0000\r\n"));
    }
}
