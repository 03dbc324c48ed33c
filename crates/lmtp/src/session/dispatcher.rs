//! Command Dispatcher (spec.md §4.2): maps verb → handler, enforces verb
//! ordering, emits one reply per command (or one per recipient after
//! `DATA`). Pipelining falls out of the design for free — handlers return
//! synchronously and the transport's read loop never waits on a flush
//! acknowledgment before reading the next line, except at the three
//! suspension points spec.md §5 names.

use std::sync::Arc;

use tokio_rustls::TlsAcceptor;

use store::MailStore;

use crate::config::LmtpConfig;
use crate::delivery::{self, proxy::ProxyClient};
use crate::grammar::params::{self, MAIL_CAPABILITIES, RCPT_CAPABILITIES};
use crate::grammar::{lhlo, parse_path, xclient, ParseErrorKind};
use crate::payload::{self, trace};
use crate::reply::{codes, render_multiline, Reply};
use crate::router::{RouteOutcome, Router};
use crate::session::{Envelope, EnvelopeSender, SessionState};
use crate::transport::LineTransport;

pub struct Dispatcher {
    pub router: Router,
    pub store: Arc<dyn MailStore>,
    pub proxy_client: Arc<dyn ProxyClient>,
    pub tls_acceptor: Option<TlsAcceptor>,
    pub config: LmtpConfig,
}

enum Outcome {
    /// One reply, keep the session going.
    Continue(Reply),
    /// The handler already wrote everything it owes the client directly to
    /// the transport (a multi-line reply, or a reply followed by a protocol
    /// upgrade); nothing more to write this round.
    Silent,
    /// Session must close; an optional final reply is flushed first.
    Close(Option<Reply>),
}

impl Dispatcher {
    /// Drive one connection end to end. Returns once the client disconnects,
    /// issues `QUIT`, or a fatal error (spill write, privilege restore)
    /// forces teardown.
    pub async fn run(&self, transport: LineTransport, state: SessionState) {
        trc::event!(
            trc::EventType::ConnectionStart,
            "session-id" => state.session_id.clone(),
            "remote-ip" => state.remote_ip.to_string(),
        )
        .log();

        let session_id = state.session_id.clone();
        self.run_loop(transport, state).await;

        trc::event!(trc::EventType::ConnectionEnd, "session-id" => session_id).log();
    }

    async fn run_loop(&self, mut transport: LineTransport, mut state: SessionState) {
        if transport
            .write_reply(&codes::greeting(&self.config.greeting_domain))
            .await
            .is_err()
        {
            return;
        }

        loop {
            let line = match tokio::time::timeout(self.config.command_timeout, transport.read_line()).await {
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => return, // clean EOF: destroy session without reply.
                Ok(Err(_)) => return,   // transport error: destroy session without reply.
                Err(_) => {
                    let _ = transport.write_reply(&codes::command_timeout()).await;
                    return;
                }
            };

            let (verb, args) = split_command(&line);

            let outcome = match verb.to_ascii_uppercase().as_str() {
                "LHLO" => self.handle_lhlo(&mut state, &mut transport, args).await,
                "STARTTLS" => self.handle_starttls(&mut state, &mut transport).await,
                "MAIL" => self.handle_mail(&mut state, args),
                "RCPT" => self.handle_rcpt(&mut state, args).await,
                "DATA" => self.handle_data(&mut state, &mut transport).await,
                "RSET" => {
                    self.release_anvil_tokens(&mut state).await;
                    state.reset_envelope();
                    trc::event!(trc::EventType::EnvelopeReset, "session-id" => state.session_id.clone()).log();
                    Outcome::Continue(codes::rset_ok())
                }
                "NOOP" => Outcome::Continue(codes::noop_ok()),
                "VRFY" => Outcome::Continue(codes::vrfy_stub()),
                "QUIT" => Outcome::Close(Some(codes::quit_ok())),
                "XCLIENT" => self.handle_xclient(&mut state, args),
                _ => Outcome::Continue(Reply::new(500, Some("5.5.1"), "Unrecognized command")),
            };

            match outcome {
                Outcome::Continue(reply) => {
                    if transport.write_reply(&reply).await.is_err() {
                        return;
                    }
                }
                Outcome::Silent => {}
                Outcome::Close(reply) => {
                    if let Some(reply) = reply {
                        let _ = transport.write_reply(&reply).await;
                    }
                    self.release_anvil_tokens(&mut state).await;
                    return;
                }
            }
        }
    }

    async fn release_anvil_tokens(&self, state: &mut SessionState) {
        if let Some(envelope) = &state.envelope {
            for rcpt in &envelope.rcpts {
                if let Some(token) = &rcpt.anvil_token {
                    self.router.anvil.release(&token.service, &token.username);
                }
            }
        }
    }

    async fn handle_lhlo(&self, state: &mut SessionState, transport: &mut LineTransport, args: &str) -> Outcome {
        let name = lhlo::parse_lhlo_argument(args);
        state.greeting_name = Some(name);
        state.reset_envelope();

        let mut lines = vec![self.config.greeting_domain.clone()];
        if self.tls_acceptor.is_some() && !state.is_tls_active() {
            lines.push("STARTTLS".to_string());
        }
        if state.trusted {
            lines.push("XCLIENT ADDR PORT TTL TIMEOUT".to_string());
        }
        lines.push("8BITMIME".to_string());
        lines.push("ENHANCEDSTATUSCODES".to_string());
        lines.push("PIPELINING".to_string());

        if transport.write_raw(&render_multiline(250, &lines)).await.is_err() {
            return Outcome::Close(None);
        }
        Outcome::Silent
    }

    async fn handle_starttls(&self, state: &mut SessionState, transport: &mut LineTransport) -> Outcome {
        if state.is_tls_active() {
            return Outcome::Continue(codes::tls_already_active());
        }
        let Some(acceptor) = &self.tls_acceptor else {
            return Outcome::Continue(codes::tls_init_failed());
        };
        if transport.write_reply(&codes::tls_ready()).await.is_err() {
            return Outcome::Close(None);
        }
        let placeholder = LineTransport::new(Box::new(tokio::io::join(tokio::io::empty(), tokio::io::sink())));
        let owned = std::mem::replace(transport, placeholder);
        match owned.upgrade_tls(acceptor).await {
            Ok((upgraded, cipher)) => {
                *transport = upgraded;
                state.tls = Some(utils::tls::TlsContext {
                    cipher_description: cipher,
                });
                Outcome::Silent
            }
            Err(_) => Outcome::Close(None),
        }
    }

    fn handle_mail(&self, state: &mut SessionState, args: &str) -> Outcome {
        if state.has_envelope() {
            return Outcome::Continue(codes::mail_already_given());
        }
        let Some(rest) = strip_keyword(args, "FROM:") else {
            return Outcome::Continue(codes::bad_syntax("expected FROM:<...>"));
        };
        let (address, remainder) = match parse_path(rest, true, false) {
            Ok(parsed) => parsed,
            Err(err) => return Outcome::Continue(classify_parse_error(&err)),
        };
        let params = match params::parse_params(remainder.trim_start(), MAIL_CAPABILITIES) {
            Ok(params) => params,
            Err(err) => return Outcome::Continue(classify_parse_error(&err)),
        };

        state.envelope = Some(Envelope {
            sender: EnvelopeSender { address, params },
            rcpts: Vec::new(),
            mail_from_timestamp: chrono::Utc::now(),
        });
        Outcome::Continue(codes::mail_ok())
    }

    async fn handle_rcpt(&self, state: &mut SessionState, args: &str) -> Outcome {
        if !state.has_envelope() {
            return Outcome::Continue(codes::mail_needed_first());
        }
        let Some(rest) = strip_keyword(args, "TO:") else {
            return Outcome::Continue(codes::bad_syntax("expected TO:<...>"));
        };
        let (address, remainder) = match parse_path(rest, false, true) {
            Ok(parsed) => parsed,
            Err(err) => return Outcome::Continue(classify_parse_error(&err)),
        };
        let params = match params::parse_params(remainder.trim_start(), RCPT_CAPABILITIES) {
            Ok(params) => params,
            Err(err) => return Outcome::Continue(classify_parse_error(&err)),
        };

        match self.router.route(state, address, params).await {
            RouteOutcome::Accepted(rcpt, reply) => {
                if let Some(envelope) = &mut state.envelope {
                    envelope.rcpts.push(*rcpt);
                }
                Outcome::Continue(reply)
            }
            RouteOutcome::Refused(reply) => Outcome::Continue(reply),
        }
    }

    async fn handle_data(&self, state: &mut SessionState, transport: &mut LineTransport) -> Outcome {
        if !state.has_envelope() || !state.has_recipients() {
            return Outcome::Continue(codes::no_valid_recipients());
        }
        if transport.write_reply(&codes::data_ok()).await.is_err() {
            return Outcome::Close(None);
        }

        let envelope = state.envelope.as_ref().unwrap();
        let headers = trace::compose_added_headers(&trace::TraceContext {
            sender: &envelope.sender.address,
            recipients: &envelope.rcpts,
            greeting_name: state.greeting_name.as_deref(),
            remote_ip: Some(state.remote_ip),
            cipher_description: state.tls.as_ref().map(|tls| tls.cipher_description.as_str()),
            my_domain: &self.config.greeting_domain,
            session_id: &state.session_id,
            now: chrono::Utc::now(),
        });
        state.added_headers = Some(headers.clone());

        if payload::append(
            &mut state.payload,
            headers.as_bytes(),
            self.config.max_inmemory_size,
            self.store.temp_dir(),
        )
        .await
        .is_err()
        {
            return Outcome::Close(Some(codes::temp_internal_failure()));
        }

        loop {
            match transport.read_dot_line().await {
                Ok(crate::transport::DotLine::Done) => break,
                Ok(crate::transport::DotLine::Line(bytes)) => {
                    if payload::append(
                        &mut state.payload,
                        &bytes,
                        self.config.max_inmemory_size,
                        self.store.temp_dir(),
                    )
                    .await
                    .is_err()
                    {
                        return Outcome::Close(Some(codes::temp_internal_failure()));
                    }
                }
                Err(_) => return Outcome::Close(None),
            }
        }
        state.data_end_timestamp = Some(chrono::Utc::now());

        let mut sink = state.payload.take().expect("payload set before DATA read loop");
        let composed = match payload::read_composed(&mut sink).await {
            Ok(bytes) => bytes,
            Err(_) => return Outcome::Close(Some(codes::temp_internal_failure())),
        };

        let rcpts = state.envelope.as_ref().unwrap().rcpts.clone();
        let (replies, fatal) = delivery::fan_out(
            &self.store,
            self.proxy_client.as_ref(),
            &rcpts,
            &composed,
            &self.config.base_dir,
        )
        .await;

        for reply in &replies {
            if transport.write_reply(reply).await.is_err() {
                return Outcome::Close(None);
            }
        }

        self.release_anvil_tokens(state).await;
        state.reset_envelope();

        if fatal {
            Outcome::Close(None)
        } else {
            Outcome::Silent
        }
    }

    fn handle_xclient(&self, state: &mut SessionState, args: &str) -> Outcome {
        if !state.trusted {
            return Outcome::Continue(codes::not_trusted());
        }
        let attrs = match xclient::parse_xclient(args) {
            Ok(attrs) => attrs,
            Err(err) => return Outcome::Continue(classify_parse_error(&err)),
        };

        if let Some(addr) = attrs.addr {
            state.remote_ip = addr;
        }
        if let Some(port) = attrs.port {
            state.remote_port = port;
        }
        if let Some(ttl) = attrs.ttl {
            state.proxy_ttl = ttl;
        }
        if let Some(secs) = attrs.timeout {
            state.proxy_timeout_override_ms = Some(u64::from(secs) * 1000);
        }
        state.reset_envelope();

        Outcome::Continue(codes::greeting(&self.config.greeting_domain))
    }
}

fn split_command(line: &str) -> (&str, &str) {
    match line.find(' ') {
        Some(idx) => (&line[..idx], line[idx + 1..].trim_start()),
        None => (line, ""),
    }
}

fn strip_keyword<'a>(args: &'a str, keyword: &str) -> Option<&'a str> {
    let trimmed = args.trim_start();
    if trimmed.len() < keyword.len() {
        return None;
    }
    let (head, rest) = trimmed.split_at(keyword.len());
    if head.eq_ignore_ascii_case(keyword) {
        Some(rest)
    } else {
        None
    }
}

fn classify_parse_error(err: &crate::grammar::ParseError) -> Reply {
    match err.kind {
        ParseErrorKind::BadSyntax => codes::bad_syntax(&err.reason),
        ParseErrorKind::NotSupported => codes::not_supported(&err.reason),
    }
}
