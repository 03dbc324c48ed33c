//! SMTP/LMTP reply construction with RFC 2034 enhanced status codes
//! (spec.md §6).

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub enhanced: Option<&'static str>,
    pub text: String,
}

impl Reply {
    pub fn new(code: u16, enhanced: Option<&'static str>, text: impl Into<String>) -> Self {
        Reply {
            code,
            enhanced,
            text: text.into(),
        }
    }

    /// Render a single-line reply (`CODE[ ENH] text\r\n`).
    pub fn render(&self) -> String {
        match self.enhanced {
            Some(enh) => format!("{} {} {}\r\n", self.code, enh, self.text),
            None => format!("{} {}\r\n", self.code, self.text),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// A multi-line reply (e.g. the `LHLO` greeting, spec.md §4.2): every line
/// but the last uses `CODE-`, the last uses `CODE `.
pub fn render_multiline(code: u16, lines: &[String]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let sep = if i + 1 == lines.len() { ' ' } else { '-' };
        out.push_str(&format!("{code}{sep}{line}\r\n"));
    }
    out
}

pub mod codes {
    use super::Reply;

    pub fn mail_already_given() -> Reply {
        Reply::new(503, Some("5.5.1"), "MAIL already given")
    }

    pub fn mail_needed_first() -> Reply {
        Reply::new(503, Some("5.5.1"), "MAIL needed first")
    }

    pub fn no_valid_recipients() -> Reply {
        Reply::new(554, Some("5.5.1"), "No valid recipients")
    }

    pub fn tls_already_active() -> Reply {
        Reply::new(443, Some("5.5.1"), "TLS is already active.")
    }

    pub fn not_trusted() -> Reply {
        Reply::new(550, None, "You are not from trusted IP")
    }

    pub fn mail_ok() -> Reply {
        Reply::new(250, Some("2.1.0"), "OK")
    }

    pub fn rcpt_ok() -> Reply {
        Reply::new(250, Some("2.1.5"), "OK")
    }

    pub fn rset_ok() -> Reply {
        Reply::new(250, Some("2.0.0"), "OK")
    }

    pub fn noop_ok() -> Reply {
        Reply::new(250, Some("2.0.0"), "OK")
    }

    pub fn quit_ok() -> Reply {
        Reply::new(221, Some("2.0.0"), "OK")
    }

    pub fn vrfy_stub() -> Reply {
        Reply::new(252, Some("2.3.3"), "Cannot VRFY user")
    }

    pub fn data_ok() -> Reply {
        Reply::new(354, None, "OK")
    }

    pub fn bad_syntax(reason: &str) -> Reply {
        Reply::new(501, Some("5.5.4"), reason.to_string())
    }

    pub fn not_supported(reason: &str) -> Reply {
        Reply::new(555, Some("5.5.4"), reason.to_string())
    }

    pub fn temp_mailbox_fail(addr: &str) -> Reply {
        Reply::new(
            451,
            Some("4.3.0"),
            format!("{addr} Temporary internal error"),
        )
    }

    pub fn user_unknown(addr: &str, username: &str) -> Reply {
        Reply::new(
            550,
            Some("5.1.1"),
            format!("{addr} User doesn't exist: {username}"),
        )
    }

    pub fn mixed_destinations(addr: &str) -> Reply {
        Reply::new(
            451,
            Some("4.3.0"),
            format!("{addr} Can't handle mixed proxy/non-proxy destinations"),
        )
    }

    pub fn too_many_concurrent(addr: &str) -> Reply {
        Reply::new(
            451,
            Some("4.3.0"),
            format!("{addr} Too many concurrent connections"),
        )
    }

    pub fn proxy_loop(addr: &str) -> Reply {
        Reply::new(554, Some("5.4.6"), format!("{addr} Proxying loops to itself"))
    }

    pub fn proxy_ttl_exhausted(addr: &str) -> Reply {
        Reply::new(
            554,
            Some("5.4.6"),
            format!("{addr} Proxying appears to be looping (TTL=0)"),
        )
    }

    pub fn proxy_not_answering() -> Reply {
        Reply::new(451, Some("4.4.0"), "Remote server not answering")
    }

    pub fn passdb_error(addr: &str, reason: &str) -> Reply {
        Reply::new(451, Some("4.3.0"), format!("{addr} {reason}"))
    }

    pub fn temp_internal_failure() -> Reply {
        Reply::new(451, Some("4.3.0"), "Temporary internal failure")
    }

    pub fn tls_init_failed() -> Reply {
        Reply::new(454, Some("4.7.0"), "TLS not available")
    }

    pub fn tls_ready() -> Reply {
        Reply::new(220, Some("2.0.0"), "Ready to start TLS")
    }

    /// The connection-open banner, and what a successful `XCLIENT` re-emits
    /// in place of a normal command reply (spec.md §6: `XCLIENT` → `220`).
    pub fn greeting(domain: &str) -> Reply {
        Reply::new(220, None, format!("{domain} LMTP ready"))
    }

    pub fn command_timeout() -> Reply {
        Reply::new(421, Some("4.4.2"), "Timeout waiting for command")
    }

    pub fn privilege_fatal() -> Reply {
        Reply::new(421, Some("4.3.0"), "Internal privilege error, closing connection")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_enhanced_code() {
        assert_eq!(codes::rcpt_ok().render(), "250 2.1.5 OK\r\n");
    }

    #[test]
    fn renders_multiline_greeting() {
        let lines = vec!["mx.example.com".to_string(), "PIPELINING".to_string()];
        assert_eq!(
            render_multiline(250, &lines),
            "250-mx.example.com\r\n250 PIPELINING\r\n"
        );
    }
}
