//! RFC 5321 `<local@domain>` path parsing (spec.md §4.1).

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpAddress {
    pub localpart: String,
    pub domain: String,
    /// The portion of `localpart` after the configured detail delimiter, if
    /// any (spec.md §3 "SmtpAddress").
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    BadSyntax,
    NotSupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub reason: String,
}

impl ParseError {
    fn syntax(reason: impl Into<String>) -> Self {
        ParseError {
            kind: ParseErrorKind::BadSyntax,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl SmtpAddress {
    pub fn empty() -> Self {
        SmtpAddress {
            localpart: String::new(),
            domain: String::new(),
            detail: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.localpart.is_empty() && self.domain.is_empty()
    }

    /// Split `localpart` on `delimiter`, moving everything from the first
    /// occurrence onward into `detail` (spec.md §3).
    pub fn with_detail(mut self, delimiter: Option<char>) -> Self {
        if let Some(delim) = delimiter {
            if let Some(pos) = self.localpart.find(delim) {
                self.detail = Some(self.localpart[pos + delim.len_utf8()..].to_string());
                self.localpart.truncate(pos);
            }
        }
        self
    }

    /// Canonical `<local@domain>` serialization, or `<>` for the empty
    /// sender (spec.md §3).
    pub fn to_canonical(&self) -> String {
        if self.is_empty() {
            "<>".to_string()
        } else if self.domain.is_empty() {
            format!("<{}>", self.localpart)
        } else {
            format!("<{}@{}>", self.localpart, self.domain)
        }
    }
}

impl fmt::Display for SmtpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical())
    }
}

/// Parse a `MAIL FROM:<...>` / `RCPT TO:<...>` path. Returns the parsed
/// address and the unconsumed remainder of `input` (trailing ESMTP
/// parameters, if any) on success.
///
/// * `allow_empty` — accept `<>` (used for `MAIL FROM:<>`).
/// * `allow_localpart_only` — accept `<local>` with no `@domain` (used for
///   LMTP `RCPT TO:`, which may name a purely local mailbox).
pub fn parse_path(
    input: &str,
    allow_empty: bool,
    allow_localpart_only: bool,
) -> Result<(SmtpAddress, &str), ParseError> {
    let input = input.trim_start();
    let rest = input
        .strip_prefix('<')
        .ok_or_else(|| ParseError::syntax("path must start with '<'"))?;

    let close = rest
        .find('>')
        .ok_or_else(|| ParseError::syntax("unterminated path, missing '>'"))?;
    let (body, after) = rest.split_at(close);
    let after = &after[1..]; // skip '>'

    if body.is_empty() {
        if allow_empty {
            return Ok((SmtpAddress::empty(), after));
        }
        return Err(ParseError::syntax("empty path not allowed here"));
    }

    let (localpart, domain) = match body.rfind('@') {
        Some(at) => (&body[..at], &body[at + 1..]),
        None => {
            if allow_localpart_only {
                (body, "")
            } else {
                return Err(ParseError::syntax("path missing '@domain'"));
            }
        }
    };

    if localpart.is_empty() {
        return Err(ParseError::syntax("empty local-part"));
    }
    if !domain.is_empty() && !is_valid_domain_or_literal(domain) {
        return Err(ParseError::syntax(format!("invalid domain '{domain}'")));
    }
    if !is_valid_localpart(localpart) {
        return Err(ParseError::syntax(format!(
            "invalid local-part '{localpart}'"
        )));
    }

    Ok((
        SmtpAddress {
            localpart: localpart.to_string(),
            domain: domain.to_string(),
            detail: None,
        },
        after,
    ))
}

fn is_valid_localpart(s: &str) -> bool {
    if s.starts_with('"') && s.ends_with('"') && s.len() >= 2 {
        return true; // quoted-string local-part: accept verbatim.
    }
    !s.is_empty()
        && s.split('.').all(|atom| {
            !atom.is_empty()
                && atom
                    .chars()
                    .all(|c| c.is_ascii_graphic() && !"()<>[]:;@\\,\"".contains(c))
        })
}

fn is_valid_domain_or_literal(s: &str) -> bool {
    if let Some(inner) = s.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return !inner.is_empty() && !inner.contains(['[', '\\']);
    }
    !s.is_empty()
        && s.split('.')
            .all(|label| !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_path() {
        let (addr, rest) = parse_path("<user@example.com> SIZE=100", false, false).unwrap();
        assert_eq!(addr.localpart, "user");
        assert_eq!(addr.domain, "example.com");
        assert_eq!(rest, " SIZE=100");
    }

    #[test]
    fn empty_path_requires_flag() {
        assert!(parse_path("<>", false, false).is_err());
        let (addr, _) = parse_path("<>", true, false).unwrap();
        assert!(addr.is_empty());
    }

    #[test]
    fn localpart_only_requires_flag() {
        assert!(parse_path("<postmaster>", false, false).is_err());
        let (addr, _) = parse_path("<postmaster>", false, true).unwrap();
        assert_eq!(addr.localpart, "postmaster");
        assert_eq!(addr.domain, "");
    }

    #[test]
    fn round_trip_is_idempotent() {
        let (addr, _) = parse_path("<user@example.com>", false, false).unwrap();
        let encoded = addr.to_canonical();
        let (addr2, _) = parse_path(&encoded, false, false).unwrap();
        assert_eq!(addr, addr2);
    }

    #[test]
    fn detail_suffix_is_split() {
        let (addr, _) = parse_path("<user+tag@example.com>", false, false).unwrap();
        let addr = addr.with_detail(Some('+'));
        assert_eq!(addr.localpart, "user");
        assert_eq!(addr.detail.as_deref(), Some("tag"));
    }

    #[test]
    fn missing_domain_is_rejected_without_flag() {
        assert!(parse_path("<user>", false, false).is_err());
    }

    #[test]
    fn missing_angle_brackets_is_rejected() {
        assert!(parse_path("user@example.com", false, false).is_err());
    }
}
