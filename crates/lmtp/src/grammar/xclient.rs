//! `XCLIENT` attribute parsing (spec.md §4.1, §6).

use std::net::IpAddr;

use super::address::{ParseError, ParseErrorKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XclientAttrs {
    pub addr: Option<IpAddr>,
    pub port: Option<u16>,
    pub ttl: Option<u32>,
    pub timeout: Option<u32>,
}

/// Parse an `XCLIENT ADDR=... PORT=... TTL=... TIMEOUT=...` argument list.
/// Any attribute that fails to parse fails the whole command (spec.md §4.1);
/// unrecognized attribute names are ignored.
pub fn parse_xclient(input: &str) -> Result<XclientAttrs, ParseError> {
    let mut attrs = XclientAttrs::default();
    for token in input.split_whitespace() {
        let (key, value) = token.split_once('=').ok_or_else(|| bad_syntax(token))?;
        match key.to_ascii_uppercase().as_str() {
            "ADDR" => {
                let value = value.strip_prefix("IPV6:").unwrap_or(value);
                attrs.addr = Some(value.parse::<IpAddr>().map_err(|_| bad_syntax(token))?);
            }
            "PORT" => {
                attrs.port = Some(value.parse::<u16>().map_err(|_| bad_syntax(token))?);
            }
            "TTL" => {
                attrs.ttl = Some(value.parse::<u32>().map_err(|_| bad_syntax(token))?);
            }
            "TIMEOUT" => {
                attrs.timeout = Some(value.parse::<u32>().map_err(|_| bad_syntax(token))?);
            }
            _ => { /* unknown attributes are ignored */ }
        }
    }
    Ok(attrs)
}

fn bad_syntax(token: &str) -> ParseError {
    ParseError {
        kind: ParseErrorKind::BadSyntax,
        reason: format!("malformed XCLIENT attribute '{token}'"),
    }
}
