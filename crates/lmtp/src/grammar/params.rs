//! `KEY` / `KEY=VALUE` ESMTP parameter parsing for `MAIL` and `RCPT`
//! (spec.md §4.1).

use super::address::{ParseError, ParseErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: Option<String>,
}

/// Capability sets recognized for each command; anything else is
/// `NotSupported` (→ `555`) rather than `BadSyntax` (→ `501`).
pub const MAIL_CAPABILITIES: &[&str] = &["BODY", "SIZE", "8BITMIME"];
pub const RCPT_CAPABILITIES: &[&str] = &["DSN", "ORCPT", "NOTIFY"];

pub fn parse_params(input: &str, known: &[&str]) -> Result<Vec<Param>, ParseError> {
    let mut params = Vec::new();
    for token in input.split_whitespace() {
        let (key, value) = match token.split_once('=') {
            Some((k, v)) => (k, Some(v.to_string())),
            None => (token, None),
        };
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ParseError {
                kind: ParseErrorKind::BadSyntax,
                reason: format!("malformed parameter '{token}'"),
            });
        }
        let key_upper = key.to_ascii_uppercase();
        if !known.iter().any(|k| *k == key_upper) {
            return Err(ParseError {
                kind: ParseErrorKind::NotSupported,
                reason: format!("unsupported parameter '{key}'"),
            });
        }
        params.push(Param {
            key: key_upper,
            value,
        });
    }
    Ok(params)
}

pub fn find<'a>(params: &'a [Param], key: &str) -> Option<&'a Param> {
    params.iter().find(|p| p.key == key)
}
