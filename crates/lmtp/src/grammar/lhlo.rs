//! `LHLO` argument parsing (spec.md §4.1).
//!
//! Unlike every other grammar in this module, an unparsable `LHLO` argument
//! does not fail the command: the original accepts it leniently and
//! canonicalizes the greeting name to the literal string `"invalid"`
//! (spec.md §4.1, Open Question 1).

pub fn parse_lhlo_argument(input: &str) -> String {
    let input = input.trim();
    if input.is_empty() {
        return "invalid".to_string();
    }
    if let Some(literal) = input.strip_prefix('[') {
        return match literal.strip_suffix(']') {
            Some(inner) if !inner.is_empty() && !inner.contains(['\\', '[']) => {
                format!("[{inner}]")
            }
            _ => "invalid".to_string(),
        };
    }
    if is_dot_atom(input) {
        input.to_string()
    } else {
        "invalid".to_string()
    }
}

fn is_dot_atom(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|label| {
            !label.is_empty()
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_dot_atom() {
        assert_eq!(parse_lhlo_argument("mail.example.com"), "mail.example.com");
    }

    #[test]
    fn accepts_address_literal() {
        assert_eq!(parse_lhlo_argument("[192.0.2.1]"), "[192.0.2.1]");
    }

    #[test]
    fn unparsable_literal_is_invalid_but_does_not_fail() {
        assert_eq!(parse_lhlo_argument("[bad\\stuff]"), "invalid");
    }

    #[test]
    fn empty_argument_is_invalid() {
        assert_eq!(parse_lhlo_argument(""), "invalid");
    }

    #[test]
    fn round_trip_echoes_stored_greeting() {
        let stored = parse_lhlo_argument("client.example.org");
        assert_eq!(parse_lhlo_argument(&stored), stored);
    }
}
