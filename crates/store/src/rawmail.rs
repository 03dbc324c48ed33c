//! A minimal read-only view over a composed message, exposing only the
//! "wanted header list" spec.md §4.6 says the storage collaborator parses
//! when opening a raw mail handle: `From`, `To`, `Message-ID`, `Subject`,
//! `Return-Path`. Full MIME parsing belongs to the storage backend, which is
//! out of scope (spec.md §1); this is just enough for the engine to hand the
//! collaborator something it can index without re-scanning the whole body.

const WANTED_HEADERS: [&str; 5] = ["from", "to", "message-id", "subject", "return-path"];

#[derive(Debug, Clone, Default)]
pub struct RawMessageView {
    pub headers: Vec<(String, String)>,
    pub size: usize,
}

impl RawMessageView {
    /// Parse just the wanted headers out of `composed` (trace headers +
    /// body, as produced by `lmtp`'s trace header synthesis). Unknown
    /// headers and the body are ignored; this never fails — an unparsable
    /// header block just yields an empty header list.
    pub fn parse(composed: &[u8]) -> Self {
        let mut headers = Vec::new();
        let text_end = composed
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .unwrap_or(composed.len());
        let header_block = String::from_utf8_lossy(&composed[..text_end]);

        let mut current: Option<(String, String)> = None;
        for line in header_block.split("\r\n") {
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((name, value)) = current.take() {
                if WANTED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                    headers.push((name, value));
                }
            }
            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_string(), value.trim().to_string()));
            }
        }
        if let Some((name, value)) = current {
            if WANTED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                headers.push((name, value));
            }
        }

        RawMessageView {
            headers,
            size: composed.len(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_wanted_headers_only() {
        let msg = b"Return-Path: <a@b>\r\nX-Spam: no\r\nSubject: hi\r\n\r\nbody\r\n";
        let view = RawMessageView::parse(msg);
        assert_eq!(view.header("return-path"), Some("<a@b>"));
        assert_eq!(view.header("subject"), Some("hi"));
        assert_eq!(view.header("x-spam"), None);
    }

    #[test]
    fn folded_header_is_joined() {
        let msg = b"Subject: hello\r\n  world\r\n\r\nbody";
        let view = RawMessageView::parse(msg);
        assert_eq!(view.header("subject"), Some("hello world"));
    }
}
