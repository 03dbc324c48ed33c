/*
 * Copyright (c) 2023 Stalwart Labs Ltd.
 *
 * This file is part of Stalwart Mail Server.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of
 * the License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 * in the LICENSE file at the top-level directory of this distribution.
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 * You can be released from the requirements of the AGPLv3 license by
 * purchasing a commercial license. Please contact licensing@stalw.art
 * for more details.
*/

//! Structured event logging for the LMTP engine.
//!
//! Every noteworthy thing the engine does is a typed [`Event`] with keyed
//! fields, emitted through `tracing` rather than formatted into a string at
//! the call site. This keeps the call sites cheap and lets an operator
//! filter/aggregate on `event.kind` and individual keys downstream.

use std::fmt;

use ahash::AHashMap;

mod value;
pub use value::Value;

/// The kind of thing that happened. Variants are grouped by the component
/// that raises them, matching the module layout of `crates/lmtp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    ConnectionStart,
    ConnectionEnd,
    CommandReceived,
    ReplySent,
    TlsStarted,
    TlsFailed,
    EnvelopeReset,
    RcptAccepted,
    RcptRejected,
    PayloadSpilled,
    PayloadSinkError,
    ProxySessionStarted,
    ProxyDispatchFailed,
    DeliveryResult,
    ConcurrencyRefused,
    ConfigError,
}

impl EventType {
    pub fn level(self) -> Level {
        use EventType::*;
        match self {
            PayloadSinkError | ProxyDispatchFailed | ConfigError | TlsFailed => Level::Error,
            RcptRejected | ConcurrencyRefused => Level::Warn,
            ConnectionStart | ConnectionEnd | CommandReceived | ReplySent | TlsStarted
            | EnvelopeReset | RcptAccepted | PayloadSpilled | ProxySessionStarted
            | DeliveryResult => Level::Info,
        }
    }

    pub fn name(self) -> &'static str {
        use EventType::*;
        match self {
            ConnectionStart => "connection-start",
            ConnectionEnd => "connection-end",
            CommandReceived => "command-received",
            ReplySent => "reply-sent",
            TlsStarted => "tls-started",
            TlsFailed => "tls-failed",
            EnvelopeReset => "envelope-reset",
            RcptAccepted => "rcpt-accepted",
            RcptRejected => "rcpt-rejected",
            PayloadSpilled => "payload-spilled",
            PayloadSinkError => "payload-sink-error",
            ProxySessionStarted => "proxy-session-started",
            ProxyDispatchFailed => "proxy-dispatch-failed",
            DeliveryResult => "delivery-result",
            ConcurrencyRefused => "concurrency-refused",
            ConfigError => "config-error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

/// A single structured event. Build with [`Event::new`] and [`Event::with`],
/// then call [`Event::log`] to emit it through `tracing`.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventType,
    fields: AHashMap<&'static str, Value>,
}

impl Event {
    pub fn new(kind: EventType) -> Self {
        Event {
            kind,
            fields: AHashMap::new(),
        }
    }

    pub fn with(mut self, key: &'static str, value: impl Into<Value>) -> Self {
        self.fields.insert(key, value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Emit the event through `tracing` at the level dictated by its kind.
    pub fn log(self) {
        let name = self.kind.name();
        match self.kind.level() {
            Level::Error => tracing::error!(event = name, fields = %self, "lmtp event"),
            Level::Warn => tracing::warn!(event = name, fields = %self, "lmtp event"),
            Level::Info => tracing::info!(event = name, fields = %self, "lmtp event"),
            Level::Debug => tracing::debug!(event = name, fields = %self, "lmtp event"),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for (k, v) in &self.fields {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{k}={v}")?;
        }
        write!(f, "}}")
    }
}

#[macro_export]
macro_rules! event {
    ($kind:expr $(, $key:literal => $value:expr)* $(,)?) => {{
        let mut ev = $crate::Event::new($kind);
        $(ev = ev.with($key, $value);)*
        ev
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_carries_fields() {
        let ev = Event::new(EventType::RcptAccepted)
            .with("session-id", "abc123")
            .with("address", "user@example.com");
        assert_eq!(ev.kind, EventType::RcptAccepted);
        assert_eq!(
            ev.field("session-id").and_then(Value::as_str),
            Some("abc123")
        );
    }

    #[test]
    fn error_events_map_to_error_level() {
        assert_eq!(EventType::PayloadSinkError.level(), Level::Error);
        assert_eq!(EventType::RcptAccepted.level(), Level::Info);
    }
}
