//! W3C trace context and baggage carried by each connection and message.

use axum::http::HeaderMap;
use indexmap::IndexMap;
use tracing::{Span, info_span};
use uuid::Uuid;

/// Baggage key holding the player id.
pub const PLAYER_ID_KEY: &str = "player_id";
/// Baggage key holding the room code.
pub const ROOM_CODE_KEY: &str = "room_code";
/// Baggage key holding the name of the end-to-end test driving the client.
pub const TEST_NAME_KEY: &str = "test_name";
/// Header used by test clients that cannot set baggage.
pub const TEST_NAME_HEADER: &str = "x-test-name";

/// Identifiers of the remote span, parsed from `traceparent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceParent {
    /// 32 lowercase hex characters.
    pub trace_id: String,
    /// 16 lowercase hex characters.
    pub span_id: String,
    /// Trace flags byte.
    pub flags: u8,
}

impl TraceParent {
    /// Parse `00-<trace_id>-<span_id>-<flags>`; anything else is ignored.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;
        if parts.next().is_some() || version != "00" {
            return None;
        }
        let is_hex = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit());
        if !is_hex(trace_id, 32) || !is_hex(span_id, 16) || trace_id.bytes().all(|b| b == b'0') {
            return None;
        }
        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            span_id: span_id.to_ascii_lowercase(),
            flags: u8::from_str_radix(flags, 16).ok()?,
        })
    }
}

/// Trace correlation for one connection, refined per message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    /// Remote parent, if the client sent one.
    pub parent: Option<TraceParent>,
    /// Baggage entries in arrival order.
    pub baggage: IndexMap<String, String>,
    test_name_header: Option<String>,
    test_name_query: Option<String>,
}

impl TraceContext {
    /// Build from the upgrade request headers and the optional `test_name` query parameter.
    pub fn from_request(headers: &HeaderMap, test_name_query: Option<String>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };
        Self {
            parent: header("traceparent").as_deref().and_then(TraceParent::parse),
            baggage: header("baggage")
                .map(|value| parse_baggage(&value))
                .unwrap_or_default(),
            test_name_header: header(TEST_NAME_HEADER).filter(|v| !v.is_empty()),
            test_name_query: test_name_query.filter(|v| !v.is_empty()),
        }
    }

    /// Record the player in the baggage.
    pub fn with_player(mut self, player_id: Uuid) -> Self {
        self.baggage
            .insert(PLAYER_ID_KEY.to_owned(), player_id.to_string());
        self
    }

    /// Record the room in the baggage.
    pub fn with_room(mut self, room_code: &str) -> Self {
        self.baggage
            .insert(ROOM_CODE_KEY.to_owned(), room_code.to_owned());
        self
    }

    /// Overlay what a single inbound message carried in its envelope.
    pub fn for_message(
        &self,
        trace: Option<(&str, &str)>,
        header_test_name: Option<&str>,
        context_test_name: Option<&str>,
    ) -> Self {
        let mut context = self.clone();
        if let Some((trace_id, span_id)) = trace {
            let candidate = format!("00-{trace_id}-{span_id}-01");
            if let Some(parent) = TraceParent::parse(&candidate) {
                context.parent = Some(parent);
            }
        }
        if let Some(name) = context_test_name.or(header_test_name).filter(|n| !n.is_empty()) {
            context
                .baggage
                .insert(TEST_NAME_KEY.to_owned(), name.to_owned());
        }
        context
    }

    /// Test name from baggage, then the `X-Test-Name` header, then the query string.
    pub fn test_name(&self) -> Option<&str> {
        self.baggage
            .get(TEST_NAME_KEY)
            .or(self.test_name_header.as_ref())
            .or(self.test_name_query.as_ref())
            .map(String::as_str)
    }

    /// Room code recorded in the baggage.
    pub fn room_code(&self) -> Option<&str> {
        self.baggage.get(ROOM_CODE_KEY).map(String::as_str)
    }

    /// Serialized `baggage` header value.
    pub fn baggage_header(&self) -> String {
        self.baggage
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Span carrying the correlation fields.
    pub fn span(&self, name: &'static str) -> Span {
        info_span!(
            "ws",
            operation = name,
            trace_id = self.parent.as_ref().map(|p| p.trace_id.as_str()).unwrap_or(""),
            player_id = self.baggage.get(PLAYER_ID_KEY).map(String::as_str).unwrap_or(""),
            room_code = self.room_code().unwrap_or(""),
            test_name = self.test_name().unwrap_or(""),
        )
    }
}

/// Parse `key=value;props,key2=value2`, dropping malformed members and properties.
pub fn parse_baggage(value: &str) -> IndexMap<String, String> {
    value
        .split(',')
        .filter_map(|member| {
            let entry = member.split(';').next()?;
            let (key, value) = entry.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_owned(), value.trim().to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn traceparent_is_validated() {
        let parsed =
            TraceParent::parse("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01").unwrap();
        assert_eq!(parsed.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(parsed.flags, 1);

        assert!(TraceParent::parse("01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01").is_none());
        assert!(TraceParent::parse("00-00000000000000000000000000000000-00f067aa0ba902b7-01").is_none());
        assert!(TraceParent::parse("garbage").is_none());
    }

    #[test]
    fn baggage_members_keep_order_and_drop_properties() {
        let baggage = parse_baggage("test_name=lobby;prop=1, room_code=ABCDE,broken");
        assert_eq!(
            baggage.into_iter().collect::<Vec<_>>(),
            vec![
                ("test_name".to_owned(), "lobby".to_owned()),
                ("room_code".to_owned(), "ABCDE".to_owned()),
            ]
        );
    }

    #[test]
    fn test_name_prefers_baggage_then_header_then_query() {
        let mut headers = HeaderMap::new();
        headers.insert(TEST_NAME_HEADER, HeaderValue::from_static("from-header"));
        let context = TraceContext::from_request(&headers, Some("from-query".into()));
        assert_eq!(context.test_name(), Some("from-header"));

        headers.insert("baggage", HeaderValue::from_static("test_name=from-baggage"));
        let context = TraceContext::from_request(&headers, Some("from-query".into()));
        assert_eq!(context.test_name(), Some("from-baggage"));

        let context = TraceContext::from_request(&HeaderMap::new(), Some("from-query".into()));
        assert_eq!(context.test_name(), Some("from-query"));
    }

    #[test]
    fn player_and_room_are_added_to_baggage() {
        let player = Uuid::nil();
        let context = TraceContext::default().with_player(player).with_room("ABCDE");
        assert_eq!(
            context.baggage_header(),
            format!("player_id={player},room_code=ABCDE")
        );
    }
}
