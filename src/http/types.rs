use crate::events::EventKind;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub type JsonResult<T> = Result<Json<HttpResponse<T>>, (StatusCode, Json<HttpResponse<T>>)>;

#[derive(Serialize)]
pub struct HttpResponse<T> {
    pub success: bool,
    pub response: Option<T>,
    pub error: Option<String>,
}

/// Error carried through axum's `Result` extractor path, distinct from
/// [`crate::sms::error::SmsError`] which models SMS object model failures;
/// this is purely transport-level (auth, bad headers).
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}
impl axum::response::IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(HttpResponse::<()> {
                success: false,
                response: None,
                error: Some(self.message),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSmsRequest {
    pub number: Option<String>,
    pub text: Option<String>,

    /// Hex-encoded raw user data, for binary SMS. Mutually exclusive with `text`.
    #[serde(default)]
    pub data_hex: Option<String>,

    #[serde(default)]
    pub flash: bool,

    #[serde(default)]
    pub validity_period: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct StoreSmsRequest {
    /// AT-style storage identifier (`"SM"`, `"ME"`, ...). Defaults to the
    /// modem's default write storage when omitted.
    #[serde(default)]
    pub storage: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetLogLevelRequest {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    pub events: Option<String>,
}
impl WebSocketQuery {
    pub fn get_event_types(&self) -> Option<Vec<EventKind>> {
        let events_str = self.events.as_ref()?;
        if events_str == "*" {
            return None;
        }

        let events: Vec<EventKind> = events_str
            .split(",")
            .filter_map(|s| EventKind::try_from(s.trim()).ok())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        // If there are none or all, accept all events by applying no filter
        let size = events.len();
        if size == 0 || size == EventKind::COUNT {
            return None;
        }

        Some(events)
    }
}

#[cfg(test)]
mod websocket_query_tests {
    use super::*;

    #[test]
    fn test_returns_none() {
        let query = WebSocketQuery {
            events: Some("*".to_string()),
        };
        assert_eq!(query.get_event_types(), None);

        let query = WebSocketQuery { events: None };
        assert_eq!(query.get_event_types(), None);

        let query = WebSocketQuery {
            events: Some("".to_string()),
        };
        assert_eq!(query.get_event_types(), None);

        let query = WebSocketQuery {
            events: Some("invalid1,invalid2,invalid3".to_string()),
        };
        assert_eq!(query.get_event_types(), None);

        let query = WebSocketQuery {
            events: Some(" , , ".to_string()),
        };
        assert_eq!(query.get_event_types(), None);

        // All valid event types
        let query = WebSocketQuery {
            events: Some("incoming,outgoing,delivery,modem_status_update".to_string()),
        };
        assert_eq!(query.get_event_types(), None);
    }

    #[test]
    fn test_parsing_and_filtering() {
        // Single valid
        let query = WebSocketQuery {
            events: Some("incoming".to_string()),
        };
        let result = query.get_event_types().unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.contains(&EventKind::IncomingMessage));

        // Duplicates
        let query = WebSocketQuery {
            events: Some("incoming,outgoing,incoming,delivery,outgoing".to_string()),
        };
        let result = query.get_event_types().unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.contains(&EventKind::IncomingMessage));
        assert!(result.contains(&EventKind::OutgoingMessage));
        assert!(result.contains(&EventKind::DeliveryReport));

        // Mixed valid and invalid events with whitespace
        let query = WebSocketQuery {
            events: Some(" incoming , invalid_event , outgoing , unknown, delivery ".to_string()),
        };
        let result = query.get_event_types().unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.contains(&EventKind::IncomingMessage));
        assert!(result.contains(&EventKind::OutgoingMessage));
        assert!(result.contains(&EventKind::DeliveryReport));

        let query = WebSocketQuery {
            events: Some(",incoming,,outgoing,".to_string()),
        };
        let result = query.get_event_types().unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.contains(&EventKind::IncomingMessage));
        assert!(result.contains(&EventKind::OutgoingMessage));
    }
}
