//! Header predicates for the HTTP transport.
//!
//! Each rule is a pure function over raw header values so it can be
//! tested without building requests.

/// Session header name, used on requests and responses.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Resume marker sent by reconnecting SSE clients.
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

pub const JSON_MEDIA_TYPE: &str = "application/json";
pub const EVENT_STREAM_MEDIA_TYPE: &str = "text/event-stream";

/// Whether a request's `Origin` is acceptable.
///
/// A missing header is allowed so non-browser clients work; a present one
/// must match the allow-list exactly.
pub fn origin_allowed(origin: Option<&str>, allow_list: &[String]) -> bool {
    match origin {
        None => true,
        Some(origin) => allow_list.iter().any(|allowed| allowed == origin),
    }
}

/// Whether an `Accept` header admits `media_type`.
///
/// Parameters (`;q=0.5`) are ignored, and `*/*` or `type/*` ranges match.
/// A missing header admits nothing.
pub fn accepts(accept: Option<&str>, media_type: &str) -> bool {
    let Some(accept) = accept else {
        return false;
    };
    let (main_type, _) = media_type.split_once('/').unwrap_or((media_type, ""));

    accept
        .split(',')
        .map(|range| range.split(';').next().unwrap_or_default().trim())
        .any(|range| {
            range.eq_ignore_ascii_case(media_type)
                || range == "*/*"
                || range
                    .strip_suffix("/*")
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(main_type))
        })
}

/// Whether a POST may be answered in a form the client takes.
pub fn accepts_post_response(accept: Option<&str>) -> bool {
    accepts(accept, JSON_MEDIA_TYPE) || accepts(accept, EVENT_STREAM_MEDIA_TYPE)
}

/// Session ids are non-empty and made only of visible ASCII (0x21..=0x7E).
pub fn is_valid_session_id(id: &[u8]) -> bool {
    !id.is_empty() && id.iter().all(|b| (0x21..=0x7E).contains(b))
}
