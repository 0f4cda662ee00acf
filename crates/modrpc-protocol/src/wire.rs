//! Wire constants for the reference (JSON over HTTP) encoding.

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";
pub const CHARSET_UTF8: &str = "utf-8";
/// Content type of envelope responses.
pub const CONTENT_TYPE_JSON_UTF8: &str = "application/json; charset=utf-8";

/// Default query parameter carrying the module id.
pub const MODULE_PARAM: &str = "module";
/// Default query parameter carrying the method id.
pub const METHOD_PARAM: &str = "method";
/// Default query parameter carrying the optional session id.
pub const SESSION_PARAM: &str = "session";

/// Split a `Content-Type` value into its media type and optional charset.
///
/// `application/json; charset=UTF-8` yields `("application/json", Some("utf-8"))`.
pub fn parse_content_type(value: &str) -> (String, Option<String>) {
    let mut parts = value.split(';');
    let media = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    let charset = parts.find_map(|p| {
        let (key, val) = p.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(val.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    });
    (media, charset)
}
