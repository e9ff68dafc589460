//! Parsing of verbose OData responses (`Accept: application/json;odata=verbose`).
//!
//! # Design
//! Payloads arrive wrapped in a `d` envelope. A missing envelope, or an
//! empty body, is an empty result rather than an error; only a body that
//! is not JSON at all fails to parse.

use serde_json::Value;
use tracing::warn;

use crate::error::ApiError;
use crate::http::HttpResponse;
use crate::types::Metadata;

/// Map a non-2xx status to `HttpError` carrying the serialized response.
pub fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::HttpError {
        status: response.status,
        message: response.to_message_string(),
    })
}

/// Boolean operations succeed on exactly HTTP 200.
pub fn parse_flag(response: &HttpResponse, operation: &str) -> bool {
    if response.status == 200 {
        return true;
    }
    warn!(
        operation,
        status = response.status,
        body = %response.body_text(),
        "request did not succeed"
    );
    false
}

/// The `d` object of a successful response, or an empty map.
pub fn parse_object(response: &HttpResponse) -> Result<Metadata, ApiError> {
    check_status(response)?;
    match envelope(response)? {
        Some(Value::Object(map)) => Ok(map),
        _ => Ok(Metadata::new()),
    }
}

/// The `d.results` array of a successful response, or an empty vector.
pub fn parse_results(response: &HttpResponse) -> Result<Vec<Value>, ApiError> {
    check_status(response)?;
    let Some(Value::Object(mut map)) = envelope(response)? else {
        return Ok(Vec::new());
    };
    match map.remove("results") {
        Some(Value::Array(results)) => Ok(results),
        _ => Ok(Vec::new()),
    }
}

/// A byte offset reported as `d.<field>`. SharePoint serialises Int64
/// values as strings in verbose mode; plain numbers are accepted too.
pub fn parse_offset(response: &HttpResponse, field: &str) -> Result<u64, ApiError> {
    check_status(response)?;
    let envelope = envelope(response)?;
    let value = envelope
        .as_ref()
        .and_then(|d| d.get(field))
        .ok_or_else(|| ApiError::DeserializationError(format!("response has no d.{field}")))?;
    let offset = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    offset.ok_or_else(|| ApiError::DeserializationError(format!("d.{field} is not an offset: {value}")))
}

fn envelope(response: &HttpResponse) -> Result<Option<Value>, ApiError> {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let mut value: Value = serde_json::from_slice(&response.body)
        .map_err(|e| ApiError::DeserializationError(e.to_string()))?;
    Ok(value.get_mut("d").map(Value::take))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn flag_requires_exactly_200() {
        assert!(parse_flag(&response(200, ""), "test"));
        assert!(!parse_flag(&response(201, ""), "test"));
        assert!(!parse_flag(&response(409, ""), "test"));
    }

    #[test]
    fn object_is_unwrapped_from_envelope() {
        let meta = parse_object(&response(200, r#"{"d":{"Name":"a.txt","Length":"3"}}"#)).unwrap();
        assert_eq!(meta["Name"], "a.txt");
    }

    #[test]
    fn object_without_envelope_is_empty() {
        assert!(parse_object(&response(200, r#"{"odata.error":null}"#)).unwrap().is_empty());
        assert!(parse_object(&response(200, "")).unwrap().is_empty());
    }

    #[test]
    fn results_without_envelope_are_empty() {
        assert!(parse_results(&response(200, "{}")).unwrap().is_empty());
        assert!(parse_results(&response(200, r#"{"d":{}}"#)).unwrap().is_empty());
    }

    #[test]
    fn results_are_returned_in_order() {
        let body = r#"{"d":{"results":[{"Name":"a"},{"Name":"b"}]}}"#;
        let results = parse_results(&response(200, body)).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1]["Name"], "b");
    }

    #[test]
    fn error_status_carries_serialized_response() {
        let err = parse_results(&response(404, "gone")).unwrap_err();
        match err {
            ApiError::HttpError { status, message } => {
                assert_eq!(status, 404);
                assert!(message.starts_with("HTTP/1.1 404 Not Found"));
                assert!(message.ends_with("gone"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_a_deserialization_error() {
        let err = parse_object(&response(200, "<html>")).unwrap_err();
        assert!(matches!(err, ApiError::DeserializationError(_)));
    }

    #[test]
    fn offsets_accept_strings_and_numbers() {
        assert_eq!(parse_offset(&response(200, r#"{"d":{"StartUpload":"1024"}}"#), "StartUpload").unwrap(), 1024);
        assert_eq!(parse_offset(&response(200, r#"{"d":{"ContinueUpload":2048}}"#), "ContinueUpload").unwrap(), 2048);
        assert!(parse_offset(&response(200, r#"{"d":{}}"#), "StartUpload").is_err());
    }
}
