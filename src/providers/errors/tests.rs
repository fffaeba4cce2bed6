use super::*;

#[test]
fn parse_api_error_surfaces_type_and_message() {
    let body = r#"{"error": {"type": "invalid_request", "message": "bad request"}}"#;
    let err = ProviderErrorHandler::parse_api_error(400, body).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("invalid_request"));
    assert!(msg.contains("bad request"));
}

#[test]
fn parse_api_error_non_json_body_falls_back_to_status_and_text() {
    let err = ProviderErrorHandler::parse_api_error(500, "plain text error").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("500"));
    assert!(msg.contains("plain text error"));
}

#[test]
fn parse_api_error_model_not_found_suggests_valid_models() {
    let body = r#"{"error": {"type": "not_found_error", "message": "model: claude-old"}}"#;
    let err = ProviderErrorHandler::parse_api_error(404, body).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("not found"));
    assert!(msg.contains("claude-sonnet-4-5-20250929"));
}

#[test]
fn handle_rate_limit_with_retry_after_mentions_seconds() {
    let err = ProviderErrorHandler::handle_rate_limit(429, Some(30)).unwrap_err();
    assert!(err.to_string().contains("30"));
}

#[test]
fn handle_rate_limit_without_retry_after_still_errors() {
    let err = ProviderErrorHandler::handle_rate_limit(429, None).unwrap_err();
    assert!(err.to_string().to_lowercase().contains("rate limit"));
}

#[test]
fn handle_auth_error_mentions_authentication() {
    let err = ProviderErrorHandler::handle_auth_error(401, "invalid token").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Authentication"));
    assert!(msg.contains("invalid token"));
}
