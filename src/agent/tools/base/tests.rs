use super::*;

#[test]
fn test_tool_result_error_flag() {
    let ok = ToolResult::new("done");
    assert!(!ok.is_error);
    let err = ToolResult::error("boom");
    assert!(err.is_error);
}

#[test]
fn test_tool_version_display_default() {
    assert_eq!(ToolVersion::default().to_string(), "1.0.0");
}
