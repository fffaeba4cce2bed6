use super::*;
use crate::agent::tools::base::ExecutionContext;
use std::collections::HashSet;
use std::fs;

// --- check_path_allowed ---

#[test]
fn test_check_path_allowed_none_allows_all() {
    let tmp = std::env::temp_dir();
    assert!(check_path_allowed(&tmp, None).is_ok());
}

#[test]
fn test_check_path_allowed_within_root() {
    let tmp = std::env::temp_dir();
    let roots = Some(vec![tmp.clone()]);
    assert!(check_path_allowed(&tmp, roots.as_ref()).is_ok());
}

#[test]
fn test_check_path_allowed_outside_root() {
    let roots = Some(vec![PathBuf::from("/tmp/buckley_test_nonexistent_root")]);
    let result = check_path_allowed(&std::env::temp_dir(), roots.as_ref());
    assert!(result.is_err());
    let err = result.unwrap_err().to_string();
    assert!(err.contains("outside the allowed directories"));
}

#[test]
fn test_check_path_allowed_nonexistent_inside_root() {
    // Non-existent paths inside an allowed root should be allowed (for write operations)
    let roots = Some(vec![std::env::temp_dir()]);
    let result = check_path_allowed(Path::new("/tmp/does_not_exist_12345"), roots.as_ref());
    assert!(result.is_ok());
}

#[test]
fn test_check_path_allowed_nonexistent_traversal_blocked() {
    // Non-existent paths that use `..` to escape the root must be rejected
    let roots = Some(vec![std::env::temp_dir()]);
    let result = check_path_allowed(Path::new("/tmp/../etc/passwd"), roots.as_ref());
    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("outside the allowed directories")
    );
}

// --- ReadFileTool ---

#[tokio::test]
async fn test_read_file_success() {
    let dir = std::env::temp_dir().join("buckley_test_read");
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("test.txt");
    fs::write(&file, "hello world").unwrap();

    let tool = ReadFileTool::new(None);
    let result = tool
        .execute(
            serde_json::json!({"path": file.to_str().unwrap()}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(result.content, "hello world");

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_read_file_not_found() {
    let tool = ReadFileTool::new(None);
    let result = tool
        .execute(
            serde_json::json!({"path": "/tmp/buckley_nonexistent_file_12345.txt"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("not found") || result.content.contains("Cannot resolve"));
}

#[tokio::test]
async fn test_read_file_missing_param() {
    let tool = ReadFileTool::new(None);
    let result = tool
        .execute(serde_json::json!({}), &ExecutionContext::default())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_read_file_not_a_file() {
    let tool = ReadFileTool::new(None);
    let result = tool
        .execute(
            serde_json::json!({"path": "/tmp"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("Not a file (path is a directory)"));
}

#[tokio::test]
async fn test_read_file_path_restriction() {
    let dir = std::env::temp_dir().join("buckley_test_read_restricted");
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("secret.txt");
    fs::write(&file, "secret").unwrap();

    // Allow only a different root
    let other = std::env::temp_dir().join("buckley_test_other_root");
    fs::create_dir_all(&other).unwrap();
    let tool = ReadFileTool::new(Some(vec![other.clone()]));
    let result = tool
        .execute(
            serde_json::json!({"path": file.to_str().unwrap()}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("outside the allowed directories"));

    fs::remove_dir_all(&dir).unwrap();
    fs::remove_dir_all(&other).unwrap();
}

// --- WriteFileTool ---

#[tokio::test]
async fn test_write_file_success() {
    let dir = std::env::temp_dir().join("buckley_test_write");
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("output.txt");

    let tool = WriteFileTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({"path": file.to_str().unwrap(), "content": "test content"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert!(result.content.contains("File written"));
    assert_eq!(fs::read_to_string(&file).unwrap(), "test content");

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_write_file_creates_parent_dirs() {
    let dir = std::env::temp_dir().join("buckley_test_write_nested/a/b/c");
    let file = dir.join("deep.txt");

    let tool = WriteFileTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({"path": file.to_str().unwrap(), "content": "deep"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(fs::read_to_string(&file).unwrap(), "deep");

    fs::remove_dir_all(std::env::temp_dir().join("buckley_test_write_nested")).unwrap();
}

// --- EditFileTool ---

#[tokio::test]
async fn test_edit_file_success() {
    let dir = std::env::temp_dir().join("buckley_test_edit");
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("edit.txt");
    fs::write(&file, "hello world").unwrap();

    let tool = EditFileTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({
                "path": file.to_str().unwrap(),
                "old_text": "hello",
                "new_text": "goodbye"
            }),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(fs::read_to_string(&file).unwrap(), "goodbye world");

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_edit_file_old_text_not_found() {
    let dir = std::env::temp_dir().join("buckley_test_edit_nf");
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("edit.txt");
    fs::write(&file, "hello world").unwrap();

    let tool = EditFileTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({
                "path": file.to_str().unwrap(),
                "old_text": "missing text",
                "new_text": "replacement"
            }),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("old_text not found"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_edit_file_ambiguous_match() {
    let dir = std::env::temp_dir().join("buckley_test_edit_ambig");
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("edit.txt");
    fs::write(&file, "foo bar foo baz").unwrap();

    let tool = EditFileTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({
                "path": file.to_str().unwrap(),
                "old_text": "foo",
                "new_text": "qux"
            }),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("appears 2 times"));

    fs::remove_dir_all(&dir).unwrap();
}

// --- ListDirTool ---

#[tokio::test]
async fn test_list_dir_success() {
    let dir = std::env::temp_dir().join("buckley_test_listdir");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("a.txt"), "").unwrap();
    fs::write(dir.join("b.txt"), "").unwrap();
    fs::create_dir_all(dir.join("subdir")).unwrap();

    let tool = ListDirTool::new(None);
    let result = tool
        .execute(
            serde_json::json!({"path": dir.to_str().unwrap()}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert!(result.content.contains("a.txt"));
    assert!(result.content.contains("b.txt"));
    assert!(result.content.contains("subdir/"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_list_dir_not_found() {
    let tool = ListDirTool::new(None);
    let result = tool
        .execute(
            serde_json::json!({"path": "/tmp/buckley_nonexistent_dir_12345"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("not found") || result.content.contains("Cannot resolve"));
}

#[tokio::test]
async fn test_list_dir_not_a_directory() {
    let dir = std::env::temp_dir().join("buckley_test_listdir_file");
    fs::create_dir_all(dir.parent().unwrap()).unwrap();
    fs::write(&dir, "not a dir").unwrap();

    let tool = ListDirTool::new(None);
    let result = tool
        .execute(
            serde_json::json!({"path": dir.to_str().unwrap()}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("Not a directory"));

    fs::remove_file(&dir).unwrap();
}

// --- backup_file ---

#[tokio::test]
async fn test_backup_creates_copy() {
    let dir = std::env::temp_dir().join("buckley_test_backup_basic");
    let backup_dir = dir.join("backups");
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("test.md");
    fs::write(&file, "original content").unwrap();

    backup_file(&file, &backup_dir);

    assert!(backup_dir.exists());
    let backups: Vec<_> = fs::read_dir(&backup_dir).unwrap().flatten().collect();
    assert_eq!(backups.len(), 1);
    let backup_content = fs::read_to_string(backups[0].path()).unwrap();
    assert_eq!(backup_content, "original content");
    let name = backups[0].file_name().to_string_lossy().to_string();
    assert!(
        name.starts_with("test.md."),
        "backup name should be prefixed: {}",
        name
    );

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_backup_skips_nonexistent_file() {
    let dir = std::env::temp_dir().join("buckley_test_backup_skip");
    let backup_dir = dir.join("backups");
    let _ = fs::remove_dir_all(&dir);

    backup_file(&dir.join("nope.md"), &backup_dir);

    assert!(!backup_dir.exists());
}

#[tokio::test]
async fn test_backup_prunes_old_copies() {
    let dir = std::env::temp_dir().join("buckley_test_backup_prune");
    let backup_dir = dir.join("backups");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&backup_dir).unwrap();

    let file = dir.join("data.md");
    fs::write(&file, "content").unwrap();

    // Create 16 fake old backups (exceed MAX_BACKUPS of 14)
    for i in 0..16 {
        let name = format!("data.md.20250101-{:06}", i);
        fs::write(backup_dir.join(&name), format!("v{}", i)).unwrap();
    }

    // Trigger backup which should prune to 14
    backup_file(&file, &backup_dir);

    let count = fs::read_dir(&backup_dir)
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("data.md."))
        .count();
    assert_eq!(
        count, MAX_BACKUPS,
        "should keep exactly {} backups",
        MAX_BACKUPS
    );

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_write_file_creates_backup() {
    let dir = std::env::temp_dir().join("buckley_test_write_backup");
    let backup_dir = dir.join("backups");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();

    let file = dir.join("target.md");
    fs::write(&file, "before").unwrap();

    let tool = WriteFileTool::new(None, Some(backup_dir.clone()));
    let result = tool
        .execute(
            serde_json::json!({"path": file.to_str().unwrap(), "content": "after"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(fs::read_to_string(&file).unwrap(), "after");

    let backups: Vec<_> = fs::read_dir(&backup_dir).unwrap().flatten().collect();
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read_to_string(backups[0].path()).unwrap(), "before");

    fs::remove_dir_all(&dir).unwrap();
}

// --- glob_to_regex ---

#[test]
fn test_glob_to_regex_star_and_question() {
    let re = glob_to_regex("*.rs").unwrap();
    assert!(re.is_match("mod.rs"));
    assert!(re.is_match(".rs"));
    assert!(!re.is_match("mod.rs.bak"));

    let re = glob_to_regex("file?.txt").unwrap();
    assert!(re.is_match("file1.txt"));
    assert!(!re.is_match("file12.txt"));
}

#[test]
fn test_glob_to_regex_escapes_special_chars() {
    let re = glob_to_regex("a.b*").unwrap();
    assert!(re.is_match("a.b"));
    assert!(re.is_match("a.bxyz"));
    assert!(!re.is_match("axb"));
}

// --- FindFilesTool ---

#[tokio::test]
async fn test_find_files_matches_recursively() {
    let dir = std::env::temp_dir().join("buckley_test_find_files");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(dir.join("sub")).unwrap();
    fs::write(dir.join("a.rs"), "").unwrap();
    fs::write(dir.join("sub/b.rs"), "").unwrap();
    fs::write(dir.join("sub/c.txt"), "").unwrap();

    let tool = FindFilesTool::new(None);
    let result = tool
        .execute(
            serde_json::json!({"path": dir.to_str().unwrap(), "pattern": "*.rs"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert!(result.content.contains("a.rs"));
    assert!(result.content.contains("b.rs"));
    assert!(!result.content.contains("c.txt"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_find_files_no_matches() {
    let dir = std::env::temp_dir().join("buckley_test_find_files_empty");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();

    let tool = FindFilesTool::new(None);
    let result = tool
        .execute(
            serde_json::json!({"path": dir.to_str().unwrap(), "pattern": "*.nope"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert!(result.content.contains("No matching files"));

    fs::remove_dir_all(&dir).unwrap();
}

// --- FileExistsTool ---

#[tokio::test]
async fn test_file_exists_reports_file_dir_missing() {
    let dir = std::env::temp_dir().join("buckley_test_file_exists");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("here.txt");
    fs::write(&file, "x").unwrap();

    let tool = FileExistsTool::new(None);

    let result = tool
        .execute(serde_json::json!({"path": file.to_str().unwrap()}), &ExecutionContext::default())
        .await
        .unwrap();
    assert_eq!(result.content, "file");

    let result = tool
        .execute(serde_json::json!({"path": dir.to_str().unwrap()}), &ExecutionContext::default())
        .await
        .unwrap();
    assert_eq!(result.content, "directory");

    let result = tool
        .execute(
            serde_json::json!({"path": dir.join("missing.txt").to_str().unwrap()}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert_eq!(result.content, "missing");

    fs::remove_dir_all(&dir).unwrap();
}

// --- GetFileInfoTool ---

#[tokio::test]
async fn test_get_file_info_reports_size_and_kind() {
    let dir = std::env::temp_dir().join("buckley_test_file_info");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("info.txt");
    fs::write(&file, "12345").unwrap();

    let tool = GetFileInfoTool::new(None);
    let result = tool
        .execute(serde_json::json!({"path": file.to_str().unwrap()}), &ExecutionContext::default())
        .await
        .unwrap();
    assert!(!result.is_error);
    assert!(result.content.contains("kind: file"));
    assert!(result.content.contains("size_bytes: 5"));

    fs::remove_dir_all(&dir).unwrap();
}

// --- SearchTextTool ---

#[tokio::test]
async fn test_search_text_finds_matches_across_directory() {
    let dir = std::env::temp_dir().join("buckley_test_search_text");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(dir.join("sub")).unwrap();
    fs::write(dir.join("a.txt"), "alpha\nneedle here\nomega").unwrap();
    fs::write(dir.join("sub/b.txt"), "no match").unwrap();

    let tool = SearchTextTool::new(None);
    let result = tool
        .execute(
            serde_json::json!({"path": dir.to_str().unwrap(), "pattern": "needle"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert!(result.content.contains("a.txt:2: needle here"));
    assert!(!result.content.contains("b.txt"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_search_text_invalid_regex() {
    let dir = std::env::temp_dir().join("buckley_test_search_text_bad_re");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("a.txt"), "x").unwrap();

    let tool = SearchTextTool::new(None);
    let result = tool
        .execute(
            serde_json::json!({"path": dir.to_str().unwrap(), "pattern": "("}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("invalid pattern"));

    fs::remove_dir_all(&dir).unwrap();
}

// --- PatchFileTool ---

#[tokio::test]
async fn test_patch_file_applies_multiple_hunks() {
    let dir = std::env::temp_dir().join("buckley_test_patch_file");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("patch.txt");
    fs::write(&file, "one two three").unwrap();

    let tool = PatchFileTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({
                "path": file.to_str().unwrap(),
                "hunks": [
                    {"old_text": "one", "new_text": "ONE"},
                    {"old_text": "three", "new_text": "THREE"}
                ]
            }),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(fs::read_to_string(&file).unwrap(), "ONE two THREE");

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_patch_file_rejects_unmatched_hunk() {
    let dir = std::env::temp_dir().join("buckley_test_patch_file_missing");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("patch.txt");
    fs::write(&file, "one two three").unwrap();

    let tool = PatchFileTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({
                "path": file.to_str().unwrap(),
                "hunks": [{"old_text": "missing", "new_text": "x"}]
            }),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(result.is_error);
    assert_eq!(fs::read_to_string(&file).unwrap(), "one two three");

    fs::remove_dir_all(&dir).unwrap();
}

// --- InsertTextTool ---

#[tokio::test]
async fn test_insert_text_before_line() {
    let dir = std::env::temp_dir().join("buckley_test_insert_text");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("insert.txt");
    fs::write(&file, "one\ntwo\nthree").unwrap();

    let tool = InsertTextTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({"path": file.to_str().unwrap(), "line": 2, "text": "inserted"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(fs::read_to_string(&file).unwrap(), "one\ninserted\ntwo\nthree\n");

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_insert_text_out_of_range() {
    let dir = std::env::temp_dir().join("buckley_test_insert_text_oob");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("insert.txt");
    fs::write(&file, "one\ntwo").unwrap();

    let tool = InsertTextTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({"path": file.to_str().unwrap(), "line": 10, "text": "x"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(result.is_error);

    fs::remove_dir_all(&dir).unwrap();
}

// --- DeleteLinesTool ---

#[tokio::test]
async fn test_delete_lines_removes_range() {
    let dir = std::env::temp_dir().join("buckley_test_delete_lines");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("delete.txt");
    fs::write(&file, "one\ntwo\nthree\nfour").unwrap();

    let tool = DeleteLinesTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({"path": file.to_str().unwrap(), "start_line": 2, "end_line": 3}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(fs::read_to_string(&file).unwrap(), "one\nfour\n");

    fs::remove_dir_all(&dir).unwrap();
}

// --- SearchReplaceTool ---

#[tokio::test]
async fn test_search_replace_requires_unique_match_by_default() {
    let dir = std::env::temp_dir().join("buckley_test_search_replace_ambig");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("sr.txt");
    fs::write(&file, "foo foo").unwrap();

    let tool = SearchReplaceTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({"path": file.to_str().unwrap(), "pattern": "foo", "replacement": "bar"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("matches 2 times"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_search_replace_all_replaces_every_match() {
    let dir = std::env::temp_dir().join("buckley_test_search_replace_all");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("sr.txt");
    fs::write(&file, "foo foo foo").unwrap();

    let tool = SearchReplaceTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({"path": file.to_str().unwrap(), "pattern": "foo", "replacement": "bar", "all": true}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(fs::read_to_string(&file).unwrap(), "bar bar bar");

    fs::remove_dir_all(&dir).unwrap();
}

// --- RenameSymbolTool ---

#[tokio::test]
async fn test_rename_symbol_whole_word_only() {
    let dir = std::env::temp_dir().join("buckley_test_rename_symbol");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("rename.rs");
    fs::write(&file, "let foo = foobar + foo;").unwrap();

    let tool = RenameSymbolTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({"path": file.to_str().unwrap(), "old_name": "foo", "new_name": "baz"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(fs::read_to_string(&file).unwrap(), "let baz = foobar + baz;");

    fs::remove_dir_all(&dir).unwrap();
}

// --- ExtractFunctionTool ---

#[tokio::test]
async fn test_extract_function_replaces_range_with_call() {
    let dir = std::env::temp_dir().join("buckley_test_extract_function");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("extract.rs");
    fs::write(&file, "fn main() {\n    let x = 1;\n    let y = 2;\n}\n").unwrap();

    let tool = ExtractFunctionTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({
                "path": file.to_str().unwrap(),
                "start_line": 2,
                "end_line": 3,
                "new_name": "setup"
            }),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    let content = fs::read_to_string(&file).unwrap();
    assert!(content.contains("setup();"));
    assert!(content.contains("fn setup() {"));
    assert!(content.contains("let x = 1;"));

    fs::remove_dir_all(&dir).unwrap();
}

// --- MarkResolvedTool ---

#[tokio::test]
async fn test_mark_resolved_replaces_marked_line() {
    let dir = std::env::temp_dir().join("buckley_test_mark_resolved");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("notes.txt");
    fs::write(&file, "line one\n// TODO: fix this\nline three").unwrap();

    let tool = MarkResolvedTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({"path": file.to_str().unwrap(), "marker": "TODO: fix this", "resolution": "// done"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(fs::read_to_string(&file).unwrap(), "line one\n// done\nline three\n");

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_mark_resolved_deletes_line_without_resolution() {
    let dir = std::env::temp_dir().join("buckley_test_mark_resolved_delete");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("notes.txt");
    fs::write(&file, "line one\n// TODO: fix this\nline three").unwrap();

    let tool = MarkResolvedTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({"path": file.to_str().unwrap(), "marker": "TODO: fix this"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(fs::read_to_string(&file).unwrap(), "line one\nline three\n");

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_mark_resolved_ambiguous_marker() {
    let dir = std::env::temp_dir().join("buckley_test_mark_resolved_ambig");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("notes.txt");
    fs::write(&file, "// TODO: a\n// TODO: b").unwrap();

    let tool = MarkResolvedTool::new(None, None);
    let result = tool
        .execute(
            serde_json::json!({"path": file.to_str().unwrap(), "marker": "TODO"}),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("must be unique"));

    fs::remove_dir_all(&dir).unwrap();
}

// --- cross-tool lock table sanity ---

#[test]
fn test_lock_tables_cover_every_new_tool() {
    let read_tools: HashSet<&str> = crate::conflict::READ_LOCK_TOOLS.iter().copied().collect();
    let write_tools: HashSet<&str> = crate::conflict::WRITE_LOCK_TOOLS.iter().copied().collect();
    for name in ["find_files", "file_exists", "get_file_info", "search_text"] {
        assert!(read_tools.contains(name), "{name} missing from READ_LOCK_TOOLS");
    }
    for name in [
        "patch_file",
        "insert_text",
        "delete_lines",
        "search_replace",
        "rename_symbol",
        "extract_function",
        "mark_resolved",
    ] {
        assert!(write_tools.contains(name), "{name} missing from WRITE_LOCK_TOOLS");
    }
}

#[tokio::test]
async fn test_edit_file_creates_backup() {
    let dir = std::env::temp_dir().join("buckley_test_edit_backup");
    let backup_dir = dir.join("backups");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();

    let file = dir.join("target.md");
    fs::write(&file, "hello world").unwrap();

    let tool = EditFileTool::new(None, Some(backup_dir.clone()));
    let result = tool
        .execute(
            serde_json::json!({
                "path": file.to_str().unwrap(),
                "old_text": "hello",
                "new_text": "goodbye"
            }),
            &ExecutionContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(fs::read_to_string(&file).unwrap(), "goodbye world");

    let backups: Vec<_> = fs::read_dir(&backup_dir).unwrap().flatten().collect();
    assert_eq!(backups.len(), 1);
    assert_eq!(
        fs::read_to_string(backups[0].path()).unwrap(),
        "hello world"
    );

    fs::remove_dir_all(&dir).unwrap();
}
