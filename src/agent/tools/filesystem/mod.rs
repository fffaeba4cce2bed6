use crate::agent::tools::base::ExecutionContext;
use crate::agent::tools::{Tool, ToolResult, ToolVersion};
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Maximum file size that `read_file` will load (10 MB).
const MAX_READ_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of matches `find_files` / `search_text` will return before
/// truncating (with a trailing note) rather than silently growing unbounded.
const MAX_SEARCH_RESULTS: usize = 200;

/// Resolve a path argument against `~` and a `None`-tolerant allowed-roots
/// check. Shared by every new filesystem tool added below `ListDirTool`.
fn resolve_path(path_str: &str, allowed_roots: Option<&Vec<PathBuf>>) -> Result<PathBuf, ToolResult> {
    let file_path = PathBuf::from(path_str);
    let expanded = file_path
        .canonicalize()
        .or_else(|_| {
            let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
            let stripped = file_path.strip_prefix("~").unwrap_or(file_path.as_path());
            Ok::<PathBuf, anyhow::Error>(home.join(stripped))
        })
        .map_err(|e: anyhow::Error| ToolResult::error(e.to_string()))?;
    check_path_allowed(&expanded, allowed_roots).map_err(|e| ToolResult::error(e.to_string()))?;
    Ok(expanded)
}

/// Compile a simple `*`/`?` glob pattern into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut out = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).map_err(|e| anyhow::anyhow!("invalid pattern: {}", e))
}

fn check_path_allowed(file_path: &Path, allowed_roots: Option<&Vec<PathBuf>>) -> Result<()> {
    if let Some(roots) = allowed_roots {
        let resolved = file_path
            .canonicalize()
            .map_err(|_| anyhow::anyhow!("Error: Cannot resolve path '{}'", file_path.display()))?;
        for root in roots {
            if let Ok(root_resolved) = root.canonicalize()
                && (resolved == root_resolved || resolved.starts_with(&root_resolved))
            {
                return Ok(());
            }
        }
        let roots_str = roots
            .iter()
            .map(|r| r.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        anyhow::bail!(
            "Error: Path '{}' is outside the allowed directories ({})",
            file_path.display(),
            roots_str
        );
    }
    Ok(())
}

const MAX_BACKUPS: usize = 14;

/// Create a timestamped backup of a file before overwriting it.
/// Backups are stored in `backup_dir/{filename}.{timestamp}`.
/// Keeps at most `MAX_BACKUPS` copies, deleting the oldest.
fn backup_file(file_path: &Path, backup_dir: &Path) {
    if !file_path.exists() {
        return;
    }
    let Some(filename) = file_path.file_name().and_then(|f| f.to_str()) else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(backup_dir) {
        warn!(
            "Failed to create backup dir {}: {}",
            backup_dir.display(),
            e
        );
        return;
    }
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let backup_name = format!("{}.{}", filename, timestamp);
    let backup_path = backup_dir.join(&backup_name);
    if let Err(e) = std::fs::copy(file_path, &backup_path) {
        warn!(
            "Failed to backup {} â†’ {}: {}",
            file_path.display(),
            backup_path.display(),
            e
        );
        return;
    }

    // Prune old backups: list all files matching "{filename}.*", sort, remove oldest
    let prefix = format!("{}.", filename);
    let mut backups: Vec<PathBuf> = std::fs::read_dir(backup_dir)
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) && entry.path().is_file() {
                Some(entry.path())
            } else {
                None
            }
        })
        .collect();

    if backups.len() > MAX_BACKUPS {
        backups.sort();
        for old in &backups[..backups.len() - MAX_BACKUPS] {
            let _ = std::fs::remove_file(old);
        }
    }
}

pub struct ReadFileTool {
    allowed_roots: Option<Vec<PathBuf>>,
}

impl ReadFileTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>) -> Self {
        Self { allowed_roots }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read the contents of a file at the given path."
    }

    fn version(&self) -> ToolVersion {
        ToolVersion::new(1, 0, 0)
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;

        let file_path = PathBuf::from(path_str);
        let expanded = file_path.canonicalize().or_else(|_| {
            let home = dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
            let stripped = file_path.strip_prefix("~").unwrap_or(file_path.as_path());
            Ok::<PathBuf, anyhow::Error>(home.join(stripped))
        })?;

        if let Err(err) = check_path_allowed(&expanded, self.allowed_roots.as_ref()) {
            return Ok(ToolResult::error(err.to_string()));
        }

        if !expanded.exists() {
            return Ok(ToolResult::error(format!(
                "Error: File not found: {}",
                path_str
            )));
        }

        if !expanded.is_file() {
            return Ok(ToolResult::error(format!(
                "Error: Not a file (path is a directory): {}. Use list_directory to list directory contents, or read_file with a file path.",
                path_str
            )));
        }

        // Check file size before reading to prevent OOM on huge files
        match std::fs::metadata(&expanded) {
            Ok(meta) if meta.len() > MAX_READ_BYTES => {
                return Ok(ToolResult::error(format!(
                    "Error: file too large ({} bytes, max {}). Use shell tool to read partial content.",
                    meta.len(),
                    MAX_READ_BYTES
                )));
            }
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Error reading file metadata: {}",
                    e
                )));
            }
            _ => {}
        }

        match std::fs::read_to_string(&expanded) {
            Ok(content) => Ok(ToolResult::new(content)),
            Err(e) => Ok(ToolResult::error(format!("Error reading file: {}", e))),
        }
    }
}

pub struct WriteFileTool {
    allowed_roots: Option<Vec<PathBuf>>,
    backup_dir: Option<PathBuf>,
}

impl WriteFileTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>, backup_dir: Option<PathBuf>) -> Self {
        Self {
            allowed_roots,
            backup_dir,
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file at the given path. Creates parent directories if needed."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;
        let content = params["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'content' parameter"))?;

        let file_path = PathBuf::from(path_str);
        let expanded = file_path.canonicalize().or_else(|_| {
            let home = dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
            let stripped = file_path.strip_prefix("~").unwrap_or(file_path.as_path());
            Ok::<PathBuf, anyhow::Error>(home.join(stripped))
        })?;

        // Check path restrictions even after fallback canonicalization
        if let Err(err) = check_path_allowed(&expanded, self.allowed_roots.as_ref()) {
            return Ok(ToolResult::error(err.to_string()));
        }

        if let Some(ref backup_dir) = self.backup_dir {
            backup_file(&expanded, backup_dir);
        }

        if let Some(parent) = expanded.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match std::fs::write(&expanded, content) {
            Ok(()) => Ok(ToolResult::new(format!("File written: {}", path_str))),
            Err(e) => Ok(ToolResult::error(format!("Error writing file: {}", e))),
        }
    }
}

pub struct EditFileTool {
    allowed_roots: Option<Vec<PathBuf>>,
    backup_dir: Option<PathBuf>,
}

impl EditFileTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>, backup_dir: Option<PathBuf>) -> Self {
        Self {
            allowed_roots,
            backup_dir,
        }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Edit a file by replacing old_text with new_text. The old_text must exist exactly in the file."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to edit"
                },
                "old_text": {
                    "type": "string",
                    "description": "The exact text to find and replace"
                },
                "new_text": {
                    "type": "string",
                    "description": "The text to replace with"
                }
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;
        let old_text = params["old_text"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'old_text' parameter"))?;
        let new_text = params["new_text"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'new_text' parameter"))?;

        let file_path = PathBuf::from(path_str);
        let expanded = file_path.canonicalize().or_else(|_| {
            let home = dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
            let stripped = file_path.strip_prefix("~").unwrap_or(file_path.as_path());
            Ok::<PathBuf, anyhow::Error>(home.join(stripped))
        })?;

        if let Err(err) = check_path_allowed(&expanded, self.allowed_roots.as_ref()) {
            return Ok(ToolResult::error(err.to_string()));
        }

        if !expanded.exists() {
            return Ok(ToolResult::error(format!(
                "Error: File not found: {}",
                path_str
            )));
        }

        match std::fs::read_to_string(&expanded) {
            Ok(content) => {
                if !content.contains(old_text) {
                    return Ok(ToolResult::error(
                        "Error: old_text not found in file. Make sure it matches exactly."
                            .to_string(),
                    ));
                }

                let count = content.matches(old_text).count();
                if count > 1 {
                    return Ok(ToolResult::error(format!(
                        "Warning: old_text appears {} times. Please provide more context to make it unique.",
                        count
                    )));
                }

                if let Some(ref backup_dir) = self.backup_dir {
                    backup_file(&expanded, backup_dir);
                }

                let new_content = content.replacen(old_text, new_text, 1);
                match std::fs::write(&expanded, new_content) {
                    Ok(()) => Ok(ToolResult::new(format!("Successfully edited {}", path_str))),
                    Err(e) => Ok(ToolResult::error(format!("Error writing file: {}", e))),
                }
            }
            Err(e) => Ok(ToolResult::error(format!("Error reading file: {}", e))),
        }
    }
}

pub struct ListDirTool {
    allowed_roots: Option<Vec<PathBuf>>,
}

impl ListDirTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>) -> Self {
        Self { allowed_roots }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn description(&self) -> &'static str {
        "List the contents of a directory."
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The directory path to list"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;

        let dir_path = PathBuf::from(path_str);
        let expanded = dir_path.canonicalize().or_else(|_| {
            let home = dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
            let stripped = dir_path.strip_prefix("~").unwrap_or(dir_path.as_path());
            Ok::<PathBuf, anyhow::Error>(home.join(stripped))
        })?;

        if let Err(err) = check_path_allowed(&expanded, self.allowed_roots.as_ref()) {
            return Ok(ToolResult::error(err.to_string()));
        }

        if !expanded.exists() {
            return Ok(ToolResult::error(format!(
                "Error: Directory not found: {}",
                path_str
            )));
        }

        if !expanded.is_dir() {
            return Ok(ToolResult::error(format!(
                "Error: Not a directory: {}",
                path_str
            )));
        }

        let mut entries = Vec::new();
        match std::fs::read_dir(&expanded) {
            Ok(rd) => {
                for entry in rd.flatten() {
                    let name = entry.file_name().to_string_lossy().to_string();
                    let path = entry.path();
                    let is_dir = path.is_dir();
                    entries.push(format!("{}{}", name, if is_dir { "/" } else { "" }));
                }
                entries.sort();
                Ok(ToolResult::new(entries.join("\n")))
            }
            Err(e) => Ok(ToolResult::error(format!("Error reading directory: {}", e))),
        }
    }
}

pub struct FindFilesTool {
    allowed_roots: Option<Vec<PathBuf>>,
}

impl FindFilesTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>) -> Self {
        Self { allowed_roots }
    }
}

#[async_trait]
impl Tool for FindFilesTool {
    fn name(&self) -> &'static str {
        "find_files"
    }

    fn description(&self) -> &'static str {
        "Recursively find files under a directory whose name matches a glob pattern (`*`, `?`)."
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to search under" },
                "pattern": { "type": "string", "description": "Glob pattern to match file names, e.g. '*.rs'" }
            },
            "required": ["path", "pattern"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;
        let pattern = params["pattern"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'pattern' parameter"))?;

        let expanded = match resolve_path(path_str, self.allowed_roots.as_ref()) {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        if !expanded.is_dir() {
            return Ok(ToolResult::error(format!("Error: Not a directory: {}", path_str)));
        }
        let matcher = glob_to_regex(pattern)?;

        let mut matches = Vec::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(expanded.clone());
        let mut truncated = false;
        'walk: while let Some(dir) = queue.pop_front() {
            let Ok(rd) = std::fs::read_dir(&dir) else { continue };
            for entry in rd.flatten() {
                let p = entry.path();
                if p.is_dir() {
                    queue.push_back(p);
                    continue;
                }
                let Some(name) = p.file_name().and_then(|n| n.to_str()) else { continue };
                if matcher.is_match(name) {
                    matches.push(p.to_string_lossy().to_string());
                    if matches.len() >= MAX_SEARCH_RESULTS {
                        truncated = true;
                        break 'walk;
                    }
                }
            }
        }
        matches.sort();
        let mut out = matches.join("\n");
        if truncated {
            out.push_str(&format!("\n... (truncated at {} matches)", MAX_SEARCH_RESULTS));
        }
        if out.is_empty() {
            out = "No matching files found.".to_string();
        }
        Ok(ToolResult::new(out))
    }
}

pub struct FileExistsTool {
    allowed_roots: Option<Vec<PathBuf>>,
}

impl FileExistsTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>) -> Self {
        Self { allowed_roots }
    }
}

#[async_trait]
impl Tool for FileExistsTool {
    fn name(&self) -> &'static str {
        "file_exists"
    }

    fn description(&self) -> &'static str {
        "Check whether a path exists and whether it is a file or a directory."
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "path": { "type": "string", "description": "Path to check" } },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;
        let file_path = PathBuf::from(path_str);
        // Don't require the path to already exist (unlike resolve_path's canonicalize fallback,
        // existence is exactly what's being asked).
        let home = dirs::home_dir();
        let expanded = if file_path.exists() {
            file_path.canonicalize().unwrap_or(file_path)
        } else if let (Some(home), Ok(stripped)) = (&home, file_path.strip_prefix("~")) {
            home.join(stripped)
        } else {
            file_path
        };
        if let Err(err) = check_path_allowed(&expanded, self.allowed_roots.as_ref()) {
            return Ok(ToolResult::error(err.to_string()));
        }
        let verdict = if expanded.is_file() {
            "file"
        } else if expanded.is_dir() {
            "directory"
        } else {
            "missing"
        };
        Ok(ToolResult::new(verdict.to_string()))
    }
}

pub struct GetFileInfoTool {
    allowed_roots: Option<Vec<PathBuf>>,
}

impl GetFileInfoTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>) -> Self {
        Self { allowed_roots }
    }
}

#[async_trait]
impl Tool for GetFileInfoTool {
    fn name(&self) -> &'static str {
        "get_file_info"
    }

    fn description(&self) -> &'static str {
        "Get size, kind, and modification time for a file or directory."
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "path": { "type": "string", "description": "Path to inspect" } },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;
        let expanded = match resolve_path(path_str, self.allowed_roots.as_ref()) {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        let meta = match std::fs::metadata(&expanded) {
            Ok(m) => m,
            Err(e) => return Ok(ToolResult::error(format!("Error reading metadata: {}", e))),
        };
        let modified = meta
            .modified()
            .ok()
            .map(chrono::DateTime::<chrono::Utc>::from)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ToolResult::new(format!(
            "kind: {}\nsize_bytes: {}\nreadonly: {}\nmodified: {}",
            if meta.is_dir() { "directory" } else { "file" },
            meta.len(),
            meta.permissions().readonly(),
            modified,
        )))
    }
}

pub struct SearchTextTool {
    allowed_roots: Option<Vec<PathBuf>>,
}

impl SearchTextTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>) -> Self {
        Self { allowed_roots }
    }
}

#[async_trait]
impl Tool for SearchTextTool {
    fn name(&self) -> &'static str {
        "search_text"
    }

    fn description(&self) -> &'static str {
        "Search for a regex pattern in a file, or recursively across a directory of text files."
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File or directory to search" },
                "pattern": { "type": "string", "description": "Regex pattern to search for" }
            },
            "required": ["path", "pattern"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;
        let pattern = params["pattern"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'pattern' parameter"))?;
        let expanded = match resolve_path(path_str, self.allowed_roots.as_ref()) {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        let re = match Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::error(format!("Error: invalid pattern: {}", e))),
        };

        let mut files = Vec::new();
        if expanded.is_file() {
            files.push(expanded.clone());
        } else if expanded.is_dir() {
            let mut queue = std::collections::VecDeque::new();
            queue.push_back(expanded.clone());
            while let Some(dir) = queue.pop_front() {
                let Ok(rd) = std::fs::read_dir(&dir) else { continue };
                for entry in rd.flatten() {
                    let p = entry.path();
                    if p.is_dir() {
                        queue.push_back(p);
                    } else {
                        files.push(p);
                    }
                }
            }
        } else {
            return Ok(ToolResult::error(format!("Error: path not found: {}", path_str)));
        }
        files.sort();

        let mut hits = Vec::new();
        let mut truncated = false;
        'search: for file in &files {
            let Ok(content) = std::fs::read_to_string(file) else { continue };
            for (idx, line) in content.lines().enumerate() {
                if re.is_match(line) {
                    hits.push(format!("{}:{}: {}", file.display(), idx + 1, line.trim()));
                    if hits.len() >= MAX_SEARCH_RESULTS {
                        truncated = true;
                        break 'search;
                    }
                }
            }
        }
        let mut out = hits.join("\n");
        if truncated {
            out.push_str(&format!("\n... (truncated at {} matches)", MAX_SEARCH_RESULTS));
        }
        if out.is_empty() {
            out = "No matches found.".to_string();
        }
        Ok(ToolResult::new(out))
    }
}

pub struct PatchFileTool {
    allowed_roots: Option<Vec<PathBuf>>,
    backup_dir: Option<PathBuf>,
}

impl PatchFileTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>, backup_dir: Option<PathBuf>) -> Self {
        Self { allowed_roots, backup_dir }
    }
}

#[async_trait]
impl Tool for PatchFileTool {
    fn name(&self) -> &'static str {
        "patch_file"
    }

    fn description(&self) -> &'static str {
        "Apply a batch of old_text/new_text replacements to a file atomically. Each old_text must match exactly once."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path to patch" },
                "hunks": {
                    "type": "array",
                    "description": "Ordered list of replacements to apply",
                    "items": {
                        "type": "object",
                        "properties": {
                            "old_text": { "type": "string" },
                            "new_text": { "type": "string" }
                        },
                        "required": ["old_text", "new_text"]
                    }
                }
            },
            "required": ["path", "hunks"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;
        let hunks = params["hunks"].as_array().ok_or_else(|| anyhow::anyhow!("Missing 'hunks' parameter"))?;
        if hunks.is_empty() {
            return Ok(ToolResult::error("Error: 'hunks' must contain at least one replacement".to_string()));
        }

        let expanded = match resolve_path(path_str, self.allowed_roots.as_ref()) {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        if !expanded.exists() {
            return Ok(ToolResult::error(format!("Error: File not found: {}", path_str)));
        }
        let mut content = match std::fs::read_to_string(&expanded) {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(format!("Error reading file: {}", e))),
        };

        for (i, hunk) in hunks.iter().enumerate() {
            let old_text = hunk["old_text"].as_str().ok_or_else(|| anyhow::anyhow!("hunk {} missing 'old_text'", i))?;
            let new_text = hunk["new_text"].as_str().ok_or_else(|| anyhow::anyhow!("hunk {} missing 'new_text'", i))?;
            let count = content.matches(old_text).count();
            if count == 0 {
                return Ok(ToolResult::error(format!("Error: hunk {} old_text not found in file", i)));
            }
            if count > 1 {
                return Ok(ToolResult::error(format!("Error: hunk {} old_text appears {} times, must be unique", i, count)));
            }
            content = content.replacen(old_text, new_text, 1);
        }

        if let Some(ref backup_dir) = self.backup_dir {
            backup_file(&expanded, backup_dir);
        }
        match std::fs::write(&expanded, content) {
            Ok(()) => Ok(ToolResult::new(format!("Applied {} hunk(s) to {}", hunks.len(), path_str))),
            Err(e) => Ok(ToolResult::error(format!("Error writing file: {}", e))),
        }
    }
}

pub struct InsertTextTool {
    allowed_roots: Option<Vec<PathBuf>>,
    backup_dir: Option<PathBuf>,
}

impl InsertTextTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>, backup_dir: Option<PathBuf>) -> Self {
        Self { allowed_roots, backup_dir }
    }
}

#[async_trait]
impl Tool for InsertTextTool {
    fn name(&self) -> &'static str {
        "insert_text"
    }

    fn description(&self) -> &'static str {
        "Insert text before a given 1-indexed line number in a file."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path to edit" },
                "line": { "type": "integer", "description": "1-indexed line to insert before; one past the last line appends" },
                "text": { "type": "string", "description": "Text to insert" }
            },
            "required": ["path", "line", "text"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;
        let line = params["line"].as_u64().ok_or_else(|| anyhow::anyhow!("Missing 'line' parameter"))? as usize;
        let text = params["text"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'text' parameter"))?;

        let expanded = match resolve_path(path_str, self.allowed_roots.as_ref()) {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        if !expanded.exists() {
            return Ok(ToolResult::error(format!("Error: File not found: {}", path_str)));
        }
        let content = match std::fs::read_to_string(&expanded) {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(format!("Error reading file: {}", e))),
        };
        let mut lines: Vec<&str> = content.lines().collect();
        if line == 0 || line > lines.len() + 1 {
            return Ok(ToolResult::error(format!(
                "Error: line {} out of range (file has {} lines)",
                line,
                lines.len()
            )));
        }
        lines.insert(line - 1, text);

        if let Some(ref backup_dir) = self.backup_dir {
            backup_file(&expanded, backup_dir);
        }
        let new_content = format!("{}\n", lines.join("\n"));
        match std::fs::write(&expanded, new_content) {
            Ok(()) => Ok(ToolResult::new(format!("Inserted text at line {} of {}", line, path_str))),
            Err(e) => Ok(ToolResult::error(format!("Error writing file: {}", e))),
        }
    }
}

pub struct DeleteLinesTool {
    allowed_roots: Option<Vec<PathBuf>>,
    backup_dir: Option<PathBuf>,
}

impl DeleteLinesTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>, backup_dir: Option<PathBuf>) -> Self {
        Self { allowed_roots, backup_dir }
    }
}

#[async_trait]
impl Tool for DeleteLinesTool {
    fn name(&self) -> &'static str {
        "delete_lines"
    }

    fn description(&self) -> &'static str {
        "Delete a 1-indexed, inclusive range of lines from a file."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path to edit" },
                "start_line": { "type": "integer" },
                "end_line": { "type": "integer" }
            },
            "required": ["path", "start_line", "end_line"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;
        let start = params["start_line"].as_u64().ok_or_else(|| anyhow::anyhow!("Missing 'start_line' parameter"))? as usize;
        let end = params["end_line"].as_u64().ok_or_else(|| anyhow::anyhow!("Missing 'end_line' parameter"))? as usize;

        let expanded = match resolve_path(path_str, self.allowed_roots.as_ref()) {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        if !expanded.exists() {
            return Ok(ToolResult::error(format!("Error: File not found: {}", path_str)));
        }
        let content = match std::fs::read_to_string(&expanded) {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(format!("Error reading file: {}", e))),
        };
        let lines: Vec<&str> = content.lines().collect();
        if start == 0 || start > end || end > lines.len() {
            return Ok(ToolResult::error(format!(
                "Error: range {}..={} out of bounds (file has {} lines)",
                start,
                end,
                lines.len()
            )));
        }
        let mut remaining: Vec<&str> = lines[..start - 1].to_vec();
        remaining.extend_from_slice(&lines[end..]);

        if let Some(ref backup_dir) = self.backup_dir {
            backup_file(&expanded, backup_dir);
        }
        let new_content = if remaining.is_empty() { String::new() } else { format!("{}\n", remaining.join("\n")) };
        match std::fs::write(&expanded, new_content) {
            Ok(()) => Ok(ToolResult::new(format!("Deleted lines {}..={} of {}", start, end, path_str))),
            Err(e) => Ok(ToolResult::error(format!("Error writing file: {}", e))),
        }
    }
}

pub struct SearchReplaceTool {
    allowed_roots: Option<Vec<PathBuf>>,
    backup_dir: Option<PathBuf>,
}

impl SearchReplaceTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>, backup_dir: Option<PathBuf>) -> Self {
        Self { allowed_roots, backup_dir }
    }
}

#[async_trait]
impl Tool for SearchReplaceTool {
    fn name(&self) -> &'static str {
        "search_replace"
    }

    fn description(&self) -> &'static str {
        "Replace regex matches in a file. By default requires exactly one match; set all=true to replace every match."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path to edit" },
                "pattern": { "type": "string", "description": "Regex pattern to match" },
                "replacement": { "type": "string", "description": "Replacement text; supports $1-style capture references" },
                "all": { "type": "boolean", "description": "Replace every match instead of requiring exactly one (default false)" }
            },
            "required": ["path", "pattern", "replacement"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;
        let pattern = params["pattern"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'pattern' parameter"))?;
        let replacement = params["replacement"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'replacement' parameter"))?;
        let all = params["all"].as_bool().unwrap_or(false);

        let expanded = match resolve_path(path_str, self.allowed_roots.as_ref()) {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        if !expanded.exists() {
            return Ok(ToolResult::error(format!("Error: File not found: {}", path_str)));
        }
        let re = match Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::error(format!("Error: invalid pattern: {}", e))),
        };
        let content = match std::fs::read_to_string(&expanded) {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(format!("Error reading file: {}", e))),
        };

        let count = re.find_iter(&content).count();
        if count == 0 {
            return Ok(ToolResult::error("Error: pattern not found in file".to_string()));
        }
        if !all && count > 1 {
            return Ok(ToolResult::error(format!(
                "Error: pattern matches {} times; pass all=true or narrow the pattern",
                count
            )));
        }

        let new_content = if all {
            re.replace_all(&content, replacement).into_owned()
        } else {
            re.replace(&content, replacement).into_owned()
        };

        if let Some(ref backup_dir) = self.backup_dir {
            backup_file(&expanded, backup_dir);
        }
        match std::fs::write(&expanded, new_content) {
            Ok(()) => Ok(ToolResult::new(format!("Replaced {} match(es) in {}", if all { count } else { 1 }, path_str))),
            Err(e) => Ok(ToolResult::error(format!("Error writing file: {}", e))),
        }
    }
}

pub struct RenameSymbolTool {
    allowed_roots: Option<Vec<PathBuf>>,
    backup_dir: Option<PathBuf>,
}

impl RenameSymbolTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>, backup_dir: Option<PathBuf>) -> Self {
        Self { allowed_roots, backup_dir }
    }
}

#[async_trait]
impl Tool for RenameSymbolTool {
    fn name(&self) -> &'static str {
        "rename_symbol"
    }

    fn description(&self) -> &'static str {
        "Rename every whole-word occurrence of an identifier in a file. Textual, not scope-aware."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path to edit" },
                "old_name": { "type": "string", "description": "Identifier to rename" },
                "new_name": { "type": "string", "description": "New identifier name" }
            },
            "required": ["path", "old_name", "new_name"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;
        let old_name = params["old_name"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'old_name' parameter"))?;
        let new_name = params["new_name"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'new_name' parameter"))?;

        let expanded = match resolve_path(path_str, self.allowed_roots.as_ref()) {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        if !expanded.exists() {
            return Ok(ToolResult::error(format!("Error: File not found: {}", path_str)));
        }
        let re = match Regex::new(&format!(r"\b{}\b", regex::escape(old_name))) {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::error(format!("Error building pattern: {}", e))),
        };
        let content = match std::fs::read_to_string(&expanded) {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(format!("Error reading file: {}", e))),
        };
        let count = re.find_iter(&content).count();
        if count == 0 {
            return Ok(ToolResult::error(format!("Error: '{}' not found in file", old_name)));
        }
        let new_content = re.replace_all(&content, new_name).into_owned();

        if let Some(ref backup_dir) = self.backup_dir {
            backup_file(&expanded, backup_dir);
        }
        match std::fs::write(&expanded, new_content) {
            Ok(()) => Ok(ToolResult::new(format!("Renamed {} occurrence(s) of '{}' to '{}' in {}", count, old_name, new_name, path_str))),
            Err(e) => Ok(ToolResult::error(format!("Error writing file: {}", e))),
        }
    }
}

pub struct ExtractFunctionTool {
    allowed_roots: Option<Vec<PathBuf>>,
    backup_dir: Option<PathBuf>,
}

impl ExtractFunctionTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>, backup_dir: Option<PathBuf>) -> Self {
        Self { allowed_roots, backup_dir }
    }
}

#[async_trait]
impl Tool for ExtractFunctionTool {
    fn name(&self) -> &'static str {
        "extract_function"
    }

    fn description(&self) -> &'static str {
        "Extract a 1-indexed, inclusive line range into a new function placed after it, replacing the range with a call. Best-effort and not scope-aware; review the result."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path to edit" },
                "start_line": { "type": "integer" },
                "end_line": { "type": "integer" },
                "new_name": { "type": "string", "description": "Name for the extracted function" }
            },
            "required": ["path", "start_line", "end_line", "new_name"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;
        let start = params["start_line"].as_u64().ok_or_else(|| anyhow::anyhow!("Missing 'start_line' parameter"))? as usize;
        let end = params["end_line"].as_u64().ok_or_else(|| anyhow::anyhow!("Missing 'end_line' parameter"))? as usize;
        let new_name = params["new_name"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'new_name' parameter"))?;

        let expanded = match resolve_path(path_str, self.allowed_roots.as_ref()) {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        if !expanded.exists() {
            return Ok(ToolResult::error(format!("Error: File not found: {}", path_str)));
        }
        let content = match std::fs::read_to_string(&expanded) {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(format!("Error reading file: {}", e))),
        };
        let lines: Vec<&str> = content.lines().collect();
        if start == 0 || start > end || end > lines.len() {
            return Ok(ToolResult::error(format!(
                "Error: range {}..={} out of bounds (file has {} lines)",
                start,
                end,
                lines.len()
            )));
        }
        let extracted = lines[start - 1..end].join("\n");
        let indent = lines[start - 1]
            .chars()
            .take_while(|c| c.is_whitespace())
            .collect::<String>();

        let mut out: Vec<String> = lines[..start - 1].iter().map(|l| l.to_string()).collect();
        out.push(format!("{}{}();", indent, new_name));
        out.extend(lines[end..].iter().map(|l| l.to_string()));
        out.push(String::new());
        out.push(format!("fn {}() {{", new_name));
        out.push(extracted);
        out.push("}".to_string());

        if let Some(ref backup_dir) = self.backup_dir {
            backup_file(&expanded, backup_dir);
        }
        let new_content = format!("{}\n", out.join("\n"));
        match std::fs::write(&expanded, new_content) {
            Ok(()) => Ok(ToolResult::new(format!("Extracted lines {}..={} into '{}' in {}", start, end, new_name, path_str))),
            Err(e) => Ok(ToolResult::error(format!("Error writing file: {}", e))),
        }
    }
}

pub struct MarkResolvedTool {
    allowed_roots: Option<Vec<PathBuf>>,
    backup_dir: Option<PathBuf>,
}

impl MarkResolvedTool {
    pub fn new(allowed_roots: Option<Vec<PathBuf>>, backup_dir: Option<PathBuf>) -> Self {
        Self { allowed_roots, backup_dir }
    }
}

#[async_trait]
impl Tool for MarkResolvedTool {
    fn name(&self) -> &'static str {
        "mark_resolved"
    }

    fn description(&self) -> &'static str {
        "Find a line containing a marker (e.g. a TODO or conflict marker) and replace it with a resolution note, or remove it if no resolution is given."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path to edit" },
                "marker": { "type": "string", "description": "Substring identifying the line to resolve" },
                "resolution": { "type": "string", "description": "Replacement text for the line; omit to delete the line" }
            },
            "required": ["path", "marker"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = params["path"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;
        let marker = params["marker"].as_str().ok_or_else(|| anyhow::anyhow!("Missing 'marker' parameter"))?;
        let resolution = params["resolution"].as_str();

        let expanded = match resolve_path(path_str, self.allowed_roots.as_ref()) {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        if !expanded.exists() {
            return Ok(ToolResult::error(format!("Error: File not found: {}", path_str)));
        }
        let content = match std::fs::read_to_string(&expanded) {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(format!("Error reading file: {}", e))),
        };
        let lines: Vec<&str> = content.lines().collect();
        let matches: Vec<usize> = lines.iter().enumerate().filter(|(_, l)| l.contains(marker)).map(|(i, _)| i).collect();
        if matches.is_empty() {
            return Ok(ToolResult::error(format!("Error: marker '{}' not found in file", marker)));
        }
        if matches.len() > 1 {
            return Ok(ToolResult::error(format!(
                "Error: marker '{}' matches {} lines, must be unique",
                marker,
                matches.len()
            )));
        }
        let idx = matches[0];

        let mut new_lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        match resolution {
            Some(text) => new_lines[idx] = text.to_string(),
            None => {
                new_lines.remove(idx);
            }
        }

        if let Some(ref backup_dir) = self.backup_dir {
            backup_file(&expanded, backup_dir);
        }
        let new_content = if new_lines.is_empty() { String::new() } else { format!("{}\n", new_lines.join("\n")) };
        match std::fs::write(&expanded, new_content) {
            Ok(()) => Ok(ToolResult::new(format!("Marked '{}' resolved in {}", marker, path_str))),
            Err(e) => Ok(ToolResult::error(format!("Error writing file: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests;
