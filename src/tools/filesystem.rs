//! 受限文件系统工具
//!
//! SafeFs 绑定 root_dir，所有路径经 resolve 校验必须在 root 下（禁止 ../ 逃逸）；
//! FileOperationTool 基于 SafeFs 提供 read / write / list / delete / exists。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::schema::{ParamType, ToolParameter};
use crate::tools::Tool;

const OPERATIONS: [&str; 5] = ["read", "write", "list", "delete", "exists"];

/// 受限文件系统：绑定根目录，resolve 校验路径在根下
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 解析路径：相对路径拼到根下，绝对路径必须以根开头；任何 `..` 分量都视为逃逸。
    /// 目标不必已存在（write 需要）。
    pub fn resolve(&self, path: &str) -> Result<PathBuf, String> {
        let path = path.trim();
        if path.is_empty() {
            return Err("Empty path".to_string());
        }
        let candidate = Path::new(path);
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(format!("Path escape attempt: {}", path)); // 如 ../../etc/passwd
        }
        let full = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root_dir.join(candidate)
        };
        if full.starts_with(&self.root_dir) {
            Ok(full)
        } else {
            Err(format!("Path escape attempt: {}", path))
        }
    }

    pub fn read_file(&self, path: &str) -> Result<String, String> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved).map_err(|e| format!("Read failed: {}", e))
    }

    pub fn write_file(&self, path: &str, content: &str) -> Result<PathBuf, String> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent).map_err(|e| format!("Create dir failed: {}", e))?;
        }
        std::fs::write(&resolved, content).map_err(|e| format!("Write failed: {}", e))?;
        Ok(resolved)
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, String> {
        let base = if path.is_empty() || path == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let mut entries = Vec::new();
        for e in std::fs::read_dir(&base).map_err(|e| format!("List failed: {}", e))? {
            let e = e.map_err(|e| e.to_string())?;
            let name = e.file_name().to_string_lossy().to_string();
            let ty = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                "/"
            } else {
                ""
            };
            entries.push(format!("{}{}", name, ty));
        }
        entries.sort();
        Ok(entries)
    }
}

/// 文件操作工具
pub struct FileOperationTool {
    fs: SafeFs,
}

impl FileOperationTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for FileOperationTool {
    fn name(&self) -> &str {
        "file_operation"
    }

    fn description(&self) -> &str {
        "Read, write, list, or delete files. Operations: read, write, list, delete, exists"
    }

    fn category(&self) -> &str {
        "file_system"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required(
                "operation",
                ParamType::String,
                "Operation: read, write, list, delete, exists",
            ),
            ToolParameter::required("path", ParamType::String, "File or directory path"),
            ToolParameter::optional(
                "content",
                ParamType::String,
                "Content to write (for write operation)",
            ),
        ]
    }

    fn validate(&self, args: &Value) -> bool {
        let Some(op) = args.get("operation").and_then(|v| v.as_str()) else {
            return false;
        };
        if !OPERATIONS.contains(&op) {
            return false;
        }
        let Some(path) = args.get("path").and_then(|v| v.as_str()) else {
            return false;
        };
        if op == "write"
            && args
                .get("content")
                .and_then(|v| v.as_str())
                .map(|c| c.is_empty())
                .unwrap_or(true)
        {
            return false;
        }
        self.fs.resolve(path).is_ok()
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let op = args
            .get("operation")
            .and_then(|v| v.as_str())
            .ok_or("missing operation")?;
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
        tracing::info!(operation = %op, path = %path, "file_operation tool execute");

        match op {
            "read" => self.fs.read_file(path).map(Value::String),
            "write" => {
                let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");
                self.fs.write_file(path, content)?;
                Ok(Value::String(format!("File written successfully: {}", path)))
            }
            "list" => {
                let resolved = self.fs.resolve(path)?;
                if !resolved.is_dir() {
                    return Ok(Value::String("Path is not a directory".to_string()));
                }
                let files = self.fs.list_dir(path)?;
                Ok(json!({ "count": files.len(), "files": files }))
            }
            "delete" => {
                let resolved = self.fs.resolve(path)?;
                if !resolved.exists() {
                    return Ok(Value::String("File does not exist".to_string()));
                }
                std::fs::remove_file(&resolved).map_err(|e| format!("Delete failed: {}", e))?;
                Ok(Value::String(format!("File deleted: {}", path)))
            }
            "exists" => {
                let resolved = self.fs.resolve(path)?;
                Ok(json!({ "exists": resolved.exists(), "path": path }))
            }
            other => Err(format!("Unsupported operation: {}", other)),
        }
    }
}
