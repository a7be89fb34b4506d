//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FORAGER__*` 覆盖（双下划线表示嵌套，如 `FORAGER__ENGINE__STEP_TIMEOUT_SECS=10`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

/// [app] 段：应用名、历史存储目录、日志级别
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 执行日志与指标的存储目录
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// RUST_LOG 未设置时使用的默认级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/learning")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// [engine] 段：单步截止时间、就绪集合是否并发执行
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// 单步工具调用截止时间（秒），0 表示不限
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default)]
    pub parallel_ready_set: bool,
}

fn default_step_timeout_secs() -> u64 {
    30
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout_secs(),
            parallel_ready_set: false,
        }
    }
}

/// [tools] 段：内置工具开关、文件工具根目录、延迟样本窗口
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_enable_file_operations")]
    pub enable_file_operations: bool,
    /// 文件工具的根目录，未设置时用当前目录
    pub filesystem_root: Option<PathBuf>,
    #[serde(default = "default_max_latency_samples")]
    pub max_latency_samples: usize,
}

fn default_enable_file_operations() -> bool {
    true
}

fn default_max_latency_samples() -> usize {
    100
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            enable_file_operations: default_enable_file_operations(),
            filesystem_root: None,
            max_latency_samples: default_max_latency_samples(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 FORAGER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FORAGER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FORAGER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
