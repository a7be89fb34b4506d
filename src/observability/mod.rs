//! 可观测性

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 以配置给出的级别作为默认过滤；RUST_LOG 存在时优先使用。重复初始化会被忽略。
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
