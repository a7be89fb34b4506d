//! Forager - Rust 任务编排系统
//!
//! 入口：加载配置、初始化日志、构建编排器，依次处理命令行给出的任务（未给出时运行三个示例任务），
//! 最后打印统计信息。

use anyhow::Context;
use forager::config::load_config;
use forager::observability;
use forager::OrchestratorBuilder;

const DEMO_TASKS: [&str; 3] = [
    "Calculate 25 + 37",
    "Analyze the text 'Hello World! This is a test.'",
    "Calculate the square root of 144",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config(None).context("Failed to load config")?;

    // 日志：默认取配置中的级别，可通过 RUST_LOG 覆盖
    observability::init_with_level(&config.app.log_level);

    let orchestrator = OrchestratorBuilder::new(config)
        .build()
        .await
        .context("Failed to build orchestrator")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let tasks: Vec<String> = if args.is_empty() {
        DEMO_TASKS.iter().map(|t| t.to_string()).collect()
    } else {
        args
    };

    for task in &tasks {
        let report = orchestrator
            .process_task(task)
            .await
            .with_context(|| format!("Failed to process task: {}", task))?;
        println!("[{}] {}", serde_json::to_string(&report.status)?.trim_matches('"'), task);
    }

    orchestrator
        .history()
        .flush()
        .await
        .context("Failed to persist execution history")?;

    let stats = orchestrator.statistics().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
