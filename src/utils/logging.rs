use anyhow::{Context, Result};
/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::models::{Dataset, RunSummary};

/// 初始化日志
///
/// 同时输出到终端和日志文件（追加写入）。级别由 `RUST_LOG` 控制，默认 `info`。
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init(log_file_path: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .with_context(|| format!("无法打开日志文件: {}", log_file_path))?;

    let log_header = format!(
        "{}\n病例分析日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    file.write_all(log_header.as_bytes())?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = fmt::layer().with_target(false);
    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("日志系统初始化失败")?;

    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    if config.render_only {
        info!("🚀 程序启动 - 仅生成提示词模式");
    } else {
        info!("🚀 程序启动 - 病例批量分析模式");
        info!("🤖 模型: {}", config.llm_model_name);
        info!("📊 最大并发数: {}", config.max_concurrent_cases);
    }
    info!("📁 输入文件: {}", config.input_path);
    info!("{}", "=".repeat(60));
}

/// 记录数据集加载信息
///
/// # 参数
/// - `dataset`: 已加载的病例表
/// - `missing`: 模板中有、表头中没有的占位符
pub fn log_cases_loaded(dataset: &Dataset, missing: &[String]) {
    info!("✓ 成功读取 {} 个病例", dataset.len());
    info!("📋 列名: {}", dataset.columns.join(", "));

    if let Some(first) = dataset.cases.first() {
        let preview: Vec<String> = dataset
            .columns
            .iter()
            .take(5)
            .map(|c| format!("{}={}", c, truncate_text(first.field(c).unwrap_or(""), 20)))
            .collect();
        info!("👀 首行预览: {}", preview.join(" | "));
    }

    if !missing.is_empty() {
        tracing::warn!("⚠️ 以下占位符在表中没有对应列，将使用占位值: {}", missing.join(", "));
    }
}

/// 打印最终统计信息
///
/// # 参数
/// - `summary`: 运行统计
/// - `output_path`: 实际写入的结果文件
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(summary: &RunSummary, output_path: &str, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", summary.success, summary.total);
    info!("❌ 失败: {}", summary.failed);
    info!("{}", "=".repeat(60));
    info!("\n结果已保存至: {}", output_path);
    info!("日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（按字符计）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("冠状动脉造影结果", 4), "冠状动脉...");
    }
}
