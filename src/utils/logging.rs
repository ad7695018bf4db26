//! 日志工具模块
//!
//! 提供日志初始化、格式化和输出的辅助函数

use std::fs;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::{AppError, AppResult};

/// 初始化 tracing
///
/// 优先使用 `RUST_LOG`；否则 `verbose` 为 true 时输出 debug 级别
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
/// - `command`: 本次运行的子命令
pub fn init_log_file(log_file_path: &str, command: &str) -> AppResult<()> {
    let log_header = format!(
        "{}\nCFA 模拟考试日志 - {} - {}\n{}\n\n",
        "=".repeat(60),
        command,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header).map_err(|e| AppError::file_write_failed(log_file_path, e))
}

/// 记录程序启动信息
pub fn log_startup(command: &str, model_name: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - {}", command);
    info!("🤖 模型: {}", model_name);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `title`: 统计标题
/// - `success`: 成功数量
/// - `failed`: 失败数量
/// - `total`: 总数
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(title: &str, success: usize, failed: usize, total: usize, log_file_path: &str) {
    info!("{}", "=".repeat(60));
    info!("📊 {}", title);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
    info!("日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
