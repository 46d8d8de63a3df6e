/// # Backup CLI 日志系统使用说明
///
/// - 库代码 (`backup-core`) 只使用 `tracing` 宏记录日志
/// - 在 `main.rs` 中调用 `setup_logging()` 决定日志输出位置和格式
///
/// ## 日志配置选项
///
/// - `-v, --verbose`：启用详细日志模式（DEBUG 级别）
/// - `RUST_LOG`：标准的日志级别控制，优先于 `-v`
/// - `BACKUP_LOG_FILE`：日志文件路径，设置后日志输出到文件而非终端
///
/// ```bash
/// # 日志输出到文件
/// BACKUP_LOG_FILE=backup.log backup-cli create full
///
/// # 只看编排器的调试日志
/// RUST_LOG=backup_core::orchestrator=debug backup-cli restore 3
/// ```
///
/// 终端输出不显示时间和模块路径，文件输出包含完整模块路径、线程名和行号。
pub fn setup_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let log_file = std::env::var("BACKUP_LOG_FILE").ok().and_then(|path| {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("无法打开日志文件 {path}: {e}，改为输出到终端");
                None
            }
        }
    });

    if let Some(file) = log_file {
        // 输出到文件 - 使用详细格式便于调试
        fmt()
            .with_env_filter(env_filter)
            .with_writer(file)
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(true)
            .init();
    } else {
        // 输出到终端 - 使用简洁格式
        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false)
            .without_time()
            .compact()
            .init();
    }
}

/// 格式化文件大小
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.1}GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.1}MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.1}KB", size as f64 / KB as f64)
    } else {
        format!("{size}B")
    }
}

/// 询问用户确认，只有输入 y 才返回 true
pub fn confirm(prompt: &str) -> std::io::Result<bool> {
    use std::io::Write;

    print!("{prompt} (y/N): ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(2048), "2.0KB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.5MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0GB");
    }
}
