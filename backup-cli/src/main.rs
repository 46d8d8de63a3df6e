use backup_cli::{Cli, CliApp, Commands, run_init, setup_logging};
use backup_core::BackupError;
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let cli = Cli::parse();

    // 设置日志记录
    setup_logging(cli.verbose);

    // `init` 命令是特例，它不需要预先加载配置
    if let Commands::Init { force } = cli.command {
        if let Err(e) = run_init(cli.config.as_deref(), force).await {
            error!("❌ 初始化失败: {}", e);
            std::process::exit(1);
        }
        return;
    }

    // 对于其他所有命令，我们需要加载配置并初始化App
    let app = match CliApp::new_with_config(cli.config.as_deref()).await {
        Ok(app) => app,
        Err(e) => {
            // 检查错误的根本原因是否是ConfigNotFound
            let is_config_not_found = e.chain().any(|cause| {
                matches!(
                    cause.downcast_ref::<BackupError>(),
                    Some(BackupError::ConfigNotFound)
                )
            });

            if is_config_not_found {
                match &cli.config {
                    Some(path) => error!("❌ 配置文件 '{}' 未找到。", path.display()),
                    None => error!("❌ 当前目录下没有找到配置文件。"),
                }
                error!("👉 请先运行 'backup-cli init' 命令来创建配置文件。");
            } else {
                error!("❌ 应用初始化失败: {:#}", e);
            }
            std::process::exit(1);
        }
    };

    // 运行命令
    if let Err(e) = app.run_command(cli.command).await {
        error!("❌ 操作失败: {}", e);
        std::process::exit(1);
    }
}
