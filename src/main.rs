use anyhow::Result;
use medical_batch_analysis::utils::logging;
use medical_batch_analysis::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config_file = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load(&config_file)?;

    // 初始化日志
    logging::init(&config.log_file)?;

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
