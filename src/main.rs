// main.rs — 程序入口
// 负责初始化异步运行时、日志和多语言支持，解析命令行参数并分发子命令

mod cli; // 声明 cli 模块，对应 src/cli.rs
mod config; // 声明 config 模块，对应 src/config.rs
mod dedup;
mod download;
mod error;
mod poll;
mod source;

// 初始化多语言支持，嵌入 locales 目录下的所有翻译
rust_i18n::i18n!("locales");

use clap::{CommandFactory, Parser}; // 引入 Parser trait 的 parse() 方法; CommandFactory 用于生成补全脚本
use clap_complete::generate; // 引入补全脚本生成函数
use cli::{Cli, Commands, ConfigAction}; // 引入 CLI 结构体和子命令枚举
use config::AppConfig; // 引入应用配置
use poll::PollLoop;
use rust_i18n::t; // 引入翻译宏
use source::spotlight::{Market, SpotlightClient};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// `#[tokio::main]` 宏将 async main 转换为同步 main + tokio 运行时
#[tokio::main]
async fn main() -> ExitCode {
    // 自动检测系统语言并设置界面语言
    let lang = std::env::var("LANG").unwrap_or_else(|_| "en".to_string());
    if lang.starts_with("zh") {
        rust_i18n::set_locale("zh-CN");
    } else {
        rust_i18n::set_locale("en");
    }

    // 解析命令行参数
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // 致命错误打印到标准错误并以非零状态退出
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// 诊断日志写到标准错误，标准输出只留给下载结果
/// RUST_LOG 存在时以它为准
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "spotlight_dl=debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    // 创建应用配置（读取配置文件和环境变量）
    let mut config = AppConfig::new();

    // 根据子命令分发执行逻辑
    match &cli.command {
        Commands::Fetch { outdir, locale } => {
            config.apply_cli(outdir.as_deref(), locale.as_deref(), cli.verbose);
            handle_fetch(&config).await?;
        }

        Commands::Clean { outdir } => {
            config.apply_cli(outdir.as_deref(), None, cli.verbose);
            handle_clean(&config)?;
        }

        Commands::Config { action } => {
            handle_config(&mut config, action)?;
        }

        Commands::Completions { shell } => {
            generate(
                *shell,
                &mut Cli::command(),
                "spotlight-dl",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// 处理 fetch 子命令：轮询接口并下载新壁纸
async fn handle_fetch(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    // 输出目录创建失败是致命错误，必须在进入循环前处理
    config.ensure_dirs().map_err(|e| {
        t!("error_create_dir", path => config.output_dir.display(), reason => e)
    })?;

    let lang = std::env::var("LANG").ok();
    let market = config::resolve_market(config.locale.as_deref(), lang.as_deref());
    tracing::debug!(
        locale = %market.locale,
        country = %market.country,
        output_dir = %config.output_dir.display(),
        "starting"
    );

    let client = SpotlightClient::new(market)?;
    PollLoop::new(&client, config.output_dir.clone(), config.poll_settings())
        .run()
        .await?;
    Ok(())
}

/// 处理 clean 子命令：清理输出目录中残留的 .part 文件
fn handle_clean(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let dir = &config.output_dir;
    if !dir.is_dir() {
        println!("{}", t!("clean_done", count => 0));
        return Ok(());
    }

    println!("{}", t!("cleaning_dir", path => dir.display()));
    let removed = download::remove_stale_parts(dir)?;
    for path in &removed {
        if let Some(name) = path.file_name() {
            println!("  {} {}", t!("deleted"), name.to_string_lossy());
        }
    }

    println!("{}", t!("clean_done", count => removed.len()));
    Ok(())
}

/// `config show` 中的地区设置行
///
/// t! 的 `locale` 参数用于选择界面语言，不能当作占位符
fn market_line(market: &Market) -> String {
    t!(
        "config_locale",
        market_locale => market.locale,
        country => market.country
    )
    .into_owned()
}

/// 处理 config 子命令：查看或修改配置
fn handle_config(
    config: &mut AppConfig,
    action: &ConfigAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let lang = std::env::var("LANG").ok();
            let market = config::resolve_market(config.locale.as_deref(), lang.as_deref());
            println!("{}", t!("config_title"));
            println!(
                "{}",
                t!("config_path", path => config.config_path.display())
            );
            println!(
                "{}",
                t!("config_output_dir", path => config.output_dir.display())
            );
            println!("{}", market_line(&market));
            println!("{}", t!("config_verbose", value => config.verbose));
            println!(
                "{}",
                t!(
                    "config_poll",
                    rounds => config.poll.max_empty_rounds,
                    delay => config.poll.idle_delay_ms
                )
            );
        }
        ConfigAction::Schema => {
            println!("{}", AppConfig::get_schema()?);
        }
        ConfigAction::Dump => {
            println!("{}", config.to_toml());
        }
        ConfigAction::Set { key, value } => {
            config.set(key, value)?;
            config.save()?;
            println!("{}", t!("config_updated", key => key, value => value));
        }
    }
    Ok(())
}
