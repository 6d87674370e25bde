// cli.rs — 命令行接口定义模块
// 使用 clap 的 derive 模式定义所有子命令和参数

use clap::{Parser, Subcommand}; // Parser: 解析命令行参数的 trait; Subcommand: 定义子命令的 trait
use clap_complete::Shell; // Shell 枚举：Bash, Zsh, Fish, Elvish, PowerShell

/// Windows 聚焦（Spotlight）壁纸下载工具
///
/// 反复拉取 Spotlight 接口，下载输出目录中还没有的横屏壁纸，
/// 每保存一张就在标准输出打印一行文件路径。
#[derive(Parser)]
#[command(name = "spotlight-dl")]
#[command(version)] // 自动从 Cargo.toml 读取 version 字段
#[command(author)] // 自动从 Cargo.toml 读取 authors 字段
#[command(about = "Windows 聚焦壁纸下载工具 — 反复拉取 Spotlight 接口，保存尚未下载的横屏壁纸")]
pub struct Cli {
    /// 输出跳过、失败和汇总信息，诊断日志提升到 debug 级别
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 下载壁纸，直到连续多轮没有新图片
    ///
    /// 用法示例:
    ///   spotlight-dl fetch
    ///   spotlight-dl fetch -o ~/Pictures/spotlight -l en-GB -v
    Fetch {
        /// 输出目录（不指定则使用配置文件或当前目录）
        #[arg(short, long, value_name = "DIR")]
        outdir: Option<String>,

        /// 接口地区设置，如 en-US（不指定则从 $LANG 推导）
        #[arg(short, long, value_name = "LANG-REGION")]
        locale: Option<String>,
    },

    /// 删除输出目录中残留的 .part 临时文件
    ///
    /// 用法示例:
    ///   spotlight-dl clean -o ~/Pictures/spotlight
    Clean {
        /// 输出目录
        #[arg(short, long, value_name = "DIR")]
        outdir: Option<String>,
    },

    /// 配置管理操作
    ///
    /// 用法示例:
    ///   spotlight-dl config show
    ///   spotlight-dl config set outdir ~/Pictures/spotlight
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// 生成 shell 补全脚本（支持 bash, zsh, fish, elvish, powershell）
    ///
    /// 用法示例：
    ///   spotlight-dl completions zsh > ~/.zsh/completions/_spotlight-dl
    Completions {
        /// 目标 shell 类型
        shell: Shell,
    },
}

/// 配置管理操作
#[derive(Subcommand)]
pub enum ConfigAction {
    /// 查看当前生效的配置
    Show,
    /// 生成配置文件对应的 JSON Schema
    Schema,
    /// 以 TOML 格式打印配置文件内容
    Dump,
    /// 设置配置项 (支持: outdir, locale, verbose, max_empty_rounds, idle_delay_ms)
    Set {
        /// 要设置的键
        key: String,
        /// 要设置的值
        value: String,
    },
}
