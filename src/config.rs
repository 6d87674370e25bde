// config.rs — 配置管理模块
// 遵循 Unix 风格：优先从 ~/.config/spotlight-dl/config.toml 读取配置
// 优先级：命令行参数 > 环境变量 > 配置文件 > 内置默认值

use crate::error::ConfigError;
use crate::poll::{IDLE_DELAY, MAX_EMPTY_ROUNDS, PollSettings};
use crate::source::spotlight::Market;
use schemars::JsonSchema; // 引入用于生成 JSON Schema 的 trait
use serde::{Deserialize, Serialize}; // 引入序列化与反序列化 trait
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 输出目录的环境变量
pub const ENV_OUTDIR: &str = "SPOTLIGHT_OUTDIR";
/// 接口地区设置的环境变量
pub const ENV_LOCALE: &str = "SPOTLIGHT_LOCALE";

const DEFAULT_LOCALE: &str = "en-US";
const DEFAULT_COUNTRY: &str = "US";

/// 展开路径中的 ~ 和环境变量 ($HOME, ${XDG_PICTURES_DIR} 等)
/// 展开失败（变量不存在）时按原样使用
fn expand_path(path_str: &str) -> PathBuf {
    let expanded = shellexpand::full(path_str)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path_str.to_string());
    PathBuf::from(expanded)
}

/// 映射 config.toml 文件内容的嵌套结构体
#[derive(Debug, Deserialize, Serialize, Default, JsonSchema)]
struct ConfigFile {
    #[serde(default)]
    common: CommonConfig,
    #[serde(default)]
    poll: PollConfig,
}

#[derive(Debug, Deserialize, Serialize, Default, JsonSchema)]
struct CommonConfig {
    /// 壁纸保存目录 (支持 ~、$HOME 等环境变量)，不配置则为当前目录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_dir: Option<String>,
    /// 接口地区设置，如 "en-US"；不配置则从 $LANG 推导
    #[serde(default, skip_serializing_if = "Option::is_none")]
    locale: Option<String>,
    /// 是否输出跳过、失败和汇总信息
    #[serde(default)]
    verbose: bool,
}

/// 轮询参数
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct PollConfig {
    /// 连续多少轮没有新图片后停止
    #[serde(default = "default_max_empty_rounds")]
    pub max_empty_rounds: u32,
    /// 空轮次之后等待的毫秒数
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_empty_rounds: default_max_empty_rounds(),
            idle_delay_ms: default_idle_delay_ms(),
        }
    }
}

fn default_max_empty_rounds() -> u32 {
    MAX_EMPTY_ROUNDS
}
fn default_idle_delay_ms() -> u64 {
    IDLE_DELAY.as_millis() as u64
}

/// 应用全局配置项（已合并环境变量与配置文件）
pub struct AppConfig {
    /// 壁纸保存目录
    pub output_dir: PathBuf,
    /// 显式指定的接口地区设置
    pub locale: Option<String>,
    pub verbose: bool,
    pub poll: PollConfig,
    /// 配置文件所在路径
    pub config_path: PathBuf,
    /// 文件中的原始内容，保存时只写回它，不会把环境变量写进文件
    file: ConfigFile,
}

impl AppConfig {
    /// 从默认位置和当前进程环境变量初始化配置
    pub fn new() -> Self {
        // $HOME 不存在时退回当前目录
        let home = env::var("HOME").map(PathBuf::from).unwrap_or_default();
        let config_path = home.join(".config").join("spotlight-dl").join("config.toml");
        Self::load_from(config_path, |key| env::var(key).ok())
    }

    /// 从指定配置文件加载，`lookup` 用于读取环境变量
    pub fn load_from(config_path: PathBuf, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let file = Self::load_config_from_file(&config_path).unwrap_or_default();

        let output_dir = lookup(ENV_OUTDIR)
            .filter(|s| !s.is_empty())
            .or_else(|| file.common.output_dir.clone())
            .map(|s| expand_path(&s))
            .unwrap_or_else(|| PathBuf::from("."));

        let locale = lookup(ENV_LOCALE)
            .filter(|s| !s.is_empty())
            .or_else(|| file.common.locale.clone());

        Self {
            output_dir,
            locale,
            verbose: file.common.verbose,
            poll: file.poll.clone(),
            config_path,
            file,
        }
    }

    /// 辅助函数：解析 TOML 配置文件，缺失或格式错误时返回 None
    fn load_config_from_file(path: &Path) -> Option<ConfigFile> {
        let content = fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config file");
                None
            }
        }
    }

    /// 命令行参数覆盖配置
    pub fn apply_cli(&mut self, output_dir: Option<&str>, locale: Option<&str>, verbose: bool) {
        if let Some(dir) = output_dir {
            self.output_dir = expand_path(dir);
        }
        if let Some(locale) = locale {
            self.locale = Some(locale.to_string());
        }
        self.verbose |= verbose;
    }

    /// 确保输出目录存在
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.output_dir)
    }

    /// 轮询循环使用的参数
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            max_empty_rounds: self.poll.max_empty_rounds,
            idle_delay: Duration::from_millis(self.poll.idle_delay_ms),
            verbose: self.verbose,
        }
    }

    /// 修改一个配置项（只改内存，调用 `save` 写回）
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "outdir" | "output_dir" => {
                self.file.common.output_dir = Some(value.to_string());
                self.output_dir = expand_path(value);
            }
            "locale" => {
                self.file.common.locale = Some(value.to_string());
                self.locale = Some(value.to_string());
            }
            "verbose" => {
                let verbose: bool = value.parse().map_err(|_| invalid())?;
                self.file.common.verbose = verbose;
                self.verbose = verbose;
            }
            "max_empty_rounds" => {
                let rounds: u32 = value.parse().map_err(|_| invalid())?;
                if rounds == 0 {
                    return Err(invalid());
                }
                self.file.poll.max_empty_rounds = rounds;
                self.poll.max_empty_rounds = rounds;
            }
            "idle_delay_ms" => {
                let delay: u64 = value.parse().map_err(|_| invalid())?;
                self.file.poll.idle_delay_ms = delay;
                self.poll.idle_delay_ms = delay;
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// 将配置保存回文件
    pub fn save(&self) -> std::io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(&self.file).map_err(std::io::Error::other)?;
        fs::write(&self.config_path, toml_str)
    }

    /// 获取配置文件的 JSON Schema
    pub fn get_schema() -> Result<String, serde_json::Error> {
        let schema = schemars::schema_for!(ConfigFile);
        serde_json::to_string_pretty(&schema)
    }

    /// 将配置文件内容转换为 TOML 字符串
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(&self.file)
            .unwrap_or_else(|_| "# Error serializing config".to_string())
    }
}

/// 解析接口使用的 locale 和 country
///
/// - `explicit` 形如 "en-GB" 时直接使用，country 取后半段大写
/// - 否则从 `lang_env`（即 $LANG，如 "en_US.UTF-8"）推导
/// - 都不可用时为 en-US / US
pub fn resolve_market(explicit: Option<&str>, lang_env: Option<&str>) -> Market {
    if let Some(requested) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        if let Some(country) = region_of(requested) {
            return Market {
                locale: requested.to_string(),
                country,
            };
        }
        tracing::debug!(locale = requested, "ignoring locale without region");
    }

    // en_US.UTF-8 -> en-US，de_DE@euro -> de-DE
    let lang = lang_env
        .unwrap_or_default()
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .replace('_', "-");

    if lang.is_empty() || lang == "C" || lang == "POSIX" {
        return Market {
            locale: DEFAULT_LOCALE.to_string(),
            country: DEFAULT_COUNTRY.to_string(),
        };
    }

    let country = region_of(&lang).unwrap_or_else(|| DEFAULT_COUNTRY.to_string());
    Market {
        locale: lang,
        country,
    }
}

/// "en-GB" -> Some("GB")；不是 语言-地区 两段格式时返回 None
fn region_of(locale: &str) -> Option<String> {
    let parts: Vec<&str> = locale.split('-').collect();
    match parts.as_slice() {
        [lang, region] if !lang.is_empty() && !region.is_empty() => Some(region.to_uppercase()),
        _ => None,
    }
}
