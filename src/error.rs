// error.rs — 错误类型定义
// 区分两类失败：元数据拉取失败（整个运行终止）与单张图片下载失败（跳过继续）

use thiserror::Error;

/// Spotlight 接口拉取错误
///
/// 轮询循环遇到任何一种都会终止整个运行。
#[derive(Debug, Error)]
pub enum FetchError {
    /// 连接失败、超时等网络层错误
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// 接口返回了非 200 状态码
    #[error("http {0}")]
    Status(u16),

    /// 外层 JSON 结构无法解析（接口契约已变化）
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// 单张图片下载错误
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("http {0}")]
    Status(u16),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// 写入的字节数与服务器声明的 Content-Length 不一致
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
}

/// `config set` 的错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
