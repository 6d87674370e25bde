// source/mod.rs — 壁纸源抽象接口模块
// 定义轮询循环依赖的通用 Trait，以及统一的图片描述结构

pub mod spotlight;

use crate::error::{DownloadError, FetchError};
use async_trait::async_trait; // 异步 Trait 支持宏
use std::path::Path;

/// 统一的图片元数据结构
///
/// 两个 `url` 相同的描述被视为同一张图片，其余字段不参与比较。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// 图片原图的 https 地址，同时作为去重的键
    pub url: String,
    /// 落盘文件名（URL 最后一段路径，无扩展名时补 .jpg）
    /// 无法从 URL 推导时为空字符串
    pub file_name: String,
    /// 标题（悬停文字优先）
    pub title: String,
    /// 版权信息，原样保留
    pub copyright: String,
}

/// 壁纸源的抽象 Trait
///
/// `SpotlightClient` 是唯一的线上实现；测试中用桩实现替换，
/// 使轮询循环可以脱离网络验证。
#[async_trait]
pub trait WallpaperSource {
    /// 拉取一批候选图片（已做批内去重）
    async fn fetch_batch(&self) -> Result<Vec<ImageDescriptor>, FetchError>;

    /// 下载单张图片到 `dest`，返回写入的字节数
    async fn download(&self, image: &ImageDescriptor, dest: &Path) -> Result<u64, DownloadError>;
}
