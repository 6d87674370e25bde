// dedup.rs — 去重
// 两层互相独立：dedupe() 处理单次响应内的重复，SeenSet 处理整个运行期间跨批次的重复

use crate::source::ImageDescriptor;
use std::collections::HashSet;

/// 批内去重：丢弃空 URL 和重复出现的 URL，保留首次出现的顺序
pub fn dedupe(images: Vec<ImageDescriptor>) -> Vec<ImageDescriptor> {
    let mut seen = HashSet::new();
    images
        .into_iter()
        .filter(|im| !im.url.is_empty() && seen.insert(im.url.clone()))
        .collect()
}

/// 运行期内已处理过（下载或跳过）的 URL 集合
///
/// 只增不减，随轮询循环一起创建和销毁。
#[derive(Debug, Default)]
pub struct SeenSet {
    urls: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 首次见到该 URL 时返回 true
    pub fn insert(&mut self, url: &str) -> bool {
        if self.urls.contains(url) {
            return false;
        }
        self.urls.insert(url.to_string())
    }
}
