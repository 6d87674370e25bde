// download.rs — 单张图片的原子下载
// 先写入同目录下的 <目标>.part 临时文件，校验大小后再 rename 到目标路径，
// 保证目标路径上永远不会出现写了一半的文件

use crate::error::DownloadError;
use reqwest::StatusCode;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt; // 异步写入 trait，提供 write_all() / flush()

/// 单张图片下载超时
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// 临时文件后缀
pub const PART_SUFFIX: &str = ".part";

/// 由目标路径推导临时文件路径：img.jpg -> img.jpg.part
///
/// 每个目标路径对应唯一的临时文件，并发下载不同目标时不会互相覆盖。
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// 下载中的临时文件
///
/// 在被 `commit` 之前离开作用域（出错、提前返回、任务被取消）时，
/// `Drop` 会删除临时文件。
pub struct PartFile {
    path: PathBuf,
    dest: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl PartFile {
    /// 创建（或截断）目标对应的临时文件
    pub async fn create(dest: &Path) -> io::Result<Self> {
        let path = part_path(dest);
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            dest: dest.to_path_buf(),
            file: Some(file),
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(buf).await,
            None => Err(io::Error::other("part file already closed")),
        }
    }

    /// 关闭文件、校验大小并 rename 到目标路径，返回文件字节数
    ///
    /// `expected` 为 None 时跳过大小校验。
    pub async fn commit(mut self, expected: Option<u64>) -> Result<u64, DownloadError> {
        if let Some(mut file) = self.file.take() {
            // flush 之后再 drop，tokio 才会立即关闭文件句柄
            file.flush().await?;
        }

        let actual = tokio::fs::metadata(&self.path).await?.len();
        if let Some(expected) = expected {
            if actual != expected {
                return Err(DownloadError::SizeMismatch { expected, actual });
            }
        }

        tokio::fs::rename(&self.path, &self.dest).await?;
        self.committed = true;
        Ok(actual)
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.file.take();
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove part file");
            }
        }
    }
}

/// 下载 `url` 并原子地保存到 `dest`，返回写入的字节数
///
/// 目标文件是否已存在由调用方判断，这里不做检查。
pub async fn fetch_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<u64, DownloadError> {
    let mut response = client.get(url).timeout(DOWNLOAD_TIMEOUT).send().await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(DownloadError::Status(status.as_u16()));
    }

    // 服务器没有声明长度（或声明为 0）时只能尽力而为，不做校验
    let expected = response.content_length().filter(|&len| len > 0);

    let mut part = PartFile::create(dest).await?;
    tracing::debug!(url, part = %part.path().display(), ?expected, "downloading");

    // 逐块写入，不把整张图片读进内存
    while let Some(chunk) = response.chunk().await? {
        part.write_all(&chunk).await?;
    }

    part.commit(expected).await
}

/// 删除目录中残留的 .part 文件（进程被强制结束时可能留下），返回被删除的路径
pub fn remove_stale_parts(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_part = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(PART_SUFFIX));
        if is_part && path.is_file() {
            std::fs::remove_file(&path)?;
            removed.push(path);
        }
    }
    removed.sort();
    Ok(removed)
}
