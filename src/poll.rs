// poll.rs — 轮询循环
// 反复拉取接口、过滤已见过/已存在的图片、下载新图片，
// 连续若干轮没有新图片时认为本次可用的图片池已经取尽，正常退出

use crate::dedup::SeenSet;
use crate::error::FetchError;
use crate::source::{ImageDescriptor, WallpaperSource};
use rust_i18n::t;
use std::path::PathBuf;
use std::time::Duration;

/// 连续空轮次上限
pub const MAX_EMPTY_ROUNDS: u32 = 50;

/// 空轮次之后的等待时间
pub const IDLE_DELAY: Duration = Duration::from_millis(500);

/// 每轮结束后的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// 本轮有新图片，立即开始下一轮
    Continue,
    /// 本轮没有新图片，等待后再拉取
    SleepThenContinue,
    /// 连续空轮次达到上限
    Stop,
}

/// 根据本轮新下载数量决定下一步动作，同时返回更新后的连续空轮次计数
pub fn next_action(new_in_round: usize, consecutive_empty: u32, ceiling: u32) -> (NextAction, u32) {
    if new_in_round > 0 {
        return (NextAction::Continue, 0);
    }
    let empty = consecutive_empty.saturating_add(1);
    if empty >= ceiling {
        (NextAction::Stop, empty)
    } else {
        (NextAction::SleepThenContinue, empty)
    }
}

/// 轮询参数
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub max_empty_rounds: u32,
    pub idle_delay: Duration,
    /// 是否输出跳过、失败和汇总信息
    pub verbose: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_empty_rounds: MAX_EMPTY_ROUNDS,
            idle_delay: IDLE_DELAY,
            verbose: false,
        }
    }
}

/// 正常结束时的结果
#[derive(Debug, Default)]
pub struct PollSummary {
    /// 本次新下载的文件，按下载顺序
    pub downloaded: Vec<PathBuf>,
    /// 总共拉取了多少轮
    pub rounds: u32,
}

/// 轮询循环的全部状态
///
/// 已见集合和计数器都归循环自己所有，每次运行新建一个。
pub struct PollLoop<'a, S> {
    source: &'a S,
    output_dir: PathBuf,
    settings: PollSettings,
    seen: SeenSet,
    consecutive_empty: u32,
    summary: PollSummary,
}

impl<'a, S: WallpaperSource> PollLoop<'a, S> {
    pub fn new(source: &'a S, output_dir: impl Into<PathBuf>, settings: PollSettings) -> Self {
        Self {
            source,
            output_dir: output_dir.into(),
            settings,
            seen: SeenSet::new(),
            consecutive_empty: 0,
            summary: PollSummary::default(),
        }
    }

    /// 运行直到连续空轮次达到上限
    ///
    /// 任何一次接口拉取失败都会原样返回，调用方据此终止进程；
    /// 单张图片下载失败只记录，不影响循环。
    pub async fn run(mut self) -> Result<PollSummary, FetchError> {
        loop {
            let new_in_round = self.round().await?;
            let (action, empty) = next_action(
                new_in_round,
                self.consecutive_empty,
                self.settings.max_empty_rounds,
            );
            self.consecutive_empty = empty;
            tracing::debug!(
                round = self.summary.rounds,
                new_in_round,
                consecutive_empty = empty,
                ?action,
                "round finished"
            );

            match action {
                NextAction::Continue => {}
                NextAction::SleepThenContinue => tokio::time::sleep(self.settings.idle_delay).await,
                NextAction::Stop => break,
            }
        }

        if self.settings.verbose {
            println!("{}", t!("done_summary", count => self.summary.downloaded.len()));
        }
        Ok(self.summary)
    }

    /// 执行一轮：拉取一次，处理返回的每张图片，返回成功下载的数量
    async fn round(&mut self) -> Result<usize, FetchError> {
        self.summary.rounds += 1;
        let images = self.source.fetch_batch().await?;

        let mut new_in_round = 0;
        for image in &images {
            if self.process(image).await {
                new_in_round += 1;
            }
        }
        Ok(new_in_round)
    }

    /// 处理单张图片，成功下载时返回 true
    async fn process(&mut self, image: &ImageDescriptor) -> bool {
        if !self.seen.insert(&image.url) {
            return false;
        }
        if image.file_name.is_empty() {
            tracing::debug!(url = %image.url, "no usable file name");
            return false;
        }

        let dest = self.output_dir.join(&image.file_name);
        match tokio::fs::try_exists(&dest).await {
            Ok(false) => {}
            Ok(true) => {
                if self.settings.verbose {
                    println!("{}", t!("skip_existing", path => dest.display()));
                }
                return false;
            }
            // 无法确认目标是否存在（权限、路径中有普通文件等），不冒险覆盖
            Err(e) => {
                tracing::debug!(path = %dest.display(), error = %e, "cannot stat destination");
                return false;
            }
        }

        match self.source.download(image, &dest).await {
            Ok(bytes) => {
                tracing::info!(
                    path = %dest.display(),
                    bytes,
                    title = %image.title,
                    copyright = %image.copyright,
                    "saved"
                );
                // 成功信号：每行一个路径，不翻译，便于脚本处理
                println!("{}", dest.display());
                self.summary.downloaded.push(dest);
                true
            }
            Err(e) => {
                tracing::debug!(url = %image.url, error = %e, "download failed");
                if self.settings.verbose {
                    println!("{}", t!("download_failed", url => image.url, reason => e));
                }
                false
            }
        }
    }
}
