// spotlight.rs — Windows Spotlight 接口异步客户端模块
// 负责与 Spotlight 选图接口交互：拉取一批候选壁纸、解析嵌套 JSON、下载图片
//
// 注意：接口返回的每个 item 本身是一段 JSON 字符串（双重编码），
// 需要先解析外层，再逐个解析内层。

use super::{ImageDescriptor, WallpaperSource};
use crate::dedup::dedupe;
use crate::download;
use crate::error::{DownloadError, FetchError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize; // 反序列化 trait，用于将 JSON 转为 Rust 结构体
use std::path::Path;
use std::time::Duration;

/// 选图接口地址
pub const API_URL: &str = "https://fd.api.iris.microsoft.com/v4/api/selection";

/// Spotlight 桌面壁纸的固定 placement id
pub const PLACEMENT: &str = "88000820";

/// 每次请求希望返回的条目数（接口只当作提示）
pub const BATCH_COUNT: &str = "4";

/// 元数据请求超时
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// 所有请求携带的 User-Agent
pub const USER_AGENT: &str = concat!("spotlight-dl/", env!("CARGO_PKG_VERSION"));

/// URL 最后一段没有扩展名时补上的默认扩展名
const DEFAULT_EXTENSION: &str = ".jpg";

/// 接口请求使用的地区设置，如 locale = "en-US", country = "US"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    pub locale: String,
    pub country: String,
}

/// 接口响应的顶层结构
///
/// 只提取需要的字段，其余字段由 serde 自动忽略。
/// 各层都允许缺失或为 null，此时视为空批次。
#[derive(Deserialize, Debug)]
struct SelectionResponse {
    #[serde(default)]
    batchrsp: Option<BatchResponse>,
}

#[derive(Deserialize, Debug)]
struct BatchResponse {
    #[serde(default)]
    items: Option<Vec<BatchItem>>,
}

#[derive(Deserialize, Debug)]
struct BatchItem {
    /// 内层 JSON 字符串
    #[serde(default)]
    item: Option<String>,
}

/// 内层 JSON：广告信封
#[derive(Deserialize, Debug)]
struct AdEnvelope {
    #[serde(default)]
    ad: Option<Ad>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Ad {
    #[serde(default)]
    icon_hover_text: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    copyright: Option<String>,
    /// 横屏图片；只有竖屏图片的条目这里为空
    #[serde(default)]
    landscape_image: Option<ImageAsset>,
}

#[derive(Deserialize, Debug)]
struct ImageAsset {
    #[serde(default)]
    asset: Option<String>,
}

/// 单个 item 的解析结果
///
/// 单条丢弃不算错误；整批失败由 `parse_batch` 的 `Err` 表示。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedItem {
    Image(ImageDescriptor),
    Dropped(DropReason),
}

/// 条目被丢弃的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// 内层 JSON 无法解析
    MalformedJson,
    /// 没有 ad 对象
    MissingAd,
    /// 没有横屏图片（竖屏专用条目）
    MissingLandscape,
    /// 图片地址为空、相对路径或不是 https
    InsecureAsset,
}

/// 解析单个内层 item 字符串
pub fn parse_item(raw: &str) -> ParsedItem {
    let envelope: AdEnvelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(_) => return ParsedItem::Dropped(DropReason::MalformedJson),
    };
    let Some(ad) = envelope.ad else {
        return ParsedItem::Dropped(DropReason::MissingAd);
    };
    let Some(landscape) = ad.landscape_image else {
        return ParsedItem::Dropped(DropReason::MissingLandscape);
    };

    let asset = landscape.asset.as_deref().unwrap_or_default().trim();
    if asset.is_empty() || !asset.starts_with("https://") {
        return ParsedItem::Dropped(DropReason::InsecureAsset);
    }

    ParsedItem::Image(ImageDescriptor {
        url: asset.to_string(),
        file_name: file_name_from_url(asset),
        title: first_non_empty(ad.icon_hover_text.as_deref(), ad.title.as_deref()),
        copyright: ad.copyright.unwrap_or_default(),
    })
}

/// 解析一次接口响应，返回批内去重后的图片列表
///
/// 外层结构损坏时返回错误；单个 item 的问题只会让该 item 被丢弃。
pub fn parse_batch(body: &[u8]) -> Result<Vec<ImageDescriptor>, serde_json::Error> {
    let response: SelectionResponse = serde_json::from_slice(body)?;
    let items = response
        .batchrsp
        .and_then(|batch| batch.items)
        .unwrap_or_default();

    let images = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let parsed = match item.item.as_deref() {
                Some(raw) => parse_item(raw),
                None => ParsedItem::Dropped(DropReason::MalformedJson),
            };
            match parsed {
                ParsedItem::Image(image) => Some(image),
                ParsedItem::Dropped(reason) => {
                    tracing::debug!(index, ?reason, "dropped batch item");
                    None
                }
            }
        })
        .collect();

    Ok(dedupe(images))
}

/// 从图片 URL 推导落盘文件名
///
/// 取解码后路径的最后一段（忽略末尾的 `/`），没有 `.` 时补默认扩展名；
/// URL 无法解析、路径为空或只剩 `.`/`..` 时返回空字符串。
pub fn file_name_from_url(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return String::new();
    };
    let Ok(decoded) = urlencoding::decode(parsed.path()) else {
        return String::new();
    };
    let base = decoded
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();

    match base {
        "" | "." | ".." => String::new(),
        name if name.contains('.') => name.to_string(),
        name => format!("{name}{DEFAULT_EXTENSION}"),
    }
}

fn first_non_empty(a: Option<&str>, b: Option<&str>) -> String {
    [a, b]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Spotlight 接口异步客户端
///
/// 封装了 reqwest::Client（内部有连接池，应复用）和地区设置。
pub struct SpotlightClient {
    client: reqwest::Client,
    base_url: String,
    market: Market,
}

impl SpotlightClient {
    /// 创建客户端，所有请求统一带上 `USER_AGENT`
    pub fn new(market: Market) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url: String::from(API_URL),
            market,
        })
    }

    /// 替换接口地址（测试时指向本地 mock 服务）
    #[allow(dead_code)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn query(&self) -> [(&str, &str); 5] {
        [
            ("placement", PLACEMENT),
            ("bcnt", BATCH_COUNT),
            ("country", &self.market.country),
            ("locale", &self.market.locale),
            ("fmt", "json"),
        ]
    }
}

#[async_trait]
impl WallpaperSource for SpotlightClient {
    async fn fetch_batch(&self) -> Result<Vec<ImageDescriptor>, FetchError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&self.query())
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let images = parse_batch(&body)?;
        tracing::debug!(count = images.len(), "fetched batch");
        Ok(images)
    }

    async fn download(&self, image: &ImageDescriptor, dest: &Path) -> Result<u64, DownloadError> {
        download::fetch_to_file(&self.client, &image.url, dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// 把若干内层对象编码成接口的双重编码格式
    fn batch(inner: &[Value]) -> Vec<u8> {
        let items: Vec<Value> = inner
            .iter()
            .map(|v| json!({ "item": v.to_string() }))
            .collect();
        json!({ "batchrsp": { "ver": "1.0", "items": items } })
            .to_string()
            .into_bytes()
    }

    fn landscape(asset: &str) -> Value {
        json!({
            "ad": {
                "iconHoverText": "Hover",
                "title": "Title",
                "copyright": "© Someone",
                "landscapeImage": { "asset": asset },
                "portraitImage": { "asset": "https://example.com/portrait.jpg" }
            }
        })
    }

    fn portrait_only() -> Value {
        json!({
            "ad": {
                "title": "Portrait",
                "portraitImage": { "asset": "https://example.com/p.jpg" }
            }
        })
    }

    fn market() -> Market {
        Market {
            locale: "en-GB".to_string(),
            country: "GB".to_string(),
        }
    }

    #[test]
    fn portrait_item_is_dropped_and_query_is_stripped() {
        let body = batch(&[portrait_only(), landscape("https://example.com/img123.jpg?foo=1")]);

        let images = parse_batch(&body).unwrap();

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].file_name, "img123.jpg");
        assert_eq!(images[0].url, "https://example.com/img123.jpg?foo=1");
        assert_eq!(images[0].title, "Hover");
        assert_eq!(images[0].copyright, "© Someone");
    }

    #[test]
    fn malformed_outer_json_fails_the_batch() {
        assert!(parse_batch(b"{\"batchrsp\": [").is_err());
        assert!(parse_batch(b"[1, 2, 3]").is_err());
    }

    #[test]
    fn malformed_inner_item_is_skipped() {
        let body = json!({
            "batchrsp": { "items": [
                { "item": "{not json" },
                { "item": landscape("https://example.com/ok.jpg").to_string() },
                { "other": 1 }
            ] }
        })
        .to_string();

        let images = parse_batch(body.as_bytes()).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].file_name, "ok.jpg");
    }

    #[test]
    fn missing_batch_is_empty() {
        assert!(parse_batch(b"{}").unwrap().is_empty());
        assert!(parse_batch(b"{\"batchrsp\": null}").unwrap().is_empty());
        assert!(parse_batch(b"{\"batchrsp\": {}}").unwrap().is_empty());
    }

    #[test]
    fn drop_reasons() {
        assert_eq!(
            parse_item("nope"),
            ParsedItem::Dropped(DropReason::MalformedJson)
        );
        assert_eq!(
            parse_item(r#"{"ad": null}"#),
            ParsedItem::Dropped(DropReason::MissingAd)
        );
        assert_eq!(
            parse_item(&portrait_only().to_string()),
            ParsedItem::Dropped(DropReason::MissingLandscape)
        );
        for asset in ["", "   ", "/relative/x.jpg", "http://example.com/x.jpg"] {
            assert_eq!(
                parse_item(&landscape(asset).to_string()),
                ParsedItem::Dropped(DropReason::InsecureAsset),
                "asset {asset:?}"
            );
        }
    }

    #[test]
    fn every_parsed_url_is_https() {
        let body = batch(&[
            landscape("http://example.com/a.jpg"),
            landscape("  https://example.com/b.jpg  "),
            landscape(""),
            portrait_only(),
            landscape("ftp://example.com/c.jpg"),
            landscape("https://example.com/d"),
        ]);

        let images = parse_batch(&body).unwrap();

        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|im| im.url.starts_with("https://")));
        assert_eq!(images[0].url, "https://example.com/b.jpg");
        assert_eq!(images[1].file_name, "d.jpg");
    }

    #[test]
    fn duplicates_within_batch_are_removed() {
        let body = batch(&[
            landscape("https://example.com/a.jpg"),
            landscape("https://example.com/b.jpg"),
            landscape("https://example.com/a.jpg"),
        ]);

        let urls: Vec<String> = parse_batch(&body)
            .unwrap()
            .into_iter()
            .map(|im| im.url)
            .collect();
        assert_eq!(urls, ["https://example.com/a.jpg", "https://example.com/b.jpg"]);
    }

    #[test]
    fn title_falls_back_to_title_field() {
        let inner = json!({
            "ad": {
                "iconHoverText": "   ",
                "title": "  Lake  ",
                "landscapeImage": { "asset": "https://example.com/x.jpg" }
            }
        });

        let ParsedItem::Image(image) = parse_item(&inner.to_string()) else {
            panic!("expected image");
        };
        assert_eq!(image.title, "Lake");
        assert_eq!(image.copyright, "");
    }

    #[test]
    fn file_names() {
        assert_eq!(file_name_from_url("https://a.com/x/img123.jpg?foo=1"), "img123.jpg");
        assert_eq!(file_name_from_url("https://a.com/x/abcdef"), "abcdef.jpg");
        assert_eq!(file_name_from_url("https://a.com/x/pic.png#frag"), "pic.png");
        assert_eq!(file_name_from_url("https://a.com/x/my%20pic.jpg"), "my pic.jpg");
        assert_eq!(file_name_from_url("https://a.com/x/img/"), "img.jpg");
        assert_eq!(file_name_from_url("https://a.com/x/a%2Fb.jpg"), "b.jpg");
        assert_eq!(file_name_from_url("https://a.com/x/%2E%2E"), "");
        assert_eq!(file_name_from_url("https://a.com/x/%FF"), "");
        assert_eq!(file_name_from_url("https://a.com/"), "");
        assert_eq!(file_name_from_url("https://a.com"), "");
        assert_eq!(file_name_from_url("not a url"), "");
    }

    #[tokio::test]
    async fn fetch_batch_sends_expected_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/api/selection"))
            .and(query_param("placement", PLACEMENT))
            .and(query_param("bcnt", BATCH_COUNT))
            .and(query_param("country", "GB"))
            .and(query_param("locale", "en-GB"))
            .and(query_param("fmt", "json"))
            .and(header("user-agent", USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(batch(&[landscape("https://example.com/a.jpg")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = SpotlightClient::new(market())
            .unwrap()
            .with_base_url(format!("{}/v4/api/selection", server.uri()));

        let images = client.fetch_batch().await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].file_name, "a.jpg");
    }

    #[tokio::test]
    async fn fetch_batch_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = SpotlightClient::new(market()).unwrap().with_base_url(server.uri());

        let err = client.fetch_batch().await.unwrap_err();
        assert!(matches!(err, FetchError::Status(503)));
    }

    #[tokio::test]
    async fn fetch_batch_reports_decode_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let client = SpotlightClient::new(market()).unwrap().with_base_url(server.uri());

        let err = client.fetch_batch().await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn fetch_batch_reports_transport_failure() {
        let client = SpotlightClient::new(market())
            .unwrap()
            .with_base_url("http://127.0.0.1:1/selection");

        let err = client.fetch_batch().await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
