use crate::project::{DEFAULT_LANGUAGE, ProjectPaths};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

pub const GENERATOR_CONFIG_FILE: &str = "novelsite.toml";

/// 生成器自身的配置（novelsite.toml，可选）
#[derive(Debug, Default, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_true")]
    pub minify: bool,
    /// 清理输出目录失败时的重试次数
    #[serde(default = "default_delete_retries")]
    pub delete_retries: u32,
    #[serde(default = "default_delete_retry_delay_ms")]
    pub delete_retry_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 优雅退出超时，超时后强制结束进程
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl GeneratorConfig {
    pub fn load(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(GENERATOR_CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("读取 {} 失败：{}", GENERATOR_CONFIG_FILE, e))?;
        let config: GeneratorConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("解析 {} 失败：{}", GENERATOR_CONFIG_FILE, e))?;
        Ok(config)
    }
}

// 默认值函数
fn default_output_dir() -> String { "build".into() }
fn default_true() -> bool { true }
fn default_delete_retries() -> u32 { 3 }
fn default_delete_retry_delay_ms() -> u64 { 500 }
fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8000 }
fn default_log_level() -> String { "info".into() }
fn default_shutdown_timeout_ms() -> u64 { 1000 }
fn default_debounce_ms() -> u64 { 1000 }
fn default_language() -> String { DEFAULT_LANGUAGE.into() }
fn default_threshold_days() -> i64 { 7 }
fn default_rss_items() -> usize { 20 }

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            minify: true,
            delete_retries: default_delete_retries(),
            delete_retry_delay_ms: default_delete_retry_delay_ms(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// 站点配置（site_config.yaml），未声明的字段保留在 extra 中供模板读取
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub site_name: String,
    #[serde(default)]
    pub site_url: String,
    #[serde(default)]
    pub site_description: String,
    #[serde(default)]
    pub languages: SiteLanguages,
    #[serde(default)]
    pub seo: SeoConfig,
    #[serde(default)]
    pub rss: RssConfig,
    #[serde(default)]
    pub new_chapter_tags: NewChapterTags,
    #[serde(default)]
    pub front_page: FrontPageConfig,
    #[serde(default)]
    pub image_optimization: ImageOptimization,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteLanguages {
    #[serde(default = "default_language")]
    pub default: String,
    #[serde(default)]
    pub available: Vec<String>,
}

impl Default for SiteLanguages {
    fn default() -> Self {
        Self {
            default: default_language(),
            available: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SeoConfig {
    #[serde(default)]
    pub allow_indexing: Option<bool>,
    #[serde(default)]
    pub meta_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RssConfig {
    #[serde(default = "default_rss_items")]
    pub max_items: usize,
}

impl Default for RssConfig {
    fn default() -> Self {
        Self {
            max_items: default_rss_items(),
        }
    }
}

/// "新章节"角标设置，站点级与小说级均可配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NewChapterTags {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub threshold_days: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FrontPageConfig {
    #[serde(default)]
    pub story_sort_method: Option<String>,
    #[serde(default)]
    pub featured_order: Vec<String>,
    #[serde(default)]
    pub primary_stories: PrimaryStories,
    #[serde(default)]
    pub title_override: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PrimaryStories {
    #[serde(default)]
    pub limit_enabled: bool,
    #[serde(default)]
    pub max_count: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImageOptimization {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NavigationConfig {
    #[serde(default)]
    pub header: NavSection,
    #[serde(default)]
    pub footer: NavSection,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NavSection {
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default)]
    pub links: Vec<Value>,
}

impl SiteConfig {
    pub fn default_language(&self) -> &str {
        &self.languages.default
    }

    /// 站点声明的全部语言，默认语言总在首位
    pub fn available_languages(&self) -> Vec<String> {
        let mut langs = vec![self.languages.default.clone()];
        for lang in &self.languages.available {
            if !langs.contains(lang) {
                langs.push(lang.clone());
            }
        }
        langs
    }

    /// 站点地址（去掉末尾斜线）
    pub fn base_url(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }

    pub fn allows_indexing(&self) -> bool {
        self.seo.allow_indexing.unwrap_or(true)
    }
}

/// 作者登记表（authors.yaml）
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthorsConfig {
    #[serde(default)]
    pub authors: BTreeMap<String, AuthorProfile>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthorProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub links: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthorsConfig {
    /// 按显示名查找作者用户名
    pub fn find_username(&self, name: &str) -> Option<&str> {
        self.authors
            .iter()
            .find(|(username, profile)| profile.name == name || username.as_str() == name)
            .map(|(username, _)| username.as_str())
    }
}

/// 全部 YAML 配置的快照，每次全量构建开始时重新读取
#[derive(Debug, Clone, Default)]
pub struct SiteSettings {
    pub site: SiteConfig,
    pub authors: AuthorsConfig,
    /// 友链配置原样传给模板，不做抓取
    pub webring: Value,
}

impl SiteSettings {
    pub fn load(paths: &ProjectPaths) -> Result<Self> {
        let site: SiteConfig =
            crate::yaml::from_optional_file(&paths.site_config()).map_err(anyhow::Error::msg)?;
        let authors: AuthorsConfig =
            crate::yaml::from_optional_file(&paths.authors_config()).map_err(anyhow::Error::msg)?;
        let webring: Map<String, Value> =
            crate::yaml::from_optional_file(&paths.webring_config()).map_err(anyhow::Error::msg)?;
        Ok(Self {
            site,
            authors,
            webring: Value::Object(webring),
        })
    }
}

/// 解析"新章节"阈值：小说配置优先，其次站点配置，默认启用 7 天
pub fn resolve_new_chapter_tags(site: &NewChapterTags, novel: &NewChapterTags) -> (bool, i64) {
    let enabled = novel.enabled.or(site.enabled).unwrap_or(true);
    let threshold = novel
        .threshold_days
        .or(site.threshold_days)
        .unwrap_or_else(default_threshold_days);
    (enabled, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_config_defaults_without_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = GeneratorConfig::load(tmp.path()).unwrap();
        assert_eq!(config.build.output_dir, "build");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.watch.debounce_ms, 1000);
        assert_eq!(config.build.delete_retries, 3);
    }

    #[test]
    fn generator_config_partial_override() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(GENERATOR_CONFIG_FILE),
            "[server]\nport = 9000\nlog_level = \"debug\"\n",
        )
        .unwrap();
        let config = GeneratorConfig::load(tmp.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.build.output_dir, "build");
    }

    #[test]
    fn site_config_keeps_unknown_keys() {
        let site: SiteConfig = crate::yaml::from_str(
            "site_name: Test\nsite_url: https://example.com/\nfooter:\n  additional_text: hi\n",
        )
        .unwrap();
        assert_eq!(site.site_name, "Test");
        assert_eq!(site.base_url(), "https://example.com");
        assert!(site.extra.contains_key("footer"));
        assert_eq!(site.default_language(), "en");
        assert!(site.allows_indexing());
    }

    #[test]
    fn available_languages_start_with_default() {
        let site: SiteConfig =
            crate::yaml::from_str("languages:\n  default: jp\n  available: [en, jp]\n").unwrap();
        assert_eq!(site.available_languages(), vec!["jp", "en"]);
    }

    #[test]
    fn novel_new_chapter_tags_override_site() {
        let site = NewChapterTags {
            enabled: Some(true),
            threshold_days: Some(3),
        };
        let novel = NewChapterTags {
            enabled: None,
            threshold_days: Some(14),
        };
        assert_eq!(resolve_new_chapter_tags(&site, &novel), (true, 14));
        assert_eq!(
            resolve_new_chapter_tags(&NewChapterTags::default(), &NewChapterTags::default()),
            (true, 7)
        );
    }

    #[test]
    fn author_lookup_by_name() {
        let authors: AuthorsConfig =
            crate::yaml::from_str("authors:\n  jdoe:\n    name: Jane Doe\n").unwrap();
        assert_eq!(authors.find_username("Jane Doe"), Some("jdoe"));
        assert_eq!(authors.find_username("jdoe"), Some("jdoe"));
        assert_eq!(authors.find_username("Nobody"), None);
    }
}
