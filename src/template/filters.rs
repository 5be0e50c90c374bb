use super::AssetMap;
use crate::config::AuthorsConfig;
use crate::content::visibility;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use minijinja::{Environment, State, Value};
use regex::Regex;
use std::sync::{Arc, LazyLock};

static UNSAFE_PATH_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());
static SEPARATOR_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\-]+").unwrap());

/// 模板过滤器需要捕获的站点数据
pub struct FilterData {
    pub asset_map: Arc<AssetMap>,
    pub authors: Arc<AuthorsConfig>,
    pub new_chapter_tags: (bool, i64),
}

/// 向 MiniJinja 环境注册所有站点过滤器
pub fn register_filters(env: &mut Environment<'static>, data: FilterData) {
    let assets = data.asset_map;
    env.add_filter("asset_url", move |name: String| asset_url(&assets, &name));

    let authors = data.authors;
    env.add_filter("find_author_username", move |name: String| {
        authors.find_username(&name).map(str::to_string)
    });

    let (enabled, threshold_days) = data.new_chapter_tags;
    env.add_filter("is_new", move |state: &State, published: Option<String>| {
        let now = build_time(state);
        visibility::is_new(published.as_deref(), now, threshold_days, enabled)
    });

    env.add_filter("slugify_tag", slugify_tag);
    env.add_filter("format_date", filter_format_date);
    env.add_filter("truncate_text", filter_truncate_text);
    env.add_filter("wordcount", filter_wordcount);
    env.add_filter("reading_time", filter_reading_time);
    env.add_filter("json", filter_json);
}

/// 映射到带哈希的文件名；不在映射中的原样返回
pub fn asset_url(asset_map: &AssetMap, name: &str) -> String {
    asset_map.get(name).cloned().unwrap_or_else(|| name.to_string())
}

/// 标签转为 URL 片段：保留 Unicode，替换文件系统不安全字符
///
/// 结果为空时使用原标签 MD5 的前 8 位。
pub fn slugify_tag(tag: String) -> String {
    let lowered = tag.trim().to_lowercase();
    let replaced = UNSAFE_PATH_CHARS.replace_all(&lowered, "-");
    let collapsed = SEPARATOR_RUNS.replace_all(&replaced, "-");
    let slug = collapsed.trim_matches('-').to_string();
    if slug.is_empty() {
        let digest = format!("{:x}", Md5::digest(tag.as_bytes()));
        digest[..8].to_string()
    } else {
        slug
    }
}

fn build_time(state: &State) -> DateTime<Utc> {
    state
        .lookup("build_time")
        .and_then(|v| v.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn filter_format_date(value: Option<String>) -> String {
    value
        .map(|s| visibility::format_date_for_display(&s))
        .unwrap_or_default()
}

fn filter_truncate_text(value: String, length: Option<usize>) -> String {
    let len = length.unwrap_or(160);
    if value.chars().count() <= len {
        value
    } else {
        let mut s: String = value.chars().take(len).collect();
        s.push('\u{2026}');
        s
    }
}

fn filter_wordcount(value: String) -> u32 {
    crate::content::markdown::count_words(&crate::content::excerpt::strip_html_tags(&value))
}

fn filter_reading_time(value: Value) -> u32 {
    let words = value.to_string().parse::<u32>().unwrap_or(0);
    crate::content::markdown::reading_time(words)
}

fn filter_json(value: Value) -> Result<String, minijinja::Error> {
    serde_json::to_string(&value).map_err(|e| {
        minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
    })
}
