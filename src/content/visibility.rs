use crate::content::{ChapterMeta, PageMeta};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// 可见性规则：同一次构建内所有输出（目录、导航、RSS、sitemap、搜索、robots）共用
#[derive(Debug, Clone, Copy)]
pub struct VisibilityRules {
    pub include_drafts: bool,
    pub include_scheduled: bool,
    pub now: DateTime<Utc>,
}

impl VisibilityRules {
    pub fn new(include_drafts: bool, include_scheduled: bool, now: DateTime<Utc>) -> Self {
        Self {
            include_drafts,
            include_scheduled,
            now,
        }
    }

    /// 章节是否出现在本次构建的任何输出中
    pub fn chapter_visible(&self, meta: &ChapterMeta) -> bool {
        if meta.hidden {
            return false;
        }
        if meta.draft && !self.include_drafts {
            return false;
        }
        if is_scheduled_future(meta, self.now) && !self.include_scheduled {
            return false;
        }
        match meta.status.as_deref() {
            Some("draft") | Some("review") if !self.include_drafts => false,
            Some("scheduled") if !self.include_scheduled => false,
            _ => true,
        }
    }

    /// EPUB 额外排除有密码的章节
    pub fn chapter_in_epub(&self, meta: &ChapterMeta) -> bool {
        self.chapter_visible(meta) && !meta.has_password()
    }

    pub fn page_visible(&self, meta: &PageMeta) -> bool {
        if meta.hidden {
            return false;
        }
        !(meta.draft && !self.include_drafts)
    }
}

/// 发布时间晚于当前时间的章节视为定时发布
pub fn is_scheduled_future(meta: &ChapterMeta, now: DateTime<Utc>) -> bool {
    meta.published
        .as_deref()
        .and_then(parse_publish_date)
        .is_some_and(|published| published > now)
}

/// 解析发布日期，不带时区的时间按 UTC 处理
pub fn parse_publish_date(date_str: &str) -> Option<DateTime<Utc>> {
    let s = date_str.trim();
    if s.is_empty() {
        return None;
    }

    // RFC 3339: 2024-01-15T10:30:00+08:00 / 2024-01-15T10:30:00Z
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.to_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }
    // 2024-01-15 14:30:00+08:00
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.to_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let dt = date.and_hms_opt(0, 0, 0)?;
        return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
    }
    None
}

/// 统一显示为 YYYY-MM-DD，无法解析时原样返回
pub fn format_date_for_display(date_str: &str) -> String {
    match parse_publish_date(date_str) {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => date_str.to_string(),
    }
}

/// 发布时间在阈值天数以内（且不在未来）的章节标记为新章节
pub fn is_new(published: Option<&str>, now: DateTime<Utc>, threshold_days: i64, enabled: bool) -> bool {
    if !enabled {
        return false;
    }
    let Some(published) = published.and_then(parse_publish_date) else {
        return false;
    };
    let days = (now - published).num_days();
    (0..=threshold_days).contains(&days) && published <= now
}
