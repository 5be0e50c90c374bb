//! 构建后的报告：`--stats`、`--check-links`、`--check-accessibility`
//!
//! 报告只提示问题，不影响退出码。

use crate::build::BuildContext;
use crate::build::catalog::Catalog;
use crate::content::markdown::count_words;
use crate::project::TEMPLATE_EXT;
use anyhow::Context;
use regex::Regex;
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

pub const STATS_REPORT_FILE: &str = "stats_report.md";

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\s(?:href|src)\s*=\s*["']([^"']*)["']"#).unwrap());
static IMG_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());
static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<html\b[^>]*>").unwrap());
static ALT_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\salt\s*=").unwrap());
static LANG_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\slang\s*=").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageStats {
    pub language: String,
    pub chapters: usize,
    pub words: u64,
}

#[derive(Debug, Clone)]
pub struct NovelStats {
    pub slug: String,
    pub title: String,
    pub languages: Vec<LanguageStats>,
}

#[derive(Debug, Clone, Default)]
pub struct SiteStats {
    pub novels: Vec<NovelStats>,
    pub pages: usize,
    /// 相对项目根目录的模板覆盖文件
    pub template_overrides: Vec<String>,
}

impl SiteStats {
    pub fn total_chapters(&self) -> usize {
        self.novels
            .iter()
            .flat_map(|n| &n.languages)
            .map(|l| l.chapters)
            .sum()
    }

    pub fn total_words(&self) -> u64 {
        self.novels.iter().flat_map(|n| &n.languages).map(|l| l.words).sum()
    }
}

/// 按当前可见性规则统计站点内容
pub fn collect_stats(ctx: &BuildContext) -> SiteStats {
    let catalog = Catalog::load(ctx);
    let novels = catalog
        .novels
        .iter()
        .map(|novel| NovelStats {
            slug: novel.slug().to_string(),
            title: novel.config.display_title().to_string(),
            languages: novel
                .editions
                .iter()
                .map(|edition| LanguageStats {
                    language: edition.language.clone(),
                    chapters: edition.chapters.len(),
                    words: edition
                        .chapters
                        .iter()
                        .map(|c| u64::from(count_words(&c.chapter.doc.body)))
                        .sum(),
                })
                .collect(),
        })
        .collect();

    let mut template_overrides = template_files(&ctx.paths.root, &ctx.paths.templates);
    for slug in ctx.loader().list_novels() {
        template_overrides.extend(template_files(&ctx.paths.root, &ctx.paths.novel_templates(&slug)));
    }

    SiteStats {
        novels,
        pages: ctx.loader().list_pages().len(),
        template_overrides,
    }
}

fn template_files(root: &Path, dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some(TEMPLATE_EXT))
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}

pub fn render_stats(stats: &SiteStats, generated_at: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# 站点统计\n");
    let _ = writeln!(out, "生成时间：{generated_at}\n");
    let _ = writeln!(out, "- 小说：{}", stats.novels.len());
    let _ = writeln!(out, "- 章节：{}", stats.total_chapters());
    let _ = writeln!(out, "- 字数：{}", stats.total_words());
    let _ = writeln!(out, "- 页面：{}", stats.pages);
    let _ = writeln!(out, "- 模板覆盖：{}\n", stats.template_overrides.len());

    if !stats.novels.is_empty() {
        let _ = writeln!(out, "## 小说\n");
        let _ = writeln!(out, "| 小说 | 语言 | 章节 | 字数 |");
        let _ = writeln!(out, "|---|---|---|---|");
        for novel in &stats.novels {
            for lang in &novel.languages {
                let _ = writeln!(
                    out,
                    "| {} (`{}`) | {} | {} | {} |",
                    novel.title, novel.slug, lang.language, lang.chapters, lang.words
                );
            }
        }
        out.push('\n');
    }

    if !stats.template_overrides.is_empty() {
        let _ = writeln!(out, "## 模板覆盖\n");
        for file in &stats.template_overrides {
            let _ = writeln!(out, "- `{file}`");
        }
    }
    out
}

/// 统计并写出 stats_report.md（项目根目录）
pub fn write_stats_report(ctx: &BuildContext) -> anyhow::Result<SiteStats> {
    let stats = collect_stats(ctx);
    let generated_at = ctx.now.format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let path = ctx.paths.root.join(STATS_REPORT_FILE);
    std::fs::write(&path, render_stats(&stats, &generated_at))
        .with_context(|| format!("写入 {} 失败", path.display()))?;
    tracing::info!(
        "统计：{} 部小说，{} 章，{} 字，{} 个页面；报告已写入 {}",
        stats.novels.len(),
        stats.total_chapters(),
        stats.total_words(),
        stats.pages,
        STATS_REPORT_FILE
    );
    Ok(stats)
}

/// 一条页面问题
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageIssue {
    /// 相对构建目录的页面路径
    pub page: String,
    pub detail: String,
}

fn html_files(build_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(build_dir)
        .sort_by_file_name()
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|x| x.to_str()) == Some("html"))
        .collect()
}

fn rel_page(build_dir: &Path, path: &Path) -> String {
    path.strip_prefix(build_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// 检查构建目录中所有站内链接是否指向存在的文件
pub fn check_links(build_dir: &Path, site_url: &str) -> Vec<PageIssue> {
    let base = site_url.trim_end_matches('/');
    let mut broken = Vec::new();
    for path in html_files(build_dir) {
        let Ok(html) = std::fs::read_to_string(&path) else {
            continue;
        };
        let page_dir = path.parent().unwrap_or(build_dir);
        for caps in LINK_RE.captures_iter(&html) {
            let link = caps[1].trim();
            let Some(target) = resolve_link(build_dir, page_dir, base, link) else {
                continue;
            };
            if !target_exists(&target) {
                broken.push(PageIssue {
                    page: rel_page(build_dir, &path),
                    detail: link.to_string(),
                });
            }
        }
    }
    broken
}

/// 站内链接解析为构建目录中的路径；外部链接、锚点等返回 None
fn resolve_link(build_dir: &Path, page_dir: &Path, base: &str, link: &str) -> Option<PathBuf> {
    let link = match link.strip_prefix(base) {
        Some(rest) if !base.is_empty() => {
            if rest.is_empty() { "/" } else { rest }
        }
        _ => link,
    };
    let lower = link.to_ascii_lowercase();
    const EXTERNAL: [&str; 7] = ["http:", "https:", "//", "mailto:", "tel:", "data:", "javascript:"];
    if link.is_empty() || link.starts_with('#') || EXTERNAL.iter().any(|p| lower.starts_with(p)) {
        return None;
    }
    // 模板变量未展开的链接交给模板自身处理
    if link.contains("{{") {
        return None;
    }
    let path = link.split(['#', '?']).next().unwrap_or_default();
    if path.is_empty() {
        return None;
    }

    let (start, rel) = match path.strip_prefix('/') {
        Some(rest) => (build_dir, rest),
        None => (page_dir, path),
    };
    let mut resolved = start.to_path_buf();
    for component in Path::new(rel).components() {
        match component {
            Component::ParentDir => {
                // 不允许越出构建目录
                if resolved == build_dir || !resolved.pop() {
                    return Some(build_dir.join(rel));
                }
            }
            Component::Normal(part) => resolved.push(part),
            _ => {}
        }
    }
    if path.ends_with('/') {
        resolved.push("index.html");
    }
    Some(resolved)
}

fn target_exists(target: &Path) -> bool {
    target.is_file() || (target.is_dir() && target.join("index.html").is_file())
}

/// 基础无障碍检查：`<img>` 缺少 alt、`<html>` 缺少 lang
pub fn check_accessibility(build_dir: &Path) -> Vec<PageIssue> {
    let mut issues = Vec::new();
    for path in html_files(build_dir) {
        let Ok(html) = std::fs::read_to_string(&path) else {
            continue;
        };
        let page = rel_page(build_dir, &path);
        if let Some(tag) = HTML_TAG_RE.find(&html)
            && !LANG_ATTR_RE.is_match(tag.as_str())
        {
            issues.push(PageIssue {
                page: page.clone(),
                detail: "<html> 缺少 lang 属性".to_string(),
            });
        }
        for tag in IMG_TAG_RE.find_iter(&html) {
            if !ALT_ATTR_RE.is_match(tag.as_str()) {
                issues.push(PageIssue {
                    page: page.clone(),
                    detail: format!("图片缺少 alt 属性：{}", tag.as_str()),
                });
            }
        }
    }
    issues
}

pub fn log_broken_links(broken: &[PageIssue]) {
    if broken.is_empty() {
        tracing::info!("链接检查通过");
        return;
    }
    for issue in broken {
        tracing::warn!("失效链接：{} -> {}", issue.page, issue.detail);
    }
    tracing::warn!("共发现 {} 个失效链接", broken.len());
}

pub fn log_accessibility(issues: &[PageIssue]) {
    if issues.is_empty() {
        tracing::info!("无障碍检查通过");
        return;
    }
    for issue in issues {
        tracing::warn!("{}：{}", issue.page, issue.detail);
    }
    tracing::warn!("共发现 {} 个无障碍问题", issues.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildFlags;
    use crate::test_helpers::{ProjectBuilder, chapter_md};
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn stats_count_visible_chapters_and_overrides() {
        let project = ProjectBuilder::new()
            .novel("n", &["c1", "c2"])
            .chapter("n", "c1", &chapter_md("One", "published: 2020-01-01\n"))
            .chapter("n", "c2", &chapter_md("Two", "draft: true\n"))
            .file("pages/about.md", "---\ntitle: About\n---\nHi\n")
            .file("templates/chapter.html", "{{ content }}")
            .file("content/n/templates/toc.html", "toc")
            .build();
        let ctx = project.context(BuildFlags::default());

        let stats = write_stats_report(&ctx).unwrap();
        assert_eq!(stats.total_chapters(), 1);
        // "One body text."
        assert_eq!(stats.total_words(), 3);
        assert_eq!(stats.pages, 1);
        assert_eq!(
            stats.template_overrides,
            vec!["templates/chapter.html", "content/n/templates/toc.html"]
        );
        let report = std::fs::read_to_string(project.root().join(STATS_REPORT_FILE)).unwrap();
        assert!(report.contains("| n title (`n`) | en | 1 | 3 |"), "{report}");
    }

    #[test]
    fn finds_broken_internal_links() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "index.html", r#"<a href="novel/en/toc/">toc</a><a href="missing/">x</a><a href="https://elsewhere.org/">e</a>"#);
        write(
            root,
            "novel/en/toc/index.html",
            r##"<a href="../c1/">c1</a><a href="/static/style.css">s</a><a href="#top">t</a><img src="https://example.com/static/cover.png" alt="">"##,
        );
        write(root, "novel/en/c1/index.html", r#"<a href="../toc/?x=1">back</a>"#);
        write(root, "static/style.css", "");

        let broken = check_links(root, "https://example.com/");
        assert_eq!(
            broken,
            vec![
                PageIssue {
                    page: "index.html".into(),
                    detail: "missing/".into()
                },
                PageIssue {
                    page: "novel/en/toc/index.html".into(),
                    detail: "https://example.com/static/cover.png".into()
                },
            ]
        );
    }

    #[test]
    fn reports_missing_alt_and_lang() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "a/index.html",
            r#"<html><body><img src="x.png"><img src="y.png" alt="Y"></body></html>"#,
        );
        write(dir.path(), "b/index.html", r#"<html lang="en"><body></body></html>"#);
        let issues = check_accessibility(dir.path());
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.page == "a/index.html"));
    }
}
