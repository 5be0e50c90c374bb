use crate::config::SiteConfig;
use crate::content::frontmatter;
use crate::content::novel::NovelConfig;
use crate::content::visibility::parse_publish_date;
use crate::project::{MARKDOWN_EXT, ProjectPaths, is_language_code};
use std::path::Path;

/// 校验结果：错误会让 `--validate` 以非零状态退出，警告只提示
#[derive(Debug, Default)]
pub struct CheckResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// 校验站点配置与全部小说内容
pub fn run(paths: &ProjectPaths) -> CheckResult {
    let mut result = CheckResult::default();
    check_site_config(paths, &mut result);
    check_novels(paths, &mut result);
    result
}

fn check_site_config(paths: &ProjectPaths, result: &mut CheckResult) {
    let path = paths.site_config();
    if !path.is_file() {
        result.errors.push("缺少站点配置 site_config.yaml".to_string());
        return;
    }
    let site: SiteConfig = match crate::yaml::from_file(&path) {
        Ok(site) => site,
        Err(e) => {
            result.errors.push(format!("站点配置解析失败：{e}"));
            return;
        }
    };
    if site.site_name.trim().is_empty() {
        result.warnings.push("站点配置缺少 site_name".to_string());
    }
    if site.site_url.trim().is_empty() {
        result.warnings.push("站点配置缺少 site_url，sitemap 与 RSS 将不含绝对地址".to_string());
    }
}

fn check_novels(paths: &ProjectPaths, result: &mut CheckResult) {
    let Ok(entries) = std::fs::read_dir(&paths.content) else {
        result.warnings.push("content/ 目录不存在".to_string());
        return;
    };
    let mut slugs: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| !name.starts_with('.'))
        .collect();
    slugs.sort();

    for slug in &slugs {
        check_novel(paths, slug, result);
    }
}

fn check_novel(paths: &ProjectPaths, slug: &str, result: &mut CheckResult) {
    let config_path = paths.novel_config(slug);
    if !config_path.is_file() {
        result.errors.push(format!("小说 {slug} 缺少 config.yaml"));
        return;
    }
    let novel: NovelConfig = match crate::yaml::from_file(&config_path) {
        Ok(novel) => novel,
        Err(e) => {
            result.errors.push(format!("小说 {slug} 配置解析失败：{e}"));
            return;
        }
    };
    if novel.title.trim().is_empty() {
        result.errors.push(format!("小说 {slug} 缺少 title"));
    }
    if novel.arcs.is_empty() {
        result.errors.push(format!("小说 {slug} 缺少 arcs"));
    }

    let chapters_dir = paths.chapters_dir(slug);
    if !chapters_dir.is_dir() {
        result.errors.push(format!("小说 {slug} 缺少 chapters/ 目录"));
        return;
    }

    let mut translations: Vec<String> = std::fs::read_dir(&chapters_dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .filter(|name| is_language_code(name))
                .collect()
        })
        .unwrap_or_default();
    translations.sort();

    for arc in &novel.arcs {
        for chapter in &arc.chapters {
            let file = chapters_dir.join(format!("{}.{MARKDOWN_EXT}", chapter.id));
            if !file.is_file() {
                result
                    .errors
                    .push(format!("小说 {slug} 的章节 {} 缺少文件 {}", chapter.id, file.display()));
                continue;
            }
            check_chapter_file(&file, result);
            // 译文是可选的，存在时同样检查
            for lang in &translations {
                let translated = chapters_dir.join(lang).join(format!("{}.{MARKDOWN_EXT}", chapter.id));
                if translated.is_file() {
                    check_chapter_file(&translated, result);
                }
            }
        }
    }
}

fn check_chapter_file(path: &Path, result: &mut CheckResult) {
    let doc = match frontmatter::parse_file(path) {
        Ok(doc) => doc,
        Err(e) => {
            result.errors.push(format!("{} 的 Front Matter 无法解析：{e}", path.display()));
            return;
        }
    };
    if doc.body.trim().is_empty() {
        result.warnings.push(format!("{} 正文为空", path.display()));
    }
    if let Some(published) = doc.front_matter.get("published").and_then(|v| v.as_str())
        && parse_publish_date(published).is_none()
    {
        result
            .warnings
            .push(format!("{} 的发布日期无法识别：{published}", path.display()));
    }
}
