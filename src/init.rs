use crate::config::GENERATOR_CONFIG_FILE;
use crate::content::{FrontMatter, frontmatter};
use crate::project::{AUTHORS_FILE, CONTENT_DIR, PAGES_DIR, STATIC_DIR, TEMPLATES_DIR};
use anyhow::{Context, Result};
use serde_json::json;
use std::fs;
use std::path::Path;

// 嵌入示例项目
const SITE_CONFIG: &str = include_str!("../defaults/scaffold/site_config.yaml");
const AUTHORS: &str = include_str!("../defaults/scaffold/authors.yaml");
const NOVEL_CONFIG: &str = include_str!("../defaults/scaffold/novel_config.yaml");
const ABOUT_PAGE: &str = include_str!("../defaults/scaffold/about.md");
const GENERATOR_CONFIG: &str = include_str!("../defaults/scaffold/novelsite.toml");

const EXAMPLE_NOVEL: &str = "example-novel";
const EXAMPLE_CHAPTER_BODY: &str = "\nOnce upon a time, the story began.\n";

/// 示例章节，发布日期取初始化当天
fn example_chapter() -> Result<String> {
    let mut front_matter = FrontMatter::new();
    front_matter.insert("title".into(), json!("The Beginning"));
    front_matter.insert(
        "published".into(),
        json!(chrono::Utc::now().format("%Y-%m-%d").to_string()),
    );
    front_matter.insert("tags".into(), json!(["prologue"]));
    frontmatter::combine(&front_matter, EXAMPLE_CHAPTER_BODY).map_err(anyhow::Error::msg)
}

/// 在 `root` 下创建最小项目骨架。
/// 返回 `true` 表示执行了初始化，`false` 表示站点配置已存在、未做任何改动。
pub fn init_project(root: &Path) -> Result<bool> {
    let paths = crate::project::ProjectPaths::new(root, "build");
    if paths.site_config().exists() {
        return Ok(false);
    }

    let novel_dir = format!("{CONTENT_DIR}/{EXAMPLE_NOVEL}");
    let dirs = [
        format!("{novel_dir}/chapters"),
        TEMPLATES_DIR.to_string(),
        STATIC_DIR.to_string(),
        PAGES_DIR.to_string(),
    ];
    for dir in &dirs {
        fs::create_dir_all(root.join(dir)).with_context(|| format!("创建目录 {dir} 失败"))?;
    }

    let chapter = example_chapter()?;
    let files = [
        (crate::project::SITE_CONFIG_FILE.to_string(), SITE_CONFIG),
        (AUTHORS_FILE.to_string(), AUTHORS),
        (format!("{novel_dir}/config.yaml"), NOVEL_CONFIG),
        (format!("{novel_dir}/chapters/chapter-1.md"), chapter.as_str()),
        (format!("{PAGES_DIR}/about.md"), ABOUT_PAGE),
        (GENERATOR_CONFIG_FILE.to_string(), GENERATOR_CONFIG),
    ];
    for (rel, content) in &files {
        let path = root.join(rel);
        // 已有文件保持原样
        if path.exists() {
            continue;
        }
        fs::write(&path, content).with_context(|| format!("写入 {rel} 失败"))?;
    }

    Ok(true)
}
