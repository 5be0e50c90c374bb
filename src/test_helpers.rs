//! 测试共用工具：在临时目录中搭建最小项目结构
//!
//! ```rust
//! let project = ProjectBuilder::new()
//!     .novel("my-novel", &["chapter-1"])
//!     .chapter("my-novel", "chapter-1", &chapter_md("One", "published: 2020-01-01\n"))
//!     .build();
//! let ctx = project.context(BuildFlags::default());
//! ```

use crate::build::{BuildContext, BuildFlags};
use crate::project::ProjectPaths;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const TEST_SITE_CONFIG: &str = "site_name: Test Site\nsite_url: https://example.com\nsite_description: A test site\n";

/// 临时项目，TempDir 随结构体一起释放
pub struct TestProject {
    pub dir: TempDir,
    pub paths: ProjectPaths,
}

impl TestProject {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn build_path(&self, rel: &str) -> PathBuf {
        self.paths.build.join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) {
        write_file(self.root(), rel, content);
    }

    pub fn read_output(&self, rel: &str) -> String {
        let path = self.build_path(rel);
        std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("读取输出 {} 失败：{e}", path.display()))
    }

    pub fn context(&self, flags: BuildFlags) -> BuildContext {
        BuildContext::new(self.paths.clone(), flags).unwrap()
    }
}

#[derive(Default)]
pub struct ProjectBuilder {
    files: Vec<(String, String)>,
    site_config: Option<String>,
}

impl ProjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn site_config(mut self, yaml: &str) -> Self {
        self.site_config = Some(yaml.to_string());
        self
    }

    /// 一卷、按顺序引用给定章节的小说
    pub fn novel(self, slug: &str, chapter_ids: &[&str]) -> Self {
        let mut config = format!("title: {slug} title\nprimary_language: en\narcs:\n  - title: Arc One\n    chapters:\n");
        for id in chapter_ids {
            config.push_str(&format!("      - id: {id}\n        title: {id} title\n"));
        }
        self.file(&format!("content/{slug}/config.yaml"), &config)
    }

    pub fn novel_config(self, slug: &str, yaml: &str) -> Self {
        self.file(&format!("content/{slug}/config.yaml"), yaml)
    }

    pub fn chapter(self, slug: &str, chapter_id: &str, content: &str) -> Self {
        self.file(&format!("content/{slug}/chapters/{chapter_id}.md"), content)
    }

    pub fn file(mut self, rel: &str, content: &str) -> Self {
        self.files.push((rel.to_string(), content.to_string()));
        self
    }

    pub fn build(self) -> TestProject {
        let dir = TempDir::new().unwrap();
        let site = self.site_config.as_deref().unwrap_or(TEST_SITE_CONFIG);
        write_file(dir.path(), "site_config.yaml", site);
        for (rel, content) in &self.files {
            write_file(dir.path(), rel, content);
        }
        let paths = ProjectPaths::new(dir.path(), "build");
        TestProject { dir, paths }
    }
}

/// 带 Front Matter 的章节内容，`extra` 为追加的 YAML 行
pub fn chapter_md(title: &str, extra: &str) -> String {
    format!("---\ntitle: {title}\n{extra}---\n\n{title} body text.\n")
}

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}
