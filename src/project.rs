use std::path::{Path, PathBuf};

pub const SITE_CONFIG_FILE: &str = "site_config.yaml";
pub const SITE_CONFIG_ALT_FILE: &str = "site_config.yml";
pub const AUTHORS_FILE: &str = "authors.yaml";
pub const WEBRING_FILE: &str = "webring.yaml";
pub const CNAME_FILE: &str = "CNAME";
pub const NOVEL_CONFIG_FILE: &str = "config.yaml";

pub const CONTENT_DIR: &str = "content";
pub const TEMPLATES_DIR: &str = "templates";
pub const STATIC_DIR: &str = "static";
pub const PAGES_DIR: &str = "pages";
pub const CHAPTERS_DIR: &str = "chapters";

pub const TEMPLATE_EXT: &str = "html";
pub const MARKDOWN_EXT: &str = "md";

/// 未配置主语言时使用的语言代码
pub const DEFAULT_LANGUAGE: &str = "en";

/// 项目目录布局，所有路径均基于项目根目录
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub content: PathBuf,
    pub templates: PathBuf,
    pub static_dir: PathBuf,
    pub pages: PathBuf,
    pub build: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: &Path, output_dir: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            content: root.join(CONTENT_DIR),
            templates: root.join(TEMPLATES_DIR),
            static_dir: root.join(STATIC_DIR),
            pages: root.join(PAGES_DIR),
            build: root.join(output_dir),
        }
    }

    /// 站点配置文件路径（优先 .yaml，其次 .yml）
    pub fn site_config(&self) -> PathBuf {
        let yaml = self.root.join(SITE_CONFIG_FILE);
        if yaml.exists() {
            return yaml;
        }
        let yml = self.root.join(SITE_CONFIG_ALT_FILE);
        if yml.exists() { yml } else { yaml }
    }

    pub fn authors_config(&self) -> PathBuf {
        self.root.join(AUTHORS_FILE)
    }

    pub fn webring_config(&self) -> PathBuf {
        self.root.join(WEBRING_FILE)
    }

    pub fn novel_dir(&self, slug: &str) -> PathBuf {
        self.content.join(slug)
    }

    pub fn novel_config(&self, slug: &str) -> PathBuf {
        self.novel_dir(slug).join(NOVEL_CONFIG_FILE)
    }

    pub fn novel_templates(&self, slug: &str) -> PathBuf {
        self.novel_dir(slug).join(TEMPLATES_DIR)
    }

    pub fn chapters_dir(&self, slug: &str) -> PathBuf {
        self.novel_dir(slug).join(CHAPTERS_DIR)
    }

    /// 章节源目录：主语言位于 chapters/，译文位于 chapters/<lang>/
    pub fn chapter_source_dir(&self, slug: &str, language: &str, primary: &str) -> PathBuf {
        if language == primary {
            self.chapters_dir(slug)
        } else {
            self.chapters_dir(slug).join(language)
        }
    }
}

/// 是否为两位字母的语言代码目录名
pub fn is_language_code(name: &str) -> bool {
    name.len() == 2 && name.bytes().all(|b| b.is_ascii_alphabetic())
}

/// 从页面深度推导回到站点根目录的相对前缀，例如深度 3 得到 `../../../`
pub fn relative_root(depth: usize) -> String {
    "../".repeat(depth)
}
