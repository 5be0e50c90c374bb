use crate::build::error::{BuildError, BuildResult, IoContext};
use crate::build::stages::postprocess;
use crate::config::{BuildConfig, SiteSettings, resolve_new_chapter_tags};
use crate::content::loader::ContentLoader;
use crate::content::novel::NovelConfig;
use crate::content::visibility::VisibilityRules;
use crate::project::ProjectPaths;
use crate::template::{self, AssetMap, EnvSpec, TemplateCache};
use chrono::{DateTime, Utc};
use minijinja::Environment;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// 影响输出形态的构建开关
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFlags {
    pub include_drafts: bool,
    pub include_scheduled: bool,
    pub epub: bool,
    pub minify: bool,
    pub optimize_images: bool,
}

impl Default for BuildFlags {
    fn default() -> Self {
        Self {
            include_drafts: false,
            include_scheduled: false,
            epub: true,
            minify: true,
            optimize_images: false,
        }
    }
}

impl BuildFlags {
    /// 编辑期间的快速模式：跳过 EPUB、图片优化与压缩
    pub fn fast(&self) -> Self {
        Self {
            include_drafts: self.include_drafts,
            include_scheduled: self.include_scheduled,
            epub: false,
            minify: false,
            optimize_images: false,
        }
    }

    /// 参与指纹计算的开关字符串
    pub fn fingerprint_key(&self) -> String {
        format!(
            "drafts={};scheduled={};minify={};epub={};optimize_images={}",
            self.include_drafts, self.include_scheduled, self.minify, self.epub, self.optimize_images
        )
    }
}

/// 删除构建目录时的重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl From<&BuildConfig> for RetryPolicy {
    fn from(config: &BuildConfig) -> Self {
        Self {
            attempts: config.delete_retries.max(1),
            delay: Duration::from_millis(config.delete_retry_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&BuildConfig::default())
    }
}

/// 一次构建调用期间共享的全部状态
///
/// 资源映射与模板环境缓存只存在于进程内，变化时整体替换或丢弃。
pub struct BuildContext {
    pub paths: ProjectPaths,
    pub flags: BuildFlags,
    pub settings: SiteSettings,
    pub retry: RetryPolicy,
    /// 本次构建的时间基准，"新章节"与定时发布都以它为准
    pub now: DateTime<Utc>,
    asset_map: Arc<AssetMap>,
    templates: TemplateCache,
}

impl BuildContext {
    pub fn new(paths: ProjectPaths, flags: BuildFlags) -> anyhow::Result<Self> {
        let settings = SiteSettings::load(&paths)?;
        Ok(Self {
            paths,
            flags,
            settings,
            retry: RetryPolicy::default(),
            now: Utc::now(),
            asset_map: Arc::new(AssetMap::new()),
            templates: TemplateCache::default(),
        })
    }

    /// 全量构建开始时重新读取 YAML 配置并重置时间基准
    pub fn reload(&mut self) -> BuildResult<()> {
        self.settings =
            SiteSettings::load(&self.paths).map_err(|e| BuildError::Config(format!("{e:#}")))?;
        self.now = Utc::now();
        self.templates.clear();
        Ok(())
    }

    pub fn rules(&self) -> VisibilityRules {
        VisibilityRules::new(self.flags.include_drafts, self.flags.include_scheduled, self.now)
    }

    pub fn loader(&self) -> ContentLoader<'_> {
        ContentLoader::new(&self.paths)
    }

    pub fn asset_map(&self) -> &AssetMap {
        &self.asset_map
    }

    /// 替换资源映射；已缓存的环境捕获了旧映射，全部丢弃
    pub fn set_asset_map(&mut self, asset_map: AssetMap) {
        self.asset_map = Arc::new(asset_map);
        self.templates.clear();
    }

    pub fn invalidate_novel_env(&mut self, novel_slug: &str) -> bool {
        let existed = self.templates.invalidate(novel_slug);
        if existed {
            tracing::debug!("已丢弃小说 {novel_slug} 的模板环境");
        }
        existed
    }

    pub fn has_env(&self, novel_slug: Option<&str>) -> bool {
        self.templates.contains(novel_slug)
    }

    /// 取得（必要时构造）模板环境：小说模板目录 → 全局模板目录 → 内置模板
    pub fn environment(&mut self, novel: Option<&NovelConfig>) -> Arc<Environment<'static>> {
        let slug = novel.map(|n| n.slug.as_str());
        if let Some(env) = self.templates.get(slug) {
            return env;
        }

        let mut search_dirs = Vec::new();
        if let Some(slug) = slug {
            search_dirs.push(self.paths.novel_templates(slug));
        }
        search_dirs.push(self.paths.templates.clone());

        let site_tags = &self.settings.site.new_chapter_tags;
        let new_chapter_tags = match novel {
            Some(n) => resolve_new_chapter_tags(site_tags, &n.new_chapter_tags),
            None => resolve_new_chapter_tags(site_tags, &Default::default()),
        };

        let env = Arc::new(template::build_environment(EnvSpec {
            search_dirs,
            asset_map: self.asset_map.clone(),
            authors: Arc::new(self.settings.authors.clone()),
            new_chapter_tags,
        }));
        self.templates.insert(slug, env.clone());
        env
    }

    pub fn render(
        &mut self,
        novel: Option<&NovelConfig>,
        name: &str,
        vars: &serde_json::Value,
    ) -> BuildResult<String> {
        let env = self.environment(novel);
        let template_error = |e: minijinja::Error| BuildError::Template {
            name: name.to_string(),
            message: format!("{e:#}"),
        };
        let tmpl = env.get_template(name).map_err(template_error)?;
        tmpl.render(minijinja::Value::from_serialize(vars))
            .map_err(template_error)
    }

    /// 写入构建目录下的 HTML 文件（相对路径），按开关压缩
    pub fn write_html(&self, rel_path: &str, html: String) -> BuildResult<()> {
        let html = postprocess::apply(html, self.flags.minify);
        self.write_output(rel_path, html.as_bytes())
    }

    pub fn write_output(&self, rel_path: &str, bytes: &[u8]) -> BuildResult<()> {
        let path = self.paths.build.join(rel_path);
        write_file(&path, bytes)
    }
}

/// 写文件并按需创建父目录
pub fn write_file(path: &Path, bytes: &[u8]) -> BuildResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .io_context(|| format!("创建目录 {} 失败", parent.display()))?;
    }
    std::fs::write(path, bytes).io_context(|| format!("写入 {} 失败", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ProjectBuilder;

    #[test]
    fn fast_mode_keeps_visibility_flags() {
        let flags = BuildFlags {
            include_drafts: true,
            optimize_images: true,
            ..Default::default()
        };
        let fast = flags.fast();
        assert!(fast.include_drafts);
        assert!(!fast.epub && !fast.minify && !fast.optimize_images);
        assert_ne!(flags.fingerprint_key(), fast.fingerprint_key());
    }

    #[test]
    fn environments_are_cached_and_invalidated() {
        let project = ProjectBuilder::new()
            .novel("n", &["c1"])
            .file("content/n/templates/chapter.html", "custom {{ x }}")
            .build();
        let mut ctx = project.context(BuildFlags::default());
        let novel = ctx.loader().load_novel_config("n").unwrap();

        let vars = serde_json::json!({ "x": 1 });
        assert_eq!(ctx.render(Some(&novel), "chapter.html", &vars).unwrap(), "custom 1");
        assert!(ctx.has_env(Some("n")));

        // 缓存的环境在失效前不会读取新模板
        project.write("content/n/templates/chapter.html", "changed {{ x }}");
        assert_eq!(ctx.render(Some(&novel), "chapter.html", &vars).unwrap(), "custom 1");

        assert!(ctx.invalidate_novel_env("n"));
        assert_eq!(ctx.render(Some(&novel), "chapter.html", &vars).unwrap(), "changed 1");
    }

    #[test]
    fn asset_map_change_drops_environments() {
        let project = ProjectBuilder::new()
            .file("templates/t.html", "{{ 'style.css'|asset_url }}")
            .build();
        let mut ctx = project.context(BuildFlags::default());
        let vars = serde_json::json!({});
        assert_eq!(ctx.render(None, "t.html", &vars).unwrap(), "style.css");

        ctx.set_asset_map(AssetMap::from([(
            "style.css".to_string(),
            "style-00ff00ff.css".to_string(),
        )]));
        assert!(!ctx.has_env(None));
        assert_eq!(ctx.render(None, "t.html", &vars).unwrap(), "style-00ff00ff.css");
    }

    #[test]
    fn write_html_creates_parents() {
        let project = ProjectBuilder::new().build();
        let ctx = project.context(BuildFlags::default());
        ctx.write_html("a/b/index.html", "<p>x</p>\n".to_string()).unwrap();
        assert_eq!(project.read_output("a/b/index.html"), "<p>x</p>");
    }
}
