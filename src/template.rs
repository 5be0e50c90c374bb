pub mod defaults;
pub mod filters;

use crate::config::AuthorsConfig;
use minijinja::Environment;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 静态资源映射：原始相对路径 → 带哈希的文件名
pub type AssetMap = BTreeMap<String, String>;

/// 按小说缓存的模板环境，`None` 键为全局环境
///
/// 环境一旦构造就不再修改；模板文件变化时整个丢弃。
#[derive(Default)]
pub struct TemplateCache {
    envs: HashMap<Option<String>, Arc<Environment<'static>>>,
}

impl TemplateCache {
    pub fn get(&self, novel_slug: Option<&str>) -> Option<Arc<Environment<'static>>> {
        self.envs.get(&novel_slug.map(str::to_string)).cloned()
    }

    pub fn insert(&mut self, novel_slug: Option<&str>, env: Arc<Environment<'static>>) {
        self.envs.insert(novel_slug.map(str::to_string), env);
    }

    /// 丢弃某部小说的环境，返回是否存在
    pub fn invalidate(&mut self, novel_slug: &str) -> bool {
        self.envs.remove(&Some(novel_slug.to_string())).is_some()
    }

    pub fn clear(&mut self) {
        self.envs.clear();
    }

    pub fn contains(&self, novel_slug: Option<&str>) -> bool {
        self.envs.contains_key(&novel_slug.map(str::to_string))
    }
}

/// 构造模板环境所需的全部输入
pub struct EnvSpec {
    /// 按优先级排列的模板目录，之后回退到内置模板
    pub search_dirs: Vec<PathBuf>,
    pub asset_map: Arc<AssetMap>,
    pub authors: Arc<AuthorsConfig>,
    /// （是否显示新章节角标，阈值天数）
    pub new_chapter_tags: (bool, i64),
}

pub fn build_environment(spec: EnvSpec) -> Environment<'static> {
    let mut env = Environment::new();
    let dirs = spec.search_dirs;
    env.set_loader(move |name| load_template(&dirs, name));
    filters::register_filters(
        &mut env,
        filters::FilterData {
            asset_map: spec.asset_map,
            authors: spec.authors,
            new_chapter_tags: spec.new_chapter_tags,
        },
    );
    env
}

fn load_template(dirs: &[PathBuf], name: &str) -> Result<Option<String>, minijinja::Error> {
    if name.split(['/', '\\']).any(|seg| seg == "..") {
        return Ok(None);
    }
    for dir in dirs {
        let path = dir.join(name);
        if path.is_file() {
            return std::fs::read_to_string(&path).map(Some).map_err(|e| {
                minijinja::Error::new(
                    minijinja::ErrorKind::InvalidOperation,
                    format!("读取模板 {} 失败：{}", path.display(), e),
                )
            });
        }
    }
    Ok(defaults::builtin(name).map(str::to_string))
}

/// 列出小说模板目录中的覆盖模板
pub fn list_templates(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().extension().is_some_and(|ext| ext == crate::project::TEMPLATE_EXT))
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spec(dirs: Vec<PathBuf>) -> EnvSpec {
        EnvSpec {
            search_dirs: dirs,
            asset_map: Arc::new(AssetMap::from([(
                "style.css".to_string(),
                "style-abcd1234.css".to_string(),
            )])),
            authors: Arc::new(AuthorsConfig::default()),
            new_chapter_tags: (true, 7),
        }
    }

    #[test]
    fn first_directory_wins() {
        let novel = TempDir::new().unwrap();
        let global = TempDir::new().unwrap();
        std::fs::write(novel.path().join("x.html"), "novel").unwrap();
        std::fs::write(global.path().join("x.html"), "global").unwrap();
        std::fs::write(global.path().join("y.html"), "global-y").unwrap();

        let env = build_environment(spec(vec![
            novel.path().to_path_buf(),
            global.path().to_path_buf(),
        ]));
        let x = env.get_template("x.html").unwrap().render(()).unwrap();
        let y = env.get_template("y.html").unwrap().render(()).unwrap();
        assert_eq!(x, "novel");
        assert_eq!(y, "global-y");
    }

    #[test]
    fn falls_back_to_builtin_templates() {
        let env = build_environment(spec(vec![]));
        assert!(env.get_template("chapter.html").is_ok());
        assert!(env.get_template("missing.html").is_err());
    }

    #[test]
    fn parent_traversal_is_refused() {
        let env = build_environment(spec(vec![PathBuf::from("/tmp")]));
        assert!(env.get_template("../etc/passwd").is_err());
    }

    #[test]
    fn cache_invalidation_is_per_novel() {
        let mut cache = TemplateCache::default();
        let env = Arc::new(build_environment(spec(vec![])));
        cache.insert(None, env.clone());
        cache.insert(Some("a"), env.clone());
        cache.insert(Some("b"), env);

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert!(!cache.contains(Some("a")));
        assert!(cache.contains(Some("b")));
        assert!(cache.contains(None));

        cache.clear();
        assert!(!cache.contains(None));
    }
}
