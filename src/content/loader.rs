use crate::build::error::{BuildError, BuildResult};
use crate::content::novel::NovelConfig;
use crate::content::{ChapterMeta, LoadedChapter, LoadedPage, PageMeta, frontmatter};
use crate::project::{MARKDOWN_EXT, NOVEL_CONFIG_FILE, ProjectPaths, is_language_code};
use std::path::{Path, PathBuf};

/// 内容读取接口：章节、页面与小说配置
pub struct ContentLoader<'a> {
    paths: &'a ProjectPaths,
}

impl<'a> ContentLoader<'a> {
    pub fn new(paths: &'a ProjectPaths) -> Self {
        Self { paths }
    }

    /// content/ 下所有包含 config.yaml 的小说目录，按名称排序
    pub fn list_novels(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.paths.content) else {
            return Vec::new();
        };
        let mut slugs: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().join(NOVEL_CONFIG_FILE).is_file())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        slugs.sort();
        slugs
    }

    pub fn load_novel_config(&self, slug: &str) -> BuildResult<NovelConfig> {
        let path = self.paths.novel_config(slug);
        if !path.is_file() {
            return Err(BuildError::content(&path, "小说配置文件不存在"));
        }
        let mut novel: NovelConfig =
            crate::yaml::from_file(&path).map_err(|e| BuildError::content(&path, e))?;
        novel.slug = slug.to_string();
        Ok(novel)
    }

    /// 小说的全部语言：主语言、配置声明的语言、chapters/ 下的两位字母目录
    pub fn novel_languages(&self, novel: &NovelConfig) -> Vec<String> {
        let mut langs = vec![novel.primary_language().to_string()];
        for lang in &novel.languages.available {
            if !langs.contains(lang) {
                langs.push(lang.clone());
            }
        }
        if let Ok(entries) = std::fs::read_dir(self.paths.chapters_dir(&novel.slug)) {
            let mut found: Vec<String> = entries
                .flatten()
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .filter(|name| is_language_code(name))
                .collect();
            found.sort();
            for lang in found {
                if !langs.contains(&lang) {
                    langs.push(lang);
                }
            }
        }
        langs
    }

    fn chapter_file(&self, novel: &NovelConfig, chapter_id: &str, language: &str) -> PathBuf {
        self.paths
            .chapter_source_dir(&novel.slug, language, novel.primary_language())
            .join(format!("{chapter_id}.{MARKDOWN_EXT}"))
    }

    pub fn translation_exists(&self, novel: &NovelConfig, chapter_id: &str, language: &str) -> bool {
        self.chapter_file(novel, chapter_id, language).is_file()
    }

    /// 读取章节；译文不存在时回退到主语言并标记 translation_missing
    pub fn load_chapter(
        &self,
        novel: &NovelConfig,
        chapter_id: &str,
        language: &str,
    ) -> BuildResult<LoadedChapter> {
        let primary = novel.primary_language();
        let translated = self.chapter_file(novel, chapter_id, language);
        let (path, source_language) = if translated.is_file() {
            (translated, language.to_string())
        } else {
            (self.chapter_file(novel, chapter_id, primary), primary.to_string())
        };
        if !path.is_file() {
            return Err(BuildError::content(&path, "章节文件不存在"));
        }

        let doc = frontmatter::parse_file(&path).map_err(|e| BuildError::content(&path, e))?;
        let meta = ChapterMeta::from_front_matter(&doc.front_matter)
            .map_err(|e| BuildError::content(&path, e))?;
        let translation_missing = source_language != language;
        Ok(LoadedChapter {
            id: chapter_id.to_string(),
            doc,
            meta,
            source_language,
            translation_missing,
        })
    }

    /// pages/ 下的全部页面 slug（嵌套目录用 / 连接），跳过顶层语言目录
    pub fn list_pages(&self) -> Vec<String> {
        let mut slugs = Vec::new();
        collect_pages(&self.paths.pages, &self.paths.pages, &mut slugs);
        slugs.sort();
        slugs
    }

    fn page_file(&self, slug: &str, language: Option<&str>) -> PathBuf {
        let mut path = self.paths.pages.clone();
        if let Some(lang) = language {
            path.push(lang);
        }
        path.join(format!("{slug}.{MARKDOWN_EXT}"))
    }

    /// 页面可用的语言：默认语言 + 存在译文文件的语言
    pub fn page_languages(&self, slug: &str, languages: &[String], default_language: &str) -> Vec<String> {
        let mut langs = vec![default_language.to_string()];
        for lang in languages {
            if lang != default_language && self.page_file(slug, Some(lang)).is_file() {
                langs.push(lang.clone());
            }
        }
        langs
    }

    /// 读取页面；非默认语言优先 pages/<lang>/，不存在时回退到默认文件
    pub fn load_page(&self, slug: &str, language: &str, default_language: &str) -> BuildResult<LoadedPage> {
        let translated = self.page_file(slug, Some(language));
        let path = if language != default_language && translated.is_file() {
            translated
        } else {
            self.page_file(slug, None)
        };
        if !path.is_file() {
            return Err(BuildError::content(&path, "页面文件不存在"));
        }
        let doc = frontmatter::parse_file(&path).map_err(|e| BuildError::content(&path, e))?;
        let meta =
            PageMeta::from_front_matter(&doc.front_matter).map_err(|e| BuildError::content(&path, e))?;
        Ok(LoadedPage {
            slug: slug.to_string(),
            language: language.to_string(),
            doc,
            meta,
        })
    }
}

fn collect_pages(base: &Path, dir: &Path, slugs: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if path.is_dir() {
            if dir == base && is_language_code(&name) {
                continue;
            }
            collect_pages(base, &path, slugs);
        } else if path.extension().is_some_and(|ext| ext == MARKDOWN_EXT)
            && let Ok(rel) = path.with_extension("").strip_prefix(base)
        {
            let slug = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            slugs.push(slug);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ProjectBuilder, chapter_md};

    #[test]
    fn lists_novels_with_config_only() {
        let project = ProjectBuilder::new()
            .novel("b-novel", &["c1"])
            .novel("a-novel", &["c1"])
            .file("content/not-a-novel/readme.md", "x")
            .build();
        let loader = ContentLoader::new(&project.paths);
        assert_eq!(loader.list_novels(), vec!["a-novel", "b-novel"]);
    }

    #[test]
    fn chapter_translation_falls_back_to_primary() {
        let project = ProjectBuilder::new()
            .novel("n", &["c1", "c2"])
            .chapter("n", "c1", &chapter_md("One", ""))
            .chapter("n", "c2", &chapter_md("Two", ""))
            .file("content/n/chapters/jp/c1.md", &chapter_md("Ichi", ""))
            .build();
        let loader = ContentLoader::new(&project.paths);
        let novel = loader.load_novel_config("n").unwrap();
        assert_eq!(loader.novel_languages(&novel), vec!["en", "jp"]);

        let jp = loader.load_chapter(&novel, "c1", "jp").unwrap();
        assert_eq!(jp.meta.title.as_deref(), Some("Ichi"));
        assert!(!jp.translation_missing);

        let fallback = loader.load_chapter(&novel, "c2", "jp").unwrap();
        assert_eq!(fallback.meta.title.as_deref(), Some("Two"));
        assert!(fallback.translation_missing);
        assert_eq!(fallback.source_language, "en");
    }

    #[test]
    fn missing_chapter_is_content_error() {
        let project = ProjectBuilder::new().novel("n", &["c1"]).build();
        let loader = ContentLoader::new(&project.paths);
        let novel = loader.load_novel_config("n").unwrap();
        let err = loader.load_chapter(&novel, "c1", "en").unwrap_err();
        assert!(err.is_skippable());
    }

    #[test]
    fn malformed_front_matter_is_content_error() {
        let project = ProjectBuilder::new()
            .novel("n", &["c1"])
            .chapter("n", "c1", "---\ntitle: [broken\n---\nbody")
            .build();
        let loader = ContentLoader::new(&project.paths);
        let novel = loader.load_novel_config("n").unwrap();
        assert!(matches!(
            loader.load_chapter(&novel, "c1", "en"),
            Err(BuildError::Content { .. })
        ));
    }

    #[test]
    fn pages_skip_language_dirs_and_support_nesting() {
        let project = ProjectBuilder::new()
            .file("pages/about.md", "---\ntitle: About\n---\nhi")
            .file("pages/resources/guide.md", "---\ntitle: Guide\n---\nhi")
            .file("pages/jp/about.md", "---\ntitle: について\n---\nhi")
            .build();
        let loader = ContentLoader::new(&project.paths);
        assert_eq!(loader.list_pages(), vec!["about", "resources/guide"]);

        let langs = vec!["en".to_string(), "jp".to_string()];
        assert_eq!(loader.page_languages("about", &langs, "en"), vec!["en", "jp"]);
        assert_eq!(loader.page_languages("resources/guide", &langs, "en"), vec!["en"]);

        let jp = loader.load_page("about", "jp", "en").unwrap();
        assert_eq!(jp.meta.title.as_deref(), Some("について"));
        let guide = loader.load_page("resources/guide", "en", "en").unwrap();
        assert_eq!(guide.meta.title.as_deref(), Some("Guide"));
    }
}
