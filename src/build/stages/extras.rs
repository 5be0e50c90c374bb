//! 术语表与角色页

use crate::build::catalog::NovelEntry;
use crate::build::context::BuildContext;
use crate::build::error::{BuildError, BuildResult};
use crate::build::meta::{self, PageChrome, PageKind};
use crate::content::novel::NovelConfig;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;

const CHARACTERS_FILE: &str = "characters.yaml";
const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Clone, Serialize)]
pub struct GlossaryTerm {
    pub term: String,
    pub definition: String,
    pub category: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Character {
    pub slug: String,
    pub name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// 术语表文件：未开启时为 None；`glossary-<lang>.yaml` 优先于 `glossary.yaml`
pub fn glossary_file(ctx: &BuildContext, novel: &NovelConfig, language: &str) -> Option<PathBuf> {
    if !novel.glossary.enabled {
        return None;
    }
    let dir = ctx.paths.novel_dir(&novel.slug);
    [format!("glossary-{language}.yaml"), "glossary.yaml".to_string()]
        .into_iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

pub fn characters_file(ctx: &BuildContext, novel_slug: &str) -> Option<PathBuf> {
    Some(ctx.paths.novel_dir(novel_slug).join(CHARACTERS_FILE)).filter(|p| p.is_file())
}

/// 解析术语表：`terms:` 列表，或 术语 → 释义 的映射
pub fn parse_glossary(data: &Map<String, Value>) -> Vec<GlossaryTerm> {
    let as_string = |v: Option<&Value>| v.and_then(Value::as_str).unwrap_or_default().to_string();
    match data.get("terms") {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| {
                let term = as_string(entry.get("term"));
                (!term.is_empty()).then(|| GlossaryTerm {
                    definition: as_string(entry.get("definition")),
                    category: entry
                        .get("category")
                        .and_then(Value::as_str)
                        .unwrap_or(DEFAULT_CATEGORY)
                        .to_string(),
                    aliases: entry
                        .get("aliases")
                        .and_then(Value::as_array)
                        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                        .unwrap_or_default(),
                    term,
                })
            })
            .collect(),
        _ => data
            .iter()
            .filter_map(|(term, definition)| {
                definition.as_str().map(|d| GlossaryTerm {
                    term: term.clone(),
                    definition: d.to_string(),
                    category: DEFAULT_CATEGORY.to_string(),
                    aliases: Vec::new(),
                })
            })
            .collect(),
    }
}

/// 按分类分组，组内按术语（忽略大小写）排序
pub fn group_terms(terms: Vec<GlossaryTerm>) -> BTreeMap<String, Vec<GlossaryTerm>> {
    let mut groups: BTreeMap<String, Vec<GlossaryTerm>> = BTreeMap::new();
    for term in terms {
        groups.entry(term.category.clone()).or_default().push(term);
    }
    for terms in groups.values_mut() {
        terms.sort_by_key(|t| t.term.to_lowercase());
    }
    groups
}

/// 角色列表；缺少 slug 时由名字生成
pub fn parse_characters(data: &Map<String, Value>) -> Vec<Character> {
    let Some(Value::Array(entries)) = data.get("characters") else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|fields| {
            let name = fields.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
            let slug = fields
                .get("slug")
                .or_else(|| fields.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| name.to_lowercase().replace(' ', "-"));
            (!slug.is_empty()).then(|| Character {
                slug,
                name,
                fields: fields.clone(),
            })
        })
        .collect()
}

fn load_yaml(path: &PathBuf) -> BuildResult<Map<String, Value>> {
    crate::yaml::from_file(path).map_err(|e| BuildError::content(path, e))
}

/// 渲染一部小说各语言的术语表与角色页，返回写出的页面数
pub fn render_extras(ctx: &mut BuildContext, novel: &NovelEntry) -> BuildResult<usize> {
    let mut count = 0;
    for language in &novel.languages {
        for result in [
            render_glossary(ctx, novel, language),
            render_characters(ctx, novel, language),
        ] {
            match result {
                Ok(n) => count += n,
                Err(e) if e.is_skippable() => tracing::warn!("跳过 {} 的附加页面：{e}", novel.slug()),
                Err(e) => return Err(e),
            }
        }
    }
    Ok(count)
}

fn render_glossary(ctx: &mut BuildContext, novel: &NovelEntry, language: &str) -> BuildResult<usize> {
    let config = &novel.config;
    let Some(path) = glossary_file(ctx, config, language) else {
        return Ok(0);
    };
    let terms = parse_glossary(&load_yaml(&path)?);
    if terms.is_empty() {
        return Ok(0);
    }
    let title = format!("{} - 术语表", config.display_title());
    let rel = format!("{}/{language}/glossary/", config.slug);
    let base = meta::page_vars(
        ctx,
        3,
        language,
        PageChrome {
            kind: PageKind::Site,
            novel: Some(config),
            overrides: None,
            seo: Some(&config.seo),
            title: &title,
            path: &rel,
        },
    );
    let vars = meta::with_vars(
        base,
        json!({
            "novel": config,
            "novel_slug": config.slug,
            "grouped_terms": group_terms(terms),
            "available_languages": novel.languages,
        }),
    );
    let output = ctx.render(Some(config), "glossary.html", &vars)?;
    ctx.write_html(&format!("{rel}index.html"), output)?;
    tracing::debug!("已生成术语表：{}/{language}", config.slug);
    Ok(1)
}

fn render_characters(ctx: &mut BuildContext, novel: &NovelEntry, language: &str) -> BuildResult<usize> {
    let config = &novel.config;
    let Some(path) = characters_file(ctx, &config.slug) else {
        return Ok(0);
    };
    let characters = parse_characters(&load_yaml(&path)?);
    if characters.is_empty() {
        return Ok(0);
    }

    let index_title = format!("{} - 角色", config.display_title());
    let index_path = format!("{}/{language}/characters/", config.slug);
    let base = meta::page_vars(
        ctx,
        3,
        language,
        PageChrome {
            kind: PageKind::Site,
            novel: Some(config),
            overrides: None,
            seo: Some(&config.seo),
            title: &index_title,
            path: &index_path,
        },
    );
    let vars = meta::with_vars(
        base,
        json!({ "novel": config, "novel_slug": config.slug, "characters": characters }),
    );
    let output = ctx.render(Some(config), "characters.html", &vars)?;
    ctx.write_html(&format!("{index_path}index.html"), output)?;

    for character in &characters {
        let path = format!("{index_path}{}/", character.slug);
        let base = meta::page_vars(
            ctx,
            4,
            language,
            PageChrome {
                kind: PageKind::Site,
                novel: Some(config),
                overrides: None,
                seo: Some(&config.seo),
                title: &character.name,
                path: &path,
            },
        );
        let vars = meta::with_vars(
            base,
            json!({ "novel": config, "novel_slug": config.slug, "character": character }),
        );
        let output = ctx.render(Some(config), "character_detail.html", &vars)?;
        ctx.write_html(&format!("{path}index.html"), output)?;
    }
    tracing::debug!("已生成角色页：{}/{language}（{} 个角色）", config.slug, characters.len());
    Ok(characters.len() + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildFlags;
    use crate::build::catalog::Catalog;
    use crate::test_helpers::ProjectBuilder;

    #[test]
    fn glossary_accepts_both_shapes() {
        let list: Map<String, Value> = crate::yaml::from_str(
            "terms:\n  - term: mana\n    definition: magic\n    category: magic\n  - term: Aura\n    definition: glow\n    category: magic\n",
        )
        .unwrap();
        let groups = group_terms(parse_glossary(&list));
        let magic: Vec<&str> = groups["magic"].iter().map(|t| t.term.as_str()).collect();
        assert_eq!(magic, vec!["Aura", "mana"]);

        let map: Map<String, Value> = crate::yaml::from_str("Qi: energy\n").unwrap();
        let terms = parse_glossary(&map);
        assert_eq!(terms[0].category, DEFAULT_CATEGORY);
        assert_eq!(terms[0].definition, "energy");
    }

    #[test]
    fn character_slug_falls_back_to_name() {
        let data: Map<String, Value> =
            crate::yaml::from_str("characters:\n  - name: Jane Doe\n    role: hero\n  - name: X\n    slug: mr-x\n")
                .unwrap();
        let chars = parse_characters(&data);
        assert_eq!(chars[0].slug, "jane-doe");
        assert_eq!(chars[1].slug, "mr-x");
    }

    #[test]
    fn glossary_requires_toggle_but_characters_do_not() {
        let project = ProjectBuilder::new()
            .novel("n", &["c1"])
            .chapter("n", "c1", &crate::test_helpers::chapter_md("One", ""))
            .file("content/n/glossary.yaml", "Qi: energy\n")
            .file("content/n/characters.yaml", "characters:\n  - name: Jane\n")
            .build();
        let mut ctx = project.context(BuildFlags::default().fast());
        let catalog = Catalog::load(&ctx);
        let novel = catalog.get("n").unwrap();
        assert_eq!(render_extras(&mut ctx, novel).unwrap(), 2);
        assert!(!project.build_path("n/en/glossary/index.html").exists());
        assert!(project.read_output("n/en/characters/jane/index.html").contains("Jane"));
    }
}
