//! 内置模板与样式：项目没有提供同名文件时使用

pub const DEFAULT_STYLE: &str = include_str!("../../defaults/static/style.css");

pub const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../defaults/templates/base.html")),
    ("protected.html", include_str!("../../defaults/templates/protected.html")),
    ("index.html", include_str!("../../defaults/templates/index.html")),
    ("page.html", include_str!("../../defaults/templates/page.html")),
    ("page_index.html", include_str!("../../defaults/templates/page_index.html")),
    ("toc.html", include_str!("../../defaults/templates/toc.html")),
    ("chapter.html", include_str!("../../defaults/templates/chapter.html")),
    ("tags_index.html", include_str!("../../defaults/templates/tags_index.html")),
    ("tag_page.html", include_str!("../../defaults/templates/tag_page.html")),
    ("glossary.html", include_str!("../../defaults/templates/glossary.html")),
    ("characters.html", include_str!("../../defaults/templates/characters.html")),
    ("character_detail.html", include_str!("../../defaults/templates/character_detail.html")),
    ("authors.html", include_str!("../../defaults/templates/authors.html")),
    ("author.html", include_str!("../../defaults/templates/author.html")),
    ("search.html", include_str!("../../defaults/templates/search.html")),
];

pub fn builtin(name: &str) -> Option<&'static str> {
    BUILTIN_TEMPLATES
        .iter()
        .find(|(builtin_name, _)| *builtin_name == name)
        .map(|(_, source)| *source)
}
