use regex::Regex;
use std::sync::LazyLock;

static IMG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<img([^>]*?)(/?>)").unwrap());
static HTML_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static BETWEEN_TAGS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">\s+<").unwrap());
static CSS_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static CSS_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*([{}:;,>])\s*").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// 对渲染后的 HTML 进行后处理（写入磁盘前）
pub fn apply(html: String, minify: bool) -> String {
    let html = add_lazy_loading(html);
    if minify { minify_html(&html) } else { html }
}

/// 为没有 loading 属性的 <img> 标签添加 loading="lazy"
fn add_lazy_loading(html: String) -> String {
    IMG_RE
        .replace_all(&html, |caps: &regex::Captures| {
            let attrs = &caps[1];
            let close = &caps[2];
            if attrs.contains("loading=") {
                format!("<img{attrs}{close}")
            } else {
                format!("<img loading=\"lazy\"{attrs}{close}")
            }
        })
        .into_owned()
}

/// 去掉注释和标签间空白；含 <pre>/<textarea> 的文档原样保留
pub fn minify_html(html: &str) -> String {
    if html.contains("<pre") || html.contains("<textarea") {
        return html.to_string();
    }
    let without_comments = HTML_COMMENT_RE.replace_all(html, "");
    BETWEEN_TAGS_RE
        .replace_all(&without_comments, "><")
        .trim()
        .to_string()
}

pub fn minify_css(css: &str) -> String {
    let without_comments = CSS_COMMENT_RE.replace_all(css, "");
    let collapsed = WHITESPACE_RE.replace_all(&without_comments, " ");
    CSS_SPACE_RE
        .replace_all(&collapsed, "$1")
        .trim()
        .to_string()
}

/// 只去掉空行和行首缩进，不改写语句
pub fn minify_js(js: &str) -> String {
    js.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
