use regex::{Captures, Regex};
use std::sync::LazyLock;

static EXTRA_NEWLINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

static MD_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"!\[([^\]]*)\]\(([^)\s]+)(?:\s+"([^"]*)")?\)"#).unwrap()
});

static HTML_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)(<img\s+[^>]*?src\s*=\s*["'])([^"']+)(["'][^>]*>)"#).unwrap());

/// 解析 Markdown 为 HTML
///
/// 单个换行渲染为 `<br />`，连续三个以上换行在段落之间保留额外的空行。
pub fn render_markdown(source: &str) -> String {
    use pulldown_cmark::{Event, Options, Parser, html};

    let preserved = preserve_extra_breaks(source);

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

    let parser = Parser::new_ext(&preserved, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });

    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);
    html_output
}

fn preserve_extra_breaks(source: &str) -> String {
    let normalized = source.replace("\r\n", "\n");
    EXTRA_NEWLINES_RE
        .replace_all(&normalized, |caps: &Captures| {
            let extra = caps[0].len() - 2;
            format!("\n\n{}\n", "<br>".repeat(extra))
        })
        .into_owned()
}

/// 正文中引用的本地图片
#[derive(Debug, Clone, PartialEq)]
pub struct LocalImage {
    pub original_path: String,
}

/// 提取 Markdown 与 `<img>` 标签中的本地图片（跳过 http(s)、data: 与绝对路径）
pub fn extract_local_images(source: &str) -> Vec<LocalImage> {
    let mut images: Vec<LocalImage> = Vec::new();
    let candidates = MD_IMAGE_RE
        .captures_iter(source)
        .map(|caps| caps[2].to_string())
        .chain(HTML_IMAGE_RE.captures_iter(source).map(|caps| caps[2].to_string()));
    for path in candidates {
        if is_local_reference(&path) && !images.iter().any(|i| i.original_path == path) {
            images.push(LocalImage {
                original_path: path,
            });
        }
    }
    images
}

/// 将本地图片引用改写为 `new_path(original)` 的返回值
pub fn rewrite_local_images(source: &str, new_path: impl Fn(&str) -> Option<String>) -> String {
    let step = MD_IMAGE_RE.replace_all(source, |caps: &Captures| {
        let path = &caps[2];
        match new_path(path).filter(|_| is_local_reference(path)) {
            Some(replacement) => match caps.get(3) {
                Some(title) => format!("![{}]({} \"{}\")", &caps[1], replacement, title.as_str()),
                None => format!("![{}]({})", &caps[1], replacement),
            },
            None => caps[0].to_string(),
        }
    });
    HTML_IMAGE_RE
        .replace_all(&step, |caps: &Captures| {
            let path = &caps[2];
            match new_path(path).filter(|_| is_local_reference(path)) {
                Some(replacement) => format!("{}{}{}", &caps[1], replacement, &caps[3]),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn is_local_reference(path: &str) -> bool {
    !(path.starts_with("http://")
        || path.starts_with("https://")
        || path.starts_with("data:")
        || path.starts_with('/')
        || path.starts_with("//"))
}

/// 统计字数（中文按字计算，英文按空格分词）
pub fn count_words(text: &str) -> u32 {
    let mut count: u32 = 0;
    let mut in_ascii_word = false;

    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() || (in_ascii_word && (ch == '\'' || ch == '-')) {
            if !in_ascii_word {
                count += 1;
                in_ascii_word = true;
            }
        } else if is_cjk(ch) {
            count += 1;
            in_ascii_word = false;
        } else if ch.is_alphabetic() {
            // 其它字母文字按连续片段计为一个词
            if !in_ascii_word {
                count += 1;
                in_ascii_word = true;
            }
        } else {
            in_ascii_word = false;
        }
    }

    count
}

fn is_cjk(ch: char) -> bool {
    // CJK 统一汉字基本区、扩展 A、兼容汉字，以及假名
    ('\u{4E00}'..='\u{9FFF}').contains(&ch)
        || ('\u{3400}'..='\u{4DBF}').contains(&ch)
        || ('\u{F900}'..='\u{FAFF}').contains(&ch)
        || ('\u{3040}'..='\u{30FF}').contains(&ch)
}

/// 计算预估阅读时间（分钟）
pub fn reading_time(word_count: u32) -> u32 {
    (word_count / 200).max(1)
}
