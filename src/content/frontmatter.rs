use crate::content::{Document, FrontMatter};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static FRONT_MATTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---[ \t]*\r?\n(.*?)\r?\n---[ \t]*\r?\n(.*)\z").unwrap());

/// 空 Front Matter 块：`---\n---\n`
static EMPTY_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---[ \t]*\r?\n---[ \t]*\r?\n(.*)\z").unwrap());

/// 读取 Markdown 文件，分离 Front Matter 和正文
pub fn parse_file(path: &Path) -> Result<Document, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("读取 {} 失败：{}", path.display(), e))?;
    let (front_matter, body) = split(&content)?;
    Ok(Document {
        path: path.to_path_buf(),
        front_matter,
        body,
    })
}

/// 分离 Front Matter 和正文；没有 Front Matter 块时整段文本都是正文
pub fn split(content: &str) -> Result<(FrontMatter, String), String> {
    if let Some(caps) = EMPTY_BLOCK_RE.captures(content) {
        return Ok((FrontMatter::new(), caps[1].to_string()));
    }
    let Some(caps) = FRONT_MATTER_RE.captures(content) else {
        return Ok((FrontMatter::new(), content.to_string()));
    };
    // 只有注释的块解析为 null，视为空映射
    let front_matter: Option<FrontMatter> =
        serde_yaml::from_str(&caps[1]).map_err(|e| format!("Front Matter 解析失败：{e}"))?;
    Ok((front_matter.unwrap_or_default(), caps[2].to_string()))
}

/// 将 Front Matter 与正文合并为完整文件内容，与 `split` 互逆
pub fn combine(front_matter: &FrontMatter, body: &str) -> Result<String, String> {
    let mut out = String::from("---\n");
    if !front_matter.is_empty() {
        let yaml =
            serde_yaml::to_string(front_matter).map_err(|e| format!("Front Matter 序列化失败：{e}"))?;
        out.push_str(&yaml);
        if !yaml.ends_with('\n') {
            out.push('\n');
        }
    }
    out.push_str("---\n");
    out.push_str(body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn fm(value: Value) -> FrontMatter {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn split_basic() {
        let (front, body) = split("---\ntitle: Hello\ndraft: true\n---\n# Body\n\ntext\n").unwrap();
        assert_eq!(front.get("title"), Some(&json!("Hello")));
        assert_eq!(front.get("draft"), Some(&json!(true)));
        assert_eq!(body, "# Body\n\ntext\n");
    }

    #[test]
    fn split_without_front_matter() {
        let (front, body) = split("just text\n---\nmore").unwrap();
        assert!(front.is_empty());
        assert_eq!(body, "just text\n---\nmore");
    }

    #[test]
    fn split_crlf() {
        let (front, body) = split("---\r\ntitle: Win\r\n---\r\nbody\r\n").unwrap();
        assert_eq!(front.get("title"), Some(&json!("Win")));
        assert_eq!(body, "body\r\n");
    }

    #[test]
    fn split_malformed_yaml_is_an_error() {
        assert!(split("---\ntitle: [oops\n---\nbody").is_err());
    }

    #[test]
    fn round_trip_preserves_front_matter_and_body() {
        let front = fm(json!({
            "title": "Chapter 1: \"Dawn\"",
            "published": "2020-01-01",
            "draft": false,
            "tags": ["magic", "yes", "1"],
            "seo": {"allow_indexing": false, "meta_description": "a: b # c"},
            "chapter_number": 3,
            "rating": 4.5,
            "empty_list": [],
            "empty_map": {},
            "nothing": null,
            "true": "reserved key",
            "multi": "line one\nline two",
            "arcs": [{"title": "A", "chapters": [{"id": "c1"}]}],
            "next_line": "\u{85}nel",
            "separators": "a\u{2028}b\u{2029}c",
            "bom": "\u{feff}start",
            "tabbed": "\tindent",
            "big": u64::MAX,
            "spaced key": "value",
        }));
        let body = "\n# Heading\n\nSome *text*.\n\n---\n\nAfter a rule.\n";
        let written = combine(&front, body).unwrap();
        let (parsed_front, parsed_body) = split(&written).unwrap();
        assert_eq!(parsed_front, front);
        assert_eq!(parsed_body, body);
    }

    #[test]
    fn round_trip_empty_front_matter() {
        let written = combine(&FrontMatter::new(), "body\n").unwrap();
        assert_eq!(written, "---\n---\nbody\n");
        let (front, body) = split(&written).unwrap();
        assert!(front.is_empty());
        assert_eq!(body, "body\n");
    }

    #[test]
    fn comment_only_block_is_empty() {
        let (front, body) = split("---\n# nothing yet\n---\nbody").unwrap();
        assert!(front.is_empty());
        assert_eq!(body, "body");
    }

    #[test]
    fn parse_file_reads_document() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("c.md");
        std::fs::write(&path, "---\ntitle: T\n---\nbody").unwrap();
        let doc = parse_file(&path).unwrap();
        assert_eq!(doc.body, "body");
        assert_eq!(doc.path, path);
    }
}
