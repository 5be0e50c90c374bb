/// 从 HTML 内容中提取纯文本摘要，尽量在句末截断
pub fn extract_excerpt(html: &str, max_chars: usize) -> String {
    let plain = strip_html_tags(html);
    let plain = plain.trim();

    let chars: Vec<char> = plain.chars().collect();
    if chars.len() <= max_chars {
        return plain.to_string();
    }

    let mut end = max_chars;
    for i in (max_chars.saturating_sub(30)..max_chars).rev() {
        if matches!(chars[i], '。' | '？' | '！' | '.' | '?' | '!') {
            end = i + 1;
            break;
        }
    }

    let mut excerpt: String = chars[..end].iter().collect();
    excerpt.push('…');
    excerpt
}

/// 截断到指定字符数，不追加省略号（搜索索引使用）
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// 去除 HTML 标签，保留纯文本并压缩空白
pub fn strip_html_tags(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut in_entity = false;
    let mut entity = String::new();

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                // 标签两侧视为空白，避免 <p>a</p><p>b</p> 粘连成 ab
                result.push(' ');
            }
            '>' if in_tag => in_tag = false,
            '&' if !in_tag => {
                in_entity = true;
                entity.clear();
                entity.push(ch);
            }
            ';' if in_entity => {
                in_entity = false;
                entity.push(ch);
                match entity.as_str() {
                    "&amp;" => result.push('&'),
                    "&lt;" => result.push('<'),
                    "&gt;" => result.push('>'),
                    "&quot;" => result.push('"'),
                    "&#39;" | "&apos;" => result.push('\''),
                    "&nbsp;" => result.push(' '),
                    _ => result.push_str(&entity),
                }
            }
            c if in_entity && (c.is_whitespace() || entity.len() > 10) => {
                // 不是实体，原样输出
                in_entity = false;
                result.push_str(&entity);
                result.push(c);
            }
            _ if in_entity => entity.push(ch),
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    if in_entity {
        result.push_str(&entity);
    }

    let mut compressed = String::with_capacity(result.len());
    let mut last_was_space = true;
    for ch in result.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                compressed.push(' ');
                last_was_space = true;
            }
        } else {
            compressed.push(ch);
            last_was_space = false;
        }
    }

    compressed.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_entities() {
        assert_eq!(
            strip_html_tags("<p>Tom &amp; Jerry</p><p>run&nbsp;fast</p>"),
            "Tom & Jerry run fast"
        );
    }

    #[test]
    fn bare_ampersand_survives() {
        assert_eq!(strip_html_tags("<p>a & b</p>"), "a & b");
    }

    #[test]
    fn excerpt_cuts_at_sentence() {
        let html = "<p>First sentence. Second sentence goes on and on.</p>";
        let ex = extract_excerpt(html, 30);
        assert_eq!(ex, "First sentence.…");
    }

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(extract_excerpt("<p>short</p>", 100), "short");
        assert_eq!(truncate_chars("你好世界", 2), "你好");
    }
}
