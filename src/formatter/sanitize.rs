use ammonia::Builder;
use std::collections::{HashMap, HashSet};

/// Reduces arbitrary feed HTML to the subset Telegram renders. Anything
/// outside the allowlist is stripped to its text content; `class` survives
/// only as `language-*` on code blocks and `tg-spoiler` on spans. Runs after
/// template expansion and emoji replacement so user-authored template output
/// is covered too.
pub fn sanitize(html: &str) -> String {
    let tags: HashSet<&str> = [
        "b",
        "strong",
        "i",
        "em",
        "u",
        "s",
        "strike",
        "del",
        "code",
        "pre",
        "span",
        "tg-spoiler",
        "a",
    ]
    .into_iter()
    .collect();

    let mut tag_attributes: HashMap<&str, HashSet<&str>> = HashMap::new();
    tag_attributes.insert("a", ["href"].into_iter().collect());
    tag_attributes.insert("code", ["class"].into_iter().collect());
    tag_attributes.insert("span", ["class"].into_iter().collect());

    Builder::default()
        .tags(tags)
        .generic_attributes(HashSet::new())
        .tag_attributes(tag_attributes)
        .link_rel(None)
        .url_schemes(["http", "https", "tg", "mailto"].into_iter().collect())
        .attribute_filter(|element, attribute, value| match (element, attribute) {
            ("code", "class") if value.starts_with("language-") => Some(value.into()),
            ("span", "class") if value == "tg-spoiler" => Some(value.into()),
            ("code", "class") | ("span", "class") => None,
            _ => Some(value.into()),
        })
        .clean(html)
        .to_string()
}

/// Escapes text for embedding in Telegram HTML (titles, author names, href
/// values). Quotes are covered so escaped text is safe inside attributes.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disallowed_tags_stripped() {
        let dirty = "<p>hello <script>alert(1)</script><b>bold</b></p>";
        let clean = sanitize(dirty);
        assert_eq!(clean, "hello <b>bold</b>");
    }

    #[test]
    fn test_links_keep_href_only() {
        let dirty = r#"<a href="https://example.com/x" target="_blank" onclick="x()">go</a>"#;
        let clean = sanitize(dirty);
        assert_eq!(clean, r#"<a href="https://example.com/x">go</a>"#);
    }

    #[test]
    fn test_javascript_urls_removed() {
        let dirty = r#"<a href="javascript:alert(1)">go</a>"#;
        let clean = sanitize(dirty);
        assert!(!clean.contains("javascript"));
    }

    #[test]
    fn test_code_language_class_kept() {
        let dirty = r#"<pre><code class="language-rust">let x = 1;</code></pre>"#;
        assert_eq!(sanitize(dirty), dirty);

        let other = r#"<code class="highlight">x</code>"#;
        assert_eq!(sanitize(other), "<code>x</code>");
    }

    #[test]
    fn test_spoiler_span_kept() {
        let dirty = r#"<span class="tg-spoiler">secret</span><span class="big">plain</span>"#;
        assert_eq!(
            sanitize(dirty),
            r#"<span class="tg-spoiler">secret</span><span>plain</span>"#
        );
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"a<b>&c"d'e"#),
            "a&lt;b&gt;&amp;c&quot;d&#39;e"
        );
    }
}
