use regex::Regex;
use std::sync::OnceLock;

static SHORTCODE: OnceLock<Regex> = OnceLock::new();

/// Replaces `:shortcode:` sequences with their Unicode glyphs. Unknown
/// shortcodes pass through untouched so timestamps like `12:30:45` survive.
pub fn replace_shortcodes(text: &str) -> String {
    if !text.contains(':') {
        return text.to_string();
    }

    let re = SHORTCODE.get_or_init(|| {
        Regex::new(r":([a-zA-Z0-9_+-]+):").expect("shortcode pattern is valid")
    });

    re.replace_all(text, |caps: &regex::Captures| {
        match emojis::get_by_shortcode(&caps[1].to_ascii_lowercase()) {
            Some(emoji) => emoji.as_str().to_string(),
            None => caps[0].to_string(),
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_shortcodes_replaced() {
        assert_eq!(replace_shortcodes("hello :tada:"), "hello 🎉");
        assert_eq!(replace_shortcodes(":fire::fire:"), "🔥🔥");
    }

    #[test]
    fn test_unknown_shortcodes_untouched() {
        assert_eq!(
            replace_shortcodes("released at :notashortcode: today"),
            "released at :notashortcode: today"
        );
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(replace_shortcodes("no emoji here"), "no emoji here");
    }
}
