/// Telegram rejects text payloads over 4096 characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// How far below the hard limit we are willing to move a split point to land
/// just after a `>` instead of mid-text.
const TAG_CLOSE_WINDOW: usize = 256;

/// Splits an HTML message into chunks of at most [`MAX_MESSAGE_CHARS`]
/// characters whose concatenation equals the input. A cut never lands inside
/// `<...>`; when a tag closes within the last [`TAG_CLOSE_WINDOW`] characters
/// of the limit the cut is placed right after it.
pub fn split_text(text: &str) -> Vec<String> {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    let mut parts = Vec::new();
    let mut rest = &chars[..];

    while rest.len() > MAX_MESSAGE_CHARS {
        let cut = split_point(rest);
        parts.push(rest[..cut].iter().collect());
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        parts.push(rest.iter().collect());
    }

    log::warn!(
        "Message split into {} parts ({} chars total)",
        parts.len(),
        chars.len()
    );
    parts
}

/// `chars` is known to exceed the limit; each position is a cut candidate
/// when it is not inside an angle-bracket run.
fn split_point(chars: &[char]) -> usize {
    let mut in_tag = false;
    let mut last_outside_tag = 0;
    let mut last_tag_close = 0;

    for (i, c) in chars.iter().take(MAX_MESSAGE_CHARS).enumerate() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                last_tag_close = i + 1;
            }
            _ => {}
        }
        if !in_tag {
            last_outside_tag = i + 1;
        }
    }

    if last_tag_close >= MAX_MESSAGE_CHARS.saturating_sub(TAG_CLOSE_WINDOW) {
        last_tag_close
    } else if last_outside_tag > 0 {
        last_outside_tag
    } else {
        // A single pseudo-tag longer than the limit; nothing sane to do but
        // hard-cut.
        MAX_MESSAGE_CHARS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_part() {
        let parts = split_text("hello");
        assert_eq!(parts, vec!["hello".to_string()]);
    }

    #[test]
    fn test_oversized_text_splits_and_reassembles() {
        let original: String = "abcdefghij".repeat(1000); // 10_000 chars
        let parts = split_text(&original);

        assert!(parts.len() >= 3);
        for part in &parts {
            assert!(part.chars().count() <= MAX_MESSAGE_CHARS);
        }
        assert_eq!(parts.concat(), original);
    }

    #[test]
    fn test_split_never_lands_inside_a_tag() {
        // Place a long href-bearing tag straddling the 4096 boundary.
        let mut text = "x".repeat(MAX_MESSAGE_CHARS - 20);
        text.push_str(r#"<a href="https://example.com/long/path/segment">link</a>"#);
        text.push_str(&"y".repeat(500));

        let parts = split_text(&text);
        assert!(parts.len() >= 2);
        for part in &parts {
            let opens = part.matches('<').count();
            let closes = part.matches('>').count();
            assert_eq!(opens, closes, "unbalanced angle brackets in {part:?}");
        }
        assert_eq!(parts.concat(), text);
    }

    #[test]
    fn test_prefers_tag_close_near_limit() {
        let prefix = "a".repeat(MAX_MESSAGE_CHARS - 100);
        let text = format!("{prefix}<b>bold</b>{}", "b".repeat(600));

        let parts = split_text(&text);
        // First part ends right after </b>, not at the raw 4096 boundary.
        assert!(parts[0].ends_with("</b>"));
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let original = "é".repeat(5000);
        let parts = split_text(&original);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].chars().count(), MAX_MESSAGE_CHARS);
        assert_eq!(parts.concat(), original);
    }
}
