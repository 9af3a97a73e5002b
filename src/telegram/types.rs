use serde::{Deserialize, Serialize};

/// Telegram rendering dialect. Everything this bot produces is the
/// sanitized HTML subset, but the dialect travels with each part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ParseMode {
    #[default]
    #[serde(rename = "HTML")]
    Html,
    #[serde(rename = "MarkdownV2")]
    MarkdownV2,
}

/// One dispatch-ready piece of a formatted item.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePart {
    Text {
        text: String,
        parse_mode: ParseMode,
    },
    Photo {
        photo_url: String,
        caption: String,
        parse_mode: ParseMode,
    },
    Document {
        document_url: String,
        caption: String,
        name: String,
        parse_mode: ParseMode,
    },
}

/// Numeric chat id, or an `@channel` style handle when the id does not
/// parse as an integer. Serializes to the shape the Bot API expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatTarget {
    Id(i64),
    Handle(String),
}

impl ChatTarget {
    pub fn parse(chat_id: &str) -> ChatTarget {
        match chat_id.parse::<i64>() {
            Ok(id) => ChatTarget::Id(id),
            Err(_) => ChatTarget::Handle(chat_id.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SendMessageParams<'a> {
    pub chat_id: &'a ChatTarget,
    pub text: &'a str,
    pub parse_mode: ParseMode,
}

#[derive(Debug, Serialize)]
pub struct SendPhotoParams<'a> {
    pub chat_id: &'a ChatTarget,
    pub photo: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub caption: &'a str,
    pub parse_mode: ParseMode,
}

#[derive(Debug, Serialize)]
pub struct SendDocumentParams<'a> {
    pub chat_id: &'a ChatTarget,
    pub document: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub caption: &'a str,
    pub parse_mode: ParseMode,
}

#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_target_parsing() {
        assert_eq!(ChatTarget::parse("-100123456"), ChatTarget::Id(-100123456));
        assert_eq!(
            ChatTarget::parse("@mychannel"),
            ChatTarget::Handle("@mychannel".to_string())
        );
    }

    #[test]
    fn test_chat_target_serialization() {
        let id = serde_json::to_string(&ChatTarget::Id(42)).unwrap();
        assert_eq!(id, "42");
        let handle = serde_json::to_string(&ChatTarget::Handle("@c".into())).unwrap();
        assert_eq!(handle, "\"@c\"");
    }

    #[test]
    fn test_send_message_params_shape() {
        let target = ChatTarget::Id(7);
        let params = SendMessageParams {
            chat_id: &target,
            text: "<b>hi</b>",
            parse_mode: ParseMode::Html,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["chat_id"], 7);
        assert_eq!(json["parse_mode"], "HTML");
    }
}
