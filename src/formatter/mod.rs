pub mod emoji;
pub mod sanitize;
pub mod split;

use crate::fetch::FetchedItem;
use crate::models::feed::Feed;
use crate::models::formatting_profile::FormatProfileConfig;
use crate::telegram::types::{MessagePart, ParseMode};
use handlebars::{handlebars_helper, Handlebars};
use regex::Regex;
use sanitize::{escape_html, sanitize};

/// Optional backend for publishing over-threshold items as full articles
/// (e.g. Telegraph). When none is wired, long messages fall through to
/// splitting.
#[async_trait::async_trait]
pub trait LongformPublisher: Send + Sync {
    /// Publishes the HTML and returns a public URL for it.
    async fn publish(
        &self,
        title: &str,
        html: &str,
        author: Option<&str>,
    ) -> Result<String, String>;
}

handlebars_helper!(summarize: |s: String, len: usize| truncate_chars(&s, len));
handlebars_helper!(escape_html_helper: |s: String| escape_html(&s));

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((idx, _)) => format!("{}…", &s[..idx]),
    }
}

/// Renders one feed item into dispatch-ready message parts: templates (or
/// the default layout), emoji shortcodes, HTML sanitization, author/hashtag
/// suffixes, and finally length policy.
pub struct Formatter {
    registry: Handlebars<'static>,
    longform: Option<Box<dyn LongformPublisher>>,
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter {
    pub fn new() -> Formatter {
        let mut registry = Handlebars::new();
        // Sanitization is the one escaping policy; templates emit raw HTML
        // and authors opt into escaping with the escape_html helper.
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_helper("summarize", Box::new(summarize));
        registry.register_helper("escape_html", Box::new(escape_html_helper));
        Formatter {
            registry,
            longform: None,
        }
    }

    pub fn with_longform(mut self, publisher: Box<dyn LongformPublisher>) -> Formatter {
        self.longform = Some(publisher);
        self
    }

    /// Formatting never fails a run: template or regex problems are logged
    /// and the affected step degrades to its input.
    pub async fn format(
        &self,
        item: &FetchedItem,
        feed: &Feed,
        profile: Option<&FormatProfileConfig>,
    ) -> Vec<MessagePart> {
        let default_cfg = FormatProfileConfig::default();
        let cfg = profile.unwrap_or(&default_cfg);

        let mut title = item.title.clone();
        if !cfg.omit_generic_title_regex.is_empty() && !title.is_empty() {
            match Regex::new(&cfg.omit_generic_title_regex) {
                Ok(re) => {
                    if re.is_match(&title) {
                        log::debug!("Omitting generic item title '{title}'");
                        title.clear();
                    }
                }
                Err(e) => log::warn!("Bad omit_generic_title_regex: {e}"),
            }
        }

        let raw_content = if !item.content.is_empty() {
            item.content.clone()
        } else {
            item.description.clone()
        };
        let content = emoji::replace_shortcodes(&raw_content);

        let data = serde_json::json!({
            "feed_title": feed.display_title(),
            "feed_url": feed.url,
            "item_title": title,
            "item_link": item.link,
            "item_content": content,
            "item_summary": item.description,
            "item_author": item.author.as_deref().unwrap_or_default(),
            "item_date": item
                .published_at
                .or(item.updated_at)
                .map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_default(),
            "hashtags": cfg.hashtags.join(" "),
        });

        if !cfg.title_template.is_empty() {
            match self.registry.render_template(&cfg.title_template, &data) {
                Ok(rendered) => title = rendered,
                Err(e) => log::error!("Failed to render title template: {e}"),
            }
        }

        // Sanitization runs on the assembled body so template output and
        // feed HTML pass through the same policy.
        let raw_body = if !cfg.message_template.is_empty() {
            match self.registry.render_template(&cfg.message_template, &data) {
                Ok(rendered) => rendered,
                Err(e) => {
                    log::error!("Failed to render message template: {e}");
                    content.clone()
                }
            }
        } else {
            let mut layout = String::new();
            if !title.is_empty() {
                layout.push_str(&format!("<b>{}</b>\n", escape_html(&title)));
            }
            layout.push_str(&content);
            if !item.link.is_empty() {
                layout.push_str(&format!(
                    "\n<a href=\"{}\">Read more</a>",
                    escape_html(&item.link)
                ));
            }
            layout
        };
        let mut body = sanitize(&raw_body);

        if cfg.include_author {
            if let Some(author) = item.author.as_deref().filter(|a| !a.is_empty()) {
                if !body.contains(author) {
                    body.push_str(&format!("\n\n<i>Author: {}</i>", escape_html(author)));
                }
            }
        }

        if !cfg.hashtags.is_empty() {
            let rendered: Vec<String> = cfg
                .hashtags
                .iter()
                .map(|tag| clean_hashtag(tag))
                .filter(|tag| !tag.is_empty())
                .collect();
            let already_present = rendered.iter().any(|tag| body.contains(&format!("#{tag}")));
            if !rendered.is_empty() && !already_present {
                body.push_str("\n\n");
                for tag in rendered {
                    body.push_str(&format!("#{tag} "));
                }
            }
        }

        let body = body.trim().to_string();

        if cfg.use_telegraph_threshold_chars > 0
            && body.chars().count() > cfg.use_telegraph_threshold_chars
        {
            if let Some(publisher) = &self.longform {
                match publisher.publish(&title, &body, item.author.as_deref()).await {
                    Ok(url) => {
                        return vec![MessagePart::Text {
                            text: format!("View full post: {url}"),
                            parse_mode: ParseMode::Html,
                        }]
                    }
                    Err(e) => {
                        log::error!("Long-form publish failed, falling back to splitting: {e}")
                    }
                }
            }
        }

        let mut parts = Vec::new();
        if let Some(media) = media_part(item, cfg, &title) {
            parts.push(media);
        }
        parts.extend(split::split_text(&body).into_iter().map(|text| {
            MessagePart::Text {
                text,
                parse_mode: ParseMode::Html,
            }
        }));
        parts
    }
}

fn clean_hashtag(tag: &str) -> String {
    tag.trim_start_matches('#').trim().replace(' ', "_")
}

/// At most one leading media part per item, taken from the first enclosure
/// that passes the profile's media filter.
fn media_part(item: &FetchedItem, cfg: &FormatProfileConfig, title: &str) -> Option<MessagePart> {
    if item.enclosures.is_empty() {
        return None;
    }

    let filter = if cfg.media_filter_regex.is_empty() {
        None
    } else {
        match Regex::new(&cfg.media_filter_regex) {
            Ok(re) => Some(re),
            Err(e) => {
                log::warn!("Bad media_filter_regex: {e}");
                None
            }
        }
    };

    let enclosure = item
        .enclosures
        .iter()
        .find(|e| filter.as_ref().map_or(true, |re| re.is_match(&e.url)))?;

    let caption = escape_html(title);
    let is_image = enclosure
        .mime_type
        .as_deref()
        .map_or(false, |m| m.starts_with("image/"));

    if is_image {
        Some(MessagePart::Photo {
            photo_url: enclosure.url.clone(),
            caption,
            parse_mode: ParseMode::Html,
        })
    } else {
        let name = enclosure
            .url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Some(MessagePart::Document {
            document_url: enclosure.url.clone(),
            caption,
            name,
            parse_mode: ParseMode::Html,
        })
    }
}
