use crate::errors::AppResult;
use crate::schema::*;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Recognized per-feed formatting options. Stored as JSON in
/// `formatting_profiles.config_json`; unknown keys are rejected at parse
/// time so typos surface when a profile is created, not when it is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatProfileConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title_template: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message_template: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hashtags: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_author: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub omit_generic_title_regex: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub use_telegraph_threshold_chars: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub replace_emoji_images_with_alt: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub media_filter_regex: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub media_filter_css_selector: String,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

#[derive(Debug, Serialize, Queryable, Identifiable, PartialEq, Clone)]
#[diesel(table_name = formatting_profiles)]
pub struct FormattingProfile {
    pub id: i32,
    pub name: String,
    pub config_json: String,
    pub created_at: i32,
    pub updated_at: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = formatting_profiles)]
pub struct NewFormattingProfile<'a> {
    pub name: &'a str,
    pub config_json: &'a str,
}

impl<'a> NewFormattingProfile<'a> {
    pub fn insert(&self, conn: &mut SqliteConnection) -> AppResult<FormattingProfile> {
        use crate::schema::formatting_profiles::dsl::*;
        let profile = diesel::insert_into(formatting_profiles)
            .values(self)
            .get_result(conn)?;
        Ok(profile)
    }
}

impl FormattingProfile {
    pub fn get_by_id(conn: &mut SqliteConnection, profile_id: i32) -> AppResult<Option<FormattingProfile>> {
        use crate::schema::formatting_profiles::dsl::*;
        let profile = formatting_profiles
            .find(profile_id)
            .first::<FormattingProfile>(conn)
            .optional()?;
        Ok(profile)
    }

    pub fn get_all(conn: &mut SqliteConnection) -> AppResult<Vec<FormattingProfile>> {
        use crate::schema::formatting_profiles::dsl::*;
        let found = formatting_profiles.order(name.asc()).load(conn)?;
        Ok(found)
    }

    pub fn config(&self) -> AppResult<FormatProfileConfig> {
        if self.config_json.is_empty() {
            return Ok(FormatProfileConfig::default());
        }
        let cfg = serde_json::from_str(&self.config_json)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::get_test_db_connection;

    #[test]
    fn test_config_json_round_trip() {
        let cfg = FormatProfileConfig {
            title_template: "{{item_title}}".into(),
            hashtags: vec!["news".into(), "rust lang".into()],
            include_author: true,
            use_telegraph_threshold_chars: 3000,
            ..Default::default()
        };

        let json = serde_json::to_string(&cfg).unwrap();
        let back: FormatProfileConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn test_empty_json_omits_defaults() {
        let json = serde_json::to_string(&FormatProfileConfig::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let parsed: Result<FormatProfileConfig, _> = serde_json::from_str(r#"{"titel": "x"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_stored_profile_parses() {
        let mut conn = get_test_db_connection();
        let profile = NewFormattingProfile {
            name: "compact",
            config_json: r#"{"include_author": true, "hashtags": ["dev"]}"#,
        }
        .insert(&mut conn)
        .unwrap();

        let cfg = profile.config().unwrap();
        assert!(cfg.include_author);
        assert_eq!(cfg.hashtags, vec!["dev"]);
    }
}
