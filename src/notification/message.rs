//! Discord webhook 消息结构

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// 错误 / 失败
pub const COLOR_RED: u32 = 0xFF0000;
/// 警告
pub const COLOR_YELLOW: u32 = 0xFFFF00;
/// 成功 / 晚报
pub const COLOR_GREEN: u32 = 0x00FF00;
/// 信息 / 提交
pub const COLOR_BLUE: u32 = 0x0099FF;
pub const COLOR_PURPLE: u32 = 0x9966CC;
/// 即时提醒
pub const COLOR_ORANGE: u32 = 0xFF9900;
/// 早报
pub const COLOR_MORNING: u32 = 0xFFAA00;

/// Discord 单个 field value 的长度上限（字符数）
pub const FIELD_VALUE_LIMIT: usize = 1024;
/// Discord embed 标题长度上限
pub const TITLE_LIMIT: usize = 256;
/// Discord 单个 embed 所有文本加起来的上限
pub const EMBED_TOTAL_LIMIT: usize = 6000;

/// Webhook 请求体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscordMessage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

impl DiscordMessage {
    /// 纯文本消息
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            embeds: Vec::new(),
        }
    }

    /// 单个 embed 的消息
    pub fn embed(embed: Embed) -> Self {
        Self {
            content: String::new(),
            embeds: vec![embed],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub color: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<Footer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

impl Embed {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: truncate(&title.into(), TITLE_LIMIT),
            color,
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// RFC 3339 时间戳
    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at.to_rfc3339_opts(SecondsFormat::Secs, true));
        self
    }

    pub fn with_footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(Footer { text: text.into() });
        self
    }

    pub fn with_author(mut self, name: impl Into<String>, icon_url: impl Into<String>) -> Self {
        self.author = Some(Author {
            name: name.into(),
            icon_url: icon_url.into(),
        });
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// 计入 Discord 总长度限制的字符数
    pub fn char_count(&self) -> usize {
        let footer = self.footer.as_ref().map_or(0, |f| f.text.chars().count());
        let author = self.author.as_ref().map_or(0, |a| a.name.chars().count());
        let fields: usize = self
            .fields
            .iter()
            .map(|f| f.name.chars().count() + f.value.chars().count())
            .sum();
        self.title.chars().count() + self.description.chars().count() + footer + author + fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Footer {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inline: bool,
}

impl Field {
    /// 创建 field，value 超长时截断
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: truncate(&value.into(), FIELD_VALUE_LIMIT),
            inline: false,
        }
    }

    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// 按字符截断，超长时以 `...` 结尾
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_text_message_omits_embeds() {
        let json = serde_json::to_value(DiscordMessage::text("hello")).unwrap();
        assert_eq!(json, serde_json::json!({"content": "hello"}));
    }

    #[test]
    fn test_embed_serialization_skips_empty_parts() {
        let at = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let embed = Embed::new("Title", COLOR_BLUE)
            .with_timestamp(at)
            .with_footer("GitHub Notifier")
            .with_field(Field::new("a", "b"))
            .with_field(Field::new("c", "d").inline());
        let json = serde_json::to_value(DiscordMessage::embed(embed)).unwrap();

        let embed = &json["embeds"][0];
        assert_eq!(embed["title"], "Title");
        assert_eq!(embed["color"], 0x0099FF);
        assert_eq!(embed["timestamp"], "2025-03-10T09:00:00Z");
        assert_eq!(embed["footer"]["text"], "GitHub Notifier");
        assert!(embed.get("description").is_none());
        assert!(embed.get("author").is_none());
        assert!(embed["fields"][0].get("inline").is_none());
        assert_eq!(embed["fields"][1]["inline"], true);
        assert!(json.get("content").is_none());
    }

    #[test]
    fn test_char_count_covers_all_text() {
        let embed = Embed::new("abc", COLOR_RED)
            .with_description("de")
            .with_footer("f")
            .with_author("gh", "")
            .with_field(Field::new("ij", "klm"));
        assert_eq!(embed.char_count(), 13);
    }

    #[test]
    fn test_field_value_truncated_to_limit() {
        let field = Field::new("long", "x".repeat(2000));
        assert_eq!(field.value.chars().count(), FIELD_VALUE_LIMIT);
        assert!(field.value.ends_with("..."));
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        // 多字节字符不能从中间截断
        let s = "🚨".repeat(10);
        assert_eq!(truncate(&s, 10), s);
        let cut = truncate(&s, 5);
        assert_eq!(cut, "🚨🚨...");
    }
}
