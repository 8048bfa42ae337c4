use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;

use super::dto::EventPayload;
use crate::conversation::machine::Trigger;

pub const RECOMMEND_TEXT: &str = "Give me food recommendations.";
pub const SUMMARY_TEXT: &str = "Give me a nutrition summary.";

lazy_static! {
    static ref CORRECTION: Option<Regex> = Regex::new(r"^The correct menu is\s*\n\s*(.+?)\.?\s*$").ok();
}

/// What the user asked for, independent of where they are in the cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RequestRecommendation,
    NutritionSummary,
    Correct { menu_name: String },
    Image { body: Bytes, content_type: String },
    Confirm { menu_id: i64 },
    Rate { rating: i32, menu_id: Option<i64> },
    Unknown,
}

impl Command {
    pub fn parse(payload: EventPayload) -> Self {
        match payload {
            EventPayload::Text { text } => Self::parse_text(&text),
            EventPayload::Image { image, content_type } => Command::Image {
                body: Bytes::from(image.into_vec()),
                content_type: content_type.unwrap_or_else(|| "image/jpeg".into()),
            },
            EventPayload::Postback { data } => match (data.rating, data.menu_id) {
                (Some(rating), menu_id) => Command::Rate { rating, menu_id },
                (None, Some(menu_id)) => Command::Confirm { menu_id },
                (None, None) => Command::Unknown,
            },
        }
    }

    fn parse_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed == RECOMMEND_TEXT {
            return Command::RequestRecommendation;
        }
        if trimmed == SUMMARY_TEXT {
            return Command::NutritionSummary;
        }
        match CORRECTION.as_ref().and_then(|re| re.captures(trimmed)) {
            Some(c) => Command::Correct { menu_name: c[1].trim().to_string() },
            None => Command::Unknown,
        }
    }

    /// Table trigger for this command. Images carry the classifier verdict,
    /// which is only computed while a photo is expected.
    pub fn trigger(&self, is_food: bool) -> Trigger {
        match self {
            Command::RequestRecommendation => Trigger::RecommendationRequest,
            Command::Image { .. } => Trigger::Image { is_food },
            Command::Correct { .. } | Command::Confirm { .. } => Trigger::MenuFeedback,
            Command::Rate { .. } => Trigger::Rating,
            Command::NutritionSummary | Command::Unknown => Trigger::Other,
        }
    }
}

#[cfg(test)]
mod command_tests {
    use super::*;
    use crate::bot::dto::PostbackData;
    use serde_bytes::ByteBuf;

    fn text(s: &str) -> Command {
        Command::parse(EventPayload::Text { text: s.into() })
    }

    #[test]
    fn fixed_phrases() {
        assert_eq!(text("Give me food recommendations."), Command::RequestRecommendation);
        assert_eq!(text("  Give me a nutrition summary.\n"), Command::NutritionSummary);
        assert_eq!(text("give me food"), Command::Unknown);
    }

    #[test]
    fn correction_takes_the_second_line() {
        assert_eq!(
            text("The correct menu is\nPad Kra Pao."),
            Command::Correct { menu_name: "Pad Kra Pao".into() }
        );
        assert_eq!(
            text("The correct menu is\nKhao Man Gai"),
            Command::Correct { menu_name: "Khao Man Gai".into() }
        );
        assert_eq!(text("The correct menu is"), Command::Unknown);
    }

    #[test]
    fn postbacks() {
        let confirm = Command::parse(EventPayload::Postback {
            data: PostbackData { menu_id: Some(4), rating: None },
        });
        assert_eq!(confirm, Command::Confirm { menu_id: 4 });
        assert_eq!(confirm.trigger(false), Trigger::MenuFeedback);

        let rate = Command::parse(EventPayload::Postback {
            data: PostbackData { menu_id: Some(4), rating: Some(5) },
        });
        assert_eq!(rate, Command::Rate { rating: 5, menu_id: Some(4) });
        assert_eq!(rate.trigger(false), Trigger::Rating);

        let empty = Command::parse(EventPayload::Postback { data: PostbackData::default() });
        assert_eq!(empty, Command::Unknown);
    }

    #[test]
    fn images_default_to_jpeg() {
        let cmd = Command::parse(EventPayload::Image {
            image: ByteBuf::from(vec![1, 2, 3]),
            content_type: None,
        });
        assert_eq!(
            cmd,
            Command::Image { body: Bytes::from_static(&[1, 2, 3]), content_type: "image/jpeg".into() }
        );
        assert_eq!(cmd.trigger(true), Trigger::Image { is_food: true });
    }
}
