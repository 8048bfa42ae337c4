//! Conversation cursor and its transition table.
//!
//! The cycle is strict: registered → recommendation_sent → menu_recognized →
//! image_categorized → registered. Users without a state row are
//! unregistered and never reach this table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const NOT_UNDERSTOOD: &str = "Sorry, EatWise does not understand what you mean. Please interact with us via rich menu or flex messages.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Registered,
    RecommendationSent,
    MenuRecognized,
    ImageCategorized,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Registered => "registered",
            ConversationState::RecommendationSent => "recommendation_sent",
            ConversationState::MenuRecognized => "menu_recognized",
            ConversationState::ImageCategorized => "image_categorized",
        }
    }

    /// Apply one trigger. Anything but the single expected trigger leaves the
    /// state where it is.
    pub fn step(self, trigger: Trigger) -> Step {
        use ConversationState::*;

        match (self, trigger) {
            (Registered, Trigger::RecommendationRequest) => Step::Advance(RecommendationSent),
            (RecommendationSent, Trigger::Image { is_food: true }) => Step::Advance(MenuRecognized),
            (RecommendationSent, Trigger::Image { is_food: false }) => {
                Step::Stay(Rejection::NotFood)
            }
            (MenuRecognized, Trigger::MenuFeedback) => Step::Advance(ImageCategorized),
            (ImageCategorized, Trigger::Rating) => Step::Advance(Registered),
            // nothing is pending, so only a photo gets the "recommend first" hint
            (Registered, Trigger::MenuFeedback | Trigger::Rating | Trigger::Other) => {
                Step::Stay(Rejection::NotUnderstood)
            }
            (state, _) => Step::Stay(Rejection::OutOfOrder(state)),
        }
    }

    /// Images are only worth classifying when the cycle is waiting for one.
    pub fn awaits_image(&self) -> bool {
        matches!(self, ConversationState::RecommendationSent)
    }

    /// States that still refer to the recognized or confirmed menu.
    pub fn holds_recognized_menu(&self) -> bool {
        matches!(self, ConversationState::MenuRecognized | ConversationState::ImageCategorized)
    }

    /// Only a pending prediction has an uncategorized upload behind it.
    pub fn holds_staged_image(&self) -> bool {
        matches!(self, ConversationState::MenuRecognized)
    }

    /// What the user has to do before anything else is accepted.
    pub fn pending_step_message(&self) -> &'static str {
        match self {
            ConversationState::Registered => {
                "Please push the \"RECOMMEND\" button in the rich menu before sending your food image."
            }
            ConversationState::RecommendationSent => {
                "Please take a picture of your food to proceed further."
            }
            ConversationState::MenuRecognized => {
                "Please provide feedback on the menu prediction to proceed further."
            }
            ConversationState::ImageCategorized => "Please rate your food to proceed further.",
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(ConversationState::Registered),
            "recommendation_sent" => Ok(ConversationState::RecommendationSent),
            "menu_recognized" => Ok(ConversationState::MenuRecognized),
            "image_categorized" => Ok(ConversationState::ImageCategorized),
            other => anyhow::bail!("unknown conversation state {other:?}"),
        }
    }
}

/// Event classes the table distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    RecommendationRequest,
    Image { is_food: bool },
    /// Confirmation of the predicted menu or a correction to another one.
    MenuFeedback,
    Rating,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Advance(ConversationState),
    Stay(Rejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotFood,
    NotUnderstood,
    OutOfOrder(ConversationState),
}

impl Rejection {
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::NotFood => "EatWise cannot detect food in the image. Please try again.",
            Rejection::NotUnderstood => NOT_UNDERSTOOD,
            Rejection::OutOfOrder(state) => state.pending_step_message(),
        }
    }
}

#[cfg(test)]
mod machine_tests {
    use super::ConversationState::*;
    use super::*;

    const ALL_STATES: [ConversationState; 4] =
        [Registered, RecommendationSent, MenuRecognized, ImageCategorized];

    const ALL_TRIGGERS: [Trigger; 6] = [
        Trigger::RecommendationRequest,
        Trigger::Image { is_food: true },
        Trigger::Image { is_food: false },
        Trigger::MenuFeedback,
        Trigger::Rating,
        Trigger::Other,
    ];

    fn run(start: ConversationState, triggers: &[Trigger]) -> ConversationState {
        triggers.iter().fold(start, |s, t| match s.step(*t) {
            Step::Advance(next) => next,
            Step::Stay(_) => s,
        })
    }

    #[test]
    fn full_cycle_returns_to_registered() {
        let end = run(
            Registered,
            &[
                Trigger::RecommendationRequest,
                Trigger::Image { is_food: true },
                Trigger::MenuFeedback,
                Trigger::Rating,
            ],
        );
        assert_eq!(end, Registered);
    }

    #[test]
    fn each_state_has_exactly_one_advancing_trigger() {
        for state in ALL_STATES {
            let advancing: Vec<_> = ALL_TRIGGERS
                .iter()
                .filter(|t| matches!(state.step(**t), Step::Advance(_)))
                .collect();
            assert_eq!(advancing.len(), 1, "state {state}");
        }
    }

    #[test]
    fn no_state_can_be_skipped() {
        assert_eq!(
            Registered.step(Trigger::Image { is_food: true }),
            Step::Stay(Rejection::OutOfOrder(Registered))
        );
        assert_eq!(
            RecommendationSent.step(Trigger::Rating),
            Step::Stay(Rejection::OutOfOrder(RecommendationSent))
        );
        assert_eq!(
            MenuRecognized.step(Trigger::RecommendationRequest),
            Step::Stay(Rejection::OutOfOrder(MenuRecognized))
        );
    }

    #[test]
    fn stray_events_between_cycles_are_not_understood() {
        for trigger in [Trigger::MenuFeedback, Trigger::Rating, Trigger::Other] {
            assert_eq!(Registered.step(trigger), Step::Stay(Rejection::NotUnderstood));
        }
        assert_eq!(Rejection::NotUnderstood.message(), NOT_UNDERSTOOD);
        assert_eq!(
            RecommendationSent.step(Trigger::Other),
            Step::Stay(Rejection::OutOfOrder(RecommendationSent))
        );
    }

    #[test]
    fn non_food_image_keeps_waiting_for_a_photo() {
        assert_eq!(
            RecommendationSent.step(Trigger::Image { is_food: false }),
            Step::Stay(Rejection::NotFood)
        );
    }

    #[test]
    fn repeated_confirmation_is_ignored() {
        assert_eq!(run(ImageCategorized, &[Trigger::MenuFeedback, Trigger::MenuFeedback]), ImageCategorized);
    }

    #[test]
    fn replaying_a_sequence_is_deterministic() {
        let seq = [
            Trigger::Other,
            Trigger::RecommendationRequest,
            Trigger::Image { is_food: false },
            Trigger::RecommendationRequest,
            Trigger::Image { is_food: true },
            Trigger::Rating,
            Trigger::MenuFeedback,
        ];
        let first = run(Registered, &seq);
        let second = run(Registered, &seq);
        assert_eq!(first, second);
        assert_eq!(first, ImageCategorized);
    }

    #[test]
    fn tokens_round_trip() {
        for state in ALL_STATES {
            assert_eq!(state.as_str().parse::<ConversationState>().unwrap(), state);
        }
        assert!("unregistered".parse::<ConversationState>().is_err());
    }
}
