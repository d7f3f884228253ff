use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What the engine can spontaneously do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Think,
    Browse,
    Journal,
    Create,
    SelfCode,
    CodeReview,
    Reflect,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 7] = [
        ActivityKind::Think,
        ActivityKind::Browse,
        ActivityKind::Journal,
        ActivityKind::Create,
        ActivityKind::SelfCode,
        ActivityKind::CodeReview,
        ActivityKind::Reflect,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ActivityKind::Think => "think",
            ActivityKind::Browse => "browse",
            ActivityKind::Journal => "journal",
            ActivityKind::Create => "create",
            ActivityKind::SelfCode => "self_code",
            ActivityKind::CodeReview => "code_review",
            ActivityKind::Reflect => "reflect",
        }
    }

    /// Minimum spacing between runs of the same kind.
    pub fn cooldown(&self) -> Duration {
        match self {
            ActivityKind::Journal => Duration::from_secs(4 * 3600),
            ActivityKind::SelfCode => Duration::from_secs(2 * 3600),
            ActivityKind::CodeReview => Duration::from_secs(4 * 3600),
            ActivityKind::Reflect => Duration::from_secs(4 * 3600),
            _ => Duration::ZERO,
        }
    }

    /// The synthetic user message injected for this activity.
    pub fn prompt(&self) -> &'static str {
        match self {
            ActivityKind::Think => {
                "Take a quiet moment. What has been on your mind lately? \
                 Think it through and keep a short note of anything worth remembering."
            }
            ActivityKind::Browse => {
                "Spend a little time reading about something you are curious \
                 about right now, and summarize what you learned."
            }
            ActivityKind::Journal => {
                "Write today's journal entry: what happened, how it went, \
                 and what you want to do differently."
            }
            ActivityKind::Create => {
                "Make something small: a sketch of an idea, a short text, a \
                 concept worth sharing later."
            }
            ActivityKind::SelfCode => {
                "Look at your own backlog of improvements and work on the \
                 most valuable one."
            }
            ActivityKind::CodeReview => {
                "Review your recent changes with fresh eyes and note \
                 anything that should be fixed or simplified."
            }
            ActivityKind::Reflect => {
                "Step back and reflect: what patterns do you notice in the \
                 recent conversations and work? What lessons follow?"
            }
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ActivityKind::ALL
            .iter()
            .find(|k| k.label() == s)
            .copied()
            .ok_or_else(|| format!("unknown activity kind: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for kind in ActivityKind::ALL {
            let parsed: ActivityKind = kind.label().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("nap".parse::<ActivityKind>().is_err());
    }

    #[test]
    fn cooldowns_match_policy() {
        assert_eq!(ActivityKind::Journal.cooldown(), Duration::from_secs(14_400));
        assert_eq!(ActivityKind::SelfCode.cooldown(), Duration::from_secs(7200));
        assert_eq!(ActivityKind::Think.cooldown(), Duration::ZERO);
    }
}
