use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::monetization::format_utc;

use super::blender::random_index;

const PLAYFUL_EMOJIS: [&str; 7] = ["😄", "😎", "🔥", "🚀", "✨", "💡", "🥳"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Serious,
    Playful,
}

impl Persona {
    pub fn as_str(self) -> &'static str {
        match self {
            Persona::Serious => "serious",
            Persona::Playful => "playful",
        }
    }

    /// Unknown names (e.g. from a custom policy file) render as `serious`.
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("playful") {
            Persona::Playful
        } else {
            Persona::Serious
        }
    }

    pub fn respond(self, prompt: &str, now: OffsetDateTime) -> String {
        let ts = format_utc(now);
        match self {
            Persona::Serious => {
                format!("[SERIOUS] {ts} :: {prompt}\nSummary: {}.", prompt.trim())
            }
            Persona::Playful => {
                let emoji = PLAYFUL_EMOJIS[random_index(PLAYFUL_EMOJIS.len())];
                format!("[PLAYFUL] {ts} {emoji}\n{prompt}\nHot take: That's fun, let's riff! {emoji}")
            }
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn unknown_names_fall_back_to_serious() {
        assert_eq!(Persona::from_name("playful"), Persona::Playful);
        assert_eq!(Persona::from_name(" PLAYFUL "), Persona::Playful);
        assert_eq!(Persona::from_name("pirate"), Persona::Serious);
    }

    #[test]
    fn serious_reply_is_deterministic() {
        let reply = Persona::Serious.respond(" ship it ", datetime!(2025-03-14 08:00:00 UTC));
        assert_eq!(
            reply,
            "[SERIOUS] 2025-03-14T08:00:00Z ::  ship it \nSummary: ship it."
        );
    }

    #[test]
    fn playful_reply_carries_prompt_and_tag() {
        let reply = Persona::Playful.respond("hello", datetime!(2025-03-14 08:00:00 UTC));
        assert!(reply.starts_with("[PLAYFUL] 2025-03-14T08:00:00Z "));
        assert!(reply.contains("\nhello\n"));
    }
}
