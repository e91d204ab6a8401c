use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Moments at which a body may speak an ambient line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbientTrigger {
    /// Brain attached to a fresh body.
    Spawning,
    /// The body died.
    Dying,
    /// First target entered the threat table.
    Aggroing,
    /// A swing landed.
    Fighting,
    /// Started a random walk.
    Roaming,
    /// Killed its target.
    Killing,
    /// Began walking somewhere on purpose.
    Moving,
    /// A player interacted with the body.
    Interact,
    /// Noticed a player nearby.
    Seeing,
}

impl fmt::Display for AmbientTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Spawning => "spawning",
            Self::Dying => "dying",
            Self::Aggroing => "aggroing",
            Self::Fighting => "fighting",
            Self::Roaming => "roaming",
            Self::Killing => "killing",
            Self::Moving => "moving",
            Self::Interact => "interact",
            Self::Seeing => "seeing",
        };
        f.write_str(name)
    }
}

/// How an ambient line reaches players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    /// Nearby players.
    Say,
    /// Players in a wider radius.
    Yell,
    /// The whole region.
    Broadcast,
}

impl Voice {
    /// Decode a stored voice name: `b...` broadcasts, `y...` yells, anything
    /// else says.
    pub fn parse(raw: &str) -> Self {
        match raw.chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('b') => Self::Broadcast,
            Some('y') => Self::Yell,
            _ => Self::Say,
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Say => f.write_str("says"),
            Self::Yell => f.write_str("yells"),
            Self::Broadcast => f.write_str("broadcasts"),
        }
    }
}

/// One ambient line a named body may speak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbientBehaviour {
    /// Name of the bodies that speak it.
    pub source: String,
    /// When it may be spoken.
    pub trigger: AmbientTrigger,
    /// Percent chance once picked.
    #[serde(default = "always")]
    pub chance: u8,
    /// Stored voice name; see [`Voice::parse`].
    #[serde(default)]
    pub voice: String,
    /// Text with `{sourcename}`, `{targetname}` and `{controller}`
    /// placeholders.
    pub text: String,
    /// Emote played alongside; 0 for none.
    #[serde(default)]
    pub emote: u8,
}

fn always() -> u8 {
    100
}

impl AmbientBehaviour {
    /// A line with a 100% chance and the default voice.
    pub fn new(source: impl Into<String>, trigger: AmbientTrigger, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            trigger,
            chance: 100,
            voice: String::new(),
            text: text.into(),
            emote: 0,
        }
    }

    /// Set the chance.
    pub fn with_chance(mut self, chance: u8) -> Self {
        self.chance = chance.min(100);
        self
    }

    /// Set the stored voice name.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// Decoded voice.
    pub fn voice(&self) -> Voice {
        Voice::parse(&self.voice)
    }

    /// Substitute the placeholders.
    pub fn render(&self, source: &str, target: Option<&str>, controller: &str) -> String {
        self.text
            .replace("{sourcename}", source)
            .replace("{targetname}", target.unwrap_or(""))
            .replace("{controller}", controller)
    }
}

/// Pick a random line for `trigger` and roll its chance.
pub fn pick<'a, R: Rng + ?Sized>(
    lines: &'a [AmbientBehaviour],
    trigger: AmbientTrigger,
    rng: &mut R,
) -> Option<&'a AmbientBehaviour> {
    let matching: Vec<&AmbientBehaviour> =
        lines.iter().filter(|line| line.trigger == trigger).collect();
    if matching.is_empty() {
        return None;
    }
    let chosen = matching[rng.random_range(0..matching.len())];
    let roll = rng.random_range(0..100u8);
    (roll < chosen.chance).then_some(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn voice_by_first_letter() {
        assert_eq!(Voice::parse("broadcast"), Voice::Broadcast);
        assert_eq!(Voice::parse("Yell"), Voice::Yell);
        assert_eq!(Voice::parse("say"), Voice::Say);
        assert_eq!(Voice::parse(""), Voice::Say);
    }

    #[test]
    fn render_substitutes_placeholders() {
        let line = AmbientBehaviour::new(
            "Wolf",
            AmbientTrigger::Aggroing,
            "{sourcename} snarls at {targetname}, {controller}!",
        );
        assert_eq!(
            line.render("Grey Wolf", Some("Aldric"), "Mira"),
            "Grey Wolf snarls at Aldric, Mira!"
        );
        assert_eq!(line.render("Grey Wolf", None, ""), "Grey Wolf snarls at , !");
    }

    #[test]
    fn pick_only_matching_trigger() {
        let lines = vec![
            AmbientBehaviour::new("Wolf", AmbientTrigger::Dying, "whimper"),
            AmbientBehaviour::new("Wolf", AmbientTrigger::Aggroing, "growl"),
        ];
        let mut rng = StdRng::seed_from_u64(1);
        let line = pick(&lines, AmbientTrigger::Aggroing, &mut rng).unwrap();
        assert_eq!(line.text, "growl");
        assert!(pick(&lines, AmbientTrigger::Roaming, &mut rng).is_none());
    }

    #[test]
    fn zero_chance_never_fires() {
        let lines = vec![AmbientBehaviour::new("Wolf", AmbientTrigger::Seeing, "sniff").with_chance(0)];
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            assert!(pick(&lines, AmbientTrigger::Seeing, &mut rng).is_none());
        }
    }

    #[test]
    fn record_deserializes_with_defaults() {
        let line: AmbientBehaviour = serde_json::from_str(
            r#"{ "source": "Wolf", "trigger": "killing", "text": "howl", "voice": "yell" }"#,
        )
        .unwrap();
        assert_eq!(line.trigger, AmbientTrigger::Killing);
        assert_eq!(line.chance, 100);
        assert_eq!(line.voice(), Voice::Yell);
    }
}
