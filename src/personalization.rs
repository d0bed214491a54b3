//! User preferences folded into the system prompt.

use crate::llm::format::PERSONA;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationStyle {
    Formal,
    Casual,
    #[default]
    Friendly,
    Professional,
}

impl CommunicationStyle {
    pub const ALL: [CommunicationStyle; 4] = [
        CommunicationStyle::Formal,
        CommunicationStyle::Casual,
        CommunicationStyle::Friendly,
        CommunicationStyle::Professional,
    ];

    fn instruction(self) -> &'static str {
        match self {
            CommunicationStyle::Formal => "Use proper language and maintain a respectful tone.",
            CommunicationStyle::Casual => "Be relaxed and conversational in your responses.",
            CommunicationStyle::Friendly => "Be warm and approachable, using an upbeat tone.",
            CommunicationStyle::Professional => "Be clear, concise, and business-appropriate.",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiPersonality {
    #[default]
    Helpful,
    Creative,
    Analytical,
    Empathetic,
}

impl AiPersonality {
    pub const ALL: [AiPersonality; 4] = [
        AiPersonality::Helpful,
        AiPersonality::Creative,
        AiPersonality::Analytical,
        AiPersonality::Empathetic,
    ];

    fn trait_description(self) -> &'static str {
        match self {
            AiPersonality::Helpful => "focused on providing useful and practical information",
            AiPersonality::Creative => "imaginative and offering unique perspectives",
            AiPersonality::Analytical => "logical and detail-oriented in your analysis",
            AiPersonality::Empathetic => {
                "understanding and supportive of emotions and personal situations"
            }
        }
    }
}

/// Preferences the client sends with a chat request. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub interests: Vec<String>,
    #[serde(deserialize_with = "or_default")]
    pub communication_style: CommunicationStyle,
    #[serde(deserialize_with = "or_default")]
    pub ai_personality: AiPersonality,
}

/// Unrecognized values fall back to the default instead of rejecting the request.
fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_else(|error| {
        tracing::debug!(%error, "ignoring unrecognized preference value");
        T::default()
    }))
}

impl UserPreferences {
    /// The personalized part of the system prompt.
    pub fn instructions(&self) -> String {
        let mut message = String::from("You are Marcus, a personalized AI assistant");
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
            message.push_str(" for ");
            message.push_str(name);
        }
        message.push_str(". You are ");
        message.push_str(self.ai_personality.trait_description());
        message.push_str(". ");
        message.push_str(self.communication_style.instruction());

        if !self.interests.is_empty() {
            message.push_str(" Pay special attention to topics related to: ");
            message.push_str(&self.interests.join(", "));
            message.push('.');
        }

        message.push_str("\n\nAlways be helpful, accurate, and ethical in your responses.");
        message.push_str(
            "\nIf you don't know something, be honest about it rather than making up information.",
        );
        message.push_str("\nKeep responses concise but informative.");
        message
    }
}

/// System prompt for a turn: the persona, followed by personalized
/// instructions when the client sent preferences.
pub fn system_prompt(preferences: Option<&UserPreferences>) -> String {
    match preferences {
        Some(preferences) => format!("{PERSONA}\n\n{}", preferences.instructions()),
        None => PERSONA.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_preferences_means_plain_persona() {
        assert_eq!(system_prompt(None), PERSONA);
    }

    #[test]
    fn defaults_apply_to_empty_preferences() {
        let preferences: UserPreferences =
            serde_json::from_value(serde_json::json!({"theme": "dark"})).unwrap();
        assert_eq!(preferences.communication_style, CommunicationStyle::Friendly);
        assert_eq!(preferences.ai_personality, AiPersonality::Helpful);

        let text = preferences.instructions();
        assert!(text.starts_with(
            "You are Marcus, a personalized AI assistant. You are focused on providing useful and practical information."
        ));
        assert!(!text.contains("Pay special attention"));
    }

    #[test]
    fn unrecognized_style_and_personality_use_defaults() {
        let preferences: UserPreferences = serde_json::from_value(serde_json::json!({
            "communicationStyle": "witty",
            "aiPersonality": null,
        }))
        .unwrap();
        assert_eq!(preferences.communication_style, CommunicationStyle::Friendly);
        assert_eq!(preferences.ai_personality, AiPersonality::Helpful);

        let preferences: UserPreferences =
            serde_json::from_value(serde_json::json!({"communicationStyle": "casual"})).unwrap();
        assert_eq!(preferences.communication_style, CommunicationStyle::Casual);
    }

    #[test]
    fn name_and_interests_are_included() {
        let preferences: UserPreferences = serde_json::from_value(serde_json::json!({
            "name": "Sam",
            "interests": ["rust", "databases"],
            "communicationStyle": "formal",
            "aiPersonality": "analytical",
        }))
        .unwrap();

        let prompt = system_prompt(Some(&preferences));
        assert!(prompt.starts_with(PERSONA));
        assert!(prompt.contains("personalized AI assistant for Sam. You are logical"));
        assert!(prompt.contains("maintain a respectful tone."));
        assert!(prompt.contains("topics related to: rust, databases."));
        assert!(prompt.ends_with("Keep responses concise but informative."));
    }

    #[test]
    fn every_style_and_personality_has_text() {
        for style in CommunicationStyle::ALL {
            assert!(!style.instruction().is_empty());
        }
        for personality in AiPersonality::ALL {
            assert!(!personality.trait_description().is_empty());
        }
    }
}
