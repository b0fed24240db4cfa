use serde::{Deserialize, Serialize};

#[derive(Serialize, Default, Debug, Clone, PartialEq)]
pub struct TwilioMedium {}

#[derive(Serialize, Default, Debug, Clone, PartialEq)]
pub struct CallMedium {
    pub twilio: TwilioMedium,
}

/// Body of a voice-session creation request.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallConfig {
    pub system_prompt: String,
    pub model: String,
    pub voice: String,
    pub temperature: f32,
    pub first_speaker: String,
    pub medium: CallMedium,
}

impl CallConfig {
    /// Clinic defaults: a steady professional voice, low temperature, and the agent speaks first.
    pub fn with_prompt(system_prompt: String) -> Self {
        Self {
            system_prompt,
            model: "fixie-ai/ultravox".to_string(),
            voice: "Allison".to_string(),
            temperature: 0.2,
            first_speaker: "FIRST_SPEAKER_AGENT".to_string(),
            medium: CallMedium::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallResponse {
    pub join_url: String,
    #[serde(default)]
    pub call_id: Option<String>,
}
