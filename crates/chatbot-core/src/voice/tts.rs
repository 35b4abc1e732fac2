//! Text-to-speech (TTS) processing

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// TTS provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    #[serde(rename = "openai")]
    OpenAi,
    ElevenLabs,
}

impl TtsProvider {
    /// Environment variable holding this provider's API key
    pub fn key_env_var(self) -> &'static str {
        match self {
            TtsProvider::OpenAi => "OPENAI_API_KEY",
            TtsProvider::ElevenLabs => "ELEVENLABS_API_KEY",
        }
    }

    /// Model used when the config leaves it unset
    pub fn default_model(self) -> &'static str {
        match self {
            TtsProvider::OpenAi => "tts-1",
            TtsProvider::ElevenLabs => "eleven_multilingual_v2",
        }
    }

    /// Voice used when the config leaves it unset; a premade voice id for ElevenLabs
    pub fn default_voice(self) -> &'static str {
        match self {
            TtsProvider::OpenAi => "nova",
            TtsProvider::ElevenLabs => "21m00Tcm4TlvDq8EAJfn",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            TtsProvider::OpenAi => "https://api.openai.com",
            TtsProvider::ElevenLabs => "https://api.elevenlabs.io",
        }
    }
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
    base_url: String,
}

impl TextToSpeech {
    /// Create a new TTS instance
    ///
    /// `voice` is a voice name for OpenAI and a voice id for ElevenLabs.
    /// ElevenLabs ignores `speed`.
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(
        provider: TtsProvider,
        api_key: String,
        voice: String,
        speed: f32,
        model: String,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(format!(
                "{} is required for spoken replies",
                provider.key_env_var()
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            speed,
            model,
            provider,
            base_url: provider.default_base_url().to_string(),
        })
    }

    /// Point the client at a different host (proxies, tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tracing::debug!(chars = text.len(), provider = ?self.provider, "synthesizing speech");
        match self.provider {
            TtsProvider::OpenAi => self.synthesize_openai(text).await,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text).await,
        }
    }

    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice);

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_names() {
        let json = serde_json::to_string(&TtsProvider::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
        let parsed: TtsProvider = serde_json::from_str("\"elevenlabs\"").unwrap();
        assert_eq!(parsed, TtsProvider::ElevenLabs);
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = TextToSpeech::new(
            TtsProvider::OpenAi,
            String::new(),
            "nova".to_string(),
            1.0,
            "tts-1".to_string(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
