use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::trimmer::ResponseTrimmer;
use crate::voice::{SttProvider, TtsProvider};
use crate::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Chatbot endpoint URL, e.g. `https://example.com/chat`
    pub endpoint: String,
    pub api_key: String,
    pub user_id: String,
    /// Replaces the built-in trimming markers when set
    pub markers: Option<Vec<String>>,
    pub voice: VoiceConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    pub stt_provider: SttProvider,
    pub stt_model: String,
    pub stt_api_key: Option<String>,
    pub tts_provider: TtsProvider,
    /// Provider default when unset
    pub tts_model: Option<String>,
    /// Provider default when unset
    pub tts_voice: Option<String>,
    pub tts_speed: f32,
    pub tts_api_key: Option<String>,
    /// Seconds to wait for speech to start before giving up on a turn
    pub listen_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stt_provider: SttProvider::Whisper,
            stt_model: "whisper-1".to_string(),
            stt_api_key: None,
            tts_provider: TtsProvider::OpenAi,
            tts_model: None,
            tts_voice: None,
            tts_speed: 1.0,
            tts_api_key: None,
            listen_timeout_secs: 5,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            user_id: String::new(),
            markers: None,
            voice: VoiceConfig::default(),
        }
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Check the values the chat cannot work without
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(Error::Config(
                "chatbot endpoint is not set (use --endpoint, CHATBOT_ENDPOINT or the config file)"
                    .to_string(),
            ));
        }
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(Error::Config(format!(
                "chatbot endpoint must be an http(s) URL, got {endpoint:?}"
            )));
        }
        Ok(())
    }

    pub fn trimmer(&self) -> ResponseTrimmer {
        match &self.markers {
            Some(markers) => ResponseTrimmer::new(markers.clone()),
            None => ResponseTrimmer::default(),
        }
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("could not determine config directory".to_string()))?;

        Ok(config_dir.join("chatbot").join("config.json"))
    }
}

impl VoiceConfig {
    pub fn tts_model(&self) -> String {
        self.tts_model
            .clone()
            .unwrap_or_else(|| self.tts_provider.default_model().to_string())
    }

    pub fn tts_voice(&self) -> String {
        self.tts_voice
            .clone()
            .unwrap_or_else(|| self.tts_provider.default_voice().to_string())
    }

    /// STT key: provider env var first, then the config file
    pub fn stt_api_key(&self) -> Option<String> {
        self.stt_api_key_from(|name| std::env::var(name).ok())
    }

    /// TTS key: provider env var first, then the config file
    pub fn tts_api_key(&self) -> Option<String> {
        self.tts_api_key_from(|name| std::env::var(name).ok())
    }

    fn stt_api_key_from(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        env(self.stt_provider.key_env_var())
            .filter(|k| !k.is_empty())
            .or_else(|| self.stt_api_key.clone())
    }

    fn tts_api_key_from(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        env(self.tts_provider.key_env_var())
            .filter(|k| !k.is_empty())
            .or_else(|| self.tts_api_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.voice.listen_timeout_secs, 5);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.endpoint = "http://localhost:5000/chat".to_string();
        config.api_key = "secret".to_string();
        config.user_id = "u-42".to_string();
        config.voice.tts_provider = TtsProvider::ElevenLabs;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"endpoint": "https://bot.example/api", "voice": {"stt_provider": "deepgram"}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.endpoint, "https://bot.example/api");
        assert_eq!(config.api_key, "");
        assert_eq!(config.voice.stt_provider, SttProvider::Deepgram);
        assert_eq!(config.voice.tts_model(), "tts-1");
        assert_eq!(config.voice.tts_voice(), "nova");
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_validate_endpoint() {
        let mut config = Config::new();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.endpoint = "localhost:5000".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.endpoint = "http://localhost:5000/chat".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_marker_override() {
        let mut config = Config::new();
        assert_eq!(config.trimmer(), ResponseTrimmer::default());

        config.markers = Some(vec!["Assistant:".to_string()]);
        assert_eq!(config.trimmer().trim("ok Assistant: more"), "ok Assistant:");
    }

    #[test]
    fn test_env_key_takes_precedence() {
        let mut voice = VoiceConfig::default();
        voice.stt_api_key = Some("from-file".to_string());

        let key = voice.stt_api_key_from(|name| {
            (name == "OPENAI_API_KEY").then(|| "from-env".to_string())
        });
        assert_eq!(key.as_deref(), Some("from-env"));

        let key = voice.stt_api_key_from(|_| None);
        assert_eq!(key.as_deref(), Some("from-file"));

        voice.tts_provider = TtsProvider::ElevenLabs;
        let key = voice.tts_api_key_from(|name| {
            (name == "ELEVENLABS_API_KEY").then(|| String::new())
        });
        assert_eq!(key, None);
    }

    #[test]
    fn test_tts_defaults_follow_provider() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"voice": {"tts_provider": "elevenlabs"}}"#).unwrap();

        let voice = Config::load_from(&path).unwrap().voice;
        assert_eq!(voice.tts_model(), "eleven_multilingual_v2");
        assert_eq!(voice.tts_voice(), "21m00Tcm4TlvDq8EAJfn");

        fs::write(
            &path,
            r#"{"voice": {"tts_provider": "elevenlabs", "tts_voice": "custom-voice"}}"#,
        )
        .unwrap();
        let voice = Config::load_from(&path).unwrap().voice;
        assert_eq!(voice.tts_voice(), "custom-voice");
        assert_eq!(voice.tts_model(), "eleven_multilingual_v2");
    }
}
