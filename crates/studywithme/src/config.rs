// studywithme/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::profile::{Persona, SUPPORTED_LANGUAGES};
use crate::session::SessionSettings;

pub const STORAGE_FILE_NAME: &str = "studywithme.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub request_timeout_seconds: u64,
    pub quiz_seconds: u32,
    pub data_dir: PathBuf,
    pub persona: Persona,
    pub language: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let request_timeout_seconds: u64 = env::var("STUDYWITHME_REQUEST_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .context("STUDYWITHME_REQUEST_TIMEOUT_SECONDS must be a whole number of seconds")?;
        let quiz_seconds: u32 = env::var("STUDYWITHME_QUIZ_SECONDS")
            .unwrap_or_else(|_| "20".into())
            .parse()
            .context("STUDYWITHME_QUIZ_SECONDS must be a whole number of seconds")?;
        let persona: Persona = env::var("STUDYWITHME_PERSONA")
            .unwrap_or_else(|_| "friendly".into())
            .parse()
            .context("Invalid STUDYWITHME_PERSONA")?;

        let config = Self {
            backend_url: env::var("STUDYWITHME_BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:8000".into()),
            request_timeout_seconds,
            quiz_seconds,
            data_dir: env::var("STUDYWITHME_DATA_DIR")
                .unwrap_or_else(|_| "./data".into())
                .into(),
            persona,
            language: env::var("STUDYWITHME_LANGUAGE").unwrap_or_else(|_| "en".into()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("STUDYWITHME_REQUEST_TIMEOUT_SECONDS must be greater than zero"));
        }
        if self.quiz_seconds == 0 {
            return Err(anyhow::anyhow!("STUDYWITHME_QUIZ_SECONDS must be greater than zero"));
        }
        if !SUPPORTED_LANGUAGES.contains(&self.language.as_str()) {
            warn!(
                "Language '{}' is not one of {:?}; the backend may fall back to English",
                self.language, SUPPORTED_LANGUAGES
            );
        }
        Ok(())
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Backend URL: {}", self.backend_url);
        info!("- Request Timeout: {}s", self.request_timeout_seconds);
        info!("- Quiz Timer: {}s per question", self.quiz_seconds);
        info!("- Data Directory: {}", self.data_dir.display());
        info!("- Persona: {}", self.persona);
        info!("- Language: {}", self.language);
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join(STORAGE_FILE_NAME)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            seconds_per_question: self.quiz_seconds,
            persona: self.persona,
            language: self.language.clone(),
            ..SessionSettings::default()
        }
    }
}
