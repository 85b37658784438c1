use std::path::PathBuf;

use crate::quiz::DEFAULT_QUESTION_COUNT;
use crate::speech::SpeechOptions;

const APP_DIR: &str = "danci-practice";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub cursor_path: PathBuf,
    pub corpus_path: Option<PathBuf>,
    pub corpus_url: Option<String>,
    pub question_count: usize,
    pub speech: SpeechOptions,
    pub log_level: String,
    /// 为 `None` 时不写文件日志
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        let db_path = std::env::var("DANCI_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("practice.db"));

        let cursor_path = std::env::var("DANCI_CURSOR_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                db_path
                    .parent()
                    .map(|dir| dir.join("cursors.json"))
                    .unwrap_or_else(|| PathBuf::from("cursors.json"))
            });

        let corpus_path = std::env::var("DANCI_CORPUS_PATH").ok().map(PathBuf::from);
        let corpus_url = std::env::var("DANCI_CORPUS_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());

        let question_count = std::env::var("DANCI_QUESTION_COUNT")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|count| *count > 0)
            .unwrap_or(DEFAULT_QUESTION_COUNT);

        let speech = SpeechOptions {
            rate: std::env::var("DANCI_SPEECH_RATE")
                .ok()
                .and_then(|value| value.parse::<f32>().ok()),
            lang: Some(std::env::var("DANCI_SPEECH_LANG").unwrap_or_else(|_| "en-US".to_string())),
            voice_name: Some(
                std::env::var("DANCI_SPEECH_VOICE").unwrap_or_else(|_| "Samantha".to_string()),
            ),
            ..SpeechOptions::default()
        };

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_dir = env_flag("ENABLE_FILE_LOGS").then(|| {
            std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("logs"))
        });

        Self {
            db_path,
            cursor_path,
            corpus_path,
            corpus_url,
            question_count,
            speech,
            log_level,
            log_dir,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}
