use danci_practice::config::Config;
use danci_practice::corpus::{Corpus, CorpusError};
use danci_practice::logging::init_tracing;
use danci_practice::quiz::{format_definition, QuizRun};
use danci_practice::speech::{LoggingEngine, SpeechSession};
use danci_practice::storage::Partition;
use danci_practice::{AppResult, SessionCache};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config);

    let corpus = match load_corpus(&config).await {
        Ok(corpus) => corpus,
        Err(e) => {
            // 没有词库时无事可做，提示后正常退出
            tracing::error!(error = %e, "corpus not loaded");
            return;
        }
    };
    tracing::info!(
        groups = corpus.groups().len(),
        words = corpus.word_count(),
        "corpus loaded"
    );

    if let Err(e) = run(&config, &corpus).await {
        tracing::error!(error = %e, "practice session failed");
    }
}

async fn load_corpus(config: &Config) -> Result<Corpus, CorpusError> {
    if let Some(path) = &config.corpus_path {
        return Corpus::load_from_file(path);
    }
    if let Some(url) = &config.corpus_url {
        return Corpus::fetch(url).await;
    }
    Err(CorpusError::LoadFailed(
        "未配置 DANCI_CORPUS_PATH 或 DANCI_CORPUS_URL".to_string(),
    ))
}

async fn run(config: &Config, corpus: &Corpus) -> AppResult<()> {
    let mut session = SessionCache::open(config);
    if !session.ensure_ready(corpus).await? {
        tracing::warn!("word options are still being generated elsewhere");
    }

    for partition in Partition::ALL {
        tracing::info!(
            partition = %partition,
            entries = session.entries(partition).len(),
            answered = session.answered_count(partition),
            cursor = session.cursor(partition),
            degraded = session.is_degraded(),
            "partition ready"
        );
    }

    let mut speech = SpeechSession::new(LoggingEngine::default(), config.speech.clone());
    if let Some(entry) = session.current(Partition::AllWords) {
        tracing::info!(
            key = %entry.key,
            word = %entry.word.word,
            definition = %format_definition(&entry.word.definitions_by_pos),
            "current word"
        );
        let word = entry.word.word.clone();
        speech.speak(&word, None)?;
        speech.pump_events();
    }

    let run = QuizRun::new(corpus.flatten(), config.question_count)?;
    if let Some(question) = run.current() {
        tracing::info!(
            questions = run.len(),
            word = %question.correct_word,
            options = ?question.options.iter().map(|o| o.word.as_str()).collect::<Vec<_>>(),
            "quiz ready"
        );
    }

    Ok(())
}
