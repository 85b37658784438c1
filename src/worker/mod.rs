//! 选项预计算 Worker
//!
//! 冷启动或重置时，为词库中的每个单词一次性生成四选一选项并整体洗牌，
//! 结果交给 [`SessionCache`](crate::session::SessionCache) 持久化。
//! 词库可能有数万个单词，生成过程交给 tokio 的阻塞线程池执行，
//! 调用方只拿到一个 [`GenerationHandle`]，完成时收到一条 [`GenerationResponse`]。

use std::time::Instant;

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::corpus::Word;
use crate::quiz::{sample_distractors, QuizError, OPTION_COUNT};
use crate::storage::OptionEntry;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("词库为空")]
    EmptyCorpus,

    #[error("词库中不同的单词不足 4 个（实际 {available} 个）")]
    InsufficientCorpus { available: usize },

    #[error("后台生成失败: {0}")]
    WorkerFailed(String),
}

impl From<QuizError> for GenerationError {
    fn from(err: QuizError) -> Self {
        match err {
            QuizError::InsufficientCorpus { available, .. } => {
                GenerationError::InsufficientCorpus { available }
            }
        }
    }
}

/// 生成结果：全部单词与从中筛出的重点单词，两者保持同一相对顺序
#[derive(Debug, Clone, Default)]
pub struct GeneratedOptions {
    pub all_words: Vec<OptionEntry>,
    pub key_words: Vec<OptionEntry>,
}

/// 发给 worker 的请求
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// 本次生成的令牌，用于识别过期的完成消息
    pub token: u64,
    pub words: Vec<Word>,
}

/// worker 完成后回传的唯一一条消息
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub token: u64,
    pub result: Result<GeneratedOptions, GenerationError>,
}

/// 为整个词库生成选项
///
/// 每个单词与 3 个随机抽取的其他单词组成 4 个选项并打乱；
/// 然后整体洗牌，按洗牌后的位置生成 `key = "{word}_{index}"`。
pub fn generate_option_entries<R: Rng + ?Sized>(
    words: &[Word],
    rng: &mut R,
) -> Result<GeneratedOptions, GenerationError> {
    if words.is_empty() {
        return Err(GenerationError::EmptyCorpus);
    }

    let mut distinct: IndexMap<&str, &Word> = IndexMap::with_capacity(words.len());
    for word in words {
        distinct.entry(word.word.as_str()).or_insert(word);
    }
    if distinct.len() < OPTION_COUNT {
        return Err(GenerationError::InsufficientCorpus {
            available: distinct.len(),
        });
    }
    let candidates: Vec<&Word> = distinct.into_values().collect();

    let mut entries = Vec::with_capacity(words.len());
    for word in words {
        let wrong = sample_distractors(&candidates, |c| c.word == word.word, rng)?;

        let mut options: Vec<Word> = Vec::with_capacity(OPTION_COUNT);
        options.push(word.clone());
        options.extend(wrong.into_iter().map(|w| (*w).clone()));
        options.shuffle(rng);

        entries.push(OptionEntry {
            word: word.clone(),
            options,
            select_word: String::new(),
            key: String::new(),
        });
    }

    entries.shuffle(rng);
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.key = OptionEntry::make_key(&entry.word.word, index);
    }

    let key_words = entries
        .iter()
        .filter(|entry| entry.word.key_word)
        .cloned()
        .collect();

    Ok(GeneratedOptions {
        all_words: entries,
        key_words,
    })
}

/// 一次进行中的生成
///
/// 没有取消语义：一旦启动就会运行到完成或失败。
#[derive(Debug)]
pub struct GenerationHandle {
    token: u64,
    task: JoinHandle<Result<GeneratedOptions, GenerationError>>,
}

impl GenerationHandle {
    pub fn token(&self) -> u64 {
        self.token
    }

    /// 生成任务是否已经结束（成功、失败或 panic）
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 等待完成消息
    ///
    /// 任务 panic 或被运行时取消时返回 [`GenerationError::WorkerFailed`]。
    pub async fn wait(self) -> GenerationResponse {
        let token = self.token;
        let result = self.task.await.unwrap_or_else(|e| {
            error!(token, error = %e, "option worker task aborted");
            Err(GenerationError::WorkerFailed(e.to_string()))
        });
        GenerationResponse { token, result }
    }
}

/// 后台选项生成器
pub struct OptionWorker;

impl OptionWorker {
    /// 在 tokio 阻塞线程池中启动生成，立即返回
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn spawn(request: GenerationRequest) -> GenerationHandle {
        let GenerationRequest { token, words } = request;
        Self::spawn_job(token, move || generate_option_entries(&words, &mut rand::rng()))
    }

    fn spawn_job<F>(token: u64, job: F) -> GenerationHandle
    where
        F: FnOnce() -> Result<GeneratedOptions, GenerationError> + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let result = job();
            match &result {
                Ok(generated) => info!(
                    token,
                    all_words = generated.all_words.len(),
                    key_words = generated.key_words.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "word options generated"
                ),
                Err(e) => error!(token, error = %e, "word option generation failed"),
            }
            result
        });

        GenerationHandle { token, task }
    }
}
