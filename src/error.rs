//! 顶层错误类型
//!
//! 各子模块各自定义错误枚举，这里统一汇总给二进制入口与调用方。

use thiserror::Error;

use crate::corpus::CorpusError;
use crate::quiz::QuizError;
use crate::session::SessionError;
use crate::speech::SpeechError;
use crate::storage::StorageError;
use crate::worker::GenerationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("词库加载失败: {0}")]
    Corpus(#[from] CorpusError),

    #[error("测验生成失败: {0}")]
    Quiz(#[from] QuizError),

    #[error("选项生成失败: {0}")]
    Generation(#[from] GenerationError),

    #[error("存储不可用: {0}")]
    Storage(#[from] StorageError),

    #[error("会话错误: {0}")]
    Session(#[from] SessionError),

    #[error("语音错误: {0}")]
    Speech(#[from] SpeechError),
}

pub type AppResult<T> = Result<T, AppError>;
