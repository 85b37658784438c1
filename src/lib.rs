//! # danci-practice - 单词卡片练习核心
//!
//! 本 crate 提供单词练习应用的三个核心子系统:
//!
//! - **QuizBuilder** - 从词库随机生成四选一测验题
//! - **SessionCache** - 持久化的练习会话缓存（全部单词 / 重点单词两个分区 + 游标）
//! - **SpeechSession** - 语音合成播放状态机（空闲 / 播放 / 暂停）
//!
//! ## 模块结构
//!
//! - [`corpus`] - 词库模型、加载与分页
//! - [`quiz`] - 测验题生成与一次性测验流程
//! - [`worker`] - 后台线程预计算每个单词的选项
//! - [`storage`] - SQLite 存储与游标侧存储
//! - [`session`] - 会话缓存：冷启动、重置、游标导航
//! - [`speech`] - 语音播放状态机

pub mod config;
pub mod corpus;
pub mod error;
pub mod logging;
pub mod quiz;
pub mod session;
pub mod speech;
pub mod storage;
pub mod worker;

pub use config::Config;
pub use corpus::{Corpus, Word, WordGroup};
pub use error::{AppError, AppResult};
pub use quiz::{build_quiz, format_definition, QuizOption, QuizQuestion, QuizRun};
pub use session::{ColdStart, SessionCache};
pub use speech::{SpeechEngine, SpeechOptions, SpeechSession, SpeechState};
pub use storage::{OptionEntry, Partition};
