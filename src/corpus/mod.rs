//! 词库模块
//!
//! 词库是按首字母分组的单词列表，启动时从本地 JSON 文件或 HTTP 接口加载一次，
//! 之后只读。加载失败时返回明确的错误，而不是退化成空词库。

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// 列表页默认每页单词数
pub const DEFAULT_PAGE_SIZE: usize = 60;

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("词库加载失败: {0}")]
    LoadFailed(String),

    #[error("词库解析失败: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type CorpusResult<T> = Result<T, CorpusError>;

/// 单词
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    /// 单词文本
    pub word: String,
    /// 音标
    #[serde(default)]
    pub phonetic: String,
    /// 是否为重点单词
    #[serde(default)]
    pub key_word: bool,
    /// 词性 -> 释义，保留词库中的原始顺序
    #[serde(default)]
    pub definitions_by_pos: IndexMap<String, String>,
}

impl Word {
    pub fn new(word: impl Into<String>, phonetic: impl Into<String>, key_word: bool) -> Self {
        Self {
            word: word.into(),
            phonetic: phonetic.into(),
            key_word,
            definitions_by_pos: IndexMap::new(),
        }
    }

    /// 追加一条词性释义
    pub fn with_definition(
        mut self,
        pos: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        self.definitions_by_pos.insert(pos.into(), definition.into());
        self
    }
}

/// 按首字母分组的单词列表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordGroup {
    /// 分组键（A-Z）
    pub title: String,
    pub words: Vec<Word>,
}

/// 一页单词
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordPage {
    pub words: Vec<Word>,
    /// 分组内单词总数
    pub total: usize,
    /// 是否已经是最后一页
    pub finished: bool,
}

/// 词库
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Corpus {
    groups: Vec<WordGroup>,
}

impl Corpus {
    pub fn new(groups: Vec<WordGroup>) -> Self {
        Self { groups }
    }

    pub fn from_json_str(json: &str) -> CorpusResult<Self> {
        let corpus: Corpus = serde_json::from_str(json)?;
        debug!(groups = corpus.groups.len(), "corpus parsed");
        Ok(corpus)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> CorpusResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| CorpusError::LoadFailed(format!("{}: {}", path.display(), e)))?;
        let corpus = Self::from_json_str(&json)?;
        info!(path = %path.display(), words = corpus.word_count(), "corpus loaded from file");
        Ok(corpus)
    }

    /// 通过 HTTP GET 拉取词库
    pub async fn fetch(url: &str) -> CorpusResult<Self> {
        let response = reqwest::get(url)
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| CorpusError::LoadFailed(format!("{url}: {e}")))?;

        let groups: Vec<WordGroup> = response
            .json()
            .await
            .map_err(|e| CorpusError::LoadFailed(format!("{url}: {e}")))?;

        let corpus = Self::new(groups);
        info!(url, words = corpus.word_count(), "corpus fetched");
        Ok(corpus)
    }

    pub fn groups(&self) -> &[WordGroup] {
        &self.groups
    }

    pub fn titles(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.title.as_str()).collect()
    }

    pub fn group(&self, title: &str) -> Option<&WordGroup> {
        self.groups.iter().find(|g| g.title == title)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.words.is_empty())
    }

    pub fn word_count(&self) -> usize {
        self.groups.iter().map(|g| g.words.len()).sum()
    }

    /// 按分组顺序展开为单个单词列表
    pub fn flatten(&self) -> Vec<Word> {
        self.groups
            .iter()
            .flat_map(|g| g.words.iter().cloned())
            .collect()
    }

    pub fn key_words(&self) -> Vec<Word> {
        self.groups
            .iter()
            .flat_map(|g| g.words.iter())
            .filter(|w| w.key_word)
            .cloned()
            .collect()
    }

    /// 分页读取某个分组，`page` 从 1 开始
    ///
    /// 分组不存在时返回空页并标记为结束。
    pub fn page(&self, title: &str, page: usize, page_size: usize) -> WordPage {
        let Some(group) = self.group(title) else {
            return WordPage {
                words: Vec::new(),
                total: 0,
                finished: true,
            };
        };

        let page = page.max(1);
        let page_size = page_size.max(1);
        let total = group.words.len();
        let start = (page - 1).saturating_mul(page_size).min(total);
        let end = page.saturating_mul(page_size).min(total);

        WordPage {
            words: group.words[start..end].to_vec(),
            total,
            finished: end >= total,
        }
    }
}
