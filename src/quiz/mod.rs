//! 测验生成模块
//!
//! 从词库中随机抽取单词，为每个单词生成四选一的释义选择题：
//! 一个正确选项 + 三个从其余单词中随机抽取的干扰项，选项顺序随机。

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::corpus::Word;

/// 每题的选项数
pub const OPTION_COUNT: usize = 4;
/// 每题的干扰项数
pub const DISTRACTOR_COUNT: usize = OPTION_COUNT - 1;
/// 默认题目数
pub const DEFAULT_QUESTION_COUNT: usize = 100;
/// 默认批大小（仅影响生成时的分块）
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// 释义之间的分隔符（全角分号）
pub const DEFINITION_SEPARATOR: &str = "；";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuizError {
    #[error("词库中不同的单词不足 {required} 个（实际 {available} 个）")]
    InsufficientCorpus { required: usize, available: usize },
}

pub type QuizResult<T> = Result<T, QuizError>;

/// 选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub word: String,
    /// 拼接后的释义，如 `n. 能力；v. 放弃`
    pub definition: String,
    pub phonetic: String,
    pub is_key_word: bool,
}

impl QuizOption {
    pub fn from_word(word: &Word) -> Self {
        Self {
            word: word.word.clone(),
            definition: format_definition(&word.definitions_by_pos),
            phonetic: word.phonetic.clone(),
            is_key_word: word.key_word,
        }
    }
}

/// 测验题
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub correct_word: String,
    pub correct_definition: String,
    pub correct_phonetic: String,
    pub is_key_word: bool,
    /// 恰好 4 个选项，其中只有一个是 `correct_word`
    pub options: Vec<QuizOption>,
}

impl QuizQuestion {
    pub fn is_correct(&self, choice: &str) -> bool {
        self.correct_word == choice
    }
}

/// 拼接释义：每个词性输出为 `"{pos} {definition}"`，之间用全角分号连接
///
/// 按词库中的原始顺序输出，空映射返回空字符串。
pub fn format_definition(definitions_by_pos: &IndexMap<String, String>) -> String {
    definitions_by_pos
        .iter()
        .map(|(pos, definition)| format!("{pos} {definition}"))
        .collect::<Vec<_>>()
        .join(DEFINITION_SEPARATOR)
}

/// 随机取出指定数量的元素（Fisher-Yates 洗牌后截断）
///
/// `count` 不小于元素数量时返回整个集合的随机排列。
pub fn random_items<T: Clone, R: Rng + ?Sized>(
    items: &[T],
    count: usize,
    rng: &mut R,
) -> Vec<T> {
    let mut shuffled = items.to_vec();
    shuffled.shuffle(rng);
    shuffled.truncate(count);
    shuffled
}

/// 从候选集合中均匀抽取 3 个互不相同的干扰项
///
/// 候选集合本身必须已按单词文本去重；`is_answer` 标记需要排除的正确答案。
pub fn sample_distractors<'a, T, R, F>(
    candidates: &'a [T],
    is_answer: F,
    rng: &mut R,
) -> QuizResult<Vec<&'a T>>
where
    R: Rng + ?Sized,
    F: Fn(&T) -> bool,
{
    // 多抽一个，剔除正确答案后仍然是均匀分布
    let amount = candidates.len().min(DISTRACTOR_COUNT + 1);
    let mut picked: Vec<&T> = rand::seq::index::sample(rng, candidates.len(), amount)
        .into_iter()
        .map(|i| &candidates[i])
        .filter(|candidate| !is_answer(*candidate))
        .collect();

    if picked.len() < DISTRACTOR_COUNT {
        return Err(QuizError::InsufficientCorpus {
            required: OPTION_COUNT,
            available: picked.len() + 1,
        });
    }

    picked.shuffle(rng);
    picked.truncate(DISTRACTOR_COUNT);
    Ok(picked)
}

/// 生成测验题
///
/// 随机抽取 `min(question_count, words.len())` 个单词（不放回），
/// 每题的干扰项从其余不同的单词中均匀抽取。`batch_size` 只决定循环分块，
/// 不影响结果分布。
///
/// # Errors
/// 词库中不同单词少于 4 个时返回 [`QuizError::InsufficientCorpus`]。
pub fn build_quiz<R: Rng + ?Sized>(
    words: &[Word],
    question_count: usize,
    batch_size: usize,
    rng: &mut R,
) -> QuizResult<Vec<QuizQuestion>> {
    // 单词 -> 选项，按文本去重，先出现的优先
    let mut lookup: IndexMap<&str, QuizOption> = IndexMap::with_capacity(words.len());
    for word in words {
        lookup
            .entry(word.word.as_str())
            .or_insert_with(|| QuizOption::from_word(word));
    }

    if lookup.len() < OPTION_COUNT {
        return Err(QuizError::InsufficientCorpus {
            required: OPTION_COUNT,
            available: lookup.len(),
        });
    }

    let candidates: Vec<QuizOption> = lookup.into_values().collect();
    let selected: Vec<&Word> = random_items(&words.iter().collect::<Vec<_>>(), question_count, rng);
    let mut questions = Vec::with_capacity(selected.len());

    for batch in selected.chunks(batch_size.max(1)) {
        for word in batch {
            let correct = QuizOption::from_word(word);
            let wrong = sample_distractors(&candidates, |o| o.word == word.word, rng)?;

            let mut options = Vec::with_capacity(OPTION_COUNT);
            options.push(correct.clone());
            options.extend(wrong.into_iter().cloned());
            options.shuffle(rng);

            questions.push(QuizQuestion {
                correct_word: correct.word,
                correct_definition: correct.definition,
                correct_phonetic: correct.phonetic,
                is_key_word: correct.is_key_word,
                options,
            });
        }
    }

    debug!(questions = questions.len(), corpus = words.len(), "quiz built");
    Ok(questions)
}

/// 使用默认题目数与线程随机数生成器生成测验
pub fn build_default_quiz(words: &[Word]) -> QuizResult<Vec<QuizQuestion>> {
    build_quiz(
        words,
        DEFAULT_QUESTION_COUNT,
        DEFAULT_BATCH_SIZE,
        &mut rand::rng(),
    )
}

// ============================================================
// QuizRun - 一次随机测验
// ============================================================

/// 一次随机测验：题目列表、当前题号与当前选择
///
/// 做完最后一题后再点"下一题"会重新出题并回到第一题。
pub struct QuizRun {
    words: Vec<Word>,
    question_count: usize,
    questions: Vec<QuizQuestion>,
    index: usize,
    selection: Option<String>,
    rng: StdRng,
}

impl QuizRun {
    pub fn new(words: Vec<Word>, question_count: usize) -> QuizResult<Self> {
        Self::with_rng(words, question_count, StdRng::from_os_rng())
    }

    /// 固定随机种子（用于测试）
    pub fn with_seed(words: Vec<Word>, question_count: usize, seed: u64) -> QuizResult<Self> {
        Self::with_rng(words, question_count, StdRng::seed_from_u64(seed))
    }

    fn with_rng(words: Vec<Word>, question_count: usize, mut rng: StdRng) -> QuizResult<Self> {
        let questions = build_quiz(&words, question_count, DEFAULT_BATCH_SIZE, &mut rng)?;
        Ok(Self {
            words,
            question_count,
            questions,
            index: 0,
            selection: None,
            rng,
        })
    }

    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn current(&self) -> Option<&QuizQuestion> {
        self.questions.get(self.index)
    }

    pub fn select(&mut self, word: impl Into<String>) {
        self.selection = Some(word.into());
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    /// 当前选择是否正确；尚未作答时返回 `None`
    pub fn is_correct(&self) -> Option<bool> {
        let question = self.current()?;
        self.selection.as_deref().map(|choice| question.is_correct(choice))
    }

    /// 上一题，已在第一题时不动
    pub fn previous(&mut self) {
        if self.index > 0 {
            self.index -= 1;
            self.selection = None;
        }
    }

    /// 下一题；在最后一题时重新出题并返回 `true`
    pub fn next(&mut self) -> QuizResult<bool> {
        if self.index + 1 < self.questions.len() {
            self.index += 1;
            self.selection = None;
            return Ok(false);
        }

        self.restart()?;
        Ok(true)
    }

    /// 重新出题并回到第一题
    pub fn restart(&mut self) -> QuizResult<()> {
        self.questions = build_quiz(
            &self.words,
            self.question_count,
            DEFAULT_BATCH_SIZE,
            &mut self.rng,
        )?;
        self.index = 0;
        self.selection = None;
        info!(questions = self.questions.len(), "quiz refreshed");
        Ok(())
    }
}
