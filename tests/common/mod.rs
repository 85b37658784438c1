#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use danci_practice::config::Config;
use danci_practice::corpus::{Corpus, Word, WordGroup};
use danci_practice::speech::{
    EngineEvent, EventSink, SpeechEngine, SpeechError, SpeechOptions, SpeechResult, Utterance,
    Voice,
};

// ============================================================================
// Corpus fixtures
// ============================================================================

const SAMPLE_WORDS: &[(&str, &str, bool, &str, &str)] = &[
    ("abandon", "/əˈbændən/", true, "v.", "放弃；抛弃"),
    ("ability", "/əˈbɪləti/", false, "n.", "能力；才能"),
    ("absent", "/ˈæbsənt/", true, "adj.", "缺席的"),
    ("accept", "/əkˈsept/", false, "v.", "接受；认可"),
    ("bacon", "/ˈbeɪkən/", false, "n.", "熏猪肉"),
    ("balance", "/ˈbæləns/", true, "n.", "平衡；余额"),
    ("barrier", "/ˈbæriər/", false, "n.", "障碍"),
    ("battle", "/ˈbætl/", false, "n.", "战斗"),
    ("cabin", "/ˈkæbɪn/", false, "n.", "小屋；船舱"),
    ("calm", "/kɑːm/", true, "adj.", "平静的"),
    ("capture", "/ˈkæptʃər/", false, "v.", "捕获"),
    ("career", "/kəˈrɪər/", false, "n.", "职业；生涯"),
];

/// 三个字母分组、12 个单词、4 个重点单词
pub fn sample_corpus() -> Corpus {
    let mut groups: Vec<WordGroup> = Vec::new();
    for (text, phonetic, key_word, pos, definition) in SAMPLE_WORDS {
        let word = Word::new(*text, *phonetic, *key_word).with_definition(*pos, *definition);
        let title = text[..1].to_uppercase();
        match groups.iter_mut().find(|g| g.title == title) {
            Some(group) => group.words.push(word),
            None => groups.push(WordGroup {
                title,
                words: vec![word],
            }),
        }
    }
    Corpus::new(groups)
}

/// 指定数量的合成单词，每 `key_every` 个一个重点单词（0 表示没有）
pub fn synthetic_corpus(count: usize, key_every: usize) -> Corpus {
    let words = (0..count)
        .map(|i| {
            Word::new(format!("word_{i}"), format!("/w{i}/"), key_every > 0 && i % key_every == 0)
                .with_definition("n.", format!("释义{i}"))
        })
        .collect();
    Corpus::new(vec![WordGroup {
        title: "W".to_string(),
        words,
    }])
}

pub fn test_config(dir: &Path) -> Config {
    Config {
        db_path: dir.join("practice.db"),
        cursor_path: dir.join("cursors.json"),
        corpus_path: None,
        corpus_url: None,
        question_count: 100,
        speech: SpeechOptions::default(),
        log_level: "debug".to_string(),
        log_dir: None,
    }
}

// ============================================================================
// Scripted speech engine
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Speak(Utterance),
    Pause,
    Resume,
    Cancel,
}

#[derive(Default)]
struct ProbeState {
    calls: Vec<EngineCall>,
    voices: Vec<Voice>,
    sink: Option<EventSink>,
    reject_next: bool,
}

/// 测试侧对引擎的观察与控制：记录调用、改变语音列表、模拟回调
#[derive(Clone, Default)]
pub struct EngineProbe {
    inner: Arc<Mutex<ProbeState>>,
}

impl EngineProbe {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, EngineCall::Cancel))
            .count()
    }

    pub fn last_utterance(&self) -> Option<Utterance> {
        self.calls().into_iter().rev().find_map(|call| match call {
            EngineCall::Speak(utterance) => Some(utterance),
            _ => None,
        })
    }

    pub fn set_voices(&self, voices: Vec<Voice>) {
        self.inner.lock().unwrap().voices = voices;
    }

    pub fn reject_next(&self) {
        self.inner.lock().unwrap().reject_next = true;
    }

    pub fn emit(&self, event: EngineEvent) {
        let state = self.inner.lock().unwrap();
        let sink = state.sink.as_ref().expect("engine attached");
        sink.send(event).expect("session alive");
    }
}

pub struct ScriptedEngine {
    probe: EngineProbe,
}

impl ScriptedEngine {
    pub fn new(voices: Vec<Voice>) -> (Self, EngineProbe) {
        let probe = EngineProbe::default();
        probe.set_voices(voices);
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }

    fn record(&self, call: EngineCall) {
        self.probe.inner.lock().unwrap().calls.push(call);
    }
}

impl SpeechEngine for ScriptedEngine {
    fn attach(&mut self, sink: EventSink) {
        self.probe.inner.lock().unwrap().sink = Some(sink);
    }

    fn voices(&self) -> Vec<Voice> {
        self.probe.inner.lock().unwrap().voices.clone()
    }

    fn speak(&mut self, utterance: &Utterance) -> SpeechResult<()> {
        {
            let mut state = self.probe.inner.lock().unwrap();
            if state.reject_next {
                state.reject_next = false;
                return Err(SpeechError::Engine("synthesis-failed".to_string()));
            }
        }
        self.record(EngineCall::Speak(utterance.clone()));
        Ok(())
    }

    fn pause(&mut self) {
        self.record(EngineCall::Pause);
    }

    fn resume(&mut self) {
        self.record(EngineCall::Resume);
    }

    fn cancel(&mut self) {
        self.record(EngineCall::Cancel);
    }
}

pub fn default_voices() -> Vec<Voice> {
    vec![
        Voice::new("Samantha", "en-US", true),
        Voice::new("Daniel", "en-GB", true),
        Voice::new("Google US English", "en-US", false),
        Voice::new("Tingting", "zh-CN", true),
    ]
}
