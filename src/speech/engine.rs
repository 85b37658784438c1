//! 语音引擎接口
//!
//! 引擎本身是异步的：`speak` 只负责提交，开始/结束/出错等回调通过
//! [`EventSink`] 以 [`EngineEvent`] 的形式送回会话。

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use super::SpeechResult;

pub type UtteranceId = u64;

/// 引擎回调的发送端
pub type EventSink = mpsc::UnboundedSender<EngineEvent>;

/// 系统语音
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub lang: String,
    /// 是否为本地语音（不依赖网络）
    pub local_service: bool,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>, local_service: bool) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
            local_service,
        }
    }

    pub fn is_local_english(&self) -> bool {
        self.local_service && self.lang.starts_with("en")
    }
}

/// 提交给引擎的一次朗读
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub lang: String,
    /// 为 `None` 时由引擎按 `lang` 选默认语音
    pub voice: Option<Voice>,
}

/// 引擎回调
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started(UtteranceId),
    Paused(UtteranceId),
    Resumed(UtteranceId),
    Ended(UtteranceId),
    Errored { id: UtteranceId, message: String },
    /// 可用语音列表发生变化
    VoicesChanged,
}

impl EngineEvent {
    pub fn utterance_id(&self) -> Option<UtteranceId> {
        match self {
            EngineEvent::Started(id)
            | EngineEvent::Paused(id)
            | EngineEvent::Resumed(id)
            | EngineEvent::Ended(id)
            | EngineEvent::Errored { id, .. } => Some(*id),
            EngineEvent::VoicesChanged => None,
        }
    }
}

/// 语音合成引擎
///
/// 同一时间只支持一个朗读；会话保证提交新的朗读前先取消旧的。
pub trait SpeechEngine {
    /// 会话创建时调用一次，引擎之后的回调都发往这里
    fn attach(&mut self, sink: EventSink);

    /// 当前可用语音，可能一开始为空，稍后通过 `VoicesChanged` 通知
    fn voices(&self) -> Vec<Voice>;

    fn speak(&mut self, utterance: &Utterance) -> SpeechResult<()>;

    fn pause(&mut self);

    fn resume(&mut self);

    fn cancel(&mut self);
}

/// 只写日志的引擎，用于没有音频输出的环境
///
/// 每次朗读立即回调开始和结束。
#[derive(Debug)]
pub struct LoggingEngine {
    voices: Vec<Voice>,
    sink: Option<EventSink>,
}

impl LoggingEngine {
    pub fn new(voices: Vec<Voice>) -> Self {
        Self { voices, sink: None }
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(sink) = &self.sink {
            // 会话已销毁时发送会失败，忽略即可
            let _ = sink.send(event);
        }
    }
}

impl Default for LoggingEngine {
    fn default() -> Self {
        Self::new(vec![Voice::new("Samantha", "en-US", true)])
    }
}

impl SpeechEngine for LoggingEngine {
    fn attach(&mut self, sink: EventSink) {
        self.sink = Some(sink);
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn speak(&mut self, utterance: &Utterance) -> SpeechResult<()> {
        info!(
            id = utterance.id,
            text = %utterance.text,
            lang = %utterance.lang,
            voice = utterance.voice.as_ref().map(|v| v.name.as_str()).unwrap_or("default"),
            rate = utterance.rate,
            "speak"
        );
        self.emit(EngineEvent::Started(utterance.id));
        self.emit(EngineEvent::Ended(utterance.id));
        Ok(())
    }

    fn pause(&mut self) {}

    fn resume(&mut self) {}

    fn cancel(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_english_filter() {
        assert!(Voice::new("Samantha", "en-US", true).is_local_english());
        assert!(Voice::new("Daniel", "en-GB", true).is_local_english());
        assert!(!Voice::new("Google US English", "en-US", false).is_local_english());
        assert!(!Voice::new("Tingting", "zh-CN", true).is_local_english());
    }

    #[test]
    fn test_event_utterance_id() {
        assert_eq!(EngineEvent::Ended(3).utterance_id(), Some(3));
        assert_eq!(
            EngineEvent::Errored {
                id: 4,
                message: "x".to_string()
            }
            .utterance_id(),
            Some(4)
        );
        assert_eq!(EngineEvent::VoicesChanged.utterance_id(), None);
    }
}
