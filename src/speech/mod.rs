//! 单词朗读
//!
//! [`SpeechSession`] 包装一个异步回调式的语音引擎，对外暴露
//! 空闲 / 朗读中 / 暂停 三个状态。调用方操作与引擎回调都经过
//! [`SpeechState::next`] 这一个转移函数。

pub mod engine;
pub mod state;

pub use engine::{
    EngineEvent, EventSink, LoggingEngine, SpeechEngine, Utterance, UtteranceId, Voice,
};
pub use state::{SpeechState, Transition};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_RATE: f32 = 1.0;
pub const DEFAULT_PITCH: f32 = 1.0;
pub const DEFAULT_VOLUME: f32 = 1.0;
pub const DEFAULT_LANG: &str = "en-US";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpeechError {
    #[error("没有可用的语音")]
    VoicesUnavailable,

    #[error("语音引擎错误: {0}")]
    Engine(String),
}

pub type SpeechResult<T> = Result<T, SpeechError>;

/// 朗读参数，未设置的项依次回退到会话设置和引擎默认值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechOptions {
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,
    pub lang: Option<String>,
    pub voice_name: Option<String>,
}

impl SpeechOptions {
    /// `self` 优先，缺失的项取自 `fallback`
    pub fn merge(&self, fallback: &SpeechOptions) -> SpeechOptions {
        SpeechOptions {
            rate: self.rate.or(fallback.rate),
            pitch: self.pitch.or(fallback.pitch),
            volume: self.volume.or(fallback.volume),
            lang: self.lang.clone().or_else(|| fallback.lang.clone()),
            voice_name: self.voice_name.clone().or_else(|| fallback.voice_name.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VoiceStatus {
    Available,
    NoVoices,
}

/// 朗读会话
///
/// 独占一个引擎；每次 `speak` 都会先取消上一次朗读。
/// 回调带有朗读 id，已被取代的朗读的回调会被忽略。
pub struct SpeechSession<E: SpeechEngine> {
    engine: E,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    state: SpeechState,
    options: SpeechOptions,
    voices: Vec<Voice>,
    voice: Option<Voice>,
    current: Option<UtteranceId>,
    next_id: UtteranceId,
    last_text: Option<String>,
}

impl<E: SpeechEngine> SpeechSession<E> {
    pub fn new(mut engine: E, options: SpeechOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        engine.attach(tx);
        let voices = engine.voices();

        let mut session = Self {
            engine,
            events: rx,
            state: SpeechState::Idle,
            options,
            voices,
            voice: None,
            current: None,
            next_id: 0,
            last_text: None,
        };
        session.resolve_voice();
        session
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    pub fn options(&self) -> &SpeechOptions {
        &self.options
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// 当前选中的语音；为 `None` 时由引擎按语言选默认语音
    pub fn voice(&self) -> Option<&Voice> {
        self.voice.as_ref()
    }

    /// 本地英文语音
    pub fn english_voices(&self) -> Vec<&Voice> {
        self.voices.iter().filter(|v| v.is_local_english()).collect()
    }

    pub fn voice_status(&self) -> VoiceStatus {
        if self.voices.is_empty() {
            VoiceStatus::NoVoices
        } else {
            VoiceStatus::Available
        }
    }

    /// 最近一次朗读的文本
    pub fn current_text(&self) -> Option<&str> {
        self.last_text.as_deref()
    }

    pub fn current_utterance(&self) -> Option<UtteranceId> {
        self.current
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    // ============================================================
    // 调用方操作
    // ============================================================

    /// 朗读文本
    ///
    /// 合并后的参数会成为新的会话参数。
    /// 引擎一个语音都没有时返回 [`SpeechError::VoicesUnavailable`]，状态不变。
    pub fn speak(&mut self, text: &str, options: Option<SpeechOptions>) -> SpeechResult<()> {
        if self.voices.is_empty() {
            self.voices = self.engine.voices();
            self.resolve_voice();
        }
        if self.voices.is_empty() {
            warn!("no voices available, speech disabled");
            return Err(SpeechError::VoicesUnavailable);
        }

        self.cancel_in_flight();

        if let Some(options) = options {
            self.set_options(options);
        }

        self.next_id += 1;
        let utterance = Utterance {
            id: self.next_id,
            text: text.to_string(),
            rate: self.options.rate.unwrap_or(DEFAULT_RATE),
            pitch: self.options.pitch.unwrap_or(DEFAULT_PITCH),
            volume: self.options.volume.unwrap_or(DEFAULT_VOLUME),
            lang: self
                .options
                .lang
                .clone()
                .unwrap_or_else(|| DEFAULT_LANG.to_string()),
            voice: self.voice.clone(),
        };
        self.last_text = Some(utterance.text.clone());

        if let Err(e) = self.engine.speak(&utterance) {
            warn!(id = utterance.id, error = %e, "engine rejected utterance");
            self.apply(Transition::Stop);
            return Err(e);
        }

        self.current = Some(utterance.id);
        self.apply(Transition::Speak);
        Ok(())
    }

    /// 暂停；只在朗读中有效
    pub fn pause(&mut self) {
        if self.state == SpeechState::Speaking {
            self.engine.pause();
            self.apply(Transition::Pause);
        }
    }

    /// 继续；只在暂停时有效
    pub fn resume(&mut self) {
        if self.state == SpeechState::Paused {
            self.engine.resume();
            self.apply(Transition::Resume);
        }
    }

    /// 停止朗读，任何状态下都回到空闲
    pub fn stop(&mut self) {
        self.cancel_in_flight();
        self.apply(Transition::Stop);
    }

    pub fn cancel(&mut self) {
        self.stop();
    }

    /// 空闲时朗读（没给文本就读上一次的），朗读中暂停，暂停时继续
    pub fn toggle_play(&mut self, text: Option<&str>) -> SpeechResult<()> {
        match self.state {
            SpeechState::Idle => {
                let Some(text) = text.map(str::to_string).or_else(|| self.last_text.clone())
                else {
                    debug!("toggle_play with nothing to speak");
                    return Ok(());
                };
                self.speak(&text, None)
            }
            SpeechState::Speaking => {
                self.pause();
                Ok(())
            }
            SpeechState::Paused => {
                self.resume();
                Ok(())
            }
        }
    }

    /// 合并到会话参数，不影响当前播放
    pub fn set_options(&mut self, options: SpeechOptions) {
        let voice_changed =
            options.voice_name.is_some() && options.voice_name != self.options.voice_name;
        self.options = options.merge(&self.options);
        if voice_changed {
            self.resolve_voice();
        }
    }

    /// 按名称选择语音，返回是否在当前列表中找到
    pub fn set_voice(&mut self, name: &str) -> bool {
        self.options.voice_name = Some(name.to_string());
        self.resolve_voice();
        self.voice.is_some()
    }

    // ============================================================
    // 引擎回调
    // ============================================================

    /// 处理一条引擎回调，返回处理后的状态
    pub fn handle_event(&mut self, event: EngineEvent) -> SpeechState {
        if event == EngineEvent::VoicesChanged {
            self.voices = self.engine.voices();
            self.resolve_voice();
            info!(
                voices = self.voices.len(),
                selected = self.voice.as_ref().map(|v| v.name.as_str()).unwrap_or("default"),
                "voices changed"
            );
            return self.state;
        }

        if event.utterance_id() != self.current || self.current.is_none() {
            debug!(?event, current = ?self.current, "ignoring event for superseded utterance");
            return self.state;
        }

        let transition = match event {
            EngineEvent::Started(_) => None,
            EngineEvent::Paused(_) => Some(Transition::Pause),
            EngineEvent::Resumed(_) => Some(Transition::Resume),
            EngineEvent::Ended(_) => Some(Transition::Finished),
            EngineEvent::Errored { id, message } => {
                warn!(id, error = %message, "speech engine error");
                Some(Transition::Finished)
            }
            EngineEvent::VoicesChanged => None,
        };

        if let Some(transition) = transition {
            if transition == Transition::Finished {
                self.current = None;
            }
            self.apply(transition);
        }
        self.state
    }

    /// 处理所有已到达的回调，返回处理条数
    pub fn pump_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// 等待并处理下一条回调；引擎丢弃发送端后返回 `None`
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        let event = self.events.recv().await?;
        self.handle_event(event.clone());
        Some(event)
    }

    // ============================================================
    // 内部辅助
    // ============================================================

    fn apply(&mut self, transition: Transition) {
        let next = self.state.next(transition);
        if next != self.state {
            debug!(from = %self.state, to = %next, ?transition, "speech state changed");
        }
        self.state = next;
    }

    fn cancel_in_flight(&mut self) {
        if self.current.take().is_some() || self.state != SpeechState::Idle {
            self.engine.cancel();
        }
    }

    /// 按名称在当前语音列表中查找；找不到时交给引擎按语言选择
    fn resolve_voice(&mut self) {
        self.voice = self.options.voice_name.as_deref().and_then(|name| {
            let found = self.voices.iter().find(|v| v.name == name).cloned();
            if found.is_none() && !self.voices.is_empty() {
                debug!(voice = name, "requested voice not found, using engine default");
            }
            found
        });
    }
}

impl<E: SpeechEngine> Drop for SpeechSession<E> {
    fn drop(&mut self) {
        if self.current.is_some() {
            self.engine.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_merge_prefers_self() {
        let session = SpeechOptions {
            rate: Some(0.8),
            lang: Some("en-GB".to_string()),
            voice_name: Some("Daniel".to_string()),
            ..SpeechOptions::default()
        };
        let explicit = SpeechOptions {
            rate: Some(1.5),
            ..SpeechOptions::default()
        };

        let merged = explicit.merge(&session);
        assert_eq!(merged.rate, Some(1.5));
        assert_eq!(merged.lang.as_deref(), Some("en-GB"));
        assert_eq!(merged.voice_name.as_deref(), Some("Daniel"));
        assert_eq!(merged.pitch, None);
    }

    #[test]
    fn test_logging_engine_finishes_immediately() {
        let mut session = SpeechSession::new(LoggingEngine::default(), SpeechOptions::default());
        session.speak("apple", None).unwrap();
        assert_eq!(session.state(), SpeechState::Speaking);

        assert_eq!(session.pump_events(), 2);
        assert_eq!(session.state(), SpeechState::Idle);
        assert_eq!(session.current_text(), Some("apple"));
    }

    #[test]
    fn test_no_voices_is_explicit() {
        let mut session =
            SpeechSession::new(LoggingEngine::new(Vec::new()), SpeechOptions::default());
        assert_eq!(session.voice_status(), VoiceStatus::NoVoices);
        assert_eq!(session.speak("apple", None), Err(SpeechError::VoicesUnavailable));
        assert_eq!(session.state(), SpeechState::Idle);
    }
}
