use serde::Serialize;

/// 朗读状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SpeechState {
    #[default]
    Idle,
    Speaking,
    Paused,
}

/// 驱动状态变化的输入，既包括调用方操作也包括引擎回调
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Speak,
    Pause,
    Resume,
    Stop,
    /// 引擎报告结束或出错
    Finished,
}

impl SpeechState {
    pub const fn as_str(self) -> &'static str {
        match self {
            SpeechState::Idle => "IDLE",
            SpeechState::Speaking => "SPEAKING",
            SpeechState::Paused => "PAUSED",
        }
    }

    /// 唯一的状态转移函数；不合法的输入保持原状态
    pub fn next(self, transition: Transition) -> SpeechState {
        match (self, transition) {
            (_, Transition::Speak) => SpeechState::Speaking,
            (SpeechState::Speaking, Transition::Pause) => SpeechState::Paused,
            (SpeechState::Paused, Transition::Resume) => SpeechState::Speaking,
            (_, Transition::Stop) | (_, Transition::Finished) => SpeechState::Idle,
            (state, _) => state,
        }
    }
}

impl std::fmt::Display for SpeechState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
