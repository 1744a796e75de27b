//! # State 模块
//!
//! 定义渲染器的揭示状态机与光标。
//!
//! ## 设计原则
//!
//! - 挂起完全用数据表示，渲染器内部没有任何阻塞等待
//! - 所有状态必须**可序列化**（支持存档/读档）
//!
//! ## 状态转换
//!
//! ```text
//! Idle ──draw_formatted_text──► Running
//! Running ──<W:A>──► WaitingForKey{page_end: false} ──按键──► Running
//! Running ──<W:ms>──► WaitingTimer{page_end: false} ──计时结束──► Running
//! Running ──页尾──► WaitingForKey{page_end: true} ──按键──► continue
//! continue ──还有下一页──► FadingOut ──动画结束──► Running（下一页）
//! continue ──没有下一页──► Finished
//! ```

use serde::{Deserialize, Serialize};

use crate::services::AnimationHandle;

/// 揭示状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RevealState {
    /// 尚未开始显示消息
    #[default]
    Idle,

    /// 逐字揭示中
    Running,

    /// 等待按键
    ///
    /// `page_end` 为 true 表示当前页已全部显示，按键后翻页或结束。
    WaitingForKey { page_end: bool },

    /// 计时等待，`frames` 为剩余帧数
    WaitingTimer { frames: u32, page_end: bool },

    /// 翻页淡出动画进行中
    FadingOut { animation: AnimationHandle },

    /// 消息显示完毕
    Finished,
}

impl RevealState {
    /// 消息是否仍在进行（包括等待和翻页）
    pub fn is_running(&self) -> bool {
        !matches!(self, Self::Idle | Self::Finished)
    }

    /// 是否处于等待状态
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::WaitingForKey { .. } | Self::WaitingTimer { .. })
    }

    /// 是否停在页尾
    pub fn is_page_end(&self) -> bool {
        matches!(
            self,
            Self::WaitingForKey { page_end: true } | Self::WaitingTimer { page_end: true, .. }
        )
    }

    /// 剩余等待帧数（非计时等待为 0）
    pub fn wait_counter(&self) -> u32 {
        match self {
            Self::WaitingTimer { frames, .. } => *frames,
            _ => 0,
        }
    }
}

/// 揭示光标
///
/// `current_x` 为当前 token 的起始 X，`current_y` 为当前行顶部在消息框内的 Y。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Caret {
    /// 当前页内的行索引
    pub line: usize,
    /// 行内 token 索引
    pub token_index: usize,
    /// 当前文本 token 已揭示的字符数
    pub char_index: usize,
    pub current_x: f32,
    pub current_y: f32,
}

impl Caret {
    /// 移动到下一行行首
    pub fn next_line(&mut self, advance_y: f32) {
        self.line += 1;
        self.token_index = 0;
        self.char_index = 0;
        self.current_x = 0.0;
        self.current_y += advance_y;
    }

    /// 回到页首
    pub fn reset_page(&mut self, start_x: f32) {
        self.line = 0;
        self.token_index = 0;
        self.char_index = 0;
        self.current_x = start_x;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reveal_state_predicates() {
        assert!(!RevealState::Idle.is_running());
        assert!(!RevealState::Finished.is_running());
        assert!(RevealState::Running.is_running());
        assert!(RevealState::FadingOut { animation: 1 }.is_running());

        let timer = RevealState::WaitingTimer {
            frames: 30,
            page_end: false,
        };
        assert!(timer.is_waiting());
        assert!(!timer.is_page_end());
        assert_eq!(timer.wait_counter(), 30);

        let key = RevealState::WaitingForKey { page_end: true };
        assert!(key.is_waiting());
        assert!(key.is_page_end());
        assert_eq!(key.wait_counter(), 0);
    }

    #[test]
    fn test_caret_movement() {
        let mut caret = Caret::default();
        caret.token_index = 3;
        caret.char_index = 2;
        caret.current_x = 50.0;

        caret.next_line(30.0);
        assert_eq!(caret.line, 1);
        assert_eq!(caret.token_index, 0);
        assert_eq!(caret.char_index, 0);
        assert_eq!(caret.current_x, 0.0);
        assert_eq!(caret.current_y, 30.0);

        caret.reset_page(12.0);
        assert_eq!(caret.line, 0);
        assert_eq!(caret.current_x, 12.0);
        assert_eq!(caret.current_y, 30.0);
    }

    #[test]
    fn test_state_serialization() {
        let state = RevealState::WaitingTimer {
            frames: 12,
            page_end: true,
        };
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: RevealState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
