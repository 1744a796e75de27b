//! # Message 模块
//!
//! 一条待显示的消息：标记文本加上说话者信息。

use serde::{Deserialize, Serialize};

use crate::style::Color;

/// 说话者信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRef {
    /// 角色 ID
    pub id: u32,
    /// 显示名称
    pub name: String,
    /// 该角色台词的文字颜色（None 使用默认颜色）
    #[serde(default)]
    pub text_color: Option<Color>,
    /// 随消息播放的语音
    #[serde(default)]
    pub voice: Option<String>,
}

/// 消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// 标记文本
    pub text: String,
    /// 说话者（None 表示旁白）
    #[serde(default)]
    pub character: Option<CharacterRef>,
}

impl Message {
    /// 旁白消息
    pub fn narration(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            character: None,
        }
    }

    /// 角色台词
    pub fn spoken(character: CharacterRef, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            character: Some(character),
        }
    }

    /// 文字颜色覆盖
    pub fn text_color(&self) -> Option<Color> {
        self.character.as_ref().and_then(|c| c.text_color)
    }

    /// 语音
    pub fn voice(&self) -> Option<&str> {
        self.character.as_ref().and_then(|c| c.voice.as_deref())
    }
}
