//! # Config 模块
//!
//! 消息渲染配置，集中管理所有可调参数。
//!
//! 配置文件为 JSON，缺失字段使用默认值；文件不存在或解析失败时
//! 整体回退到默认配置并输出警告。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::easing::EasingFunction;
use crate::error::ConfigError;
use crate::style::{Color, TextStyle};

/// 未知控制码的处理策略
///
/// 无论哪种策略，未知控制码都作为零宽、无效果的 token 保留在行内。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownCodePolicy {
    /// 静默忽略
    Ignore,
    /// 输出警告日志
    #[default]
    Warn,
}

/// 消息框几何配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxConfig {
    /// 文本区宽度
    #[serde(default = "default_box_width")]
    pub width: f32,

    /// 文本区高度
    #[serde(default = "default_box_height")]
    pub height: f32,

    /// 行间距
    #[serde(default)]
    pub line_spacing: f32,

    /// 是否按单词换行（否则按字符换行）
    #[serde(default = "default_true")]
    pub word_wrap: bool,
}

/// 字体配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontConfig {
    /// 字体名称
    #[serde(default = "default_font_name")]
    pub name: String,

    /// 字号
    #[serde(default = "default_font_size")]
    pub size: f32,

    /// 默认文字颜色（`#RRGGBB`）
    #[serde(default = "default_font_color")]
    pub color: String,

    /// `<C:n>` 使用的调色板
    #[serde(default = "default_palette")]
    pub palette: Vec<String>,

    /// 注音字号与正文字号之比
    #[serde(default = "default_ruby_ratio")]
    pub ruby_ratio: f32,
}

/// 消息渲染配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSettings {
    /// 消息框
    #[serde(default)]
    pub text_box: BoxConfig,

    /// 字体
    #[serde(default)]
    pub font: FontConfig,

    /// 消息速度（0 - 4，越大越快）
    #[serde(default = "default_message_speed")]
    pub message_speed: f32,

    /// 帧率，用于把毫秒换算为帧
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// 页尾是否等待按键
    #[serde(default = "default_true")]
    pub wait_at_end: bool,

    /// 页尾自动等待的帧数（`wait_at_end` 为 false 时生效，0 表示不等待）
    #[serde(default)]
    pub wait_at_end_time: u32,

    /// 跳过模式下每次等待的最大帧数（0 表示瞬间跳过）
    #[serde(default)]
    pub skip_time: u32,

    /// 翻页淡出帧数（0 表示直接翻页）
    #[serde(default = "default_fade_frames")]
    pub fade_frames: u32,

    /// 翻页淡出缓动
    #[serde(default)]
    pub fade_easing: EasingFunction,

    /// NVL 模式：多条消息共享同一屏历史
    #[serde(default)]
    pub nvl: bool,

    /// 未知控制码策略
    #[serde(default)]
    pub unknown_code: UnknownCodePolicy,
}

fn default_true() -> bool {
    true
}

fn default_box_width() -> f32 {
    800.0
}

fn default_box_height() -> f32 {
    160.0
}

fn default_font_name() -> String {
    "default".to_string()
}

fn default_font_size() -> f32 {
    24.0
}

fn default_font_color() -> String {
    "#ffffff".to_string()
}

fn default_palette() -> Vec<String> {
    [
        "#ffffff", "#ff4040", "#40ff40", "#4080ff", "#ffff40", "#ff40ff", "#40ffff", "#808080",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ruby_ratio() -> f32 {
    0.5
}

fn default_message_speed() -> f32 {
    3.0
}

fn default_frame_rate() -> u32 {
    60
}

fn default_fade_frames() -> u32 {
    10
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self {
            width: default_box_width(),
            height: default_box_height(),
            line_spacing: 0.0,
            word_wrap: true,
        }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            name: default_font_name(),
            size: default_font_size(),
            color: default_font_color(),
            palette: default_palette(),
            ruby_ratio: default_ruby_ratio(),
        }
    }
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            text_box: BoxConfig::default(),
            font: FontConfig::default(),
            message_speed: default_message_speed(),
            frame_rate: default_frame_rate(),
            wait_at_end: true,
            wait_at_end_time: 0,
            skip_time: 0,
            fade_frames: default_fade_frames(),
            fade_easing: EasingFunction::default(),
            nvl: false,
            unknown_code: UnknownCodePolicy::default(),
        }
    }
}

/// 消息速度换算为每字符帧数：`11 - round(speed * 2.5)`，最小为 1
pub fn speed_from_message_speed(message_speed: f32) -> i32 {
    (11 - (message_speed * 2.5).round() as i32).max(1)
}

/// 毫秒换算为帧数
pub fn ms_to_frames(ms: f64, frame_rate: u32) -> u32 {
    (ms.max(0.0) / 1000.0 * f64::from(frame_rate)).round() as u32
}

impl MessageSettings {
    /// 加载配置文件
    ///
    /// 如果文件不存在或解析失败，返回默认配置并输出警告。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            warn!(path = ?path, "配置文件不存在，使用默认配置");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => {
                    info!(path = ?path, "配置文件加载成功");
                    settings
                }
                Err(e) => {
                    warn!(error = %e, "配置文件解析失败，使用默认配置");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "配置文件读取失败，使用默认配置");
                Self::default()
            }
        }
    }

    /// 从 JSON 字符串解析（严格模式，错误直接返回）
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// 保存配置到文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;

        fs::write(path, json).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.text_box.width <= 0.0 || self.text_box.height <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "消息框宽高必须大于 0".to_string(),
            ));
        }

        if self.font.size <= 0.0 {
            return Err(ConfigError::ValidationFailed("字号必须大于 0".to_string()));
        }

        if !(0.0..=4.0).contains(&self.message_speed) {
            return Err(ConfigError::ValidationFailed(
                "消息速度必须在 0 - 4 之间".to_string(),
            ));
        }

        if self.frame_rate == 0 {
            return Err(ConfigError::ValidationFailed("帧率必须大于 0".to_string()));
        }

        if self.font.ruby_ratio <= 0.0 || self.font.ruby_ratio > 1.0 {
            return Err(ConfigError::ValidationFailed(
                "注音字号比例必须在 (0, 1] 之间".to_string(),
            ));
        }

        if Color::from_hex(&self.font.color).is_none() {
            return Err(ConfigError::ValidationFailed(format!(
                "无效的文字颜色: {}",
                self.font.color
            )));
        }

        if let Some(bad) = self
            .font
            .palette
            .iter()
            .find(|c| Color::from_hex(c).is_none())
        {
            return Err(ConfigError::ValidationFailed(format!(
                "无效的调色板颜色: {bad}"
            )));
        }

        Ok(())
    }

    /// 正文基础样式
    pub fn base_style(&self) -> TextStyle {
        let color = Color::from_hex(&self.font.color).unwrap_or_default();
        TextStyle::new(self.font.name.clone(), self.font.size).with_color(color)
    }

    /// 调色板颜色
    pub fn palette_color(&self, index: usize) -> Option<Color> {
        self.font
            .palette
            .get(index)
            .and_then(|c| Color::from_hex(c))
    }

    /// 每字符帧数
    pub fn speed(&self) -> i32 {
        speed_from_message_speed(self.message_speed)
    }
}
