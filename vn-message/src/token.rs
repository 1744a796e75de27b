//! # Token 模块
//!
//! 消息标记解析后的 token 定义。
//!
//! ```text
//! "你好<W:500>世界"
//!   -> Text("你好"), Control{code: "W", values: [500]}, Text("世界")
//! ```

use serde::{Deserialize, Serialize};

use crate::style::{Size, TextStyle};

/// 控制码参数值
///
/// 斜杠分隔的参数逐段转换：能解析为数字的成为 `Number`，
/// 带引号或无法解析的成为 `Text`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Number(f64),
    Text(String),
}

impl ArgValue {
    /// 数值（文本参数尝试再解析一次）
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ArgValue::Number(n) => Some(*n),
            ArgValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// 非负整数 ID（只接受数值参数，带引号的数字仍是文本）
    pub fn as_id(&self) -> Option<u32> {
        let ArgValue::Number(n) = *self else {
            return None;
        };
        (n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64).then_some(n as u32)
    }

    /// 文本形式
    pub fn as_text(&self) -> String {
        match self {
            ArgValue::Number(n) => format_number(*n),
            ArgValue::Text(s) => s.clone(),
        }
    }

    /// 作为开关解析：`0`/`false`/`off` 为假，其余为真
    pub fn as_flag(&self) -> bool {
        match self {
            ArgValue::Number(n) => *n != 0.0,
            ArgValue::Text(s) => !matches!(
                s.to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            ),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Token 生命周期钩子
///
/// 在排版阶段由分发器挂到控制 token 上，揭示到该 token 时执行。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenHook {
    /// 压栈当前样式并切换为给定样式
    SwapStyle(TextStyle),
    /// 恢复 `SwapStyle` 之前的样式
    RestoreStyle,
}

/// 控制 token 的生命周期钩子
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenHooks {
    pub on_start: Option<TokenHook>,
    pub on_end: Option<TokenHook>,
}

/// 分发器挂到控制 token 上的元数据
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenMeta {
    /// 在行内预留的尺寸（注音、内联动画、变量）
    pub reserved: Option<Size>,
    /// 注音基文本宽度
    pub base_width: Option<f32>,
    /// 注音文本宽度
    pub ruby_width: Option<f32>,
    /// 替换文本（变量）
    pub substitution: Option<String>,
}

/// 控制 token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlToken {
    /// 代码（大写）
    pub code: String,
    /// 冒号之后的原始值
    pub raw_value: String,
    /// 解析后的参数列表
    pub values: Vec<ArgValue>,
    #[serde(default)]
    pub meta: TokenMeta,
    #[serde(default)]
    pub hooks: TokenHooks,
}

impl ControlToken {
    /// 从代码与原始值创建，同时解析参数
    pub fn new(code: impl Into<String>, raw_value: impl Into<String>) -> Self {
        let raw_value = raw_value.into();
        let values = if raw_value.is_empty() {
            Vec::new()
        } else {
            parse_values(&raw_value)
        };
        Self {
            code: code.into().to_ascii_uppercase(),
            raw_value,
            values,
            meta: TokenMeta::default(),
            hooks: TokenHooks::default(),
        }
    }

    /// 第 `index` 个参数
    pub fn value(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index)
    }

    /// 是否为超链接结束标记（`<LK:E>`）
    pub fn is_end_marker(&self) -> bool {
        self.raw_value.trim().eq_ignore_ascii_case("E")
    }

    /// 预留宽度，未预留时为 0
    pub fn reserved_width(&self) -> f32 {
        self.meta.reserved.map_or(0.0, |s| s.width)
    }
}

/// 解析斜杠分隔的参数
///
/// 引号内的斜杠不作为分隔符；带引号的段保留为文本并去掉引号。
pub fn parse_values(raw: &str) -> Vec<ArgValue> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in raw.chars() {
        match (quote, ch) {
            (None, '"' | '\'') => {
                quote = Some(ch);
                current.push(ch);
            }
            (Some(q), c) if c == q => {
                quote = None;
                current.push(ch);
            }
            (None, '/') => segments.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    segments.push(current);

    segments.iter().map(|s| coerce_segment(s)).collect()
}

fn coerce_segment(segment: &str) -> ArgValue {
    let trimmed = segment.trim();
    for q in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(q) && trimmed.ends_with(q) {
            return ArgValue::Text(trimmed[1..trimmed.len() - 1].to_string());
        }
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => ArgValue::Number(n),
        _ => ArgValue::Text(trimmed.to_string()),
    }
}

/// 标记 token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Token {
    /// 普通文本
    Text(String),
    /// 控制码
    Control(ControlToken),
}

impl Token {
    /// 创建文本 token
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// 创建控制 token
    pub fn control(code: impl Into<String>, raw_value: impl Into<String>) -> Self {
        Self::Control(ControlToken::new(code, raw_value))
    }

    /// 文本内容（控制 token 返回 None）
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Token::Text(s) => Some(s),
            Token::Control(_) => None,
        }
    }

    /// 可揭示的字符数（控制 token 视为一步）
    pub fn char_count(&self) -> usize {
        match self {
            Token::Text(s) => s.chars().count(),
            Token::Control(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_values_numbers_and_quotes() {
        let values = parse_values("12/\"34\"/name/ 5.5 ");
        assert_eq!(
            values,
            vec![
                ArgValue::Number(12.0),
                ArgValue::Text("34".to_string()),
                ArgValue::Text("name".to_string()),
                ArgValue::Number(5.5),
            ]
        );
    }

    #[test]
    fn test_parse_values_slash_inside_quotes() {
        let values = parse_values("'a/b'/c");
        assert_eq!(
            values,
            vec![
                ArgValue::Text("a/b".to_string()),
                ArgValue::Text("c".to_string())
            ]
        );
    }

    #[test]
    fn test_arg_value_conversions() {
        assert_eq!(ArgValue::Number(42.0).as_id(), Some(42));
        assert_eq!(ArgValue::Number(-1.0).as_id(), None);
        assert_eq!(ArgValue::Number(1.5).as_id(), None);
        assert_eq!(ArgValue::Text("7".to_string()).as_id(), None);
        assert_eq!(ArgValue::Text("7".to_string()).as_number(), Some(7.0));
        assert_eq!(ArgValue::Number(3.0).as_text(), "3");
        assert!(!ArgValue::Text("off".to_string()).as_flag());
        assert!(ArgValue::Number(1.0).as_flag());
    }

    #[test]
    fn test_control_token_code_uppercase() {
        let token = ControlToken::new("lk", "E");
        assert_eq!(token.code, "LK");
        assert!(token.is_end_marker());
        assert!(ControlToken::new("W", "").values.is_empty());
    }
}
