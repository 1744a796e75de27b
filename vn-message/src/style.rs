//! # Style 模块
//!
//! 文本样式与几何基础类型。

use serde::{Deserialize, Serialize};

/// RGBA 颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    /// 不透明颜色
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// 解析 `#RRGGBB` 或 `#RRGGBBAA`
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Self {
                r: channel(0)?,
                g: channel(2)?,
                b: channel(4)?,
                a: channel(6)?,
            }),
            _ => None,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// 尺寸
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// 矩形区域
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 点是否落在矩形内（左上闭、右下开）
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// 字体纵向度量
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FontMetrics {
    /// 行高
    pub line_height: f32,
    /// 基线以下的高度
    pub descent: f32,
}

/// 文本样式
///
/// 控制码中的格式类代码（颜色、字号、粗体等）只修改这个结构。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    /// 字体名称（由 SurfaceProvider 解释）
    pub font_name: String,
    /// 字号（像素）
    pub size: f32,
    pub color: Color,
    pub bold: bool,
    pub italic: bool,
    pub outline: bool,
    pub shadow: bool,
}

impl TextStyle {
    /// 以给定字体和字号创建默认样式
    pub fn new(font_name: impl Into<String>, size: f32) -> Self {
        Self {
            font_name: font_name.into(),
            size,
            color: Color::WHITE,
            bold: false,
            italic: false,
            outline: false,
            shadow: false,
        }
    }

    /// 设置颜色
    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// 按比例缩放字号后的样式（注音文本使用）
    pub fn scaled(&self, ratio: f32) -> Self {
        Self {
            size: self.size * ratio,
            ..self.clone()
        }
    }
}

impl Default for TextStyle {
    fn default() -> Self {
        Self::new("default", 24.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_from_hex() {
        assert_eq!(Color::from_hex("#ff8000"), Some(Color::rgb(255, 128, 0)));
        assert_eq!(
            Color::from_hex("#00000080"),
            Some(Color {
                r: 0,
                g: 0,
                b: 0,
                a: 128
            })
        );
        assert_eq!(Color::from_hex("ff8000"), None);
        assert_eq!(Color::from_hex("#ff80"), None);
        assert_eq!(Color::from_hex("#gg0000"), None);
    }

    #[test]
    fn test_rect_contains() {
        let rect = Rect::new(10.0, 10.0, 20.0, 5.0);
        assert!(rect.contains(10.0, 10.0));
        assert!(rect.contains(29.9, 14.9));
        assert!(!rect.contains(30.0, 12.0));
        assert!(!rect.contains(5.0, 12.0));
    }

    #[test]
    fn test_scaled_style_keeps_decoration() {
        let mut style = TextStyle::new("serif", 20.0);
        style.bold = true;
        let ruby = style.scaled(0.5);
        assert_eq!(ruby.size, 10.0);
        assert!(ruby.bold);
        assert_eq!(ruby.font_name, "serif");
    }
}
