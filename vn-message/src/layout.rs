//! # Layout 模块
//!
//! 行排版引擎：把 token 流按消息框宽度切分为若干 [`Line`]。
//!
//! ## 换行规则
//!
//! - 贪心填充：片段在宽度允许时追加到当前行
//! - 按单词换行时，单词带着其后的空白作为一个片段；CJK 字符各自成为片段
//! - 行尾空白允许越界悬挂，不触发换行
//! - 超过整行宽度的单词按字符强制折断
//! - `\n` 为硬换行，保留在所在行文本的末尾
//! - 控制码通过 [`TokenMeasure::measure_control`] 测量，`None` 表示零宽
//!
//! 排版只切分文本 token，不增删、不重排 token：把所有行的 token
//! 依次拼接（合并相邻文本）即得到输入。

use serde::{Deserialize, Serialize};

use crate::style::{FontMetrics, Size};
use crate::token::{ControlToken, Token};

/// 排好的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub tokens: Vec<Token>,
    /// 从行左边缘起算的总宽度（含起始偏移与行尾空白）
    pub width: f32,
    pub height: f32,
    pub descent: f32,
    /// 去掉行尾空白后的宽度
    pub content_width: f32,
    /// 行起始 X（仅消息首行可能非 0）
    pub offset_x: f32,
}

impl Line {
    /// 行内可揭示的字符数（控制 token 计为 1）
    pub fn char_count(&self) -> usize {
        self.tokens.iter().map(Token::char_count).sum()
    }

    /// 行内纯文本
    pub fn plain_text(&self) -> String {
        self.tokens.iter().filter_map(Token::as_text).collect()
    }
}

/// 排版期间的测量接口
///
/// 实现者持有"当前样式"：格式类控制码在 `measure_control` 中修改它，
/// 之后的 `measure_text` / `line_metrics` 反映修改后的样式。
pub trait TokenMeasure {
    /// 以当前样式测量文本
    fn measure_text(&mut self, text: &str) -> Size;

    /// 当前样式的纵向度量
    fn line_metrics(&mut self) -> FontMetrics;

    /// 测量控制码，`None` 表示不占空间
    fn measure_control(&mut self, token: &mut ControlToken) -> Option<Size>;
}

/// 行排版参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineLayout {
    pub max_width: f32,
    pub word_wrap: bool,
}

struct LineBuilder {
    tokens: Vec<Token>,
    pending: String,
    offset_x: f32,
    x: f32,
    trailing: f32,
    height: f32,
    descent: f32,
}

impl LineBuilder {
    fn new(offset_x: f32) -> Self {
        Self {
            tokens: Vec::new(),
            pending: String::new(),
            offset_x,
            x: offset_x,
            trailing: 0.0,
            height: 0.0,
            descent: 0.0,
        }
    }

    fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.pending.is_empty()
    }

    fn flush_text(&mut self) {
        if !self.pending.is_empty() {
            self.tokens.push(Token::Text(std::mem::take(&mut self.pending)));
        }
    }

    fn push_text(&mut self, piece: &str, width: f32, trailing: f32, metrics: FontMetrics) {
        self.pending.push_str(piece);
        self.x += width;
        self.trailing = if trailing >= width {
            self.trailing + width
        } else {
            trailing
        };
        self.height = self.height.max(metrics.line_height);
        self.descent = self.descent.max(metrics.descent);
    }

    fn push_control(&mut self, control: ControlToken, size: Option<Size>) {
        self.flush_text();
        self.tokens.push(Token::Control(control));
        if let Some(size) = size {
            self.x += size.width;
            self.height = self.height.max(size.height);
            if size.width > 0.0 {
                self.trailing = 0.0;
            }
        }
    }

    fn finish(mut self, metrics: FontMetrics) -> Line {
        self.flush_text();
        if self.tokens.is_empty() {
            self.tokens.push(Token::Text(String::new()));
        }
        if self.height <= 0.0 {
            self.height = metrics.line_height;
            self.descent = metrics.descent;
        }
        Line {
            tokens: self.tokens,
            width: self.x,
            height: self.height,
            descent: self.descent,
            content_width: (self.x - self.trailing).max(self.offset_x),
            offset_x: self.offset_x,
        }
    }
}

impl LineLayout {
    pub fn new(max_width: f32, word_wrap: bool) -> Self {
        Self {
            max_width,
            word_wrap,
        }
    }

    /// 计算行列表
    ///
    /// `start_x` 为首行的起始偏移，后续行从 0 开始。结果至少包含一行。
    pub fn calculate_lines(
        &self,
        tokens: &[Token],
        start_x: f32,
        measure: &mut dyn TokenMeasure,
    ) -> Vec<Line> {
        let mut lines = Vec::new();
        let mut line = LineBuilder::new(start_x);

        for token in tokens {
            match token {
                Token::Control(control) => {
                    let mut control = control.clone();
                    let size = measure.measure_control(&mut control);
                    let overflows =
                        size.is_some_and(|s| line.x > 0.0 && line.x + s.width > self.max_width);
                    if overflows {
                        let metrics = measure.line_metrics();
                        break_line(&mut line, &mut lines, metrics);
                    }
                    line.push_control(control, size);
                }
                Token::Text(text) => self.layout_text(text, &mut line, &mut lines, measure),
            }
        }

        if !line.is_empty() || lines.is_empty() {
            let metrics = measure.line_metrics();
            lines.push(line.finish(metrics));
        }

        lines
    }

    fn layout_text(
        &self,
        text: &str,
        line: &mut LineBuilder,
        lines: &mut Vec<Line>,
        measure: &mut dyn TokenMeasure,
    ) {
        for (i, segment) in text.split('\n').enumerate() {
            if i > 0 {
                line.pending.push('\n');
                let metrics = measure.line_metrics();
                break_line(line, lines, metrics);
            }

            for piece in split_pieces(segment, self.word_wrap) {
                self.place_piece(piece, line, lines, measure);
            }
        }
    }

    fn place_piece(
        &self,
        piece: &str,
        line: &mut LineBuilder,
        lines: &mut Vec<Line>,
        measure: &mut dyn TokenMeasure,
    ) {
        let width = measure.measure_text(piece).width;
        let trailing = trailing_width(piece, measure);
        let metrics = measure.line_metrics();

        // 行尾空白允许悬挂
        if line.x + width - trailing <= self.max_width {
            line.push_text(piece, width, trailing, metrics);
            return;
        }

        if line.x > 0.0 {
            break_line(line, lines, metrics);
        }

        if width - trailing <= self.max_width {
            line.push_text(piece, width, trailing, metrics);
            return;
        }

        // 单词比整行还宽：按字符折断
        for (idx, ch) in piece.char_indices() {
            let part = &piece[idx..idx + ch.len_utf8()];
            let w = measure.measure_text(part).width;
            let t = if ch.is_whitespace() { w } else { 0.0 };
            if line.x > 0.0 && line.x + w - t > self.max_width {
                break_line(line, lines, metrics);
            }
            line.push_text(part, w, t, metrics);
        }
    }
}

/// 结束当前行并开始新行
fn break_line(line: &mut LineBuilder, lines: &mut Vec<Line>, metrics: FontMetrics) {
    let finished = std::mem::replace(line, LineBuilder::new(0.0));
    lines.push(finished.finish(metrics));
}

fn trailing_width(piece: &str, measure: &mut dyn TokenMeasure) -> f32 {
    let trimmed = piece.trim_end();
    if trimmed.len() == piece.len() {
        0.0
    } else {
        measure.measure_text(&piece[trimmed.len()..]).width
    }
}

/// CJK 字符之间总是允许换行
fn is_break_anywhere(ch: char) -> bool {
    matches!(ch as u32,
        0x2E80..=0x9FFF | 0xAC00..=0xD7AF | 0xF900..=0xFAFF | 0xFF00..=0xFFEF)
}

/// 切分换行片段
fn split_pieces(segment: &str, word_wrap: bool) -> Vec<&str> {
    if !word_wrap {
        return segment
            .char_indices()
            .map(|(i, ch)| &segment[i..i + ch.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    let mut in_space = false;

    for (i, ch) in segment.char_indices() {
        let end_of_word = in_space && !ch.is_whitespace();
        if i > start && (end_of_word || is_break_anywhere(ch)) {
            pieces.push(&segment[start..i]);
            start = i;
        }
        in_space = ch.is_whitespace();
        if is_break_anywhere(ch) {
            pieces.push(&segment[start..i + ch.len_utf8()]);
            start = i + ch.len_utf8();
            in_space = false;
        }
    }
    if start < segment.len() {
        pieces.push(&segment[start..]);
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    /// 等宽测量：每字符 10px，行高 20，`<IMG>` 占 30×40
    struct FixedMeasure;

    impl TokenMeasure for FixedMeasure {
        fn measure_text(&mut self, text: &str) -> Size {
            Size::new(text.chars().filter(|c| *c != '\n').count() as f32 * 10.0, 20.0)
        }

        fn line_metrics(&mut self) -> FontMetrics {
            FontMetrics {
                line_height: 20.0,
                descent: 4.0,
            }
        }

        fn measure_control(&mut self, token: &mut ControlToken) -> Option<Size> {
            (token.code == "IMG").then_some(Size::new(30.0, 40.0))
        }
    }

    fn layout(markup: &str, width: f32, word_wrap: bool) -> Vec<Line> {
        LineLayout::new(width, word_wrap).calculate_lines(&tokenize(markup), 0.0, &mut FixedMeasure)
    }

    fn texts(lines: &[Line]) -> Vec<String> {
        lines.iter().map(Line::plain_text).collect()
    }

    /// 合并相邻文本 token，便于比较
    fn normalized(tokens: impl IntoIterator<Item = Token>) -> Vec<Token> {
        let mut out: Vec<Token> = Vec::new();
        for token in tokens {
            if let Token::Text(s) = &token {
                if s.is_empty() {
                    continue;
                }
                if let Some(Token::Text(prev)) = out.last_mut() {
                    prev.push_str(s);
                    continue;
                }
            }
            out.push(token);
        }
        out
    }

    #[test]
    fn test_single_line_fits() {
        let lines = layout("hello", 100.0, true);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].width, 50.0);
        assert_eq!(lines[0].height, 20.0);
        assert_eq!(lines[0].descent, 4.0);
    }

    #[test]
    fn test_word_wrap_breaks_at_word_boundary() {
        let lines = layout("hello world foo", 100.0, true);
        assert_eq!(texts(&lines), vec!["hello ", "world foo"]);
        assert_eq!(lines[0].content_width, 50.0);
        assert_eq!(lines[0].width, 60.0);
    }

    #[test]
    fn test_trailing_space_may_hang() {
        // "abcd " 宽 50，但去掉空格后正好 40
        let lines = layout("abcd efgh", 40.0, true);
        assert_eq!(texts(&lines), vec!["abcd ", "efgh"]);
    }

    #[test]
    fn test_char_wrap() {
        let lines = layout("abcdefghijkl", 50.0, false);
        assert_eq!(texts(&lines), vec!["abcde", "fghij", "kl"]);
    }

    #[test]
    fn test_long_word_is_broken_by_chars() {
        let lines = layout("ab abcdefghij", 50.0, true);
        assert_eq!(texts(&lines), vec!["ab ", "abcde", "fghij"]);
    }

    #[test]
    fn test_cjk_breaks_anywhere() {
        let lines = layout("今日は良い天気です", 50.0, true);
        assert_eq!(texts(&lines), vec!["今日は良い", "天気です"]);
    }

    #[test]
    fn test_hard_line_break() {
        let lines = layout("one\ntwo", 500.0, true);
        assert_eq!(texts(&lines), vec!["one\n", "two"]);
        assert_eq!(lines[0].width, 30.0);
    }

    #[test]
    fn test_trailing_newline_does_not_add_empty_line() {
        let lines = layout("one\n", 500.0, true);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_sized_control_wraps_and_raises_height() {
        let lines = layout("abcd<IMG>ef", 60.0, true);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].plain_text(), "abcd");
        assert_eq!(lines[1].height, 40.0);
        assert_eq!(lines[1].width, 50.0);
    }

    #[test]
    fn test_zero_width_control_never_wraps() {
        let lines = layout("abcde<W:100>", 50.0, true);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].tokens.len(), 2);
    }

    #[test]
    fn test_empty_message_has_one_empty_line() {
        let lines = layout("", 100.0, true);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].tokens, vec![Token::text("")]);
        assert_eq!(lines[0].height, 20.0);
    }

    #[test]
    fn test_start_x_offsets_first_line_only() {
        let lines = LineLayout::new(100.0, true).calculate_lines(
            &tokenize("aaaa bbbb cccc"),
            50.0,
            &mut FixedMeasure,
        );
        assert_eq!(texts(&lines), vec!["aaaa ", "bbbb cccc"]);
        assert_eq!(lines[0].offset_x, 50.0);
        assert_eq!(lines[1].offset_x, 0.0);
    }

    #[test]
    fn test_layout_preserves_token_sequence() {
        let samples = [
            "Hi<W:500>there",
            "hello world, this is a rather long sentence<C:1>with color<IMG>and image",
            "one\ntwo\n\nthree<LK:4>link<LK:E>",
            "今日は<RT:天気/てんき>が良い",
            "",
        ];
        for markup in samples {
            for word_wrap in [true, false] {
                let tokens = tokenize(markup);
                let lines = layout(markup, 70.0, word_wrap);
                let steps: usize = lines.iter().map(Line::char_count).sum();
                assert_eq!(steps, tokens.iter().map(Token::char_count).sum::<usize>());
                let flattened = lines.into_iter().flat_map(|l| l.tokens);
                assert_eq!(normalized(flattened), normalized(tokens), "{markup:?}");
            }
        }
    }
}
