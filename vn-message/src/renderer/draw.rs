//! 行表面绘制
//!
//! 文本按基线对齐：行的基线位于 `height - descent`，
//! 每段文本根据自身字体度量计算顶部 Y。注音绘制在行顶部。

use super::MessageRenderer;
use crate::layout::Line;
use crate::services::{Services, SurfaceId};
use crate::style::{Rect, TextStyle};
use crate::token::{ArgValue, ControlToken, Token, TokenHook};

/// 绘制目标行
#[derive(Debug, Clone, Copy)]
pub(crate) struct LineTarget {
    pub surface: SurfaceId,
    pub height: f32,
    pub descent: f32,
}

impl MessageRenderer {
    /// 当前揭示行的绘制目标
    pub(crate) fn line_target(&self, line_index: usize) -> Option<LineTarget> {
        let surface = self.current_surface_id()?;
        let line = self.lines.get(line_index)?;
        Some(LineTarget {
            surface,
            height: line.height,
            descent: line.descent,
        })
    }

    /// 以当前样式测量文本宽度（忽略换行符）
    pub(crate) fn measure_plain(&self, text: &str, ctx: &Services<'_>) -> f32 {
        let visible: String = text.chars().filter(|c| *c != '\n').collect();
        if visible.is_empty() {
            return 0.0;
        }
        ctx.surfaces.measure_text(&visible, &self.style).width
    }

    /// 当前样式的文本在目标行内的顶部 Y
    pub(crate) fn text_top(&self, target: LineTarget, ctx: &Services<'_>) -> f32 {
        let metrics = ctx.surfaces.font_metrics(&self.style);
        (target.height - target.descent - (metrics.line_height - metrics.descent)).max(0.0)
    }

    /// 重绘当前文本 token 已揭示的部分
    pub(crate) fn draw_next(&mut self, text: &str, ctx: &mut Services<'_>) {
        if self.instant {
            return;
        }
        let Some(target) = self.line_target(self.caret.line) else {
            return;
        };

        let visible: String = text
            .chars()
            .take(self.caret.char_index)
            .filter(|c| *c != '\n')
            .collect();
        if visible.is_empty() {
            return;
        }

        let width = ctx.surfaces.measure_text(&visible, &self.style).width;
        let y = self.text_top(target, ctx);
        ctx.surfaces.clear_rect(
            target.surface,
            Rect::new(self.caret.current_x, 0.0, width, target.height),
        );
        ctx.surfaces
            .draw_text(target.surface, self.caret.current_x, y, &visible, &self.style);
    }

    /// 绘制控制 token 的可见部分（变量替换文本、注音）
    pub(crate) fn draw_control(
        &mut self,
        control: &ControlToken,
        target: LineTarget,
        x: f32,
        ctx: &mut Services<'_>,
    ) {
        if let Some(text) = &control.meta.substitution {
            let y = self.text_top(target, ctx);
            ctx.surfaces.draw_text(target.surface, x, y, text, &self.style);
        }

        if let Some(ruby_width) = control.meta.ruby_width {
            let advance = control.reserved_width();
            let base_width = control.meta.base_width.unwrap_or(0.0);
            let base = control.value(0).map(ArgValue::as_text).unwrap_or_default();
            let ruby = control.value(1).map(ArgValue::as_text).unwrap_or_default();

            self.run_hook(control.hooks.on_start.as_ref());
            ctx.surfaces.draw_text(
                target.surface,
                x + (advance - ruby_width) / 2.0,
                0.0,
                &ruby,
                &self.style,
            );
            self.run_hook(control.hooks.on_end.as_ref());

            let y = self.text_top(target, ctx);
            ctx.surfaces.draw_text(
                target.surface,
                x + (advance - base_width) / 2.0,
                y,
                &base,
                &self.style,
            );
        }
    }

    pub(crate) fn run_hook(&mut self, hook: Option<&TokenHook>) {
        match hook {
            Some(TokenHook::SwapStyle(style)) => {
                let previous = std::mem::replace(&mut self.style, style.clone());
                self.style_stack.push(previous);
            }
            Some(TokenHook::RestoreStyle) => {
                if let Some(previous) = self.style_stack.pop() {
                    self.style = previous;
                }
            }
            None => {}
        }
    }

    /// 整行重绘当前页的第 `index` 行
    pub(crate) fn draw_line_full(&mut self, index: usize, ctx: &mut Services<'_>) {
        let Some(surface) = self.surfaces.get(self.page_start + index).map(|s| s.id) else {
            return;
        };
        let Some(line) = self.lines.get(index).cloned() else {
            return;
        };
        let start = self
            .line_styles
            .get(index)
            .cloned()
            .unwrap_or_else(|| self.base_style.clone());
        self.draw_line_with_style(&line, Some(surface), start, ctx);
    }

    /// 以 `start_style` 为行首样式重放一整行
    ///
    /// 控制码只做格式处理，不触发副作用。`surface` 为 None 时只推进样式。
    /// 返回行尾样式，渲染器的当前样式保持不变。
    pub(crate) fn draw_line_with_style(
        &mut self,
        line: &Line,
        surface: Option<SurfaceId>,
        start_style: TextStyle,
        ctx: &mut Services<'_>,
    ) -> TextStyle {
        let live_style = std::mem::replace(&mut self.style, start_style);
        let live_stack = std::mem::take(&mut self.style_stack);

        let target = surface.map(|surface| LineTarget {
            surface,
            height: line.height,
            descent: line.descent,
        });
        if let Some(target) = target {
            ctx.surfaces.clear_rect(
                target.surface,
                Rect::new(0.0, 0.0, self.settings.text_box.width, line.height),
            );
        }

        let mut x = line.offset_x;
        for token in &line.tokens {
            match token {
                Token::Text(text) => {
                    let visible: String = text.chars().filter(|c| *c != '\n').collect();
                    if visible.is_empty() {
                        continue;
                    }
                    if let Some(target) = target {
                        let y = self.text_top(target, ctx);
                        ctx.surfaces
                            .draw_text(target.surface, x, y, &visible, &self.style);
                    }
                    x += ctx.surfaces.measure_text(&visible, &self.style).width;
                }
                Token::Control(control) => {
                    let mut control = control.clone();
                    self.process_control_token(&mut control, ctx, true);
                    if let Some(target) = target {
                        self.draw_control(&control, target, x, ctx);
                    }
                    x += control.reserved_width();
                }
            }
        }

        self.style_stack = live_stack;
        std::mem::replace(&mut self.style, live_style)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::MessageSettings;
    use crate::headless::HeadlessHost;
    use crate::message::Message;
    use crate::renderer::MessageRenderer;
    use crate::style::Color;

    fn settings() -> MessageSettings {
        let mut settings = MessageSettings::default();
        settings.message_speed = 4.0;
        settings.text_box.width = 600.0;
        settings.text_box.height = 200.0;
        settings
    }

    #[test]
    fn test_partial_redraw_replaces_prefix() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(settings());
        renderer.draw_formatted_text(&Message::narration("你好"), &mut host.services());

        renderer.update(&mut host.services());
        renderer.update(&mut host.services());

        let surface = renderer.surfaces()[0].id;
        assert_eq!(host.surfaces.surface_text(surface), "你好");
        let texts: Vec<&str> = host
            .surfaces
            .draw_log
            .iter()
            .map(|c| c.text.as_str())
            .collect();
        assert_eq!(texts, vec!["你", "你好"]);
    }

    #[test]
    fn test_ruby_drawn_above_base() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(settings());
        renderer.draw_formatted_text(
            &Message::narration("<RT:漢字/かんじ>です"),
            &mut host.services(),
        );
        renderer.on_advance(&mut host.services());
        renderer.update(&mut host.services());

        let surface = renderer.surfaces()[0].id;
        assert_eq!(host.surfaces.surface_text(surface), "漢字です");
        assert_eq!(host.surfaces.ruby_text(surface), "かんじ");

        let ruby_call = host
            .surfaces
            .draw_log
            .iter()
            .find(|c| c.text == "かんじ")
            .unwrap();
        // 注音使用缩小的字号
        assert_eq!(ruby_call.size, 12.0);
        // 注音之后恢复正文样式
        assert_eq!(renderer.style().size, 24.0);
    }

    #[test]
    fn test_variable_substitution_drawn() {
        let mut host = HeadlessHost::new();
        host.records
            .variables
            .insert("hero".to_string(), "Alice".to_string());
        let mut renderer = MessageRenderer::new(settings());
        renderer.draw_formatted_text(
            &Message::narration("Hi <V:hero>!"),
            &mut host.services(),
        );
        renderer.on_advance(&mut host.services());
        renderer.update(&mut host.services());

        let surface = renderer.surfaces()[0].id;
        assert_eq!(host.surfaces.surface_text(surface), "Hi Alice!");
    }

    #[test]
    fn test_color_applies_to_following_text() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(settings());
        renderer.draw_formatted_text(
            &Message::narration("a<C:#ff0000>b<C>c"),
            &mut host.services(),
        );
        renderer.on_advance(&mut host.services());
        renderer.update(&mut host.services());

        let colors: Vec<(String, Color)> = host
            .surfaces
            .draw_log
            .iter()
            .map(|c| (c.text.clone(), c.color))
            .collect();
        assert_eq!(
            colors,
            vec![
                ("a".to_string(), Color::WHITE),
                ("b".to_string(), Color::rgb(255, 0, 0)),
                ("c".to_string(), Color::WHITE),
            ]
        );
    }
}
