//! 逐帧揭示
//!
//! `update` 每帧调用一次。揭示一次前进一步：文本 token 一个字符，
//! 控制 token 整个算一步。

use tracing::debug;

use super::{LinkHotspot, LinkRegion, MessageRenderer};
use crate::batch::is_batched;
use crate::services::{MessageEvent, Services, SurfaceId};
use crate::state::RevealState;
use crate::style::Rect;
use crate::token::Token;

impl MessageRenderer {
    /// 每帧驱动
    pub fn update(&mut self, ctx: &mut Services<'_>) {
        match self.state {
            RevealState::Idle | RevealState::Finished => return,
            RevealState::FadingOut { animation } => {
                if ctx.animator.is_finished(animation) {
                    self.execute_batch(ctx);
                }
                return;
            }
            _ => {}
        }

        if let RevealState::WaitingForKey { page_end } = self.state {
            if !self.skip {
                return;
            }
            // 跳过模式下按键等待变为计时等待
            self.state = RevealState::WaitingTimer {
                frames: self.skip_time,
                page_end,
            };
        }

        if let RevealState::WaitingTimer { frames, page_end } = self.state {
            let frames = if self.skip {
                frames.min(self.skip_time)
            } else {
                frames
            };
            if frames > 1 {
                self.state = RevealState::WaitingTimer {
                    frames: frames - 1,
                    page_end,
                };
                return;
            }
            if page_end {
                self.continue_message(ctx);
                return;
            }
            self.state = RevealState::Running;
        }

        if self.state != RevealState::Running {
            return;
        }

        if self.skip && self.skip_time == 0 {
            self.instant_skip(ctx);
        } else {
            self.reveal_burst(ctx);
        }
    }

    fn fast_forward(&self) -> bool {
        self.draw_immediately || self.fast_forward_page || self.skip
    }

    /// 本帧应揭示的字符
    fn reveal_burst(&mut self, ctx: &mut Services<'_>) {
        if self.skip {
            self.line_animation_count = 0;
        } else {
            self.line_animation_count -= 1;
        }

        while self.state == RevealState::Running
            && (self.fast_forward() || self.line_animation_count <= 0)
        {
            if self.caret.line >= self.max_lines {
                self.finish(ctx);
                break;
            }

            self.next_char(ctx);

            if self.state == RevealState::Running && self.caret.line >= self.max_lines {
                self.finish(ctx);
                break;
            }
            if !self.fast_forward() {
                self.line_animation_count = self.speed;
            }
        }
    }

    /// 揭示一步
    pub fn next_char(&mut self, ctx: &mut Services<'_>) {
        let line_index = self.caret.line;
        let token_index = self.caret.token_index;

        let Some(line) = self.lines.get(line_index) else {
            return;
        };
        let Some(token) = line.tokens.get(token_index).cloned() else {
            self.next_line();
            return;
        };

        match token {
            Token::Text(text) => self.reveal_text_char(&text, ctx),
            Token::Control(mut control) => {
                self.process_control_token(&mut control, ctx, false);

                if !self.instant {
                    if let Some(target) = self.line_target(line_index) {
                        self.draw_control(&control, target, self.caret.current_x, ctx);
                    }
                }
                self.caret.current_x += control.reserved_width();

                if let Some(slot) = self
                    .lines
                    .get_mut(line_index)
                    .and_then(|l| l.tokens.get_mut(token_index))
                {
                    *slot = Token::Control(control);
                }
                self.advance_token();
            }
        }
    }

    fn reveal_text_char(&mut self, text: &str, ctx: &mut Services<'_>) {
        let len = text.chars().count();

        if self.caret.char_index < len {
            let ch = text.chars().nth(self.caret.char_index);
            self.caret.char_index += 1;

            if let (Some(link), Some(ch)) = (self.pending_link.as_mut(), ch) {
                if ch != '\n' {
                    link.text.push(ch);
                }
            }
            self.draw_next(text, ctx);
        }

        if self.caret.char_index >= len {
            self.caret.current_x += self.measure_plain(text, ctx);
            self.advance_token();
        }
    }

    fn advance_token(&mut self) {
        self.caret.token_index += 1;
        self.caret.char_index = 0;

        let line_len = self
            .lines
            .get(self.caret.line)
            .map_or(0, |l| l.tokens.len());
        if self.caret.token_index >= line_len {
            self.next_line();
        }
    }

    fn next_line(&mut self) {
        let height = self.lines.get(self.caret.line).map_or(0.0, |l| l.height);
        self.caret
            .next_line(height + self.settings.text_box.line_spacing);

        if self.caret.line < self.max_lines {
            self.current_surface = Some(self.page_start + self.caret.line);
            self.line_styles.push(self.style.clone());
            if let Some(line) = self.lines.get(self.caret.line) {
                self.caret.current_x = line.offset_x;
            }
        }
    }

    /// 当前页揭示完毕
    ///
    /// 根据 `wait_at_end` / `wait_at_end_time` 停在页尾，或直接继续。
    pub fn finish(&mut self, ctx: &mut Services<'_>) {
        if self.skip && self.skip_time == 0 {
            self.continue_message(ctx);
            return;
        }

        if self.wait_at_end {
            self.state = RevealState::WaitingForKey { page_end: true };
            ctx.events.emit(MessageEvent::MessageWaiting);
        } else if self.wait_at_end_time > 0 {
            self.state = RevealState::WaitingTimer {
                frames: self.wait_at_end_time,
                page_end: true,
            };
        } else {
            self.continue_message(ctx);
        }
    }

    /// 页尾继续：还有下一页则淡出翻页，否则结束消息
    pub fn continue_message(&mut self, ctx: &mut Services<'_>) {
        if !is_batched(self.lines.len(), self.max_lines) {
            self.finish_message(ctx);
            return;
        }

        if self.settings.fade_frames == 0 {
            self.execute_batch(ctx);
            return;
        }

        let surfaces: Vec<SurfaceId> = self.surfaces.iter().map(|s| s.id).collect();
        let animation = ctx.animator.disappear(
            &surfaces,
            self.settings.fade_easing,
            self.settings.fade_frames,
        );
        self.state = RevealState::FadingOut { animation };
    }

    /// 翻页：丢弃当前页的行，在清空的消息框里显示下一页
    pub fn execute_batch(&mut self, ctx: &mut Services<'_>) {
        let consumed = self.max_lines.min(self.lines.len());
        self.lines.drain(..consumed);
        self.consumed_lines += consumed;

        if self.pending_link.take().is_some() {
            debug!("超链接跨页未结束，已丢弃");
        }
        self.dispose_custom_objects(ctx);
        self.clear_surfaces(ctx);
        self.caret.current_y = 0.0;

        if self.lines.is_empty() {
            self.finish_message(ctx);
            return;
        }

        debug!(remaining = self.lines.len(), "翻页");
        ctx.events.emit(MessageEvent::MessageBatch {
            remaining_lines: self.lines.len(),
        });
        self.start_page(ctx);
    }

    /// 瞬间跳过当前页
    ///
    /// 不绘制地揭示到页尾（副作用照常触发一次），再整行重绘。
    pub fn instant_skip(&mut self, ctx: &mut Services<'_>) {
        if self.state != RevealState::Running {
            return;
        }

        let first_line = self.caret.line;
        self.instant = true;
        while self.state == RevealState::Running && self.caret.line < self.max_lines {
            self.next_char(ctx);
        }
        self.instant = false;

        let last_line = self.max_lines.min(self.lines.len());
        for index in first_line..last_line {
            self.draw_line_full(index, ctx);
        }

        if self.state == RevealState::Running {
            self.finish(ctx);
        }
    }

    /// 结束一个超链接，生成热区对象
    pub(crate) fn close_link(&mut self, ctx: &mut Services<'_>) {
        let Some(pending) = self.pending_link.take() else {
            debug!("超链接结束标记没有对应的开始标记");
            return;
        };

        let line_height = self.current_line_height(ctx);
        let same_line = (self.caret.current_y - pending.cy).abs() < f32::EPSILON;
        let (width, height) = if same_line {
            (self.caret.current_x - pending.cx, line_height)
        } else {
            (
                self.settings.text_box.width - pending.cx,
                self.caret.current_y + line_height - pending.cy,
            )
        };

        let link = LinkRegion {
            region: Rect::new(pending.cx, pending.cy, width.max(0.0), height),
            common_event_id: pending.common_event_id,
            style_index: pending.style_index,
            text: pending.text,
        };
        self.spawn_link(link, ctx);
    }

    pub(crate) fn spawn_link(&mut self, link: LinkRegion, ctx: &mut Services<'_>) {
        let object = ctx.scene.add_object(link.spawn_request());
        debug!(
            object,
            common_event = link.common_event_id,
            "生成超链接"
        );
        self.custom_objects.push(object);
        self.links.push(LinkHotspot { object, link });
    }
}
