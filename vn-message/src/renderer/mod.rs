//! # Renderer 模块
//!
//! 消息渲染器：把一条 [`Message`] 排版、分页，并按帧逐字揭示到行表面上。
//!
//! ## 执行模型
//!
//! ```text
//! draw_formatted_text(message)
//!   -> tokenize -> calculate_lines -> calculate_max_lines -> 分配行表面
//! update()  // 每帧一次
//!   -> 处理等待 / 淡出 -> 揭示若干字符 -> 页尾 finish()
//! ```
//!
//! 渲染器不持有协作者，每次调用通过 [`Services`] 注入。
//!
//! ## 子模块
//!
//! - `reveal`：逐帧揭示、页尾处理、翻页
//! - `draw`：行表面上的文本与注音绘制

mod draw;
mod reveal;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::batch::{calculate_max_lines, is_batched};
use crate::config::MessageSettings;
use crate::dispatch::ControlRegistry;
use crate::layout::{Line, LineLayout, TokenMeasure};
use crate::message::Message;
use crate::services::{CharacterRecord, MessageEvent, ObjectId, Services, SpawnRequest, SurfaceId};
use crate::state::{Caret, RevealState};
use crate::style::{FontMetrics, Rect, Size, TextStyle};
use crate::token::{ControlToken, Token};
use crate::tokenizer::tokenize;

/// 一个行表面
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSurface {
    pub id: SurfaceId,
    /// 表面顶部在消息框内的 Y
    pub y: f32,
    pub height: f32,
    /// 所属消息在历史中的索引
    pub message: usize,
    /// 该行在所属消息全部行中的索引
    pub line: usize,
}

/// 超链接区域（消息框坐标）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRegion {
    pub region: Rect,
    pub common_event_id: u32,
    /// 样式化超链接的样式索引（普通超链接为 None）
    pub style_index: Option<u32>,
    /// 样式化超链接的标签文本
    pub text: String,
}

impl LinkRegion {
    /// 生成对应的场景对象请求
    pub fn spawn_request(&self) -> SpawnRequest {
        match self.style_index {
            None => SpawnRequest::Hotspot {
                region: self.region,
                common_event_id: self.common_event_id,
            },
            Some(style_index) => SpawnRequest::LinkLabel {
                region: self.region,
                text: self.text.clone(),
                style_index,
                common_event_id: self.common_event_id,
            },
        }
    }
}

/// 已生成的超链接
#[derive(Debug, Clone, PartialEq)]
pub struct LinkHotspot {
    pub object: ObjectId,
    pub link: LinkRegion,
}

/// 已开始、尚未遇到结束标记的超链接
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingLink {
    pub cx: f32,
    pub cy: f32,
    pub common_event_id: u32,
    pub style_index: Option<u32>,
    /// 揭示过程中累积的标签文本
    pub text: String,
}

/// 消息渲染器
pub struct MessageRenderer {
    pub(crate) settings: MessageSettings,
    registry: ControlRegistry,

    // ── 当前消息 ──
    pub(crate) tokens: Vec<Token>,
    /// 尚未翻过的行（当前页在前）
    pub(crate) lines: Vec<Line>,
    pub(crate) max_lines: usize,
    pub(crate) caret: Caret,
    pub(crate) state: RevealState,
    /// 已翻过的行数
    pub(crate) consumed_lines: usize,

    // ── 样式 ──
    pub(crate) base_style: TextStyle,
    pub(crate) style: TextStyle,
    pub(crate) style_stack: Vec<TextStyle>,
    /// 当前页每行行首的样式
    pub(crate) line_styles: Vec<TextStyle>,

    // ── 节奏 ──
    pub(crate) speed: i32,
    pub(crate) line_animation_count: i32,
    pub(crate) draw_immediately: bool,
    /// 玩家点击快进，只对当前页有效
    pub(crate) fast_forward_page: bool,
    pub(crate) wait_at_end: bool,
    pub(crate) wait_at_end_time: u32,
    pub(crate) skip: bool,
    pub(crate) skip_time: u32,
    /// 瞬间跳过期间：不绘制、不等待
    pub(crate) instant: bool,

    // ── 表面 ──
    pub(crate) surfaces: Vec<LineSurface>,
    pub(crate) page_start: usize,
    pub(crate) current_surface: Option<usize>,
    /// 读档后待重建的表面
    pub(crate) restored_surfaces: Vec<LineSurface>,

    // ── 场景对象 ──
    pub(crate) custom_objects: Vec<ObjectId>,
    pub(crate) pending_link: Option<PendingLink>,
    pub(crate) links: Vec<LinkHotspot>,
    /// 读档后待重建的超链接
    pub(crate) restored_links: Vec<LinkRegion>,
    pub(crate) active_character: Option<CharacterRecord>,

    /// 当前屏上的消息（NVL 模式下可能有多条）
    pub(crate) messages: Vec<Message>,
}

impl MessageRenderer {
    /// 创建渲染器，注册全部内置控制码
    pub fn new(settings: MessageSettings) -> Self {
        Self::with_registry(settings, ControlRegistry::with_builtins())
    }

    /// 使用自定义控制码注册表创建渲染器
    pub fn with_registry(settings: MessageSettings, registry: ControlRegistry) -> Self {
        let base_style = settings.base_style();
        let speed = settings.speed();
        let wait_at_end = settings.wait_at_end;
        let wait_at_end_time = settings.wait_at_end_time;
        let skip_time = settings.skip_time;
        Self {
            settings,
            registry,
            tokens: Vec::new(),
            lines: Vec::new(),
            max_lines: 0,
            caret: Caret::default(),
            state: RevealState::Idle,
            consumed_lines: 0,
            style: base_style.clone(),
            base_style,
            style_stack: Vec::new(),
            line_styles: Vec::new(),
            speed,
            line_animation_count: 0,
            draw_immediately: false,
            fast_forward_page: false,
            wait_at_end,
            wait_at_end_time,
            skip: false,
            skip_time,
            instant: false,
            surfaces: Vec::new(),
            page_start: 0,
            current_surface: None,
            restored_surfaces: Vec::new(),
            custom_objects: Vec::new(),
            pending_link: None,
            links: Vec::new(),
            restored_links: Vec::new(),
            active_character: None,
            messages: Vec::new(),
        }
    }

    // ========== 访问器 ==========

    pub fn settings(&self) -> &MessageSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ControlRegistry {
        &self.registry
    }

    /// 注册表（宿主可以追加自定义控制码）
    pub fn registry_mut(&mut self) -> &mut ControlRegistry {
        &mut self.registry
    }

    pub fn state(&self) -> RevealState {
        self.state
    }

    pub fn caret(&self) -> Caret {
        self.caret
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// 尚未翻过的行
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    pub fn consumed_lines(&self) -> usize {
        self.consumed_lines
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }

    pub fn surfaces(&self) -> &[LineSurface] {
        &self.surfaces
    }

    pub fn custom_objects(&self) -> &[ObjectId] {
        &self.custom_objects
    }

    pub fn links(&self) -> &[LinkHotspot] {
        &self.links
    }

    pub fn active_character(&self) -> Option<&CharacterRecord> {
        self.active_character.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn is_waiting(&self) -> bool {
        self.state.is_waiting()
    }

    /// 剩余行数是否超过一页
    pub fn is_batched(&self) -> bool {
        is_batched(self.lines.len(), self.max_lines)
    }

    /// 跳过模式（含瞬间跳过期间）
    pub fn is_skipping(&self) -> bool {
        self.skip || self.instant
    }

    // ========== 生命周期 ==========

    /// 开始显示一条消息
    ///
    /// 非 NVL 模式先清屏；NVL 模式在上一条消息下方接着排。
    pub fn draw_formatted_text(&mut self, message: &Message, ctx: &mut Services<'_>) {
        self.dispose_custom_objects(ctx);
        self.pending_link = None;

        if !self.settings.nvl {
            self.clear_surfaces(ctx);
            self.messages.clear();
            self.caret.current_y = 0.0;
        }

        self.base_style = self.message_base_style(message);
        self.style = self.base_style.clone();
        self.style_stack.clear();
        self.speed = self.settings.speed();
        self.draw_immediately = false;
        self.fast_forward_page = false;
        self.wait_at_end = self.settings.wait_at_end;
        self.wait_at_end_time = self.settings.wait_at_end_time;

        self.tokens = tokenize(&message.text);
        let tokens = self.tokens.clone();
        self.lines = self.calculate_lines(&tokens, self.settings.text_box.word_wrap, 0.0, ctx);
        self.consumed_lines = 0;

        // NVL 屏幕放不下新消息的首行时另起一屏
        if self.settings.nvl && self.caret.current_y > 0.0 {
            let first_height = self.lines.first().map_or(0.0, |l| l.height);
            if self.caret.current_y + first_height > self.settings.text_box.height {
                self.clear_surfaces(ctx);
                self.messages.clear();
                self.caret.current_y = 0.0;
            }
        }
        self.messages.push(message.clone());

        if let Some(voice) = message.voice() {
            ctx.audio.play_voice(voice);
        }

        debug!(
            tokens = self.tokens.len(),
            lines = self.lines.len(),
            "开始显示消息"
        );
        self.start_page(ctx);
    }

    /// 清屏：释放全部表面与场景对象，回到 Idle
    pub fn clear(&mut self, ctx: &mut Services<'_>) {
        self.dispose_custom_objects(ctx);
        self.clear_surfaces(ctx);
        self.messages.clear();
        self.tokens.clear();
        self.lines.clear();
        self.line_styles.clear();
        self.max_lines = 0;
        self.consumed_lines = 0;
        self.caret = Caret::default();
        self.pending_link = None;
        self.style = self.base_style.clone();
        self.style_stack.clear();
        self.state = RevealState::Idle;
    }

    /// 释放渲染器持有的全部资源
    pub fn dispose(mut self, ctx: &mut Services<'_>) {
        self.clear(ctx);
    }

    /// 以当前样式为起点排版 token
    ///
    /// 排版期间格式类控制码会修改样式，返回前恢复。
    pub fn calculate_lines(
        &mut self,
        tokens: &[Token],
        word_wrap: bool,
        start_x: f32,
        ctx: &mut Services<'_>,
    ) -> Vec<Line> {
        let saved_style = self.style.clone();
        let saved_stack = self.style_stack.clone();

        let layout = LineLayout::new(self.settings.text_box.width, word_wrap);
        let lines = {
            let mut measure = RendererMeasure {
                renderer: self,
                ctx,
            };
            layout.calculate_lines(tokens, start_x, &mut measure)
        };

        self.style = saved_style;
        self.style_stack = saved_stack;
        lines
    }

    /// 设置跳过模式
    pub fn set_skip(&mut self, skip: bool, skip_time: u32) {
        self.skip = skip;
        self.skip_time = skip_time;
    }

    // ========== 输入 ==========

    /// 玩家按下确认键
    ///
    /// 返回是否消费了这次输入。
    pub fn on_advance(&mut self, ctx: &mut Services<'_>) -> bool {
        match self.state {
            RevealState::WaitingForKey { page_end: false } => {
                self.state = RevealState::Running;
                true
            }
            RevealState::WaitingForKey { page_end: true }
            | RevealState::WaitingTimer { page_end: true, .. } => {
                self.continue_message(ctx);
                true
            }
            RevealState::Running => {
                self.fast_forward_page = true;
                true
            }
            _ => false,
        }
    }

    /// 命中测试，返回该点上的超链接对象
    pub fn hit_test(&self, x: f32, y: f32) -> Option<ObjectId> {
        self.links
            .iter()
            .find(|l| l.link.region.contains(x, y))
            .map(|l| l.object)
    }

    /// 点击超链接对象，调用其公共事件
    pub fn on_hotspot_click(&mut self, object: ObjectId, ctx: &mut Services<'_>) -> bool {
        let Some(link) = self.links.iter().find(|l| l.object == object) else {
            return false;
        };
        debug!(
            object,
            common_event = link.link.common_event_id,
            "点击超链接"
        );
        ctx.scene.call_common_event(link.link.common_event_id, &[]);
        true
    }

    // ========== 内部 ==========

    /// 消息的基础样式（角色颜色覆盖默认颜色）
    pub(crate) fn message_base_style(&self, message: &Message) -> TextStyle {
        let style = self.settings.base_style();
        match message.text_color() {
            Some(color) => style.with_color(color),
            None => style,
        }
    }

    /// 开始显示当前 `lines` 的第一页
    pub(crate) fn start_page(&mut self, ctx: &mut Services<'_>) {
        if self.lines.is_empty() {
            self.finish_message(ctx);
            return;
        }

        self.max_lines = calculate_max_lines(
            &self.lines,
            self.caret.current_y,
            self.settings.text_box.height,
            self.settings.text_box.line_spacing,
        );
        self.caret.reset_page(self.lines[0].offset_x);
        self.fast_forward_page = false;
        self.line_styles = vec![self.style.clone()];
        self.allocate_page_surfaces(ctx);
        self.line_animation_count = 0;
        self.state = RevealState::Running;

        debug!(
            max_lines = self.max_lines,
            remaining = self.lines.len(),
            "开始新的一页"
        );
    }

    /// 为当前页的每一行分配表面
    fn allocate_page_surfaces(&mut self, ctx: &mut Services<'_>) {
        let width = self.settings.text_box.width;
        let spacing = self.settings.text_box.line_spacing;
        let message = self.messages.len().saturating_sub(1);

        self.page_start = self.surfaces.len();
        let mut y = self.caret.current_y;
        for (index, line) in self.lines.iter().take(self.max_lines).enumerate() {
            let id = ctx.surfaces.create_surface(width, line.height);
            ctx.surfaces.set_surface_origin(id, 0.0, y);
            self.surfaces.push(LineSurface {
                id,
                y,
                height: line.height,
                message,
                line: self.consumed_lines + index,
            });
            y += line.height + spacing;
        }
        self.current_surface = Some(self.page_start);
    }

    pub(crate) fn current_surface_id(&self) -> Option<SurfaceId> {
        self.current_surface
            .and_then(|index| self.surfaces.get(index))
            .map(|s| s.id)
    }

    /// 当前行高度（行不存在时使用当前样式的行高）
    pub(crate) fn current_line_height(&self, ctx: &Services<'_>) -> f32 {
        match self.lines.get(self.caret.line) {
            Some(line) => line.height,
            None => ctx.surfaces.font_metrics(&self.style).line_height,
        }
    }

    pub(crate) fn clear_surfaces(&mut self, ctx: &mut Services<'_>) {
        for surface in self.surfaces.drain(..) {
            ctx.surfaces.dispose_surface(surface.id);
        }
        self.page_start = 0;
        self.current_surface = None;
    }

    pub(crate) fn dispose_custom_objects(&mut self, ctx: &mut Services<'_>) {
        for object in self.custom_objects.drain(..) {
            ctx.scene.remove_object(object);
        }
        self.links.clear();
    }

    /// 整条消息结束
    pub(crate) fn finish_message(&mut self, ctx: &mut Services<'_>) {
        self.state = RevealState::Finished;
        self.draw_immediately = false;
        self.fast_forward_page = false;
        debug!(consumed = self.consumed_lines, "消息显示完毕");
        ctx.events.emit(MessageEvent::MessageFinish);
    }
}

/// 排版期间把测量请求转给渲染器与表面提供者
struct RendererMeasure<'r, 'c> {
    renderer: &'r mut MessageRenderer,
    ctx: &'r mut Services<'c>,
}

impl TokenMeasure for RendererMeasure<'_, '_> {
    fn measure_text(&mut self, text: &str) -> Size {
        self.ctx.surfaces.measure_text(text, &self.renderer.style)
    }

    fn line_metrics(&mut self) -> FontMetrics {
        self.ctx.surfaces.font_metrics(&self.renderer.style)
    }

    fn measure_control(&mut self, token: &mut ControlToken) -> Option<Size> {
        self.renderer.measure_control_token(token, self.ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessHost;
    use crate::services::CommonEventRecord;

    fn settings() -> MessageSettings {
        let mut settings = MessageSettings::default();
        settings.message_speed = 4.0;
        settings.text_box.width = 240.0;
        settings.text_box.height = 60.0;
        settings
    }

    #[test]
    fn test_draw_formatted_text_prepares_page() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(settings());

        renderer.draw_formatted_text(
            &Message::narration("one\ntwo\nthree"),
            &mut host.services(),
        );

        assert_eq!(renderer.state(), RevealState::Running);
        assert_eq!(renderer.lines().len(), 3);
        // 24 号字行高 30，框高 60
        assert_eq!(renderer.max_lines(), 2);
        assert!(renderer.is_batched());
        assert_eq!(renderer.surfaces().len(), 2);
        assert_eq!(renderer.surfaces()[1].y, 30.0);
        assert_eq!(renderer.speed, 1);
    }

    #[test]
    fn test_empty_message_is_single_line() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(settings());

        renderer.draw_formatted_text(&Message::narration(""), &mut host.services());

        assert_eq!(renderer.lines().len(), 1);
        assert_eq!(renderer.max_lines(), 1);
        assert!(renderer.is_running());
    }

    #[test]
    fn test_calculate_lines_restores_style() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(settings());
        let before = renderer.style().clone();

        let tokens = tokenize("<C:#ff0000><B>red bold");
        let lines = renderer.calculate_lines(&tokens, true, 0.0, &mut host.services());

        assert_eq!(lines.len(), 1);
        assert_eq!(renderer.style(), &before);
    }

    #[test]
    fn test_voice_and_character_color() {
        use crate::message::CharacterRef;
        use crate::style::Color;

        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(settings());
        let message = Message::spoken(
            CharacterRef {
                id: 1,
                name: "北风".to_string(),
                text_color: Some(Color::rgb(255, 0, 0)),
                voice: Some("voice/001.ogg".to_string()),
            },
            "你好",
        );

        renderer.draw_formatted_text(&message, &mut host.services());

        assert_eq!(host.audio.voices, vec!["voice/001.ogg".to_string()]);
        assert_eq!(renderer.style().color, Color::rgb(255, 0, 0));
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(settings());
        renderer.draw_formatted_text(&Message::narration("a\nb"), &mut host.services());
        assert_eq!(host.surfaces.surfaces.len(), 2);

        renderer.clear(&mut host.services());

        assert_eq!(renderer.state(), RevealState::Idle);
        assert!(renderer.surfaces().is_empty());
        assert!(host.surfaces.surfaces.is_empty());
        assert!(renderer.lines().is_empty());
    }

    #[test]
    fn test_dispose_removes_spawned_objects() {
        let mut host = HeadlessHost::new();
        host.records.common_events.push(CommonEventRecord {
            id: 7,
            name: "look".to_string(),
        });
        let mut renderer = MessageRenderer::new(settings());
        renderer.draw_formatted_text(
            &Message::narration("<LK:7>look<LK:E>"),
            &mut host.services(),
        );
        renderer.on_advance(&mut host.services());
        renderer.update(&mut host.services());
        assert_eq!(host.scene.objects.len(), 1);

        renderer.dispose(&mut host.services());

        assert!(host.scene.objects.is_empty());
        assert_eq!(host.scene.removed.len(), 1);
        assert!(host.surfaces.surfaces.is_empty());
    }

    #[test]
    fn test_on_advance_during_running_fast_forwards() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(settings());
        renderer.draw_formatted_text(&Message::narration("abcdef"), &mut host.services());

        assert!(renderer.on_advance(&mut host.services()));
        renderer.update(&mut host.services());

        // 一帧内揭示完整页并停在页尾
        assert_eq!(
            renderer.state(),
            RevealState::WaitingForKey { page_end: true }
        );
        assert_eq!(host.events.events, vec![MessageEvent::MessageWaiting]);
    }

    #[test]
    fn test_click_fast_forward_only_lasts_one_page() {
        let mut host = HeadlessHost::new();
        let mut config = settings();
        config.fade_frames = 0;
        let mut renderer = MessageRenderer::new(config);
        renderer.draw_formatted_text(&Message::narration("one\ntwo\nthree"), &mut host.services());

        // 1. 第一页点击快进
        renderer.on_advance(&mut host.services());
        renderer.update(&mut host.services());
        assert_eq!(
            renderer.state(),
            RevealState::WaitingForKey { page_end: true }
        );

        // 2. 翻到第二页后恢复逐字揭示
        renderer.on_advance(&mut host.services());
        assert_eq!(renderer.state(), RevealState::Running);
        renderer.update(&mut host.services());

        assert_eq!(renderer.state(), RevealState::Running);
        assert_eq!(renderer.caret().char_index, 1);
        assert_eq!(host.surfaces.surface_text(renderer.surfaces()[0].id), "t");
    }

    #[test]
    fn test_draw_immediately_code_lasts_whole_message() {
        let mut host = HeadlessHost::new();
        let mut config = settings();
        config.fade_frames = 0;
        let mut renderer = MessageRenderer::new(config);
        renderer.draw_formatted_text(&Message::narration("<DI>one\ntwo\nthree"), &mut host.services());

        renderer.update(&mut host.services());
        renderer.on_advance(&mut host.services());
        renderer.update(&mut host.services());

        assert_eq!(
            renderer.state(),
            RevealState::WaitingForKey { page_end: true }
        );
        assert_eq!(renderer.consumed_lines(), 2);
    }

    #[test]
    fn test_nvl_appends_below_previous_message() {
        let mut host = HeadlessHost::new();
        let mut config = settings();
        config.nvl = true;
        config.text_box.height = 200.0;
        let mut renderer = MessageRenderer::new(config);

        renderer.draw_formatted_text(&Message::narration("first"), &mut host.services());
        renderer.on_advance(&mut host.services());
        renderer.update(&mut host.services());
        renderer.on_advance(&mut host.services());
        assert_eq!(renderer.state(), RevealState::Finished);

        renderer.draw_formatted_text(&Message::narration("second"), &mut host.services());

        assert_eq!(renderer.surfaces().len(), 2);
        assert_eq!(renderer.surfaces()[0].message, 0);
        assert_eq!(renderer.surfaces()[1].message, 1);
        assert_eq!(renderer.surfaces()[1].y, 30.0);
    }

    #[test]
    fn test_nvl_overflow_starts_new_screen() {
        let mut host = HeadlessHost::new();
        let mut config = settings();
        config.nvl = true;
        let mut renderer = MessageRenderer::new(config);

        // 1. 第一条消息占满两行高的消息框
        renderer.draw_formatted_text(&Message::narration("a\nb"), &mut host.services());
        renderer.on_advance(&mut host.services());
        renderer.update(&mut host.services());
        renderer.on_advance(&mut host.services());
        assert_eq!(renderer.state(), RevealState::Finished);
        assert_eq!(renderer.caret().current_y, 60.0);
        let old: Vec<SurfaceId> = renderer.surfaces().iter().map(|s| s.id).collect();

        // 2. 第二条消息放不下，清屏后从顶部开始
        renderer.draw_formatted_text(&Message::narration("c"), &mut host.services());

        assert_eq!(host.surfaces.disposed, old);
        assert_eq!(renderer.surfaces().len(), 1);
        assert_eq!(renderer.surfaces()[0].y, 0.0);
        assert_eq!(renderer.surfaces()[0].message, 0);
        assert_eq!(renderer.caret().current_y, 0.0);
        assert_eq!(renderer.max_lines(), 1);
    }
}
