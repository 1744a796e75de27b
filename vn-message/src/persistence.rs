//! # Persistence 模块
//!
//! 渲染器的存档包：把可序列化的渲染状态导出为 [`RendererBundle`]，
//! 读档时恢复状态并重建表面与超链接。
//!
//! ## 恢复策略
//!
//! - 表面句柄与场景对象句柄不进存档，读档后由 [`MessageRenderer::on_data_bundle_restore`] 重建
//! - 重建时重新分词、排版，整行重绘所有可见行
//! - 进行中的消息统一恢复为页尾等待按键，玩家按键后从下一页继续
//!   （不重放页内已触发过的副作用）

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::BundleError;
use crate::layout::Line;
use crate::message::Message;
use crate::renderer::{LineSurface, LinkRegion, MessageRenderer};
use crate::services::{CharacterRecord, Services};
use crate::state::{Caret, RevealState};
use crate::style::TextStyle;
use crate::token::Token;
use crate::tokenizer::tokenize;

/// 存档包格式版本
///
/// - MAJOR: 不兼容的格式变更
/// - MINOR: 向后兼容的新字段
pub const BUNDLE_VERSION_MAJOR: u32 = 1;
pub const BUNDLE_VERSION_MINOR: u32 = 0;

/// 存档包版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleVersion {
    pub major: u32,
    pub minor: u32,
}

impl BundleVersion {
    pub fn current() -> Self {
        Self {
            major: BUNDLE_VERSION_MAJOR,
            minor: BUNDLE_VERSION_MINOR,
        }
    }

    /// major 相同即兼容
    pub fn is_compatible(&self) -> bool {
        self.major == BUNDLE_VERSION_MAJOR
    }
}

impl Default for BundleVersion {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for BundleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// 渲染器存档包
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererBundle {
    pub version: BundleVersion,
    pub state: RevealState,
    pub caret: Caret,
    pub max_lines: usize,
    pub tokens: Vec<Token>,
    /// 尚未翻过的行
    pub lines: Vec<Line>,
    pub consumed_lines: usize,
    pub base_style: TextStyle,
    pub style: TextStyle,
    pub line_styles: Vec<TextStyle>,
    pub speed: i32,
    pub line_animation_count: i32,
    pub draw_immediately: bool,
    pub wait_at_end: bool,
    pub wait_at_end_time: u32,
    pub skip: bool,
    pub skip_time: u32,
    /// 表面几何（句柄读档后失效）
    pub surfaces: Vec<LineSurface>,
    pub page_start: usize,
    pub current_surface: Option<usize>,
    pub links: Vec<LinkRegion>,
    pub active_character: Option<CharacterRecord>,
    /// 当前屏上的消息
    pub messages: Vec<Message>,
}

impl RendererBundle {
    pub fn to_json(&self) -> Result<String, BundleError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BundleError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, BundleError> {
        let bundle: RendererBundle = serde_json::from_str(json)
            .map_err(|e| BundleError::DeserializationFailed(e.to_string()))?;

        if !bundle.version.is_compatible() {
            return Err(BundleError::IncompatibleVersion {
                bundle_version: bundle.version.to_string(),
                current_version: BundleVersion::current().to_string(),
            });
        }

        Ok(bundle)
    }
}

impl MessageRenderer {
    /// 导出存档包
    pub fn to_data_bundle(&self) -> RendererBundle {
        RendererBundle {
            version: BundleVersion::current(),
            state: self.state,
            caret: self.caret,
            max_lines: self.max_lines,
            tokens: self.tokens.clone(),
            lines: self.lines.clone(),
            consumed_lines: self.consumed_lines,
            base_style: self.base_style.clone(),
            style: self.style.clone(),
            line_styles: self.line_styles.clone(),
            speed: self.speed,
            line_animation_count: self.line_animation_count,
            draw_immediately: self.draw_immediately,
            wait_at_end: self.wait_at_end,
            wait_at_end_time: self.wait_at_end_time,
            skip: self.skip,
            skip_time: self.skip_time,
            surfaces: self.surfaces.clone(),
            page_start: self.page_start,
            current_surface: self.current_surface,
            links: self.links.iter().map(|l| l.link.clone()).collect(),
            active_character: self.active_character.clone(),
            messages: self.messages.clone(),
        }
    }

    /// 从存档包恢复状态
    ///
    /// 只恢复数据，不触碰协作者；随后必须调用
    /// [`MessageRenderer::on_data_bundle_restore`] 重建画面。
    pub fn restore(&mut self, bundle: RendererBundle) {
        self.tokens = bundle.tokens;
        self.lines = bundle.lines;
        self.max_lines = bundle.max_lines;
        self.consumed_lines = bundle.consumed_lines;
        self.caret = bundle.caret;
        self.base_style = bundle.base_style;
        self.style = bundle.style;
        self.style_stack.clear();
        self.line_styles = bundle.line_styles;
        self.speed = bundle.speed;
        self.line_animation_count = bundle.line_animation_count;
        self.draw_immediately = bundle.draw_immediately;
        self.fast_forward_page = false;
        self.wait_at_end = bundle.wait_at_end;
        self.wait_at_end_time = bundle.wait_at_end_time;
        self.skip = bundle.skip;
        self.skip_time = bundle.skip_time;
        self.page_start = bundle.page_start;
        self.current_surface = bundle.current_surface;
        self.active_character = bundle.active_character;
        self.messages = bundle.messages;
        self.pending_link = None;
        self.instant = false;

        // 旧句柄失效，等待重建
        self.surfaces.clear();
        self.custom_objects.clear();
        self.links.clear();
        self.restored_links = bundle.links;

        if let Some(last) = bundle.surfaces.last() {
            self.caret.current_y = last.y + last.height + self.settings.text_box.line_spacing;
        }
        self.restored_surfaces = bundle.surfaces;

        self.state = match bundle.state {
            RevealState::Idle => RevealState::Idle,
            RevealState::Finished => RevealState::Finished,
            RevealState::WaitingForKey { page_end: true } => {
                RevealState::WaitingForKey { page_end: true }
            }
            _ => {
                // 页内进行中：跳到页尾等待按键
                self.caret.line = self.max_lines;
                self.caret.token_index = 0;
                self.caret.char_index = 0;
                RevealState::WaitingForKey { page_end: true }
            }
        };

        info!(
            state = ?self.state,
            lines = self.lines.len(),
            surfaces = self.restored_surfaces.len(),
            "渲染器状态已恢复"
        );
    }

    /// 读档后重建表面并重绘
    pub fn on_data_bundle_restore(&mut self, ctx: &mut Services<'_>) {
        let records = std::mem::take(&mut self.restored_surfaces);
        let width = self.settings.text_box.width;
        let word_wrap = self.settings.text_box.word_wrap;
        let live_style = self.style.clone();

        for (index, message) in self.messages.clone().iter().enumerate() {
            let tokens = tokenize(&message.text);
            let mut style = self.message_base_style(message);

            self.style = style.clone();
            let lines = self.calculate_lines(&tokens, word_wrap, 0.0, ctx);

            for (line_index, line) in lines.iter().enumerate() {
                let record = records
                    .iter()
                    .find(|r| r.message == index && r.line == line_index);
                let surface = record.map(|record| {
                    let id = ctx.surfaces.create_surface(width, record.height);
                    ctx.surfaces.set_surface_origin(id, 0.0, record.y);
                    self.surfaces.push(LineSurface { id, ..*record });
                    id
                });
                style = self.draw_line_with_style(line, surface, style, ctx);
            }
        }
        self.style = live_style;

        for link in std::mem::take(&mut self.restored_links) {
            self.spawn_link(link, ctx);
        }

        debug!(
            surfaces = self.surfaces.len(),
            links = self.links.len(),
            "读档后画面已重建"
        );
    }
}
