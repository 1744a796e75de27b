//! # VN Message
//!
//! Visual Novel 消息文本渲染库。
//!
//! ## 架构概述
//!
//! `vn-message` 把一段带控制码的消息标记逐字揭示到消息框里。
//! 它不依赖任何窗口、字体或音频后端，所有外部能力通过 [`Services`] 注入：
//!
//! ```text
//! Host                                  Renderer
//!   │                                      │
//!   │── draw_formatted_text(message) ────►│ tokenize → layout → 分页
//!   │── update() 每帧 ───────────────────►│ 揭示字符 / 等待 / 翻页
//!   │◄── SurfaceProvider::draw_text ───────│
//!   │◄── EventEmitter::emit(事件) ─────────│
//!   │── on_advance() 玩家按键 ───────────►│
//! ```
//!
//! ## 核心类型
//!
//! - [`MessageRenderer`]：渲染器本体
//! - [`Token`]：分词结果
//! - [`Line`]：排好的一行
//! - [`RevealState`]：揭示状态机
//! - [`ControlRegistry`]：控制码注册表
//! - [`RendererBundle`]：存档包
//!
//! ## 使用示例
//!
//! ```ignore
//! use vn_message::{HeadlessHost, Message, MessageRenderer, MessageSettings};
//!
//! let mut host = HeadlessHost::new();
//! let mut renderer = MessageRenderer::new(MessageSettings::default());
//!
//! renderer.draw_formatted_text(&Message::narration("你好<W:500>世界"), &mut host.services());
//! while renderer.is_running() {
//!     renderer.update(&mut host.services());
//!     host.animator.tick();
//!     if renderer.state().is_page_end() {
//!         renderer.on_advance(&mut host.services());
//!     }
//! }
//! ```
//!
//! ## 模块结构
//!
//! - [`token`] / [`tokenizer`]：标记分词
//! - [`layout`]：行排版与自动换行
//! - [`batch`]：分页规划
//! - [`state`] / [`renderer`]：揭示状态机
//! - [`dispatch`]：控制码分发
//! - [`persistence`]：存档包
//! - [`diagnostic`]：标记静态检查
//! - [`headless`]：协作者的内存实现

pub mod batch;
pub mod config;
pub mod diagnostic;
pub mod dispatch;
pub mod easing;
pub mod error;
pub mod headless;
pub mod layout;
pub mod message;
pub mod persistence;
pub mod renderer;
pub mod services;
pub mod state;
pub mod style;
pub mod token;
pub mod tokenizer;

// 重导出核心类型
pub use batch::{calculate_max_lines, is_batched};
pub use config::{MessageSettings, UnknownCodePolicy, ms_to_frames, speed_from_message_speed};
pub use diagnostic::{Diagnostic, DiagnosticLevel, DiagnosticResult, analyze_markup};
pub use dispatch::{ControlCode, ControlHandler, ControlRegistry};
pub use easing::EasingFunction;
pub use error::{BundleError, ConfigError, MessageError, MessageResult};
pub use headless::{HeadlessHost, RecordBook};
pub use layout::{Line, LineLayout, TokenMeasure};
pub use message::{CharacterRef, Message};
pub use persistence::{BundleVersion, RendererBundle};
pub use renderer::{LineSurface, LinkHotspot, LinkRegion, MessageRenderer};
pub use services::{
    AnimationHandle, Animator, AudioPlayer, EventEmitter, MessageEvent, ObjectId, RecordKey,
    RecordTable, Scene, Services, SpawnRequest, SurfaceId, SurfaceProvider,
};
pub use state::{Caret, RevealState};
pub use style::{Color, FontMetrics, Rect, Size, TextStyle};
pub use token::{ArgValue, ControlToken, Token};
pub use tokenizer::tokenize;
