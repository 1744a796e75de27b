//! # Headless 模块
//!
//! 协作者的内存实现，用于测试与无窗口宿主。
//!
//! - 字体度量为等宽近似：ASCII 字符宽 `size / 2`，其余字符宽 `size`，
//!   行高 `size * 1.25`，下沉 `size / 4`
//! - 表面只记录文本块，不做光栅化
//! - 记录表可以从 JSON 加载

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::easing::EasingFunction;
use crate::error::ConfigError;
use crate::services::{
    AnimationHandle, Animator, AudioPlayer, CharacterRecord, CommonEventRecord, EventEmitter,
    ExpressionRecord, MessageEvent, ObjectId, RecordKey, RecordTable, Scene, Services,
    SoundRecord, SpawnRequest, SurfaceId, SurfaceProvider,
};
use crate::style::{Color, FontMetrics, Rect, Size, TextStyle};
use crate::token::ArgValue;

/// 一次文本绘制
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub surface: SurfaceId,
    pub x: f32,
    pub y: f32,
    pub text: String,
    pub size: f32,
    pub color: Color,
}

/// 表面上的一段文本
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub text: String,
}

/// 内存表面
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurface {
    pub width: f32,
    pub height: f32,
    pub x: f32,
    pub y: f32,
    pub runs: Vec<TextRun>,
}

/// 内存表面提供者
#[derive(Debug, Default)]
pub struct HeadlessSurfaces {
    next_id: SurfaceId,
    pub surfaces: BTreeMap<SurfaceId, HeadlessSurface>,
    pub draw_log: Vec<DrawCall>,
    pub disposed: Vec<SurfaceId>,
}

impl HeadlessSurfaces {
    pub fn char_width(ch: char, style: &TextStyle) -> f32 {
        if ch.is_ascii() {
            style.size * 0.5
        } else {
            style.size
        }
    }

    /// 表面正文行的文本（按 X 排序拼接，不含注音）
    pub fn surface_text(&self, id: SurfaceId) -> String {
        let Some(surface) = self.surfaces.get(&id) else {
            return String::new();
        };
        let baseline = surface.runs.iter().map(|r| r.y).fold(0.0_f32, f32::max);
        Self::join_row(surface, baseline)
    }

    /// 表面注音行的文本
    pub fn ruby_text(&self, id: SurfaceId) -> String {
        let Some(surface) = self.surfaces.get(&id) else {
            return String::new();
        };
        let baseline = surface.runs.iter().map(|r| r.y).fold(0.0_f32, f32::max);
        if baseline <= 0.0 {
            return String::new();
        }
        Self::join_row(surface, 0.0)
    }

    fn join_row(surface: &HeadlessSurface, y: f32) -> String {
        let mut runs: Vec<&TextRun> = surface
            .runs
            .iter()
            .filter(|r| (r.y - y).abs() < 0.01)
            .collect();
        runs.sort_by(|a, b| a.x.total_cmp(&b.x));
        runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// 屏幕上所有表面的正文，按表面位置从上到下
    pub fn screen_text(&self) -> Vec<String> {
        let mut surfaces: Vec<(&SurfaceId, &HeadlessSurface)> = self.surfaces.iter().collect();
        surfaces.sort_by(|a, b| a.1.y.total_cmp(&b.1.y));
        surfaces
            .into_iter()
            .map(|(id, _)| self.surface_text(*id))
            .collect()
    }
}

impl SurfaceProvider for HeadlessSurfaces {
    fn create_surface(&mut self, width: f32, height: f32) -> SurfaceId {
        self.next_id += 1;
        self.surfaces.insert(
            self.next_id,
            HeadlessSurface {
                width,
                height,
                ..Default::default()
            },
        );
        self.next_id
    }

    fn dispose_surface(&mut self, surface: SurfaceId) {
        if self.surfaces.remove(&surface).is_some() {
            self.disposed.push(surface);
        }
    }

    fn set_surface_origin(&mut self, surface: SurfaceId, x: f32, y: f32) {
        if let Some(s) = self.surfaces.get_mut(&surface) {
            s.x = x;
            s.y = y;
        }
    }

    fn measure_text(&self, text: &str, style: &TextStyle) -> Size {
        let width = text
            .chars()
            .filter(|c| *c != '\n')
            .map(|c| Self::char_width(c, style))
            .sum();
        Size::new(width, self.font_metrics(style).line_height)
    }

    fn font_metrics(&self, style: &TextStyle) -> FontMetrics {
        FontMetrics {
            line_height: style.size * 1.25,
            descent: style.size * 0.25,
        }
    }

    fn draw_text(&mut self, surface: SurfaceId, x: f32, y: f32, text: &str, style: &TextStyle) {
        let width = self.measure_text(text, style).width;
        self.draw_log.push(DrawCall {
            surface,
            x,
            y,
            text: text.to_string(),
            size: style.size,
            color: style.color,
        });

        if let Some(s) = self.surfaces.get_mut(&surface) {
            // 同一行上被覆盖的文本块
            s.runs
                .retain(|r| (r.y - y).abs() >= 0.01 || r.x < x || r.x >= x + width.max(0.01));
            s.runs.push(TextRun {
                x,
                y,
                width,
                text: text.to_string(),
            });
        }
    }

    fn clear_rect(&mut self, surface: SurfaceId, rect: Rect) {
        if let Some(s) = self.surfaces.get_mut(&surface) {
            s.runs.retain(|r| !rect.contains(r.x, r.y));
        }
    }
}

/// 内存场景
#[derive(Debug, Default)]
pub struct HeadlessScene {
    next_id: ObjectId,
    pub objects: BTreeMap<ObjectId, SpawnRequest>,
    pub removed: Vec<ObjectId>,
    pub common_events: Vec<(u32, Vec<ArgValue>)>,
    pub characters: Vec<CharacterRecord>,
    pub expressions: Vec<(Option<u32>, ExpressionRecord)>,
}

impl Scene for HeadlessScene {
    fn add_object(&mut self, request: SpawnRequest) -> ObjectId {
        self.next_id += 1;
        self.objects.insert(self.next_id, request);
        self.next_id
    }

    fn remove_object(&mut self, object: ObjectId) {
        if self.objects.remove(&object).is_some() {
            self.removed.push(object);
        }
    }

    fn call_common_event(&mut self, event_id: u32, params: &[ArgValue]) {
        self.common_events.push((event_id, params.to_vec()));
    }

    fn change_character(&mut self, character: &CharacterRecord) {
        self.characters.push(character.clone());
    }

    fn change_expression(&mut self, character_id: Option<u32>, expression: &ExpressionRecord) {
        self.expressions.push((character_id, expression.clone()));
    }
}

/// 记录所有发出的事件
#[derive(Debug, Default)]
pub struct RecordingEvents {
    pub events: Vec<MessageEvent>,
}

impl RecordingEvents {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.iter().map(MessageEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.iter().filter(|e| e.name() == name).count()
    }
}

impl EventEmitter for RecordingEvents {
    fn emit(&mut self, event: MessageEvent) {
        self.events.push(event);
    }
}

/// 进行中的淡出
#[derive(Debug, Clone)]
struct Fade {
    surfaces: Vec<SurfaceId>,
    easing: EasingFunction,
    elapsed: u32,
    frames: u32,
}

impl Fade {
    fn opacity(&self) -> f32 {
        self.easing
            .fade_out_opacity(self.elapsed as f32 / self.frames as f32)
    }
}

/// 帧计数动画器，每次 [`HeadlessAnimator::tick`] 推进一帧
#[derive(Debug, Default)]
pub struct HeadlessAnimator {
    next_id: AnimationHandle,
    running: BTreeMap<AnimationHandle, Fade>,
    pub started: Vec<(Vec<SurfaceId>, EasingFunction, u32)>,
}

impl HeadlessAnimator {
    pub fn tick(&mut self) {
        for fade in self.running.values_mut() {
            fade.elapsed += 1;
        }
        self.running.retain(|_, fade| fade.elapsed < fade.frames);
    }

    pub fn is_idle(&self) -> bool {
        self.running.is_empty()
    }

    /// 动画当前的不透明度，已结束的动画返回 None
    pub fn opacity(&self, animation: AnimationHandle) -> Option<f32> {
        self.running.get(&animation).map(Fade::opacity)
    }

    /// 表面当前的不透明度（不在淡出中为 1）
    pub fn surface_opacity(&self, surface: SurfaceId) -> f32 {
        self.running
            .values()
            .filter(|fade| fade.surfaces.contains(&surface))
            .map(Fade::opacity)
            .fold(1.0, f32::min)
    }
}

impl Animator for HeadlessAnimator {
    fn disappear(
        &mut self,
        surfaces: &[SurfaceId],
        easing: EasingFunction,
        frames: u32,
    ) -> AnimationHandle {
        self.next_id += 1;
        if frames > 0 {
            self.running.insert(
                self.next_id,
                Fade {
                    surfaces: surfaces.to_vec(),
                    easing,
                    elapsed: 0,
                    frames,
                },
            );
        }
        self.started.push((surfaces.to_vec(), easing, frames));
        self.next_id
    }

    fn is_finished(&self, animation: AnimationHandle) -> bool {
        !self.running.contains_key(&animation)
    }
}

/// 记录播放请求的音频
#[derive(Debug, Default)]
pub struct HeadlessAudio {
    pub voices: Vec<String>,
    pub sounds: Vec<(String, f32)>,
}

impl AudioPlayer for HeadlessAudio {
    fn play_voice(&mut self, clip: &str) {
        self.voices.push(clip.to_string());
    }

    fn play_sound(&mut self, clip: &str, volume: f32) {
        self.sounds.push((clip.to_string(), volume));
    }
}

/// 内存记录表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordBook {
    #[serde(default)]
    pub characters: Vec<CharacterRecord>,
    #[serde(default)]
    pub expressions: Vec<ExpressionRecord>,
    #[serde(default)]
    pub common_events: Vec<CommonEventRecord>,
    #[serde(default)]
    pub sounds: Vec<SoundRecord>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub animations: BTreeMap<u32, Size>,
}

impl RecordBook {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&content)
    }
}

impl RecordTable for RecordBook {
    fn character(&self, key: &RecordKey) -> Option<CharacterRecord> {
        self.characters
            .iter()
            .find(|r| key.matches(r.id, &r.name))
            .cloned()
    }

    fn expression(&self, key: &RecordKey) -> Option<ExpressionRecord> {
        self.expressions
            .iter()
            .find(|r| key.matches(r.id, &r.name))
            .cloned()
    }

    fn common_event(&self, key: &RecordKey) -> Option<CommonEventRecord> {
        self.common_events
            .iter()
            .find(|r| key.matches(r.id, &r.name))
            .cloned()
    }

    fn sound(&self, key: &RecordKey) -> Option<SoundRecord> {
        self.sounds
            .iter()
            .find(|r| key.matches(r.id, &r.name))
            .cloned()
    }

    fn variable(&self, name: &str) -> Option<String> {
        self.variables.get(name).cloned()
    }

    fn animation_frame_size(&self, animation_id: u32) -> Option<Size> {
        self.animations.get(&animation_id).copied()
    }
}

/// 全部内存协作者
#[derive(Debug, Default)]
pub struct HeadlessHost {
    pub surfaces: HeadlessSurfaces,
    pub scene: HeadlessScene,
    pub events: RecordingEvents,
    pub animator: HeadlessAnimator,
    pub audio: HeadlessAudio,
    pub records: RecordBook,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: RecordBook) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// 借出注入给渲染器的协作者集合
    pub fn services(&mut self) -> Services<'_> {
        Services {
            surfaces: &mut self.surfaces,
            scene: &mut self.scene,
            events: &mut self.events,
            animator: &mut self.animator,
            audio: &mut self.audio,
            records: &self.records,
        }
    }
}
