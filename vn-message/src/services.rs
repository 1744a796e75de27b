//! # Services 模块
//!
//! 渲染器依赖的外部协作者接口。
//!
//! ## 设计说明
//!
//! - 渲染器不持有任何全局单例，所有协作者通过 [`Services`] 在每次调用时注入
//! - 协作者只需实现 trait，测试与 headless 模式使用 [`crate::headless`] 中的内存实现
//! - 渲染器对场景中生成的对象只保存 [`ObjectId`]，对象本身归场景所有

use serde::{Deserialize, Serialize};

use crate::easing::EasingFunction;
use crate::style::{FontMetrics, Rect, Size, TextStyle};
use crate::token::ArgValue;

/// 绘制表面句柄
pub type SurfaceId = u32;

/// 场景对象句柄
pub type ObjectId = u32;

/// 动画句柄
pub type AnimationHandle = u32;

/// 绘制表面与字体度量提供者
pub trait SurfaceProvider {
    /// 分配一个绘制表面（通常为消息框宽 × 行高）
    fn create_surface(&mut self, width: f32, height: f32) -> SurfaceId;

    /// 释放绘制表面
    fn dispose_surface(&mut self, surface: SurfaceId);

    /// 设置表面在消息框内的位置
    fn set_surface_origin(&mut self, surface: SurfaceId, x: f32, y: f32);

    /// 测量单行文本
    fn measure_text(&self, text: &str, style: &TextStyle) -> Size;

    /// 字体纵向度量
    fn font_metrics(&self, style: &TextStyle) -> FontMetrics;

    /// 在表面上绘制文本，`(x, y)` 为文本左上角
    fn draw_text(&mut self, surface: SurfaceId, x: f32, y: f32, text: &str, style: &TextStyle);

    /// 清除表面上的矩形区域
    fn clear_rect(&mut self, surface: SurfaceId, rect: Rect);
}

/// 请求场景生成的对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpawnRequest {
    /// 内联动画
    Animation { animation_id: u32, x: f32, y: f32 },
    /// 可点击的超链接热区
    Hotspot { region: Rect, common_event_id: u32 },
    /// 带样式的文本标签（样式化超链接）
    LinkLabel {
        region: Rect,
        text: String,
        style_index: u32,
        common_event_id: u32,
    },
}

/// 场景 / 对象协作者
pub trait Scene {
    /// 向场景添加对象，返回其句柄
    fn add_object(&mut self, request: SpawnRequest) -> ObjectId;

    /// 从场景移除并释放对象
    fn remove_object(&mut self, object: ObjectId);

    /// 调用公共事件
    fn call_common_event(&mut self, event_id: u32, params: &[ArgValue]);

    /// 切换当前说话角色
    fn change_character(&mut self, character: &CharacterRecord);

    /// 切换角色表情
    fn change_expression(&mut self, character_id: Option<u32>, expression: &ExpressionRecord);
}

/// 渲染器向外发出的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageEvent {
    /// 整条消息显示完毕
    MessageFinish,
    /// 翻到下一页
    MessageBatch { remaining_lines: usize },
    /// 等待玩家输入
    MessageWaiting,
}

impl MessageEvent {
    /// 事件名
    pub fn name(&self) -> &'static str {
        match self {
            MessageEvent::MessageFinish => "messageFinish",
            MessageEvent::MessageBatch { .. } => "messageBatch",
            MessageEvent::MessageWaiting => "messageWaiting",
        }
    }
}

/// 事件发射器
pub trait EventEmitter {
    fn emit(&mut self, event: MessageEvent);
}

/// 动画协作者
///
/// 完成回调改为轮询：渲染器每帧通过 [`Animator::is_finished`] 检查。
pub trait Animator {
    /// 对一组表面启动淡出动画
    fn disappear(
        &mut self,
        surfaces: &[SurfaceId],
        easing: EasingFunction,
        frames: u32,
    ) -> AnimationHandle;

    /// 动画是否已结束（未知句柄视为已结束）
    fn is_finished(&self, animation: AnimationHandle) -> bool;
}

/// 音频协作者
pub trait AudioPlayer {
    /// 播放语音
    fn play_voice(&mut self, clip: &str);

    /// 播放音效，`volume` 为 0 - 100
    fn play_sound(&mut self, clip: &str, volume: f32);
}

/// 记录查找键：按 ID 或显示名称
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Id(u32),
    Name(String),
}

impl RecordKey {
    /// 从控制码参数构造：数值参数视为 ID，文本参数（含带引号的数字）视为名称
    pub fn from_arg(value: &ArgValue) -> Self {
        match value.as_id() {
            Some(id) => RecordKey::Id(id),
            None => RecordKey::Name(value.as_text()),
        }
    }

    /// 判断记录是否匹配
    pub fn matches(&self, id: u32, name: &str) -> bool {
        match self {
            RecordKey::Id(key) => *key == id,
            RecordKey::Name(key) => key == name,
        }
    }
}

/// 角色记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: u32,
    pub name: String,
}

/// 表情记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionRecord {
    pub id: u32,
    pub name: String,
}

/// 公共事件记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonEventRecord {
    pub id: u32,
    pub name: String,
}

/// 音效记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundRecord {
    pub id: u32,
    pub name: String,
    /// 音频资源路径
    pub clip: String,
}

/// 记录表协作者（只读）
pub trait RecordTable {
    fn character(&self, key: &RecordKey) -> Option<CharacterRecord>;

    fn expression(&self, key: &RecordKey) -> Option<ExpressionRecord>;

    fn common_event(&self, key: &RecordKey) -> Option<CommonEventRecord>;

    fn sound(&self, key: &RecordKey) -> Option<SoundRecord>;

    /// 变量的显示文本
    fn variable(&self, name: &str) -> Option<String>;

    /// 内联动画单帧尺寸
    fn animation_frame_size(&self, animation_id: u32) -> Option<Size>;
}

/// 注入给渲染器的协作者集合
pub struct Services<'a> {
    pub surfaces: &'a mut dyn SurfaceProvider,
    pub scene: &'a mut dyn Scene,
    pub events: &'a mut dyn EventEmitter,
    pub animator: &'a mut dyn Animator,
    pub audio: &'a mut dyn AudioPlayer,
    pub records: &'a dyn RecordTable,
}
