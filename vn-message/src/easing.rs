//! # Easing 模块
//!
//! 翻页淡出使用的缓动函数，由 Animator 协作者解释。

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// 缓动函数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EasingFunction {
    /// 线性（匀速）
    Linear,
    /// 缓入（先慢后快）
    EaseIn,
    /// 缓出（先快后慢）
    #[default]
    EaseOut,
    /// 缓入缓出
    EaseInOut,
    /// 正弦缓出
    EaseOutSine,
}

impl EasingFunction {
    /// 计算缓动值
    ///
    /// `t` 为时间进度，先被钳制到 0.0 - 1.0。
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);

        match self {
            EasingFunction::Linear => t,
            EasingFunction::EaseIn => t * t,
            EasingFunction::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            EasingFunction::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            EasingFunction::EaseOutSine => (t * PI / 2.0).sin(),
        }
    }

    /// 淡出时的不透明度：从 1 缓动到 0
    pub fn fade_out_opacity(&self, t: f32) -> f32 {
        1.0 - self.apply(t)
    }
}
