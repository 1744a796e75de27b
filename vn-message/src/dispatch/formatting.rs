//! 格式类控制码
//!
//! 颜色、字号、字形开关只修改渲染器的当前样式。注音、变量、内联动画
//! 在 token 元数据里预留尺寸；内联动画实际执行时才生成场景对象。

use tracing::debug;

use crate::renderer::MessageRenderer;
use crate::services::{Services, SpawnRequest};
use crate::style::{Color, Size};
use crate::token::{ArgValue, ControlToken, Token, TokenHook, TokenHooks};

pub(super) fn color(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    _ctx: &mut Services<'_>,
    _formatting_only: bool,
) -> Option<Token> {
    let color = match token.value(0) {
        None => renderer.base_style.color,
        Some(ArgValue::Text(hex)) => Color::from_hex(hex).unwrap_or(renderer.style.color),
        Some(value) => value
            .as_id()
            .and_then(|index| renderer.settings.palette_color(index as usize))
            .unwrap_or(renderer.base_style.color),
    };
    renderer.style.color = color;
    None
}

pub(super) fn size(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    _ctx: &mut Services<'_>,
    _formatting_only: bool,
) -> Option<Token> {
    renderer.style.size = token
        .value(0)
        .and_then(ArgValue::as_number)
        .filter(|n| *n > 0.0)
        .map_or(renderer.base_style.size, |n| n as f32);
    None
}

fn flag(token: &ControlToken) -> bool {
    token.value(0).is_none_or(ArgValue::as_flag)
}

pub(super) fn bold(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    _ctx: &mut Services<'_>,
    _formatting_only: bool,
) -> Option<Token> {
    renderer.style.bold = flag(token);
    None
}

pub(super) fn italic(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    _ctx: &mut Services<'_>,
    _formatting_only: bool,
) -> Option<Token> {
    renderer.style.italic = flag(token);
    None
}

pub(super) fn outline(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    _ctx: &mut Services<'_>,
    _formatting_only: bool,
) -> Option<Token> {
    renderer.style.outline = flag(token);
    None
}

pub(super) fn shadow(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    _ctx: &mut Services<'_>,
    _formatting_only: bool,
) -> Option<Token> {
    renderer.style.shadow = flag(token);
    None
}

/// 注音：`<RT:基文本/注音>`
///
/// 预留宽度取两者较宽者，高度为正文行高加注音行高。
/// 绘制时通过钩子切换到缩小的注音样式。
pub(super) fn ruby(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    ctx: &mut Services<'_>,
    _formatting_only: bool,
) -> Option<Token> {
    let base = token.value(0).map(ArgValue::as_text).unwrap_or_default();
    let ruby = token.value(1).map(ArgValue::as_text).unwrap_or_default();

    let base_style = renderer.style.clone();
    let ruby_style = base_style.scaled(renderer.settings.font.ruby_ratio);

    let base_size = ctx.surfaces.measure_text(&base, &base_style);
    let ruby_size = ctx.surfaces.measure_text(&ruby, &ruby_style);
    let base_metrics = ctx.surfaces.font_metrics(&base_style);
    let ruby_metrics = ctx.surfaces.font_metrics(&ruby_style);

    token.meta.reserved = Some(Size::new(
        base_size.width.max(ruby_size.width),
        base_metrics.line_height + ruby_metrics.line_height,
    ));
    token.meta.base_width = Some(base_size.width);
    token.meta.ruby_width = Some(ruby_size.width);
    token.hooks = TokenHooks {
        on_start: Some(TokenHook::SwapStyle(ruby_style)),
        on_end: Some(TokenHook::RestoreStyle),
    };
    None
}

/// 变量：`<V:name>`，替换为变量的显示文本
pub(super) fn variable(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    ctx: &mut Services<'_>,
    _formatting_only: bool,
) -> Option<Token> {
    let name = token.raw_value.trim();
    let Some(value) = ctx.records.variable(name) else {
        debug!(name, "变量不存在，按空文本处理");
        token.meta.reserved = None;
        token.meta.substitution = None;
        return None;
    };

    let size = ctx.surfaces.measure_text(&value, &renderer.style);
    let metrics = ctx.surfaces.font_metrics(&renderer.style);
    token.meta.reserved = Some(Size::new(size.width, metrics.line_height));
    token.meta.substitution = Some(value.clone());
    Some(Token::Text(value))
}

/// 内联动画：`<A:id>`
///
/// 预留单帧尺寸；实际执行时在行内生成动画对象，底部与行底对齐。
pub(super) fn animation(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    ctx: &mut Services<'_>,
    formatting_only: bool,
) -> Option<Token> {
    let Some(animation_id) = token.value(0).and_then(ArgValue::as_id) else {
        debug!(value = %token.raw_value, "内联动画 ID 无效");
        return None;
    };
    let Some(frame) = ctx.records.animation_frame_size(animation_id) else {
        debug!(animation_id, "内联动画不存在");
        return None;
    };
    token.meta.reserved = Some(frame);

    if formatting_only {
        return None;
    }

    let line_height = renderer.current_line_height(ctx);
    let object = ctx.scene.add_object(SpawnRequest::Animation {
        animation_id,
        x: renderer.caret.current_x,
        y: renderer.caret.current_y + (line_height - frame.height).max(0.0),
    });
    renderer.custom_objects.push(object);
    None
}
