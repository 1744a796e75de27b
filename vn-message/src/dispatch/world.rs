//! 世界类控制码
//!
//! 通过记录表查找公共事件、角色、表情、音效，找不到时静默跳过。
//! 全部只在实际执行时生效，每个 token 在揭示时触发一次。

use tracing::debug;

use crate::renderer::{MessageRenderer, PendingLink};
use crate::services::{RecordKey, Services};
use crate::token::{ArgValue, ControlToken, Token};

/// `<CE:id/参数...>` 调用公共事件，其余参数原样传递
pub(super) fn common_event(
    _renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    ctx: &mut Services<'_>,
    formatting_only: bool,
) -> Option<Token> {
    if formatting_only {
        return None;
    }
    let key = token.value(0).map(RecordKey::from_arg)?;

    match ctx.records.common_event(&key) {
        Some(event) => {
            debug!(event_id = event.id, name = %event.name, "调用公共事件");
            ctx.scene.call_common_event(event.id, &token.values[1..]);
        }
        None => debug!(key = ?key, "公共事件不存在，跳过"),
    }
    None
}

/// `<CH:角色>` 切换说话角色
pub(super) fn character(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    ctx: &mut Services<'_>,
    formatting_only: bool,
) -> Option<Token> {
    if formatting_only {
        return None;
    }
    let key = token.value(0).map(RecordKey::from_arg)?;

    match ctx.records.character(&key) {
        Some(record) => {
            ctx.scene.change_character(&record);
            renderer.active_character = Some(record);
        }
        None => debug!(key = ?key, "角色不存在，跳过"),
    }
    None
}

/// `<E:表情>` 切换当前角色的表情，`<E:角色/表情>` 指定角色
pub(super) fn expression(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    ctx: &mut Services<'_>,
    formatting_only: bool,
) -> Option<Token> {
    if formatting_only {
        return None;
    }

    let (character_id, expression_arg) = match token.values.as_slice() {
        [] => return None,
        [expression] => (renderer.active_character.as_ref().map(|c| c.id), expression),
        [character, expression, ..] => {
            let key = RecordKey::from_arg(character);
            match ctx.records.character(&key) {
                Some(record) => (Some(record.id), expression),
                None => {
                    debug!(key = ?key, "角色不存在，跳过表情切换");
                    return None;
                }
            }
        }
    };

    let key = RecordKey::from_arg(expression_arg);
    match ctx.records.expression(&key) {
        Some(record) => ctx.scene.change_expression(character_id, &record),
        None => debug!(key = ?key, "表情不存在，跳过"),
    }
    None
}

/// `<VO:id>` 播放语音
pub(super) fn voice(
    _renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    ctx: &mut Services<'_>,
    formatting_only: bool,
) -> Option<Token> {
    if formatting_only {
        return None;
    }
    let key = token.value(0).map(RecordKey::from_arg)?;

    match ctx.records.sound(&key) {
        Some(record) => ctx.audio.play_voice(&record.clip),
        None => debug!(key = ?key, "语音不存在，跳过"),
    }
    None
}

/// `<SE:id/音量>` 播放音效，音量缺省为 100
pub(super) fn sound(
    _renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    ctx: &mut Services<'_>,
    formatting_only: bool,
) -> Option<Token> {
    if formatting_only {
        return None;
    }
    let key = token.value(0).map(RecordKey::from_arg)?;
    let volume = token
        .value(1)
        .and_then(ArgValue::as_number)
        .map_or(100.0, |v| v.clamp(0.0, 100.0) as f32);

    match ctx.records.sound(&key) {
        Some(record) => ctx.audio.play_sound(&record.clip, volume),
        None => debug!(key = ?key, "音效不存在，跳过"),
    }
    None
}

/// `<LK:id>文本<LK:E>` 超链接
pub(super) fn link(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    ctx: &mut Services<'_>,
    formatting_only: bool,
) -> Option<Token> {
    link_marker(renderer, token, ctx, formatting_only, false)
}

/// `<SLK:id/样式>文本<SLK:E>` 样式化超链接
pub(super) fn styled_link(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    ctx: &mut Services<'_>,
    formatting_only: bool,
) -> Option<Token> {
    link_marker(renderer, token, ctx, formatting_only, true)
}

/// 开始标记记录起点，结束标记生成热区
fn link_marker(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    ctx: &mut Services<'_>,
    formatting_only: bool,
    styled: bool,
) -> Option<Token> {
    if formatting_only {
        return None;
    }

    if token.is_end_marker() {
        renderer.close_link(ctx);
        return None;
    }

    let key = token.value(0).map(RecordKey::from_arg)?;
    let Some(event) = ctx.records.common_event(&key) else {
        debug!(key = ?key, "超链接的公共事件不存在，跳过");
        return None;
    };

    if renderer.pending_link.is_some() {
        debug!("上一个超链接未结束，已丢弃");
    }

    let style_index = styled.then(|| token.value(1).and_then(ArgValue::as_id).unwrap_or(0));
    renderer.pending_link = Some(PendingLink {
        cx: renderer.caret.current_x,
        cy: renderer.caret.current_y,
        common_event_id: event.id,
        style_index,
        text: String::new(),
    });
    None
}
