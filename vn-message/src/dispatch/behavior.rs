//! 行为类控制码：等待、页尾等待开关、立即显示、速度
//!
//! 全部只在实际执行时生效。

use tracing::debug;

use crate::config::{ms_to_frames, speed_from_message_speed};
use crate::renderer::MessageRenderer;
use crate::services::{MessageEvent, Services};
use crate::state::RevealState;
use crate::token::{ArgValue, ControlToken, Token};

/// 等待：`<W>` / `<W:A>` 等待按键，`<W:ms>` 等待指定毫秒
///
/// 瞬间跳过期间忽略；跳过模式下计时等待由 `update` 压缩到 skip_time。
pub(super) fn wait(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    ctx: &mut Services<'_>,
    formatting_only: bool,
) -> Option<Token> {
    if formatting_only || renderer.instant {
        return None;
    }

    match token.value(0).and_then(ArgValue::as_number) {
        Some(ms) => {
            let frames = ms_to_frames(ms, renderer.settings.frame_rate);
            if frames > 0 {
                debug!(ms, frames, "计时等待");
                renderer.state = RevealState::WaitingTimer {
                    frames,
                    page_end: false,
                };
            }
        }
        None => {
            if renderer.skip {
                return None;
            }
            renderer.state = RevealState::WaitingForKey { page_end: false };
            ctx.events.emit(MessageEvent::MessageWaiting);
        }
    }
    None
}

/// `<WE:0|1>` 本条消息页尾是否等待按键
pub(super) fn wait_at_end(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    _ctx: &mut Services<'_>,
    formatting_only: bool,
) -> Option<Token> {
    if !formatting_only {
        renderer.wait_at_end = token.value(0).is_none_or(ArgValue::as_flag);
    }
    None
}

/// `<DI:0|1>` 本条消息剩余部分立即显示
pub(super) fn draw_immediately(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    _ctx: &mut Services<'_>,
    formatting_only: bool,
) -> Option<Token> {
    if !formatting_only {
        renderer.draw_immediately = token.value(0).is_none_or(ArgValue::as_flag);
    }
    None
}

/// `<S:speed>` 消息速度（0 - 4），无参数恢复配置值
pub(super) fn speed(
    renderer: &mut MessageRenderer,
    token: &mut ControlToken,
    _ctx: &mut Services<'_>,
    formatting_only: bool,
) -> Option<Token> {
    if formatting_only {
        return None;
    }
    renderer.speed = match token.value(0).and_then(ArgValue::as_number) {
        Some(message_speed) => speed_from_message_speed(message_speed as f32),
        None => renderer.settings.speed(),
    };
    None
}

#[cfg(test)]
mod tests {
    use crate::config::MessageSettings;
    use crate::headless::HeadlessHost;
    use crate::renderer::MessageRenderer;
    use crate::services::MessageEvent;
    use crate::state::RevealState;
    use crate::token::ControlToken;

    fn live(renderer: &mut MessageRenderer, host: &mut HeadlessHost, code: &str, value: &str) {
        let mut token = ControlToken::new(code, value);
        renderer.process_control_token(&mut token, &mut host.services(), false);
    }

    #[test]
    fn test_timed_wait_converts_ms() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(MessageSettings::default());

        live(&mut renderer, &mut host, "W", "500");
        assert_eq!(
            renderer.state(),
            RevealState::WaitingTimer {
                frames: 30,
                page_end: false
            }
        );
        assert!(host.events.events.is_empty());
    }

    #[test]
    fn test_key_wait_emits_waiting() {
        for value in ["", "A"] {
            let mut host = HeadlessHost::new();
            let mut renderer = MessageRenderer::new(MessageSettings::default());

            live(&mut renderer, &mut host, "W", value);
            assert_eq!(
                renderer.state(),
                RevealState::WaitingForKey { page_end: false }
            );
            assert_eq!(host.events.events, vec![MessageEvent::MessageWaiting]);
        }
    }

    #[test]
    fn test_key_wait_ignored_while_skipping() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(MessageSettings::default());
        renderer.set_skip(true, 5);

        live(&mut renderer, &mut host, "W", "A");
        assert_eq!(renderer.state(), RevealState::Idle);
        assert!(host.events.events.is_empty());
    }

    #[test]
    fn test_wait_ignored_in_formatting_pass() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(MessageSettings::default());

        let mut token = ControlToken::new("W", "500");
        renderer.process_control_token(&mut token, &mut host.services(), true);
        assert_eq!(renderer.state(), RevealState::Idle);
    }

    #[test]
    fn test_flags_and_speed() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(MessageSettings::default());

        live(&mut renderer, &mut host, "WE", "0");
        assert!(!renderer.wait_at_end);
        live(&mut renderer, &mut host, "WE", "");
        assert!(renderer.wait_at_end);

        live(&mut renderer, &mut host, "DI", "1");
        assert!(renderer.draw_immediately);

        live(&mut renderer, &mut host, "S", "4");
        assert_eq!(renderer.speed, 1);
        live(&mut renderer, &mut host, "S", "");
        assert_eq!(renderer.speed, renderer.settings().speed());
    }
}
