//! # Dispatch 模块
//!
//! 控制码分发：代码到处理函数的注册表。
//!
//! ## 两种调用方式
//!
//! - 格式处理（`formatting_only = true`）：排版测量与整行重绘时调用，
//!   只能修改当前样式和 token 元数据，可重复调用、结果相同
//! - 实际执行（`formatting_only = false`）：揭示到该 token 时调用一次，
//!   触发等待、音频、公共事件、对象生成等副作用
//!
//! 注册表中没有的代码作为零宽、无效果的 token 保留。
//!
//! ## 子模块
//!
//! - `formatting`：颜色、字号、粗斜体、描边阴影、注音、变量、内联动画
//! - `behavior`：等待、页尾等待开关、立即显示、速度
//! - `world`：公共事件、角色、表情、语音、音效、超链接

mod behavior;
mod formatting;
mod world;

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::UnknownCodePolicy;
use crate::renderer::MessageRenderer;
use crate::services::Services;
use crate::style::Size;
use crate::token::{ControlToken, Token};

/// 控制码处理函数
///
/// 返回值用于替换类代码（变量）把自身替换为文本 token。
pub type ControlHandler =
    fn(&mut MessageRenderer, &mut ControlToken, &mut Services<'_>, bool) -> Option<Token>;

/// 内置控制码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCode {
    /// `<C:n>` / `<C:#RRGGBB>` 文字颜色
    Color,
    /// `<Z:n>` 字号
    Size,
    /// `<B>` 粗体
    Bold,
    /// `<I>` 斜体
    Italic,
    /// `<O>` 描边
    Outline,
    /// `<SH>` 阴影
    Shadow,
    /// `<RT:基文本/注音>` 注音
    Ruby,
    /// `<V:name>` 变量
    Variable,
    /// `<A:id>` 内联动画
    Animation,
    /// `<W>` / `<W:ms>` 等待
    Wait,
    /// `<WE:0|1>` 页尾等待开关
    WaitAtEnd,
    /// `<DI:0|1>` 立即显示
    DrawImmediately,
    /// `<S:speed>` 消息速度
    Speed,
    /// `<CE:id/参数...>` 公共事件
    CommonEvent,
    /// `<E:表情>` / `<E:角色/表情>` 表情
    Expression,
    /// `<CH:角色>` 说话角色
    Character,
    /// `<VO:id>` 语音
    Voice,
    /// `<SE:id/音量>` 音效
    Sound,
    /// `<LK:id>...<LK:E>` 超链接
    Link,
    /// `<SLK:id/样式>...<SLK:E>` 样式化超链接
    StyledLink,
}

impl ControlCode {
    pub const ALL: [ControlCode; 20] = [
        ControlCode::Color,
        ControlCode::Size,
        ControlCode::Bold,
        ControlCode::Italic,
        ControlCode::Outline,
        ControlCode::Shadow,
        ControlCode::Ruby,
        ControlCode::Variable,
        ControlCode::Animation,
        ControlCode::Wait,
        ControlCode::WaitAtEnd,
        ControlCode::DrawImmediately,
        ControlCode::Speed,
        ControlCode::CommonEvent,
        ControlCode::Expression,
        ControlCode::Character,
        ControlCode::Voice,
        ControlCode::Sound,
        ControlCode::Link,
        ControlCode::StyledLink,
    ];

    /// 标记中的代码
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCode::Color => "C",
            ControlCode::Size => "Z",
            ControlCode::Bold => "B",
            ControlCode::Italic => "I",
            ControlCode::Outline => "O",
            ControlCode::Shadow => "SH",
            ControlCode::Ruby => "RT",
            ControlCode::Variable => "V",
            ControlCode::Animation => "A",
            ControlCode::Wait => "W",
            ControlCode::WaitAtEnd => "WE",
            ControlCode::DrawImmediately => "DI",
            ControlCode::Speed => "S",
            ControlCode::CommonEvent => "CE",
            ControlCode::Expression => "E",
            ControlCode::Character => "CH",
            ControlCode::Voice => "VO",
            ControlCode::Sound => "SE",
            ControlCode::Link => "LK",
            ControlCode::StyledLink => "SLK",
        }
    }

    /// 从代码解析（不区分大小写）
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(code))
    }

    fn handler(&self) -> ControlHandler {
        match self {
            ControlCode::Color => formatting::color,
            ControlCode::Size => formatting::size,
            ControlCode::Bold => formatting::bold,
            ControlCode::Italic => formatting::italic,
            ControlCode::Outline => formatting::outline,
            ControlCode::Shadow => formatting::shadow,
            ControlCode::Ruby => formatting::ruby,
            ControlCode::Variable => formatting::variable,
            ControlCode::Animation => formatting::animation,
            ControlCode::Wait => behavior::wait,
            ControlCode::WaitAtEnd => behavior::wait_at_end,
            ControlCode::DrawImmediately => behavior::draw_immediately,
            ControlCode::Speed => behavior::speed,
            ControlCode::CommonEvent => world::common_event,
            ControlCode::Expression => world::expression,
            ControlCode::Character => world::character,
            ControlCode::Voice => world::voice,
            ControlCode::Sound => world::sound,
            ControlCode::Link => world::link,
            ControlCode::StyledLink => world::styled_link,
        }
    }
}

/// 控制码注册表
#[derive(Clone, Default)]
pub struct ControlRegistry {
    handlers: HashMap<String, ControlHandler>,
}

impl ControlRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册全部内置控制码
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for code in ControlCode::ALL {
            registry.register(code.as_str(), code.handler());
        }
        registry
    }

    /// 注册（或替换）处理函数，返回被替换的旧函数
    pub fn register(&mut self, code: &str, handler: ControlHandler) -> Option<ControlHandler> {
        self.handlers.insert(code.to_ascii_uppercase(), handler)
    }

    /// 移除处理函数
    pub fn unregister(&mut self, code: &str) -> Option<ControlHandler> {
        self.handlers.remove(&code.to_ascii_uppercase())
    }

    pub fn get(&self, code: &str) -> Option<ControlHandler> {
        self.handlers.get(&code.to_ascii_uppercase()).copied()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.handlers.contains_key(&code.to_ascii_uppercase())
    }

    /// 已注册的代码（排序后）
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.handlers.keys().cloned().collect();
        codes.sort();
        codes
    }
}

impl std::fmt::Debug for ControlRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlRegistry")
            .field("codes", &self.codes())
            .finish()
    }
}

impl MessageRenderer {
    /// 分发控制 token
    pub fn process_control_token(
        &mut self,
        token: &mut ControlToken,
        ctx: &mut Services<'_>,
        formatting_only: bool,
    ) -> Option<Token> {
        let handler = self.registry().get(&token.code);
        match handler {
            Some(handler) => handler(self, token, ctx, formatting_only),
            None => {
                if !formatting_only {
                    match self.settings.unknown_code {
                        UnknownCodePolicy::Warn => {
                            warn!(code = %token.code, value = %token.raw_value, "未知控制码，按无效果处理")
                        }
                        UnknownCodePolicy::Ignore => {
                            debug!(code = %token.code, "忽略未知控制码")
                        }
                    }
                }
                None
            }
        }
    }

    /// 排版阶段测量控制 token
    ///
    /// 以格式处理方式分发，返回处理函数预留的尺寸。
    pub fn measure_control_token(
        &mut self,
        token: &mut ControlToken,
        ctx: &mut Services<'_>,
    ) -> Option<Size> {
        self.process_control_token(token, ctx, true);
        token.meta.reserved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MessageSettings;
    use crate::headless::HeadlessHost;
    use crate::state::RevealState;

    #[test]
    fn test_control_code_round_trip() {
        for code in ControlCode::ALL {
            assert_eq!(ControlCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(ControlCode::parse("slk"), Some(ControlCode::StyledLink));
        assert_eq!(ControlCode::parse("FOO"), None);
    }

    #[test]
    fn test_builtin_registry() {
        let registry = ControlRegistry::with_builtins();
        assert_eq!(registry.codes().len(), ControlCode::ALL.len());
        assert!(registry.contains("lk"));
        assert!(!registry.contains("FOO"));
    }

    fn shout(
        renderer: &mut MessageRenderer,
        _token: &mut ControlToken,
        _ctx: &mut Services<'_>,
        formatting_only: bool,
    ) -> Option<Token> {
        if !formatting_only {
            renderer.style.size *= 2.0;
        }
        None
    }

    #[test]
    fn test_custom_handler() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(MessageSettings::default());
        assert!(renderer.registry_mut().register("shout", shout).is_none());

        let mut token = ControlToken::new("SHOUT", "");
        renderer.process_control_token(&mut token, &mut host.services(), true);
        assert_eq!(renderer.style().size, 24.0);
        renderer.process_control_token(&mut token, &mut host.services(), false);
        assert_eq!(renderer.style().size, 48.0);

        // 移除后变回未知代码
        assert!(renderer.registry_mut().unregister("Shout").is_some());
        assert!(!renderer.registry().contains("SHOUT"));
        renderer.process_control_token(&mut token, &mut host.services(), false);
        assert_eq!(renderer.style().size, 48.0);
    }

    #[test]
    fn test_unknown_code_is_inert() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(MessageSettings::default());
        let before = renderer.style().clone();

        let mut token = ControlToken::new("FOO", "1/2");
        assert_eq!(
            renderer.measure_control_token(&mut token, &mut host.services()),
            None
        );
        assert!(
            renderer
                .process_control_token(&mut token, &mut host.services(), false)
                .is_none()
        );
        assert_eq!(renderer.style(), &before);
        assert_eq!(renderer.state(), RevealState::Idle);
        assert!(host.scene.objects.is_empty());
        assert!(host.events.events.is_empty());
    }

    #[test]
    fn test_formatting_pass_is_idempotent() {
        let mut host = HeadlessHost::new();
        let mut renderer = MessageRenderer::new(MessageSettings::default());

        for raw in ["<C:#ff0000>", "<Z:32>", "<B>", "<RT:漢字/かんじ>", "<CE:1>", "<W:500>"] {
            let tokens = crate::tokenizer::tokenize(raw);
            let Some(Token::Control(original)) = tokens.into_iter().next() else {
                panic!("expected control token for {raw}");
            };

            let mut first = original.clone();
            renderer.process_control_token(&mut first, &mut host.services(), true);
            let style_after_first = renderer.style().clone();

            let mut second = original.clone();
            renderer.process_control_token(&mut second, &mut host.services(), true);

            assert_eq!(first, second, "{raw}");
            assert_eq!(renderer.style(), &style_after_first, "{raw}");
        }

        // 格式处理不触发任何副作用
        assert!(host.scene.common_events.is_empty());
        assert!(host.events.events.is_empty());
        assert_eq!(renderer.state(), RevealState::Idle);
    }
}
