//! # 诊断模块
//!
//! 消息标记的静态检查，不依赖任何协作者。
//!
//! ## 设计原则
//!
//! - 纯函数 API，复用分词器，不重复解析逻辑
//! - 诊断分级：Error（必须修复）、Warn（建议修复）、Info（信息提示）
//! - 运行时对这些问题都会降级处理，检查只是提前暴露

use crate::dispatch::{ControlCode, ControlRegistry};
use crate::style::Color;
use crate::token::{ArgValue, ControlToken, Token};
use crate::tokenizer::tokenize;

/// 诊断级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticLevel {
    /// 信息提示
    Info,
    /// 警告（建议修复）
    Warn,
    /// 错误（必须修复）
    Error,
}

impl std::fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// 诊断条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    /// 标记来源（文件路径等）
    pub source_id: String,
    /// 行号（从 1 开始）
    pub line: Option<usize>,
    pub message: String,
    /// 原始控制码
    pub detail: Option<String>,
}

impl Diagnostic {
    pub fn error(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, source_id, message)
    }

    pub fn warn(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warn, source_id, message)
    }

    pub fn info(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Info, source_id, message)
    }

    fn new(
        level: DiagnosticLevel,
        source_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            source_id: source_id.into(),
            line: None,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level, self.source_id)?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, "\n  | {}", detail)?;
        }
        Ok(())
    }
}

/// 诊断结果
#[derive(Debug, Clone, Default)]
pub struct DiagnosticResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn merge(&mut self, other: DiagnosticResult) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn error_count(&self) -> usize {
        self.count(DiagnosticLevel::Error)
    }

    pub fn warn_count(&self) -> usize {
        self.count(DiagnosticLevel::Warn)
    }

    fn count(&self, level: DiagnosticLevel) -> usize {
        self.diagnostics.iter().filter(|d| d.level == level).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// 按最低级别过滤
    pub fn filter_by_level(&self, min_level: DiagnosticLevel) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level >= min_level)
            .collect()
    }
}

/// 检查一段消息标记
///
/// `registry` 决定哪些代码是已知的；宿主注册的自定义代码不会被报告为未知。
pub fn analyze_markup(
    source_id: &str,
    markup: &str,
    registry: &ControlRegistry,
) -> DiagnosticResult {
    let mut result = DiagnosticResult::new();
    let mut line = 1;
    let mut open_link: Option<(String, usize)> = None;

    for token in tokenize(markup) {
        let control = match token {
            Token::Text(text) => {
                line += text.matches('\n').count();
                continue;
            }
            Token::Control(control) => control,
        };

        let detail = format_control(&control);
        let report = |diagnostic: Diagnostic| diagnostic.with_line(line).with_detail(detail.clone());

        if !registry.contains(&control.code) {
            result.push(report(Diagnostic::warn(
                source_id,
                format!("未知控制码 {}，运行时按无效果处理", control.code),
            )));
            continue;
        }

        let Some(code) = ControlCode::parse(&control.code) else {
            // 宿主自定义代码，不做参数检查
            continue;
        };

        match code {
            ControlCode::Link | ControlCode::StyledLink => {
                if control.is_end_marker() {
                    match open_link.take() {
                        Some((open_code, _)) if open_code != control.code => {
                            result.push(report(Diagnostic::warn(
                                source_id,
                                format!("{} 的结束标记关闭了 {} 超链接", control.code, open_code),
                            )));
                        }
                        Some(_) => {}
                        None => result.push(report(Diagnostic::warn(
                            source_id,
                            "超链接结束标记没有对应的开始标记",
                        ))),
                    }
                    continue;
                }
                if control.values.is_empty() {
                    result.push(report(Diagnostic::error(source_id, "超链接缺少公共事件参数")));
                    continue;
                }
                if let Some((_, opened_at)) = &open_link {
                    result.push(report(Diagnostic::warn(
                        source_id,
                        format!("第 {opened_at} 行的超链接尚未结束就开始了新的超链接"),
                    )));
                }
                open_link = Some((control.code.clone(), line));
            }
            ControlCode::Ruby => {
                if control.values.len() < 2 {
                    result.push(report(Diagnostic::error(
                        source_id,
                        "注音需要 基文本/注音 两个参数",
                    )));
                }
            }
            ControlCode::Wait => {
                let valid = match control.value(0) {
                    None => true,
                    Some(ArgValue::Number(ms)) => *ms >= 0.0,
                    Some(ArgValue::Text(s)) => s.eq_ignore_ascii_case("A"),
                };
                if !valid {
                    result.push(report(Diagnostic::warn(
                        source_id,
                        "等待参数无效，运行时按等待按键处理",
                    )));
                }
            }
            ControlCode::Color => {
                let valid = match control.value(0) {
                    None => true,
                    Some(ArgValue::Text(hex)) => Color::from_hex(hex).is_some(),
                    Some(value) => value.as_id().is_some(),
                };
                if !valid {
                    result.push(report(Diagnostic::warn(source_id, "颜色参数无效")));
                }
            }
            ControlCode::Size | ControlCode::Speed => {
                // 字号必须为正，速度允许 0
                let min_exclusive = if code == ControlCode::Size { 0.0 } else { -f64::EPSILON };
                let valid = control
                    .value(0)
                    .is_none_or(|v| v.as_number().is_some_and(|n| n > min_exclusive));
                if !valid {
                    result.push(report(Diagnostic::warn(source_id, "数值参数无效")));
                }
            }
            ControlCode::Animation
            | ControlCode::CommonEvent
            | ControlCode::Character
            | ControlCode::Expression
            | ControlCode::Voice
            | ControlCode::Sound
            | ControlCode::Variable => {
                if control.values.is_empty() {
                    result.push(report(Diagnostic::error(
                        source_id,
                        format!("{} 缺少参数", control.code),
                    )));
                }
            }
            ControlCode::Bold
            | ControlCode::Italic
            | ControlCode::Outline
            | ControlCode::Shadow
            | ControlCode::WaitAtEnd
            | ControlCode::DrawImmediately => {}
        }
    }

    if let Some((code, opened_at)) = open_link {
        result.push(
            Diagnostic::warn(source_id, format!("{code} 超链接没有结束标记")).with_line(opened_at),
        );
    }

    result
}

fn format_control(control: &ControlToken) -> String {
    if control.raw_value.is_empty() {
        format!("<{}>", control.code)
    } else {
        format!("<{}:{}>", control.code, control.raw_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(markup: &str) -> DiagnosticResult {
        analyze_markup("test.txt", markup, &ControlRegistry::with_builtins())
    }

    #[test]
    fn test_clean_markup() {
        let result = analyze("你好<C:1>世界<W:500>\n<RT:漢字/かんじ><LK:1>link<LK:E>");
        assert!(result.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn test_unknown_code_reports_line() {
        let result = analyze("line one\nline two <FOO:1>");
        assert_eq!(result.warn_count(), 1);
        let diag = &result.diagnostics[0];
        assert_eq!(diag.line, Some(2));
        assert_eq!(diag.detail.as_deref(), Some("<FOO:1>"));
        assert_eq!(
            diag.to_string(),
            "[WARN] test.txt:2: 未知控制码 FOO，运行时按无效果处理\n  | <FOO:1>"
        );
    }

    #[test]
    fn test_unbalanced_links() {
        let result = analyze("<LK:E>a<LK:1>b<LK:2>c");
        let messages: Vec<&str> = result
            .diagnostics
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(
            messages,
            vec![
                "超链接结束标记没有对应的开始标记",
                "第 1 行的超链接尚未结束就开始了新的超链接",
                "LK 超链接没有结束标记",
            ]
        );
    }

    #[test]
    fn test_argument_checks() {
        let result = analyze("<RT:漢字><W:soon><C:#zz><Z:0><CE>");
        assert_eq!(result.error_count(), 2);
        assert_eq!(result.warn_count(), 3);
        assert!(result.has_errors());
        assert_eq!(result.filter_by_level(DiagnosticLevel::Error).len(), 2);
    }

    #[test]
    fn test_custom_codes_are_known() {
        let mut registry = ControlRegistry::with_builtins();
        registry.register("SHAKE", |_, _, _, _| None);
        let result = analyze_markup("test.txt", "<SHAKE:3>", &registry);
        assert!(result.is_empty());
    }
}
