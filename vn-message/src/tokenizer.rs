//! # Tokenizer 模块
//!
//! 把消息标记拆成文本段与控制码 token。
//!
//! ## 语法
//!
//! ```text
//! <CODE>         无值控制码
//! <CODE:value>   带值控制码，value 可用 / 分隔多个参数
//! ```
//!
//! `CODE` 只允许 ASCII 字母。不符合语法的 `<` 原样保留为文本，
//! 分词永不失败。

use crate::token::{ControlToken, Token};

/// 分词
pub fn tokenize(markup: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut rest = markup;

    while let Some(pos) = rest.find('<') {
        text.push_str(&rest[..pos]);
        let candidate = &rest[pos..];

        match parse_control(candidate) {
            Some((control, consumed)) => {
                if !text.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut text)));
                }
                tokens.push(Token::Control(control));
                rest = &candidate[consumed..];
            }
            None => {
                text.push('<');
                rest = &candidate[1..];
            }
        }
    }

    text.push_str(rest);
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }

    tokens
}

/// 尝试在 `<` 处解析一个控制码，返回 token 和消耗的字节数
fn parse_control(s: &str) -> Option<(ControlToken, usize)> {
    let body = s.strip_prefix('<')?;
    let code_len = body
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(body.len());
    if code_len == 0 {
        return None;
    }

    let code = &body[..code_len];
    let after = &body[code_len..];

    if after.starts_with('>') {
        return Some((ControlToken::new(code, ""), code_len + 2));
    }

    let value_part = after.strip_prefix(':')?;
    let end = value_part.find(['>', '\n', '\r'])?;
    if !value_part[end..].starts_with('>') {
        return None;
    }

    let consumed = 1 + code_len + 1 + end + 1;
    Some((ControlToken::new(code, &value_part[..end]), consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summarize(tokens: &[Token]) -> String {
        tokens
            .iter()
            .map(|t| match t {
                Token::Text(s) => format!("text {s:?}"),
                Token::Control(c) => format!("ctrl {} {:?} {:?}", c.code, c.raw_value, c.values),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_tokenize_mixed_markup() {
        let tokens = tokenize("Hi<W:500>there<CE:3/\"x\"/7><b>!");
        insta::assert_snapshot!(summarize(&tokens), @r#"
        text "Hi"
        ctrl W "500" [Number(500.0)]
        text "there"
        ctrl CE "3/\"x\"/7" [Number(3.0), Text("x"), Number(7.0)]
        ctrl B "" []
        text "!"
        "#);
    }

    #[test]
    fn test_tokenize_ruby_and_link() {
        let tokens = tokenize("<RT:漢字/かんじ><LK:42>label<LK:E>");
        insta::assert_snapshot!(summarize(&tokens), @r#"
        ctrl RT "漢字/かんじ" [Text("漢字"), Text("かんじ")]
        ctrl LK "42" [Number(42.0)]
        text "label"
        ctrl LK "E" [Text("E")]
        "#);
    }

    #[test]
    fn test_malformed_markup_is_literal_text() {
        assert_eq!(tokenize("a < b"), vec![Token::text("a < b")]);
        assert_eq!(tokenize("<>"), vec![Token::text("<>")]);
        assert_eq!(tokenize("<1:x>"), vec![Token::text("<1:x>")]);
        assert_eq!(tokenize("<C:1"), vec![Token::text("<C:1")]);
        assert_eq!(tokenize("<C:1\n>"), vec![Token::text("<C:1\n>")]);
    }

    #[test]
    fn test_empty_markup() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_unknown_code_is_kept_as_control() {
        let tokens = tokenize("<FOO:bar>");
        assert_eq!(tokens.len(), 1);
        match &tokens[0] {
            Token::Control(c) => {
                assert_eq!(c.code, "FOO");
                assert_eq!(c.raw_value, "bar");
            }
            other => panic!("unexpected token {other:?}"),
        }
    }

    #[test]
    fn test_newlines_stay_in_text_runs() {
        let tokens = tokenize("one\ntwo<W>three");
        assert_eq!(tokens[0], Token::text("one\ntwo"));
        assert_eq!(tokens[2], Token::text("three"));
    }
}
