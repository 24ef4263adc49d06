//! 조건식 토크나이저

use super::LangError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// 필드 경로 또는 함수 이름 (`identity["a.b"]` 형태의 선택자 포함)
    Path(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
    NotMatch,
    In,
    True,
    False,
    Null,
}

pub(crate) fn syntax_error(expr: &str, position: usize, reason: impl Into<String>) -> LangError {
    LangError::Syntax {
        expr: expr.to_owned(),
        position,
        reason: reason.into(),
    }
}

/// 조건식을 `(위치, 토큰)` 목록으로 분해합니다.
pub(crate) fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, LangError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (token, len) = match c {
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            ',' => (Token::Comma, 1),
            '&' if next == Some('&') => (Token::And, 2),
            '|' if next == Some('|') => (Token::Or, 2),
            '!' => match next {
                Some('=') => (Token::Ne, 2),
                Some('~') => (Token::NotMatch, 2),
                _ => (Token::Not, 1),
            },
            '=' => match next {
                Some('=') => (Token::Eq, 2),
                Some('~') => (Token::Match, 2),
                _ => return Err(syntax_error(src, start, "expected '==' or '=~'")),
            },
            '<' if next == Some('=') => (Token::Le, 2),
            '<' => (Token::Lt, 1),
            '>' if next == Some('=') => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            '"' | '\'' | '`' => {
                let (s, end) = read_quoted(&chars, i)
                    .map_err(|reason| syntax_error(src, start, reason))?;
                (Token::Str(s), end - i)
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let end = scan_while(&chars, i + 1, |c| c.is_ascii_digit() || c == '.');
                let text: String = chars[i..end].iter().collect();
                let token = if text.contains('.') {
                    text.parse::<f64>()
                        .map(Token::Float)
                        .map_err(|e| syntax_error(src, start, format!("bad number: {e}")))?
                } else {
                    text.parse::<i64>()
                        .map(Token::Int)
                        .map_err(|e| syntax_error(src, start, format!("bad number: {e}")))?
                };
                (token, end - i)
            }
            c if c.is_alphabetic() || c == '_' => {
                let end = scan_path(&chars, i).map_err(|reason| syntax_error(src, start, reason))?;
                let text: String = chars[i..end].iter().collect();
                let token = match text.as_str() {
                    "in" => Token::In,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" | "nil" => Token::Null,
                    _ => Token::Path(text),
                };
                (token, end - i)
            }
            other => {
                return Err(syntax_error(
                    src,
                    start,
                    format!("unexpected character '{other}'"),
                ));
            }
        };

        tokens.push((start, token));
        i += len;
    }

    Ok(tokens)
}

fn scan_while(chars: &[char], mut i: usize, pred: impl Fn(char) -> bool) -> usize {
    while i < chars.len() && pred(chars[i]) {
        i += 1;
    }
    i
}

// 경로 본문 + 뒤따르는 `["..."]` 선택자
fn scan_path(chars: &[char], start: usize) -> Result<usize, String> {
    let mut i = scan_while(chars, start, |c| {
        c.is_alphanumeric() || c == '_' || c == '.' || c == '-'
    });
    while i < chars.len()
        && chars[i] == '['
        && matches!(chars.get(i + 1), Some('"' | '\'' | '`'))
    {
        let (_, end) = read_quoted(chars, i + 1)?;
        if chars.get(end) != Some(&']') {
            return Err("expected ']' after selector".to_owned());
        }
        i = end + 1;
    }
    Ok(i)
}

/// `chars[start]`의 따옴표로 시작하는 문자열을 읽습니다.
///
/// 반환값은 `(내용, 닫는 따옴표 다음 위치)`입니다. 백틱 문자열은 이스케이프를
/// 처리하지 않으며, 따옴표 문자열의 알 수 없는 이스케이프는 백슬래시를 유지합니다.
pub(crate) fn read_quoted(chars: &[char], start: usize) -> Result<(String, usize), String> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\\' && quote != '`' {
            match chars.get(i + 1) {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some(q) if *q == quote => out.push(*q),
                Some(other) => {
                    out.push('\\');
                    out.push(*other);
                }
                None => break,
            }
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }

    Err("unterminated string".to_owned())
}
