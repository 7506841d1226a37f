//! Longest-match tokenizer for the HLSL subset.
//!
//! Rules are tried in a fixed order at every position; the longest match wins and ties go to the
//! earlier rule. Whitespace and comments are matched like any other rule but dropped from the
//! output. A position no rule matches is a hard failure.

use crate::error::HlslError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Number,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
}

impl Token {
    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }

    pub fn is_identifier(&self) -> bool {
        self.kind == TokenKind::Identifier
    }
}

/// Operators and punctuation, multi-character forms first.
const PUNCTUATION: &[&str] = &[
    "<<=", ">>=", "==", "!=", "<=", ">=", "&&", "||", "++", "--", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "<<", ">>", "::", "+", "-", "*", "/", "%", "=", "<", ">", "!", "&", "|", "^",
    "~", "?", ":", ";", ",", ".", "(", ")", "{", "}", "[", "]",
];

#[derive(Clone, Copy)]
enum RuleOutput {
    Skip,
    Emit(TokenKind),
}

type Matcher = fn(&[u8]) -> Result<usize, ()>;

const RULES: &[(Matcher, RuleOutput)] = &[
    (match_whitespace, RuleOutput::Skip),
    (match_line_comment, RuleOutput::Skip),
    (match_block_comment, RuleOutput::Skip),
    (match_number, RuleOutput::Emit(TokenKind::Number)),
    (match_identifier, RuleOutput::Emit(TokenKind::Identifier)),
    (match_punct, RuleOutput::Emit(TokenKind::Punct)),
];

/// Splits `source` into tokens, tracking 1-based line numbers.
pub fn tokenize(source: &str) -> Result<Vec<Token>, HlslError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    let mut line = 1u32;

    while pos < bytes.len() {
        let rest = &bytes[pos..];
        let mut best: Option<(usize, RuleOutput)> = None;
        for (matcher, output) in RULES {
            let len = matcher(rest).map_err(|()| HlslError::UnterminatedComment { line })?;
            if len > 0 && best.map_or(true, |(best_len, _)| len > best_len) {
                best = Some((len, *output));
            }
        }

        let Some((len, output)) = best else {
            let found = source[pos..].chars().next().unwrap_or('\0');
            return Err(HlslError::Tokenize { line, found });
        };

        let text = &source[pos..pos + len];
        if let RuleOutput::Emit(kind) = output {
            tokens.push(Token {
                kind,
                text: text.to_string(),
                line,
            });
        }
        line += text.bytes().filter(|&b| b == b'\n').count() as u32;
        pos += len;
    }

    Ok(tokens)
}

fn match_whitespace(s: &[u8]) -> Result<usize, ()> {
    Ok(s.iter().take_while(|b| b.is_ascii_whitespace()).count())
}

fn match_line_comment(s: &[u8]) -> Result<usize, ()> {
    if !s.starts_with(b"//") {
        return Ok(0);
    }
    Ok(s.iter().position(|&b| b == b'\n').unwrap_or(s.len()))
}

fn match_block_comment(s: &[u8]) -> Result<usize, ()> {
    if !s.starts_with(b"/*") {
        return Ok(0);
    }
    s[2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map(|end| end + 4)
        .ok_or(())
}

fn count_while(s: &[u8], from: usize, pred: impl Fn(u8) -> bool) -> usize {
    s[from.min(s.len())..].iter().take_while(|&&b| pred(b)).count()
}

fn match_number(s: &[u8]) -> Result<usize, ()> {
    if s.len() >= 2 && s[0] == b'0' && (s[1] == b'x' || s[1] == b'X') {
        let digits = count_while(s, 2, |b| b.is_ascii_hexdigit());
        if digits == 0 {
            return Ok(0);
        }
        let end = 2 + digits;
        return Ok(end + count_while(s, end, |b| matches!(b, b'u' | b'U' | b'l' | b'L')));
    }

    let int_digits = count_while(s, 0, |b| b.is_ascii_digit());
    let mut end = int_digits;
    let mut frac_digits = 0;
    if s.get(end) == Some(&b'.') {
        frac_digits = count_while(s, end + 1, |b| b.is_ascii_digit());
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return Ok(0);
    }

    if matches!(s.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(s.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = count_while(s, exp, |b| b.is_ascii_digit());
        if exp_digits > 0 {
            end = exp + exp_digits;
        }
    }

    Ok(end
        + count_while(s, end, |b| {
            matches!(b, b'f' | b'F' | b'h' | b'H' | b'l' | b'L' | b'u' | b'U')
        }))
}

fn match_identifier(s: &[u8]) -> Result<usize, ()> {
    match s.first() {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {
            Ok(1 + count_while(s, 1, |b| b.is_ascii_alphanumeric() || b == b'_'))
        }
        _ => Ok(0),
    }
}

fn match_punct(s: &[u8]) -> Result<usize, ()> {
    Ok(PUNCTUATION
        .iter()
        .find(|p| s.starts_with(p.as_bytes()))
        .map_or(0, |p| p.len()))
}
