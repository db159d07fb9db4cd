//! Indentation-aware tokenizer for the host sublanguage, in the spirit of
//! `katagami.py::PythonTokens`'s use of Python's own `tokenize` module:
//! growth of leading whitespace pushes an `Indent`, shrinkage pops and
//! emits matching `Dedent`s.

use super::token::{Token, TokenKind};

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct LexError {
    pub line: usize,
    pub message: String,
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    let lines: Vec<&str> = src.split('\n').collect();
    let mut tokens = Vec::new();
    let mut indents: Vec<usize> = vec![0];

    for (idx, raw_line) in lines.iter().enumerate() {
        let lineno = idx + 1;
        let stripped = strip_comment(raw_line);
        let trimmed = stripped.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let indent_width = stripped.len() - trimmed.len();
        let current = *indents.last().expect("indent stack never empties");
        if indent_width > current {
            indents.push(indent_width);
            tokens.push(Token { kind: TokenKind::Indent, line: lineno });
        } else if indent_width < current {
            while *indents.last().unwrap() > indent_width {
                indents.pop();
                tokens.push(Token { kind: TokenKind::Dedent, line: lineno });
            }
            if *indents.last().unwrap() != indent_width {
                return Err(LexError {
                    line: lineno,
                    message: "inconsistent indentation".to_string(),
                });
            }
        }
        tokenize_line(trimmed, lineno, &mut tokens)?;
        tokens.push(Token { kind: TokenKind::Newline, line: lineno });
    }

    let eof_line = lines.len().max(1);
    while indents.len() > 1 {
        indents.pop();
        tokens.push(Token { kind: TokenKind::Dedent, line: eof_line });
    }
    tokens.push(Token { kind: TokenKind::Eof, line: eof_line });
    Ok(tokens)
}

fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_str: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = in_str {
            if c == b'\\' {
                i += 1;
            } else if c == q {
                in_str = None;
            }
        } else if c == b'\'' || c == b'"' {
            in_str = Some(c);
        } else if c == b'#' {
            return &line[..i];
        }
        i += 1;
    }
    line
}

const MULTI_CHAR_OPS: &[&str] = &["==", "!=", "<=", ">=", "//", "**"];
const SINGLE_CHAR_OPS: &str = "+-*/%()[],:.=<>";

fn tokenize_line(line: &str, lineno: usize, out: &mut Vec<Token>) -> Result<(), LexError> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '\'' || c == '"' {
            let quote = c;
            let mut s = String::new();
            i += 1;
            while i < chars.len() && chars[i] != quote {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 1;
                    s.push(match chars[i] {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '\\' => '\\',
                        '\'' => '\'',
                        '"' => '"',
                        other => other,
                    });
                } else {
                    s.push(chars[i]);
                }
                i += 1;
            }
            if i >= chars.len() {
                return Err(LexError {
                    line: lineno,
                    message: "unterminated string literal".to_string(),
                });
            }
            i += 1;
            out.push(Token { kind: TokenKind::Str(s), line: lineno });
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            let mut is_float = false;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                if chars[i] == '.' {
                    is_float = true;
                }
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if is_float {
                let v: f64 = text.parse().map_err(|_| LexError {
                    line: lineno,
                    message: format!("invalid number '{text}'"),
                })?;
                out.push(Token { kind: TokenKind::Float(v), line: lineno });
            } else {
                let v: i64 = text.parse().map_err(|_| LexError {
                    line: lineno,
                    message: format!("invalid number '{text}'"),
                })?;
                out.push(Token { kind: TokenKind::Int(v), line: lineno });
            }
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            out.push(Token { kind: TokenKind::Name(text), line: lineno });
            continue;
        }
        let rest: String = chars[i..].iter().collect();
        if let Some(op) = MULTI_CHAR_OPS.iter().find(|op| rest.starts_with(*op)) {
            out.push(Token { kind: TokenKind::Op((*op).to_string()), line: lineno });
            i += op.chars().count();
            continue;
        }
        if SINGLE_CHAR_OPS.contains(c) {
            out.push(Token { kind: TokenKind::Op(c.to_string()), line: lineno });
            i += 1;
            continue;
        }
        return Err(LexError {
            line: lineno,
            message: format!("unexpected character '{c}'"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_assignment() {
        let k = kinds("x = 1");
        assert_eq!(
            k,
            vec![
                TokenKind::Name("x".into()),
                TokenKind::Op("=".into()),
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn indent_and_dedent_are_tracked() {
        let k = kinds("if 1:\n    x = 1\ny = 2");
        assert!(k.contains(&TokenKind::Indent));
        assert!(k.contains(&TokenKind::Dedent));
    }

    #[test]
    fn blank_and_comment_only_lines_are_skipped() {
        let k = kinds("x = 1\n\n# note\ny = 2");
        let newlines = k.iter().filter(|t| **t == TokenKind::Newline).count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn string_escapes_are_decoded() {
        let k = kinds(r"x = 'a\nb'");
        assert!(k.contains(&TokenKind::Str("a\nb".to_string())));
    }

    #[test]
    fn inconsistent_indentation_is_an_error() {
        let result = tokenize("if 1:\n    x = 1\n  y = 2");
        assert!(result.is_err());
    }
}
