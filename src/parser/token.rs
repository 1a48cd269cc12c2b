use super::ast::Span;
use super::ParseError;

/// A lexed token with its byte span and 1-based source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    // Keywords
    Fn,
    Let,
    Return,
    If,
    Else,
    While,
    True,
    False,
    Bind,
    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

fn keyword(ident: &str) -> Option<TokenKind> {
    match ident {
        "fn" => Some(TokenKind::Fn),
        "let" => Some(TokenKind::Let),
        "return" => Some(TokenKind::Return),
        "if" => Some(TokenKind::If),
        "else" => Some(TokenKind::Else),
        "while" => Some(TokenKind::While),
        "true" => Some(TokenKind::True),
        "false" => Some(TokenKind::False),
        "bind" => Some(TokenKind::Bind),
        _ => None,
    }
}

/// Lex source text into tokens. Comments run from `#` to end of line.
pub fn lex(src: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;
    let mut line = 1u32;

    while i < bytes.len() {
        let b = bytes[i];

        if b == b'\n' {
            line += 1;
            i += 1;
            continue;
        }
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if b == b'#' {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        let start = i;

        if b.is_ascii_digit() {
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let mut is_float = false;
            if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
                is_float = true;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text = &src[start..i];
            let kind = if is_float {
                TokenKind::Float(text.parse().map_err(|_| {
                    ParseError::new(format!("invalid float literal `{text}`"), line)
                })?)
            } else {
                TokenKind::Int(text.parse().map_err(|_| {
                    ParseError::new(format!("invalid integer literal `{text}`"), line)
                })?)
            };
            tokens.push(Token {
                kind,
                span: Span::new(start, i),
                line,
            });
            continue;
        }

        if b.is_ascii_alphabetic() || b == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let text = &src[start..i];
            let kind = keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()));
            tokens.push(Token {
                kind,
                span: Span::new(start, i),
                line,
            });
            continue;
        }

        if b == b'"' {
            i += 1;
            let mut value = String::new();
            let mut closed = false;
            while i < bytes.len() {
                match bytes[i] {
                    b'"' => {
                        i += 1;
                        closed = true;
                        break;
                    }
                    b'\\' if i + 1 < bytes.len() => {
                        let esc = bytes[i + 1];
                        value.push(match esc {
                            b'n' => '\n',
                            b't' => '\t',
                            b'"' => '"',
                            b'\\' => '\\',
                            other => {
                                return Err(ParseError::new(
                                    format!("unknown escape `\\{}`", other as char),
                                    line,
                                ))
                            }
                        });
                        i += 2;
                    }
                    b'\n' => {
                        return Err(ParseError::new("unterminated string literal", line));
                    }
                    other => {
                        value.push(other as char);
                        i += 1;
                    }
                }
            }
            if !closed {
                return Err(ParseError::new("unterminated string literal", line));
            }
            tokens.push(Token {
                kind: TokenKind::Str(value),
                span: Span::new(start, i),
                line,
            });
            continue;
        }

        // Two-character operators first
        let two = if i + 1 < bytes.len() && bytes[i].is_ascii() && bytes[i + 1].is_ascii() {
            &src[i..i + 2]
        } else {
            ""
        };
        let kind = match two {
            "==" => Some(TokenKind::EqEq),
            "!=" => Some(TokenKind::NotEq),
            "<=" => Some(TokenKind::Le),
            ">=" => Some(TokenKind::Ge),
            "&&" => Some(TokenKind::AndAnd),
            "||" => Some(TokenKind::OrOr),
            _ => None,
        };
        if let Some(kind) = kind {
            i += 2;
            tokens.push(Token {
                kind,
                span: Span::new(start, i),
                line,
            });
            continue;
        }

        let kind = match b {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semi,
            b'=' => TokenKind::Assign,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'<' => TokenKind::Lt,
            b'>' => TokenKind::Gt,
            b'!' => TokenKind::Bang,
            other => {
                return Err(ParseError::new(
                    format!("unexpected character `{}`", other as char),
                    line,
                ))
            }
        };
        i += 1;
        tokens.push(Token {
            kind,
            span: Span::new(start, i),
            line,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(src.len(), src.len()),
        line,
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_basic() {
        let tokens = lex("let x = 1 + 2;").expect("should lex");
        let kinds: Vec<_> = tokens.iter().map(|t| &t.kind).collect();
        assert!(matches!(kinds[0], TokenKind::Let));
        assert!(matches!(kinds[1], TokenKind::Ident(n) if n == "x"));
        assert!(matches!(kinds[2], TokenKind::Assign));
        assert!(matches!(kinds[3], TokenKind::Int(1)));
        assert!(matches!(kinds[4], TokenKind::Plus));
        assert!(matches!(kinds[5], TokenKind::Int(2)));
        assert!(matches!(kinds[6], TokenKind::Semi));
        assert!(matches!(kinds[7], TokenKind::Eof));
    }

    #[test]
    fn test_lex_lines_and_comments() {
        let tokens = lex("1\n# comment\n2").expect("should lex");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn test_lex_string_escapes() {
        let tokens = lex(r#""a\nb""#).expect("should lex");
        assert!(matches!(&tokens[0].kind, TokenKind::Str(s) if s == "a\nb"));
    }

    #[test]
    fn test_lex_rejects_unterminated_string() {
        assert!(lex("\"oops").is_err());
    }

    #[test]
    fn test_lex_two_char_operators() {
        let tokens = lex("a == b != c <= d >= e && f || g").expect("should lex");
        let ops: Vec<_> = tokens
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::Ident(_) | TokenKind::Eof))
            .map(|t| t.kind.clone())
            .collect();
        assert_eq!(
            ops,
            vec![
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::AndAnd,
                TokenKind::OrOr,
            ]
        );
    }
}
