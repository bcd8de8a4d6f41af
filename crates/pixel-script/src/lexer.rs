//! Tokenizer for the pixel script language.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    // Keywords
    Let,
    Const,
    Function,
    If,
    Else,
    Return,
    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Question,
    Colon,
    Assign,
    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    Not,
    AndAnd,
    OrOr,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Let => write!(f, "let"),
            Token::Const => write!(f, "const"),
            Token::Function => write!(f, "function"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::Return => write!(f, "return"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Question => write!(f, "?"),
            Token::Colon => write!(f, ":"),
            Token::Assign => write!(f, "="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Not => write!(f, "!"),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
        }
    }
}

/// A token together with the 1-based source line it starts on, for error
/// messages.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub line: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum LexError {
    #[error("line {line}: unexpected character '{ch}'")]
    UnexpectedChar { ch: char, line: u32 },

    #[error("line {line}: malformed number '{text}'")]
    MalformedNumber { text: String, line: u32 },

    #[error("line {line}: unterminated block comment")]
    UnterminatedComment { line: u32 },
}

pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, LexError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line: u32 = 1;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '/' => {
                chars.next();
                match chars.peek() {
                    Some('/') => {
                        // Line comment
                        for c in chars.by_ref() {
                            if c == '\n' {
                                line += 1;
                                break;
                            }
                        }
                    }
                    Some('*') => {
                        chars.next();
                        let start_line = line;
                        let mut closed = false;
                        while let Some(c) = chars.next() {
                            if c == '\n' {
                                line += 1;
                            } else if c == '*' && chars.peek() == Some(&'/') {
                                chars.next();
                                closed = true;
                                break;
                            }
                        }
                        if !closed {
                            return Err(LexError::UnterminatedComment { line: start_line });
                        }
                    }
                    _ => tokens.push(SpannedToken {
                        token: Token::Slash,
                        line,
                    }),
                }
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' {
                        text.push(c);
                        chars.next();
                        // Exponent sign
                        if (c == 'e' || c == 'E')
                            && matches!(chars.peek(), Some('+') | Some('-'))
                        {
                            text.push(chars.next().unwrap());
                        }
                    } else {
                        break;
                    }
                }
                let value = text
                    .parse::<f64>()
                    .map_err(|_| LexError::MalformedNumber { text, line })?;
                tokens.push(SpannedToken {
                    token: Token::Number(value),
                    line,
                });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = match name.as_str() {
                    "let" | "var" => Token::Let,
                    "const" => Token::Const,
                    "function" => Token::Function,
                    "if" => Token::If,
                    "else" => Token::Else,
                    "return" => Token::Return,
                    // Numeric language: booleans are just numbers
                    "true" => Token::Number(1.0),
                    "false" => Token::Number(0.0),
                    _ => Token::Ident(name),
                };
                tokens.push(SpannedToken { token, line });
            }
            _ => {
                chars.next();
                let token = match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    ',' => Token::Comma,
                    ';' => Token::Semicolon,
                    '?' => Token::Question,
                    ':' => Token::Colon,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '%' => Token::Percent,
                    '<' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Token::Le
                        } else {
                            Token::Lt
                        }
                    }
                    '>' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Token::Ge
                        } else {
                            Token::Gt
                        }
                    }
                    '=' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            // Accept JS strict equality too
                            if chars.peek() == Some(&'=') {
                                chars.next();
                            }
                            Token::EqEq
                        } else {
                            Token::Assign
                        }
                    }
                    '!' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            if chars.peek() == Some(&'=') {
                                chars.next();
                            }
                            Token::NotEq
                        } else {
                            Token::Not
                        }
                    }
                    '&' => {
                        if chars.peek() == Some(&'&') {
                            chars.next();
                            Token::AndAnd
                        } else {
                            return Err(LexError::UnexpectedChar { ch: '&', line });
                        }
                    }
                    '|' => {
                        if chars.peek() == Some(&'|') {
                            chars.next();
                            Token::OrOr
                        } else {
                            return Err(LexError::UnexpectedChar { ch: '|', line });
                        }
                    }
                    ch => return Err(LexError::UnexpectedChar { ch, line }),
                };
                tokens.push(SpannedToken { token, line });
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_simple_return() {
        assert_eq!(
            kinds("return [rgb[0], 255]"),
            vec![
                Token::Return,
                Token::LBracket,
                Token::Ident("rgb".into()),
                Token::LBracket,
                Token::Number(0.0),
                Token::RBracket,
                Token::Comma,
                Token::Number(255.0),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("// from QGIS\nlet a = 1 /* inline */ + 2"),
            vec![
                Token::Let,
                Token::Ident("a".into()),
                Token::Assign,
                Token::Number(1.0),
                Token::Plus,
                Token::Number(2.0),
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a <= b && c !== d"),
            vec![
                Token::Ident("a".into()),
                Token::Le,
                Token::Ident("b".into()),
                Token::AndAnd,
                Token::Ident("c".into()),
                Token::NotEq,
                Token::Ident("d".into()),
            ]
        );
    }

    #[test]
    fn test_scientific_notation() {
        assert_eq!(kinds("1.5e-3"), vec![Token::Number(0.0015)]);
    }

    #[test]
    fn test_line_tracking() {
        let tokens = tokenize("let a = 1\nreturn a").unwrap();
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens.last().unwrap().line, 2);
    }

    #[test]
    fn test_unexpected_char() {
        assert!(tokenize("let a = @").is_err());
    }
}
