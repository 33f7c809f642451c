use crate::hql::SyntaxError;
use std::fmt;

///
/// TokenKind
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TokenKind {
    Identifier(String),
    Integer(i64),
    Decimal(f64),
    Text(String),
    NamedParameter(String),
    PositionalParameter(u32),
    Comma,
    Dot,
    LeftParen,
    RightParen,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Plus,
    Minus,
    Star,
    Slash,
    Concat,
    End,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(name) => write!(f, "{name}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::NamedParameter(name) => write!(f, ":{name}"),
            Self::PositionalParameter(position) => write!(f, "?{position}"),
            Self::Comma => f.write_str(","),
            Self::Dot => f.write_str("."),
            Self::LeftParen => f.write_str("("),
            Self::RightParen => f.write_str(")"),
            Self::Equal => f.write_str("="),
            Self::NotEqual => f.write_str("<>"),
            Self::Less => f.write_str("<"),
            Self::LessEqual => f.write_str("<="),
            Self::Greater => f.write_str(">"),
            Self::GreaterEqual => f.write_str(">="),
            Self::Plus => f.write_str("+"),
            Self::Minus => f.write_str("-"),
            Self::Star => f.write_str("*"),
            Self::Slash => f.write_str("/"),
            Self::Concat => f.write_str("||"),
            Self::End => f.write_str("<end of query>"),
        }
    }
}

///
/// Token
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,

    /// 1-based character column.
    pub(crate) column: usize,
}

impl Token {
    /// Identifier text when it spells `keyword`, case-insensitively.
    pub(crate) fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Identifier(name) if name.eq_ignore_ascii_case(keyword))
    }
}

/// Tokenize an HQL string; the result always ends with `End`.
pub(crate) fn tokenize(query: &str) -> Result<Vec<Token>, SyntaxError> {
    let chars: Vec<char> = query.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let error = |message: String, column: usize| SyntaxError::new(message, column, query);

    while i < chars.len() {
        let c = chars[i];
        let column = i + 1;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (kind, width) = match c {
            ',' => (TokenKind::Comma, 1),
            '.' if !chars.get(i + 1).is_some_and(char::is_ascii_digit) => (TokenKind::Dot, 1),
            '(' => (TokenKind::LeftParen, 1),
            ')' => (TokenKind::RightParen, 1),
            '=' => (TokenKind::Equal, 1),
            '+' => (TokenKind::Plus, 1),
            '-' => (TokenKind::Minus, 1),
            '*' => (TokenKind::Star, 1),
            '/' => (TokenKind::Slash, 1),
            '|' if chars.get(i + 1) == Some(&'|') => (TokenKind::Concat, 2),
            '!' if chars.get(i + 1) == Some(&'=') => (TokenKind::NotEqual, 2),
            '<' => match chars.get(i + 1) {
                Some('=') => (TokenKind::LessEqual, 2),
                Some('>') => (TokenKind::NotEqual, 2),
                _ => (TokenKind::Less, 1),
            },
            '>' => match chars.get(i + 1) {
                Some('=') => (TokenKind::GreaterEqual, 2),
                _ => (TokenKind::Greater, 1),
            },
            '\'' => {
                let mut text = String::new();
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        None => return Err(error("unterminated string literal".to_string(), column)),
                        Some('\'') if chars.get(j + 1) == Some(&'\'') => {
                            text.push('\'');
                            j += 2;
                        }
                        Some('\'') => break,
                        Some(other) => {
                            text.push(*other);
                            j += 1;
                        }
                    }
                }
                (TokenKind::Text(text), j + 1 - i)
            }
            ':' => {
                let name: String = chars[i + 1..]
                    .iter()
                    .take_while(|c| is_identifier_part(**c))
                    .collect();
                if name.is_empty() {
                    return Err(error("expected parameter name after ':'".to_string(), column));
                }
                let width = name.chars().count() + 1;
                (TokenKind::NamedParameter(name), width)
            }
            '?' => {
                let digits: String = chars[i + 1..]
                    .iter()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                let position = digits.parse::<u32>().map_err(|_| {
                    error(
                        "positional parameters must carry an ordinal, as in ?1".to_string(),
                        column,
                    )
                })?;
                (TokenKind::PositionalParameter(position), digits.len() + 1)
            }
            c if c.is_ascii_digit() || c == '.' => {
                let literal: String = chars[i..]
                    .iter()
                    .take_while(|c| c.is_ascii_digit() || **c == '.')
                    .collect();
                let width = literal.len();
                let kind = if literal.contains('.') {
                    literal
                        .parse::<f64>()
                        .map(TokenKind::Decimal)
                        .map_err(|_| error(format!("malformed number '{literal}'"), column))?
                } else {
                    literal
                        .parse::<i64>()
                        .map(TokenKind::Integer)
                        .map_err(|_| error(format!("integer literal '{literal}' out of range"), column))?
                };
                (kind, width)
            }
            c if is_identifier_start(c) => {
                let name: String = chars[i..]
                    .iter()
                    .take_while(|c| is_identifier_part(**c))
                    .collect();
                let width = name.chars().count();
                (TokenKind::Identifier(name), width)
            }
            other => return Err(error(format!("unexpected char: '{other}'"), column)),
        };

        tokens.push(Token { kind, column });
        i += width;
    }

    tokens.push(Token {
        kind: TokenKind::End,
        column: chars.len() + 1,
    });

    Ok(tokens)
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(query: &str) -> Vec<TokenKind> {
        tokenize(query)
            .expect("tokenize should succeed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_paths_parameters_and_operators() {
        assert_eq!(
            kinds("f.duration >= :min and f.id <> ?1"),
            vec![
                TokenKind::Identifier("f".into()),
                TokenKind::Dot,
                TokenKind::Identifier("duration".into()),
                TokenKind::GreaterEqual,
                TokenKind::NamedParameter("min".into()),
                TokenKind::Identifier("and".into()),
                TokenKind::Identifier("f".into()),
                TokenKind::Dot,
                TokenKind::Identifier("id".into()),
                TokenKind::NotEqual,
                TokenKind::PositionalParameter(1),
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn string_literals_unescape_doubled_quotes() {
        assert_eq!(
            kinds("'O''Hare' 1.5 42"),
            vec![
                TokenKind::Text("O'Hare".into()),
                TokenKind::Decimal(1.5),
                TokenKind::Integer(42),
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn reports_the_column_of_bad_input() {
        let err = tokenize("from Flight f where f.name = 'open").expect_err("should fail");

        assert_eq!(err.column, 30);
    }

    #[test]
    fn bare_question_mark_is_rejected() {
        assert!(tokenize("from Flight where id = ?").is_err());
    }
}
