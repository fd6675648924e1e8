use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::OnceLock;

/// #Notes
/// Keyword operators (`eq`, `between`, ...) are ordinary identifier-shaped
///  words; the lexer classifies them into their own token types so the parser
///  never has to compare raw text. Classification is case-sensitive: the
///  language keywords are lower-case and `Eq` is a plain identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenType {
    ParenLeft,
    ParenRight,
    Comma,

    Identifier,
    Integer,
    Decimal,
    String,
    Date,     // quoted body shaped YYYY-MM-DD
    Time,     // quoted body shaped HH:MM:SS[.fff]
    DateTime, // quoted body shaped <date>T<time>[±HH]
    Macro,    // #ident

    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    StartsWith,
    EndsWith,
    Contains,
    Between,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Is,
    Not,
    Null,
    True,
    False,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub ty: TokenType,

    // Byte indexes into the source
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    UnterminatedStringLiteral(usize),
    UnexpectedCharacter(usize),
    /// `#` not followed by an identifier
    BadMacroName(usize),
    /// A quoted body shaped like a date/time but rejected by the calendar,
    ///  e.g. `'2020-13-01'`
    InvalidTemporalLiteral { start: usize, body: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnterminatedStringLiteral(start) => {
                write!(f, "Unterminated string literal starting at {start}")
            }
            Self::UnexpectedCharacter(start) => {
                write!(f, "Unexpected character at {start}")
            }
            Self::BadMacroName(start) => {
                write!(f, "'#' must be followed by a macro name at {start}")
            }
            Self::InvalidTemporalLiteral { start, body } => {
                write!(f, "Invalid date/time literal '{body}' at {start}")
            }
        }
    }
}

impl std::error::Error for Error {}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap())
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}:\d{2}:\d{2}(?:\.\d{1,3})?$").unwrap())
}

fn datetime_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d{1,3})?)([+-]\d{2})?$").unwrap()
    })
}

/// This type simply holds a reference to the source bytes and an index, so it's
///  cheap to copy, making lookahead/rewind operations in the parser very easy.
#[derive(Clone)]
pub struct Lexer<'input> {
    source: &'input [u8],
    current: usize,
}

impl<'input> Lexer<'input> {
    pub fn new(source: &'input str) -> Self {
        Self {
            source: source.as_bytes(),
            current: 0,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current >= self.source.len()
    }

    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.source.get(self.current).copied()
    }

    #[inline]
    pub fn peek_at(&self, at: usize) -> Option<u8> {
        self.source.get(self.current + at).copied()
    }

    #[inline]
    fn pop_unchecked(&mut self) -> u8 {
        let res = self.source[self.current];
        self.current += 1;
        res
    }

    #[inline]
    pub fn remaining(&self) -> &[u8] {
        &self.source[self.current..]
    }

    #[inline]
    fn consume_while(&mut self, predicate: impl Fn(u8) -> bool) {
        while let Some(c) = self.peek()
            && predicate(c)
        {
            self.current += 1;
        }
    }

    /// Skips whitespace and `// ...` line comments; both are elided entirely.
    fn consume_trivia(&mut self) {
        loop {
            self.consume_while(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'));
            if self.remaining().starts_with(b"//") {
                self.consume_while(|b| b != b'\n');
            } else {
                return;
            }
        }
    }

    /// Returns the slice of the source that this token was lexed from.
    #[inline]
    pub fn source_of(&self, token: &Token) -> &'input [u8] {
        &self.source[token.start..token.end]
    }

    /// Like [source_of] but omits the opening and closing quotes of string-ish
    ///  literal tokens and the leading `#` of macro tokens.
    #[inline]
    pub fn contents(&self, token: &Token) -> &'input [u8] {
        let s = self.source_of(token);
        match token.ty {
            TokenType::String | TokenType::Date | TokenType::Time | TokenType::DateTime => {
                &s[1..s.len() - 1]
            }
            TokenType::Macro => &s[1..],
            _ => s,
        }
    }

    /// A quoted body may be a plain string or one of the temporal literal
    ///  forms. Shape is decided by regex, validity by chrono: a body that
    ///  looks like a date but names an impossible one is an error rather than
    ///  silently becoming a string.
    fn classify_quoted(&self, start: usize, body: &[u8]) -> Result<TokenType, Error> {
        let Ok(body) = std::str::from_utf8(body) else {
            return Ok(TokenType::String);
        };

        let invalid = || Error::InvalidTemporalLiteral {
            start,
            body: body.to_string(),
        };

        if date_re().is_match(body) {
            return match NaiveDate::parse_from_str(body, "%Y-%m-%d") {
                Ok(_) => Ok(TokenType::Date),
                Err(_) => Err(invalid()),
            };
        }
        if time_re().is_match(body) {
            return match NaiveTime::parse_from_str(body, "%H:%M:%S%.f") {
                Ok(_) => Ok(TokenType::Time),
                Err(_) => Err(invalid()),
            };
        }
        if let Some(caps) = datetime_re().captures(body) {
            if NaiveDateTime::parse_from_str(&caps[1], "%Y-%m-%dT%H:%M:%S%.f").is_err() {
                return Err(invalid());
            }
            // Optional ±HH offset; hours only
            if let Some(offset) = caps.get(2) {
                let hours: u32 = offset.as_str()[1..].parse().map_err(|_| invalid())?;
                if hours > 23 {
                    return Err(invalid());
                }
            }
            return Ok(TokenType::DateTime);
        }
        Ok(TokenType::String)
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, Error> {
        self.consume_trivia();

        if self.is_empty() {
            return Ok(None);
        }
        let start = self.current;

        // Convenience macro for returning a token from `start` to `self.current`
        // The match below will borrow self as mutable, so a simple closure won't
        //  do the trick.
        macro_rules! tok {
            ($name:ident) => {{
                Token {
                    ty: TokenType::$name,
                    start,
                    end: self.current,
                }
            }};
        }

        Ok(Some(match self.pop_unchecked() {
            b'(' => tok!(ParenLeft),
            b')' => tok!(ParenRight),
            b',' => tok!(Comma),

            // Single and double-quoted strings with backslash escapes
            term if term == b'\'' || term == b'"' => {
                loop {
                    match self.peek() {
                        None => return Err(Error::UnterminatedStringLiteral(start)),
                        Some(b'\\') => {
                            self.current += 1;
                            if self.is_empty() {
                                return Err(Error::UnterminatedStringLiteral(start));
                            }
                            self.current += 1;
                        }
                        Some(c) if c == term => break,
                        Some(_) => self.current += 1,
                    }
                }
                // consume closing term
                self.current += 1;
                let body = &self.source[start + 1..self.current - 1];
                let ty = self.classify_quoted(start, body)?;
                Token {
                    ty,
                    start,
                    end: self.current,
                }
            }

            // Macro invocation: '#' immediately followed by an identifier
            b'#' => {
                if !matches!(self.peek(), Some(b'a'..=b'z' | b'A'..=b'Z' | b'_')) {
                    return Err(Error::BadMacroName(start));
                }
                self.consume_while(is_ident_continuation);
                tok!(Macro)
            }

            // Identifiers and keywords
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                self.consume_while(is_ident_continuation);
                let word = &self.source[start..self.current];
                Token {
                    ty: keyword(word).unwrap_or(TokenType::Identifier),
                    start,
                    end: self.current,
                }
            }

            // Digits mean an integer, or a decimal when a fraction follows
            b'0'..=b'9' => {
                self.consume_while(|b| b.is_ascii_digit());
                if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit())
                {
                    self.current += 1; // consume '.'
                    self.consume_while(|b| b.is_ascii_digit());
                    tok!(Decimal)
                } else {
                    tok!(Integer)
                }
            }

            _ => return Err(Error::UnexpectedCharacter(start)),
        }))
    }
}

#[inline]
fn is_ident_continuation(b: u8) -> bool {
    matches!(b, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
}

fn keyword(word: &[u8]) -> Option<TokenType> {
    Some(match word {
        b"eq" => TokenType::Eq,
        b"neq" => TokenType::Neq,
        b"gt" => TokenType::Gt,
        b"gte" => TokenType::Gte,
        b"lt" => TokenType::Lt,
        b"lte" => TokenType::Lte,
        b"startswith" => TokenType::StartsWith,
        b"endswith" => TokenType::EndsWith,
        b"contains" => TokenType::Contains,
        b"between" => TokenType::Between,
        b"add" => TokenType::Add,
        b"sub" => TokenType::Sub,
        b"mul" => TokenType::Mul,
        b"div" => TokenType::Div,
        b"and" => TokenType::And,
        b"or" => TokenType::Or,
        b"is" => TokenType::Is,
        b"not" => TokenType::Not,
        b"null" => TokenType::Null,
        b"true" => TokenType::True,
        b"false" => TokenType::False,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        while let Some(tok) = lexer.next_token().unwrap() {
            tokens.push(tok);
        }
        tokens
    }

    fn types(source: &str) -> Vec<TokenType> {
        lex_all(source).into_iter().map(|t| t.ty).collect()
    }

    #[test]
    fn lex_basic() {
        //NOTE this test doesn't use the handy `types` helper because we're
        //  checking that the token boundaries are correct as well.
        //              0         1         2
        //              01234567890123456789012
        let source = r#"age gte 30 and not (ok)"#;
        let mut lexer = Lexer::new(source);

        let tok = lexer.next_token().unwrap().unwrap();
        assert_eq!(
            tok,
            Token {
                ty: TokenType::Identifier,
                start: 0,
                end: 3
            }
        );
        assert_eq!(lexer.contents(&tok), b"age");

        assert_eq!(
            lexer.next_token().unwrap().unwrap(),
            Token {
                ty: TokenType::Gte,
                start: 4,
                end: 7
            }
        );
        assert_eq!(
            lexer.next_token().unwrap().unwrap(),
            Token {
                ty: TokenType::Integer,
                start: 8,
                end: 10
            }
        );
        assert_eq!(
            lexer.next_token().unwrap().unwrap(),
            Token {
                ty: TokenType::And,
                start: 11,
                end: 14
            }
        );
        assert_eq!(
            lexer.next_token().unwrap().unwrap(),
            Token {
                ty: TokenType::Not,
                start: 15,
                end: 18
            }
        );
        assert_eq!(
            lexer.next_token().unwrap().unwrap(),
            Token {
                ty: TokenType::ParenLeft,
                start: 19,
                end: 20
            }
        );
        assert_eq!(
            lexer.next_token().unwrap().unwrap(),
            Token {
                ty: TokenType::Identifier,
                start: 20,
                end: 22
            }
        );
        assert_eq!(
            lexer.next_token().unwrap().unwrap(),
            Token {
                ty: TokenType::ParenRight,
                start: 22,
                end: 23
            }
        );
        assert_eq!(lexer.next_token(), Ok(None));
    }

    #[test]
    fn lex_strings() {
        let source = r#"'single' "double" 'it\'s'"#;
        let toks = lex_all(source);
        assert_eq!(toks.len(), 3);
        assert!(toks.iter().all(|t| t.ty == TokenType::String));

        let lexer = Lexer::new(source);
        assert_eq!(lexer.contents(&toks[0]), b"single");
        assert_eq!(lexer.contents(&toks[1]), b"double");
        assert_eq!(lexer.contents(&toks[2]), br"it\'s");
    }

    #[test]
    fn lex_unterminated_string() {
        let mut lexer = Lexer::new("name eq 'oops");
        assert_eq!(
            lexer.next_token().unwrap().unwrap().ty,
            TokenType::Identifier
        );
        assert_eq!(lexer.next_token().unwrap().unwrap().ty, TokenType::Eq);
        assert_eq!(lexer.next_token(), Err(Error::UnterminatedStringLiteral(8)));
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(
            types("42 20.5"),
            vec![TokenType::Integer, TokenType::Decimal]
        );
    }

    #[test]
    fn lex_keywords_are_case_sensitive() {
        assert_eq!(
            types("eq Eq EQ"),
            vec![TokenType::Eq, TokenType::Identifier, TokenType::Identifier]
        );
    }

    #[test]
    fn lex_macros() {
        let source = "#now #duration('PT2H')";
        let toks = lex_all(source);
        assert_eq!(toks[0].ty, TokenType::Macro);
        assert_eq!(toks[1].ty, TokenType::Macro);
        assert_eq!(toks[2].ty, TokenType::ParenLeft);

        let lexer = Lexer::new(source);
        assert_eq!(lexer.contents(&toks[0]), b"now");
        assert_eq!(lexer.contents(&toks[1]), b"duration");

        let mut lexer = Lexer::new("# now");
        assert_eq!(lexer.next_token(), Err(Error::BadMacroName(0)));
    }

    #[test]
    fn lex_comments_and_whitespace_elided() {
        let source = "age gte 30 // only adults\nand weight lt 100";
        assert_eq!(
            types(source),
            vec![
                TokenType::Identifier,
                TokenType::Gte,
                TokenType::Integer,
                TokenType::And,
                TokenType::Identifier,
                TokenType::Lt,
                TokenType::Integer,
            ]
        );
    }

    #[test]
    fn lex_temporal_classification() {
        assert_eq!(types("'2020-03-18'"), vec![TokenType::Date]);
        assert_eq!(types("'12:30:15'"), vec![TokenType::Time]);
        assert_eq!(types("'12:30:15.123'"), vec![TokenType::Time]);
        assert_eq!(types("'2020-03-18T12:30:15'"), vec![TokenType::DateTime]);
        assert_eq!(
            types("'2020-03-18T12:30:15.500+02'"),
            vec![TokenType::DateTime]
        );
        // Not shaped like a date at all: plain string
        assert_eq!(types("'2020-03'"), vec![TokenType::String]);
    }

    #[test]
    fn lex_invalid_temporal_is_an_error() {
        let mut lexer = Lexer::new("'2020-13-01'");
        assert_eq!(
            lexer.next_token(),
            Err(Error::InvalidTemporalLiteral {
                start: 0,
                body: "2020-13-01".to_string()
            })
        );

        let mut lexer = Lexer::new("'25:00:00'");
        assert!(matches!(
            lexer.next_token(),
            Err(Error::InvalidTemporalLiteral { .. })
        ));
    }

    #[test]
    fn lex_unexpected_character() {
        let mut lexer = Lexer::new("a ; b");
        assert_eq!(
            lexer.next_token().unwrap().unwrap().ty,
            TokenType::Identifier
        );
        assert_eq!(lexer.next_token(), Err(Error::UnexpectedCharacter(2)));
    }
}
