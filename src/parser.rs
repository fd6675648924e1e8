use crate::lex::{Error as LexError, Lexer, Token, TokenType};

/// Nesting bound for sub-expressions and macro arguments. Pathological
///  nesting fails with [Error::DepthExceeded] instead of overflowing the
///  stack.
pub const MAX_DEPTH: usize = 64;

/// An ordered sequence of expressions, in source left-to-right order.
/// Connective markers sit between sibling predicates, so at every nesting
///  level the number of connectives is exactly one less than the number of
///  predicates; the parser cannot produce any other shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Grammar {
    expressions: Vec<Expression>,
}

impl Grammar {
    pub fn expressions(&self) -> &[Expression] {
        &self.expressions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityOp {
    Eq,
    Neq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    StartsWith,
    EndsWith,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `and`/`or` standing between two sibling predicates
    Connective(Connective),
    SubExpression {
        not: bool,
        expressions: Vec<Expression>,
    },
    Equality {
        lhs: TermOrMath,
        op: EqualityOp,
        rhs: TermOrMath,
    },
    Comparison {
        lhs: TermOrMath,
        op: ComparisonOp,
        rhs: TermOrMath,
    },
    Range {
        value: TermOrMath,
        lower: TermOrMath,
        upper: TermOrMath,
    },
    Match {
        lhs: Term,
        op: MatchOp,
        rhs: Term,
    },
    Is(Is),
}

/// The two surface forms of the `is` predicate: `ident is [not] value` and
///  `is [not] ident`.
#[derive(Debug, Clone, PartialEq)]
pub enum Is {
    Explicit {
        ident: String,
        not: bool,
        value: IsValue,
    },
    Implicit {
        not: bool,
        ident: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsValue {
    True,
    False,
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TermOrMath {
    Term(Term),
    Math(Math),
    /// A parenthesized arithmetic expression, `(a add 1)`
    SubMath(Math),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Math {
    pub lhs: Term,
    pub op: MathOp,
    pub rhs: Term,
}

/// A leaf value. Numeric and temporal payloads keep the original source text
///  so rendering reproduces the input byte for byte.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Identifier(String),
    Integer(String),
    Decimal(String),
    Str(String),
    Date(String),
    Time(String),
    DateTime(String),
    Bool(bool),
    Macro(Macro),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    pub name: MacroName,
    pub args: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroName {
    Now,
    Today,
    Duration,
    Unknown(String),
}

impl From<String> for MacroName {
    fn from(s: String) -> Self {
        match s.as_str() {
            "now" => MacroName::Now,
            "today" => MacroName::Today,
            "duration" => MacroName::Duration,
            _ => MacroName::Unknown(s),
        }
    }
}

impl std::fmt::Display for MacroName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Now => write!(f, "#now"),
            Self::Today => write!(f, "#today"),
            Self::Duration => write!(f, "#duration"),
            Self::Unknown(name) => write!(f, "#{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Returned when the input is empty (or just whitespace and comments)
    NoExpression,
    Lexical(LexError),
    MissingCloseParen,
    UnexpectedToken { fragment: String, offset: usize },
    TrailingInput { fragment: String, offset: usize },
    UnexpectedEof,
    DepthExceeded,
}

impl From<LexError> for Error {
    fn from(value: LexError) -> Self {
        Self::Lexical(value)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoExpression => write!(f, "Empty input"),
            Self::Lexical(l) => write!(f, "Lexical error: {l}"),
            Self::MissingCloseParen => write!(f, "Missing closing parenthesis"),
            Self::UnexpectedToken { fragment, offset } => {
                write!(f, "Unexpected '{fragment}' at {offset}")
            }
            Self::TrailingInput { fragment, offset } => {
                write!(f, "Unexpected trailing '{fragment}' at {offset}")
            }
            Self::UnexpectedEof => write!(f, "Unexpected end of input"),
            Self::DepthExceeded => write!(f, "Expression nesting too deep"),
        }
    }
}

impl std::error::Error for Error {}

pub fn parse(input: &str) -> Result<Grammar, Error> {
    let mut lexer = Lexer::new(input);

    if peek(&lexer)?.is_none() {
        return Err(Error::NoExpression);
    }

    let expressions = parse_expressions(&mut lexer, 0)?;

    // Make sure we've completely parsed the input
    if let Some(tok) = peek(&lexer)? {
        return Err(Error::TrailingInput {
            fragment: text(&lexer, &tok),
            offset: tok.start,
        });
    }
    Ok(Grammar { expressions })
}

/// One token of lookahead: lex the next token off a copy of the lexer.
fn peek(lexer: &Lexer) -> Result<Option<Token>, Error> {
    Ok(lexer.clone().next_token()?)
}

fn text(lexer: &Lexer, tok: &Token) -> String {
    String::from_utf8_lossy(lexer.source_of(tok)).into_owned()
}

fn contents(lexer: &Lexer, tok: &Token) -> String {
    String::from_utf8_lossy(lexer.contents(tok)).into_owned()
}

fn unexpected(lexer: &Lexer, tok: &Token) -> Error {
    Error::UnexpectedToken {
        fragment: text(lexer, tok),
        offset: tok.start,
    }
}

/// If the next token has type [ty], consume it and return true.
fn consume_if(lexer: &mut Lexer, ty: TokenType) -> Result<bool, Error> {
    if let Some(tok) = peek(lexer)?
        && tok.ty == ty
    {
        lexer.next_token()?;
        return Ok(true);
    }
    Ok(false)
}

/// predicate { ("and"|"or") predicate }*
fn parse_expressions(lexer: &mut Lexer, depth: usize) -> Result<Vec<Expression>, Error> {
    let mut expressions = vec![parse_predicate(lexer, depth)?];
    loop {
        let connective = match peek(lexer)? {
            Some(tok) if tok.ty == TokenType::And => Connective::And,
            Some(tok) if tok.ty == TokenType::Or => Connective::Or,
            _ => return Ok(expressions),
        };
        lexer.next_token()?;
        expressions.push(Expression::Connective(connective));
        expressions.push(parse_predicate(lexer, depth)?);
    }
}

fn parse_predicate(lexer: &mut Lexer, depth: usize) -> Result<Expression, Error> {
    if depth > MAX_DEPTH {
        return Err(Error::DepthExceeded);
    }

    let Some(first) = peek(lexer)? else {
        return Err(Error::UnexpectedEof);
    };
    match first.ty {
        // "not" always introduces a negated parenthesized group
        TokenType::Not => {
            lexer.next_token()?;
            match lexer.next_token()? {
                Some(tok) if tok.ty == TokenType::ParenLeft => {}
                Some(tok) => return Err(unexpected(lexer, &tok)),
                None => return Err(Error::UnexpectedEof),
            }
            parse_subexpression(lexer, true, depth)
        }
        // An open paren is either a sub-expression or a parenthesized Math
        //  operand; two tokens of lookahead past the paren decide.
        TokenType::ParenLeft if !is_paren_math(lexer) => {
            lexer.next_token()?;
            parse_subexpression(lexer, false, depth)
        }
        TokenType::Is => parse_is_implicit(lexer),
        _ => parse_operator_predicate(lexer, depth),
    }
}

/// After `(` a Term followed by an arithmetic keyword means the paren wraps a
///  Math operand, not a nested expression group.
fn is_paren_math(lexer: &Lexer) -> bool {
    let mut probe = lexer.clone();
    if probe.next_token().is_err() {
        return false;
    }
    match probe.next_token() {
        Ok(Some(_)) => {}
        _ => return false,
    }
    matches!(
        probe.next_token(),
        Ok(Some(Token {
            ty: TokenType::Add | TokenType::Sub | TokenType::Mul | TokenType::Div,
            ..
        }))
    )
}

/// Caller has consumed the opening paren (and the optional leading "not").
fn parse_subexpression(lexer: &mut Lexer, not: bool, depth: usize) -> Result<Expression, Error> {
    let expressions = parse_expressions(lexer, depth + 1)?;
    match lexer.next_token()? {
        Some(tok) if tok.ty == TokenType::ParenRight => {
            Ok(Expression::SubExpression { not, expressions })
        }
        _ => Err(Error::MissingCloseParen),
    }
}

/// `is [not] ident`
fn parse_is_implicit(lexer: &mut Lexer) -> Result<Expression, Error> {
    lexer.next_token()?; // consume 'is'
    let not = consume_if(lexer, TokenType::Not)?;
    match lexer.next_token()? {
        Some(tok) if tok.ty == TokenType::Identifier => Ok(Expression::Is(Is::Implicit {
            not,
            ident: text(lexer, &tok),
        })),
        Some(tok) => Err(unexpected(lexer, &tok)),
        None => Err(Error::UnexpectedEof),
    }
}

fn parse_operator_predicate(lexer: &mut Lexer, depth: usize) -> Result<Expression, Error> {
    let lhs = parse_term_or_math(lexer, depth)?;

    let Some(op) = lexer.next_token()? else {
        return Err(Error::UnexpectedEof);
    };
    match op.ty {
        TokenType::Eq | TokenType::Neq => {
            let eq_op = if op.ty == TokenType::Eq {
                EqualityOp::Eq
            } else {
                EqualityOp::Neq
            };
            let rhs = parse_term_or_math(lexer, depth)?;
            Ok(Expression::Equality {
                lhs,
                op: eq_op,
                rhs,
            })
        }
        TokenType::Gt | TokenType::Gte | TokenType::Lt | TokenType::Lte => {
            let cmp_op = match op.ty {
                TokenType::Gt => ComparisonOp::Gt,
                TokenType::Gte => ComparisonOp::Gte,
                TokenType::Lt => ComparisonOp::Lt,
                _ => ComparisonOp::Lte,
            };
            let rhs = parse_term_or_math(lexer, depth)?;
            Ok(Expression::Comparison {
                lhs,
                op: cmp_op,
                rhs,
            })
        }
        TokenType::Between => {
            let lower = parse_term_or_math(lexer, depth)?;
            match lexer.next_token()? {
                Some(tok) if tok.ty == TokenType::And => {}
                Some(tok) => return Err(unexpected(lexer, &tok)),
                None => return Err(Error::UnexpectedEof),
            }
            let upper = parse_term_or_math(lexer, depth)?;
            Ok(Expression::Range {
                value: lhs,
                lower,
                upper,
            })
        }
        TokenType::StartsWith | TokenType::EndsWith | TokenType::Contains => {
            // Match operands are plain Terms, never Math
            let TermOrMath::Term(lhs) = lhs else {
                return Err(unexpected(lexer, &op));
            };
            let match_op = match op.ty {
                TokenType::StartsWith => MatchOp::StartsWith,
                TokenType::EndsWith => MatchOp::EndsWith,
                _ => MatchOp::Contains,
            };
            let rhs = parse_term(lexer, depth)?;
            Ok(Expression::Match {
                lhs,
                op: match_op,
                rhs,
            })
        }
        TokenType::Is => {
            // `ident is [not] (true|false|null)`
            let TermOrMath::Term(Term::Identifier(ident)) = lhs else {
                return Err(unexpected(lexer, &op));
            };
            let not = consume_if(lexer, TokenType::Not)?;
            let value = match lexer.next_token()? {
                Some(tok) if tok.ty == TokenType::True => IsValue::True,
                Some(tok) if tok.ty == TokenType::False => IsValue::False,
                Some(tok) if tok.ty == TokenType::Null => IsValue::Null,
                Some(tok) => return Err(unexpected(lexer, &tok)),
                None => return Err(Error::UnexpectedEof),
            };
            Ok(Expression::Is(Is::Explicit { ident, not, value }))
        }
        _ => Err(unexpected(lexer, &op)),
    }
}

fn parse_term_or_math(lexer: &mut Lexer, depth: usize) -> Result<TermOrMath, Error> {
    if consume_if(lexer, TokenType::ParenLeft)? {
        let math = parse_math(lexer, depth)?;
        if !consume_if(lexer, TokenType::ParenRight)? {
            return Err(Error::MissingCloseParen);
        }
        return Ok(TermOrMath::SubMath(math));
    }

    let lhs = parse_term(lexer, depth)?;
    let op = match peek(lexer)? {
        Some(tok) if tok.ty == TokenType::Add => MathOp::Add,
        Some(tok) if tok.ty == TokenType::Sub => MathOp::Sub,
        Some(tok) if tok.ty == TokenType::Mul => MathOp::Mul,
        Some(tok) if tok.ty == TokenType::Div => MathOp::Div,
        _ => return Ok(TermOrMath::Term(lhs)),
    };
    lexer.next_token()?;
    let rhs = parse_term(lexer, depth)?;
    Ok(TermOrMath::Math(Math { lhs, op, rhs }))
}

/// Term ("add"|"sub"|"mul"|"div") Term, the mandatory-operator form used
///  inside parens.
fn parse_math(lexer: &mut Lexer, depth: usize) -> Result<Math, Error> {
    let lhs = parse_term(lexer, depth)?;
    let op = match lexer.next_token()? {
        Some(tok) if tok.ty == TokenType::Add => MathOp::Add,
        Some(tok) if tok.ty == TokenType::Sub => MathOp::Sub,
        Some(tok) if tok.ty == TokenType::Mul => MathOp::Mul,
        Some(tok) if tok.ty == TokenType::Div => MathOp::Div,
        Some(tok) => return Err(unexpected(lexer, &tok)),
        None => return Err(Error::UnexpectedEof),
    };
    let rhs = parse_term(lexer, depth)?;
    Ok(Math { lhs, op, rhs })
}

fn parse_term(lexer: &mut Lexer, depth: usize) -> Result<Term, Error> {
    let Some(tok) = lexer.next_token()? else {
        return Err(Error::UnexpectedEof);
    };
    Ok(match tok.ty {
        TokenType::Identifier => Term::Identifier(text(lexer, &tok)),
        TokenType::Integer => Term::Integer(text(lexer, &tok)),
        TokenType::Decimal => Term::Decimal(text(lexer, &tok)),
        TokenType::String => Term::Str(unescape(&contents(lexer, &tok))),
        TokenType::Date => Term::Date(contents(lexer, &tok)),
        TokenType::Time => Term::Time(contents(lexer, &tok)),
        TokenType::DateTime => Term::DateTime(contents(lexer, &tok)),
        TokenType::True => Term::Bool(true),
        TokenType::False => Term::Bool(false),
        TokenType::Macro => Term::Macro(parse_macro(lexer, &tok, depth)?),
        _ => return Err(unexpected(lexer, &tok)),
    })
}

/// Caller has consumed the macro token; arguments are themselves Terms, so
///  macros nest.
fn parse_macro(lexer: &mut Lexer, tok: &Token, depth: usize) -> Result<Macro, Error> {
    if depth > MAX_DEPTH {
        return Err(Error::DepthExceeded);
    }

    let name = MacroName::from(contents(lexer, tok));
    let mut args = Vec::new();

    if consume_if(lexer, TokenType::ParenLeft)? {
        // `#now()` is the same as `#now`
        if !consume_if(lexer, TokenType::ParenRight)? {
            loop {
                args.push(parse_term(lexer, depth + 1)?);
                match lexer.next_token()? {
                    Some(t) if t.ty == TokenType::Comma => continue,
                    Some(t) if t.ty == TokenType::ParenRight => break,
                    Some(t) => return Err(unexpected(lexer, &t)),
                    None => return Err(Error::MissingCloseParen),
                }
            }
        }
    }
    Ok(Macro { name, args })
}

/// Resolves backslash escapes inside a quoted string body.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
