use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::interpreter::{CodeGenerator, Interpreter};
use crate::options::RenderingOptions;
use crate::parser::{
    Connective, ComparisonOp, EqualityOp, Expression, Is, IsValue, Macro, MacroName, Math, MathOp,
    MatchOp, Term, TermOrMath,
};
use crate::translate::{Error, MacroError, RenderError, TermType, TypeError};

const NUMERIC_OR_TEMPORAL: [TermType; 5] = [
    TermType::Integer,
    TermType::Decimal,
    TermType::Date,
    TermType::Time,
    TermType::DateTime,
];

const NUMERIC: [TermType; 2] = [TermType::Integer, TermType::Decimal];

/// Produces an ANSI-ish SQL boolean expression from Espresso++ source.
///
/// Configuration lives in [rendering_options](Self::rendering_options): the
/// logical → native field table with per-field filterable flags, and the
/// named-parameter switch. The generator renders each top-level expression
/// into the sink as it goes, so on failure the sink may hold a partial
/// rendering and must be discarded by the caller.
#[derive(Debug, Clone, Default)]
pub struct SqlCodeGenerator {
    pub rendering_options: RenderingOptions,
}

impl SqlCodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(rendering_options: RenderingOptions) -> Self {
        Self { rendering_options }
    }

    fn render_expression(&mut self, expression: &Expression) -> Result<String, RenderError> {
        match expression {
            Expression::Connective(Connective::And) => Ok(" AND ".to_string()),
            Expression::Connective(Connective::Or) => Ok(" OR ".to_string()),

            Expression::SubExpression { not, expressions } => {
                let mut inner = String::new();
                for e in expressions {
                    inner.push_str(&self.render_expression(e)?);
                }
                if *not {
                    Ok(format!("NOT ({inner})"))
                } else {
                    Ok(format!("({inner})"))
                }
            }

            Expression::Equality { lhs, op, rhs } => {
                let (l, lt) = self.render_operand(lhs)?;
                let (r, rt) = self.render_operand(rhs)?;
                ensure_compatible(lt, rt)?;
                let op = match op {
                    EqualityOp::Eq => "=",
                    EqualityOp::Neq => "<>",
                };
                Ok(format!("{l} {op} {r}"))
            }

            Expression::Comparison { lhs, op, rhs } => {
                let (l, lt) = self.render_operand(lhs)?;
                let (r, rt) = self.render_operand(rhs)?;
                ensure_compatible(lt, rt)?;
                let op = match op {
                    ComparisonOp::Gt => ">",
                    ComparisonOp::Gte => ">=",
                    ComparisonOp::Lt => "<",
                    ComparisonOp::Lte => "<=",
                };
                ensure_operand_class(op, lt.resolve(rt), &NUMERIC_OR_TEMPORAL)?;
                Ok(format!("{l} {op} {r}"))
            }

            Expression::Range {
                value,
                lower,
                upper,
            } => {
                let (v, vt) = self.render_operand(value)?;
                let (lo, lot) = self.render_operand(lower)?;
                let (hi, hit) = self.render_operand(upper)?;
                ensure_compatible(vt, lot)?;
                let resolved = vt.resolve(lot);
                ensure_compatible(resolved, hit)?;
                ensure_operand_class("BETWEEN", resolved.resolve(hit), &NUMERIC)?;
                Ok(format!("{v} BETWEEN {lo} AND {hi}"))
            }

            Expression::Match { lhs, op, rhs } => {
                let (l, lt) = self.render_term(lhs)?;
                if !lt.is_compatible(TermType::String) {
                    return Err(TypeError::BadOperandClass {
                        operator: "LIKE",
                        term_type: lt,
                    }
                    .into());
                }
                // The pattern side must be an actual string literal: its
                //  quotes are stripped and the body is re-wrapped with
                //  wildcards per mode.
                let Term::Str(body) = rhs else {
                    return Err(TypeError::BadOperandClass {
                        operator: "LIKE",
                        term_type: term_type_of(rhs),
                    }
                    .into());
                };
                let pattern = match op {
                    MatchOp::StartsWith => format!("{body}%"),
                    MatchOp::EndsWith => format!("%{body}"),
                    MatchOp::Contains => format!("%{body}%"),
                };
                let pattern = self.externalize_or(format!("'{pattern}'"));
                Ok(format!("{l} LIKE {pattern}"))
            }

            Expression::Is(is) => self.render_is(is),
        }
    }

    fn render_is(&mut self, is: &Is) -> Result<String, RenderError> {
        match is {
            Is::Explicit { ident, not, value } => {
                let id = self.render_identifier(ident)?;
                Ok(match (value, not) {
                    (IsValue::Null, false) => format!("{id} IS NULL"),
                    (IsValue::Null, true) => format!("{id} IS NOT NULL"),
                    (IsValue::True, false) => format!("{id} = 1"),
                    (IsValue::True, true) => format!("{id} != 1"),
                    (IsValue::False, false) => format!("{id} = 0"),
                    (IsValue::False, true) => format!("{id} != 0"),
                })
            }
            Is::Implicit { not, ident } => {
                let id = self.render_identifier(ident)?;
                if *not {
                    Ok(format!("{id} != 1"))
                } else {
                    Ok(format!("{id} = 1"))
                }
            }
        }
    }

    fn render_operand(&mut self, operand: &TermOrMath) -> Result<(String, TermType), RenderError> {
        match operand {
            TermOrMath::Term(t) => self.render_term(t),
            TermOrMath::Math(m) => self.render_math(m, false),
            TermOrMath::SubMath(m) => self.render_math(m, true),
        }
    }

    fn render_math(
        &mut self,
        math: &Math,
        parenthesized: bool,
    ) -> Result<(String, TermType), RenderError> {
        let (l, lt) = self.render_term(&math.lhs)?;
        let (r, rt) = self.render_term(&math.rhs)?;
        ensure_compatible(lt, rt)?;
        let resolved = lt.resolve(rt);
        let op = match math.op {
            MathOp::Add => "+",
            MathOp::Sub => "-",
            MathOp::Mul => "*",
            MathOp::Div => "/",
        };
        ensure_operand_class(op, resolved, &NUMERIC_OR_TEMPORAL)?;

        // Temporal arithmetic needs its literal operands tagged with the
        //  DATE/TIME/TIMESTAMP keyword; field references and macro
        //  expansions go bare.
        let (l, r) = if resolved.is_temporal() {
            (
                temporal_keyword(&math.lhs, lt, l),
                temporal_keyword(&math.rhs, rt, r),
            )
        } else {
            (l, r)
        };

        let body = format!("{l} {op} {r}");
        if parenthesized {
            Ok((format!("({body})"), resolved))
        } else {
            Ok((body, resolved))
        }
    }

    fn render_term(&mut self, term: &Term) -> Result<(String, TermType), RenderError> {
        Ok(match term {
            Term::Identifier(name) => (self.render_identifier(name)?, TermType::Identifier),
            Term::Integer(text) => (self.externalize_or(text.clone()), TermType::Integer),
            Term::Decimal(text) => (self.externalize_or(text.clone()), TermType::Decimal),
            Term::Str(body) => (self.externalize_or(format!("'{body}'")), TermType::String),
            Term::Date(body) => (self.externalize_or(format!("'{body}'")), TermType::Date),
            Term::Time(body) => (self.externalize_or(format!("'{body}'")), TermType::Time),
            Term::DateTime(body) => {
                // The ISO `T` separator becomes a space in SQL
                let rendered = format!("'{}'", body.replacen('T', " ", 1));
                (self.externalize_or(rendered), TermType::DateTime)
            }
            Term::Bool(value) => {
                let rendered = if *value { "1" } else { "0" };
                (self.externalize_or(rendered.to_string()), TermType::Bool)
            }
            Term::Macro(m) => self.render_macro(m)?,
        })
    }

    /// Applies the field table: a non-filterable field is an error, a mapped
    ///  field renders its native name, an unknown field renders as written.
    fn render_identifier(&self, name: &str) -> Result<String, RenderError> {
        match self.rendering_options.get_field_props(name) {
            Some(props) if !props.filterable => Err(TypeError::NotFilterable {
                field: name.to_string(),
            }
            .into()),
            Some(props) => Ok(props.native_name.clone()),
            None => Ok(name.to_string()),
        }
    }

    fn render_macro(&mut self, m: &Macro) -> Result<(String, TermType), RenderError> {
        match &m.name {
            MacroName::Now => {
                if !m.args.is_empty() {
                    return Err(MacroError::UnexpectedArguments(m.name.to_string()).into());
                }
                Ok(("CURRENT_TIMESTAMP".to_string(), TermType::DateTime))
            }
            MacroName::Today => {
                if !m.args.is_empty() {
                    return Err(MacroError::UnexpectedArguments(m.name.to_string()).into());
                }
                Ok(("CURRENT_DATE".to_string(), TermType::Date))
            }
            MacroName::Duration => {
                let body = match m.args.as_slice() {
                    [] => return Err(MacroError::MissingArgument(m.name.to_string()).into()),
                    [Term::Str(body)] => body,
                    [_] => return Err(MacroError::WrongArgumentType(m.name.to_string()).into()),
                    _ => return Err(MacroError::UnexpectedArguments(m.name.to_string()).into()),
                };
                let parts = parse_iso_duration(body)
                    .ok_or_else(|| MacroError::InvalidDuration(body.clone()))?;
                // An interval combines with any temporal operand, so the
                //  expansion is left untyped like a field reference.
                Ok((render_intervals(&parts), TermType::Identifier))
            }
            MacroName::Unknown(_) => Err(MacroError::Unknown(m.name.to_string()).into()),
        }
    }

    fn externalize_or(&mut self, rendered: String) -> String {
        match self.rendering_options.externalize(&rendered) {
            Some(placeholder) => placeholder,
            None => rendered,
        }
    }
}

impl CodeGenerator for SqlCodeGenerator {
    fn visit(
        &mut self,
        interpreter: &dyn Interpreter,
        source: &str,
        sink: &mut dyn fmt::Write,
    ) -> Result<(), Error> {
        let grammar = interpreter
            .parse(source)
            .map_err(|cause| Error::syntax(source, cause))?;

        for expression in grammar.expressions() {
            let rendered = self
                .render_expression(expression)
                .map_err(|cause| Error::generate(source, cause))?;
            sink.write_str(&rendered)
                .map_err(|e| Error::generate(source, RenderError::Sink(e)))?;
        }
        Ok(())
    }
}

fn ensure_compatible(left: TermType, right: TermType) -> Result<(), RenderError> {
    if left.is_compatible(right) {
        Ok(())
    } else {
        Err(TypeError::Incompatible { left, right }.into())
    }
}

fn ensure_operand_class(
    operator: &'static str,
    resolved: TermType,
    allowed: &[TermType],
) -> Result<(), RenderError> {
    if resolved == TermType::Identifier || allowed.contains(&resolved) {
        Ok(())
    } else {
        Err(TypeError::BadOperandClass {
            operator,
            term_type: resolved,
        }
        .into())
    }
}

/// The static type a term would carry, without rendering it.
fn term_type_of(term: &Term) -> TermType {
    match term {
        Term::Identifier(_) => TermType::Identifier,
        Term::Integer(_) => TermType::Integer,
        Term::Decimal(_) => TermType::Decimal,
        Term::Str(_) => TermType::String,
        Term::Date(_) => TermType::Date,
        Term::Time(_) => TermType::Time,
        Term::DateTime(_) => TermType::DateTime,
        Term::Bool(_) => TermType::Bool,
        Term::Macro(m) => match m.name {
            MacroName::Now => TermType::DateTime,
            MacroName::Today => TermType::Date,
            MacroName::Duration => TermType::Identifier,
            MacroName::Unknown(_) => TermType::Undefined,
        },
    }
}

/// Prefixes a bare temporal literal with its SQL literal keyword.
fn temporal_keyword(term: &Term, ty: TermType, rendered: String) -> String {
    if !matches!(term, Term::Date(_) | Term::Time(_) | Term::DateTime(_)) {
        return rendered;
    }
    let keyword = match ty {
        TermType::Date => "DATE",
        TermType::Time => "TIME",
        _ => "TIMESTAMP",
    };
    format!("{keyword} {rendered}")
}

#[derive(Debug, Default, PartialEq, Eq)]
struct DurationParts {
    years: u64,
    weeks: u64,
    days: u64,
    hours: u64,
    minutes: u64,
    seconds: u64,
}

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^P(?:(\d+)Y)?(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$")
            .unwrap()
    })
}

/// Parses an ISO-8601 duration into the unit model used for rendering.
/// Months are not part of the model and are rejected.
fn parse_iso_duration(value: &str) -> Option<DurationParts> {
    let caps = duration_re().captures(value)?;

    // "P" alone and a trailing "T" with no time components are not durations
    if caps.iter().skip(1).all(|c| c.is_none()) {
        return None;
    }
    if value.contains('T')
        && caps.get(4).is_none()
        && caps.get(5).is_none()
        && caps.get(6).is_none()
    {
        return None;
    }

    let component = |index: usize| match caps.get(index) {
        None => Some(0u64),
        Some(m) => m.as_str().parse().ok(),
    };
    Some(DurationParts {
        years: component(1)?,
        weeks: component(2)?,
        days: component(3)?,
        hours: component(4)?,
        minutes: component(5)?,
        seconds: component(6)?,
    })
}

/// One `INTERVAL '<n> <UNIT>'` per non-zero component, largest unit first.
fn render_intervals(parts: &DurationParts) -> String {
    let components = [
        (parts.years, "YEAR"),
        (parts.weeks, "WEEK"),
        (parts.days, "DAY"),
        (parts.hours, "HOUR"),
        (parts.minutes, "MINUTE"),
        (parts.seconds, "SECOND"),
    ];
    let intervals: Vec<String> = components
        .iter()
        .filter(|(n, _)| *n != 0)
        .map(|(n, unit)| {
            let plural = if *n == 1 { "" } else { "S" };
            format!("INTERVAL '{n} {unit}{plural}'")
        })
        .collect();
    if intervals.is_empty() {
        // zero-length duration, e.g. "PT0S"
        return "INTERVAL '0 SECONDS'".to_string();
    }
    intervals.join(" ")
}
