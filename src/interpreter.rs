use std::fmt;

use crate::parser::{self, Grammar};
use crate::translate;

/// Implemented by any interpreter that can parse a filter language and hand
///  the resulting grammar to a code generator.
pub trait Interpreter {
    /// Parses the expressions in [source] and returns the resulting grammar.
    fn parse(&self, source: &str) -> Result<Grammar, parser::Error>;

    /// Lets [generator] access the functionality provided by this
    ///  interpreter: the generator invokes the interpreter to parse [source]
    ///  and get back the grammar, which is then used to produce the native
    ///  query into [sink].
    fn accept(
        &self,
        generator: &mut dyn CodeGenerator,
        source: &str,
        sink: &mut dyn fmt::Write,
    ) -> Result<(), translate::Error>
    where
        Self: Sized,
    {
        generator.visit(self, source, sink)
    }
}

/// Implemented by any code generator that produces native queries from
///  expressions written in a language supported by a given interpreter.
///
/// The contract is pull-based: `visit` calls back into
///  [Interpreter::parse], walks the grammar, and writes the rendered query
///  into the sink. On failure the sink may hold a partial rendering; callers
///  must discard it.
pub trait CodeGenerator {
    fn visit(
        &mut self,
        interpreter: &dyn Interpreter,
        source: &str,
        sink: &mut dyn fmt::Write,
    ) -> Result<(), translate::Error>;
}

/// The Espresso++ interpreter.
#[derive(Debug, Default, Clone, Copy)]
pub struct Espressopp;

impl Espressopp {
    pub fn new() -> Self {
        Self
    }
}

impl Interpreter for Espressopp {
    fn parse(&self, source: &str) -> Result<Grammar, parser::Error> {
        parser::parse(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A generator that records what it was handed, to check that `accept`
    ///  delegates untouched.
    struct Recorder {
        seen: Option<(String, usize)>,
    }

    impl CodeGenerator for Recorder {
        fn visit(
            &mut self,
            interpreter: &dyn Interpreter,
            source: &str,
            sink: &mut dyn fmt::Write,
        ) -> Result<(), translate::Error> {
            let grammar = interpreter
                .parse(source)
                .map_err(|cause| translate::Error::Syntax {
                    expression: source.to_string(),
                    cause,
                })?;
            self.seen = Some((source.to_string(), grammar.expressions().len()));
            sink.write_str("ok").map_err(|_| translate::Error::Generate {
                expression: source.to_string(),
                cause: translate::RenderError::Sink(fmt::Error),
            })
        }
    }

    #[test]
    fn accept_delegates_to_the_generator() {
        let interpreter = Espressopp::new();
        let mut generator = Recorder { seen: None };
        let mut sink = String::new();

        interpreter
            .accept(&mut generator, "a eq 1 and b eq 2", &mut sink)
            .unwrap();
        assert_eq!(sink, "ok");
        assert_eq!(generator.seen, Some(("a eq 1 and b eq 2".to_string(), 3)));
    }

    #[test]
    fn accept_surfaces_parse_failures() {
        let interpreter = Espressopp::new();
        let mut generator = Recorder { seen: None };
        let mut sink = String::new();

        let err = interpreter
            .accept(&mut generator, "a eq", &mut sink)
            .unwrap_err();
        assert!(matches!(err, translate::Error::Syntax { .. }));
    }
}
