//! Primitives for parsing Espresso++ filter expressions and converting them
//! into native queries.
//!
//! Espresso++ is a small, database-agnostic filter language that application
//! backends can expose to external callers instead of raw query text. The
//! pipeline is lexer → parser → grammar, with a pluggable
//! [CodeGenerator](interpreter::CodeGenerator) walking the grammar to emit a
//! native query; [SqlCodeGenerator](translate::sql::SqlCodeGenerator) is the
//! SQL back-end.
//!
//! ```
//! use espressopp::interpreter::{Espressopp, Interpreter};
//! use espressopp::translate::sql::SqlCodeGenerator;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let interpreter = Espressopp::new();
//! let mut generator = SqlCodeGenerator::new();
//! generator.rendering_options.enable_named_params();
//!
//! let mut sql = String::new();
//! interpreter.accept(&mut generator, "age gte 30", &mut sql)?;
//!
//! assert_eq!(sql, "age >= :P1");
//! let params = generator.rendering_options.get_named_param_values()?;
//! assert_eq!(params.get("P1"), Some(&"30".to_string()));
//! # Ok(())
//! # }
//! ```

pub mod interpreter;
pub mod lex;
pub mod options;
pub mod parser;
pub mod translate;
