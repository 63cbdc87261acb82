//! The assembly reader: a hand-rolled lexer and recursive-descent
//! parser building through the IR API.
//!
//! The reader is tolerant: on a parse error it reports a diagnostic and
//! skips ahead to the next top-level keyword, so one invocation can
//! surface many errors. If any error was reported the partially built
//! module is discarded and [`read_module`] returns the error count.

mod lexer;
mod parser;

pub use lexer::{Lexer, Token, TokenKind};

use crate::{Context, DiagnosticSink, Module};

/// Summary error of a failed [`read_module`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("assembly contained {errors} error(s)")]
pub struct ReadError {
    /// Number of error diagnostics reported to the sink.
    pub errors: usize,
}

/// Parse a module from its textual assembly form. Diagnostics are
/// reported to `sink`; on any error the partial module is discarded.
pub fn read_module(
    source: &str,
    ctx: &mut Context,
    sink: &mut dyn DiagnosticSink,
) -> Result<Module, ReadError> {
    let tokens = Lexer::new(source).run(sink);
    let mut parser = parser::Parser::new(tokens, ctx, sink);
    let module = parser.parse_module();
    tracing::debug!(
        module = module.name(),
        units = module.units().count(),
        errors = parser.errors,
        "parsed assembly"
    );
    if parser.errors > 0 {
        Err(ReadError {
            errors: parser.errors,
        })
    } else {
        Ok(module)
    }
}
