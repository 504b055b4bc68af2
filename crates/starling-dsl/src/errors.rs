use miette::Diagnostic;
use thiserror::Error;

use crate::ast::Span;

/// A parse failure: a single diagnostic carrying the file position.
#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("Syntax error: {message}")]
    #[diagnostic(code(starling::parse::syntax))]
    Syntax {
        message: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Unknown atomic primitive '{name}'")]
    #[diagnostic(
        code(starling::parse::unknown_primitive),
        help("atomic calls are limited to assume(..) and %{{symbol}}(..)")
    )]
    UnknownPrimitive {
        name: String,
        #[label("not a primitive")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },
}

impl ParseError {
    pub fn syntax(message: impl Into<String>, span: Span, source: &str, filename: &str) -> Self {
        ParseError::Syntax {
            message: message.into(),
            span: (span.start, span.end - span.start).into(),
            src: miette::NamedSource::new(filename, source.to_owned()),
        }
    }

    pub fn unknown_primitive(name: impl Into<String>, span: Span) -> Self {
        ParseError::UnknownPrimitive {
            name: name.into(),
            span: (span.start, span.end - span.start).into(),
            src: miette::NamedSource::new("", String::new()),
        }
    }

    /// Attach the source text and filename so miette can render highlighted
    /// snippets. Variants built during pair-walking carry raw offsets only.
    pub fn with_source_context(self, source: &str, filename: &str) -> Self {
        match self {
            ParseError::Syntax { message, span, .. } => ParseError::Syntax {
                message,
                span,
                src: miette::NamedSource::new(filename, source.to_owned()),
            },
            ParseError::UnknownPrimitive { name, span, .. } => ParseError::UnknownPrimitive {
                name,
                span,
                src: miette::NamedSource::new(filename, source.to_owned()),
            },
        }
    }
}
