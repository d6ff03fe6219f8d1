// src/fragment/ast.rs

/// Parsed form of a namespace key, consumed by [`super::compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentAst {
    /// Literal text.
    Text(String),
    /// Glob text containing `*` wildcards and/or `{a,b}` brace groups.
    Glob(String),
    /// Raw regular expression.
    Regex(String),
    /// `&name`: a named definition, used as-is.
    Reference(String),
    /// `:name`: a definition rebound to `name`, or a single-segment capture.
    Label(String),
    /// `:name(glob)`
    CaptureGlob { name: String, inner: Box<FragmentAst> },
    /// ``:name`regex` ``
    CaptureRegex { name: String, inner: Box<FragmentAst> },
    /// Several parts matched back to back.
    Pattern(Vec<FragmentAst>),
}
