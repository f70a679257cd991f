//! STELA: an ahead-of-time compiler and JIT for a small statically typed
//! imperative language with value semantics, reference-counted heap
//! containers and first-class closures.
//!
//! The pipeline runs strictly forward:
//!
//! ```text
//! source → tokenize → parse → create_symbols → generate_ir → jit
//! ```
//!
//! Each stage is usable on its own; [`compile`] chains them. Diagnostics
//! flow through a [`diagnostics::DiagSink`], fatal errors additionally
//! propagate as [`Error`] values so the driver short-circuits on the first
//! failure.

pub mod codegen;
pub mod diagnostics;
pub mod lexer;
pub mod linker;
pub mod modules;
pub mod parser;
pub mod semantic;

pub use linker::{Engine, GenError};

use diagnostics::{report, Category, DiagSink, Severity};
use inkwell::context::Context;
use lexer::Token;
use parser::ast;
use semantic::{BuiltinEnv, Symbols};

#[derive(Debug)]
pub enum Error {
    Lex(lexer::LexError),
    Parse(parser::ParseError),
    Module(modules::ModuleError),
    Semantic(semantic::SemanticError),
    Gen(GenError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Lex(err) => err.fmt(f),
            Error::Parse(err) => err.fmt(f),
            Error::Module(err) => err.fmt(f),
            Error::Semantic(err) => err.fmt(f),
            Error::Gen(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

impl From<lexer::LexError> for Error {
    fn from(err: lexer::LexError) -> Error {
        Error::Lex(err)
    }
}

impl From<parser::ParseError> for Error {
    fn from(err: parser::ParseError) -> Error {
        Error::Parse(err)
    }
}

impl From<modules::ModuleError> for Error {
    fn from(err: modules::ModuleError) -> Error {
        Error::Module(err)
    }
}

impl From<semantic::SemanticError> for Error {
    fn from(err: semantic::SemanticError) -> Error {
        Error::Semantic(err)
    }
}

impl From<GenError> for Error {
    fn from(err: GenError) -> Error {
        Error::Gen(err)
    }
}

/// Characters to tokens.
pub fn tokenize(source: &str, sink: &mut dyn DiagSink) -> Result<Vec<Token>, Error> {
    lexer::Lexer::new(source).lex().map_err(|err| {
        report(
            sink,
            Severity::Fatal,
            Category::Lexical,
            None,
            Some(err.span()),
            err.to_string(),
        );
        err.into()
    })
}

/// Tokens to one module's AST. The first parse error terminates parsing of
/// the module.
pub fn parse(
    tokens: &[Token],
    source: &str,
    sink: &mut dyn DiagSink,
) -> Result<ast::Module<()>, Error> {
    report(
        sink,
        Severity::Verbose,
        Category::Syntax,
        None,
        None,
        format!("Parsing {} tokens", tokens.len()),
    );
    match parser::parse_module(tokens, source) {
        Ok(module) => {
            report(
                sink,
                Severity::Status,
                Category::Syntax,
                Some(&module.name),
                None,
                format!("Parsed module \"{}\"", module.name),
            );
            Ok(module)
        }
        Err(err) => {
            report(
                sink,
                Severity::Fatal,
                Category::Syntax,
                None,
                Some(err.span()),
                err.to_string(),
            );
            Err(err.into())
        }
    }
}

/// Orders the modules by imports and runs semantic analysis over them.
pub fn create_symbols(
    modules: Vec<ast::Module<()>>,
    sink: &mut dyn DiagSink,
) -> Result<Symbols, Error> {
    create_symbols_with(modules, &BuiltinEnv::default(), sink)
}

/// [`create_symbols`] with host-registered user types.
pub fn create_symbols_with(
    parsed: Vec<ast::Module<()>>,
    env: &BuiltinEnv,
    sink: &mut dyn DiagSink,
) -> Result<Symbols, Error> {
    let order = modules::module_order(&parsed).map_err(|err| {
        report(
            sink,
            Severity::Fatal,
            Category::Semantic,
            Some(err.module()),
            Some(err.span()),
            err.to_string(),
        );
        Error::from(err)
    })?;

    let mut slots: Vec<Option<ast::Module<()>>> = parsed.into_iter().map(Some).collect();
    let ordered: Vec<ast::Module<()>> = order
        .iter()
        .map(|&index| slots[index].take().expect("module ordered twice"))
        .collect();

    semantic::analyze(ordered, env, sink).map_err(|err| {
        report(
            sink,
            Severity::Fatal,
            Category::Semantic,
            None,
            Some(err.span()),
            err.message(),
        );
        err.into()
    })
}

/// Lowers the analyzed modules to LLVM IR in a fresh backend module.
pub fn generate_ir<'ctx>(
    context: &'ctx Context,
    symbols: &Symbols,
    sink: &mut dyn DiagSink,
) -> Result<inkwell::module::Module<'ctx>, Error> {
    report(
        sink,
        Severity::Status,
        Category::Generate,
        None,
        None,
        "Generating code",
    );
    let cg = codegen::CodegenContext::new(context);
    codegen::decl::generate(&cg, symbols);
    Ok(cg.module)
}

/// Verifies the module, materializes executable code and runs the static
/// constructors. The returned [`Engine`] exposes `address_of`.
pub fn jit<'ctx>(
    module: inkwell::module::Module<'ctx>,
    sink: &mut dyn DiagSink,
) -> Result<Engine<'ctx>, Error> {
    linker::link(module).map_err(|err| {
        report(
            sink,
            Severity::Fatal,
            Category::Generate,
            None,
            None,
            err.to_string(),
        );
        err.into()
    })
}

/// The whole pipeline over a set of sources. A source without a
/// `module NAME;` header is the `main` module.
pub fn compile<'ctx>(
    context: &'ctx Context,
    sources: &[&str],
    sink: &mut dyn DiagSink,
) -> Result<Engine<'ctx>, Error> {
    let mut parsed = vec![];
    for source in sources {
        let tokens = tokenize(source, sink)?;
        parsed.push(parse(&tokens, source, sink)?);
    }
    let symbols = create_symbols(parsed, sink)?;
    let module = generate_ir(context, &symbols, sink)?;
    jit(module, sink)
}
