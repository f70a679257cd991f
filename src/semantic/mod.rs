//! Semantic analysis: scope and name resolution across modules, type
//! lookup with strong and weak aliases, overload resolution with implicit
//! receivers, closure capture analysis and expression typing.
//!
//! The analyzer consumes the parser's `Module<()>` trees and rebuilds them
//! as `Module<TypeInfo>`: every expression ends up annotated with its
//! resolved [`ExprType`], identifiers and calls with their definitions, and
//! lambdas with their capture lists. Code generation reads those
//! annotations and never resolves a name again.

mod builtins;
mod error;
mod expr;
mod scope;
mod stat;
mod symbols;
mod types;

pub use builtins::BuiltinEnv;
pub use error::{SemResult, SemanticError};
pub use symbols::{
    BuiltinFunc, CallTarget, Capture, Definition, ObjectId, SymbolKind, SymbolRef,
};
pub use types::{Binding, ExprType, Field, Mutability, Type, UserType, USER_OP_NONE, USER_OP_TRIVIAL};

pub(crate) use expr::etype;
pub(crate) use symbols::FuncSymbol;

use crate::diagnostics::DiagSink;
use crate::parser::ast::{Declaration, Module, TypeName};

use scope::{find_symbol, Scope, ScopeKind, ScopeManager, ScopeRef};

/// Annotation attached to every expression by the analyzer.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub etype: ExprType,
}

/// The result of semantic analysis: all modules, typed, in dependency
/// order.
pub struct Symbols {
    pub modules: Vec<Module<TypeInfo>>,
}

#[derive(Default)]
pub(crate) struct Counters {
    object: usize,
    lambda: usize,
}

pub(crate) struct Ctx<'a> {
    pub scopes: ScopeManager,
    pub sink: &'a mut dyn DiagSink,
    pub module: String,
    pub counters: &'a mut Counters,
    /// Stack of enclosing function return types; lambdas push their own.
    pub ret_types: Vec<Type>,
}

impl Ctx<'_> {
    pub fn fresh_object(&mut self) -> ObjectId {
        let id = ObjectId(self.counters.object);
        self.counters.object += 1;
        id
    }

    pub fn fresh_lambda(&mut self) -> usize {
        let id = self.counters.lambda;
        self.counters.lambda += 1;
        id
    }
}

/// Resolves a parsed type to its semantic form. Weak aliases vanish here;
/// strong aliases were wrapped when their declaration was inserted.
pub(crate) fn resolve_type(ctx: &mut Ctx, name: &TypeName) -> SemResult<Type> {
    match name {
        TypeName::Named { name, position } => {
            let Some((symbol, _)) = find_symbol(&ctx.scopes.cur(), name, position)? else {
                return Err(SemanticError::UndefinedType {
                    name: name.clone(),
                    position: position.clone(),
                });
            };
            let mut borrowed = symbol.borrow_mut();
            borrowed.referenced = true;
            match &borrowed.kind {
                SymbolKind::TypeAlias(alias) => Ok(alias.ty.clone()),
                _ => Err(SemanticError::NotAType {
                    name: name.clone(),
                    position: position.clone(),
                }),
            }
        }
        TypeName::Array { elem, .. } => Ok(Type::Array(Box::new(resolve_type(ctx, elem)?))),
        TypeName::Func { params, ret, .. } => {
            let mut resolved = vec![];
            for (mode, ty) in params {
                resolved.push((*mode, resolve_type(ctx, ty)?));
            }
            let ret = match ret {
                Some(ty) => resolve_type(ctx, ty)?,
                None => Type::Void,
            };
            Ok(Type::Func {
                params: resolved,
                ret: Box::new(ret),
            })
        }
        TypeName::Struct { fields, .. } => {
            let mut resolved: Vec<Field> = vec![];
            for field in fields {
                if resolved.iter().any(|f| f.name == field.name) {
                    return Err(SemanticError::DuplicateField {
                        name: field.name.clone(),
                        position: field.position.clone(),
                    });
                }
                resolved.push(Field {
                    name: field.name.clone(),
                    ty: resolve_type(ctx, &field.ty)?,
                });
            }
            Ok(Type::Struct { fields: resolved })
        }
    }
}

/// Analyzes modules that are already in dependency order (see
/// [`crate::modules::module_order`]).
pub fn analyze(
    modules: Vec<Module<()>>,
    env: &BuiltinEnv,
    sink: &mut dyn DiagSink,
) -> SemResult<Symbols> {
    let builtin_scope = builtins::make_builtin_scope(env);
    let mut counters = Counters::default();
    let mut module_scopes: std::collections::HashMap<String, ScopeRef> = Default::default();
    let mut typed = vec![];

    for module in modules {
        let ns = Scope::new(ScopeKind::Ns, &module.name, Some(builtin_scope.clone()));
        ns.borrow_mut().imports = module
            .imports()
            .filter_map(|name| module_scopes.get(name).cloned())
            .collect();

        let mut ctx = Ctx {
            scopes: ScopeManager::new(ns.clone()),
            sink: &mut *sink,
            module: module.name.clone(),
            counters: &mut counters,
            ret_types: vec![],
        };
        let checked = check_module(&mut ctx, module)?;
        stat::warn_unused_locals(&mut ctx);
        module_scopes.insert(checked.name.clone(), ns);
        typed.push(checked);
    }

    Ok(Symbols { modules: typed })
}

fn check_module(ctx: &mut Ctx, module: Module<()>) -> SemResult<Module<TypeInfo>> {
    let Module {
        name,
        name_position,
        imports,
        decls,
    } = module;

    let func_symbols = stat::shallow_check(ctx, &decls)?;

    let mut checked = vec![];
    for (decl, symbol) in decls.into_iter().zip(func_symbols) {
        match decl {
            Declaration::Func(func) => {
                let symbol = symbol.expect("function signature missing after shallow pass");
                checked.push(Declaration::Func(stat::check_func(ctx, func, symbol)?));
            }
            Declaration::Var(var) => {
                checked.push(Declaration::Var(stat::check_var_decl(ctx, var)?));
            }
            Declaration::Type(alias) => checked.push(Declaration::Type(alias)),
        }
    }

    Ok(Module {
        name,
        name_position,
        imports,
        decls: checked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::BufferSink;
    use crate::lexer::Lexer;

    fn analyze_source(source: &str) -> SemResult<Symbols> {
        let mut sink = BufferSink::new();
        analyze_sources(&[source], &mut sink)
    }

    fn analyze_sources(sources: &[&str], sink: &mut BufferSink) -> SemResult<Symbols> {
        let mut modules = vec![];
        for source in sources {
            let tokens = Lexer::new(source).lex().expect("lexing failed");
            modules.push(crate::parser::parse_module(&tokens, source).expect("parsing failed"));
        }
        let order = crate::modules::module_order(&modules).expect("ordering failed");
        let ordered = {
            let mut by_index: Vec<Option<Module<()>>> = modules.into_iter().map(Some).collect();
            order
                .iter()
                .map(|&i| by_index[i].take().expect("module visited twice"))
                .collect::<Vec<_>>()
        };
        analyze(ordered, &BuiltinEnv::default(), sink)
    }

    #[test]
    fn test_simple_function() {
        let symbols = analyze_source(
            "extern func f(a: uint, b: uint) -> uint {\n\
                var p = 0u;\n\
                for (; a != 0u; a = a - 1u) p = p + b;\n\
                return p;\n\
             }",
        )
        .expect("analysis failed");
        assert_eq!(symbols.modules.len(), 1);
    }

    #[test]
    fn test_redefinition_reported_at_second_decl() {
        let err = analyze_source("func f() {} func f() {}").unwrap_err();
        let SemanticError::Redefinition { name, position, .. } = err else {
            panic!("expected redefinition error");
        };
        assert_eq!(name, "f");
        // the second declaration starts on the same line after the first
        assert_eq!(position.start.0, 0);
        assert!(position.start.1 > 0);
    }

    #[test]
    fn test_overloads_by_alias_are_redefinitions() {
        // a weak alias does not make a distinct overload
        let err = analyze_source(
            "type Number = sint;\n\
             func f(i: Number) {}\n\
             func f(i: sint) {}",
        )
        .unwrap_err();
        assert!(matches!(err, SemanticError::Redefinition { .. }));
    }

    #[test]
    fn test_strong_alias_makes_distinct_overload() {
        analyze_source(
            "type Number sint;\n\
             func f(i: Number) {}\n\
             func f(i: sint) {}",
        )
        .expect("strong alias should allow overloading");
    }

    #[test]
    fn test_undefined_symbol() {
        let err = analyze_source("func f() -> sint { return missing; }").unwrap_err();
        assert!(matches!(err, SemanticError::UndefinedSymbol { name, .. } if name == "missing"));
    }

    #[test]
    fn test_missing_return() {
        let err = analyze_source("func f(b: bool) -> sint { if (b) { return 1; } }").unwrap_err();
        assert!(matches!(err, SemanticError::MissingReturn { .. }));
    }

    #[test]
    fn test_switch_always_returns_satisfies_return_check() {
        analyze_source(
            "extern func test(v: sint) -> real {\n\
                switch (v) {\n\
                  case (0) { return 0.0; }\n\
                  case (1) { return 1.0; }\n\
                  default { return 3.0; }\n\
                }\n\
             }",
        )
        .expect("switch returning on every path should satisfy the return check");
    }

    #[test]
    fn test_case_must_terminate() {
        let err = analyze_source(
            "func f(v: sint) {\n\
                switch (v) { case (0) { v2 := 1; } }\n\
             }",
        )
        .unwrap_err();
        assert!(matches!(err, SemanticError::CaseNotTerminated { .. }));
    }

    #[test]
    fn test_break_outside_loop() {
        let err = analyze_source("func f() { break; }").unwrap_err();
        assert!(matches!(err, SemanticError::BreakOutsideFlow { .. }));
    }

    #[test]
    fn test_immutable_assign() {
        let err = analyze_source("func f() { let x = 1; x = 2; }").unwrap_err();
        assert!(matches!(err, SemanticError::ImmutableAssign { .. }));
    }

    #[test]
    fn test_receiver_call() {
        analyze_source(
            "type IntStack [sint];\n\
             func (self: IntStack) empty() -> bool { return size(self) == 0u; }\n\
             func use(stack: IntStack) -> bool { return stack.empty(); }",
        )
        .expect("receiver call failed");
    }

    #[test]
    fn test_receiver_field_collision() {
        let err = analyze_source(
            "type Pair = struct { first: sint; second: sint; };\n\
             func (self: Pair) first() -> sint { return 0; }",
        )
        .unwrap_err();
        assert!(matches!(err, SemanticError::CollidingFieldFunc { .. }));
    }

    #[test]
    fn test_capture_analysis() {
        let symbols = analyze_source(
            "func adder(x: sint) -> func(sint) -> sint {\n\
                return func(y: sint) -> sint { return x + y; };\n\
             }",
        )
        .expect("analysis failed");
        let module = &symbols.modules[0];
        let Declaration::Func(func) = &module.decls[0] else {
            panic!("expected function");
        };
        let lambda = find_lambda(&func.body).expect("lambda not found");
        assert_eq!(lambda.captures.len(), 1);
        assert_eq!(lambda.captures[0].parent_index, None);
        assert_eq!(lambda.captures[0].ty, Type::Sint);
    }

    #[test]
    fn test_transitive_capture() {
        let symbols = analyze_source(
            "func outer(x: sint) -> func() -> func() -> sint {\n\
                return func() -> func() -> sint {\n\
                    return func() -> sint { return x; };\n\
                };\n\
             }",
        )
        .expect("analysis failed");
        let module = &symbols.modules[0];
        let Declaration::Func(func) = &module.decls[0] else {
            panic!("expected function");
        };
        let outer_lambda = find_lambda(&func.body).expect("outer lambda not found");
        assert_eq!(outer_lambda.captures.len(), 1);
        assert_eq!(outer_lambda.captures[0].parent_index, None);

        let inner_lambda = find_lambda(&outer_lambda.body).expect("inner lambda not found");
        assert_eq!(inner_lambda.captures.len(), 1);
        // the inner capture aliases slot 0 of the outer closure
        assert_eq!(inner_lambda.captures[0].parent_index, Some(0));
    }

    #[test]
    fn test_globals_not_captured() {
        let symbols = analyze_source(
            "var counter = 0;\n\
             func bump() -> func() { return func() { counter = counter + 1; }; }",
        )
        .expect("analysis failed");
        let Declaration::Func(func) = &symbols.modules[0].decls[1] else {
            panic!("expected function");
        };
        let lambda = find_lambda(&func.body).expect("lambda not found");
        assert!(lambda.captures.is_empty());
    }

    #[test]
    fn test_import_resolution() {
        let mut sink = BufferSink::new();
        analyze_sources(
            &[
                "module util; extern func helper() -> sint { return 3; }",
                "module main; import util; func use() -> sint { return helper(); }",
            ],
            &mut sink,
        )
        .expect("cross-module call failed");
    }

    #[test]
    fn test_unused_symbol_warning() {
        let mut sink = BufferSink::new();
        analyze_sources(&["func f() { let unused = 1; }"], &mut sink)
            .expect("analysis failed");
        assert!(sink
            .warnings()
            .any(|d| d.message.contains("Unused symbol \"unused\"")));
    }

    #[test]
    fn test_cannot_address_extern() {
        let err = analyze_source(
            "extern func ext() {}\n\
             let f = ext;",
        )
        .unwrap_err();
        assert!(matches!(err, SemanticError::CannotAddressExtern { .. }));
    }

    #[test]
    fn test_builtin_must_be_called() {
        let err = analyze_source("let s = size;").unwrap_err();
        assert!(matches!(err, SemanticError::MustCallBuiltin { .. }));
    }

    #[test]
    fn test_duplicate_struct_field() {
        let err = analyze_source("type Bad = struct { x: sint; x: real; };").unwrap_err();
        assert!(matches!(err, SemanticError::DuplicateField { name, .. } if name == "x"));
    }

    fn find_lambda<T>(
        block: &crate::parser::ast::Block<T>,
    ) -> Option<&crate::parser::ast::Lambda<T>> {
        use crate::parser::ast::{Expression, Literal, Statement};
        for stat in &block.stats {
            if let Statement::Return(ret) = stat {
                if let Some(Expression::Literal(Literal::Lambda(lambda))) = &ret.expr {
                    return Some(lambda);
                }
            }
        }
        None
    }
}
