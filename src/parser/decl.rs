//! Declarations, the module header and import directives.

use crate::lexer::Token;

use super::ast::*;
use super::stat::parse_stat;
use super::types::{parse_ref, parse_type};
use super::{expect_node, ParseResult, ParseState};

fn parse_param(state: &mut ParseState) -> ParseResult<Param> {
    let name = state.expect_id()?;
    state.expect_op(":")?;
    let ref_mode = parse_ref(state);
    let ty = expect_node(parse_type(state)?, state, "type")?;
    Ok(Param {
        name: name.text,
        ref_mode,
        ty,
        object: None,
        position: name.position,
    })
}

fn parse_receiver(state: &mut ParseState) -> ParseResult<Option<Param>> {
    if !state.check_op("(") {
        return Ok(None);
    }
    let param = parse_param(state)?;
    state.expect_op(")")?;
    Ok(Some(param))
}

pub(crate) fn parse_func_params(state: &mut ParseState) -> ParseResult<Vec<Param>> {
    state.push_context("in parameter list");
    state.expect_op("(")?;
    let mut params = vec![];
    if !state.check_op(")") {
        loop {
            params.push(parse_param(state)?);
            if state.expect_either_op(")", ",")? == ")" {
                break;
            }
        }
    }
    state.pop_context();
    Ok(params)
}

pub(crate) fn parse_func_ret(state: &mut ParseState) -> ParseResult<Option<TypeName>> {
    if !state.check_op("->") {
        return Ok(None);
    }
    state.push_context("after ->");
    let ret = expect_node(parse_type(state)?, state, "type")?;
    state.pop_context();
    Ok(Some(ret))
}

fn parse_func_body(state: &mut ParseState) -> ParseResult<Block<()>> {
    let position = state.loc();
    state.expect_op("{")?;
    let mut stats = vec![];
    while let Some(stat) = parse_stat(state)? {
        stats.push(stat);
    }
    state.expect_op("}")?;
    Ok(Block { stats, position })
}

fn parse_func(state: &mut ParseState, external: bool) -> ParseResult<Option<Declaration<()>>> {
    if !state.check_keyword("func") {
        return Ok(None);
    }
    let position = state.last_loc();
    state.push_context("in function");
    let receiver = parse_receiver(state)?;
    let name = state.expect_id()?;
    let params = parse_func_params(state)?;
    let ret = parse_func_ret(state)?;
    let body = parse_func_body(state)?;
    state.pop_context();
    Ok(Some(Declaration::Func(FuncDecl {
        receiver,
        name: name.text,
        params,
        ret,
        body,
        external,
        symbol: None,
        position,
    })))
}

/// `var name [: type] [= expr];` or `let name [: type] = expr;`. Used both
/// at module scope and as a statement.
pub(crate) fn parse_var_decl(
    state: &mut ParseState,
    external: bool,
) -> ParseResult<Option<VarDecl<()>>> {
    let mutable = if state.check_keyword("var") {
        true
    } else if state.check_keyword("let") {
        false
    } else {
        return Ok(None);
    };
    let position = state.last_loc();
    state.push_context(if mutable { "in var declaration" } else { "in let declaration" });
    let name = state.expect_id()?;
    let ty = if state.check_op(":") {
        state.push_context("after :");
        let ty = expect_node(parse_type(state)?, state, "type")?;
        state.pop_context();
        Some(ty)
    } else {
        None
    };
    let expr = if mutable {
        if state.check_op("=") {
            Some(expect_node(super::expr::parse_expr(state)?, state, "expression")?)
        } else {
            None
        }
    } else {
        state.expect_op("=")?;
        Some(expect_node(super::expr::parse_expr(state)?, state, "expression")?)
    };
    state.expect_op(";")?;
    state.pop_context();
    Ok(Some(VarDecl {
        mutable,
        name: name.text,
        ty,
        expr,
        external,
        object: None,
        resolved_ty: None,
        position,
    }))
}

/// `type A = T;` declares a weak alias, `type A T;` a strong one.
pub(crate) fn parse_type_alias(state: &mut ParseState) -> ParseResult<Option<TypeAliasDecl>> {
    if !state.check_keyword("type") {
        return Ok(None);
    }
    let position = state.last_loc();
    state.push_context("in type declaration");
    let name = state.expect_id()?;
    let strong = !state.check_op("=");
    let ty = expect_node(parse_type(state)?, state, "type")?;
    state.expect_op(";")?;
    state.pop_context();
    Ok(Some(TypeAliasDecl {
        name: name.text,
        ty,
        strong,
        position,
    }))
}

fn parse_decl(state: &mut ParseState, external: bool) -> ParseResult<Option<Declaration<()>>> {
    if let Some(decl) = parse_func(state, external)? {
        return Ok(Some(decl));
    }
    if let Some(mut var) = parse_var_decl(state, external)? {
        var.external = external;
        return Ok(Some(Declaration::Var(var)));
    }
    if let Some(alias) = parse_type_alias(state)? {
        if external {
            return Err(state.error("Type aliases cannot be extern"));
        }
        return Ok(Some(Declaration::Type(alias)));
    }
    Ok(None)
}

pub(crate) fn parse_module(tokens: &[Token], source: &str) -> ParseResult<Module<()>> {
    let mut state = ParseState::new(tokens, source);

    let (name, name_position) = if state.check_keyword("module") {
        let name = state.expect_id()?;
        state.expect_op(";")?;
        state.extra_semi();
        (name.text, name.position)
    } else {
        ("main".to_string(), state.loc())
    };

    let mut imports = vec![];
    let mut decls = vec![];
    while !state.empty() {
        if state.check_keyword("import") {
            let import = state.expect_id()?;
            state.expect_op(";")?;
            state.extra_semi();
            imports.push((import.text, import.position));
            continue;
        }
        let external = state.check_keyword("extern");
        match parse_decl(&mut state, external)? {
            Some(decl) => {
                decls.push(decl);
                state.extra_semi();
            }
            None => {
                let front = state
                    .front()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "end of input".to_string());
                return Err(state.error(format!("Unexpected {front} in global scope")));
            }
        }
    }

    Ok(Module {
        name,
        name_position,
        imports,
        decls,
    })
}

#[cfg(test)]
mod tests {
    use super::super::tests::parse_source;

    use super::*;


    #[test]
    fn test_func_with_receiver() {
        let module = parse_source(
            "extern func (self: ref IntStack) push(value: sint) { push_back(self, value); }",
        )
        .expect("parse failed");
        let Declaration::Func(func) = &module.decls[0] else {
            panic!("expected function");
        };
        assert!(func.external);
        let receiver = func.receiver.as_ref().expect("expected receiver");
        assert_eq!(receiver.name, "self");
        assert_eq!(receiver.ref_mode, ParamRef::Ref);
        assert_eq!(func.params.len(), 1);
        assert!(func.ret.is_none());
    }

    #[test]
    fn test_globals() {
        let module = parse_source(
            "extern var number = 0;\n\
             extern let origin = make Vec3 {0.0, 0.0, 0.0};\n\
             let nesting = make sint make real make uint {};",
        )
        .expect("parse failed");
        assert_eq!(module.decls.len(), 3);
        assert!(matches!(
            &module.decls[0],
            Declaration::Var(VarDecl { mutable: true, external: true, .. })
        ));
        assert!(matches!(
            &module.decls[1],
            Declaration::Var(VarDecl { mutable: false, external: true, .. })
        ));
    }

    #[test]
    fn test_type_aliases() {
        let module = parse_source(
            "type Rational = struct { n: sint; d: sint; };\n\
             type IntStack [sint];",
        )
        .expect("parse failed");
        assert!(matches!(
            &module.decls[0],
            Declaration::Type(TypeAliasDecl { strong: false, .. })
        ));
        assert!(matches!(
            &module.decls[1],
            Declaration::Type(TypeAliasDecl { strong: true, .. })
        ));
    }

    #[test]
    fn test_missing_function_body() {
        assert!(parse_source("func f()").is_err());
    }
}
