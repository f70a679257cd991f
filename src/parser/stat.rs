//! Statement and assignment sub-grammar.

use crate::lexer::Span;

use super::ast::*;
use super::decl::{parse_type_alias, parse_var_decl};
use super::expr::parse_expr;
use super::{expect_node, ParseResult, ParseState};

pub(crate) fn parse_block(state: &mut ParseState) -> ParseResult<Option<Statement<()>>> {
    if !state.check_op("{") {
        return Ok(None);
    }
    let position = state.last_loc();
    let mut stats = vec![];
    while let Some(stat) = parse_stat(state)? {
        stats.push(stat);
    }
    state.expect_op("}")?;
    Ok(Some(Statement::Block(Block { stats, position })))
}

fn parse_if(state: &mut ParseState) -> ParseResult<Option<Statement<()>>> {
    if !state.check_keyword("if") {
        return Ok(None);
    }
    let position = state.last_loc();
    state.push_context("in if statement");
    state.expect_op("(")?;
    let cond = expect_node(parse_expr(state)?, state, "condition expression")?;
    state.expect_op(")")?;
    let body = expect_node(parse_stat(state)?, state, "statement or block")?;
    let else_body = if state.check_keyword("else") {
        Some(Box::new(expect_node(parse_stat(state)?, state, "statement or block")?))
    } else {
        None
    };
    state.pop_context();
    Ok(Some(Statement::If(If {
        cond,
        body: Box::new(body),
        else_body,
        position,
    })))
}

fn parse_switch(state: &mut ParseState) -> ParseResult<Option<Statement<()>>> {
    if !state.check_keyword("switch") {
        return Ok(None);
    }
    let position = state.last_loc();
    state.push_context("in switch statement");
    state.expect_op("(")?;
    let expr = expect_node(parse_expr(state)?, state, "expression")?;
    state.expect_op(")")?;
    state.expect_op("{")?;
    let mut cases = vec![];
    while !state.check_op("}") {
        if state.check_keyword("case") {
            let case_position = state.last_loc();
            state.expect_op("(")?;
            let case_expr = expect_node(parse_expr(state)?, state, "case expression")?;
            state.expect_op(")")?;
            let body = expect_node(parse_stat(state)?, state, "statement or block")?;
            cases.push(SwitchCase {
                expr: Some(case_expr),
                body: Box::new(body),
                position: case_position,
            });
        } else if state.check_keyword("default") {
            let case_position = state.last_loc();
            let body = expect_node(parse_stat(state)?, state, "statement or block")?;
            cases.push(SwitchCase {
                expr: None,
                body: Box::new(body),
                position: case_position,
            });
        } else {
            return Err(state.error(format!(
                "Expected case label but found {}",
                state
                    .front()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "end of input".to_string())
            )));
        }
    }
    state.pop_context();
    Ok(Some(Statement::Switch(Switch {
        expr,
        cases,
        always_returns: false,
        position,
    })))
}

fn parse_return(state: &mut ParseState) -> ParseResult<Option<Statement<()>>> {
    if !state.check_keyword("return") {
        return Ok(None);
    }
    let position = state.last_loc();
    if state.check_op(";") {
        return Ok(Some(Statement::Return(Return {
            expr: None,
            position,
        })));
    }
    state.push_context("in return statement");
    let expr = expect_node(parse_expr(state)?, state, "expression or ;")?;
    state.expect_op(";")?;
    state.pop_context();
    Ok(Some(Statement::Return(Return {
        expr: Some(expr),
        position,
    })))
}

fn parse_while(state: &mut ParseState) -> ParseResult<Option<Statement<()>>> {
    if !state.check_keyword("while") {
        return Ok(None);
    }
    let position = state.last_loc();
    state.push_context("in while loop");
    state.expect_op("(")?;
    let cond = expect_node(parse_expr(state)?, state, "condition expression")?;
    state.expect_op(")")?;
    let body = expect_node(parse_stat(state)?, state, "statement or block")?;
    state.pop_context();
    Ok(Some(Statement::While(While {
        cond,
        body: Box::new(body),
        position,
    })))
}

fn parse_for(state: &mut ParseState) -> ParseResult<Option<Statement<()>>> {
    if !state.check_keyword("for") {
        return Ok(None);
    }
    let position = state.last_loc();
    state.push_context("in for loop");
    state.expect_op("(")?;
    let init = if state.check_op(";") {
        None
    } else {
        let init = expect_node(parse_asgn(state)?, state, "assignment or ;")?;
        state.expect_op(";")?;
        Some(Box::new(init))
    };
    let cond = expect_node(parse_expr(state)?, state, "condition expression")?;
    state.expect_op(";")?;
    let incr = if state.peek_op(")") {
        None
    } else {
        Some(Box::new(expect_node(parse_asgn(state)?, state, "assignment or )")?))
    };
    state.expect_op(")")?;
    let body = expect_node(parse_stat(state)?, state, "statement or block")?;
    state.pop_context();
    Ok(Some(Statement::For(For {
        init,
        cond,
        incr,
        body: Box::new(body),
        position,
    })))
}

fn parse_keyword_stat(
    state: &mut ParseState,
    keyword: &str,
) -> ParseResult<Option<Span>> {
    if !state.check_keyword(keyword) {
        return Ok(None);
    }
    let position = state.last_loc();
    state.expect_op(";")?;
    Ok(Some(position))
}

/// Assignments, `:=` declarations, increments and call statements all start
/// with an expression; dispatch on the operator that follows it.
pub(crate) fn parse_asgn(state: &mut ParseState) -> ParseResult<Option<Asgn<()>>> {
    let Some(dst) = parse_expr(state)? else {
        return Ok(None);
    };

    if let Expression::Id(id) = &dst {
        if state.check_op(":=") {
            let position = state.last_loc();
            let name = id.name.clone();
            let expr = expect_node(parse_expr(state)?, state, "expression")?;
            return Ok(Some(Asgn::DeclAssign {
                name,
                expr,
                object: None,
                position,
            }));
        }
    }

    let incr = state.check_op("++");
    if incr || state.check_op("--") {
        let position = state.last_loc();
        return Ok(Some(Asgn::IncrDecr {
            expr: dst,
            incr,
            position,
        }));
    }

    if state.check_op("=") {
        let position = state.last_loc();
        let src = expect_node(parse_expr(state)?, state, "expression")?;
        return Ok(Some(Asgn::Assign { dst, src, position }));
    }

    const COMPOUND: &[(&str, AssignOp)] = &[
        ("+=", AssignOp::Add),
        ("-=", AssignOp::Sub),
        ("*=", AssignOp::Mul),
        ("/=", AssignOp::Div),
        ("%=", AssignOp::Mod),
        ("<<=", AssignOp::BitShl),
        (">>=", AssignOp::BitShr),
        ("&=", AssignOp::BitAnd),
        ("^=", AssignOp::BitXor),
        ("|=", AssignOp::BitOr),
    ];
    for (text, oper) in COMPOUND {
        if state.check_op(text) {
            let position = state.last_loc();
            let src = expect_node(parse_expr(state)?, state, "expression")?;
            return Ok(Some(Asgn::Compound {
                dst,
                oper: *oper,
                src,
                position,
            }));
        }
    }

    if let Expression::Call(call) = dst {
        return Ok(Some(Asgn::Call(call)));
    }

    Err(state.error("Expression used outside of assignment or function call"))
}

pub(crate) fn parse_stat(state: &mut ParseState) -> ParseResult<Option<Statement<()>>> {
    if let Some(stat) = parse_if(state)? {
        return Ok(Some(stat));
    }
    if let Some(stat) = parse_switch(state)? {
        return Ok(Some(stat));
    }
    if let Some(position) = parse_keyword_stat(state, "break")? {
        return Ok(Some(Statement::Break(position)));
    }
    if let Some(position) = parse_keyword_stat(state, "continue")? {
        return Ok(Some(Statement::Continue(position)));
    }
    if let Some(position) = parse_keyword_stat(state, "terminate")? {
        return Ok(Some(Statement::Terminate(position)));
    }
    if let Some(stat) = parse_return(state)? {
        return Ok(Some(stat));
    }
    if let Some(stat) = parse_while(state)? {
        return Ok(Some(stat));
    }
    if let Some(stat) = parse_for(state)? {
        return Ok(Some(stat));
    }
    if let Some(stat) = parse_block(state)? {
        return Ok(Some(stat));
    }
    if let Some(var) = parse_var_decl(state, false)? {
        return Ok(Some(Statement::Var(var)));
    }
    if let Some(alias) = parse_type_alias(state)? {
        return Ok(Some(Statement::Type(alias)));
    }
    if state.check_op(";") {
        return Ok(Some(Statement::Empty(state.last_loc())));
    }
    // lambdas begin with `func`, so an assignment statement can too; only
    // try assignments when the front token could begin an expression
    if starts_expression(state) {
        let asgn = expect_node(parse_asgn(state)?, state, "statement")?;
        state.expect_op(";")?;
        return Ok(Some(Statement::Asgn(asgn)));
    }
    Ok(None)
}

fn starts_expression(state: &ParseState) -> bool {
    use crate::lexer::TokenKind;
    let Some(front) = state.front() else {
        return false;
    };
    match front.kind {
        TokenKind::Identifier
        | TokenKind::Number
        | TokenKind::String
        | TokenKind::Character => true,
        TokenKind::Keyword => {
            matches!(front.text.as_str(), "make" | "func" | "true" | "false")
        }
        TokenKind::Operator => {
            matches!(front.text.as_str(), "(" | "[" | "-" | "!" | "~")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> Statement<()> {
        let tokens = Lexer::new(source).lex().expect("lexing failed");
        let mut state = ParseState::new(&tokens, source);
        parse_stat(&mut state)
            .expect("parse failed")
            .expect("no statement")
    }

    #[test]
    fn test_if_else_chain() {
        let Statement::If(fi) = parse("if (a) {} else if (b) {} else {}") else {
            panic!("expected if");
        };
        assert!(matches!(*fi.body, Statement::Block(_)));
        assert!(matches!(
            fi.else_body.as_deref(),
            Some(Statement::If(inner)) if inner.else_body.is_some()
        ));
    }

    #[test]
    fn test_switch_cases() {
        let Statement::Switch(swich) = parse(
            "switch (v) { case (0) { return; } case (1) break; default return; }",
        ) else {
            panic!("expected switch");
        };
        assert_eq!(swich.cases.len(), 3);
        assert!(swich.cases[0].expr.is_some());
        assert!(swich.cases[2].expr.is_none());
    }

    #[test]
    fn test_for_forms() {
        let Statement::For(four) = parse("for (i := 0; i != 10; i++) {}") else {
            panic!("expected for");
        };
        assert!(matches!(
            four.init.as_deref(),
            Some(Asgn::DeclAssign { name, .. }) if name == "i"
        ));
        assert!(matches!(four.incr.as_deref(), Some(Asgn::IncrDecr { incr: true, .. })));

        let Statement::For(four) = parse("for (; a != 0u; a = a - 1u) p = p;") else {
            panic!("expected for");
        };
        assert!(four.init.is_none());
        assert!(matches!(four.incr.as_deref(), Some(Asgn::Assign { .. })));
    }

    #[test]
    fn test_assignment_forms() {
        assert!(matches!(
            parse("a = b;"),
            Statement::Asgn(Asgn::Assign { .. })
        ));
        assert!(matches!(
            parse("a <<= b;"),
            Statement::Asgn(Asgn::Compound { oper: AssignOp::BitShl, .. })
        ));
        assert!(matches!(
            parse("value := 5u;"),
            Statement::Asgn(Asgn::DeclAssign { .. })
        ));
        assert!(matches!(
            parse("f(1);"),
            Statement::Asgn(Asgn::Call(_))
        ));
    }

    #[test]
    fn test_bare_expression_rejected() {
        let tokens = Lexer::new("a + b;").lex().expect("lexing failed");
        let mut state = ParseState::new(&tokens, "a + b;");
        assert!(parse_stat(&mut state).is_err());
    }

    #[test]
    fn test_local_declarations() {
        assert!(matches!(
            parse("var thing = 0u;"),
            Statement::Var(VarDecl { mutable: true, .. })
        ));
        assert!(matches!(
            parse("let yeah: uint = 99u;"),
            Statement::Var(VarDecl { mutable: false, .. })
        ));
        assert!(matches!(
            parse("type StrInt = func([char]) -> sint;"),
            Statement::Type(TypeAliasDecl { strong: false, .. })
        ));
    }
}
