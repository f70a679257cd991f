//! Expression sub-grammar: precedence climbing over a fixed operator table,
//! postfix chains for call/subscript/member and the primary forms.

use unescape::unescape;

use crate::lexer::TokenKind;

use super::ast::*;
use super::stat::parse_block;
use super::types::parse_type;
use super::{expect_node, ParseResult, ParseState};

/// Binary levels, loosest first. Operators on one level are left
/// associative.
const BIN_LEVELS: &[&[(&str, BinOp)]] = &[
    &[("||", BinOp::BoolOr)],
    &[("&&", BinOp::BoolAnd)],
    &[("|", BinOp::BitOr)],
    &[("^", BinOp::BitXor)],
    &[("&", BinOp::BitAnd)],
    &[("==", BinOp::Eq), ("!=", BinOp::Ne)],
    &[("<", BinOp::Lt), ("<=", BinOp::Le), (">", BinOp::Gt), (">=", BinOp::Ge)],
    &[("<<", BinOp::BitShl), (">>", BinOp::BitShr)],
    &[("+", BinOp::Add), ("-", BinOp::Sub)],
    &[("*", BinOp::Mul), ("/", BinOp::Div), ("%", BinOp::Mod)],
];

pub(crate) fn parse_expr(state: &mut ParseState) -> ParseResult<Option<Expression<()>>> {
    let Some(cond) = parse_binary(state, 0)? else {
        return Ok(None);
    };
    if !state.check_op("?") {
        return Ok(Some(cond));
    }
    let position = state.last_loc();
    state.push_context("in ternary expression");
    let troo = expect_node(parse_expr(state)?, state, "expression")?;
    state.expect_op(":")?;
    let fols = expect_node(parse_expr(state)?, state, "expression")?;
    state.pop_context();
    Ok(Some(Expression::Ternary(Ternary {
        cond: Box::new(cond),
        troo: Box::new(troo),
        fols: Box::new(fols),
        position,
        info: (),
    })))
}

fn parse_binary(state: &mut ParseState, level: usize) -> ParseResult<Option<Expression<()>>> {
    if level == BIN_LEVELS.len() {
        return parse_unary(state);
    }
    let Some(mut lhs) = parse_binary(state, level + 1)? else {
        return Ok(None);
    };
    'outer: loop {
        for (text, oper) in BIN_LEVELS[level] {
            if state.check_op(text) {
                let position = state.last_loc();
                let rhs = expect_node(parse_binary(state, level + 1)?, state, "expression")?;
                lhs = Expression::Binary(Binary {
                    lhs: Box::new(lhs),
                    oper: *oper,
                    rhs: Box::new(rhs),
                    position,
                    info: (),
                });
                continue 'outer;
            }
        }
        return Ok(Some(lhs));
    }
}

fn parse_unary(state: &mut ParseState) -> ParseResult<Option<Expression<()>>> {
    let oper = if state.check_op("-") {
        Some(UnOp::Neg)
    } else if state.check_op("!") {
        Some(UnOp::BoolNot)
    } else if state.check_op("~") {
        Some(UnOp::BitNot)
    } else {
        None
    };
    let Some(oper) = oper else {
        return parse_postfix(state);
    };
    let position = state.last_loc();
    let expr = expect_node(parse_unary(state)?, state, "expression")?;
    Ok(Some(Expression::Unary(Unary {
        oper,
        expr: Box::new(expr),
        position,
        info: (),
    })))
}

pub(crate) fn parse_postfix(state: &mut ParseState) -> ParseResult<Option<Expression<()>>> {
    let Some(mut expr) = parse_primary(state)? else {
        return Ok(None);
    };
    loop {
        if state.check_op("(") {
            let position = state.last_loc();
            state.push_context("in function call");
            let mut args = vec![];
            if !state.check_op(")") {
                loop {
                    args.push(expect_node(parse_expr(state)?, state, "expression")?);
                    if state.expect_either_op(")", ",")? == ")" {
                        break;
                    }
                }
            }
            state.pop_context();
            expr = Expression::Call(Call {
                callee: Box::new(expr),
                args,
                target: None,
                position,
                info: (),
            });
        } else if state.check_op("[") {
            let position = state.last_loc();
            state.push_context("in subscript");
            let index = expect_node(parse_expr(state)?, state, "index expression")?;
            state.expect_op("]")?;
            state.pop_context();
            expr = Expression::Subscript(Subscript {
                object: Box::new(expr),
                index: Box::new(index),
                position,
                info: (),
            });
        } else if state.check_op(".") {
            let position = state.last_loc();
            let member = state.expect_id()?;
            expr = Expression::Member(Member {
                object: Box::new(expr),
                member: member.text,
                index: None,
                position,
                info: (),
            });
        } else {
            return Ok(Some(expr));
        }
    }
}

fn parse_make(state: &mut ParseState) -> ParseResult<Option<Expression<()>>> {
    if !state.check_keyword("make") {
        return Ok(None);
    }
    let position = state.last_loc();
    state.push_context("in make expression");
    let ty = expect_node(parse_type(state)?, state, "type")?;
    let expr = if state.peek_op("{") {
        expect_node(parse_init_list(state)?, state, "initializer list")?
    } else {
        expect_node(parse_unary(state)?, state, "expression")?
    };
    state.pop_context();
    Ok(Some(Expression::Make(Make {
        ty,
        expr: Box::new(expr),
        cast: false,
        position,
        info: (),
    })))
}

fn parse_init_list(state: &mut ParseState) -> ParseResult<Option<Expression<()>>> {
    if !state.check_op("{") {
        return Ok(None);
    }
    let position = state.last_loc();
    state.push_context("in initializer list");
    let mut exprs = vec![];
    if !state.check_op("}") {
        loop {
            exprs.push(expect_node(parse_expr(state)?, state, "expression")?);
            if state.expect_either_op("}", ",")? == "}" {
                break;
            }
        }
    }
    state.pop_context();
    Ok(Some(Expression::Literal(Literal::InitList(InitList {
        exprs,
        position,
        info: (),
    }))))
}

fn parse_array_literal(state: &mut ParseState) -> ParseResult<Option<Expression<()>>> {
    if !state.check_op("[") {
        return Ok(None);
    }
    let position = state.last_loc();
    state.push_context("in array literal");
    let mut exprs = vec![];
    if !state.check_op("]") {
        loop {
            exprs.push(expect_node(parse_expr(state)?, state, "expression")?);
            if state.expect_either_op("]", ",")? == "]" {
                break;
            }
        }
    }
    state.pop_context();
    Ok(Some(Expression::Literal(Literal::Array(ArrayLit {
        exprs,
        position,
        info: (),
    }))))
}

/// Lambda literal `func (params) [-> type] { body }`.
fn parse_lambda(state: &mut ParseState) -> ParseResult<Option<Expression<()>>> {
    if !state.check_keyword("func") {
        return Ok(None);
    }
    let position = state.last_loc();
    state.push_context("in lambda expression");
    let params = super::decl::parse_func_params(state)?;
    let ret = super::decl::parse_func_ret(state)?;
    let body = parse_block_body(state)?;
    state.pop_context();
    Ok(Some(Expression::Literal(Literal::Lambda(Lambda {
        params,
        ret,
        body,
        captures: vec![],
        lambda_id: 0,
        position,
        info: (),
    }))))
}

fn parse_block_body(state: &mut ParseState) -> ParseResult<Block<()>> {
    let block = expect_node(parse_block(state)?, state, "block")?;
    match block {
        Statement::Block(block) => Ok(block),
        _ => unreachable!("parse_block returns blocks"),
    }
}

fn parse_number_value(state: &ParseState, text: &str) -> ParseResult<NumberValue> {
    let bad = |state: &ParseState| state.error(format!("Invalid number literal '{text}'"));
    if let Some(digits) = text.strip_suffix('u') {
        let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)
        } else {
            digits.parse::<u64>()
        };
        return value.map(NumberValue::Uint).map_err(|_| bad(state));
    }
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, text.strip_prefix('+').unwrap_or(text)),
    };
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16)
            .map(|v| NumberValue::Int(sign * v))
            .map_err(|_| bad(state));
    }
    if digits.contains('.') || digits.contains('e') || digits.contains('E') {
        return text
            .parse::<f64>()
            .map(NumberValue::Real)
            .map_err(|_| bad(state));
    }
    digits
        .parse::<i64>()
        .map(|v| NumberValue::Int(sign * v))
        .map_err(|_| bad(state))
}

fn parse_literal_token(state: &mut ParseState) -> ParseResult<Option<Expression<()>>> {
    let Some(front) = state.front() else {
        return Ok(None);
    };
    match front.kind {
        TokenKind::Number => {
            let token = state.expect(TokenKind::Number)?;
            let value = parse_number_value(state, &token.text)?;
            Ok(Some(Expression::Literal(Literal::Number(NumberLit {
                literal: token.text,
                value,
                position: token.position,
                info: (),
            }))))
        }
        TokenKind::String => {
            let token = state.expect(TokenKind::String)?;
            let inner = &token.text[1..token.text.len() - 1];
            let value = unescape(inner)
                .ok_or_else(|| state.error(format!("Invalid escape in string literal {}", token.text)))?;
            Ok(Some(Expression::Literal(Literal::String(StringLit {
                value,
                position: token.position,
                info: (),
            }))))
        }
        TokenKind::Character => {
            let token = state.expect(TokenKind::Character)?;
            let inner = &token.text[1..token.text.len() - 1];
            let value = unescape(inner)
                .ok_or_else(|| state.error(format!("Invalid escape in character literal {}", token.text)))?;
            let mut chars = value.chars();
            let (Some(c), None) = (chars.next(), chars.next()) else {
                return Err(state.error(format!(
                    "Character literal {} must contain exactly one character",
                    token.text
                )));
            };
            if !c.is_ascii() {
                return Err(state.error(format!("Non ASCII character literal {}", token.text)));
            }
            Ok(Some(Expression::Literal(Literal::Char(CharLit {
                value: c as u8,
                position: token.position,
                info: (),
            }))))
        }
        _ => Ok(None),
    }
}

fn parse_primary(state: &mut ParseState) -> ParseResult<Option<Expression<()>>> {
    if let Some(lit) = parse_literal_token(state)? {
        return Ok(Some(lit));
    }
    if state.peek_keyword("true") || state.peek_keyword("false") {
        let value = state.check_keyword("true");
        if !value {
            state.check_keyword("false");
        }
        let position = state.last_loc();
        return Ok(Some(Expression::Literal(Literal::Bool(BoolLit {
            value,
            position,
            info: (),
        }))));
    }
    if let Some(make) = parse_make(state)? {
        return Ok(Some(make));
    }
    if let Some(lambda) = parse_lambda(state)? {
        return Ok(Some(lambda));
    }
    if let Some(array) = parse_array_literal(state)? {
        return Ok(Some(array));
    }
    if state.check_op("(") {
        state.push_context("in parenthesized expression");
        let expr = expect_node(parse_expr(state)?, state, "expression")?;
        state.expect_op(")")?;
        state.pop_context();
        return Ok(Some(expr));
    }
    if state.peek_kind(TokenKind::Identifier) {
        let token = state.expect_id()?;
        return Ok(Some(Expression::Id(Id {
            name: token.text,
            definition: None,
            capture_index: None,
            position: token.position,
            info: (),
        })));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> Expression<()> {
        let tokens = Lexer::new(source).lex().expect("lexing failed");
        let mut state = ParseState::new(&tokens, source);
        parse_expr(&mut state)
            .expect("parse failed")
            .expect("no expression")
    }

    fn as_binary(expr: &Expression<()>) -> &Binary<()> {
        match expr {
            Expression::Binary(node) => node,
            other => panic!("expected binary expression, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        // a + b * c parses as a + (b * c)
        let sum = as_binary(&parse("a + b * c"));
        assert_eq!(sum.oper, BinOp::Add);
        let product = as_binary(&sum.rhs);
        assert_eq!(product.oper, BinOp::Mul);
    }

    #[test]
    fn test_left_associativity() {
        // a - b - c parses as (a - b) - c
        let outer = as_binary(&parse("a - b - c"));
        assert_eq!(outer.oper, BinOp::Sub);
        let inner = as_binary(&outer.lhs);
        assert_eq!(inner.oper, BinOp::Sub);
    }

    #[test]
    fn test_comparison_below_shift() {
        let cmp = as_binary(&parse("a << b < c"));
        assert_eq!(cmp.oper, BinOp::Lt);
        assert_eq!(as_binary(&cmp.lhs).oper, BinOp::BitShl);
    }

    #[test]
    fn test_ternary() {
        let Expression::Ternary(tern) = parse("a == 0u ? 1u : b") else {
            panic!("expected ternary");
        };
        assert_eq!(as_binary(&tern.cond).oper, BinOp::Eq);
    }

    #[test]
    fn test_postfix_chain() {
        // a.b.c[e][f] nests member accesses under subscripts
        let Expression::Subscript(sub1) = parse("a.b.c[e][f]") else {
            panic!("expected subscript");
        };
        let Expression::Subscript(sub2) = sub1.object.as_ref() else {
            panic!("expected nested subscript");
        };
        let Expression::Member(mem) = sub2.object.as_ref() else {
            panic!("expected member access");
        };
        assert_eq!(mem.member, "c");
    }

    #[test]
    fn test_call_with_args() {
        let Expression::Call(call) = parse("fac(n - 1u)") else {
            panic!("expected call");
        };
        assert_eq!(call.args.len(), 1);
        assert!(matches!(*call.callee, Expression::Id(_)));
    }

    #[test]
    fn test_make_nested() {
        let Expression::Make(outer) = parse("make sint make real make uint {}") else {
            panic!("expected make");
        };
        let Expression::Make(middle) = outer.expr.as_ref() else {
            panic!("expected nested make");
        };
        let Expression::Make(inner) = middle.expr.as_ref() else {
            panic!("expected nested make");
        };
        assert!(matches!(
            inner.expr.as_ref(),
            Expression::Literal(Literal::InitList(list)) if list.exprs.is_empty()
        ));
    }

    #[test]
    fn test_lambda_literal() {
        let Expression::Literal(Literal::Lambda(lambda)) =
            parse("func(a: sint, b: sint) -> bool { return a < b; }")
        else {
            panic!("expected lambda");
        };
        assert_eq!(lambda.params.len(), 2);
        assert!(lambda.ret.is_some());
        assert_eq!(lambda.body.stats.len(), 1);
    }

    #[test]
    fn test_number_values() {
        let Expression::Literal(Literal::Number(num)) = parse("0u") else {
            panic!("expected number");
        };
        assert_eq!(num.value, NumberValue::Uint(0));

        let Expression::Literal(Literal::Number(num)) = parse("3.5") else {
            panic!("expected number");
        };
        assert_eq!(num.value, NumberValue::Real(3.5));

        let Expression::Literal(Literal::Number(num)) = parse("-11") else {
            panic!("expected number");
        };
        assert_eq!(num.value, NumberValue::Int(-11));

        let Expression::Literal(Literal::Number(num)) = parse("0xff") else {
            panic!("expected number");
        };
        assert_eq!(num.value, NumberValue::Int(255));
    }

    #[test]
    fn test_string_and_char() {
        let Expression::Literal(Literal::String(s)) = parse(r#""hi\n""#) else {
            panic!("expected string");
        };
        assert_eq!(s.value, "hi\n");

        let Expression::Literal(Literal::Char(c)) = parse("'x'") else {
            panic!("expected char");
        };
        assert_eq!(c.value, b'x');
    }
}
