use super::ast::{FieldDef, ParamRef, TypeName};
use super::{expect_node, ParseResult, ParseState};

pub(crate) fn parse_ref(state: &mut ParseState) -> ParamRef {
    if state.check_keyword("ref") {
        ParamRef::Ref
    } else {
        ParamRef::Val
    }
}

fn parse_func_type(state: &mut ParseState) -> ParseResult<Option<TypeName>> {
    if !state.check_keyword("func") {
        return Ok(None);
    }
    let position = state.last_loc();
    state.push_context("in function type");
    state.expect_op("(")?;
    let mut params = vec![];
    if !state.check_op(")") {
        loop {
            let param_ref = parse_ref(state);
            let ty = expect_node(parse_type(state)?, state, "type")?;
            params.push((param_ref, ty));
            if state.expect_either_op(")", ",")? == ")" {
                break;
            }
        }
    }
    let ret = if state.check_op("->") {
        state.push_context("after ->");
        let ret = expect_node(parse_type(state)?, state, "type")?;
        state.pop_context();
        Some(Box::new(ret))
    } else {
        None
    };
    state.pop_context();
    Ok(Some(TypeName::Func {
        params,
        ret,
        position,
    }))
}

fn parse_array_type(state: &mut ParseState) -> ParseResult<Option<TypeName>> {
    if !state.check_op("[") {
        return Ok(None);
    }
    let position = state.last_loc();
    state.push_context("in array type");
    let elem = expect_node(parse_type(state)?, state, "element type")?;
    state.expect_op("]")?;
    state.pop_context();
    Ok(Some(TypeName::Array {
        elem: Box::new(elem),
        position,
    }))
}

fn parse_named_type(state: &mut ParseState) -> ParseResult<Option<TypeName>> {
    if !state.peek_kind(crate::lexer::TokenKind::Identifier) {
        return Ok(None);
    }
    let token = state.expect_id()?;
    Ok(Some(TypeName::Named {
        name: token.text,
        position: token.position,
    }))
}

fn parse_struct_type(state: &mut ParseState) -> ParseResult<Option<TypeName>> {
    if !state.check_keyword("struct") {
        return Ok(None);
    }
    let position = state.last_loc();
    state.push_context("in struct type");
    state.expect_op("{")?;
    let mut fields = vec![];
    while !state.check_op("}") {
        let name = state.expect_id()?;
        state.expect_op(":")?;
        state.push_context("after :");
        let ty = expect_node(parse_type(state)?, state, "type")?;
        state.pop_context();
        state.expect_op(";")?;
        fields.push(FieldDef {
            name: name.text,
            ty,
            position: name.position,
        });
    }
    state.pop_context();
    Ok(Some(TypeName::Struct { fields, position }))
}

pub(crate) fn parse_type(state: &mut ParseState) -> ParseResult<Option<TypeName>> {
    if let Some(ty) = parse_func_type(state)? {
        return Ok(Some(ty));
    }
    if let Some(ty) = parse_array_type(state)? {
        return Ok(Some(ty));
    }
    if let Some(ty) = parse_struct_type(state)? {
        return Ok(Some(ty));
    }
    parse_named_type(state)
}

#[cfg(test)]
mod tests {
    use crate::lexer::Lexer;
    use crate::parser::ast::{ParamRef, TypeName};
    use crate::parser::ParseState;

    fn parse(source: &str) -> Option<TypeName> {
        let tokens = Lexer::new(source).lex().expect("lexing failed");
        let mut state = ParseState::new(&tokens, source);
        super::parse_type(&mut state).expect("parse failed")
    }

    #[test]
    fn test_named() {
        assert!(matches!(
            parse("sint"),
            Some(TypeName::Named { name, .. }) if name == "sint"
        ));
    }

    #[test]
    fn test_array_of_arrays() {
        let Some(TypeName::Array { elem, .. }) = parse("[[real]]") else {
            panic!("expected array type");
        };
        assert!(matches!(*elem, TypeName::Array { .. }));
    }

    #[test]
    fn test_func_type() {
        let Some(TypeName::Func { params, ret, .. }) = parse("func(sint, ref [char]) -> bool")
        else {
            panic!("expected function type");
        };
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].0, ParamRef::Val);
        assert_eq!(params[1].0, ParamRef::Ref);
        assert!(ret.is_some());
    }

    #[test]
    fn test_func_type_no_ret() {
        let Some(TypeName::Func { ret, .. }) = parse("func()") else {
            panic!("expected function type");
        };
        assert!(ret.is_none());
    }

    #[test]
    fn test_struct_type() {
        let Some(TypeName::Struct { fields, .. }) = parse("struct {x: real; y: real;}") else {
            panic!("expected struct type");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "x");
    }
}
