use crate::lexer::Span;

/// Whether a parameter is passed by value or by reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ParamRef {
    Val,
    Ref,
}

/// A type as written in the source. Resolution into a semantic
/// [`crate::semantic::Type`] happens during analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeName {
    Named {
        name: String,
        position: Span,
    },
    Array {
        elem: Box<TypeName>,
        position: Span,
    },
    Func {
        params: Vec<(ParamRef, TypeName)>,
        ret: Option<Box<TypeName>>,
        position: Span,
    },
    Struct {
        fields: Vec<FieldDef>,
        position: Span,
    },
}

impl TypeName {
    pub fn position(&self) -> Span {
        match self {
            TypeName::Named { position, .. }
            | TypeName::Array { position, .. }
            | TypeName::Func { position, .. }
            | TypeName::Struct { position, .. } => position.clone(),
        }
    }
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeName::Named { name, .. } => f.write_str(name),
            TypeName::Array { elem, .. } => write!(f, "[{elem}]"),
            TypeName::Func { params, ret, .. } => {
                f.write_str("func(")?;
                for (i, (param_ref, ty)) in params.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    if *param_ref == ParamRef::Ref {
                        f.write_str("ref ")?;
                    }
                    write!(f, "{ty}")?;
                }
                f.write_str(")")?;
                if let Some(ret) = ret {
                    write!(f, " -> {ret}")?;
                }
                Ok(())
            }
            TypeName::Struct { fields, .. } => {
                f.write_str("struct {")?;
                for field in fields {
                    write!(f, "{}: {}; ", field.name, field.ty)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Field of a structural `struct { ... }` type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeName,
    pub position: Span,
}
