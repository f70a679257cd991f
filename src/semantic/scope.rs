//! The scope tree. Scopes are keyed multimaps of name to symbol with a kind
//! tag and a parent link; lookups walk outward, skipping from a function
//! scope straight to the enclosing namespace so that outer locals are only
//! reachable through closure capture.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::lexer::Span;

use super::error::{SemResult, SemanticError};
use super::symbols::{SymbolKind, SymbolRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Namespace: the builtin scope or a module's global scope.
    Ns,
    Block,
    Func,
    /// Body of a loop or switch case; the target of break/continue.
    Flow,
    Closure,
}

pub type ScopeRef = Rc<RefCell<Scope>>;

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub module: String,
    pub table: HashMap<String, Vec<SymbolRef>>,
    pub parent: Option<ScopeRef>,
    /// Global scopes of imported modules; consulted by namespace lookups.
    pub imports: Vec<ScopeRef>,
    /// The owning lambda symbol of a closure scope.
    pub owner: Option<SymbolRef>,
}

impl Scope {
    pub fn new(kind: ScopeKind, module: impl ToString, parent: Option<ScopeRef>) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            kind,
            module: module.to_string(),
            table: HashMap::new(),
            parent,
            imports: vec![],
            owner: None,
        }))
    }

    fn find_local(&self, name: &str) -> Option<SymbolRef> {
        self.table.get(name).and_then(|syms| syms.first().cloned())
    }

    fn find_imported(&self, name: &str) -> Vec<SymbolRef> {
        let mut found = vec![];
        for import in &self.imports {
            if let Some(sym) = import.borrow().find_local(name) {
                found.push(sym);
            }
        }
        found
    }
}

/// The lookup chain parent: function scopes jump to the nearest namespace.
pub fn parent_scope(scope: &ScopeRef) -> Option<ScopeRef> {
    let borrowed = scope.borrow();
    let parent = borrowed.parent.clone()?;
    if borrowed.kind != ScopeKind::Func {
        return Some(parent);
    }
    let mut current = parent;
    loop {
        if current.borrow().kind == ScopeKind::Ns {
            return Some(current);
        }
        let next = current.borrow().parent.clone()?;
        current = next;
    }
}

/// Nearest enclosing scope of the given kind, including `scope` itself.
pub fn find_nearest(kind: ScopeKind, scope: &ScopeRef) -> Option<ScopeRef> {
    let mut current = scope.clone();
    loop {
        if current.borrow().kind == kind {
            return Some(current);
        }
        let next = current.borrow().parent.clone()?;
        current = next;
    }
}

/// Finds the first symbol for `name` walking the scope chain; also returns
/// the scope it was found in. Namespace scopes consult their imports, and a
/// name provided by more than one import is ambiguous.
pub fn find_symbol(
    scope: &ScopeRef,
    name: &str,
    position: &Span,
) -> SemResult<Option<(SymbolRef, ScopeRef)>> {
    let mut current = scope.clone();
    loop {
        if let Some(sym) = current.borrow().find_local(name) {
            return Ok(Some((sym, current.clone())));
        }
        if current.borrow().kind == ScopeKind::Ns {
            let imported = current.borrow().find_imported(name);
            match imported.len() {
                0 => {}
                1 => return Ok(Some((imported[0].clone(), current.clone()))),
                _ => {
                    return Err(SemanticError::AmbiguousImport {
                        name: name.to_string(),
                        position: position.clone(),
                    })
                }
            }
        }
        match parent_scope(&current) {
            Some(parent) => current = parent,
            None => return Ok(None),
        }
    }
}

pub struct ScopeManager {
    current: ScopeRef,
}

impl ScopeManager {
    pub fn new(root: ScopeRef) -> ScopeManager {
        ScopeManager { current: root }
    }

    pub fn cur(&self) -> ScopeRef {
        self.current.clone()
    }

    pub fn enter(&mut self, kind: ScopeKind) -> ScopeRef {
        let module = self.current.borrow().module.clone();
        let scope = Scope::new(kind, module, Some(self.current.clone()));
        self.current = scope.clone();
        scope
    }

    pub fn enter_closure(&mut self, owner: SymbolRef) -> ScopeRef {
        let scope = self.enter(ScopeKind::Closure);
        scope.borrow_mut().owner = Some(owner);
        scope
    }

    pub fn leave(&mut self) -> ScopeRef {
        let left = self.current.clone();
        let parent = left
            .borrow()
            .parent
            .clone()
            .expect("cannot leave the root scope");
        self.current = parent;
        left
    }

    /// Inserts a non-function symbol; any existing symbol with the same name
    /// in the current scope is a redefinition.
    pub fn insert(&mut self, name: impl ToString, symbol: SymbolRef) -> SemResult<()> {
        let name = name.to_string();
        let current = self.cur();
        let mut scope = current.borrow_mut();
        if let Some(existing) = scope.table.get(&name).and_then(|s| s.first()) {
            return Err(SemanticError::Redefinition {
                name,
                previous: existing.borrow().position.clone(),
                position: symbol.borrow().position.clone(),
            });
        }
        scope.table.entry(name).or_default().push(symbol);
        Ok(())
    }

    /// Inserts a function symbol. Functions may overload a name provided
    /// their parameter lists differ; colliding with a non-function symbol is
    /// a redefinition.
    pub fn insert_func(&mut self, name: impl ToString, symbol: SymbolRef) -> SemResult<()> {
        let name = name.to_string();
        let current = self.cur();
        let mut scope = current.borrow_mut();
        if let Some(existing) = scope.table.get(&name) {
            for prev in existing {
                let prev_borrow = prev.borrow();
                let SymbolKind::Func(prev_func) = &prev_borrow.kind else {
                    return Err(SemanticError::Redefinition {
                        name,
                        previous: prev_borrow.position.clone(),
                        position: symbol.borrow().position.clone(),
                    });
                };
                let sym_borrow = symbol.borrow();
                let SymbolKind::Func(new_func) = &sym_borrow.kind else {
                    return Err(SemanticError::Redefinition {
                        name,
                        previous: prev_borrow.position.clone(),
                        position: sym_borrow.position.clone(),
                    });
                };
                if same_params(prev_func, new_func) {
                    return Err(SemanticError::Redefinition {
                        name,
                        previous: prev_borrow.position.clone(),
                        position: sym_borrow.position.clone(),
                    });
                }
            }
        }
        scope.table.entry(name).or_default().push(symbol);
        Ok(())
    }
}

/// Two signatures collide when their receivers and parameter types are
/// equal; mutability and binding are ignored.
fn same_params(
    a: &super::symbols::FuncSymbol,
    b: &super::symbols::FuncSymbol,
) -> bool {
    let rec_same = match (&a.receiver, &b.receiver) {
        (None, None) => true,
        (Some(ra), Some(rb)) => ra.ty == rb.ty,
        _ => false,
    };
    rec_same
        && a.params.len() == b.params.len()
        && a.params
            .iter()
            .zip(b.params.iter())
            .all(|(pa, pb)| pa.ty == pb.ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Span;
    use crate::semantic::symbols::{make_symbol, AliasSymbol, FuncSymbol, SymbolKind};
    use crate::semantic::types::{ExprType, Type};

    fn alias(name: &str, ty: Type) -> SymbolRef {
        make_symbol(
            name,
            "main",
            Span::default(),
            SymbolKind::TypeAlias(AliasSymbol { strong: false, ty }),
        )
    }

    fn func(name: &str, params: Vec<Type>) -> SymbolRef {
        make_symbol(
            name,
            "main",
            Span::default(),
            SymbolKind::Func(FuncSymbol {
                receiver: None,
                params: params.into_iter().map(ExprType::let_val).collect(),
                ret: Type::Void,
                external: false,
                mangled: name.to_string(),
            }),
        )
    }

    #[test]
    fn test_lookup_walks_outward() {
        let root = Scope::new(ScopeKind::Ns, "main", None);
        let mut man = ScopeManager::new(root);
        man.insert("x", alias("x", Type::Sint)).expect("insert failed");
        man.enter(ScopeKind::Block);
        let found = find_symbol(&man.cur(), "x", &Span::default())
            .expect("lookup failed")
            .expect("symbol not found");
        assert_eq!(found.0.borrow().name, "x");
    }

    #[test]
    fn test_func_scope_skips_outer_locals() {
        let root = Scope::new(ScopeKind::Ns, "main", None);
        let mut man = ScopeManager::new(root);
        man.enter(ScopeKind::Func);
        man.insert("local", alias("local", Type::Sint)).expect("insert failed");
        man.enter(ScopeKind::Func);
        // the inner function scope must not see the outer function's local
        let found = find_symbol(&man.cur(), "local", &Span::default()).expect("lookup failed");
        assert!(found.is_none());
    }

    #[test]
    fn test_redefinition_rejected() {
        let root = Scope::new(ScopeKind::Ns, "main", None);
        let mut man = ScopeManager::new(root);
        man.insert("x", alias("x", Type::Sint)).expect("insert failed");
        assert!(matches!(
            man.insert("x", alias("x", Type::Uint)),
            Err(SemanticError::Redefinition { .. })
        ));
    }

    #[test]
    fn test_function_overloads_allowed() {
        let root = Scope::new(ScopeKind::Ns, "main", None);
        let mut man = ScopeManager::new(root);
        man.insert_func("f", func("f", vec![Type::Sint])).expect("insert failed");
        man.insert_func("f", func("f", vec![Type::Real])).expect("overload rejected");
        assert!(matches!(
            man.insert_func("f", func("f", vec![Type::Sint])),
            Err(SemanticError::Redefinition { .. })
        ));
    }

    #[test]
    fn test_import_ambiguity() {
        let root = Scope::new(ScopeKind::Ns, "main", None);
        let a = Scope::new(ScopeKind::Ns, "a", None);
        let b = Scope::new(ScopeKind::Ns, "b", None);
        a.borrow_mut()
            .table
            .entry("x".into())
            .or_default()
            .push(alias("x", Type::Sint));
        b.borrow_mut()
            .table
            .entry("x".into())
            .or_default()
            .push(alias("x", Type::Uint));
        root.borrow_mut().imports = vec![a, b];
        assert!(matches!(
            find_symbol(&root, "x", &Span::default()),
            Err(SemanticError::AmbiguousImport { .. })
        ));
    }
}
