//! Import-order resolution: modules are sorted so that every import
//! precedes its importer, and import cycles are rejected.

use std::{error::Error, fmt::Display};

use crate::lexer::Span;
use crate::parser::ast::Module;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    CyclicImport { module: String, position: Span },
    UnknownModule { module: String, position: Span },
    DuplicateModule { module: String, position: Span },
}

impl ModuleError {
    pub fn span(&self) -> Span {
        match self {
            ModuleError::CyclicImport { position, .. }
            | ModuleError::UnknownModule { position, .. }
            | ModuleError::DuplicateModule { position, .. } => position.clone(),
        }
    }

    pub fn module(&self) -> &str {
        match self {
            ModuleError::CyclicImport { module, .. }
            | ModuleError::UnknownModule { module, .. }
            | ModuleError::DuplicateModule { module, .. } => module,
        }
    }
}

impl Display for ModuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleError::CyclicImport { module, .. } => {
                write!(f, "Cyclic dependencies detected in module \"{module}\"")
            }
            ModuleError::UnknownModule { module, .. } => {
                write!(f, "Module \"{module}\" not found")
            }
            ModuleError::DuplicateModule { module, .. } => {
                write!(f, "Module \"{module}\" defined more than once")
            }
        }
    }
}

impl Error for ModuleError {}

struct Visitor<'a, T> {
    modules: &'a [Module<T>],
    visited: Vec<bool>,
    on_stack: Vec<bool>,
    order: Vec<usize>,
}

impl<'a, T> Visitor<'a, T> {
    fn visit_name(&mut self, name: &str, position: &Span) -> Result<(), ModuleError> {
        for index in 0..self.modules.len() {
            if self.modules[index].name == name {
                if self.on_stack[index] {
                    return Err(ModuleError::CyclicImport {
                        module: name.to_string(),
                        position: position.clone(),
                    });
                }
                return self.visit(index);
            }
        }
        Err(ModuleError::UnknownModule {
            module: name.to_string(),
            position: position.clone(),
        })
    }

    fn visit(&mut self, index: usize) -> Result<(), ModuleError> {
        if self.visited[index] {
            return Ok(());
        }
        self.visited[index] = true;
        self.on_stack[index] = true;
        for (import, position) in &self.modules[index].imports {
            self.visit_name(import, position)?;
        }
        self.on_stack[index] = false;
        self.order.push(index);
        Ok(())
    }
}

/// Depth-first post-order over the import graph. The returned indices
/// order `modules` dependencies-first.
pub fn module_order<T>(modules: &[Module<T>]) -> Result<Vec<usize>, ModuleError> {
    for (i, module) in modules.iter().enumerate() {
        if modules[..i].iter().any(|m| m.name == module.name) {
            return Err(ModuleError::DuplicateModule {
                module: module.name.clone(),
                position: module.name_position.clone(),
            });
        }
    }

    let mut visitor = Visitor {
        modules,
        visited: vec![false; modules.len()],
        on_stack: vec![false; modules.len()],
        order: Vec::with_capacity(modules.len()),
    };
    for index in 0..modules.len() {
        visitor.visit(index)?;
    }
    Ok(visitor.order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Span;
    use crate::parser::ast::Module;

    fn module(name: &str, imports: &[&str]) -> Module<()> {
        Module {
            name: name.to_string(),
            name_position: Span::default(),
            imports: imports
                .iter()
                .map(|i| (i.to_string(), Span::default()))
                .collect(),
            decls: vec![],
        }
    }

    #[test]
    fn test_imports_precede_importers() {
        let modules = [
            module("main", &["util", "math"]),
            module("math", &["util"]),
            module("util", &[]),
        ];
        let order = module_order(&modules).expect("ordering failed");
        let pos = |name: &str| order.iter().position(|&i| modules[i].name == name).unwrap();
        assert!(pos("util") < pos("math"));
        assert!(pos("math") < pos("main"));
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn test_cycle_detected() {
        let modules = [module("a", &["b"]), module("b", &["a"])];
        let err = module_order(&modules).unwrap_err();
        assert!(matches!(err, ModuleError::CyclicImport { .. }));
    }

    #[test]
    fn test_self_import_is_a_cycle() {
        let modules = [module("a", &["a"])];
        assert!(matches!(
            module_order(&modules),
            Err(ModuleError::CyclicImport { module, .. }) if module == "a"
        ));
    }

    #[test]
    fn test_missing_import() {
        let modules = [module("a", &["nope"])];
        assert!(matches!(
            module_order(&modules),
            Err(ModuleError::UnknownModule { module, .. }) if module == "nope"
        ));
    }

    #[test]
    fn test_duplicate_module() {
        let modules = [module("a", &[]), module("a", &[])];
        assert!(matches!(
            module_order(&modules),
            Err(ModuleError::DuplicateModule { .. })
        ));
    }
}
