//! Static capability pass over a parsed script.
//!
//! This is the sandboxing boundary: every identifier must resolve to a
//! declared raster input, a local binding, a function parameter, a
//! user-declared function, or a builtin, so a script cannot reference
//! anything outside its pixel computation. Numeric edge cases (division by
//! zero, out-of-range indices) deliberately pass the check and surface as
//! NaN at evaluation time.

use crate::ast::{Expr, Program, Stmt};
use crate::eval::BUILTIN_FUNCTIONS;
use std::collections::HashSet;
use tile_common::{ScriptTileError, ScriptTileResult};

pub fn check(program: &Program, declared_inputs: &[String]) -> ScriptTileResult<()> {
    let mut checker = Checker {
        inputs: declared_inputs.iter().map(String::as_str).collect(),
        scopes: vec![HashSet::new()],
        functions: HashSet::new(),
    };
    checker.check_block(&program.body)?;

    if !contains_return(&program.body) {
        return Err(ScriptTileError::Syntax(
            "script must return an array of 3 or 4 channel values".to_string(),
        ));
    }
    Ok(())
}

/// Does the statement list contain a top-level `return` (not counting
/// function bodies)?
fn contains_return(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| match stmt {
        Stmt::Return(_) => true,
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            contains_return(then_branch)
                || else_branch.as_deref().map(contains_return).unwrap_or(false)
        }
        _ => false,
    })
}

struct Checker<'a> {
    inputs: HashSet<&'a str>,
    scopes: Vec<HashSet<String>>,
    functions: HashSet<String>,
}

impl<'a> Checker<'a> {
    fn check_block(&mut self, body: &[Stmt]) -> ScriptTileResult<()> {
        // Hoist function declarations so calls may precede them textually
        for stmt in body {
            if let Stmt::Function { name, .. } = stmt {
                self.declare_function(name)?;
            }
        }
        for stmt in body {
            self.check_stmt(stmt)?;
        }
        Ok(())
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> ScriptTileResult<()> {
        match stmt {
            Stmt::Let { names, value, .. } => {
                self.check_expr(value)?;
                for name in names {
                    self.declare_binding(name)?;
                }
                Ok(())
            }
            Stmt::Function { params, body, .. } => {
                // Body is checked with the bindings visible at the
                // declaration point plus the parameters.
                self.scopes.push(params.iter().cloned().collect());
                self.check_block(body)?;
                self.scopes.pop();
                Ok(())
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_expr(cond)?;
                self.scopes.push(HashSet::new());
                self.check_block(then_branch)?;
                self.scopes.pop();
                if let Some(else_branch) = else_branch {
                    self.scopes.push(HashSet::new());
                    self.check_block(else_branch)?;
                    self.scopes.pop();
                }
                Ok(())
            }
            Stmt::Return(value) => self.check_expr(value),
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> ScriptTileResult<()> {
        match expr {
            Expr::Number(_) => Ok(()),
            Expr::Ident(name) => {
                if self.is_bound(name) || self.inputs.contains(name.as_str()) {
                    Ok(())
                } else if self.functions.contains(name) || is_builtin(name) {
                    Err(ScriptTileError::CapabilityViolation(format!(
                        "function '{}' used as a value",
                        name
                    )))
                } else {
                    Err(ScriptTileError::UndeclaredInputReference(name.clone()))
                }
            }
            Expr::Array(elements) => {
                for element in elements {
                    self.check_expr(element)?;
                }
                Ok(())
            }
            Expr::Index(base, index) => {
                self.check_expr(base)?;
                self.check_expr(index)
            }
            Expr::Call(name, args) => {
                if !self.functions.contains(name) && !is_builtin(name) {
                    // A call through a declared input or local binding is
                    // not a capability the language grants
                    return Err(if self.inputs.contains(name.as_str()) || self.is_bound(name) {
                        ScriptTileError::CapabilityViolation(format!("'{}' is not callable", name))
                    } else {
                        ScriptTileError::CapabilityViolation(format!(
                            "call to unknown function '{}'",
                            name
                        ))
                    });
                }
                for arg in args {
                    self.check_expr(arg)?;
                }
                Ok(())
            }
            Expr::Unary(_, operand) => self.check_expr(operand),
            Expr::Binary(_, left, right) => {
                self.check_expr(left)?;
                self.check_expr(right)
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                self.check_expr(cond)?;
                self.check_expr(then)?;
                self.check_expr(otherwise)
            }
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn declare_binding(&mut self, name: &str) -> ScriptTileResult<()> {
        self.guard_reserved(name)?;
        self.scopes
            .last_mut()
            .expect("scope stack never empty")
            .insert(name.to_string());
        Ok(())
    }

    fn declare_function(&mut self, name: &str) -> ScriptTileResult<()> {
        self.guard_reserved(name)?;
        self.functions.insert(name.to_string());
        Ok(())
    }

    /// Input and builtin names cannot be shadowed: a script that rebinds
    /// `rgb` or `min` is almost certainly a mistake and rebinding would
    /// silently change what the name samples.
    fn guard_reserved(&self, name: &str) -> ScriptTileResult<()> {
        if self.inputs.contains(name) {
            return Err(ScriptTileError::CapabilityViolation(format!(
                "cannot redeclare input '{}'",
                name
            )));
        }
        if is_builtin(name) {
            return Err(ScriptTileError::CapabilityViolation(format!(
                "cannot redeclare builtin '{}'",
                name
            )));
        }
        Ok(())
    }
}

fn is_builtin(name: &str) -> bool {
    BUILTIN_FUNCTIONS.contains(&name)
}
