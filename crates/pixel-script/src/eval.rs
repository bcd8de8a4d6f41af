//! Tree-walking evaluator for compiled pixel scripts.
//!
//! Values are f64 numbers and arrays of values. Numeric edge cases follow
//! IEEE semantics (division by zero yields infinity, out-of-range indexing
//! yields NaN) so the rendering engine can apply one deterministic clamp
//! policy. Structural misuse (arithmetic on an array, returning a
//! non-array) is a per-pixel fault, recovered by the engine per pixel.

use crate::ast::{BinaryOp, Expr, Program, Stmt, UnaryOp};
use std::collections::HashMap;
use std::rc::Rc;

/// Pure numeric builtins callable from scripts.
pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "min", "max", "abs", "floor", "ceil", "round", "sqrt", "pow", "exp", "log", "sin", "cos",
    "clamp", "len",
];

/// Recursion guard: user function call nesting.
const MAX_CALL_DEPTH: u32 = 64;

/// Per-pixel evaluation step budget. A script that loops by recursion
/// degrades to a fault on one pixel, never a hung render.
const STEP_BUDGET: u32 = 200_000;

/// A contained, per-pixel evaluation fault.
///
/// Faults abort one pixel (written transparent) and increment the render's
/// fault counter; they never abort the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PixelFault {
    #[error("script did not return a value")]
    MissingReturn,

    #[error("script returned a non-array value")]
    InvalidReturnType,

    #[error("expected 3 or 4 channel values, got {0}")]
    ChannelCount(usize),

    #[error("type mismatch: {0}")]
    TypeMismatch(&'static str),

    #[error("call depth limit exceeded")]
    CallDepthExceeded,

    #[error("evaluation step budget exceeded")]
    StepBudgetExceeded,
}

#[derive(Debug, Clone)]
enum Value {
    Num(f64),
    Array(Rc<Vec<Value>>),
}

impl Value {
    fn as_num(&self) -> Result<f64, PixelFault> {
        match self {
            Value::Num(n) => Ok(*n),
            Value::Array(_) => Err(PixelFault::TypeMismatch("expected a number, got an array")),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Array(_) => true,
        }
    }
}

/// Evaluate a program for one pixel. `bands[i]` are the sampled band
/// values of declared input `i`.
pub fn eval_program(
    program: &Program,
    input_names: &[String],
    bands: &[Vec<f64>],
) -> Result<[f64; 4], PixelFault> {
    debug_assert_eq!(input_names.len(), bands.len());

    let mut interp = Interp {
        scopes: Vec::with_capacity(4),
        functions: Vec::with_capacity(4),
        depth: 0,
        steps: STEP_BUDGET,
    };

    // Root scope: each input bound to its band value array
    let root: Vec<(String, Value)> = input_names
        .iter()
        .zip(bands)
        .map(|(name, values)| {
            let array: Vec<Value> = values.iter().map(|v| Value::Num(*v)).collect();
            (name.clone(), Value::Array(Rc::new(array)))
        })
        .collect();
    interp.scopes.push(root);

    let returned = interp.exec_block(&program.body)?;
    let value = returned.ok_or(PixelFault::MissingReturn)?;

    let channels = match value {
        Value::Array(elements) => elements,
        Value::Num(_) => return Err(PixelFault::InvalidReturnType),
    };
    if channels.len() != 3 && channels.len() != 4 {
        return Err(PixelFault::ChannelCount(channels.len()));
    }

    let mut out = [0.0, 0.0, 0.0, 255.0];
    for (i, channel) in channels.iter().enumerate() {
        out[i] = channel.as_num()?;
    }
    Ok(out)
}

type Scope = Vec<(String, Value)>;

struct Interp<'a> {
    scopes: Vec<Scope>,
    /// One function table per active block, innermost last.
    functions: Vec<HashMap<&'a str, (&'a [String], &'a [Stmt])>>,
    depth: u32,
    steps: u32,
}

impl<'a> Interp<'a> {
    fn exec_block(&mut self, body: &'a [Stmt]) -> Result<Option<Value>, PixelFault> {
        // Hoist this block's function declarations
        let mut table: HashMap<&str, (&[String], &[Stmt])> = HashMap::new();
        for stmt in body {
            if let Stmt::Function { name, params, body } = stmt {
                table.insert(name.as_str(), (params.as_slice(), body.as_slice()));
            }
        }
        self.functions.push(table);

        let result = self.exec_statements(body);
        self.functions.pop();
        result
    }

    fn exec_statements(&mut self, body: &'a [Stmt]) -> Result<Option<Value>, PixelFault> {
        for stmt in body {
            self.charge_step()?;
            match stmt {
                Stmt::Let {
                    names,
                    destructure,
                    value,
                } => {
                    let value = self.eval_expr(value)?;
                    if *destructure {
                        let elements = match &value {
                            Value::Array(elements) => Rc::clone(elements),
                            Value::Num(_) => {
                                return Err(PixelFault::TypeMismatch(
                                    "cannot destructure a number",
                                ))
                            }
                        };
                        for (i, name) in names.iter().enumerate() {
                            let bound = elements.get(i).cloned().unwrap_or(Value::Num(f64::NAN));
                            self.bind(name.clone(), bound);
                        }
                    } else {
                        self.bind(names[0].clone(), value);
                    }
                }
                Stmt::Function { .. } => {} // hoisted at block entry
                Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                } => {
                    let taken = if self.eval_expr(cond)?.truthy() {
                        Some(then_branch)
                    } else {
                        else_branch.as_ref()
                    };
                    if let Some(branch) = taken {
                        self.scopes.push(Vec::new());
                        let result = self.exec_block(branch);
                        self.scopes.pop();
                        if let Some(value) = result? {
                            return Ok(Some(value));
                        }
                    }
                }
                Stmt::Return(value) => return Ok(Some(self.eval_expr(value)?)),
            }
        }
        Ok(None)
    }

    fn eval_expr(&mut self, expr: &'a Expr) -> Result<Value, PixelFault> {
        self.charge_step()?;
        match expr {
            Expr::Number(n) => Ok(Value::Num(*n)),
            // The static pass guarantees resolution at the declaration
            // site; anything slipping through degrades to NaN, like the
            // undefined coercion the scripts' JS heritage implies
            Expr::Ident(name) => Ok(self.lookup(name).unwrap_or(Value::Num(f64::NAN))),
            Expr::Array(elements) => {
                let values: Result<Vec<Value>, PixelFault> =
                    elements.iter().map(|e| self.eval_expr(e)).collect();
                Ok(Value::Array(Rc::new(values?)))
            }
            Expr::Index(base, index) => {
                let base = self.eval_expr(base)?;
                let index = self.eval_expr(index)?.as_num()?;
                match base {
                    Value::Array(elements) => {
                        if index.fract() == 0.0 && index >= 0.0 && (index as usize) < elements.len()
                        {
                            Ok(elements[index as usize].clone())
                        } else {
                            // Out-of-range / fractional index: NaN, not a fault
                            Ok(Value::Num(f64::NAN))
                        }
                    }
                    Value::Num(_) => Err(PixelFault::TypeMismatch("cannot index a number")),
                }
            }
            Expr::Call(name, args) => self.eval_call(name, args),
            Expr::Unary(op, operand) => {
                let operand = self.eval_expr(operand)?;
                match op {
                    UnaryOp::Neg => Ok(Value::Num(-operand.as_num()?)),
                    UnaryOp::Not => Ok(Value::Num(if operand.truthy() { 0.0 } else { 1.0 })),
                }
            }
            Expr::Binary(op, left, right) => {
                // Short-circuit logic first
                match op {
                    BinaryOp::And => {
                        let left = self.eval_expr(left)?;
                        if !left.truthy() {
                            return Ok(Value::Num(0.0));
                        }
                        return Ok(Value::Num(if self.eval_expr(right)?.truthy() {
                            1.0
                        } else {
                            0.0
                        }));
                    }
                    BinaryOp::Or => {
                        let left = self.eval_expr(left)?;
                        if left.truthy() {
                            return Ok(Value::Num(1.0));
                        }
                        return Ok(Value::Num(if self.eval_expr(right)?.truthy() {
                            1.0
                        } else {
                            0.0
                        }));
                    }
                    _ => {}
                }
                let left = self.eval_expr(left)?.as_num()?;
                let right = self.eval_expr(right)?.as_num()?;
                let value = match op {
                    BinaryOp::Add => left + right,
                    BinaryOp::Sub => left - right,
                    BinaryOp::Mul => left * right,
                    // Division by zero propagates as inf/NaN by design
                    BinaryOp::Div => left / right,
                    BinaryOp::Rem => left % right,
                    BinaryOp::Lt => bool_num(left < right),
                    BinaryOp::Le => bool_num(left <= right),
                    BinaryOp::Gt => bool_num(left > right),
                    BinaryOp::Ge => bool_num(left >= right),
                    BinaryOp::Eq => bool_num(left == right),
                    BinaryOp::Ne => bool_num(left != right),
                    BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
                };
                Ok(Value::Num(value))
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if self.eval_expr(cond)?.truthy() {
                    self.eval_expr(then)
                } else {
                    self.eval_expr(otherwise)
                }
            }
        }
    }

    fn eval_call(&mut self, name: &str, args: &'a [Expr]) -> Result<Value, PixelFault> {
        // User functions shadow nothing: the static pass rejects scripts
        // that reuse builtin names
        if let Some((params, body)) = self.lookup_function(name) {
            if self.depth >= MAX_CALL_DEPTH {
                return Err(PixelFault::CallDepthExceeded);
            }
            let mut frame: Scope = Vec::with_capacity(params.len());
            for (i, param) in params.iter().enumerate() {
                let value = match args.get(i) {
                    Some(arg) => self.eval_expr(arg)?,
                    None => Value::Num(f64::NAN), // missing argument
                };
                frame.push((param.clone(), value));
            }
            self.depth += 1;
            self.scopes.push(frame);
            let result = self.exec_block(body);
            self.scopes.pop();
            self.depth -= 1;
            return result?.ok_or(PixelFault::MissingReturn);
        }

        // Builtins: evaluate arguments, missing ones are NaN
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg)?);
        }
        let num = |i: usize| -> Result<f64, PixelFault> {
            values.get(i).map_or(Ok(f64::NAN), |v| v.as_num())
        };
        let result = match name {
            "min" => num(0)?.min(num(1)?),
            "max" => num(0)?.max(num(1)?),
            "abs" => num(0)?.abs(),
            "floor" => num(0)?.floor(),
            "ceil" => num(0)?.ceil(),
            "round" => num(0)?.round(),
            "sqrt" => num(0)?.sqrt(),
            "pow" => num(0)?.powf(num(1)?),
            "exp" => num(0)?.exp(),
            "log" => num(0)?.ln(),
            "sin" => num(0)?.sin(),
            "cos" => num(0)?.cos(),
            "clamp" => num(0)?.clamp(num(1)?, num(2)?),
            "len" => match values.first() {
                Some(Value::Array(elements)) => elements.len() as f64,
                _ => f64::NAN,
            },
            // The static pass rejects unknown calls
            _ => f64::NAN,
        };
        Ok(Value::Num(result))
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some((_, value)) = scope.iter().rev().find(|(n, _)| n == name) {
                return Some(value.clone());
            }
        }
        None
    }

    fn lookup_function(&self, name: &str) -> Option<(&'a [String], &'a [Stmt])> {
        self.functions
            .iter()
            .rev()
            .find_map(|table| table.get(name).copied())
    }

    fn bind(&mut self, name: String, value: Value) {
        self.scopes
            .last_mut()
            .expect("scope stack never empty")
            .push((name, value));
    }

    fn charge_step(&mut self) -> Result<(), PixelFault> {
        if self.steps == 0 {
            return Err(PixelFault::StepBudgetExceeded);
        }
        self.steps -= 1;
        Ok(())
    }
}

fn bool_num(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
