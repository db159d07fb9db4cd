//! Tree-walking evaluator for the host sublanguage.
//!
//! Runs inside the dedicated thread a [`super::routine::RoutineHandle`]
//! spawns. Suspension at a `yield` is implemented by blocking on a channel
//! recv from within the middle of the Rust call stack — the same trick that
//! makes native OS threads usable as generators without unsafe code.

use super::ast::*;
use super::routine::{Produced, Resume, SharedEnv};
use super::value::{FeatureMask, RuntimeError, Value};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};

pub enum ExecSignal {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interp {
    locals: HashMap<String, Value>,
    globals: SharedEnv,
    features: FeatureMask,
    current_exception: Option<RuntimeError>,
    result_tx: Sender<Produced>,
    resume_rx: Receiver<Resume>,
}

impl Interp {
    pub fn new(
        globals: SharedEnv,
        features: FeatureMask,
        result_tx: Sender<Produced>,
        resume_rx: Receiver<Resume>,
    ) -> Self {
        Interp {
            locals: HashMap::new(),
            globals,
            features,
            current_exception: None,
            result_tx,
            resume_rx,
        }
    }

    pub fn run(&mut self, program: &[Stmt]) -> Result<(), RuntimeError> {
        self.exec_block(program).map(|_| ())
    }

    fn exec_block(&mut self, block: &[Stmt]) -> Result<ExecSignal, RuntimeError> {
        for stmt in block {
            match self.exec_stmt(stmt) {
                Ok(ExecSignal::Normal) => continue,
                Ok(other) => return Ok(other),
                Err(mut e) => {
                    if e.host_line.is_none() {
                        e.host_line = Some(stmt.line);
                    }
                    return Err(e);
                }
            }
        }
        Ok(ExecSignal::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<ExecSignal, RuntimeError> {
        match &stmt.kind {
            StmtKind::Assign(name, expr) => {
                let v = self.eval(expr)?;
                self.locals.insert(name.clone(), v);
                Ok(ExecSignal::Normal)
            }
            StmtKind::ExprStmt(expr) => {
                self.eval(expr)?;
                Ok(ExecSignal::Normal)
            }
            StmtKind::Yield(expr) => {
                let mut value = self.eval(expr)?;
                if self.features.contains(FeatureMask::CAST_STRING) && !value.is_str() {
                    value = self.resolve_cast_string(value)?;
                }
                self.yield_value(value)?;
                Ok(ExecSignal::Normal)
            }
            StmtKind::If(branches, else_body) => {
                for (cond, body) in branches {
                    if self.eval(cond)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                match else_body {
                    Some(body) => self.exec_block(body),
                    None => Ok(ExecSignal::Normal),
                }
            }
            StmtKind::For(var, iter_expr, body) => {
                let iter_val = self.eval(iter_expr)?;
                let items = match iter_val {
                    Value::List(items) => items,
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    other => {
                        return Err(RuntimeError::simple(
                            "TypeError",
                            format!("'{}' object is not iterable", other.type_name()),
                        ))
                    }
                };
                for item in items {
                    self.locals.insert(var.clone(), item);
                    match self.exec_block(body)? {
                        ExecSignal::Break => break,
                        ExecSignal::Continue => continue,
                        ExecSignal::Return(v) => return Ok(ExecSignal::Return(v)),
                        ExecSignal::Normal => {}
                    }
                }
                Ok(ExecSignal::Normal)
            }
            StmtKind::While(cond, body) => {
                while self.eval(cond)?.truthy() {
                    match self.exec_block(body)? {
                        ExecSignal::Break => break,
                        ExecSignal::Continue => continue,
                        ExecSignal::Return(v) => return Ok(ExecSignal::Return(v)),
                        ExecSignal::Normal => {}
                    }
                }
                Ok(ExecSignal::Normal)
            }
            StmtKind::Try(body, handlers, finally) => {
                let mut result = self.exec_block(body);
                if let Err(err) = result {
                    let mut handled = None;
                    for h in handlers {
                        if exception_matches(&h.exc_name, &err) {
                            let prev = self.current_exception.replace(err.clone());
                            let r = self.exec_block(&h.body);
                            self.current_exception = prev;
                            handled = Some(r);
                            break;
                        }
                    }
                    result = handled.unwrap_or(Err(err));
                }
                if let Some(fin) = finally {
                    let fin_signal = self.exec_block(fin)?;
                    if !matches!(fin_signal, ExecSignal::Normal) {
                        return Ok(fin_signal);
                    }
                }
                result
            }
            StmtKind::FunctionDef(def) => {
                self.locals.insert(def.name.clone(), Value::Closure(def.clone()));
                Ok(ExecSignal::Normal)
            }
            StmtKind::Return(expr) => {
                let v = match expr {
                    Some(e) => self.eval(e)?,
                    None => Value::None,
                };
                Ok(ExecSignal::Return(v))
            }
            StmtKind::Import(_, _) => Ok(ExecSignal::Normal),
            StmtKind::Pass => Ok(ExecSignal::Normal),
            StmtKind::Break => Ok(ExecSignal::Break),
            StmtKind::Continue => Ok(ExecSignal::Continue),
        }
    }

    fn yield_value(&mut self, v: Value) -> Result<(), RuntimeError> {
        if self.result_tx.send(Produced::Yielded(v)).is_err() {
            return Err(RuntimeError::simple("StopIteration", "consumer dropped"));
        }
        match self.resume_rx.recv() {
            Ok(Resume::Next) => Ok(()),
            Ok(Resume::Throw(err)) => Err(err),
            Err(_) => Err(RuntimeError::simple("GeneratorExit", "routine closed")),
        }
    }

    fn resolve_cast_string(&mut self, value: Value) -> Result<Value, RuntimeError> {
        if let Some(f) = self.locals.get("__cast_string__").cloned() {
            return self.call_value(f, vec![value]);
        }
        let global_hook = self.globals.lock().unwrap().get("__cast_string__").cloned();
        if let Some(f) = global_hook {
            return self.call_value(f, vec![value]);
        }
        Ok(Value::Str(value.display_string()))
    }

    fn dispatch_except_hook(&mut self) -> Result<Value, RuntimeError> {
        let exc = self
            .current_exception
            .clone()
            .unwrap_or_else(|| RuntimeError::simple("Exception", ""));
        let args = vec![
            Value::Str(exc.type_name.clone()),
            Value::Str(exc.message.clone()),
            Value::None,
        ];
        if let Some(f) = self.locals.get("__except_hook__").cloned() {
            return self.call_value(f, args);
        }
        let global_hook = self.globals.lock().unwrap().get("__except_hook__").cloned();
        if let Some(f) = global_hook {
            return self.call_value(f, args);
        }
        Ok(Value::Str(exc.message))
    }

    fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match callee {
            Value::NativeFn(f) => f(&args),
            Value::Closure(def) => {
                let mut locals = HashMap::new();
                for (p, a) in def.params.iter().zip(args.into_iter()) {
                    locals.insert(p.clone(), a);
                }
                let saved = std::mem::replace(&mut self.locals, locals);
                let result = self.exec_block(&def.body);
                self.locals = saved;
                match result? {
                    ExecSignal::Return(v) => Ok(v),
                    _ => Ok(Value::None),
                }
            }
            other => Err(RuntimeError::simple(
                "TypeError",
                format!("'{}' object is not callable", other.type_name()),
            )),
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, RuntimeError> {
        if let Some(v) = self.locals.get(name) {
            return Ok(v.clone());
        }
        if let Some(v) = self.globals.lock().unwrap().get(name) {
            return Ok(v.clone());
        }
        Err(RuntimeError::simple("NameError", format!("name '{name}' is not defined")))
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::IntLit(v) => Ok(Value::Int(*v)),
            Expr::FloatLit(v) => Ok(Value::Float(*v)),
            Expr::StrLit(s) => Ok(Value::Str(s.clone())),
            Expr::BoolLit(b) => Ok(Value::Bool(*b)),
            Expr::NoneLit => Ok(Value::None),
            Expr::Name(n) => self.lookup(n),
            Expr::Unary(UnaryOp::Not, inner) => Ok(Value::Bool(!self.eval(inner)?.truthy())),
            Expr::Unary(UnaryOp::Neg, inner) => match self.eval(inner)? {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(RuntimeError::simple(
                    "TypeError",
                    format!("bad operand type for unary -: '{}'", other.type_name()),
                )),
            },
            Expr::Binary(op, l, r) => {
                let lv = self.eval(l)?;
                let rv = self.eval(r)?;
                binop(*op, lv, rv)
            }
            Expr::BoolOp(BoolOp::And, l, r) => {
                let lv = self.eval(l)?;
                if !lv.truthy() {
                    Ok(lv)
                } else {
                    self.eval(r)
                }
            }
            Expr::BoolOp(BoolOp::Or, l, r) => {
                let lv = self.eval(l)?;
                if lv.truthy() {
                    Ok(lv)
                } else {
                    self.eval(r)
                }
            }
            Expr::Compare(op, l, r) => {
                let lv = self.eval(l)?;
                let rv = self.eval(r)?;
                Ok(Value::Bool(compare(*op, &lv, &rv)))
            }
            Expr::Call(callee, args) => {
                if let Expr::Name(name) = callee.as_ref() {
                    if name == "__dispatch_except_hook__" {
                        return self.dispatch_except_hook();
                    }
                }
                let callee_val = self.eval(callee)?;
                let mut arg_vals = Vec::with_capacity(args.len());
                for a in args {
                    arg_vals.push(self.eval(a)?);
                }
                self.call_value(callee_val, arg_vals)
            }
            Expr::Index(base, idx) => {
                let base_val = self.eval(base)?;
                let idx_val = self.eval(idx)?;
                index_value(base_val, idx_val)
            }
            Expr::ListLit(items) => {
                let mut out = Vec::with_capacity(items.len());
                for i in items {
                    out.push(self.eval(i)?);
                }
                Ok(Value::List(out))
            }
        }
    }
}

fn exception_matches(name: &Option<String>, err: &RuntimeError) -> bool {
    match name {
        None => true,
        Some(n) => n == "Exception" || n == &err.type_name,
    }
}

fn index_value(base: Value, idx: Value) -> Result<Value, RuntimeError> {
    match (base, idx) {
        (Value::List(items), Value::Int(i)) => {
            let idx = normalize_index(i, items.len())?;
            Ok(items[idx].clone())
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = normalize_index(i, chars.len())?;
            Ok(Value::Str(chars[idx].to_string()))
        }
        (other, _) => Err(RuntimeError::simple(
            "TypeError",
            format!("'{}' object is not subscriptable", other.type_name()),
        )),
    }
}

fn normalize_index(i: i64, len: usize) -> Result<usize, RuntimeError> {
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved as usize >= len {
        return Err(RuntimeError::simple("IndexError", "index out of range"));
    }
    Ok(resolved as usize)
}

fn binop(op: BinOp, l: Value, r: Value) -> Result<Value, RuntimeError> {
    use BinOp::*;
    match (op, l, r) {
        (Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (Add, Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Add, Value::Int(a), Value::Float(b)) | (Add, Value::Float(b), Value::Int(a)) => {
            Ok(Value::Float(a as f64 + b))
        }
        (Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (Add, Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
        (Sub, Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
        (Sub, Value::Int(a), Value::Float(b)) => Ok(Value::Float(a as f64 - b)),
        (Sub, Value::Float(a), Value::Int(b)) => Ok(Value::Float(a - b as f64)),
        (Mul, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
        (Mul, Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
        (Mul, Value::Str(a), Value::Int(b)) => Ok(Value::Str(a.repeat(b.max(0) as usize))),
        (Div, Value::Int(a), Value::Int(b)) => {
            if b == 0 {
                return Err(RuntimeError::simple("ZeroDivisionError", "division by zero"));
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        (Div, Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
        (Mod, Value::Str(fmt), rhs) => Ok(Value::Str(format_percent(&fmt, &rhs))),
        (Mod, Value::Int(a), Value::Int(b)) => {
            if b == 0 {
                return Err(RuntimeError::simple("ZeroDivisionError", "division by zero"));
            }
            Ok(Value::Int(a.rem_euclid(b)))
        }
        (op, l, r) => Err(RuntimeError::simple(
            "TypeError",
            format!(
                "unsupported operand type(s) for {:?}: '{}' and '{}'",
                op,
                l.type_name(),
                r.type_name()
            ),
        )),
    }
}

fn format_percent(fmt: &str, value: &Value) -> String {
    let values: Vec<Value> = match value {
        Value::List(items) => items.clone(),
        other => vec![other.clone()],
    };
    let mut out = String::new();
    let mut it = values.into_iter();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('s') | Some('d') | Some('r') => {
                chars.next();
                let v = it.next().unwrap_or(Value::None);
                out.push_str(&v.display_string());
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }
    out
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> bool {
    use CmpOp::*;
    if matches!(op, Eq) {
        return l == r;
    }
    if matches!(op, Ne) {
        return l != r;
    }
    let ord = match (l, r) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
        _ => None,
    };
    match op {
        Lt => matches!(ord, Some(std::cmp::Ordering::Less)),
        Gt => matches!(ord, Some(std::cmp::Ordering::Greater)),
        Le => matches!(ord, Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)),
        Ge => matches!(ord, Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)),
        Eq | Ne => unreachable!("handled above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::lexer::tokenize;
    use crate::host::parser::parse_program;
    use std::sync::{mpsc, Arc, Mutex};

    fn run_program(src: &str, globals: HashMap<String, Value>, features: FeatureMask) -> Vec<Value> {
        let stmts = parse_program(tokenize(src).unwrap()).unwrap();
        let shared: SharedEnv = Arc::new(Mutex::new(globals));
        let (result_tx, result_rx) = mpsc::channel();
        let (_resume_tx, resume_rx) = mpsc::channel::<Resume>();
        let mut interp = Interp::new(shared, features, result_tx.clone(), resume_rx);
        // drain in a background-free way: run to completion, collecting sent values
        // via a second channel since yield_value would block without a resume
        // sender; tests here avoid yield and just check expression evaluation.
        let _ = interp.run(&stmts);
        drop(result_tx);
        result_rx.try_iter().filter_map(|p| match p {
            Produced::Yielded(v) => Some(v),
            _ => None,
        }).collect()
    }

    #[test]
    fn arithmetic_and_assignment() {
        let out = run_program("x = 1 + 2 * 3\n", HashMap::new(), FeatureMask::NONE);
        assert!(out.is_empty());
    }

    #[test]
    fn percent_formatting() {
        assert_eq!(format_percent("[%s]", &Value::Int(3)), "[3]");
        assert_eq!(
            format_percent("%s and %s", &Value::List(vec![Value::Int(1), Value::Int(2)])),
            "1 and 2"
        );
    }

    #[test]
    fn comparisons() {
        assert!(compare(CmpOp::Lt, &Value::Int(1), &Value::Int(2)));
        assert!(compare(CmpOp::Eq, &Value::Str("a".into()), &Value::Str("a".into())));
    }
}
