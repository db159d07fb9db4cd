//! Runtime values and the feature-mask bit set for the host sublanguage.

use super::ast::FunctionDef;
use std::fmt;
use std::sync::Arc;

/// A runtime value in the host sublanguage. Reference-counted variants use
/// `Arc` (not `Rc`) because routines execute on a dedicated thread and
/// values cross that boundary over a channel.
#[derive(Clone)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<Value>),
    NativeFn(Arc<dyn Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync>),
    Closure(Arc<FunctionDef>),
}

impl Value {
    /// Python-style type name, matching spec's bit-exact
    /// `TypeMismatch` message surface.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "str",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::None => "NoneType",
            Value::List(_) => "list",
            Value::NativeFn(_) => "builtin_function_or_method",
            Value::Closure(_) => "function",
        }
    }

    pub fn is_str(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Str(s) => !s.is_empty(),
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Bool(b) => *b,
            Value::None => false,
            Value::List(items) => !items.is_empty(),
            Value::NativeFn(_) | Value::Closure(_) => true,
        }
    }

    /// `str(value)` equivalent, used for `%`-formatting and as the default
    /// string caster when no `__cast_string__` hook is bound.
    pub fn display_string(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Value::None => "None".to_string(),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr_string).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::NativeFn(_) => "<built-in function>".to_string(),
            Value::Closure(c) => format!("<function {}>", c.name),
        }
    }

    fn repr_string(&self) -> String {
        match self {
            Value::Str(s) => format!("'{s}'"),
            other => other.display_string(),
        }
    }
}

fn format_float(f: f64) -> String {
    if f == f.trunc() && f.is_finite() {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_string())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::None, Value::None) => true,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

/// An error raised while evaluating host code, carrying a Python-style
/// exception type name so `except NameError:`-style clauses can match on it.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub type_name: String,
    pub message: String,
    pub host_line: Option<usize>,
}

impl RuntimeError {
    pub fn simple(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError {
            type_name: type_name.into(),
            message: message.into(),
            host_line: None,
        }
    }

    pub fn type_mismatch(type_name: &str) -> Self {
        RuntimeError::simple(
            "TypeError",
            format!("Can't convert '{type_name}' object to str implicitly"),
        )
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// Bitwise-ORed engine feature flags, activated per-template by an
/// `import`-shaped declaration in the first executable embedded script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureMask(u8);

impl FeatureMask {
    pub const NONE: FeatureMask = FeatureMask(0);
    pub const CAST_STRING: FeatureMask = FeatureMask(1 << 0);
    pub const EXCEPT_HOOK: FeatureMask = FeatureMask(1 << 1);

    pub fn contains(self, other: FeatureMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for FeatureMask {
    type Output = FeatureMask;
    fn bitor(self, rhs: Self) -> Self {
        FeatureMask(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for FeatureMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
