//! The tagged value model for the kit scripting language.
//!
//! Values are a closed sum over the eight runtime kinds. Containers are
//! reference counted; the evaluator is single threaded so interior
//! mutability goes through `RefCell`. Host functions are adapted through the
//! explicit [`Value::fn0`]/[`Value::fn1`] constructors rather than any kind
//! of reflection.

use std::cell::RefCell;
use std::fmt;
use std::io::Read;
use std::rc::Rc;

use indexmap::IndexMap;

use super::error::RuntimeError;

pub type EvalResult = Result<Value, RuntimeError>;

/// Opaque host handle attached to an object, usable as a byte reader by the
/// archive and compression bindings.
pub type Binding = Rc<RefCell<dyn Read>>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Number(f64),
    Bool(bool),
    Str(Rc<str>),
    List(Rc<List>),
    Object(Rc<Object>),
    Function(Rc<Function>),
    Interface(Rc<Interface>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Number,
    String,
    Bool,
    Nil,
    List,
    Object,
    Function,
    Interface,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Number => "number",
            Kind::String => "string",
            Kind::Bool => "bool",
            Kind::Nil => "nil",
            Kind::List => "list",
            Kind::Object => "object",
            Kind::Function => "function",
            Kind::Interface => "interface",
        })
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(l) => write!(f, "List(len={})", l.len()),
            Value::Object(_) => write!(f, "Object"),
            Value::Function(_) => write!(f, "Function"),
            Value::Interface(i) => write!(f, "Interface({})", i.name()),
        }
    }
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(List { items }))
    }

    /// Adapts a nullary host function into a script function.
    pub fn fn0(f: impl Fn() -> EvalResult + 'static) -> Value {
        Value::Function(Rc::new(Function {
            arity: 0,
            f: Box::new(move |_| f()),
        }))
    }

    /// Adapts a unary host function into a script function.
    pub fn fn1(f: impl Fn(Value) -> EvalResult + 'static) -> Value {
        Value::Function(Rc::new(Function {
            arity: 1,
            f: Box::new(move |arg| f(arg.expect("arity checked by Function::call"))),
        }))
    }

    pub fn kind(&self) -> Kind {
        match self {
            Value::Nil => Kind::Nil,
            Value::Number(_) => Kind::Number,
            Value::Bool(_) => Kind::Bool,
            Value::Str(_) => Kind::String,
            Value::List(_) => Kind::List,
            Value::Object(_) => Kind::Object,
            Value::Function(_) => Kind::Function,
            Value::Interface(_) => Kind::Interface,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<List>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<Object>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_interface(&self) -> Option<&Rc<Interface>> {
        match self {
            Value::Interface(i) => Some(i),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Calls the value with zero or one argument.
    pub fn call(&self, arg: Option<Value>) -> EvalResult {
        match self {
            Value::Function(f) => f.call(arg),
            other => Err(RuntimeError::new(format!(
                "value of kind {} is not callable",
                other.kind()
            ))),
        }
    }

    /// Key access. Strings and lists expose their built-in methods, objects
    /// their entries (absent keys read as nil). Other kinds do not support
    /// key access.
    pub fn get(&self, key: &str) -> EvalResult {
        match self {
            Value::Str(s) => Ok(string_key(s, key)),
            Value::List(l) => Ok(list_key(l, key)),
            Value::Object(o) => Ok(o.get(key)),
            other => Err(RuntimeError::new(format!(
                "cannot read key \"{key}\" of {} value",
                other.kind()
            ))),
        }
    }

    /// 0-based index access, valid for lists.
    pub fn index(&self, idx: usize) -> EvalResult {
        match self {
            Value::List(l) => l.items.get(idx).cloned().ok_or_else(|| {
                RuntimeError::new(format!(
                    "index {idx} is out of bounds for list of length {}",
                    l.items.len()
                ))
            }),
            other => Err(RuntimeError::new(format!(
                "cannot index value of kind {}",
                other.kind()
            ))),
        }
    }

    /// Equality is only defined between values of the same kind.
    pub fn equals(&self, other: &Value) -> Result<bool, RuntimeError> {
        if self.kind() != other.kind() {
            return Err(RuntimeError::new(format!(
                "cannot compare values of kind {} and {}",
                self.kind(),
                other.kind()
            )));
        }
        Ok(match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if a.items.len() != b.items.len() {
                    return Ok(false);
                }
                for (x, y) in a.items.iter().zip(b.items.iter()) {
                    if x.kind() != y.kind() || !x.equals(y)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Value::Object(a), Value::Object(b)) => {
                let ae = a.entries.borrow();
                let be = b.entries.borrow();
                if ae.len() != be.len() {
                    return Ok(false);
                }
                for (k, x) in ae.iter() {
                    let Some(y) = be.get(k) else {
                        return Ok(false);
                    };
                    if x.kind() != y.kind() || !x.equals(y)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Interface(a), Value::Interface(b)) => Rc::ptr_eq(a, b),
            _ => unreachable!("kinds checked above"),
        })
    }

    /// Converts the value to its string form: strings are themselves,
    /// objects may provide a callable `to_string`, everything else renders a
    /// default representation.
    pub fn stringify(&self) -> Result<Rc<str>, RuntimeError> {
        match self {
            Value::Str(s) => Ok(s.clone()),
            Value::Number(n) => Ok(Rc::from(fmt_number(*n).as_str())),
            Value::Bool(b) => Ok(Rc::from(if *b { "true" } else { "false" })),
            Value::Nil => Ok(Rc::from("nil")),
            Value::Object(o) => {
                let to_string = o.get("to_string");
                if to_string.is_callable() {
                    let rendered = to_string.call(None)?;
                    match rendered {
                        Value::Str(s) => Ok(s),
                        other => Err(RuntimeError::new(format!(
                            "to_string returned {} instead of string",
                            other.kind()
                        ))),
                    }
                } else {
                    Ok(Rc::from("object"))
                }
            }
            other => Ok(Rc::from(other.kind().to_string().as_str())),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

/// Formats a number the way the language prints it: integral doubles render
/// without a fraction.
pub fn fmt_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// A script function: a host-callable closure of arity zero or one.
pub struct Function {
    arity: u8,
    #[allow(clippy::type_complexity)]
    f: Box<dyn Fn(Option<Value>) -> EvalResult>,
}

impl Function {
    pub fn call(&self, arg: Option<Value>) -> EvalResult {
        match (self.arity, &arg) {
            (0, None) => (self.f)(None),
            (1, Some(_)) => (self.f)(arg),
            (arity, _) => Err(RuntimeError::new(format!(
                "function takes {} argument{} but was called with {}",
                arity,
                if arity == 1 { "" } else { "s" },
                if arg.is_some() { 1 } else { 0 }
            ))),
        }
    }
}

/// A fixed-length vector of values.
pub struct List {
    items: Vec<Value>,
}

impl List {
    pub fn new(items: Vec<Value>) -> Rc<List> {
        Rc::new(List { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }
}

fn list_key(list: &Rc<List>, key: &str) -> Value {
    match key {
        "length" => Value::Number(list.len() as f64),
        "map" => {
            let list = list.clone();
            Value::fn1(move |f| {
                let mut mapped = Vec::with_capacity(list.len());
                for item in &list.items {
                    mapped.push(f.call(Some(item.clone()))?);
                }
                Ok(Value::List(List::new(mapped)))
            })
        }
        "filter" => {
            let list = list.clone();
            Value::fn1(move |f| {
                let mut kept = Vec::new();
                for item in &list.items {
                    let keep = f.call(Some(item.clone()))?;
                    match keep.as_bool() {
                        Some(true) => kept.push(item.clone()),
                        Some(false) => {}
                        None => {
                            return Err(RuntimeError::type_error("filter predicate", Kind::Bool))
                        }
                    }
                }
                Ok(Value::List(List::new(kept)))
            })
        }
        "slice" => {
            let list = list.clone();
            Value::fn1(move |range| {
                let Some(obj) = range.as_object() else {
                    return Err(RuntimeError::type_error("slice", Kind::Object));
                };
                let start = slice_bound(obj.get("start"), 0, "start")?;
                let end = slice_bound(obj.get("end"), list.len(), "end")?;
                let start = start.min(list.len());
                let end = end.clamp(start, list.len());
                Ok(Value::List(List::new(list.items[start..end].to_vec())))
            })
        }
        _ => Value::Nil,
    }
}

fn slice_bound(v: Value, default: usize, name: &str) -> Result<usize, RuntimeError> {
    match v {
        Value::Nil => Ok(default),
        Value::Number(n) if n.trunc() == n && n >= 0.0 => Ok(n as usize),
        _ => Err(RuntimeError::new(format!(
            "slice {name} must be a non-negative integer"
        ))),
    }
}

fn string_key(s: &Rc<str>, key: &str) -> Value {
    match key {
        "trim_whitespace" => {
            let s = s.clone();
            Value::fn0(move || Ok(Value::string(s.trim())))
        }
        "split" => {
            let s = s.clone();
            Value::fn1(move |sep| {
                let Some(sep) = sep.as_str() else {
                    return Err(RuntimeError::type_error("split", Kind::String));
                };
                Ok(Value::list(
                    s.split(sep).map(Value::string).collect::<Vec<_>>(),
                ))
            })
        }
        "starts_with" => {
            let s = s.clone();
            Value::fn1(move |prefix| {
                let Some(prefix) = prefix.as_str() else {
                    return Err(RuntimeError::type_error("starts_with", Kind::String));
                };
                Ok(Value::Bool(s.starts_with(prefix)))
            })
        }
        "ends_with" => {
            let s = s.clone();
            Value::fn1(move |suffix| {
                let Some(suffix) = suffix.as_str() else {
                    return Err(RuntimeError::type_error("ends_with", Kind::String));
                };
                Ok(Value::Bool(s.ends_with(suffix)))
            })
        }
        "remove_prefix" => {
            let s = s.clone();
            Value::fn1(move |prefix| {
                let Some(prefix) = prefix.as_str() else {
                    return Err(RuntimeError::type_error("remove_prefix", Kind::String));
                };
                Ok(Value::string(s.strip_prefix(prefix).unwrap_or(&s)))
            })
        }
        "remove_suffix" => {
            let s = s.clone();
            Value::fn1(move |suffix| {
                let Some(suffix) = suffix.as_str() else {
                    return Err(RuntimeError::type_error("remove_suffix", Kind::String));
                };
                Ok(Value::string(s.strip_suffix(suffix).unwrap_or(&s)))
            })
        }
        // Cuts up to and including the first occurrence of the separator.
        "inclusive_remove_until" => {
            let s = s.clone();
            Value::fn1(move |sep| {
                let Some(sep) = sep.as_str() else {
                    return Err(RuntimeError::type_error("inclusive_remove_until", Kind::String));
                };
                let cut = match s.find(sep) {
                    Some(idx) => &s[idx + sep.len()..],
                    None => "",
                };
                Ok(Value::string(cut))
            })
        }
        // Cuts from the last occurrence of the separator onwards.
        "inclusive_remove_after" => {
            let s = s.clone();
            Value::fn1(move |sep| {
                let Some(sep) = sep.as_str() else {
                    return Err(RuntimeError::type_error("inclusive_remove_after", Kind::String));
                };
                let cut = match s.rfind(sep) {
                    Some(idx) => &s[..idx],
                    None => &s[..],
                };
                Ok(Value::string(cut))
            })
        }
        _ => Value::Nil,
    }
}

/// An ordered map of string keys to values, with an optional host binding
/// and a set of interface tags.
#[derive(Default)]
pub struct Object {
    entries: RefCell<IndexMap<String, Value>>,
    binding: RefCell<Option<Binding>>,
    tags: RefCell<Vec<Rc<Interface>>>,
}

impl Object {
    pub fn new() -> Object {
        Object::default()
    }

    pub fn from_map(entries: IndexMap<String, Value>) -> Object {
        Object {
            entries: RefCell::new(entries),
            ..Object::default()
        }
    }

    pub fn val(self) -> Value {
        Value::Object(Rc::new(self))
    }

    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.entries.borrow_mut().insert(key.into(), value);
    }

    /// Returns the entry, distinguishing an absent key from a nil value.
    pub fn try_get(&self, key: &str) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn get(&self, key: &str) -> Value {
        self.try_get(key).unwrap_or(Value::Nil)
    }

    pub fn get_string(&self, key: &str) -> Result<String, RuntimeError> {
        match self.try_get(key) {
            None => Err(RuntimeError::new(format!(
                "key does not exist: looking for string value called \"{key}\""
            ))),
            Some(Value::Str(s)) => Ok(s.to_string()),
            Some(other) => Err(RuntimeError::new(format!(
                "expected string value called \"{key}\" is of type {}",
                other.kind()
            ))),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    pub fn set_binding(&self, binding: Binding) {
        *self.binding.borrow_mut() = Some(binding);
    }

    pub fn binding(&self) -> Option<Binding> {
        self.binding.borrow().clone()
    }

    pub fn tag_interface(&self, iface: &Rc<Interface>) {
        let mut tags = self.tags.borrow_mut();
        if !tags.iter().any(|t| Rc::ptr_eq(t, iface)) {
            tags.push(iface.clone());
        }
    }

    pub fn implements(&self, iface: &Rc<Interface>) -> bool {
        self.tags.borrow().iter().any(|t| Rc::ptr_eq(t, iface))
    }
}

/// A declared structural type: required fields with optional kind
/// constraints and required method names.
pub struct Interface {
    name: String,
    fields: Vec<(String, Option<Kind>)>,
    methods: Vec<String>,
}

impl Interface {
    pub fn new(
        name: impl Into<String>,
        fields: Vec<(String, Option<Kind>)>,
        methods: Vec<String>,
    ) -> Rc<Interface> {
        Rc::new(Interface {
            name: name.into(),
            fields,
            methods,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks that the object satisfies this interface. Tagging is only
    /// permitted after this check passes.
    pub fn validate(&self, obj: &Object) -> Result<(), RuntimeError> {
        for (field, kind) in &self.fields {
            let Some(v) = obj.try_get(field) else {
                return Err(RuntimeError::new(format!(
                    "object does not satisfy interface {}: missing field {field}",
                    self.name
                )));
            };
            if let Some(kind) = kind {
                if v.kind() != *kind {
                    return Err(RuntimeError::new(format!(
                        "object does not satisfy interface {}: field {field} expected {kind} but got {}",
                        self.name,
                        v.kind()
                    )));
                }
            }
        }
        for method in &self.methods {
            match obj.try_get(method) {
                None => {
                    return Err(RuntimeError::new(format!(
                        "object does not satisfy interface {}: missing method {method}",
                        self.name
                    )))
                }
                Some(v) if !v.is_callable() => {
                    return Err(RuntimeError::new(format!(
                        "object does not satisfy interface {}: method {method} is not callable",
                        self.name
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
