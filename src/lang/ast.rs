//! AST nodes, their canonical string form, and the tree-walking evaluator.
//!
//! Every node renders to a canonical form that re-parses to the same shape.
//! Evaluation threads `(Value, RuntimeError)` explicitly; the first error
//! short-circuits to the nearest statement loop.

use std::fmt;
use std::rc::Rc;

use super::env::Environment;
use super::error::RuntimeError;
use super::value::{EvalResult, Interface, Kind, Object, Value};

#[derive(Clone)]
pub enum Node {
    Export(Box<Node>),
    Import(Vec<String>),
    InterfaceDecl {
        name: String,
        fields: Vec<(String, Option<Kind>)>,
        methods: Vec<String>,
    },
    Declaration {
        name: String,
        value: Box<Node>,
    },
    Block {
        body: Vec<Node>,
        is_function_body: bool,
    },
    ObjectLiteral {
        body: Vec<Node>,
    },
    InterfaceInstantiate {
        interface: Box<Node>,
        value: Box<Node>,
    },
    ListLiteral(Vec<Node>),
    Literal(Lit),
    Identifier(String),
    /// String literal composed of literal segments and `${...}` expressions.
    StringParts(Vec<Node>),
    Call {
        f: Box<Node>,
        arg: Option<Box<Node>>,
    },
    KeyAccess {
        value: Box<Node>,
        key: String,
    },
    IndexAccess {
        value: Box<Node>,
        index: Box<Node>,
    },
    Function(Rc<FunctionDef>),
    Return(Box<Node>),
    Throw(Box<Node>),
    If {
        cond: Box<Node>,
        body: Box<Node>,
        else_: Option<Box<Node>>,
    },
    ForIn {
        var: String,
        iterable: Box<Node>,
        body: Box<Node>,
    },
    Equals {
        left: Box<Node>,
        right: Box<Node>,
    },
    Not(Box<Node>),
    Compare {
        op: CmpOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Arith {
        op: ArithOp,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Clone, Debug)]
pub enum Lit {
    Num(f64),
    Str(String),
    Bool(bool),
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    fn symbol(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
            ArithOp::Pow => "**",
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Mod => a % b,
            ArithOp::Pow => a.powf(b),
        }
    }
}

pub struct FunctionDef {
    pub arg: ArgSpec,
    pub body: Node,
}

#[derive(Clone)]
pub enum ArgSpec {
    None,
    Named { name: String, kind: Option<Kind> },
    Destructure(Vec<String>),
}

impl Node {
    pub fn eval(&self, env: &Rc<Environment>) -> EvalResult {
        match self {
            Node::Export(decl) => {
                let v = decl.eval(env)?;
                let Node::Declaration { name, .. } = decl.as_ref() else {
                    return Err(RuntimeError::new("export must wrap a declaration"));
                };
                env.export(name, v.clone());
                Ok(v)
            }

            Node::Import(modules) => {
                for name in modules {
                    env.import(name)?;
                }
                Ok(Value::Nil)
            }

            Node::InterfaceDecl {
                name,
                fields,
                methods,
            } => {
                let iface = Interface::new(name.clone(), fields.clone(), methods.clone());
                let v = Value::Interface(iface);
                env.set_scoped(name, v.clone());
                Ok(v)
            }

            Node::Declaration { name, value } => {
                let v = value.eval(env)?;
                env.set(name, v.clone());
                Ok(v)
            }

            Node::Block {
                body,
                is_function_body,
            } => {
                let child = if *is_function_body {
                    env.function_child()
                } else {
                    env.child()
                };
                child.execute(body)?;
                if *is_function_body {
                    Ok(child.control().return_val.borrow().clone())
                } else {
                    Ok(Value::Nil)
                }
            }

            Node::ObjectLiteral { body } => {
                let child = env.object_child();
                child.execute(body)?;
                Ok(Object::from_map(child.take_vars()).val())
            }

            Node::InterfaceInstantiate { interface, value } => {
                let iface_v = interface.eval(env)?;
                let Some(iface) = iface_v.as_interface() else {
                    return Err(RuntimeError::new(
                        "expected interface value before object literal",
                    ));
                };
                let v = value.eval(env)?;
                let Some(obj) = v.as_object() else {
                    return Err(RuntimeError::new(
                        "expected object value when creating interface instance",
                    ));
                };
                iface.validate(obj)?;
                obj.tag_interface(iface);
                Ok(v.clone())
            }

            Node::ListLiteral(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for el in elements {
                    items.push(el.eval(env)?);
                }
                Ok(Value::list(items))
            }

            Node::Literal(lit) => Ok(match lit {
                Lit::Num(n) => Value::Number(*n),
                Lit::Str(s) => Value::string(s),
                Lit::Bool(b) => Value::Bool(*b),
            }),

            Node::Identifier(name) => env.get(name),

            Node::StringParts(parts) => {
                if parts.len() == 1 {
                    let v = parts[0].eval(env)?;
                    return Ok(Value::Str(v.stringify()?));
                }
                let mut out = String::new();
                for part in parts {
                    let v = part.eval(env)?;
                    out.push_str(&v.stringify()?);
                }
                Ok(Value::string(out))
            }

            Node::Call { f, arg } => {
                let fv = f.eval(env)?;
                match arg {
                    None => fv.call(None),
                    Some(arg) => {
                        let argv = arg.eval(env)?;
                        fv.call(Some(argv))
                    }
                }
            }

            Node::KeyAccess { value, key } => {
                let v = value.eval(env)?;
                v.get(key)
            }

            Node::IndexAccess { value, index } => {
                let v = value.eval(env)?;
                let idx = index.eval(env)?;
                let Some(n) = idx.as_number() else {
                    return Err(RuntimeError::new("index value must be a number"));
                };
                if n.trunc() != n || n < 0.0 {
                    return Err(RuntimeError::new("index value must be a valid integer"));
                }
                v.index(n as usize)
            }

            Node::Function(def) => Ok(eval_function(def, env)),

            Node::Return(value) => {
                let v = value.eval(env)?;
                env.do_return(v.clone())?;
                Ok(v)
            }

            Node::Throw(value) => {
                let v = value.eval(env)?;
                let error_iface = super::stdlib::error_interface();
                let message = v
                    .as_object()
                    .filter(|obj| obj.implements(&error_iface))
                    .and_then(|obj| obj.get("message").as_str().map(str::to_string));
                match message {
                    Some(message) => Err(RuntimeError::new(message)),
                    None => Err(RuntimeError::new(
                        "throw argument must be an instance of Error",
                    )),
                }
            }

            Node::If { cond, body, else_ } => {
                let c = cond.eval(env)?;
                let Some(c) = c.as_bool() else {
                    return Err(RuntimeError::new("expected boolean type for if condition"));
                };
                if c {
                    body.eval(env)
                } else if let Some(else_) = else_ {
                    else_.eval(env)
                } else {
                    Ok(Value::Nil)
                }
            }

            Node::ForIn {
                var,
                iterable,
                body,
            } => {
                let v = iterable.eval(env)?;
                let Some(list) = v.as_list() else {
                    return Err(RuntimeError::type_error(
                        &format!("for {var} in ?"),
                        Kind::List,
                    ));
                };
                for item in list.items() {
                    let scope = env.child();
                    scope.set_scoped(var, item.clone());
                    body.eval(&scope)?;
                    if scope.control().returned.get() {
                        break;
                    }
                }
                Ok(Value::Nil)
            }

            Node::Equals { left, right } => {
                let l = left.eval(env)?;
                let r = right.eval(env)?;
                Ok(Value::Bool(l.equals(&r)?))
            }

            Node::Not(inner) => {
                let v = inner.eval(env)?;
                let Some(b) = v.as_bool() else {
                    return Err(RuntimeError::type_error("! (not)", Kind::Bool));
                };
                Ok(Value::Bool(!b))
            }

            Node::Compare { op, left, right } => {
                let l = left.eval(env)?;
                let Some(l) = l.as_number() else {
                    return Err(RuntimeError::type_error(op.symbol(), Kind::Number));
                };
                let r = right.eval(env)?;
                let Some(r) = r.as_number() else {
                    return Err(RuntimeError::type_error(op.symbol(), Kind::Number));
                };
                let b = match op {
                    CmpOp::Lt => l < r,
                    CmpOp::Le => l <= r,
                    CmpOp::Gt => l > r,
                    CmpOp::Ge => l >= r,
                };
                Ok(Value::Bool(b))
            }

            Node::Logical { op, left, right } => {
                let l = left.eval(env)?;
                let Some(l) = l.as_bool() else {
                    return Err(RuntimeError::type_error(op.symbol(), Kind::Bool));
                };
                // Short-circuit before touching the right operand.
                match op {
                    LogicalOp::And if !l => return Ok(Value::Bool(false)),
                    LogicalOp::Or if l => return Ok(Value::Bool(true)),
                    _ => {}
                }
                let r = right.eval(env)?;
                let Some(r) = r.as_bool() else {
                    return Err(RuntimeError::type_error(op.symbol(), Kind::Bool));
                };
                Ok(Value::Bool(r))
            }

            Node::Arith { op, left, right } => {
                let l = left.eval(env)?;
                let Some(l) = l.as_number() else {
                    return Err(RuntimeError::type_error(op.symbol(), Kind::Number));
                };
                let r = right.eval(env)?;
                let Some(r) = r.as_number() else {
                    return Err(RuntimeError::type_error(op.symbol(), Kind::Number));
                };
                Ok(Value::Number(op.apply(l, r)))
            }
        }
    }
}

/// Produces a closure over the defining environment. Each argument shape
/// yields a host-callable function of the matching arity.
fn eval_function(def: &Rc<FunctionDef>, env: &Rc<Environment>) -> Value {
    let def = def.clone();
    let env = env.clone();
    match def.arg.clone() {
        ArgSpec::None => Value::fn0(move || def.body.eval(&env)),

        ArgSpec::Named { name, kind } => Value::fn1(move |arg| {
            if let Some(kind) = kind {
                if arg.kind() != kind {
                    return Err(RuntimeError::new(format!(
                        "expected {kind} as function argument"
                    )));
                }
            }
            let child = env.child();
            child.set_scoped(&name, arg);
            def.body.eval(&child)
        }),

        ArgSpec::Destructure(names) => Value::fn1(move |arg| {
            let Some(obj) = arg.as_object() else {
                return Err(RuntimeError::new("expected object as function argument"));
            };
            let child = env.child();
            for name in &names {
                let field = obj.get(name);
                if field.is_nil() {
                    return Err(RuntimeError::new(format!(
                        "missing key \"{name}\" in function argument object"
                    )));
                }
                child.set_scoped(name, field);
            }
            def.body.eval(&child)
        }),
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Export(decl) => write!(f, "export {decl}"),

            Node::Import(modules) => {
                write!(f, "import ")?;
                for (i, m) in modules.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{m}\"")?;
                }
                Ok(())
            }

            Node::InterfaceDecl {
                name,
                fields,
                methods,
            } => {
                write!(f, "interface {name} {{ ")?;
                let mut first = true;
                for (field, kind) in fields {
                    if !first {
                        write!(f, "; ")?;
                    }
                    first = false;
                    match kind {
                        Some(kind) => write!(f, "{field}: {kind}")?,
                        None => write!(f, "{field}")?,
                    }
                }
                for method in methods {
                    if !first {
                        write!(f, "; ")?;
                    }
                    first = false;
                    write!(f, "fn {method}()")?;
                }
                write!(f, " }}")
            }

            Node::Declaration { name, value } => write!(f, "{name} = {value}"),

            Node::Block { body, .. } | Node::ObjectLiteral { body } => fmt_block(f, body),

            Node::InterfaceInstantiate { interface, value } => {
                write!(f, "instance {interface} {value}")
            }

            Node::ListLiteral(elements) => {
                write!(f, "[")?;
                for (i, el) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{el}")?;
                }
                write!(f, "]")
            }

            Node::Literal(lit) => match lit {
                Lit::Num(n) => f.write_str(&super::value::fmt_number(*n)),
                Lit::Str(s) => write!(f, "\"{}\"", escape_string(s)),
                Lit::Bool(b) => write!(f, "{b}"),
            },

            Node::Identifier(name) => f.write_str(name),

            Node::StringParts(parts) => {
                write!(f, "\"")?;
                for part in parts {
                    match part {
                        Node::Literal(Lit::Str(s)) => f.write_str(&escape_string(s))?,
                        expr => write!(f, "${{{expr}}}")?,
                    }
                }
                write!(f, "\"")
            }

            Node::Call { f: func, arg } => match arg {
                None => write!(f, "{func}()"),
                Some(arg) => write!(f, "{func}({arg})"),
            },

            Node::KeyAccess { value, key } => write!(f, "{value}.{key}"),

            Node::IndexAccess { value, index } => write!(f, "{value}[{index}]"),

            Node::Function(def) => {
                match &def.arg {
                    ArgSpec::None => write!(f, "fn()")?,
                    ArgSpec::Named { name, kind } => match kind {
                        Some(kind) => write!(f, "fn({name}: {kind})")?,
                        None => write!(f, "fn({name})")?,
                    },
                    ArgSpec::Destructure(names) => {
                        write!(f, "fn({{")?;
                        for (i, n) in names.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{n}")?;
                        }
                        write!(f, "}})")?;
                    }
                }
                if matches!(def.body, Node::Block { .. }) {
                    write!(f, " {}", def.body)
                } else {
                    write!(f, " -> {}", def.body)
                }
            }

            Node::Return(v) => write!(f, "return {v}"),

            Node::Throw(v) => write!(f, "throw {v}"),

            Node::If { cond, body, else_ } => {
                write!(f, "if {cond} {body}")?;
                if let Some(else_) = else_ {
                    write!(f, " else {else_}")?;
                }
                Ok(())
            }

            Node::ForIn {
                var,
                iterable,
                body,
            } => write!(f, "for {var} in {iterable} {body}"),

            Node::Equals { left, right } => {
                // `!=` lowers to a negated equality; print it back as the
                // source operator since there is no grouping syntax.
                write!(f, "{left} == {right}")
            }

            Node::Not(inner) => {
                if let Node::Equals { left, right } = inner.as_ref() {
                    write!(f, "{left} != {right}")
                } else {
                    write!(f, "!{inner}")
                }
            }

            Node::Compare { op, left, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }

            Node::Logical { op, left, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }

            Node::Arith { op, left, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }
        }
    }
}

fn fmt_block(f: &mut fmt::Formatter<'_>, body: &[Node]) -> fmt::Result {
    if body.is_empty() {
        return write!(f, "{{}}");
    }
    write!(f, "{{ ")?;
    for (i, node) in body.iter().enumerate() {
        if i > 0 {
            write!(f, "; ")?;
        }
        write!(f, "{node}")?;
    }
    write!(f, " }}")
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\u{000B}' => out.push_str("\\v"),
            other => out.push(other),
        }
    }
    out
}
