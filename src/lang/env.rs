//! Scoped environments for script evaluation.
//!
//! An environment is a linked list of scope frames with shared ownership so
//! that closures keep their defining scopes alive. Reads walk up the chain;
//! writes walk up only to rebind an existing name and otherwise create the
//! binding locally. A scope marked as a variable boundary stops the write
//! walk, which is how object-literal bodies collect their own locals instead
//! of mutating the enclosing function's bindings.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::error::RuntimeError;
use super::value::Value;

pub type ModLoader = Rc<dyn Fn(&str) -> Result<Rc<Environment>, RuntimeError>>;

pub struct Environment {
    vars: RefCell<IndexMap<String, Value>>,
    exports: RefCell<IndexMap<String, Value>>,
    parent: Option<Rc<Environment>>,
    control: Rc<ExecutionControl>,
    var_boundary: bool,
    mod_loader: RefCell<Option<ModLoader>>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("vars", &self.vars.borrow().keys().collect::<Vec<_>>())
            .field("exports", &self.exports.borrow().keys().collect::<Vec<_>>())
            .field("var_boundary", &self.var_boundary)
            .finish_non_exhaustive()
    }
}

impl Environment {
    pub fn new() -> Rc<Environment> {
        Rc::new(Environment {
            vars: RefCell::new(IndexMap::new()),
            exports: RefCell::new(IndexMap::new()),
            parent: None,
            control: Rc::new(ExecutionControl::default()),
            var_boundary: false,
            mod_loader: RefCell::new(None),
        })
    }

    fn make_child(
        self: &Rc<Self>,
        var_boundary: bool,
        control: Option<Rc<ExecutionControl>>,
    ) -> Rc<Environment> {
        Rc::new(Environment {
            vars: RefCell::new(IndexMap::new()),
            exports: RefCell::new(IndexMap::new()),
            parent: Some(self.clone()),
            control: control.unwrap_or_else(|| self.control.clone()),
            var_boundary,
            mod_loader: RefCell::new(None),
        })
    }

    pub fn child(self: &Rc<Self>) -> Rc<Environment> {
        self.make_child(false, None)
    }

    /// Child scope for an object literal body.
    pub fn object_child(self: &Rc<Self>) -> Rc<Environment> {
        self.make_child(true, None)
    }

    /// Child scope for a function body, with a fresh control block that
    /// permits `return`.
    pub fn function_child(self: &Rc<Self>) -> Rc<Environment> {
        self.make_child(
            false,
            Some(Rc::new(ExecutionControl {
                return_allowed: true,
                ..ExecutionControl::default()
            })),
        )
    }

    pub fn get(&self, name: &str) -> Result<Value, RuntimeError> {
        let mut env = self;
        loop {
            if let Some(v) = env.vars.borrow().get(name) {
                return Ok(v.clone());
            }
            match &env.parent {
                Some(p) => env = p,
                None => return Err(RuntimeError::new(format!("{name} does not exist in scope"))),
            }
        }
    }

    /// Rebinds an existing binding found by walking up the scope chain, or
    /// creates the name locally. The walk does not cross a variable
    /// boundary.
    pub fn set(&self, name: &str, value: Value) {
        let mut env = self;
        loop {
            if env.vars.borrow().contains_key(name) {
                env.vars.borrow_mut().insert(name.to_string(), value);
                return;
            }
            if env.var_boundary {
                break;
            }
            match &env.parent {
                Some(p) => env = p,
                None => break,
            }
        }
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    /// Creates the binding in this scope without walking up.
    pub fn set_scoped(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    pub fn export(&self, name: &str, value: Value) {
        self.exports.borrow_mut().insert(name.to_string(), value);
    }

    pub fn get_export(&self, name: &str) -> Result<Value, RuntimeError> {
        self.exports
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::new(format!("module has no export named \"{name}\"")))
    }

    pub fn exports(&self) -> Vec<(String, Value)> {
        self.exports
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Takes this scope's local bindings, preserving declaration order.
    /// Used to turn an object-literal scope into an object.
    pub fn take_vars(&self) -> IndexMap<String, Value> {
        std::mem::take(&mut *self.vars.borrow_mut())
    }

    pub fn control(&self) -> &Rc<ExecutionControl> {
        &self.control
    }

    /// Stores a return value in the enclosing function's control block.
    pub fn do_return(&self, value: Value) -> Result<(), RuntimeError> {
        if !self.control.return_allowed {
            return Err(RuntimeError::new("return not allowed in this context"));
        }
        *self.control.return_val.borrow_mut() = value;
        self.control.returned.set(true);
        Ok(())
    }

    pub fn set_mod_loader(&self, loader: ModLoader) {
        *self.mod_loader.borrow_mut() = Some(loader);
    }

    /// Resolves a module through the nearest module loader up the chain and
    /// brings its exports into this scope.
    pub fn import(&self, name: &str) -> Result<(), RuntimeError> {
        let mut env = self;
        let loader = loop {
            if let Some(loader) = env.mod_loader.borrow().clone() {
                break loader;
            }
            match &env.parent {
                Some(p) => env = p,
                None => {
                    return Err(RuntimeError::new(format!(
                        "no module loader available to import \"{name}\""
                    )))
                }
            }
        };

        let module = loader(name)?;
        for (key, value) in module.exports() {
            self.set_scoped(&key, value);
        }
        Ok(())
    }

    /// Runs a sequence of statements, stopping at the first error or once
    /// the enclosing function has returned.
    pub fn execute(self: &Rc<Self>, prog: &[super::ast::Node]) -> Result<(), RuntimeError> {
        for node in prog {
            node.eval(self)?;
            if self.control.returned.get() {
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Per-function control block shared by a function body scope and all of its
/// children.
#[derive(Default)]
pub struct ExecutionControl {
    pub return_allowed: bool,
    pub returned: Cell<bool>,
    pub return_val: RefCell<Value>,
}
