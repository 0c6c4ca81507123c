//! Host-provided standard library values bound into a script environment.

mod ar;
mod fetch;
mod version;
mod xz;

use std::io::Read;
use std::rc::Rc;

use super::env::Environment;
use super::error::RuntimeError;
use super::value::{Binding, Interface, Kind, Object, Value};

/// Binds the standard library into the environment.
pub fn load(env: &Rc<Environment>) {
    env.set_scoped("fetch", fetch::fetch_fn());
    env.set_scoped("xz", xz::xz_fn());
    env.set_scoped("ar", ar::ar_fn());
    env.set_scoped("Error", Value::Interface(error_interface()));
    env.set_scoped("error", error_fn());
    env.set_scoped("parse_version", version::parse_version_fn());
}

thread_local! {
    static ERROR_IFACE: Rc<Interface> = Interface::new(
        "Error",
        vec![("message".to_string(), Some(Kind::String))],
        vec![],
    );
}

/// The built-in `Error` interface. `throw` only accepts objects tagged with
/// it.
pub fn error_interface() -> Rc<Interface> {
    ERROR_IFACE.with(Rc::clone)
}

/// Builds an object satisfying the `Error` interface.
pub fn new_error_value(message: &str) -> Value {
    let obj = Object::new();
    obj.put("message", Value::string(message));
    obj.tag_interface(&error_interface());
    obj.val()
}

fn error_fn() -> Value {
    Value::fn1(|message| {
        let Some(message) = message.as_str() else {
            return Err(RuntimeError::type_error("error", Kind::String));
        };
        Ok(new_error_value(message))
    })
}

/// Extracts the reader binding of an object argument, as consumed by the
/// decoders and archive extractors.
pub fn reader_binding(v: &Value, fn_name: &str) -> Result<Binding, RuntimeError> {
    v.as_object()
        .and_then(|obj| obj.binding())
        .ok_or_else(|| {
            RuntimeError::new(format!(
                "expected readable i/o object as argument to {fn_name}"
            ))
        })
}

/// Adapts a shared binding into a plain `Read` so it can feed a decoder.
pub struct BindingReader(pub Binding);

impl Read for BindingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_values_satisfy_the_interface() {
        let v = new_error_value("boom");
        let obj = v.as_object().unwrap();
        assert!(obj.implements(&error_interface()));
        assert_eq!(obj.get("message").as_str(), Some("boom"));
    }

    #[test]
    fn error_fn_requires_a_string() {
        let f = error_fn();
        assert!(f.call(Some(Value::Number(1.0))).is_err());
    }
}
