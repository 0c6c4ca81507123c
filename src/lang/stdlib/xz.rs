//! The `xz` binding: wraps a reader binding in an XZ decoder.

use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;

use xz2::read::XzDecoder;

use super::{reader_binding, BindingReader};
use crate::lang::error::RuntimeError;
use crate::lang::value::{Binding, Object, Value};

pub fn xz_fn() -> Value {
    Value::fn1(|src| {
        let src = reader_binding(&src, "xz")?;
        let decoder = XzDecoder::new(BindingReader(src));

        let obj = Object::new();
        let binding: Binding = Rc::new(RefCell::new(decoder));
        obj.set_binding(binding.clone());

        obj.put(
            "text",
            Value::fn0(move || {
                let mut text = String::new();
                binding.borrow_mut().read_to_string(&mut text)?;
                Ok(Value::string(text))
            }),
        );

        Ok(obj.val())
    })
}
