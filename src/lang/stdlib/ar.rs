//! The `ar` binding: lazy member access into a Unix ar archive.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::rc::Rc;

use super::{reader_binding, BindingReader};
use crate::io::ar::ArReader;
use crate::lang::error::RuntimeError;
use crate::lang::value::{Kind, Object, Value};

struct ArState {
    reader: ArReader<BindingReader>,
    files: HashMap<String, Rc<Vec<u8>>>,
    done: bool,
}

pub fn ar_fn() -> Value {
    Value::fn1(|src| {
        let src = reader_binding(&src, "ar")?;
        let reader = ArReader::new(BindingReader(src)).map_err(RuntimeError::lift)?;
        let state = Rc::new(RefCell::new(ArState {
            reader,
            files: HashMap::new(),
            done: false,
        }));

        let obj = Object::new();
        obj.put(
            "file",
            Value::fn1(move |name| {
                let Some(name) = name.as_str() else {
                    return Err(RuntimeError::type_error("ar(...).file", Kind::String));
                };
                let contents = member_contents(&state, name)?;
                let file = Object::new();
                file.put("name", Value::string(name));
                file.set_binding(Rc::new(RefCell::new(Cursor::new(
                    contents.as_ref().clone(),
                ))));
                Ok(file.val())
            }),
        );
        Ok(obj.val())
    })
}

/// Members are decoded lazily, in archive order, and cached by name.
fn member_contents(
    state: &Rc<RefCell<ArState>>,
    name: &str,
) -> Result<Rc<Vec<u8>>, RuntimeError> {
    let mut state = state.borrow_mut();

    if let Some(contents) = state.files.get(name) {
        return Ok(contents.clone());
    }

    while !state.done {
        let Some(hdr) = state.reader.next_member().map_err(RuntimeError::lift)? else {
            state.done = true;
            break;
        };

        let mut contents = Vec::with_capacity(hdr.size as usize);
        state
            .reader
            .read_to_end(&mut contents)
            .map_err(RuntimeError::lift)?;

        let contents = Rc::new(contents);
        state.files.insert(hdr.name.clone(), contents.clone());
        if hdr.name == name {
            return Ok(contents);
        }
    }

    Err(RuntimeError::new(format!(
        "file \"{name}\" not found in ar archive"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive_object(bytes: Vec<u8>) -> Value {
        let obj = Object::new();
        obj.set_binding(Rc::new(RefCell::new(Cursor::new(bytes))));
        obj.val()
    }

    fn simple_archive() -> Vec<u8> {
        let mut archive = b"!<arch>\n".to_vec();
        for (name, data) in [("control.tar/", b"ctrl".as_slice()), ("data.tar/", b"payload")] {
            archive.extend_from_slice(format!("{name:<16}").as_bytes());
            archive.extend_from_slice(b"0           0     0     100644  ");
            archive.extend_from_slice(format!("{:<10}", data.len()).as_bytes());
            archive.extend_from_slice(b"`\n");
            archive.extend_from_slice(data);
            if data.len() % 2 != 0 {
                archive.push(b'\n');
            }
        }
        archive
    }

    #[test]
    fn reads_members_by_name_in_any_order() {
        let ar = ar_fn().call(Some(archive_object(simple_archive()))).unwrap();
        let file = ar.get("file").unwrap();

        // Requesting the second member first forces a scan past the first.
        let data = file.call(Some(Value::string("data.tar"))).unwrap();
        let binding = data.as_object().unwrap().binding().unwrap();
        let mut bytes = Vec::new();
        binding.borrow_mut().read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"payload");

        // The earlier member was cached during the scan.
        let ctrl = file.call(Some(Value::string("control.tar"))).unwrap();
        let binding = ctrl.as_object().unwrap().binding().unwrap();
        let mut bytes = Vec::new();
        binding.borrow_mut().read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"ctrl");
    }

    #[test]
    fn missing_member_is_an_error() {
        let ar = ar_fn().call(Some(archive_object(simple_archive()))).unwrap();
        let file = ar.get("file").unwrap();
        let err = file.call(Some(Value::string("nope"))).unwrap_err();
        assert!(err.message().contains("not found in ar archive"));
    }
}
