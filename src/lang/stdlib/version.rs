//! The `parse_version` binding.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::lang::error::RuntimeError;
use crate::lang::value::{Kind, Object, Value};
use crate::version::{compare_versions, has_letters};

pub fn parse_version_fn() -> Value {
    Value::fn1(|version| {
        let Some(raw) = version.as_str() else {
            return Err(RuntimeError::type_error("parse_version", Kind::String));
        };
        Ok(version_object(Rc::from(raw)))
    })
}

fn version_object(raw: Rc<str>) -> Value {
    let obj = Object::new();
    obj.put("raw", Value::Str(raw.clone()));

    let this = raw.clone();
    obj.put(
        "less_than",
        Value::fn1(move |other| {
            let Some(other) = other.as_str() else {
                return Err(RuntimeError::type_error(
                    "parse_version(...).less_than",
                    Kind::String,
                ));
            };
            Ok(Value::Bool(compare_versions(&this, other) == Ordering::Less))
        }),
    );

    let this = raw.clone();
    obj.put(
        "greater_than",
        Value::fn1(move |other| {
            let Some(other) = other.as_str() else {
                return Err(RuntimeError::type_error(
                    "parse_version(...).greater_than",
                    Kind::String,
                ));
            };
            Ok(Value::Bool(
                compare_versions(&this, other) == Ordering::Greater,
            ))
        }),
    );

    let this = raw;
    obj.put(
        "matches",
        Value::fn1(move |spec| {
            let Some(spec) = spec.as_str() else {
                return Err(RuntimeError::type_error(
                    "parse_version(...).matches",
                    Kind::String,
                ));
            };
            if *this == *spec {
                return Ok(Value::Bool(true));
            }
            if has_letters(&this) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(this.starts_with(&format!("{spec}."))))
        }),
    );

    obj.val()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(raw: &str) -> Value {
        parse_version_fn()
            .call(Some(Value::string(raw)))
            .unwrap()
    }

    #[test]
    fn comparison_methods() {
        let v = parsed("1.9");
        let less = v.get("less_than").unwrap();
        assert_eq!(
            less.call(Some(Value::string("1.10"))).unwrap().as_bool(),
            Some(true)
        );
        let greater = v.get("greater_than").unwrap();
        assert_eq!(
            greater
                .call(Some(Value::string("1.10-rc1")))
                .unwrap()
                .as_bool(),
            Some(false)
        );
    }

    #[test]
    fn matches_exact_and_prefix() {
        let v = parsed("1.26.8");
        let matches = v.get("matches").unwrap();
        assert_eq!(
            matches.call(Some(Value::string("1.26"))).unwrap().as_bool(),
            Some(true)
        );
        assert_eq!(
            matches.call(Some(Value::string("1.27"))).unwrap().as_bool(),
            Some(false)
        );

        let rc = parsed("1.26rc1");
        let matches = rc.get("matches").unwrap();
        assert_eq!(
            matches.call(Some(Value::string("1.26"))).unwrap().as_bool(),
            Some(false)
        );
    }
}
