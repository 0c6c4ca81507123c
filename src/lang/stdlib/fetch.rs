//! The `fetch` binding: HTTP GET with the fixed kit User-Agent.

use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;
use std::time::Duration;

use reqwest::blocking::{Client, Response};

use crate::lang::error::RuntimeError;
use crate::lang::value::{Binding, Kind, Object, Value};

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

pub fn fetch_fn() -> Value {
    Value::fn1(|url| {
        let Some(url) = url.as_str() else {
            return Err(RuntimeError::type_error("fetch", Kind::String));
        };

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(RuntimeError::lift)?;
        let res = client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .map_err(RuntimeError::lift)?;

        let status = res.status();
        if status.as_u16() >= 300 {
            return Err(RuntimeError::new(format!(
                "received error status: {status}"
            )));
        }

        Ok(response_object(res))
    })
}

fn response_object(res: Response) -> Value {
    let obj = Object::new();
    let binding: Binding = Rc::new(RefCell::new(res));
    obj.set_binding(binding.clone());

    let body = binding.clone();
    obj.put(
        "text",
        Value::fn0(move || {
            let mut text = String::new();
            body.borrow_mut().read_to_string(&mut text)?;
            Ok(Value::string(text))
        }),
    );

    let body = binding;
    obj.put(
        "json",
        Value::fn0(move || {
            let parsed: serde_json::Value =
                serde_json::from_reader(&mut *body.borrow_mut() as &mut dyn Read)
                    .map_err(RuntimeError::lift)?;
            Ok(json_to_value(&parsed))
        }),
    );

    obj.val()
}

fn json_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Value::string(s),
        serde_json::Value::Array(items) => {
            Value::list(items.iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(entries) => {
            let obj = Object::new();
            for (k, val) in entries {
                obj.put(k.clone(), json_to_value(val));
            }
            obj.val()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_mapping_covers_all_kinds() {
        let parsed: serde_json::Value =
            serde_json::from_str(r#"{"a": 1, "b": "x", "c": [true, null]}"#).unwrap();
        let v = json_to_value(&parsed);
        let obj = v.as_object().unwrap();
        assert_eq!(obj.get("a").as_number(), Some(1.0));
        assert_eq!(obj.get("b").as_str(), Some("x"));
        let list = obj.get("c");
        let list = list.as_list().unwrap();
        assert_eq!(list.items()[0].as_bool(), Some(true));
        assert!(list.items()[1].is_nil());
    }

    #[test]
    fn fetch_requires_a_string_url() {
        let f = fetch_fn();
        assert!(f.call(Some(Value::Number(1.0))).is_err());
    }
}
