//! The kit scripting language: a small dynamically-typed DSL that package
//! scripts are written in.
//!
//! The pipeline is lexer -> parser -> tree-walking evaluator. Host
//! functionality enters through value bindings (see [`stdlib`] and the
//! install bindings in `crate::bindings`).

pub mod ast;
pub mod env;
pub mod error;
mod lexer;
mod parser;
pub mod stdlib;
mod token;
pub mod value;

use std::rc::Rc;

pub use error::{ParseError, RuntimeError};
pub use parser::parse;

use env::Environment;

#[derive(Debug, thiserror::Error)]
pub enum LangError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Parses and runs a module source, returning the environment holding its
/// exports.
pub fn execute(src: &str) -> Result<Rc<Environment>, LangError> {
    let prog = parse(src)?;
    let env = Environment::new();
    env.execute(&prog)?;
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::value::Value;
    use super::*;

    fn run(src: &str) -> Rc<Environment> {
        execute(src).unwrap_or_else(|e| panic!("execute failed for {src:?}: {e}"))
    }

    #[test]
    fn exports_arithmetic_result() {
        let env = run("export x = 1 + 2");
        assert_eq!(env.get_export("x").unwrap().as_number(), Some(3.0));
    }

    #[test]
    fn interpolates_strings() {
        let env = run("name = \"go\"\nv = \"1.21\"\ns = \"go${v}.${name}\"");
        assert_eq!(env.get("s").unwrap().as_str(), Some("go1.21.go"));
    }

    #[test]
    fn for_in_visits_in_order() {
        let env = run("total = 0\nfn add() { for x in [1, 2, 3, 4] { total = total + x } }\nexport run = add");
        let f = env.get_export("run").unwrap();
        f.call(None).unwrap();
        assert_eq!(env.get("total").unwrap().as_number(), Some(10.0));
    }

    #[test]
    fn functions_read_and_mutate_outer_scope() {
        let env = run("x = 1\nexport f = fn() { y = x; x = 2; return y }");
        let f = env.get_export("f").unwrap();
        let y = f.call(None).unwrap();
        assert_eq!(y.as_number(), Some(1.0));
        // Reassignment inside the function walked up to the outer binding.
        assert_eq!(env.get("x").unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn object_literals_do_not_leak_writes() {
        let env = run("x = 1\no = { x = 5; y = x }");
        assert_eq!(env.get("x").unwrap().as_number(), Some(1.0));
        let o = env.get("o").unwrap();
        let o = o.as_object().unwrap();
        assert_eq!(o.get("x").as_number(), Some(5.0));
        // Reads still cross the boundary before the local is declared.
        assert_eq!(o.get("y").as_number(), Some(5.0));
    }

    #[test]
    fn logical_operators_short_circuit() {
        // crash is undefined; evaluating it would fail.
        let env = run("export f = fn() { return false && crash() }");
        let v = env.get_export("f").unwrap().call(None).unwrap();
        assert_eq!(v.as_bool(), Some(false));

        let env = run("export f = fn() { return true || crash() }");
        let v = env.get_export("f").unwrap().call(None).unwrap();
        assert_eq!(v.as_bool(), Some(true));
    }

    #[test]
    fn return_terminates_only_its_function() {
        let env = run(
            "fn inner() { return 1 }\nexport outer = fn() { a = inner(); return a + 1 }",
        );
        let v = env.get_export("outer").unwrap().call(None).unwrap();
        assert_eq!(v.as_number(), Some(2.0));
    }

    #[test]
    fn return_inside_loop_stops_the_function() {
        let env = run("export f = fn() { for x in [1, 2, 3] { return x } }");
        let v = env.get_export("f").unwrap().call(None).unwrap();
        assert_eq!(v.as_number(), Some(1.0));
    }

    #[test]
    fn top_level_return_is_an_error() {
        let err = execute("return 1").unwrap_err();
        assert!(err.to_string().contains("return not allowed"));
    }

    #[test]
    fn throw_carries_error_message() {
        let env = run("export f = fn() { throw error(\"it broke\") }");
        stdlib::load(&env);
        let err = env.get_export("f").unwrap().call(None).unwrap_err();
        assert_eq!(err.message(), "it broke");
    }

    #[test]
    fn throw_requires_error_instance() {
        let env = run("export f = fn() { throw \"nope\" }");
        stdlib::load(&env);
        let err = env.get_export("f").unwrap().call(None).unwrap_err();
        assert!(err.message().contains("instance of Error"));
    }

    #[test]
    fn interface_instantiation_validates() {
        let env = run(
            "interface Point { x: number; y: number }\nexport mk = fn() { return instance Point { x = 1; y = 2 } }",
        );
        let p = env.get_export("mk").unwrap().call(None).unwrap();
        assert_eq!(p.as_object().unwrap().get("x").as_number(), Some(1.0));

        let env = run(
            "interface Point { x: number; y: number }\nexport mk = fn() { return instance Point { x = 1 } }",
        );
        let err = env.get_export("mk").unwrap().call(None).unwrap_err();
        assert!(err.message().contains("does not satisfy interface"));
    }

    #[test]
    fn closures_capture_their_scope() {
        let env = run(
            "fn counter() {\n    n = 0\n    return fn() { n = n + 1; return n }\n}\nexport mk = counter",
        );
        let mk = env.get_export("mk").unwrap();
        let c = mk.call(None).unwrap();
        assert_eq!(c.call(None).unwrap().as_number(), Some(1.0));
        assert_eq!(c.call(None).unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn lambda_and_list_pipeline() {
        let env = run(
            "export f = fn() {\n    return \"go1.21.0.linux-amd64\\ngo1.20.5.linux-amd64\"\n        .split(\"\\n\")\n        .map(l -> l.inclusive_remove_until(\"go\").inclusive_remove_after(\".linux\"))\n}",
        );
        let out = env.get_export("f").unwrap().call(None).unwrap();
        let list = out.as_list().unwrap();
        assert_eq!(list.items()[0].as_str(), Some("1.21.0"));
        assert_eq!(list.items()[1].as_str(), Some("1.20.5"));
    }

    #[test]
    fn typed_argument_is_enforced() {
        let env = run("export f = fn(v: string) -> v");
        let f = env.get_export("f").unwrap();
        assert!(f.call(Some(Value::Number(1.0))).is_err());
        assert!(f.call(Some(Value::string("ok"))).is_ok());
    }

    #[test]
    fn destructured_argument_requires_keys() {
        let env = run("export f = fn({a, b}) -> a + b");
        let f = env.get_export("f").unwrap();

        let obj = value::Object::new();
        obj.put("a", Value::Number(1.0));
        obj.put("b", Value::Number(2.0));
        assert_eq!(f.call(Some(obj.val())).unwrap().as_number(), Some(3.0));

        let missing = value::Object::new();
        missing.put("a", Value::Number(1.0));
        let err = f.call(Some(missing.val())).unwrap_err();
        assert!(err.message().contains("missing key \"b\""));
    }

    #[test]
    fn comparisons_are_strictly_typed() {
        let err = execute("x = 1 < \"2\"").unwrap_err();
        assert!(err.to_string().contains("expected number"));

        let err = execute("x = true && 1").unwrap_err();
        assert!(err.to_string().contains("expected bool"));
    }
}
