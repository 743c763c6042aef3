use jsonql::ir::registry::make_call;
use jsonql::{Context, EngineConfig, Expr, MapConfigProvider, ScriptRunner, Value, Var};
use pretty_assertions::assert_eq;
use std::rc::Rc;

/// `( write("seen", true), <value> )`: records that it was evaluated.
fn observed(value: Expr) -> Expr {
    Expr::Do(vec![
        Expr::Write {
            target: "seen".into(),
            value: Box::new(Expr::Const(Value::Bool(true))),
        },
        value,
    ])
}

fn read_conf(name: Expr, default: Option<Expr>) -> Expr {
    Expr::ReadConf {
        name: Box::new(name),
        default: default.map(Box::new),
    }
}

#[test]
fn test_without_provider_only_the_default_is_evaluated() {
    let mut ctx = Context::new();
    // The name would fail to evaluate.
    let name = Expr::var(&Var::new("undefined"));
    let e = read_conf(name, Some(observed(Expr::long(3))));
    assert_eq!(e.eval(&mut ctx), Ok(Value::Long(3)));
    assert!(ctx.output("seen").is_some());

    let e = read_conf(Expr::string("k"), None);
    assert_eq!(e.eval(&mut ctx), Ok(Value::Null));
}

#[test]
fn test_default_is_skipped_when_key_is_present() {
    let provider = MapConfigProvider::default().with_entry("job.name", "nightly");
    let mut ctx = Context::new().with_provider(Rc::new(provider));

    let e = read_conf(Expr::string("job.name"), Some(observed(Expr::long(3))));
    assert_eq!(e.eval(&mut ctx), Ok(Value::string("nightly")));
    assert!(ctx.output("seen").is_none());

    let e = read_conf(Expr::string("job.owner"), Some(observed(Expr::long(3))));
    assert_eq!(e.eval(&mut ctx), Ok(Value::Long(3)));
    assert!(ctx.output("seen").is_some());
}

#[test]
fn test_conf_table_feeds_the_runner() {
    let config = EngineConfig::from_toml_str(
        r#"
[engine]
rng_seed = 7

[conf]
"job.name" = "nightly"
"#,
    )
    .unwrap();
    let mut runner = ScriptRunner::new(config);
    let lookup = make_call("readConf", vec![Expr::string("job.name")]).unwrap();
    assert_eq!(runner.run_statement(&lookup).unwrap(), Value::string("nightly"));

    let fallback = make_call("readConf", vec![Expr::string("missing"), Expr::long(1)]).unwrap();
    assert_eq!(runner.run_statement(&fallback).unwrap(), Value::Long(1));
    assert_eq!(fallback.to_text(), r#"readConf("missing", 1)"#);
}
