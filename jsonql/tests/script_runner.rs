use jsonql::{
    EngineConfig, EngineError, Expr, QueryParser, Schema, ScriptRunner, Value, Var, VarMap,
};
use pretty_assertions::assert_eq;
use std::collections::HashMap;

/// Stands in for the surface grammar: knows the text of a fixed set of
/// expressions.
#[derive(Default)]
struct KnownQueries {
    by_text: HashMap<String, Expr>,
}

impl KnownQueries {
    fn with(mut self, expr: &Expr) -> Self {
        self.by_text
            .insert(expr.to_text(), expr.clone_with(&mut VarMap::new()));
        self
    }
}

impl QueryParser for KnownQueries {
    fn parse(&self, text: &str) -> Result<Expr, EngineError> {
        self.by_text
            .get(text)
            .map(|e| e.clone_with(&mut VarMap::new()))
            .ok_or_else(|| EngineError::Parse(format!("unknown query: {}", text)))
    }
}

fn random_pair() -> Expr {
    Expr::Array(vec![
        Expr::RandomLong { key: "k".into() },
        Expr::RandomLong { key: "k".into() },
    ])
}

#[test]
fn test_each_pass_sees_the_same_random_sequence() {
    let expr = random_pair();
    let parser = KnownQueries::default().with(&expr);
    let mut runner = ScriptRunner::default();

    let first = runner.run_passes(&expr, &parser);
    assert!(first.agree(), "{:?}", first);

    let second = runner.run_passes(&expr, &parser);
    assert!(second.agree(), "{:?}", second);
    // Each universe moved on from where it stopped.
    assert_ne!(first.plain.unwrap(), second.plain.unwrap());
}

#[test]
fn test_same_seed_replays_the_same_values() {
    let expr = random_pair();
    let mut a = ScriptRunner::new(EngineConfig::default());
    let mut b = ScriptRunner::new(EngineConfig::default());
    assert_eq!(a.run_statement(&expr).unwrap(), b.run_statement(&expr).unwrap());
}

#[test]
fn test_parse_failure_only_affects_the_decompiled_pass() {
    let expr = Expr::long(1);
    let mut runner = ScriptRunner::default();
    let results = runner.run_passes(&expr, &KnownQueries::default());
    assert_eq!(results.plain.unwrap(), Value::Long(1));
    assert!(matches!(results.decompiled, Err(EngineError::Parse(_))));
    assert_eq!(results.rewritten.unwrap(), Value::Long(1));
}

#[test]
fn test_schema_conformance_is_checked_when_enabled() {
    let v = Var::with_schema("v", Schema::String);
    v.set_value(Value::Long(1));
    let statement = Expr::var(&v);

    let mut runner = ScriptRunner::default();
    assert!(matches!(
        runner.run_statement(&statement),
        Err(EngineError::SchemaConformance { ref schema, .. }) if schema == "string"
    ));

    let mut config = EngineConfig::default();
    config.engine.check_schema = false;
    let mut unchecked = ScriptRunner::new(config);
    assert_eq!(unchecked.run_statement(&statement).unwrap(), Value::Long(1));
}

#[test]
fn test_report_counts_isolated_failures() {
    let mut runner = ScriptRunner::default();
    let report = runner.run_script(&[
        Expr::var(&Var::new("undefined")),
        Expr::long(2),
        Expr::Call {
            func: Box::new(Expr::long(3)),
            args: vec![],
        },
    ]);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 2);
    assert!(!report.is_success());
    assert_eq!(report.outcomes[1].result.as_ref().unwrap(), &Value::Long(2));
}
