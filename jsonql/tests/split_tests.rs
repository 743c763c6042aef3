use jsonql::runtime::SpillSettings;
use jsonql::{BinaryOp, BindingExpr, Context, Expr, SplitClause, SplitExpr, Value, Var};
use pretty_assertions::assert_eq;

fn longs(values: impl IntoIterator<Item = i64>) -> Value {
    Value::Array(values.into_iter().map(Value::Long).collect())
}

fn writer_sink(target: &str) -> Expr {
    let items = Var::new("items");
    Expr::function(
        vec![items.clone()],
        Expr::Write {
            target: target.to_string(),
            value: Box::new(Expr::var(&items)),
        },
    )
}

fn is_even(x: &Var) -> Expr {
    Expr::binary(
        BinaryOp::Eq,
        Expr::binary(BinaryOp::Mod, Expr::var(x), Expr::long(2)),
        Expr::long(0),
    )
}

#[test]
fn test_each_element_goes_to_first_matching_clause() {
    let mut ctx = Context::new();
    let x = Var::new("x");
    let split = Expr::Split(SplitExpr::new(
        BindingExpr::iterate(x.clone(), Expr::Const(longs(1..=4))),
        vec![
            SplitClause::new(is_even(&x), writer_sink("evens")),
            // Also true for the even elements, which never reach it.
            SplitClause::new(Expr::Const(Value::Bool(true)), writer_sink("rest")),
        ],
    ));

    assert_eq!(split.eval(&mut ctx), Ok(Value::Null));
    // One call per sink, in clause order.
    assert_eq!(
        ctx.outputs().keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["evens", "rest"]
    );
    assert_eq!(ctx.output("evens"), Some(&[longs([2, 4])][..]));
    assert_eq!(ctx.output("rest"), Some(&[longs([1, 3])][..]));
    assert!(!x.is_defined());
}

#[test]
fn test_unmatched_elements_are_dropped_and_empty_sinks_still_run() {
    let mut ctx = Context::new();
    let x = Var::new("x");
    let big = Expr::binary(BinaryOp::Gt, Expr::var(&x), Expr::long(10));
    let split = Expr::Split(SplitExpr::new(
        BindingExpr::iterate(x.clone(), Expr::Const(longs([1, 2, 3]))),
        vec![
            SplitClause::new(big, writer_sink("big")),
            SplitClause::new(is_even(&x), writer_sink("evens")),
        ],
    ));
    split.eval(&mut ctx).unwrap();
    assert_eq!(ctx.output("big"), Some(&[longs([])][..]));
    assert_eq!(ctx.output("evens"), Some(&[longs([2])][..]));
}

#[test]
fn test_large_inputs_spill_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = Context::new();
    ctx.set_spill_settings(SpillSettings {
        threshold: 2,
        dir: Some(dir.path().to_path_buf()),
    });

    let x = Var::new("x");
    let items = Var::new("items");
    let sink = Expr::function(
        vec![items.clone()],
        Expr::Do(vec![
            Expr::Write {
                target: "all".into(),
                value: Box::new(Expr::var(&items)),
            },
            Expr::Write {
                target: "count".into(),
                value: Box::new(Expr::Count(Box::new(Expr::var(&items)))),
            },
        ]),
    );
    let split = Expr::Split(SplitExpr::new(
        BindingExpr::iterate(x.clone(), Expr::Const(longs(1..=10))),
        vec![SplitClause::new(Expr::Const(Value::Bool(true)), sink)],
    ));
    split.eval(&mut ctx).unwrap();

    let all = &ctx.output("all").unwrap()[0];
    match all {
        Value::Spilled(spilled) => {
            assert!(spilled.has_spilled());
            assert_eq!(spilled.len(), 10);
        }
        other => panic!("expected a spilled array, got {:?}", other),
    }
    assert_eq!(all, &longs(1..=10));
    assert_eq!(ctx.output("count"), Some(&[Value::Long(10)][..]));
}

#[test]
fn test_sink_must_be_a_function() {
    let mut ctx = Context::new();
    let x = Var::new("x");
    let split = Expr::Split(SplitExpr::new(
        BindingExpr::iterate(x.clone(), Expr::Const(longs([1]))),
        vec![SplitClause::new(Expr::Const(Value::Bool(true)), Expr::long(1))],
    ));
    assert!(split.eval(&mut ctx).is_err());
}

#[test]
fn test_split_is_never_pure() {
    let x = Var::new("x");
    let split = Expr::Split(SplitExpr::new(
        BindingExpr::iterate(x.clone(), Expr::Const(longs([1]))),
        vec![],
    ));
    assert!(!split.is_pure());
    assert_eq!(split.to_text(), "[1]\n-> split each x");
}
