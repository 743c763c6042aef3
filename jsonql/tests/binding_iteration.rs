use jsonql::runtime::iter::collect;
use jsonql::{BindingExpr, Context, Expr, Value, Var};
use pretty_assertions::assert_eq;

fn longs(values: &[i64]) -> Expr {
    Expr::Const(Value::Array(values.iter().copied().map(Value::Long).collect()))
}

#[test]
fn test_iteration_binds_each_element_then_undefines() {
    let mut ctx = Context::new();
    let x = Var::new("x");
    x.set_value(Value::Long(99));
    let binding = BindingExpr::iterate(x.clone(), longs(&[10, 20, 30]));

    let mut it = binding.iter(&mut ctx).unwrap();
    // Stale values from an earlier use are cleared before the first element.
    assert!(!x.is_defined());

    for expected in [10, 20, 30] {
        assert!(it.advance(&mut ctx).unwrap());
        assert_eq!(it.current(), &Value::Long(expected));
        assert_eq!(x.value(), Ok(Value::Long(expected)));
    }
    assert!(!it.advance(&mut ctx).unwrap());
    assert!(!x.is_defined());
    assert!(!it.advance(&mut ctx).unwrap());
}

#[test]
fn test_null_source_is_empty() {
    let mut ctx = Context::new();
    let x = Var::new("x");
    let binding = BindingExpr::iterate(x.clone(), Expr::null());
    let mut it = binding.iter(&mut ctx).unwrap();
    assert!(!it.advance(&mut ctx).unwrap());
    assert!(!x.is_defined());
}

#[test]
fn test_eq_binding_evaluates_to_null() {
    let mut ctx = Context::new();
    let x = Var::new("x");
    let binding = Expr::Binding(BindingExpr::eq(x.clone(), longs(&[10, 20, 30])));
    assert_eq!(binding.eval(&mut ctx), Ok(Value::Null));
    assert_eq!(x.value(), Ok(Value::Array(vec![Value::Long(10), Value::Long(20), Value::Long(30)])));
    assert_eq!(binding.to_text(), "x = [10, 20, 30]");
}

#[test]
fn test_record_fields_binding() {
    let mut ctx = Context::new();
    let (name, value) = (Var::new("k"), Var::new("v"));
    let record = Expr::Record(vec![
        ("a".to_string(), Expr::long(1)),
        ("b".to_string(), Expr::long(2)),
    ]);

    let names = Expr::for_each(
        BindingExpr::record_fields(name.clone(), value.clone(), record.clone()),
        Expr::var(&name),
    );
    assert_eq!(
        names.eval(&mut ctx),
        Ok(Value::Array(vec![Value::string("a"), Value::string("b")]))
    );
    assert_eq!(names.to_text(), r#"for( k, v in {"a": 1, "b": 2} ) ( k )"#);

    let values = Expr::for_each(
        BindingExpr::record_fields(name.clone(), value.clone(), record),
        Expr::var(&value),
    );
    let mut it = values.iter(&mut ctx).unwrap();
    assert_eq!(
        collect(it.as_mut(), &mut ctx).unwrap(),
        vec![Value::Long(1), Value::Long(2)]
    );
    assert!(!name.is_defined());
    assert!(!value.is_defined());
}

#[test]
fn test_binding_rejects_non_sequence_source() {
    let mut ctx = Context::new();
    let binding = BindingExpr::iterate(Var::new("x"), Expr::long(3));
    assert!(binding.iter(&mut ctx).is_err());
}
