//! Tree-walking evaluator for template expressions.
//!
//! Evaluation happens over [`serde_json::Value`] against a flat scope map.
//! There is no host access of any kind: the only bindings are the supplied
//! scope and the enumerated helper library in
//! [`functions`](super::functions).
//!
//! Missing bindings and absent object members evaluate to an explicit
//! [`Evaluated::Undefined`] outcome rather than an error — template authors
//! routinely probe for data that earlier branches may not have produced.
//! Parse failures and type mismatches are hard [`EvalError`]s the resolver
//! reports as evaluation faults.

use miette::Diagnostic;
use serde_json::{Map, Value};
use thiserror::Error;

use super::functions;
use super::lexer::tokenize;
use super::parser::{BinaryOp, Expr, UnaryOp, parse};

/// Outcome of evaluating an expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluated {
    Value(Value),
    /// A binding or member that does not exist in the scope.
    Undefined,
}

impl Evaluated {
    /// Collapse into a value, mapping `Undefined` to `Null`.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Evaluated::Value(v) => v,
            Evaluated::Undefined => Value::Null,
        }
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Evaluated::Undefined)
    }
}

/// Errors from tokenizing, parsing, or evaluating an expression.
#[derive(Debug, Error, Diagnostic)]
pub enum EvalError {
    #[error("unexpected character `{0}` in expression")]
    #[diagnostic(code(weftrun::resolver::lex))]
    UnexpectedChar(char),

    #[error("unterminated string literal")]
    #[diagnostic(code(weftrun::resolver::unterminated_string))]
    UnterminatedString,

    #[error("unexpected token {0}")]
    #[diagnostic(code(weftrun::resolver::parse))]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    #[diagnostic(code(weftrun::resolver::eof))]
    UnexpectedEnd,

    #[error("only the fixed helper functions can be called")]
    #[diagnostic(
        code(weftrun::resolver::not_callable),
        help("Call one of the library functions, e.g. `_keys(...)` or `_now(...)`.")
    )]
    NotCallable,

    #[error("unknown function `{0}`")]
    #[diagnostic(code(weftrun::resolver::unknown_function))]
    UnknownFunction(String),

    #[error("type error: {0}")]
    #[diagnostic(code(weftrun::resolver::type_error))]
    Type(String),
}

/// Evaluate `src` against `scope`.
pub fn evaluate(src: &str, scope: &Map<String, Value>) -> Result<Evaluated, EvalError> {
    let tokens = tokenize(src)?;
    let expr = parse(&tokens)?;
    Interpreter { scope }.eval(&expr)
}

struct Interpreter<'a> {
    scope: &'a Map<String, Value>,
}

impl Interpreter<'_> {
    fn eval(&self, expr: &Expr) -> Result<Evaluated, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Evaluated::Value(num_value(*n))),
            Expr::Str(s) => Ok(Evaluated::Value(Value::String(s.clone()))),
            Expr::Bool(b) => Ok(Evaluated::Value(Value::Bool(*b))),
            Expr::Null => Ok(Evaluated::Value(Value::Null)),
            Expr::Ident(name) => Ok(match self.scope.get(name) {
                Some(value) => Evaluated::Value(value.clone()),
                None => Evaluated::Undefined,
            }),
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?.into_value());
                }
                Ok(Evaluated::Value(Value::Array(out)))
            }
            Expr::Member { object, name } => Ok(member(&self.eval(object)?, name)),
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                Ok(indexed(&object, &index))
            }
            Expr::Call { function, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?.into_value());
                }
                functions::call(function, &values).map(Evaluated::Value)
            }
            Expr::Unary { op, expr } => {
                let value = self.eval(expr)?;
                match op {
                    UnaryOp::Not => Ok(Evaluated::Value(Value::Bool(!truthy(&value)))),
                    UnaryOp::Neg => {
                        let n = number_of(&value)?;
                        Ok(Evaluated::Value(num_value(-n)))
                    }
                }
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Evaluated, EvalError> {
        // Logical operators short-circuit before the right side evaluates.
        match op {
            BinaryOp::And => {
                let lhs = self.eval(left)?;
                if !truthy(&lhs) {
                    return Ok(Evaluated::Value(Value::Bool(false)));
                }
                let rhs = self.eval(right)?;
                return Ok(Evaluated::Value(Value::Bool(truthy(&rhs))));
            }
            BinaryOp::Or => {
                let lhs = self.eval(left)?;
                if truthy(&lhs) {
                    return Ok(Evaluated::Value(Value::Bool(true)));
                }
                let rhs = self.eval(right)?;
                return Ok(Evaluated::Value(Value::Bool(truthy(&rhs))));
            }
            _ => {}
        }

        let lhs = self.eval(left)?;
        let rhs = self.eval(right)?;
        let value = match op {
            BinaryOp::Add => {
                let l = lhs.clone().into_value();
                let r = rhs.clone().into_value();
                if l.is_string() || r.is_string() {
                    Value::String(format!("{}{}", stringify(&l), stringify(&r)))
                } else {
                    num_value(number_of(&lhs)? + number_of(&rhs)?)
                }
            }
            BinaryOp::Sub => num_value(number_of(&lhs)? - number_of(&rhs)?),
            BinaryOp::Mul => num_value(number_of(&lhs)? * number_of(&rhs)?),
            BinaryOp::Div => {
                let divisor = number_of(&rhs)?;
                if divisor == 0.0 {
                    return Err(EvalError::Type("division by zero".into()));
                }
                num_value(number_of(&lhs)? / divisor)
            }
            BinaryOp::Rem => {
                let divisor = number_of(&rhs)?;
                if divisor == 0.0 {
                    return Err(EvalError::Type("division by zero".into()));
                }
                num_value(number_of(&lhs)? % divisor)
            }
            BinaryOp::Eq => Value::Bool(loose_eq(&lhs, &rhs)),
            BinaryOp::NotEq => Value::Bool(!loose_eq(&lhs, &rhs)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = compare(&lhs, &rhs)?;
                Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };
        Ok(Evaluated::Value(value))
    }
}

fn member(object: &Evaluated, name: &str) -> Evaluated {
    match object {
        Evaluated::Value(Value::Object(map)) => match map.get(name) {
            Some(value) => Evaluated::Value(value.clone()),
            None => Evaluated::Undefined,
        },
        _ => Evaluated::Undefined,
    }
}

fn indexed(object: &Evaluated, index: &Evaluated) -> Evaluated {
    match (object, index) {
        (Evaluated::Value(Value::Array(items)), Evaluated::Value(Value::Number(n))) => n
            .as_u64()
            .and_then(|i| items.get(i as usize))
            .map(|v| Evaluated::Value(v.clone()))
            .unwrap_or(Evaluated::Undefined),
        (Evaluated::Value(Value::Object(_)), Evaluated::Value(Value::String(key))) => {
            member(object, key)
        }
        _ => Evaluated::Undefined,
    }
}

/// Truthiness for logical operators and `!`.
pub(crate) fn truthy(value: &Evaluated) -> bool {
    match value {
        Evaluated::Undefined => false,
        Evaluated::Value(Value::Null) => false,
        Evaluated::Value(Value::Bool(b)) => *b,
        Evaluated::Value(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Evaluated::Value(Value::String(s)) => !s.is_empty(),
        Evaluated::Value(_) => true,
    }
}

fn number_of(value: &Evaluated) -> Result<f64, EvalError> {
    match value {
        Evaluated::Value(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| EvalError::Type("number out of range".into())),
        other => Err(EvalError::Type(format!(
            "expected a number, got {}",
            describe(other)
        ))),
    }
}

fn loose_eq(left: &Evaluated, right: &Evaluated) -> bool {
    // Undefined compares equal to null, mirroring the original's scripting
    // semantics for absent data.
    let l = left.clone().into_value();
    let r = right.clone().into_value();
    l == r
}

fn compare(left: &Evaluated, right: &Evaluated) -> Result<std::cmp::Ordering, EvalError> {
    match (left, right) {
        (Evaluated::Value(Value::Number(_)), Evaluated::Value(Value::Number(_))) => {
            let l = number_of(left)?;
            let r = number_of(right)?;
            l.partial_cmp(&r)
                .ok_or_else(|| EvalError::Type("numbers are not comparable".into()))
        }
        (Evaluated::Value(Value::String(l)), Evaluated::Value(Value::String(r))) => {
            Ok(l.cmp(r))
        }
        _ => Err(EvalError::Type(format!(
            "cannot order {} against {}",
            describe(left),
            describe(right)
        ))),
    }
}

fn describe(value: &Evaluated) -> &'static str {
    match value {
        Evaluated::Undefined => "undefined",
        Evaluated::Value(Value::Null) => "null",
        Evaluated::Value(Value::Bool(_)) => "a boolean",
        Evaluated::Value(Value::Number(_)) => "a number",
        Evaluated::Value(Value::String(_)) => "a string",
        Evaluated::Value(Value::Array(_)) => "an array",
        Evaluated::Value(Value::Object(_)) => "an object",
    }
}

/// Emit integral results as JSON integers, everything else as floats.
pub(crate) fn num_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Render a value for string concatenation and substring splicing:
/// strings raw, scalars via display, containers as compact JSON.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> Map<String, Value> {
        let mut scope = Map::new();
        scope.insert("env".into(), json!({"region": "eu", "retries": 3}));
        scope.insert(
            "input".into(),
            json!({"data": {"items": [10, 20], "name": "first"}}),
        );
        scope
    }

    fn eval_ok(src: &str) -> Evaluated {
        evaluate(src, &scope()).unwrap()
    }

    #[test]
    fn resolves_scope_members() {
        assert_eq!(eval_ok("env.region"), Evaluated::Value(json!("eu")));
        assert_eq!(eval_ok("input.data.items[1]"), Evaluated::Value(json!(20)));
        assert_eq!(eval_ok("input['data']['name']"), Evaluated::Value(json!("first")));
    }

    #[test]
    fn missing_members_are_undefined() {
        assert!(eval_ok("nope").is_undefined());
        assert!(eval_ok("env.missing.deeper").is_undefined());
        assert!(eval_ok("input.data.items[9]").is_undefined());
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval_ok("1 + 2 * 3"), Evaluated::Value(json!(7)));
        assert_eq!(eval_ok("(1 + 2) * 3"), Evaluated::Value(json!(9)));
        assert_eq!(eval_ok("7 % 4"), Evaluated::Value(json!(3)));
        assert_eq!(eval_ok("-env.retries"), Evaluated::Value(json!(-3)));
        assert_eq!(eval_ok("10 / 4"), Evaluated::Value(json!(2.5)));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(
            eval_ok("'region-' + env.region"),
            Evaluated::Value(json!("region-eu"))
        );
        assert_eq!(
            eval_ok("'retries: ' + env.retries"),
            Evaluated::Value(json!("retries: 3"))
        );
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval_ok("env.retries >= 3"), Evaluated::Value(json!(true)));
        assert_eq!(
            eval_ok("env.region == 'eu' && env.retries > 1"),
            Evaluated::Value(json!(true))
        );
        assert_eq!(eval_ok("!env.region"), Evaluated::Value(json!(false)));
        assert_eq!(eval_ok("missing == null"), Evaluated::Value(json!(true)));
    }

    #[test]
    fn division_by_zero_is_a_type_error() {
        assert!(matches!(
            evaluate("1 / 0", &scope()),
            Err(EvalError::Type(_))
        ));
    }

    #[test]
    fn unknown_function_is_rejected() {
        assert!(matches!(
            evaluate("_nope(1)", &scope()),
            Err(EvalError::UnknownFunction(_))
        ));
    }

    #[test]
    fn integral_results_stay_integers() {
        assert_eq!(num_value(3.0), json!(3));
        assert_eq!(num_value(3.5), json!(3.5));
    }
}
