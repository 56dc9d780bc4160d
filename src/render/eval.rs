use super::{
    compare::{compare_values, equals, is_truthy},
    pipe::stringify,
};
use crate::{
    compile::expr::{token::Operator, Expr, Part, Statement, StatementKind},
    escape::raw,
    extension::Extensions,
    log::{error_iterator, error_missing_method, Error, Frame, INCOMPATIBLE_TYPES},
};
use serde_json::{json, Map, Number, Value};

/// Class name used for frames of extension method calls.
pub(crate) const EXTENSION_PLUMBING: &str = "fastergt.expr.Extensions";

/// Largest string length, list length or range an expression may build.
pub(crate) const MAX_SIZE: usize = 1 << 24;

fn error_too_large(what: &str, size: impl std::fmt::Display) -> Error {
    Error::build(format!("{what} of size {size} is too large"))
        .with_help(format!("expressions may not build values larger than {MAX_SIZE}"))
}

/// Evaluates expressions and runs scripts against the binding of a template
/// instance.
///
/// Variables are looked up in the binding, then in the layout data of the
/// render. Scripts assign to the binding and print to the live output.
pub(crate) struct Evaluator<'a> {
    binding: &'a mut Map<String, Value>,
    layout: &'a Map<String, Value>,
    extensions: &'a Extensions,
    out: &'a mut String,
    /// 0-based script line of the statement being run.
    line: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        binding: &'a mut Map<String, Value>,
        layout: &'a Map<String, Value>,
        extensions: &'a Extensions,
        out: &'a mut String,
    ) -> Self {
        Self {
            binding,
            layout,
            extensions,
            out,
            line: 0,
        }
    }

    /// Return the script line of the last statement that was started.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Run the statements of a script in order.
    pub fn run(&mut self, statements: &[Statement]) -> Result<(), Error> {
        for statement in statements {
            self.line = statement.line;
            self.statement(statement)?;
        }

        Ok(())
    }

    fn statement(&mut self, statement: &Statement) -> Result<(), Error> {
        match &statement.kind {
            StatementKind::Expr(expr) => {
                self.evaluate(expr)?;
            }
            StatementKind::Declare { name, value } => {
                let value = match value {
                    Some(value) => self.evaluate(value)?,
                    None => Value::Null,
                };
                self.binding.insert(name.clone(), value);
            }
            StatementKind::Assign {
                target,
                operator,
                value,
            } => {
                let mut value = self.evaluate(value)?;
                if let Some(operator) = operator {
                    value = arithmetic(&self.evaluate(target)?, *operator, &value)?;
                }
                *self.place(target)? = value;
            }
            StatementKind::If {
                test,
                then,
                otherwise,
            } => {
                if is_truthy(&self.evaluate(test)?) {
                    self.run(then)?;
                } else {
                    self.run(otherwise)?;
                }
            }
            StatementKind::For {
                name,
                iterable,
                body,
            } => {
                for item in iterate(&self.evaluate(iterable)?)? {
                    self.binding.insert(name.clone(), item);
                    self.run(body)?;
                }
            }
            StatementKind::Print { value, newline } => {
                if let Some(value) = value {
                    let text = stringify(&self.evaluate(value)?);
                    self.out.push_str(&text);
                }
                if *newline {
                    self.out.push('\n');
                }
            }
        }

        Ok(())
    }

    /// Return a mutable reference to the value an assignment writes.
    ///
    /// A variable found only in layout data is copied into the binding first.
    fn place(&mut self, target: &Expr) -> Result<&mut Value, Error> {
        match target {
            Expr::Variable(name) => {
                let fallback = self.layout.get(name).cloned().unwrap_or(Value::Null);

                Ok(self.binding.entry(name.as_str()).or_insert(fallback))
            }
            Expr::Property { receiver, name, .. } => match self.place(receiver)? {
                Value::Object(object) => Ok(object.entry(name.as_str()).or_insert(Value::Null)),
                Value::Null => Err(Error::build(format!(
                    "Cannot set property '{name}' on null object"
                ))),
                other => Err(Error::build(format!(
                    "No such property: {name} for class: {}",
                    type_name(other)
                ))),
            },
            Expr::Index { receiver, index } => {
                let index = self.evaluate(index)?;
                match self.place(receiver)? {
                    Value::Array(array) => {
                        let position = index
                            .as_u64()
                            .ok_or_else(|| Error::build(format!("Invalid list index {index}")))?
                            as usize;
                        if position >= MAX_SIZE {
                            return Err(error_too_large("List", position));
                        }
                        if position >= array.len() {
                            array.resize(position + 1, Value::Null);
                        }

                        Ok(&mut array[position])
                    }
                    Value::Object(object) => {
                        Ok(object.entry(stringify(&index)).or_insert(Value::Null))
                    }
                    Value::Null => Err(Error::build(
                        "Cannot invoke method putAt() on null object",
                    )),
                    other => Err(error_missing_method("putAt", type_name(other))),
                }
            }
            _ => Err(Error::build("invalid assignment target")),
        }
    }

    /// Evaluate an expression.
    pub fn evaluate(&self, expr: &Expr) -> Result<Value, Error> {
        let value = match expr {
            Expr::Literal(value) => value.clone(),
            Expr::Interpolated(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        Part::Text(part) => text.push_str(part),
                        Part::Expr(expr) => text.push_str(&stringify(&self.evaluate(expr)?)),
                    }
                }

                Value::String(text)
            }
            Expr::Variable(name) => self.variable(name),
            Expr::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.evaluate(item))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Map(entries) => {
                let mut object = Map::new();
                for (key, value) in entries {
                    object.insert(stringify(&self.evaluate(key)?), self.evaluate(value)?);
                }

                Value::Object(object)
            }
            Expr::Range {
                from,
                to,
                exclusive,
            } => range(&self.evaluate(from)?, &self.evaluate(to)?, *exclusive)?,
            Expr::Not(expr) => Value::Bool(!is_truthy(&self.evaluate(expr)?)),
            Expr::Negate(expr) => match self.evaluate(expr)? {
                Value::Number(number) => negate(&number),
                other => {
                    return Err(Error::build(INCOMPATIBLE_TYPES)
                        .with_help(format!("`{other}` cannot be negated")))
                }
            },
            Expr::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                match operator {
                    Operator::Add
                    | Operator::Subtract
                    | Operator::Multiply
                    | Operator::Divide
                    | Operator::Modulo => arithmetic(&left, *operator, &right)?,
                    _ => Value::Bool(compare_values(&left, *operator, &right)?),
                }
            }
            Expr::And(left, right) => Value::Bool(
                is_truthy(&self.evaluate(left)?) && is_truthy(&self.evaluate(right)?),
            ),
            Expr::Or(left, right) => Value::Bool(
                is_truthy(&self.evaluate(left)?) || is_truthy(&self.evaluate(right)?),
            ),
            Expr::Ternary {
                test,
                then,
                otherwise,
            } => {
                if is_truthy(&self.evaluate(test)?) {
                    self.evaluate(then)?
                } else {
                    self.evaluate(otherwise)?
                }
            }
            Expr::Elvis(value, fallback) => {
                let value = self.evaluate(value)?;
                if is_truthy(&value) {
                    value
                } else {
                    self.evaluate(fallback)?
                }
            }
            Expr::Property {
                receiver,
                name,
                safe,
            } => match self.evaluate(receiver)? {
                Value::Null if *safe => Value::Null,
                Value::Null => {
                    return Err(Error::build(format!(
                        "Cannot get property '{name}' on null object"
                    )))
                }
                receiver => property(&receiver, name)?,
            },
            Expr::Index { receiver, index } => {
                let receiver = self.evaluate(receiver)?;
                let index = self.evaluate(index)?;

                element(&receiver, &index)?
            }
            Expr::Call {
                receiver,
                name,
                args,
                safe,
            } => {
                let receiver = match receiver {
                    Some(receiver) => Some(self.evaluate(receiver)?),
                    None => None,
                };
                let args = args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<Result<Vec<_>, _>>()?;

                match receiver {
                    Some(Value::Null) if *safe => Value::Null,
                    Some(Value::Null) => {
                        return Err(Error::build(format!(
                            "Cannot invoke method {name}() on null object"
                        )))
                    }
                    Some(receiver) => self.call(&receiver, name, &args)?,
                    None => match self.extensions.get(name) {
                        Some(extension) => extension
                            .call(&Value::Null, &args)
                            .map_err(|e| e.with_frame(Frame::engine(EXTENSION_PLUMBING, name)))?,
                        None => return Err(error_missing_method(name, "template")),
                    },
                }
            }
        };

        Ok(value)
    }

    fn variable(&self, name: &str) -> Value {
        self.binding
            .get(name)
            .or_else(|| self.layout.get(name))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Call a method on a value.
    ///
    /// A map holding the name answers a call without arguments, then extension
    /// methods are tried, then the built-in methods.
    fn call(&self, receiver: &Value, name: &str, args: &[Value]) -> Result<Value, Error> {
        if let (Value::Object(object), []) = (receiver, args) {
            if let Some(value) = object.get(name) {
                return Ok(value.clone());
            }
        }
        if let Some(extension) = self.extensions.get(name) {
            return extension
                .call(receiver, args)
                .map_err(|e| e.with_frame(Frame::engine(EXTENSION_PLUMBING, name)));
        }

        match builtin(receiver, name, args) {
            Some(result) => result,
            None => Err(error_missing_method(name, type_name(receiver))),
        }
    }
}

/// Return the items a value iterates over.
///
/// Map entries are iterated as objects with `key` and `value`.
///
/// # Errors
///
/// Returns an [`Error`] for values that are not collections.
pub(crate) fn iterate(value: &Value) -> Result<Vec<Value>, Error> {
    match value {
        Value::Null => Ok(vec![]),
        Value::Array(items) => Ok(items.clone()),
        Value::Object(object) => Ok(object
            .iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect()),
        other => Err(error_iterator(other)),
    }
}

/// Return a short name for the type of a value, used in error messages.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "Boolean",
        Value::Number(number) if number.is_f64() => "BigDecimal",
        Value::Number(_) => "Integer",
        Value::String(_) => "String",
        Value::Array(_) => "List",
        Value::Object(_) => "Map",
    }
}

fn property(receiver: &Value, name: &str) -> Result<Value, Error> {
    match receiver {
        Value::Object(object) => Ok(object.get(name).cloned().unwrap_or(Value::Null)),
        // A property of a list is collected from every item.
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => Ok(Value::Null),
                item => property(item, name),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::String(text) if name == "empty" => Ok(Value::Bool(text.is_empty())),
        other => Err(Error::build(format!(
            "No such property: {name} for class: {}",
            type_name(other)
        ))),
    }
}

fn element(receiver: &Value, index: &Value) -> Result<Value, Error> {
    match (receiver, index) {
        (Value::Null, _) => Err(Error::build("Cannot invoke method getAt() on null object")),
        (Value::Array(items), Value::Number(number)) => {
            Ok(position(items.len(), number).and_then(|i| items.get(i)).cloned().unwrap_or(Value::Null))
        }
        (Value::String(text), Value::Number(number)) => {
            let chars: Vec<char> = text.chars().collect();
            position(chars.len(), number)
                .and_then(|i| chars.get(i))
                .map(|c| Value::String(c.to_string()))
                .ok_or_else(|| Error::build(format!("String index out of range: {number}")))
        }
        (Value::Object(object), key) => Ok(object.get(&stringify(key)).cloned().unwrap_or(Value::Null)),
        (receiver, _) => Err(error_missing_method("getAt", type_name(receiver))),
    }
}

/// Resolve an index, where negative numbers count from the end.
fn position(len: usize, index: &Number) -> Option<usize> {
    let index = index.as_i64()?;
    if index < 0 {
        len.checked_sub(index.unsigned_abs() as usize)
    } else {
        Some(index as usize)
    }
}

fn negate(number: &Number) -> Value {
    match number.as_i64().and_then(i64::checked_neg) {
        Some(integer) => json!(integer),
        None => float(-number.as_f64().unwrap_or(0.0)),
    }
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn range(from: &Value, to: &Value, exclusive: bool) -> Result<Value, Error> {
    let (Some(from), Some(to)) = (from.as_i64(), to.as_i64()) else {
        return Err(Error::build(INCOMPATIBLE_TYPES)
            .with_help(format!("a range needs integer bounds, found `{from}` and `{to}`")));
    };

    if from.abs_diff(to) >= MAX_SIZE as u64 {
        return Err(error_too_large("Range", from.abs_diff(to)));
    }

    let items: Vec<i64> = match (from <= to, exclusive) {
        (true, false) => (from..=to).collect(),
        (true, true) => (from..to).collect(),
        (false, false) => (to..=from).rev().collect(),
        (false, true) => ((to + 1)..=from).rev().collect(),
    };

    Ok(json!(items))
}

/// Apply an arithmetic [`Operator`].
///
/// Adding to a string concatenates, adding to a list appends, and integer
/// division stays an integer when there is no remainder.
pub(crate) fn arithmetic(left: &Value, operator: Operator, right: &Value) -> Result<Value, Error> {
    let value = match (left, operator, right) {
        (Value::String(left), Operator::Add, right) => {
            Value::String(format!("{left}{}", stringify(right)))
        }
        (Value::String(left), Operator::Multiply, Value::Number(count)) => {
            let count = count.as_u64().unwrap_or(0);
            let size = (left.len() as u64).saturating_mul(count);
            if size > MAX_SIZE as u64 {
                return Err(error_too_large("String", size));
            }

            Value::String(left.repeat(count as usize))
        }
        (Value::Array(left), Operator::Add, Value::Array(right)) => {
            Value::Array(left.iter().chain(right).cloned().collect())
        }
        (Value::Array(left), Operator::Add, right) => {
            Value::Array(left.iter().chain([right]).cloned().collect())
        }
        (Value::Array(left), Operator::Subtract, right) => {
            let removed = match right {
                Value::Array(right) => right.clone(),
                right => vec![right.clone()],
            };

            Value::Array(
                left.iter()
                    .filter(|item| !removed.iter().any(|r| equals(item, r)))
                    .cloned()
                    .collect(),
            )
        }
        (Value::Object(left), Operator::Add, Value::Object(right)) => {
            let mut merged = left.clone();
            merged.extend(right.iter().map(|(k, v)| (k.clone(), v.clone())));

            Value::Object(merged)
        }
        (Value::Number(left), operator, Value::Number(right)) => numeric(left, operator, right)?,
        (left, operator, right) => {
            return Err(Error::build(INCOMPATIBLE_TYPES).with_help(format!(
                "operator `{operator}` cannot be applied to `{left}` and `{right}`"
            )))
        }
    };

    Ok(value)
}

fn numeric(left: &Number, operator: Operator, right: &Number) -> Result<Value, Error> {
    if let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) {
        let integer = match operator {
            Operator::Add => l.checked_add(r),
            Operator::Subtract => l.checked_sub(r),
            Operator::Multiply => l.checked_mul(r),
            Operator::Divide | Operator::Modulo if r == 0 => {
                return Err(Error::build("Division by zero"))
            }
            Operator::Divide if l.checked_rem(r) == Some(0) => l.checked_div(r),
            Operator::Divide => None,
            Operator::Modulo => l.checked_rem(r),
            _ => None,
        };
        if let Some(integer) = integer {
            return Ok(json!(integer));
        }
    }

    let (l, r) = (left.as_f64().unwrap_or(0.0), right.as_f64().unwrap_or(0.0));
    let result = match operator {
        Operator::Add => l + r,
        Operator::Subtract => l - r,
        Operator::Multiply => l * r,
        Operator::Divide | Operator::Modulo if r == 0.0 => {
            return Err(Error::build("Division by zero"))
        }
        Operator::Divide => l / r,
        Operator::Modulo => l % r,
        unsupported => {
            return Err(Error::build(INCOMPATIBLE_TYPES)
                .with_help(format!("operator `{unsupported}` is not arithmetic")))
        }
    };

    Ok(float(result))
}

/// Methods every value of a type answers to, unless an extension of the same
/// name is registered.
fn builtin(receiver: &Value, name: &str, args: &[Value]) -> Option<Result<Value, Error>> {
    let value = match (receiver, name, args) {
        (_, "toString", []) => json!(stringify(receiver)),
        (_, "equals", [other]) => json!(equals(receiver, other)),
        (Value::String(text), "raw", []) => raw(text.as_str()),
        (Value::String(text), "size" | "length", []) => json!(text.chars().count()),
        (Value::String(text), "isEmpty", []) => json!(text.is_empty()),
        (Value::String(text), "toUpperCase", []) => json!(text.to_uppercase()),
        (Value::String(text), "toLowerCase", []) => json!(text.to_lowercase()),
        (Value::String(text), "trim", []) => json!(text.trim()),
        (Value::String(text), "capitalize", []) => {
            let mut chars = text.chars();
            json!(chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default())
        }
        (Value::String(text), "contains", [Value::String(part)]) => json!(text.contains(part.as_str())),
        (Value::String(text), "startsWith", [Value::String(part)]) => {
            json!(text.starts_with(part.as_str()))
        }
        (Value::String(text), "endsWith", [Value::String(part)]) => json!(text.ends_with(part.as_str())),
        (Value::String(text), "indexOf", [Value::String(part)]) => json!(text
            .find(part.as_str())
            .map_or(-1, |index| text[..index].chars().count() as i64)),
        (Value::String(text), "replace", [Value::String(from), Value::String(to)]) => {
            json!(text.replace(from.as_str(), to))
        }
        (Value::String(text), "split", [Value::String(separator)]) => {
            json!(text.split(separator.as_str()).collect::<Vec<_>>())
        }
        (Value::String(text), "substring", [from, rest @ ..]) => {
            let chars: Vec<char> = text.chars().collect();
            let from = from.as_u64().map(|from| from as usize);
            let to = match rest {
                [] => Some(chars.len()),
                [to] => to.as_u64().map(|to| to as usize),
                _ => None,
            };
            match (from, to) {
                (Some(from), Some(to)) if from <= to && to <= chars.len() => {
                    json!(chars[from..to].iter().collect::<String>())
                }
                _ => {
                    return Some(Err(Error::build(format!(
                        "String index out of range for substring of `{text}`"
                    ))))
                }
            }
        }
        (Value::Array(items), "size", []) => json!(items.len()),
        (Value::Array(items), "isEmpty", []) => json!(items.is_empty()),
        (Value::Array(items), "contains", [item]) => json!(items.iter().any(|i| equals(i, item))),
        (Value::Array(items), "first", []) => items.first().cloned().unwrap_or(Value::Null),
        (Value::Array(items), "last", []) => items.last().cloned().unwrap_or(Value::Null),
        (Value::Array(items), "get", [Value::Number(index)]) => position(items.len(), index)
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Null),
        (Value::Array(items), "reverse", []) => json!(items.iter().rev().collect::<Vec<_>>()),
        (Value::Array(items), "join", separator) => {
            let separator = match separator {
                [] => String::new(),
                [separator] => stringify(separator),
                _ => return None,
            };

            json!(items.iter().map(stringify).collect::<Vec<_>>().join(&separator))
        }
        (Value::Object(object), "size", []) => json!(object.len()),
        (Value::Object(object), "isEmpty", []) => json!(object.is_empty()),
        (Value::Object(object), "containsKey", [key]) => json!(object.contains_key(&stringify(key))),
        (Value::Object(object), "get", [key]) => object.get(&stringify(key)).cloned().unwrap_or(Value::Null),
        (Value::Object(object), "keySet", []) => json!(object.keys().collect::<Vec<_>>()),
        (Value::Object(object), "values", []) => json!(object.values().collect::<Vec<_>>()),
        (Value::Number(number), "intValue", []) => match number.as_i64() {
            Some(integer) => json!(integer),
            None => json!(number.as_f64().unwrap_or(0.0).trunc() as i64),
        },
        (Value::Number(number), "abs", []) => match number.as_i64() {
            Some(integer) => json!(integer.abs()),
            None => float(number.as_f64().unwrap_or(0.0).abs()),
        },
        (Value::Number(number), "round", []) => json!(number.as_f64().unwrap_or(0.0).round() as i64),
        _ => return None,
    };

    Some(Ok(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::expr::{parse_expression, parse_script};

    fn eval_with(source: &str, binding: Value) -> Result<Value, Error> {
        let mut binding = match binding {
            Value::Object(binding) => binding,
            _ => Map::new(),
        };
        let layout = Map::new();
        let extensions = Extensions::new();
        let mut out = String::new();
        let evaluator = Evaluator::new(&mut binding, &layout, &extensions, &mut out);

        evaluator.evaluate(&parse_expression(source)?)
    }

    fn eval(source: &str) -> Result<Value, Error> {
        eval_with(source, json!({}))
    }

    #[test]
    fn test_arithmetic() -> Result<(), Error> {
        assert_eq!(eval("1 + 2 * 3")?, json!(7));
        assert_eq!(eval("6 / 3")?, json!(2));
        assert_eq!(eval("7 / 2")?, json!(3.5));
        assert_eq!(eval("7 % 4")?, json!(3));
        assert_eq!(eval("-(2 - 5)")?, json!(3));
        assert_eq!(eval("'a' + 1 + true")?, json!("a1true"));
        assert_eq!(eval("[1] + [2] + 3")?, json!([1, 2, 3]));
        assert_eq!(eval("[1, 2, 3] - 2")?, json!([1, 3]));
        assert!(eval("1 / 0").is_err());

        Ok(())
    }

    #[test]
    fn test_integer_overflow_falls_back_to_float() -> Result<(), Error> {
        let min = "(-9223372036854775807 - 1)";

        assert_eq!(eval(&format!("{min} / -1"))?, json!(9223372036854775808.0));
        assert_eq!(eval(&format!("{min} % -1"))?, json!(0.0));
        assert_eq!(eval(&format!("-{min}"))?, json!(9223372036854775808.0));
        assert_eq!(eval("9223372036854775807 + 1")?, json!(9223372036854775808.0));

        Ok(())
    }

    #[test]
    fn test_oversized_values_are_errors() -> Result<(), Error> {
        assert!(eval("'a' * 9999999999999999").is_err_and(|e| e.reason().contains("too large")));
        assert!(eval("1..10000000000").is_err_and(|e| e.reason().contains("too large")));
        assert_eq!(eval("'ab' * 3")?, json!("ababab"));

        let mut binding = Map::new();
        binding.insert("a".to_string(), json!([]));
        let layout = Map::new();
        let extensions = Extensions::new();
        let mut out = String::new();
        let mut evaluator = Evaluator::new(&mut binding, &layout, &extensions, &mut out);

        let result = evaluator.run(&parse_script("a[1000000000000] = 1")?);
        assert!(result.is_err_and(|e| e.reason().contains("too large")));
        evaluator.run(&parse_script("a[2] = 1")?)?;
        assert_eq!(binding.get("a"), Some(&json!([null, null, 1])));

        Ok(())
    }

    #[test]
    fn test_logic() -> Result<(), Error> {
        assert_eq!(eval("1 < 2 && 'a' == 'a'")?, json!(true));
        assert_eq!(eval("!'' || false")?, json!(true));
        assert_eq!(eval("0 ? 'yes' : 'no'")?, json!("no"));
        assert_eq!(eval("null ?: 'default'")?, json!("default"));

        Ok(())
    }

    #[test]
    fn test_navigation() -> Result<(), Error> {
        let binding = json!({ "user": { "name": "taylor", "tags": ["a", "b"] }, "users": [{ "id": 1 }, { "id": 2 }] });

        assert_eq!(eval_with("user.name", binding.clone())?, json!("taylor"));
        assert_eq!(eval_with("user.tags[-1]", binding.clone())?, json!("b"));
        assert_eq!(eval_with("user['name'].size()", binding.clone())?, json!(6));
        assert_eq!(eval_with("users.id", binding.clone())?, json!([1, 2]));
        assert_eq!(eval_with("missing?.name", binding.clone())?, json!(null));
        assert!(eval_with("missing.name", binding.clone())
            .is_err_and(|e| e.reason() == "Cannot get property 'name' on null object"));
        assert!(eval_with("missing.go()", binding)
            .is_err_and(|e| e.reason() == "Cannot invoke method go() on null object"));

        Ok(())
    }

    #[test]
    fn test_interpolation_and_ranges() -> Result<(), Error> {
        let binding = json!({ "user": { "name": "taylor" } });

        assert_eq!(eval_with("\"hi ${user.name}!\"", binding.clone())?, json!("hi taylor!"));
        assert_eq!(eval_with("\"hi $user.name\"", binding)?, json!("hi taylor"));
        assert_eq!(eval("1..3")?, json!([1, 2, 3]));
        assert_eq!(eval("3..<1")?, json!([3, 2]));

        Ok(())
    }

    #[test]
    fn test_methods() -> Result<(), Error> {
        assert_eq!(eval("'abc'.toUpperCase()")?, json!("ABC"));
        assert_eq!(eval("[1, 2, 3].join('-')")?, json!("1-2-3"));
        assert_eq!(eval("[a: 1].containsKey('a')")?, json!(true));
        assert_eq!(eval("'hello'.substring(1, 3)")?, json!("el"));
        assert!(eval("'abc'.nope()").is_err_and(|e| e.reason().contains("No signature of method")));

        Ok(())
    }

    #[test]
    fn test_extension_frames() {
        fn fail(_: &Value, _: &[Value]) -> Result<Value, Error> {
            Err(Error::build("extension failed"))
        }

        let mut binding = Map::new();
        let layout = Map::new();
        let mut extensions = Extensions::new();
        extensions.insert("fail", fail);
        let mut out = String::new();
        let evaluator = Evaluator::new(&mut binding, &layout, &extensions, &mut out);
        let result = parse_expression("'a'.fail()").and_then(|expr| evaluator.evaluate(&expr));

        assert!(result.is_err_and(|e| e.trace().first().is_some_and(|f| f.class == EXTENSION_PLUMBING)));
    }

    #[test]
    fn test_script() -> Result<(), Error> {
        let mut binding = Map::new();
        let mut layout = Map::new();
        layout.insert("total".to_string(), json!(10));
        let extensions = Extensions::new();
        let mut out = String::new();

        let statements = parse_script(
            "def a = 1\nuser = [name: 'x']\nuser.name = 'y'\ntotal += 1\n\
            for (i in 1..3) { a = a + i }\nif (a > 2) {\n  print(a)\n} else println 'no'",
        )?;
        let mut evaluator = Evaluator::new(&mut binding, &layout, &extensions, &mut out);
        evaluator.run(&statements)?;

        assert_eq!(out, "7");
        assert_eq!(binding["a"], json!(7));
        assert_eq!(binding["user"], json!({ "name": "y" }));
        assert_eq!(binding["total"], json!(11));

        Ok(())
    }

    #[test]
    fn test_script_error_line() -> Result<(), Error> {
        let mut binding = Map::new();
        let layout = Map::new();
        let extensions = Extensions::new();
        let mut out = String::new();

        let statements = parse_script("a = 1\nb = 2\nc = a.b.c")?;
        let mut evaluator = Evaluator::new(&mut binding, &layout, &extensions, &mut out);

        assert!(evaluator.run(&statements).is_err());
        assert_eq!(evaluator.line(), 2);

        Ok(())
    }

    #[test]
    fn test_iterate() -> Result<(), Error> {
        assert_eq!(iterate(&json!({ "a": 1 }))?, vec![json!({ "key": "a", "value": 1 })]);
        assert!(iterate(&json!("text")).is_err());

        Ok(())
    }
}
