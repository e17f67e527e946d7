use super::{
    errors::QueryError,
    result::QueryResult,
};
use memchr::memchr;
use serde_json::{Map, Number, Value};

// Filter language
//
// Каждая непустая строка - одно условие вида `param : value`.
// Строки с `#` в начале - комментарии. Все условия объединяются через $and.

pub const FIELD_PREFIX: &str = "config.";
pub const NON_EXISTENT: &str = "---";

pub const HELP_TEXT: &str = "\
Enter several lines with conditions. The basic form is
    param : value
where the value is converted to int, float, bool, none or kept as text.
Alternative (\"or\") conditions are written in list style:
    param : [ val1, val2, ... ]
Regular expressions are enclosed in slashes:
    param : /reg.*exp/
The nonexistence of a field is written as:
    param : ---
";

/// Parses filter text into a MongoDB query document.
///
/// Returns `{}` when the text holds no conditions, `{"$and": [...]}` with one
/// entry per condition line otherwise. Line numbers in errors are 1-based.
pub fn parse_query(text: &str) -> QueryResult<Value> {
    let mut conditions: Vec<Value> = Vec::new();
    let mut fields: Vec<String> = Vec::new();

    for (index, line) in text.split('\n').enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let colon = memchr(b':', line.as_bytes())
            .ok_or(QueryError::MissingColon { line: line_no })?;
        let name = line[..colon].trim();
        let content = line[colon + 1..].trim();

        let field = format!("{FIELD_PREFIX}{name}");
        if fields.contains(&field) {
            return Err(QueryError::DuplicateField { field, line: line_no });
        }

        let condition = if is_enclosed(content, '[', ']') {
            parse_alternatives(&field, content, line_no)?
        } else if is_enclosed(content, '/', '/') {
            let pattern = content[1..content.len() - 1].trim();
            let mut operator = Map::new();
            operator.insert("$regex".to_string(), Value::String(pattern.to_string()));
            single(&field, Value::Object(operator))
        } else if content == NON_EXISTENT {
            let mut operator = Map::new();
            operator.insert("$exists".to_string(), Value::Bool(false));
            single(&field, Value::Object(operator))
        } else {
            single(&field, convert_literal(content))
        };

        conditions.push(condition);
        fields.push(field);
    }

    if conditions.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let mut query = Map::new();
    query.insert("$and".to_string(), Value::Array(conditions));
    Ok(Value::Object(query))
}

pub fn is_empty_query(query: &Value) -> bool {
    query.as_object().is_none_or(Map::is_empty)
}

// int -> float -> none/true/false -> string
pub fn convert_literal(text: &str) -> Value {
    if let Ok(int) = text.parse::<i64>() {
        return Value::from(int);
    }
    if let Some(number) = text.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    match text.to_ascii_uppercase().as_str() {
        "NONE" => Value::Null,
        "TRUE" => Value::Bool(true),
        "FALSE" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

fn is_enclosed(content: &str, open: char, close: char) -> bool {
    content.len() >= 2 && content.starts_with(open) && content.ends_with(close)
}

fn parse_alternatives(field: &str, content: &str, line: usize) -> QueryResult<Value> {
    let inner = &content[1..content.len() - 1];
    if inner.contains(|c: char| c == '[' || c == ']') {
        return Err(QueryError::MalformedAlternatives { line });
    }

    let values: Vec<&str> = inner.split(',').map(str::trim).collect();
    if values.len() == 1 {
        // just one alternative, not a real 'or'
        return Ok(single(field, convert_literal(values[0])));
    }

    let alternatives = values
        .into_iter()
        .map(|value| single(field, convert_literal(value)))
        .collect();
    let mut query = Map::new();
    query.insert("$or".to_string(), Value::Array(alternatives));
    Ok(Value::Object(query))
}

fn single(field: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(field.to_string(), value);
    Value::Object(map)
}
