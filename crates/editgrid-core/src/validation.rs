//! Column constraint checks
//!
//! Each writable field is checked for type coercibility, then range, length
//! and enumerated membership. Valid values are normalized in place to their
//! typed form; the first failing check per field produces its message.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use editgrid_model::{ColumnSchema, ColumnType, Row, Value};

/// A field that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Field name
    pub field: String,
    /// User-facing message
    pub message: String,
}

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Validate and normalize every writable field of `row`
pub fn validate_row(row: &mut Row) -> Vec<FieldIssue> {
    let schema = std::sync::Arc::clone(row.schema());
    let mut issues = Vec::new();
    for column in schema.writable() {
        let Some(value) = row.get(column.name()) else {
            continue;
        };
        match validate_value(column, &value) {
            Ok(normalized) => row.set(column.name(), normalized),
            Err(message) => issues.push(FieldIssue {
                field: column.name().to_string(),
                message,
            }),
        }
    }
    issues
}

/// Check one value against its column, returning the normalized value
///
/// # Errors
/// The user-facing message of the first failed constraint
pub fn validate_value(column: &ColumnSchema, value: &Value) -> Result<Value, String> {
    let mut value = value.clone();
    if value.is_blank() {
        if let Some(empty) = column.inset.as_ref().and_then(|c| c.empty.clone()) {
            value = Value::Text(empty);
        }
    }

    let typed = coerce_type(column.column_type, &value)?;
    check_range(column, &typed)?;
    check_length(column, &typed)?;
    check_inset(column, typed)
}

fn coerce_type(column_type: ColumnType, value: &Value) -> Result<Value, String> {
    if value.is_blank() {
        return Ok(match column_type {
            ColumnType::String => Value::text(""),
            ColumnType::Boolean => Value::Bool(false),
            _ => Value::Null,
        });
    }

    match column_type {
        ColumnType::String => Ok(value.clone()),
        ColumnType::Integer => match value {
            Value::Integer(_) => Ok(value.clone()),
            other => other
                .to_string()
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| "enter an integer".to_string()),
        },
        ColumnType::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            other => other
                .to_string()
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Number)
                .ok_or_else(|| "enter a number".to_string()),
        },
        ColumnType::Boolean => value
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| "enter a boolean".to_string()),
        ColumnType::Date => NaiveDate::parse_from_str(value.to_string().trim(), DATE_FORMAT)
            .map(|d| Value::Text(d.format(DATE_FORMAT).to_string()))
            .map_err(|_| "enter a valid date".to_string()),
        ColumnType::Time => {
            let text = value.to_string();
            let mut parts: Vec<&str> = text.trim().split(':').collect();
            while parts.len() < 3 {
                parts.push("00");
            }
            NaiveTime::parse_from_str(&parts.join(":"), TIME_FORMAT)
                .map(|t| Value::Text(t.format(TIME_FORMAT).to_string()))
                .map_err(|_| "enter a valid time".to_string())
        }
        ColumnType::Datetime => {
            let text = value.to_string();
            let text = text.trim();
            NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
                .map(|dt| Value::Text(dt.format(DATETIME_FORMAT).to_string()))
                .map_err(|_| "enter a valid datetime".to_string())
        }
    }
}

fn check_range(column: &ColumnSchema, value: &Value) -> Result<(), String> {
    let Some(range) = column.range else {
        return Ok(());
    };
    #[allow(clippy::cast_precision_loss)]
    let number = match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Number(f) => Some(*f),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if range.contains(n) => Ok(()),
        _ => Err(format!(
            "enter a value between {} and {}",
            range.min(),
            range.max()
        )),
    }
}

fn check_length(column: &ColumnSchema, value: &Value) -> Result<(), String> {
    let Some(length) = column.length else {
        return Ok(());
    };
    let chars = value.to_string().chars().count();
    if chars < length.min() || chars > length.max() {
        return Err(format!(
            "enter from {} to {} characters",
            length.min(),
            length.max()
        ));
    }
    Ok(())
}

fn check_inset(column: &ColumnSchema, value: Value) -> Result<Value, String> {
    let Some(choices) = column.inset.as_ref() else {
        return Ok(value);
    };
    let items = value.items();
    let accepted = if items.is_empty() {
        choices.multiple || choices.accepts("")
    } else {
        items.iter().all(|item| choices.accepts(item))
    };
    if !accepted {
        return Err("value not allowed".to_string());
    }
    if choices.multiple {
        Ok(Value::List(items))
    } else {
        Ok(value)
    }
}
