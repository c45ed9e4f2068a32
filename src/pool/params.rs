//! `$n` placeholder substitution for simple queries

use crate::error::{PoolError, Result};
use crate::value::Value;

/// Replace every `$n` in `sql` with the SQL literal for `params[n - 1]`
///
/// Text is single-quoted with embedded quotes doubled. Null, booleans and
/// numbers are written verbatim. Byte strings and non-finite floats have no
/// literal form and are rejected.
pub fn substitute_params(sql: &str, params: &[Value]) -> Result<String> {
    let mut out = String::with_capacity(sql.len() + params.len() * 8);
    let mut chars = sql.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let mut index: Option<usize> = None;
        while let Some(&(_, d)) = chars.peek() {
            let Some(digit) = d.to_digit(10) else { break };
            index = Some(
                index
                    .unwrap_or(0)
                    .saturating_mul(10)
                    .saturating_add(digit as usize),
            );
            chars.next();
        }

        match index {
            None => out.push('$'),
            Some(index) => {
                let value = index
                    .checked_sub(1)
                    .and_then(|i| params.get(i))
                    .ok_or(PoolError::MissingValue {
                        index,
                        count: params.len(),
                    })?;
                push_literal(&mut out, index, value)?;
            }
        }
    }

    Ok(out)
}

fn push_literal(out: &mut String, index: usize, value: &Value) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::BigInt(n) => out.push_str(&n.to_string()),
        Value::Float(x) if x.is_finite() => out.push_str(&x.to_string()),
        Value::Text(s) => {
            out.push('\'');
            out.push_str(&s.replace('\'', "''"));
            out.push('\'');
        }
        Value::Float(_) | Value::Bytes(_) => {
            return Err(PoolError::UnsupportedValue { index }.into());
        }
    }
    Ok(())
}
