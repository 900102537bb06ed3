//! Conversions between record [`Value`]s and SQLite column values.
//!
//! Timestamps are stored as RFC 3339 strings, entity references as
//! `kind/id` text and booleans as `0`/`1` integers. Reading is driven by
//! the column's declared coercion, so a row that does not fit its descriptor
//! surfaces as a mapping failure naming the offending attribute.

use chrono::{DateTime, Utc};
use folio_core::{
  Error as CoreError,
  record::Value,
  reference::{EntityKind, EntityUri},
  schema::{Coercion, Column},
};
use rusqlite::{Row, types::ValueRef};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Value → SQL ─────────────────────────────────────────────────────────────

pub fn to_sql(value: &Value) -> rusqlite::types::Value {
  use rusqlite::types::Value as Sql;
  match value {
    Value::Null => Sql::Null,
    Value::Integer(i) => Sql::Integer(*i),
    Value::Bool(b) => Sql::Integer(i64::from(*b)),
    Value::Text(s) => Sql::Text(s.clone()),
    Value::Uri(uri) => Sql::Text(uri.to_string()),
    Value::Timestamp(dt) => Sql::Text(encode_dt(*dt)),
  }
}

// ─── SQL → Value ─────────────────────────────────────────────────────────────

/// Read column `idx` of `row` as the value `column` declares.
pub fn read_value(row: &Row<'_>, idx: usize, column: &Column, kind: EntityKind) -> Result<Value> {
  let fail = |reason: String| -> Error { CoreError::mapping(kind, column.attr, reason).into() };
  let raw = row.get_ref(idx)?;

  if let ValueRef::Null = raw {
    return if column.coercion.is_nullable() {
      Ok(Value::Null)
    } else {
      Err(fail("null in a non-nullable column".into()))
    };
  }

  match column.coercion {
    Coercion::Integer | Coercion::NullableInteger => match raw {
      ValueRef::Integer(i) => Ok(Value::Integer(i)),
      other => Err(fail(format!("expected integer, found {}", other.data_type()))),
    },
    Coercion::Bool => match raw {
      ValueRef::Integer(i) => Ok(Value::Bool(i != 0)),
      other => Err(fail(format!("expected boolean, found {}", other.data_type()))),
    },
    Coercion::Text | Coercion::NullableText => Ok(Value::Text(text(raw).map_err(fail)?.to_owned())),
    Coercion::Enum(variants) => {
      let name = text(raw).map_err(fail)?;
      if variants.contains(&name) {
        Ok(Value::Text(name.to_owned()))
      } else {
        Err(fail(format!("unknown variant {name:?}")))
      }
    }
    Coercion::Uri => {
      let s = text(raw).map_err(fail)?;
      s.parse::<EntityUri>()
        .map(Value::Uri)
        .map_err(|_| fail(format!("malformed reference {s:?}")))
    }
    Coercion::NullableTimestamp => {
      let s = text(raw).map_err(fail)?;
      decode_dt(s).map(Value::Timestamp).map_err(|e| fail(e.to_string()))
    }
    Coercion::Collection => Err(fail("collections are not stored in columns".into())),
  }
}

fn text<'a>(raw: ValueRef<'a>) -> Result<&'a str, String> {
  match raw {
    ValueRef::Text(bytes) => std::str::from_utf8(bytes).map_err(|e| e.to_string()),
    other => Err(format!("expected text, found {}", other.data_type())),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dt_round_trips() {
    let now = Utc::now();
    assert_eq!(decode_dt(&encode_dt(now)).unwrap(), now);
    assert!(decode_dt("yesterday").is_err());
  }

  #[test]
  fn bools_and_uris_become_sql_scalars() {
    use rusqlite::types::Value as Sql;
    assert_eq!(to_sql(&Value::Bool(true)), Sql::Integer(1));
    assert_eq!(
      to_sql(&Value::Uri(EntityUri::new(EntityKind::Outline, 3))),
      Sql::Text("outline/3".into())
    );
  }
}
