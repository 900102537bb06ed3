//! Planning for sparse attribute updates.
//!
//! A patch is a JSON object of attribute names to new values. Only flat
//! scalars can be patched; nested arrays and objects describe structure and
//! go through the merge engine instead.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as Json};

use crate::{
  Error, Result,
  record::Value,
  reference::EntityUri,
  schema::{Coercion, Column, EntitySchema},
};

/// One `column = value` pair of the UPDATE a patch turns into.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment<'a> {
  pub column: &'a Column,
  pub value:  Value,
}

/// Translate a sparse map into column assignments.
///
/// Skipped without error: the `id` key, parent keys, collection attributes,
/// and any nested array or object. Unknown attributes and values that do not
/// fit their column's coercion are mapping failures. An empty result means
/// there is nothing to write.
pub fn plan<'a>(schema: &'a EntitySchema, sparse: &Map<String, Json>) -> Result<Vec<Assignment<'a>>> {
  let mut assignments = Vec::new();
  for (attr, json) in sparse {
    if attr == "id" || json.is_array() || json.is_object() || schema.is_collection(attr) {
      continue;
    }
    let column = schema
      .column(attr)
      .ok_or_else(|| Error::mapping(schema.kind, attr.as_str(), "unknown attribute"))?;
    if column.parent {
      continue;
    }
    let value = coerce(schema, column, json)?;
    assignments.push(Assignment { column, value });
  }
  Ok(assignments)
}

fn coerce(schema: &EntitySchema, column: &Column, json: &Json) -> Result<Value> {
  let fail = |reason: String| Error::mapping(schema.kind, column.attr, reason);

  if json.is_null() {
    return if column.coercion.is_nullable() {
      Ok(Value::Null)
    } else {
      Err(fail("value may not be null".into()))
    };
  }

  match column.coercion {
    Coercion::Integer | Coercion::NullableInteger => json
      .as_i64()
      .map(Value::Integer)
      .ok_or_else(|| fail(format!("expected integer, found {json}"))),
    Coercion::Bool => json
      .as_bool()
      .map(Value::Bool)
      .ok_or_else(|| fail(format!("expected bool, found {json}"))),
    Coercion::Text | Coercion::NullableText => json
      .as_str()
      .map(|s| Value::Text(s.to_owned()))
      .ok_or_else(|| fail(format!("expected string, found {json}"))),
    Coercion::Enum(variants) => match json.as_str() {
      Some(name) if variants.contains(&name) => Ok(Value::Text(name.to_owned())),
      _ => Err(fail(format!("expected one of {variants:?}, found {json}"))),
    },
    Coercion::Uri => json
      .as_str()
      .and_then(|s| s.parse::<EntityUri>().ok())
      .map(Value::Uri)
      .ok_or_else(|| fail(format!("expected kind/id reference, found {json}"))),
    Coercion::NullableTimestamp => json
      .as_str()
      .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
      .map(|dt| Value::Timestamp(dt.with_timezone(&Utc)))
      .ok_or_else(|| fail(format!("expected RFC 3339 timestamp, found {json}"))),
    Coercion::Collection => Err(fail("collections cannot be patched".into())),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::{reference::EntityKind, schema::Catalog};

  fn sparse(v: Json) -> Map<String, Json> {
    match v {
      Json::Object(map) => map,
      _ => unreachable!(),
    }
  }

  #[test]
  fn plans_scalar_assignments() {
    let catalog = Catalog::standard().unwrap();
    let schema = catalog.schema(EntityKind::Section).unwrap();
    let map = sparse(json!({ "title": "Appendix", "sectionType": "ENDNOTE", "template": null }));

    let plan = plan(schema, &map).unwrap();
    let columns: Vec<_> = plan.iter().map(|a| a.column.name.as_str()).collect();
    assert_eq!(columns, ["section_type", "template", "title"]);
    assert_eq!(plan[2].value, Value::Text("Appendix".into()));
    assert_eq!(plan[1].value, Value::Null);
  }

  #[test]
  fn skips_identity_parent_and_structure() {
    let catalog = Catalog::standard().unwrap();
    let schema = catalog.schema(EntityKind::Section).unwrap();
    let map = sparse(json!({
      "id": 4,
      "publication": 9,
      "rules": [{ "ruleType": "LINK", "selector": "a" }],
      "extra": { "nested": true },
    }));
    assert!(plan(schema, &map).unwrap().is_empty());
  }

  #[test]
  fn rejects_unknown_and_ill_typed_values() {
    let catalog = Catalog::standard().unwrap();
    let schema = catalog.schema(EntityKind::Rule).unwrap();

    assert!(matches!(
      plan(schema, &sparse(json!({ "colour": "red" }))),
      Err(Error::Mapping { .. })
    ));
    assert!(matches!(
      plan(schema, &sparse(json!({ "ruleType": "SPARKLE" }))),
      Err(Error::Mapping { .. })
    ));
    assert!(matches!(
      plan(schema, &sparse(json!({ "selector": null }))),
      Err(Error::Mapping { .. })
    ));
  }

  #[test]
  fn uri_values_are_parsed() {
    let catalog = Catalog::standard().unwrap();
    let schema = catalog.schema(EntityKind::Source).unwrap();
    let plan = plan(schema, &sparse(json!({ "outline": "outline/3" }))).unwrap();
    assert_eq!(plan, [Assignment {
      column: schema.column("outline").unwrap(),
      value:  Value::Uri(EntityUri::new(EntityKind::Outline, 3)),
    }]);
  }
}
