//! Three-way reconciliation of a stored child collection with a submitted
//! replacement.
//!
//! Stored and submitted children are paired by logical identity, never by
//! id: submitted graphs routinely carry no ids or stale ones. Every pairing
//! decision passes through an optional permission filter. The engine itself
//! performs no I/O; a [`ChildSink`] turns its decisions into statements.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, reference::EntityKind};

/// Outcome counters of one [`merge_children`] call.
///
/// `added + modified + rejected` always equals the number of submitted
/// children plus the number of unclaimed stored children that were rejected
/// for deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCounts {
  pub added:    usize,
  pub deleted:  usize,
  pub modified: usize,
  pub rejected: usize,
}

impl MergeCounts {
  pub fn is_noop(&self) -> bool { self.added == 0 && self.deleted == 0 && self.modified == 0 }
}

/// Receives the store operations a merge decides on.
pub trait ChildSink<T> {
  type Error;

  /// `old` was matched by `new` and the filter allowed it. The sink diffs
  /// the pair, writes what changed, and recurses into nested collections.
  fn update(&mut self, old: &mut T, new: &mut T) -> Result<(), Self::Error>;

  /// `old` was not claimed by any submitted child in a replacing merge.
  fn delete(&mut self, old: T) -> Result<(), Self::Error>;

  /// `new` matched nothing stored and must be inserted under the parent.
  fn insert(&mut self, new: &mut T) -> Result<(), Self::Error>;
}

/// Per-child veto. `Ok(false)` skips the child and counts it as rejected;
/// an error aborts the whole merge.
pub type Filter<'a, T, E> = &'a mut dyn FnMut(&T) -> Result<bool, E>;

/// Reconcile `old` (as stored) with `new` (as submitted).
///
/// 1. `old` is sorted by `cmp`.
/// 2. Each submitted child is looked up by binary search. A match is claimed
///    and, if permitted, updated; otherwise it is rejected. Unmatched
///    submitted children are queued.
/// 3. With `replacing`, unclaimed stored children are deleted if permitted
///    and rejected otherwise. Without it they are left alone and uncounted.
/// 4. Queued children are inserted in submission order.
///
/// Callers must run [`ensure_distinct`] over `new` first; the pairing is
/// unspecified when two submitted children share an identity.
pub fn merge_children<T, S>(
  mut old: Vec<T>,
  new: &mut [T],
  cmp: impl Fn(&T, &T) -> Ordering,
  mut filter: Option<Filter<'_, T, S::Error>>,
  replacing: bool,
  sink: &mut S,
) -> Result<MergeCounts, S::Error>
where
  S: ChildSink<T>,
{
  let mut permits = |item: &T| -> Result<bool, S::Error> {
    match filter.as_mut() {
      Some(f) => f(item),
      None => Ok(true),
    }
  };

  old.sort_by(&cmp);
  let mut counts = MergeCounts::default();
  let mut additions = Vec::new();

  for (i, n) in new.iter_mut().enumerate() {
    match old.binary_search_by(|o| cmp(o, n)) {
      Ok(pos) => {
        let mut o = old.remove(pos);
        if permits(&o)? {
          sink.update(&mut o, n)?;
          counts.modified += 1;
        } else {
          counts.rejected += 1;
        }
      }
      Err(_) => additions.push(i),
    }
  }

  if replacing {
    for o in old {
      if permits(&o)? {
        sink.delete(o)?;
        counts.deleted += 1;
      } else {
        counts.rejected += 1;
      }
    }
  }

  for i in additions {
    sink.insert(&mut new[i])?;
    counts.added += 1;
  }

  Ok(counts)
}

/// Reject a submitted collection in which two children share an identity.
pub fn ensure_distinct<T>(
  items: &[T],
  cmp: impl Fn(&T, &T) -> Ordering,
  kind: EntityKind,
) -> Result<()> {
  let mut sorted: Vec<&T> = items.iter().collect();
  sorted.sort_by(|a, b| cmp(a, b));
  if sorted.windows(2).any(|w| cmp(w[0], w[1]) == Ordering::Equal) {
    return Err(Error::DuplicateIdentity { kind });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, PartialEq)]
  struct Item {
    id:     Option<u32>,
    key:    u32,
    value:  &'static str,
    locked: bool,
  }

  fn item(key: u32, value: &'static str) -> Item {
    Item { id: None, key, value, locked: false }
  }

  fn stored(id: u32, key: u32, value: &'static str) -> Item {
    Item { id: Some(id), key, value, locked: false }
  }

  fn by_key(a: &Item, b: &Item) -> Ordering { a.key.cmp(&b.key) }

  #[derive(Debug, PartialEq)]
  enum Write {
    Update(u32),
    Delete(u32),
    Insert(u32),
  }

  #[derive(Default)]
  struct Recorder {
    writes:  Vec<Write>,
    next_id: u32,
  }

  impl ChildSink<Item> for Recorder {
    type Error = Error;

    fn update(&mut self, old: &mut Item, new: &mut Item) -> Result<()> {
      new.id = old.id;
      if old.value != new.value {
        self.writes.push(Write::Update(old.key));
      }
      Ok(())
    }

    fn delete(&mut self, old: Item) -> Result<()> {
      self.writes.push(Write::Delete(old.key));
      Ok(())
    }

    fn insert(&mut self, new: &mut Item) -> Result<()> {
      self.next_id += 1;
      new.id = Some(100 + self.next_id);
      self.writes.push(Write::Insert(new.key));
      Ok(())
    }
  }

  fn unlocked(item: &Item) -> Result<bool> { Ok(!item.locked) }

  #[test]
  fn merging_into_itself_writes_nothing() {
    let old = vec![stored(1, 3, "c"), stored(2, 1, "a"), stored(3, 2, "b")];
    let mut new = old.clone();
    let mut sink = Recorder::default();

    let counts = merge_children(old, &mut new, by_key, None, true, &mut sink).unwrap();

    assert_eq!(counts, MergeCounts { added: 0, deleted: 0, modified: 3, rejected: 0 });
    assert!(sink.writes.is_empty());
  }

  #[test]
  fn pairs_by_identity_not_id() {
    // Submitted ids are stale; matching must ignore them.
    let old = vec![stored(1, 1, "a"), stored(2, 2, "b")];
    let mut new = vec![
      Item { id: Some(99), ..item(2, "b2") },
      Item { id: Some(98), ..item(1, "a") },
    ];
    let mut sink = Recorder::default();

    let counts = merge_children(old, &mut new, by_key, None, false, &mut sink).unwrap();

    assert_eq!(counts.modified, 2);
    assert_eq!(sink.writes, vec![Write::Update(2)]);
    assert_eq!(new[0].id, Some(2));
    assert_eq!(new[1].id, Some(1));
  }

  #[test]
  fn conservation_with_replacement() {
    let mut locked = stored(4, 4, "d");
    locked.locked = true;
    let old = vec![stored(1, 1, "a"), stored(2, 2, "b"), stored(3, 3, "c"), locked];
    let mut new = vec![item(1, "a"), item(5, "e"), item(6, "f")];
    let submitted = new.len();
    let mut sink = Recorder::default();
    let mut filter = unlocked;

    let counts =
      merge_children(old, &mut new, by_key, Some(&mut filter), true, &mut sink).unwrap();

    // Keys 2 and 3 are deleted, key 4 is locked and rejected.
    assert_eq!(counts, MergeCounts { added: 2, deleted: 2, modified: 1, rejected: 1 });
    assert_eq!(counts.added + counts.modified, submitted);
    assert_eq!(counts.deleted + counts.rejected, 3);
    // Deletions precede insertions.
    assert_eq!(
      sink.writes,
      vec![Write::Delete(2), Write::Delete(3), Write::Insert(5), Write::Insert(6)]
    );
    assert!(new.iter().all(|n| n.id.is_some()));
  }

  #[test]
  fn additive_merge_leaves_unclaimed_alone() {
    let old = vec![stored(1, 1, "a"), stored(2, 2, "b")];
    let mut new = vec![item(3, "c")];
    let mut sink = Recorder::default();

    let counts = merge_children(old, &mut new, by_key, None, false, &mut sink).unwrap();

    assert_eq!(counts, MergeCounts { added: 1, deleted: 0, modified: 0, rejected: 0 });
    assert_eq!(sink.writes, vec![Write::Insert(3)]);
  }

  #[test]
  fn filtered_child_is_rejected_not_modified() {
    let mut guarded = stored(1, 1, "a");
    guarded.locked = true;
    let mut new = vec![item(1, "changed")];
    let mut sink = Recorder::default();
    let mut filter = unlocked;

    let counts =
      merge_children(vec![guarded], &mut new, by_key, Some(&mut filter), true, &mut sink)
        .unwrap();

    assert_eq!(counts, MergeCounts { added: 0, deleted: 0, modified: 0, rejected: 1 });
    assert!(sink.writes.is_empty());
    assert_eq!(counts.added + counts.modified + counts.rejected, new.len());
  }

  #[test]
  fn filter_error_aborts() {
    let old = vec![stored(1, 1, "a"), stored(2, 2, "b")];
    let mut new = vec![item(1, "a2"), item(2, "b2")];
    let mut sink = Recorder::default();
    let mut filter = |item: &Item| -> Result<bool> {
      if item.key == 2 {
        Err(Error::unsupported(EntityKind::Rule, "merge"))
      } else {
        Ok(true)
      }
    };

    let err = merge_children(old, &mut new, by_key, Some(&mut filter), false, &mut sink)
      .unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation { .. }));
    assert_eq!(sink.writes, vec![Write::Update(1)]);
  }

  #[test]
  fn duplicate_identities_are_rejected() {
    let items = vec![item(1, "a"), item(2, "b"), item(1, "c")];
    assert!(matches!(
      ensure_distinct(&items, by_key, EntityKind::Section),
      Err(Error::DuplicateIdentity { kind: EntityKind::Section })
    ));
    assert!(ensure_distinct(&items[..2], by_key, EntityKind::Section).is_ok());
  }
}
