//! Roles a user can hold on a permission target.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, VariantNames};

/// Access level granted by a permission row, weakest first.
///
/// `Reviewer` and `Contributor` sit on the same tier: each satisfies a
/// requirement for the other, both satisfy `Viewer`, and neither satisfies
/// `ReviewEditor` or anything above it. Use [`Role::rank`] for sufficiency
/// checks, never the derived discriminant.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  VariantNames,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
  #[default]
  None,
  Viewer,
  Reviewer,
  Contributor,
  ReviewEditor,
  Editor,
  Owner,
}

impl Role {
  /// Ordinal used for every comparison between roles.
  pub fn rank(self) -> u8 {
    match self {
      Self::None => 0,
      Self::Viewer => 1,
      Self::Reviewer | Self::Contributor => 2,
      Self::ReviewEditor => 3,
      Self::Editor => 4,
      Self::Owner => 5,
    }
  }

  /// True when a holder of `self` may do what `required` guards.
  pub fn satisfies(self, required: Role) -> bool { self.rank() >= required.rank() }

  /// Strictly stronger than `other`.
  pub fn outranks(self, other: Role) -> bool { self.rank() > other.rank() }

  /// Total order used to pick one role among several grants. Equal ranks fall
  /// back to declaration order, so `Contributor` wins over `Reviewer`.
  pub(crate) fn precedence(self) -> (u8, u8) { (self.rank(), self as u8) }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use super::*;

  #[test]
  fn ranks_are_monotonic_except_shared_tier() {
    assert!(Role::Owner.outranks(Role::Editor));
    assert!(Role::Editor.outranks(Role::ReviewEditor));
    assert!(Role::ReviewEditor.outranks(Role::Contributor));
    assert!(Role::Contributor.outranks(Role::Viewer));
    assert!(Role::Viewer.outranks(Role::None));
    assert_eq!(Role::Reviewer.rank(), Role::Contributor.rank());
  }

  #[test]
  fn shared_tier_satisfies_each_other() {
    assert!(Role::Reviewer.satisfies(Role::Contributor));
    assert!(Role::Contributor.satisfies(Role::Reviewer));
    assert!(!Role::Reviewer.satisfies(Role::ReviewEditor));
    assert!(!Role::Contributor.satisfies(Role::ReviewEditor));
  }

  #[test]
  fn parses_stored_names() {
    assert_eq!(Role::from_str("REVIEW_EDITOR").unwrap(), Role::ReviewEditor);
    assert_eq!(Role::Owner.to_string(), "OWNER");
    assert!(Role::from_str("ADMIN").is_err());
    assert!(Role::VARIANTS.contains(&"CONTRIBUTOR"));
  }
}
