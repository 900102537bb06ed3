//! Backend-independent half of permission resolution.
//!
//! A backend gathers the grant rows that apply to a target (directly or by
//! walking up to the owning aggregate) and hands them here to pick the
//! effective role.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, role::Role};

/// The user id standing for "everyone" in permission rows.
pub const PUBLIC_USER: i64 = 0;

/// One `(user, role)` row applicable to a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
  pub user: i64,
  pub role: Role,
}

/// The strongest role among the grants belonging to `user` or, when
/// `check_public` is set, to the public user. `None` when nothing applies.
pub fn best_role(grants: &[Grant], user: i64, check_public: bool) -> Option<Role> {
  grants
    .iter()
    .filter(|g| g.user == user || (check_public && g.user == PUBLIC_USER))
    .map(|g| g.role)
    .max_by_key(|r| r.precedence())
}

/// Turn a resolved role into an authorization decision.
pub fn require(
  resolved: Option<Role>,
  required: Role,
  target: impl std::fmt::Display,
  user: i64,
) -> Result<Role> {
  match resolved {
    Some(role) if role.satisfies(required) => Ok(role),
    actual => Err(Error::PermissionDenied {
      target: target.to_string(),
      user,
      required,
      actual,
    }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const USER_A: i64 = 7;
  const USER_B: i64 = 8;

  fn grants() -> Vec<Grant> {
    vec![
      Grant { user: USER_A, role: Role::Editor },
      Grant { user: PUBLIC_USER, role: Role::Viewer },
    ]
  }

  #[test]
  fn direct_grant_beats_public() {
    assert_eq!(best_role(&grants(), USER_A, true), Some(Role::Editor));
  }

  #[test]
  fn public_grant_applies_to_strangers() {
    assert_eq!(best_role(&grants(), USER_B, true), Some(Role::Viewer));
    assert_eq!(best_role(&grants(), USER_B, false), None);
  }

  #[test]
  fn absent_role_is_denied() {
    let err = require(best_role(&grants(), USER_B, false), Role::Viewer, "publication/1", USER_B)
      .unwrap_err();
    assert!(err.is_permission_denied());
  }

  #[test]
  fn insufficient_role_is_denied() {
    let resolved = best_role(&grants(), USER_B, true);
    assert!(require(resolved, Role::Editor, "publication/1", USER_B).is_err());
    assert_eq!(
      require(resolved, Role::Viewer, "publication/1", USER_B).unwrap(),
      Role::Viewer
    );
  }

  #[test]
  fn shared_tier_prefers_contributor() {
    let grants = [
      Grant { user: USER_A, role: Role::Contributor },
      Grant { user: PUBLIC_USER, role: Role::Reviewer },
    ];
    assert_eq!(best_role(&grants, USER_A, true), Some(Role::Contributor));
  }
}
