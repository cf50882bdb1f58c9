//! Access-scoping layer.
//!
//! Every read in the four engines narrows its result set through one of
//! these scopes, resolved once per request from the authenticated principal.
//! Role precedence is Manager over Mechanic over Client, matching the role
//! checks the HTTP surface applies on writes.

use crate::middleware::{AuthUser, Role};

/// Visibility scope for a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    /// Managers see everything.
    All,
    /// Mechanics see rows tied to their mechanic profile id.
    Mechanic(i64),
    /// Clients see rows tied to their own user id.
    Client(String),
    /// A role with no matching profile sees an empty result set, not an error.
    Nothing,
}

impl AccessScope {
    /// Resolve the scope for a principal. `mechanic_id` is the caller's
    /// mechanic profile id, pre-fetched when the Mechanic role is present.
    pub fn for_user(user: &AuthUser, mechanic_id: Option<i64>) -> Self {
        if user.has_role(Role::Manager) {
            AccessScope::All
        } else if user.has_role(Role::Mechanic) {
            match mechanic_id {
                Some(id) => AccessScope::Mechanic(id),
                None => AccessScope::Nothing,
            }
        } else if user.has_role(Role::Client) {
            AccessScope::Client(user.user_id.clone())
        } else {
            AccessScope::Nothing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, roles: Vec<Role>) -> AuthUser {
        AuthUser {
            user_id: id.to_string(),
            roles,
        }
    }

    #[test]
    fn manager_sees_everything() {
        let u = user("m-user", vec![Role::Manager]);
        assert_eq!(AccessScope::for_user(&u, None), AccessScope::All);
    }

    #[test]
    fn manager_role_wins_over_mechanic() {
        let u = user("m-user", vec![Role::Mechanic, Role::Manager]);
        assert_eq!(AccessScope::for_user(&u, Some(7)), AccessScope::All);
    }

    #[test]
    fn mechanic_scope_uses_profile_id() {
        let u = user("w-user", vec![Role::Mechanic]);
        assert_eq!(AccessScope::for_user(&u, Some(7)), AccessScope::Mechanic(7));
    }

    #[test]
    fn mechanic_without_profile_sees_nothing() {
        let u = user("w-user", vec![Role::Mechanic]);
        assert_eq!(AccessScope::for_user(&u, None), AccessScope::Nothing);
    }

    #[test]
    fn client_scope_uses_user_id() {
        let u = user("c-user", vec![Role::Client]);
        assert_eq!(
            AccessScope::for_user(&u, None),
            AccessScope::Client("c-user".to_string())
        );
    }

    #[test]
    fn roleless_principal_sees_nothing() {
        let u = user("nobody", vec![]);
        assert_eq!(AccessScope::for_user(&u, None), AccessScope::Nothing);
    }
}
