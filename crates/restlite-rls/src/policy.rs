//! Policy and command types for the RLS policy store.

use serde::{Deserialize, Serialize};

/// The SQL command a policy applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Select,
    Insert,
    Update,
    Delete,
    /// `FOR ALL` — matches any command.
    All,
}

impl Command {
    pub fn from_ddl(s: &str) -> Option<Self> {
        Some(match s.to_ascii_uppercase().as_str() {
            "SELECT" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "ALL" => Self::All,
            _ => return None,
        })
    }

    fn matches(&self, requested: Command) -> bool {
        *self == Self::All || *self == requested
    }
}

/// A role name, or the `PUBLIC` wildcard that matches every role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyRole {
    Public,
    Named(String),
}

impl PolicyRole {
    pub fn from_ddl(s: &str) -> Self {
        if s.eq_ignore_ascii_case("public") {
            Self::Public
        } else {
            Self::Named(s.to_string())
        }
    }

    fn matches(&self, requested: &str) -> bool {
        match self {
            Self::Public => true,
            Self::Named(role) => role == requested,
        }
    }
}

/// One row-level security policy, as stored in the hidden policy catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub table: String,
    pub command: Command,
    pub role: PolicyRole,
    /// The `USING` expression text, applied to SELECT/DELETE and the read
    /// half of UPDATE.
    pub using: Option<String>,
    /// The `WITH CHECK` expression text, applied to INSERT and the write
    /// half of UPDATE.
    pub with_check: Option<String>,
}

impl Policy {
    /// Whether this policy is in scope for `command` issued by `role`, per
    /// the policy store's `policiesFor` contract: exact role match or
    /// `PUBLIC`, exact command match or `ALL`.
    pub fn applies_to(&self, command: Command, role: &str) -> bool {
        self.command.matches(command) && self.role.matches(role)
    }

    /// The expression text relevant to `command`: `using` for SELECT/DELETE,
    /// `with_check` for INSERT, both (ANDed) for UPDATE.
    pub fn expression_for(&self, command: Command) -> Option<String> {
        match command {
            Command::Select | Command::Delete => self.using.clone(),
            Command::Insert => self.with_check.clone(),
            Command::Update => match (&self.using, &self.with_check) {
                (Some(u), Some(w)) => Some(format!("({u}) AND ({w})")),
                (Some(u), None) => Some(u.clone()),
                (None, Some(w)) => Some(w.clone()),
                (None, None) => None,
            },
            Command::All => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_all_matches_everything() {
        assert!(Command::All.matches(Command::Select));
        assert!(Command::Select.matches(Command::Select));
        assert!(!Command::Select.matches(Command::Insert));
    }

    #[test]
    fn test_public_role_matches_any() {
        assert!(PolicyRole::Public.matches("anon"));
        assert!(PolicyRole::Public.matches("authenticated"));
        assert!(!PolicyRole::Named("authenticated".into()).matches("anon"));
    }

    #[test]
    fn test_policy_applies_to() {
        let policy = Policy {
            name: "p".into(),
            table: "posts".into(),
            command: Command::All,
            role: PolicyRole::Public,
            using: Some("true".into()),
            with_check: None,
        };
        assert!(policy.applies_to(Command::Select, "anon"));
        assert!(policy.applies_to(Command::Insert, "authenticated"));
    }

    #[test]
    fn test_update_expression_combines_using_and_with_check() {
        let policy = Policy {
            name: "p".into(),
            table: "posts".into(),
            command: Command::Update,
            role: PolicyRole::Public,
            using: Some("owner_id = auth.uid()".into()),
            with_check: Some("published = true".into()),
        };
        let expr = policy.expression_for(Command::Update).unwrap();
        assert_eq!(expr, "(owner_id = auth.uid()) AND (published = true)");
    }
}
