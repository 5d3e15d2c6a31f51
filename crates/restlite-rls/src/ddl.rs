//! Parser for the out-of-band policy DDL surface (§6): `ALTER TABLE ...
//! ENABLE/DISABLE ROW LEVEL SECURITY`, `CREATE POLICY`, `DROP POLICY`. These
//! statements are never issued over the REST surface; an operator or
//! migration tool runs them directly against the policy store.

use crate::policy::{Command, Policy, PolicyRole};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    EnableRls { table: String },
    DisableRls { table: String },
    CreatePolicy(Policy),
    DropPolicy { table: String, name: String, if_exists: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DdlError(pub String);

impl std::fmt::Display for DdlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "policy DDL parse error: {}", self.0)
    }
}

impl std::error::Error for DdlError {}

type Result<T> = std::result::Result<T, DdlError>;

/// Parse one semicolon-terminated policy DDL statement.
pub fn parse_statement(input: &str) -> Result<Statement> {
    let trimmed = input.trim().trim_end_matches(';').trim();
    let upper = trimmed.to_ascii_uppercase();

    if upper.starts_with("ALTER TABLE") {
        parse_alter_table(trimmed)
    } else if upper.starts_with("CREATE POLICY") {
        parse_create_policy(trimmed)
    } else if upper.starts_with("DROP POLICY") {
        parse_drop_policy(trimmed)
    } else {
        Err(DdlError(format!("unrecognized policy DDL statement: {trimmed}")))
    }
}

fn parse_alter_table(input: &str) -> Result<Statement> {
    let rest = strip_ci(input, "ALTER TABLE").ok_or_else(|| DdlError("expected ALTER TABLE".into()))?;
    let mut words = rest.split_whitespace();
    let table = words.next().ok_or_else(|| DdlError("missing table name".into()))?.to_string();
    let remainder = words.collect::<Vec<_>>().join(" ").to_ascii_uppercase();

    if remainder.starts_with("ENABLE ROW LEVEL SECURITY") {
        Ok(Statement::EnableRls { table })
    } else if remainder.starts_with("DISABLE ROW LEVEL SECURITY") {
        Ok(Statement::DisableRls { table })
    } else {
        Err(DdlError(format!("unsupported ALTER TABLE clause: {remainder}")))
    }
}

fn parse_create_policy(input: &str) -> Result<Statement> {
    let rest = strip_ci(input, "CREATE POLICY").ok_or_else(|| DdlError("expected CREATE POLICY".into()))?;
    let rest = rest.trim();

    let (name, rest) = take_token(rest)?;
    let rest = strip_ci(rest.trim(), "ON").ok_or_else(|| DdlError("expected ON <table>".into()))?;
    let (table, mut rest) = take_token(rest.trim())?;

    let mut command = Command::All;
    let mut role = PolicyRole::Public;
    let mut using = None;
    let mut with_check = None;

    loop {
        let trimmed = rest.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some(after) = strip_ci(trimmed, "FOR") {
            let (cmd_word, next) = take_token(after.trim())?;
            command = Command::from_ddl(&cmd_word).ok_or_else(|| DdlError(format!("unknown command: {cmd_word}")))?;
            rest = next;
        } else if let Some(after) = strip_ci(trimmed, "TO") {
            let (role_word, next) = take_token(after.trim())?;
            role = PolicyRole::from_ddl(&role_word);
            rest = next;
        } else if let Some(after) = strip_ci(trimmed, "USING") {
            let (expr, next) = take_parenthesized(after.trim())?;
            using = Some(expr);
            rest = next;
        } else if let Some(after) = strip_ci(trimmed, "WITH CHECK") {
            let (expr, next) = take_parenthesized(after.trim())?;
            with_check = Some(expr);
            rest = next;
        } else {
            return Err(DdlError(format!("unexpected clause near: {trimmed}")));
        }
    }

    Ok(Statement::CreatePolicy(Policy { name, table, command, role, using, with_check }))
}

fn parse_drop_policy(input: &str) -> Result<Statement> {
    let rest = strip_ci(input, "DROP POLICY").ok_or_else(|| DdlError("expected DROP POLICY".into()))?;
    let rest = rest.trim();

    let (if_exists, rest) = match strip_ci(rest, "IF EXISTS") {
        Some(after) => (true, after.trim()),
        None => (false, rest),
    };

    let (name, rest) = take_token(rest)?;
    let rest = strip_ci(rest.trim(), "ON").ok_or_else(|| DdlError("expected ON <table>".into()))?;
    let (table, _) = take_token(rest.trim())?;

    Ok(Statement::DropPolicy { table, name, if_exists })
}

/// Case-insensitive prefix strip, requiring a word boundary after the prefix.
fn strip_ci<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    if input.len() < prefix.len() {
        return None;
    }
    let (head, tail) = input.split_at(prefix.len());
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    if tail.is_empty() || tail.starts_with(char::is_whitespace) {
        Some(tail)
    } else {
        None
    }
}

/// Consume a single whitespace-delimited identifier token.
fn take_token(input: &str) -> Result<(String, &str)> {
    let input = input.trim_start();
    let end = input.find(char::is_whitespace).unwrap_or(input.len());
    if end == 0 {
        return Err(DdlError("expected an identifier".into()));
    }
    Ok((input[..end].to_string(), &input[end..]))
}

/// Consume a balanced `(...)` group, returning its inner text.
fn take_parenthesized(input: &str) -> Result<(String, &str)> {
    let input = input.trim_start();
    if !input.starts_with('(') {
        return Err(DdlError("expected '('".into()));
    }

    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    for (i, c) in input.char_indices() {
        match in_string {
            Some(q) if c == q => in_string = None,
            Some(_) => continue,
            None => match c {
                '\'' | '"' => in_string = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok((input[1..i].to_string(), &input[i + 1..]));
                    }
                }
                _ => {}
            },
        }
    }

    Err(DdlError("unbalanced parentheses".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_rls() {
        let stmt = parse_statement("ALTER TABLE posts ENABLE ROW LEVEL SECURITY;").unwrap();
        assert_eq!(stmt, Statement::EnableRls { table: "posts".into() });
    }

    #[test]
    fn test_disable_rls() {
        let stmt = parse_statement("ALTER TABLE posts DISABLE ROW LEVEL SECURITY").unwrap();
        assert_eq!(stmt, Statement::DisableRls { table: "posts".into() });
    }

    #[test]
    fn test_create_policy_full() {
        let sql = "CREATE POLICY own_posts ON posts FOR UPDATE TO authenticated USING (owner_id = auth.uid()) WITH CHECK (published = TRUE);";
        let stmt = parse_statement(sql).unwrap();
        match stmt {
            Statement::CreatePolicy(policy) => {
                assert_eq!(policy.name, "own_posts");
                assert_eq!(policy.table, "posts");
                assert_eq!(policy.command, Command::Update);
                assert_eq!(policy.role, PolicyRole::Named("authenticated".into()));
                assert_eq!(policy.using.as_deref(), Some("owner_id = auth.uid()"));
                assert_eq!(policy.with_check.as_deref(), Some("published = TRUE"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_create_policy_defaults_to_all_public() {
        let stmt = parse_statement("CREATE POLICY readable ON posts USING (published = TRUE);").unwrap();
        match stmt {
            Statement::CreatePolicy(policy) => {
                assert_eq!(policy.command, Command::All);
                assert_eq!(policy.role, PolicyRole::Public);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_drop_policy() {
        let stmt = parse_statement("DROP POLICY IF EXISTS own_posts ON posts;").unwrap();
        assert_eq!(
            stmt,
            Statement::DropPolicy { table: "posts".into(), name: "own_posts".into(), if_exists: true }
        );
    }

    #[test]
    fn test_unrecognized_statement_errors() {
        assert!(parse_statement("SELECT 1").is_err());
    }
}
