//! Recursive-descent parser for RLS policy expression text (the `USING` and
//! `WITH CHECK` clauses of `CREATE POLICY`), producing the same `WhereNode`
//! shape the URL query parser builds — so a parsed policy can be ANDed or
//! ORed directly onto a request's filter tree.

use restlite_sql::ast::{FilterValue, IsValue, LogicOp, Operator, WhereNode};

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    UnexpectedEnd,
    Unexpected(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEnd => write!(f, "unexpected end of expression"),
            Self::Unexpected(tok) => write!(f, "unexpected token: {tok}"),
        }
    }
}

impl std::error::Error for ParseError {}

type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(String),
    Op(String),
    LParen,
    RParen,
    And,
    Or,
    Not,
    Is,
    In,
    Null,
    True,
    False,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Op(",".into()));
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => {
                            if chars.peek() == Some(&quote) {
                                s.push(quote);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        Some(ch) => s.push(ch),
                        None => return Err(ParseError::UnexpectedEnd),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '!' | '<' | '>' | '=' => {
                let mut op = String::new();
                op.push(c);
                chars.next();
                if let Some(&next) = chars.peek() {
                    if next == '=' && (op == "!" || op == "<" || op == ">") {
                        op.push(next);
                        chars.next();
                    } else if op == "<" && next == '>' {
                        op.push(next);
                        chars.next();
                    }
                }
                tokens.push(Token::Op(op));
            }
            c if c.is_ascii_digit() || (c == '-' && is_number_start(&chars)) => {
                let mut num = String::new();
                num.push(c);
                chars.next();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Num(num));
            }
            c if c.is_alphabetic() || c == '_' || c == '.' => {
                let mut word = String::new();
                while let Some(&w) = chars.peek() {
                    if w.is_alphanumeric() || w == '_' || w == '.' || w == '(' || w == ')' {
                        // `auth.uid()` calls are substituted before parsing; by
                        // the time we tokenize, `auth.uid()`/`auth.role()` are
                        // already literal values, so bare identifiers here
                        // never contain parens in practice. Stop at parens to
                        // keep grouping correct regardless.
                        if w == '(' || w == ')' {
                            break;
                        }
                        word.push(w);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(classify_word(&word));
            }
            other => return Err(ParseError::Unexpected(other.to_string())),
        }
    }

    Ok(tokens)
}

fn is_number_start(chars: &std::iter::Peekable<std::str::Chars>) -> bool {
    let mut clone = chars.clone();
    clone.next();
    matches!(clone.peek(), Some(c) if c.is_ascii_digit())
}

fn classify_word(word: &str) -> Token {
    match word.to_ascii_uppercase().as_str() {
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "IS" => Token::Is,
        "IN" => Token::In,
        "NULL" => Token::Null,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        "LIKE" => Token::Op("LIKE".into()),
        "ILIKE" => Token::Op("ILIKE".into()),
        _ => Token::Ident(word.to_string()),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    /// `or_expr := and_expr (OR and_expr)*`
    fn parse_or(&mut self) -> Result<WhereNode> {
        let mut children = vec![self.parse_and()?];
        while matches!(self.peek(), Some(Token::Or)) {
            self.next();
            children.push(self.parse_and()?);
        }
        Ok(if children.len() == 1 {
            children.into_iter().next().unwrap()
        } else {
            WhereNode::Logical { op: LogicOp::Or, children }
        })
    }

    /// `and_expr := primary (AND primary)*`
    fn parse_and(&mut self) -> Result<WhereNode> {
        let mut children = vec![self.parse_primary()?];
        while matches!(self.peek(), Some(Token::And)) {
            self.next();
            children.push(self.parse_primary()?);
        }
        Ok(if children.len() == 1 {
            children.into_iter().next().unwrap()
        } else {
            WhereNode::Logical { op: LogicOp::And, children }
        })
    }

    fn parse_primary(&mut self) -> Result<WhereNode> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.next();
            let node = self.parse_or()?;
            match self.next() {
                Some(Token::RParen) => return Ok(node),
                _ => return Err(ParseError::Unexpected(")".into())),
            }
        }

        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<WhereNode> {
        let column = match self.next() {
            Some(Token::Ident(name)) => name,
            Some(other) => return Err(ParseError::Unexpected(format!("{other:?}"))),
            None => return Err(ParseError::UnexpectedEnd),
        };

        match self.next() {
            Some(Token::Is) => {
                let negated = matches!(self.peek(), Some(Token::Not));
                if negated {
                    self.next();
                }
                match self.next() {
                    Some(Token::Null) => Ok(WhereNode::Is { column, value: IsValue::Null, negated }),
                    Some(Token::True) => Ok(WhereNode::Is { column, value: IsValue::True, negated }),
                    Some(Token::False) => Ok(WhereNode::Is { column, value: IsValue::False, negated }),
                    other => Err(ParseError::Unexpected(format!("{other:?}"))),
                }
            }
            Some(Token::In) => {
                match self.next() {
                    Some(Token::LParen) => {}
                    other => return Err(ParseError::Unexpected(format!("{other:?}"))),
                }
                let mut values = Vec::new();
                loop {
                    values.push(self.parse_literal()?);
                    match self.peek() {
                        Some(Token::Op(op)) if op == "," => {
                            self.next();
                        }
                        _ => break,
                    }
                }
                match self.next() {
                    Some(Token::RParen) => {}
                    other => return Err(ParseError::Unexpected(format!("{other:?}"))),
                }
                Ok(WhereNode::In { column, values, negated: false })
            }
            Some(Token::Op(op_str)) => {
                let op = match op_str.as_str() {
                    "=" => Operator::Eq,
                    "!=" | "<>" => Operator::Neq,
                    ">" => Operator::Gt,
                    ">=" => Operator::Gte,
                    "<" => Operator::Lt,
                    "<=" => Operator::Lte,
                    "LIKE" => Operator::Like,
                    "ILIKE" => Operator::ILike,
                    other => return Err(ParseError::Unexpected(other.to_string())),
                };
                let value = self.parse_literal()?;
                Ok(WhereNode::Filter { column, op, value, negated: false })
            }
            other => Err(ParseError::Unexpected(format!("{other:?}"))),
        }
    }

    fn parse_literal(&mut self) -> Result<FilterValue> {
        match self.next() {
            Some(Token::Str(s)) => Ok(FilterValue::Text(s)),
            Some(Token::Num(n)) => Ok(n
                .parse::<i64>()
                .map(FilterValue::Int)
                .unwrap_or_else(|_| FilterValue::Float(n.parse().unwrap_or(0.0)))),
            Some(Token::Null) => Ok(FilterValue::Null),
            Some(Token::True) => Ok(FilterValue::Bool(true)),
            Some(Token::False) => Ok(FilterValue::Bool(false)),
            // Bare identifiers on the RHS of a comparison are unquoted
            // string literals, not column references.
            Some(Token::Ident(s)) => Ok(FilterValue::Text(s)),
            other => Err(ParseError::Unexpected(format!("{other:?}"))),
        }
    }
}

/// Parse a policy expression into a `WhereNode`. The caller must substitute
/// `auth.uid()`/`auth.role()` before calling this.
pub fn parse(expr: &str) -> Result<WhereNode> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(ParseError::Unexpected(format!("{:?}", parser.tokens[parser.pos])));
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_comparison() {
        let node = parse("owner_id = 'u1'").unwrap();
        assert_eq!(
            node,
            WhereNode::Filter {
                column: "owner_id".into(),
                op: Operator::Eq,
                value: FilterValue::Text("u1".into()),
                negated: false,
            }
        );
    }

    #[test]
    fn test_is_not_null() {
        let node = parse("deleted_at IS NOT NULL").unwrap();
        assert!(matches!(node, WhereNode::Is { negated: true, value: IsValue::Null, .. }));
    }

    #[test]
    fn test_and_precedence_over_or() {
        // a OR (b AND c)
        let node = parse("a = 1 OR b = 2 AND c = 3").unwrap();
        match node {
            WhereNode::Logical { op: LogicOp::Or, children } => {
                assert_eq!(children.len(), 2);
                assert!(matches!(&children[1], WhereNode::Logical { op: LogicOp::And, .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parenthesized_group() {
        let node = parse("(a = 1 OR b = 2) AND c = 3").unwrap();
        match node {
            WhereNode::Logical { op: LogicOp::And, children } => {
                assert!(matches!(&children[0], WhereNode::Logical { op: LogicOp::Or, .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_in_list() {
        let node = parse("role IN ('admin', 'editor')").unwrap();
        match node {
            WhereNode::In { values, .. } => {
                assert_eq!(values, vec![FilterValue::Text("admin".into()), FilterValue::Text("editor".into())]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let node = parse("name = 'O''Brien'").unwrap();
        match node {
            WhereNode::Filter { value: FilterValue::Text(s), .. } => assert_eq!(s, "O'Brien"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_expression_errors() {
        assert!(parse("owner_id =").is_err());
        assert!(parse("(a = 1").is_err());
    }
}
