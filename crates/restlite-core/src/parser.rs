//! URL query string parser.
//!
//! Turns a request path + query string into a `QueryAST`, the same
//! intermediate representation the RLS enforcer mutates and the compiler
//! consumes. Mirrors the nom-based combinator style of the PostgREST-family
//! query-string grammar this parser is descended from.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{map, opt},
    multi::separated_list0,
    sequence::preceded,
    IResult,
};
use percent_encoding::percent_decode_str;
use restlite_sql::ast::{
    AggregateFunction, Cardinality, ColumnItem, EmbedCardinality, EmbedSpec, FilterValue,
    IsValue, LogicOp, NullsOrder, Operator, OrderDirection, OrderTerm, QueryAST, RangeSpec,
    WhereNode,
};

use crate::error::{Error, Result};

/// Operator families explicitly out of scope (full-text search, array
/// containment/overlap, range adjacency, regex match, `IS DISTINCT FROM`).
const UNSUPPORTED_OPS: &[&str] = &[
    "fts", "plfts", "phfts", "wfts", "cs", "cd", "ov", "sl", "sr", "nxl", "nxr", "adj", "match",
    "imatch", "isdistinct",
];

/// Parse a request path and query string into a `QueryAST`.
///
/// `table` is the path segment naming the resource; `cardinality` comes from
/// the caller's Accept-header / single-row convention (§4.1's "sibling
/// input").
pub fn parse_request(table: &str, query: &str, cardinality: Cardinality) -> Result<QueryAST> {
    let mut ast = QueryAST::new_select(table);
    ast.cardinality = cardinality;

    if query.is_empty() {
        return Ok(ast);
    }

    let mut top_level_filters: Vec<WhereNode> = Vec::new();
    let mut logic_groups: Vec<WhereNode> = Vec::new();

    // `select` is parsed first, regardless of its position in the query
    // string, so dotted keys (`<embed>.<field>=...`) always have the
    // embedded-resource tree available to route into.
    for pair in query.split('&') {
        if let Some(raw_value) = pair.strip_prefix("select=") {
            let value = decode_value("select", raw_value)?;
            ast.select = parse_select(&value)?;
            break;
        }
    }

    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or("");
        let raw_value = parts.next().unwrap_or("");
        let value = decode_value(key, raw_value)?;

        match key {
            "select" => {
                // Already parsed above.
            }
            "order" => {
                ast.order = parse_order(&value)?;
            }
            "limit" => {
                let limit: i64 = value.parse().map_err(|_| Error::Parse {
                    detail: "limit must be a non-negative integer".into(),
                    hint: None,
                    position: None,
                })?;
                ast.range.limit = Some(limit);
            }
            "offset" => {
                let offset: i64 = value.parse().map_err(|_| Error::Parse {
                    detail: "offset must be a non-negative integer".into(),
                    hint: None,
                    position: None,
                })?;
                ast.range.offset = offset;
            }
            "and" | "or" => {
                logic_groups.push(parse_logic_group(key, &value)?);
            }
            key if key.contains('.') => {
                route_to_embed(&mut ast.select, key, &value)?;
            }
            key if !key.starts_with('_') => {
                top_level_filters.push(parse_filter(key, &value)?);
            }
            _ => {
                // Unknown top-level parameters are ignored for forward compatibility.
            }
        }
    }

    let mut all_nodes = top_level_filters;
    all_nodes.extend(logic_groups);
    ast.filter = conjoin(all_nodes);

    Ok(ast)
}

fn decode_value(key: &str, raw_value: &str) -> Result<String> {
    percent_decode_str(raw_value)
        .decode_utf8()
        .map(|s| s.to_string())
        .map_err(|_| Error::Parse {
            detail: format!("invalid percent-encoding in value for `{key}`"),
            hint: None,
            position: None,
        })
}

fn conjoin(nodes: Vec<WhereNode>) -> Option<WhereNode> {
    let mut iter = nodes.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, node| acc.and(node)))
}

// ============================================================================
// Dotted keys: `<embed>.<field>` routes a filter/order/limit/offset into the
// matching embedded resource's own clause instead of the parent's, mirroring
// the top-level keys one level down (recursively, for nested embeds).
// ============================================================================

fn find_embed_mut<'a>(select: &'a mut [ColumnItem], name: &str) -> Option<&'a mut EmbedSpec> {
    select.iter_mut().find_map(|item| match item {
        ColumnItem::Embedded(spec) if spec.alias.as_deref().unwrap_or(spec.table.as_str()) == name => {
            Some(spec)
        }
        _ => None,
    })
}

fn navigate_embed_path<'a>(select: &'a mut [ColumnItem], path: &[&str]) -> Option<&'a mut EmbedSpec> {
    let (first, rest) = path.split_first()?;
    let spec = find_embed_mut(select, first)?;
    if rest.is_empty() {
        Some(spec)
    } else {
        navigate_embed_path(&mut spec.select, rest)
    }
}

/// Route `<path>.<leaf>=value` into the `EmbedSpec` reached by walking
/// `path` through nested embeds; `leaf` is `order`/`limit`/`offset` or a
/// column name to filter on.
fn route_to_embed(select: &mut [ColumnItem], key: &str, value: &str) -> Result<()> {
    let segments: Vec<&str> = key.split('.').collect();
    let (path, leaf) = segments.split_at(segments.len() - 1);
    let leaf = leaf[0];

    let spec = navigate_embed_path(select, path).ok_or_else(|| Error::Parse {
        detail: format!("`{}` does not match an embedded resource in `select`", path.join(".")),
        hint: None,
        position: None,
    })?;

    match leaf {
        "order" => {
            spec.order = parse_order(value)?;
        }
        "limit" => {
            let limit: i64 = value.parse().map_err(|_| Error::Parse {
                detail: format!("`{key}` must be a non-negative integer"),
                hint: None,
                position: None,
            })?;
            spec.range.get_or_insert_with(RangeSpec::default).limit = Some(limit);
        }
        "offset" => {
            let offset: i64 = value.parse().map_err(|_| Error::Parse {
                detail: format!("`{key}` must be a non-negative integer"),
                hint: None,
                position: None,
            })?;
            spec.range.get_or_insert_with(RangeSpec::default).offset = offset;
        }
        column => {
            let node = parse_filter(column, value)?;
            spec.filter = Some(match spec.filter.take() {
                Some(existing) => existing.and(node),
                None => node,
            });
        }
    }

    Ok(())
}

// ============================================================================
// Select list
// ============================================================================

fn parse_select(input: &str) -> Result<Vec<ColumnItem>> {
    if input.is_empty() {
        return Ok(vec![ColumnItem::Wildcard]);
    }
    match select_items(input) {
        Ok((rest, items)) if rest.is_empty() => Ok(items),
        _ => Err(Error::Parse {
            detail: format!("malformed select list: `{input}`"),
            hint: None,
            position: None,
        }),
    }
}

fn select_items(input: &str) -> IResult<&str, Vec<ColumnItem>> {
    separated_list0(char(','), select_item)(input)
}

fn select_item(input: &str) -> IResult<&str, ColumnItem> {
    alt((embed_item, aggregate_item, simple_item, wildcard_item))(input)
}

fn wildcard_item(input: &str) -> IResult<&str, ColumnItem> {
    map(char('*'), |_| ColumnItem::Wildcard)(input)
}

/// `alias:table(inner)` / `table(inner)` / `alias:table!fk(inner)`.
fn embed_item(input: &str) -> IResult<&str, ColumnItem> {
    let (input, alias) = opt(nom::sequence::terminated(identifier, char(':')))(input)?;
    let (input, table) = identifier(input)?;
    let (input, hint) = opt(preceded(char('!'), identifier))(input)?;
    let (input, _) = char('(')(input)?;
    let (input, inner) = balanced_parens(input)?;
    let (input, _) = char(')')(input)?;

    let inner_select = parse_select(inner).map_err(|_| {
        nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Fail))
    })?;

    Ok((
        input,
        ColumnItem::Embedded(EmbedSpec {
            alias: alias.map(str::to_string),
            table: table.to_string(),
            hint: hint.map(str::to_string),
            // Resolved against the schema catalog by the compiler; the
            // parser doesn't know the FK direction yet.
            cardinality: EmbedCardinality::Many,
            select: inner_select,
            filter: None,
            order: vec![],
            range: None,
        }),
    ))
}

/// `alias:fn(col)` or `fn(col)`, where `fn` is an aggregate name.
fn aggregate_item(input: &str) -> IResult<&str, ColumnItem> {
    let (input, alias) = opt(nom::sequence::terminated(identifier, char(':')))(input)?;
    let (input, func_name) = identifier(input)?;
    let func = AggregateFunction::from_alias(func_name)
        .ok_or_else(|| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)))?;
    let (input, _) = char('(')(input)?;
    let (input, col) = nom::bytes::complete::take_until(")")(input)?;
    let (input, _) = char(')')(input)?;

    let column = if col.is_empty() { "*".to_string() } else { col.to_string() };
    Ok((
        input,
        ColumnItem::Aggregate {
            func,
            column,
            alias: alias.map(str::to_string),
        },
    ))
}

/// `alias:col` or `col`.
fn simple_item(input: &str) -> IResult<&str, ColumnItem> {
    let (input, first) = identifier(input)?;
    let (input, alias_part) = opt(preceded(char(':'), identifier))(input)?;
    Ok((
        input,
        match alias_part {
            Some(name) => ColumnItem::Simple { name: name.to_string(), alias: Some(first.to_string()) },
            None => ColumnItem::Simple { name: first.to_string(), alias: None },
        },
    ))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

/// Consume up to the matching closing paren, tracking nesting depth, without
/// consuming the final `)` itself.
fn balanced_parens(input: &str) -> IResult<&str, &str> {
    let mut depth = 0i32;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return Ok((&input[i..], &input[..i]));
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::TakeUntil)))
}

// ============================================================================
// Filters
// ============================================================================

fn parse_filter(key: &str, value: &str) -> Result<WhereNode> {
    let (value, negated) = match value.strip_prefix("not.") {
        Some(rest) => (rest, true),
        None => (value, false),
    };

    let op_family = value.split('.').next().unwrap_or("");
    if UNSUPPORTED_OPS.contains(&op_family) {
        return Err(Error::UnsupportedFeature(op_family.to_string()));
    }

    for (prefix, op) in [
        ("like(all).", Operator::Like),
        ("ilike(all).", Operator::ILike),
    ] {
        if let Some(rest) = value.strip_prefix(prefix) {
            let children = parse_brace_list(rest)?
                .into_iter()
                .map(|p| WhereNode::Filter { column: key.to_string(), op, value: FilterValue::Text(p.replace('*', "%")), negated: false })
                .collect();
            let group = WhereNode::Logical { op: LogicOp::And, children };
            return Ok(if negated { negate(group) } else { group });
        }
    }
    for (prefix, op) in [
        ("like(any).", Operator::Like),
        ("ilike(any).", Operator::ILike),
    ] {
        if let Some(rest) = value.strip_prefix(prefix) {
            let children = parse_brace_list(rest)?
                .into_iter()
                .map(|p| WhereNode::Filter { column: key.to_string(), op, value: FilterValue::Text(p.replace('*', "%")), negated: false })
                .collect();
            let group = WhereNode::Logical { op: LogicOp::Or, children };
            return Ok(if negated { negate(group) } else { group });
        }
    }

    if let Some(rest) = value.strip_prefix("in.") {
        let values = parse_in_list(rest)?;
        return Ok(WhereNode::In { column: key.to_string(), values, negated });
    }

    if let Some(rest) = value.strip_prefix("is.") {
        let is_value = match rest.to_ascii_lowercase().as_str() {
            "null" => IsValue::Null,
            "true" => IsValue::True,
            "false" => IsValue::False,
            "not_null" => {
                return Ok(WhereNode::Is { column: key.to_string(), value: IsValue::Null, negated: !negated });
            }
            "unknown" => IsValue::Null,
            other => {
                return Err(Error::Validation(format!("unknown is.{other} sentinel")));
            }
        };
        return Ok(WhereNode::Is { column: key.to_string(), value: is_value, negated });
    }

    for (alias, op) in [
        ("eq", Operator::Eq),
        ("neq", Operator::Neq),
        ("gte", Operator::Gte),
        ("gt", Operator::Gt),
        ("lte", Operator::Lte),
        ("lt", Operator::Lt),
        ("like", Operator::Like),
        ("ilike", Operator::ILike),
    ] {
        if let Some(rest) = value.strip_prefix(alias).and_then(|r| r.strip_prefix('.')) {
            let value = if matches!(op, Operator::Like | Operator::ILike) {
                FilterValue::Text(rest.replace('*', "%"))
            } else {
                parse_scalar(rest)
            };
            return Ok(WhereNode::Filter { column: key.to_string(), op, value, negated });
        }
    }

    Err(Error::Parse {
        detail: format!("unrecognized filter operator in `{key}={value}`"),
        hint: Some("expected one of eq,neq,gt,gte,lt,lte,like,ilike,in,is".into()),
        position: None,
    })
}

/// `not.` on a pattern-quantifier group negates the whole group: De Morgan's
/// over `LogicOp` (the children are freshly built `Filter` nodes, so negating
/// each one in place is always valid here).
fn negate(node: WhereNode) -> WhereNode {
    match node {
        WhereNode::Logical { op, children } => WhereNode::Logical {
            op: match op {
                LogicOp::And => LogicOp::Or,
                LogicOp::Or => LogicOp::And,
            },
            children: children.into_iter().map(negate).collect(),
        },
        WhereNode::Filter { column, op, value, negated } => {
            WhereNode::Filter { column, op, value, negated: !negated }
        }
        other => other,
    }
}

/// `{p1,p2,…}` pattern list for `like(all)`/`like(any)` quantifiers.
fn parse_brace_list(value: &str) -> Result<Vec<String>> {
    let inner = value
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| Error::Parse {
            detail: format!("malformed pattern list: `{value}`"),
            hint: None,
            position: None,
        })?;
    Ok(split_csv_quoted(inner))
}

fn parse_in_list(value: &str) -> Result<Vec<FilterValue>> {
    let inner = value
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| Error::Parse {
            detail: format!("malformed in.() list: `{value}`"),
            hint: None,
            position: None,
        })?;

    if inner.is_empty() {
        return Ok(vec![]);
    }

    Ok(split_csv_quoted(inner).into_iter().map(|s| parse_scalar(&s)).collect())
}

/// Split a comma-separated list respecting double-quoted segments
/// (`"Smith, John"` stays one item; `""` unescapes to `"`).
fn split_csv_quoted(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    out.push(current);
    out
}

/// int → float → bool → string, in that precedence order.
fn parse_scalar(raw: &str) -> FilterValue {
    if let Ok(i) = raw.parse::<i64>() {
        return FilterValue::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return FilterValue::Float(f);
    }
    match raw {
        "true" => return FilterValue::Bool(true),
        "false" => return FilterValue::Bool(false),
        _ => {}
    }
    FilterValue::Text(raw.to_string())
}

// ============================================================================
// Logic groups: and=(...)/or=(...)
// ============================================================================

fn parse_logic_group(key: &str, value: &str) -> Result<WhereNode> {
    let op = match key {
        "and" => LogicOp::And,
        "or" => LogicOp::Or,
        _ => unreachable!(),
    };

    let inner = value
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| Error::Parse {
            detail: format!("malformed logic group: `{key}={value}`"),
            hint: None,
            position: None,
        })?;

    let mut children = Vec::new();
    for expr in split_csv_quoted(inner) {
        children.push(parse_logic_expr(&expr)?);
    }

    Ok(WhereNode::Logical { op, children })
}

/// One `col.op.value` expression inside an `and=(...)`/`or=(...)` group, or
/// a nested `and(...)`/`or(...)`.
fn parse_logic_expr(expr: &str) -> Result<WhereNode> {
    for (prefix, op) in [("and(", LogicOp::And), ("or(", LogicOp::Or)] {
        if let Some(rest) = expr.strip_prefix(prefix).and_then(|r| r.strip_suffix(')')) {
            let children = split_csv_quoted(rest)
                .into_iter()
                .map(|c| parse_logic_expr(&c))
                .collect::<Result<Vec<_>>>()?;
            return Ok(WhereNode::Logical { op, children });
        }
    }

    let (col, rest) = expr.split_once('.').ok_or_else(|| Error::Parse {
        detail: format!("malformed logic expression: `{expr}`"),
        hint: None,
        position: None,
    })?;
    parse_filter(col, rest)
}

// ============================================================================
// Order
// ============================================================================

fn parse_order(value: &str) -> Result<Vec<OrderTerm>> {
    if value.is_empty() {
        return Ok(vec![]);
    }
    value.split(',').map(|term| parse_order_term(term.trim())).collect()
}

fn parse_order_term(value: &str) -> Result<OrderTerm> {
    let parts: Vec<&str> = value.split('.').collect();
    if parts.is_empty() || parts[0].is_empty() {
        return Err(Error::Parse {
            detail: format!("malformed order term: `{value}`"),
            hint: None,
            position: None,
        });
    }

    let mut direction = OrderDirection::Asc;
    let mut nulls = None;
    for part in &parts[1..] {
        match *part {
            "asc" => direction = OrderDirection::Asc,
            "desc" => direction = OrderDirection::Desc,
            "nullsfirst" => nulls = Some(NullsOrder::First),
            "nullslast" => nulls = Some(NullsOrder::Last),
            other => {
                return Err(Error::Parse {
                    detail: format!("unknown order modifier: `{other}`"),
                    hint: None,
                    position: None,
                })
            }
        }
    }

    Ok(OrderTerm { column: parts[0].to_string(), direction, nulls })
}

/// Build a range from the `Range: <unit>=<first>-<last>` header.
pub fn range_from_header(value: &str) -> Result<RangeSpec> {
    let spec = value.split_once('=').map(|(_, r)| r).unwrap_or(value);
    let (first, last) = spec.split_once('-').ok_or_else(|| Error::Parse {
        detail: format!("malformed Range header: `{value}`"),
        hint: None,
        position: None,
    })?;
    let first: i64 = first.parse().map_err(|_| Error::Parse {
        detail: "Range header first bound must be an integer".into(),
        hint: None,
        position: None,
    })?;
    let last: Option<i64> = if last.is_empty() {
        None
    } else {
        Some(last.parse().map_err(|_| Error::Parse {
            detail: "Range header last bound must be an integer".into(),
            hint: None,
            position: None,
        })?)
    };
    Ok(RangeSpec::from_bounds(first, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_filter() {
        let ast = parse_request("users", "name=eq.John", Cardinality::Many).unwrap();
        match ast.filter {
            Some(WhereNode::Filter { column, op: Operator::Eq, value: FilterValue::Text(v), negated: false }) => {
                assert_eq!(column, "name");
                assert_eq!(v, "John");
            }
            other => panic!("unexpected filter: {other:?}"),
        }
    }

    #[test]
    fn test_parse_negated_filter() {
        let ast = parse_request("users", "status=not.eq.active", Cardinality::Many).unwrap();
        match ast.filter {
            Some(WhereNode::Filter { negated: true, .. }) => {}
            other => panic!("expected negated filter, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_in_filter() {
        let ast = parse_request("t", "id=in.(1,2,3)", Cardinality::Many).unwrap();
        match ast.filter {
            Some(WhereNode::In { values, .. }) => {
                assert_eq!(values, vec![FilterValue::Int(1), FilterValue::Int(2), FilterValue::Int(3)]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_in_filter_with_quoted_comma() {
        let ast = parse_request("t", r#"name=in.("Smith, John",Doe)"#, Cardinality::Many).unwrap();
        match ast.filter {
            Some(WhereNode::In { values, .. }) => {
                assert_eq!(values[0], FilterValue::Text("Smith, John".into()));
                assert_eq!(values[1], FilterValue::Text("Doe".into()));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_is_null() {
        let ast = parse_request("t", "deleted_at=is.null", Cardinality::Many).unwrap();
        assert!(matches!(ast.filter, Some(WhereNode::Is { value: IsValue::Null, negated: false, .. })));
    }

    #[test]
    fn test_parse_is_not_null() {
        let ast = parse_request("t", "deleted_at=is.not_null", Cardinality::Many).unwrap();
        assert!(matches!(ast.filter, Some(WhereNode::Is { value: IsValue::Null, negated: true, .. })));
    }

    #[test]
    fn test_parse_order() {
        let ast = parse_request("t", "order=name.asc,age.desc.nullslast", Cardinality::Many).unwrap();
        assert_eq!(ast.order.len(), 2);
        assert_eq!(ast.order[1].nulls, Some(NullsOrder::Last));
    }

    #[test]
    fn test_parse_limit_offset() {
        let ast = parse_request("t", "limit=10&offset=20", Cardinality::Many).unwrap();
        assert_eq!(ast.range.limit, Some(10));
        assert_eq!(ast.range.offset, 20);
    }

    #[test]
    fn test_parse_select_with_embed() {
        let ast = parse_request("posts", "select=id,author:profiles!author_id(name)", Cardinality::Many).unwrap();
        assert_eq!(ast.select.len(), 2);
        match &ast.select[1] {
            ColumnItem::Embedded(spec) => {
                assert_eq!(spec.table, "profiles");
                assert_eq!(spec.alias.as_deref(), Some("author"));
                assert_eq!(spec.hint.as_deref(), Some("author_id"));
            }
            other => panic!("expected embed, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_aggregate_select() {
        let ast = parse_request("orders", "select=total:amount.sum()", Cardinality::Many).unwrap();
        match &ast.select[0] {
            ColumnItem::Aggregate { func: AggregateFunction::Sum, column, alias } => {
                assert_eq!(column, "amount");
                assert_eq!(alias.as_deref(), Some("total"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_operator_rejected() {
        let err = parse_request("t", "body=fts.hello", Cardinality::Many).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));
    }

    #[test]
    fn test_and_or_logic_group() {
        let ast = parse_request("t", "or=(a.gt.1,b.lt.2)", Cardinality::Many).unwrap();
        match ast.filter {
            Some(WhereNode::Logical { op: LogicOp::Or, children }) => assert_eq!(children.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_like_all_quantifier_expands_to_and() {
        let ast = parse_request("t", "name=like(all).{foo*,bar*}", Cardinality::Many).unwrap();
        match ast.filter {
            Some(WhereNode::Logical { op: LogicOp::And, children }) => assert_eq!(children.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_like_any_quantifier_negated_applies_de_morgan() {
        let ast = parse_request("t", "name=not.like(any).{foo*,bar*}", Cardinality::Many).unwrap();
        match ast.filter {
            Some(WhereNode::Logical { op: LogicOp::And, children }) => {
                assert!(children.iter().all(|c| matches!(c, WhereNode::Filter { negated: true, .. })));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_dotted_filter_routes_into_matching_embed() {
        let ast = parse_request(
            "posts",
            "select=id,author:profiles!author_id(name)&author.name=eq.Tom",
            Cardinality::Many,
        )
        .unwrap();
        assert!(ast.filter.is_none(), "the embed's filter must not leak onto the parent");
        match &ast.select[1] {
            ColumnItem::Embedded(spec) => match &spec.filter {
                Some(WhereNode::Filter { column, value: FilterValue::Text(v), .. }) => {
                    assert_eq!(column, "name");
                    assert_eq!(v, "Tom");
                }
                other => panic!("expected embed filter, got {other:?}"),
            },
            other => panic!("expected embed, got {other:?}"),
        }
    }

    #[test]
    fn test_dotted_order_and_limit_route_into_embed() {
        let ast = parse_request(
            "posts",
            "select=id,comments(body)&comments.order=body.desc&comments.limit=5&comments.offset=10",
            Cardinality::Many,
        )
        .unwrap();
        match &ast.select[1] {
            ColumnItem::Embedded(spec) => {
                assert_eq!(spec.order.len(), 1);
                assert_eq!(spec.order[0].direction, OrderDirection::Desc);
                assert_eq!(spec.range, Some(RangeSpec { offset: 10, limit: Some(5) }));
            }
            other => panic!("expected embed, got {other:?}"),
        }
    }

    #[test]
    fn test_dotted_filter_with_no_matching_embed_errors() {
        let err = parse_request("posts", "nope.id=eq.1", Cardinality::Many).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_range_from_header() {
        let r = range_from_header("items=0-9").unwrap();
        assert_eq!(r.offset, 0);
        assert_eq!(r.limit, Some(10));
    }
}
