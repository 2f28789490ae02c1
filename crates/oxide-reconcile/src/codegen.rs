//! Declarative schema source generation.
//!
//! Renders live or declared structure as the builder calls used to declare a
//! schema in Rust (`Column::new("id", ColumnType::Int).not_null()`), and parses
//! the column form back. Attributes equal to the type's dialect default are
//! left out, so generated source stays minimal.

use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;

use crate::catalog::{ColumnType, Length, LengthRule, TypeCatalog};
use crate::dialect::SqlDialect;
use crate::error::{ReconcileError, Result};
use crate::schema::{Column, ForeignKeyAction, Table, Value};

/// Builder-call expression for a column.
///
/// The quoted name is right-padded so that columns rendered with the same
/// `width` line up. Attributes follow in a fixed order: length, unsigned,
/// nullability, primary key, identity, default, comment, collation, rename.
///
/// # Errors
///
/// Returns [`ReconcileError::UnsupportedType`] when the catalog cannot render
/// the column's type.
pub fn column_source(catalog: &TypeCatalog, column: &Column, width: usize) -> Result<String> {
    let rule = catalog
        .length_rule(column.column_type)
        .map_err(|e| e.for_column(column.target_name()))?;

    let name = format!("{:?}", column.name);
    let mut out = format!(
        "Column::new({name:<pad$}, ColumnType::{})",
        column.column_type,
        pad = width + 2
    );

    if let Some(length) = &column.length {
        let is_default = match rule {
            LengthRule::None => true,
            LengthRule::Default(default) => default == length,
            LengthRule::Required | LengthRule::Values => false,
        };
        if !is_default {
            let _ = write!(out, ".length({})", length_source(length));
        }
    }
    if column.unsigned {
        out.push_str(".unsigned()");
    }
    if !column.nullable && !column.primary {
        out.push_str(".not_null()");
    }
    if column.primary {
        out.push_str(".primary_key()");
        if column.nullable {
            out.push_str(".nullable(true)");
        }
    }
    if column.identity {
        out.push_str(".identity()");
    }
    if let Some(default) = &column.default {
        let literal = match default {
            Value::Integer(v) => v.to_string(),
            Value::Float(v) => format!("{v:?}"),
            Value::Text(v) => format!("{v:?}"),
        };
        let _ = write!(out, ".default_value({literal})");
    }
    if !column.comment.is_empty() {
        let _ = write!(out, ".comment({:?})", column.comment);
    }
    if let Some(collation) = &column.collation {
        let _ = write!(out, ".with_collation({collation:?})");
    }
    if let Some(new_name) = &column.new_name {
        let _ = write!(out, ".rename_to({new_name:?})");
    }
    Ok(out)
}

fn length_source(length: &Length) -> String {
    match length {
        Length::Size(size) => size.to_string(),
        Length::Precision(precision, scale) => format!("({precision}, {scale})"),
        Length::Max => "Length::Max".to_string(),
        Length::Values(values) => {
            let quoted: Vec<String> = values.iter().map(|v| format!("{v:?}")).collect();
            format!("Length::values([{}])", quoted.join(", "))
        }
    }
}

/// Drops attributes that [`column_source`] would leave out.
#[must_use]
pub fn strip_defaults(catalog: &TypeCatalog, column: &Column) -> Column {
    let mut column = column.clone();
    let redundant = match catalog.length_rule(column.column_type) {
        Ok(LengthRule::None) => true,
        Ok(LengthRule::Default(default)) => column.length.as_ref() == Some(default),
        _ => false,
    };
    if redundant {
        column.length = None;
    }
    column
}

/// Builder-call expression for a whole table.
///
/// # Errors
///
/// Fails when a column's type is not supported by `dialect`.
pub fn table_source(dialect: &dyn SqlDialect, table: &Table) -> Result<String> {
    let width = table
        .columns
        .iter()
        .map(|c| c.name.chars().count())
        .max()
        .unwrap_or(0);

    let mut out = format!("Table::new({:?})", table.name);
    for column in &table.columns {
        let source = dialect
            .declarative_source_form(column, width)
            .map_err(|e| e.in_table(&table.name))?;
        let _ = write!(out, "\n    .column({source})");
    }

    let flagged: Vec<&str> = table
        .columns
        .iter()
        .filter(|c| c.primary)
        .map(Column::target_name)
        .collect();
    if flagged != table.primary_key {
        let _ = write!(out, "\n    .primary_key({})", string_array(&table.primary_key));
    }

    for index in &table.indices {
        let _ = write!(
            out,
            "\n    .index(Index::new({:?}, {}){})",
            index.name,
            string_array(&index.columns),
            if index.unique { ".unique()" } else { "" }
        );
    }
    for fk in &table.foreign_keys {
        let _ = write!(
            out,
            "\n    .foreign_key(ForeignKey::new({:?}, {}, {:?}, {}){}{})",
            fk.name,
            string_array(&fk.columns),
            fk.referenced_table,
            string_array(&fk.referenced_columns),
            action_source("on_delete", fk.on_delete),
            action_source("on_update", fk.on_update),
        );
    }
    if let Some(comment) = &table.comment {
        let _ = write!(out, "\n    .comment({comment:?})");
    }
    Ok(out)
}

fn string_array(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|i| format!("{i:?}")).collect();
    format!("[{}]", quoted.join(", "))
}

fn action_source(method: &str, action: ForeignKeyAction) -> String {
    if action == ForeignKeyAction::NoAction {
        String::new()
    } else {
        format!(".{method}(ForeignKeyAction::{action:?})")
    }
}

fn head_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^\s*Column::new\(\s*("(?:[^"\\]|\\.)*")\s*,\s*(?:ColumnType::)?(\w+)\s*\)"#)
            .expect("column head pattern is valid")
    })
}

/// Parses the output of [`column_source`] back into a column.
///
/// # Errors
///
/// Returns [`ReconcileError::SourceParse`] when `source` is not a builder
/// chain this module produces.
pub fn parse_column_source(source: &str) -> Result<Column> {
    let fail = |message: String| ReconcileError::SourceParse {
        source_text: source.to_string(),
        message,
    };

    let captures = head_pattern()
        .captures(source)
        .ok_or_else(|| fail("expected `Column::new(\"name\", ColumnType::X)`".to_string()))?;
    let name = parse_string_literal(&captures[1]).map_err(&fail)?;
    let column_type: ColumnType = captures[2].parse().map_err(&fail)?;
    let mut column = Column::new(name, column_type);

    let consumed = captures.get(0).map_or(0, |m| m.end());
    let rest = source[consumed..].trim_end().trim_end_matches(',').trim_end();
    for (method, args) in split_calls(rest).map_err(&fail)? {
        column = match method.as_str() {
            "length" => column.length(parse_length(&args).map_err(&fail)?),
            "unsigned" => column.unsigned(),
            "nullable" => match args.as_str() {
                "true" => column.nullable(true),
                "false" => column.nullable(false),
                other => return Err(fail(format!("expected a bool, found `{other}`"))),
            },
            "not_null" => column.not_null(),
            "primary_key" => column.primary_key(),
            "identity" => column.identity(),
            "default_value" => column.default_value(parse_value(&args).map_err(&fail)?),
            "comment" => column.comment(parse_string_literal(&args).map_err(&fail)?),
            "with_collation" => column.with_collation(parse_string_literal(&args).map_err(&fail)?),
            "rename_to" => column.rename_to(parse_string_literal(&args).map_err(&fail)?),
            other => return Err(fail(format!("unknown method `{other}`"))),
        };
    }
    Ok(column)
}

/// Splits `.a(x).b().c("y)")` into `[("a", "x"), ("b", ""), ("c", "\"y)\"")]`.
fn split_calls(mut rest: &str) -> std::result::Result<Vec<(String, String)>, String> {
    let mut calls = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(calls);
        }
        rest = rest
            .strip_prefix('.')
            .ok_or_else(|| format!("expected `.` before `{rest}`"))?;
        let open = rest
            .find('(')
            .ok_or_else(|| format!("expected `(` after `{rest}`"))?;
        let method = rest[..open].trim().to_string();

        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut close = None;
        for (i, c) in rest[open..].char_indices() {
            match c {
                _ if escaped => escaped = false,
                '\\' if in_string => escaped = true,
                '"' => in_string = !in_string,
                '(' | '[' if !in_string => depth += 1,
                ')' | ']' if !in_string => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(open + i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let close = close.ok_or_else(|| format!("unbalanced call to `{method}`"))?;
        calls.push((method, rest[open + 1..close].trim().to_string()));
        rest = &rest[close + 1..];
    }
}

fn parse_length(args: &str) -> std::result::Result<Length, String> {
    if args == "Length::Max" {
        return Ok(Length::Max);
    }
    if let Some(list) = args
        .strip_prefix("Length::values([")
        .and_then(|s| s.strip_suffix("])"))
    {
        return split_string_list(list).map(Length::Values);
    }
    if let Some(pair) = args.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        return pair.parse();
    }
    args.parse()
}

fn split_string_list(list: &str) -> std::result::Result<Vec<String>, String> {
    let mut values = Vec::new();
    let mut rest = list.trim();
    while !rest.is_empty() {
        let end = string_literal_end(rest)?;
        values.push(parse_string_literal(&rest[..end])?);
        rest = rest[end..].trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }
    Ok(values)
}

/// Byte offset just past the string literal at the start of `s`.
fn string_literal_end(s: &str) -> std::result::Result<usize, String> {
    if !s.starts_with('"') {
        return Err(format!("expected a string literal, found `{s}`"));
    }
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Ok(i + 1),
            _ => {}
        }
    }
    Err(format!("unterminated string literal `{s}`"))
}

fn parse_value(args: &str) -> std::result::Result<Value, String> {
    if args.starts_with('"') {
        return parse_string_literal(args).map(Value::Text);
    }
    if let Ok(v) = args.parse::<i64>() {
        return Ok(Value::Integer(v));
    }
    args.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| format!("expected a literal, found `{args}`"))
}

/// Parses a double-quoted literal as written by `{:?}`.
fn parse_string_literal(literal: &str) -> std::result::Result<String, String> {
    let literal = literal.trim();
    if literal.len() < 2 || string_literal_end(literal)? != literal.len() {
        return Err(format!("expected a single string literal, found `{literal}`"));
    }
    let body = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(c @ ('\\' | '"' | '\'')) => out.push(c),
            Some('u') => {
                let hex: String = chars.by_ref().skip(1).take_while(|c| *c != '}').collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("invalid unicode escape `\\u{{{hex}}}`"))?;
                out.push(code);
            }
            other => return Err(format!("unsupported escape `\\{}`", other.unwrap_or(' '))),
        }
    }
    Ok(out)
}
