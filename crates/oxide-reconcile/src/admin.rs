//! Administrative user provisioning.

use std::collections::BTreeMap;

use tracing::info;

use crate::error::{ReconcileError, Result};
use crate::introspect::Introspector;
use crate::schema::Value;

/// Inserts or updates the row of `username` in `table`.
///
/// The user id is looked up by `username_column`. When a row exists it is
/// updated with `params`; otherwise a row with the username and `params` is
/// inserted. Returns true when a statement was executed (or recorded).
///
/// # Errors
///
/// Fails when the user table cannot be read or written.
pub async fn create_or_update_admin_user<I>(
    introspector: &mut I,
    user_id_column: &str,
    table: &str,
    username_column: &str,
    username: &str,
    params: &BTreeMap<String, Value>,
) -> Result<bool>
where
    I: Introspector + ?Sized,
{
    let lookup = {
        let d = introspector.dialect();
        format!(
            "SELECT {} FROM {} WHERE {} = {}",
            d.quote_identifier(user_id_column),
            d.quote_identifier(table),
            d.quote_identifier(username_column),
            d.placeholder(1)
        )
    };
    let rows = introspector.query(&lookup, &[username.to_string()]).await?;
    let user_id = rows
        .first()
        .and_then(|row| row.get(user_id_column))
        .map(str::to_string);

    let statement = {
        let d = introspector.dialect();
        match &user_id {
            Some(_) if params.is_empty() => return Ok(false),
            Some(id) => {
                let assignments: Vec<String> = params
                    .iter()
                    .map(|(column, value)| {
                        format!("{} = {}", d.quote_identifier(column), d.literal(value))
                    })
                    .collect();
                format!(
                    "UPDATE {} SET {} WHERE {} = {}",
                    d.quote_identifier(table),
                    assignments.join(", "),
                    d.quote_identifier(user_id_column),
                    d.quote_literal(id)
                )
            }
            None => {
                let mut columns = vec![d.quote_identifier(username_column)];
                let mut values = vec![d.quote_literal(username)];
                for (column, value) in params {
                    if column == username_column {
                        continue;
                    }
                    columns.push(d.quote_identifier(column));
                    values.push(d.literal(value));
                }
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    d.quote_identifier(table),
                    columns.join(", "),
                    values.join(", ")
                )
            }
        }
    };

    introspector
        .execute(&statement)
        .await
        .map_err(|e| ReconcileError::execution(table, &statement, e))?;
    info!(
        table = %table,
        username = %username,
        updated = user_id.is_some(),
        "Provisioned admin user"
    );
    Ok(true)
}
