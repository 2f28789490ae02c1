//! End-to-end reconciliation tests.
//!
//! A scripted MySQL catalog stands in for the live database: two existing
//! tables with drift (a pending rename, a widened column, an undeclared
//! column, a changed foreign key) and one declared table that is missing.

mod common;

use common::{mysql_catalog, mysql_column, mysql_foreign_key, mysql_index, MySqlTable, ScriptedConnection};
use oxide_reconcile::prelude::*;

fn live() -> ScriptedConnection {
    let users = MySqlTable {
        primary_key: &["id"],
        indices: vec![mysql_index("idx_email", "email", true)],
        ..MySqlTable::new(
            "users",
            vec![
                mysql_column("id", "int(11)", false, None, "auto_increment"),
                mysql_column("email", "varchar(255)", false, None, ""),
                mysql_column("active", "tinyint(1)", false, Some("1"), ""),
                mysql_column("nickname", "varchar(64)", true, Some("NULL"), ""),
            ],
        )
    };
    let posts = MySqlTable {
        primary_key: &["id"],
        indices: vec![
            mysql_index("fk_posts_user", "user_id", false),
            mysql_index("idx_title", "title", false),
        ],
        foreign_keys: vec![mysql_foreign_key("fk_posts_user", "user_id", "users", "id", "CASCADE")],
        ..MySqlTable::new(
            "posts",
            vec![
                mysql_column("id", "int(11)", false, None, "auto_increment"),
                mysql_column("user_id", "int(11)", false, None, ""),
                mysql_column("title", "varchar(200)", true, Some("'untitled'"), ""),
                mysql_column("score", "decimal(8,2)", false, Some("0.00"), ""),
            ],
        )
    };
    mysql_catalog("app", vec![posts, users])
}

fn declared() -> Schema {
    Schema::new()
        .table(
            Table::new("users")
                .column(Column::new("id", ColumnType::Int).primary_key().identity())
                .column(Column::new("email", ColumnType::VarChar).length(255).not_null())
                .column(Column::new("active", ColumnType::Bool).not_null().default_value(1))
                .column(
                    Column::new("nickname", ColumnType::VarChar)
                        .length(64)
                        .rename_to("display_name"),
                )
                .index(Index::new("idx_email", ["email"]).unique()),
        )
        .table(
            Table::new("posts")
                .column(Column::new("id", ColumnType::Int).primary_key().identity())
                .column(Column::new("user_id", ColumnType::Int).not_null())
                .column(
                    Column::new("title", ColumnType::VarChar)
                        .length(250)
                        .default_value("untitled"),
                )
                .index(Index::new("idx_title", ["title"]))
                .foreign_key(
                    ForeignKey::new("fk_posts_user", ["user_id"], "users", ["id"])
                        .on_delete(ForeignKeyAction::Restrict),
                ),
        )
        .table(
            Table::new("comments")
                .column(Column::new("id", ColumnType::Int).primary_key().identity())
                .column(Column::new("post_id", ColumnType::Int).not_null())
                .column(Column::new("body", ColumnType::Text))
                .foreign_key(ForeignKey::new("fk_comments_post", ["post_id"], "posts", ["id"])),
        )
}

const CREATE_COMMENTS: &str = concat!(
    "CREATE TABLE `comments` (\n",
    "  `id` int(11) NOT NULL AUTO_INCREMENT,\n",
    "  `post_id` int(11) NOT NULL,\n",
    "  `body` text COLLATE utf8mb4_unicode_ci NULL,\n",
    "  PRIMARY KEY (`id`)\n",
    ") ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"
);

fn expected() -> Vec<&'static str> {
    vec![
        "ALTER TABLE `posts` DROP FOREIGN KEY `fk_posts_user`",
        "ALTER TABLE `users` CHANGE `nickname` `display_name` varchar(64) COLLATE utf8mb4_unicode_ci NULL",
        "ALTER TABLE `posts` DROP COLUMN `score`",
        "ALTER TABLE `posts` CHANGE `title` `title` varchar(250) COLLATE utf8mb4_unicode_ci NULL DEFAULT 'untitled'",
        CREATE_COMMENTS,
        "ALTER TABLE `posts` ADD CONSTRAINT `fk_posts_user` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`) ON DELETE RESTRICT ON UPDATE NO ACTION",
        "ALTER TABLE `comments` ADD CONSTRAINT `fk_comments_post` FOREIGN KEY (`post_id`) REFERENCES `posts` (`id`) ON DELETE NO ACTION ON UPDATE NO ACTION",
    ]
}

#[tokio::test]
async fn test_plan_orders_phases() {
    let settings = ConnectionSettings::new("app");
    let mut introspector = MySqlIntrospector::new(live(), &settings, ExecutionMode::Live);

    let plan = Reconciler::default()
        .prepare(&mut introspector, &declared())
        .await
        .unwrap();

    assert_eq!(plan.statements(), expected());
    assert!(plan.is_destructive());
    assert_eq!(
        plan.tables().into_iter().collect::<Vec<_>>(),
        vec!["comments", "posts", "users"]
    );
    // Planning only reads the catalog.
    assert!(introspector.into_inner().executed.is_empty());
}

#[tokio::test]
async fn test_dry_run_records_without_executing() {
    let settings = ConnectionSettings::new("app");
    let mut buffer = Vec::new();
    let mut introspector =
        MySqlIntrospector::new(live(), &settings, ExecutionMode::DryRun(&mut buffer));

    let report = Reconciler::default()
        .reconcile(&mut introspector, &declared())
        .await
        .unwrap();
    assert_eq!(report.operations, 7);
    assert_eq!(report.statements, 7);

    let connection = introspector.into_inner();
    assert!(connection.executed.is_empty());
    assert_eq!(buffer, expected());
}

#[tokio::test]
async fn test_live_run_executes_in_order() {
    let settings = ConnectionSettings::new("app");
    let mut introspector = MySqlIntrospector::new(live(), &settings, ExecutionMode::Live);

    Reconciler::default()
        .reconcile(&mut introspector, &declared())
        .await
        .unwrap();

    assert_eq!(introspector.into_inner().executed, expected());
}

#[tokio::test]
async fn test_suppressed_drops_keep_columns() {
    let settings = ConnectionSettings::new("app");
    let mut introspector = MySqlIntrospector::new(live(), &settings, ExecutionMode::Live);

    let report = Reconciler::new(ReconcilerOptions { allow_drops: false })
        .reconcile(&mut introspector, &declared())
        .await
        .unwrap();

    assert_eq!(report.suppressed, 1);
    let executed = introspector.into_inner().executed;
    assert!(!executed.iter().any(|s| s.contains("DROP COLUMN")));
    assert_eq!(executed.len(), 6);
}

#[tokio::test]
async fn test_failure_stops_the_run() {
    let settings = ConnectionSettings::new("app");
    let connection = live().fail_on("CHANGE `title`");
    let mut introspector = MySqlIntrospector::new(connection, &settings, ExecutionMode::Live);

    let err = Reconciler::default()
        .reconcile(&mut introspector, &declared())
        .await
        .unwrap_err();

    let ReconcileError::Execution {
        table, statement, ..
    } = err
    else {
        panic!("expected an execution error");
    };
    assert_eq!(table, "posts");
    assert!(statement.starts_with("ALTER TABLE `posts` CHANGE `title`"));
    assert_eq!(introspector.into_inner().executed, expected()[..3].to_vec());
}

#[tokio::test]
async fn test_unsupported_type_fails_before_executing() {
    let settings = ConnectionSettings::new("app");
    let mut introspector = MySqlIntrospector::new(live(), &settings, ExecutionMode::Live);
    let schema = declared().table(
        Table::new("events").column(Column::new("at", ColumnType::DateTimeOffset)),
    );

    let err = Reconciler::default()
        .reconcile(&mut introspector, &schema)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::UnsupportedType { .. }));
    assert!(introspector.into_inner().executed.is_empty());
}

fn legacy() -> Schema {
    Schema::new()
        .table(
            Table::new("users")
                .column(Column::new("id", ColumnType::Int).primary_key().identity())
                .column(Column::new("email", ColumnType::VarChar).length(255).not_null())
                .column(Column::new("active", ColumnType::Bool).not_null().default_value(1))
                .column(Column::new("nickname", ColumnType::VarChar).length(64))
                .index(Index::new("idx_email", ["email"]).unique()),
        )
        .table(
            Table::new("posts")
                .column(Column::new("id", ColumnType::Int).primary_key().identity())
                .column(Column::new("user_id", ColumnType::Int).not_null())
                .column(Column::new("title", ColumnType::VarChar).length(200))
                .column(Column::new("score", ColumnType::Decimal).length((8, 2)))
                .index(Index::new("idx_title", ["title"]))
                .foreign_key(
                    ForeignKey::new("fk_posts_user", ["user_id"], "users", ["id"])
                        .on_delete(ForeignKeyAction::Cascade),
                ),
        )
}

#[tokio::test]
async fn test_second_run_is_empty() {
    for dialect in [Dialect::MySql, Dialect::Postgres] {
        let mut memory = MemoryIntrospector::new(legacy(), dialect, ExecutionMode::Live);
        let reconciler = Reconciler::default();

        let report = reconciler.reconcile(&mut memory, &declared()).await.unwrap();
        assert_eq!(report.operations, 7, "{dialect}");

        let plan = reconciler.prepare(&mut memory, &declared()).await.unwrap();
        assert!(
            plan.is_empty(),
            "{dialect}: {:?}",
            plan.operations
                .iter()
                .map(|op| op.operation.description())
                .collect::<Vec<_>>()
        );

        let users = memory.schema().get_table("users").unwrap();
        assert!(users.get_column("display_name").is_some());
    }
}

#[tokio::test]
async fn test_new_identity_on_existing_table_converges() {
    let live = Schema::new().table(
        Table::new("tags").column(Column::new("label", ColumnType::VarChar).length(32)),
    );
    let declared = Schema::new().table(
        Table::new("tags")
            .column(Column::new("id", ColumnType::BigInt).primary_key().identity())
            .column(Column::new("label", ColumnType::VarChar).length(32)),
    );

    let mut buffer = Vec::new();
    {
        let mut memory =
            MemoryIntrospector::new(live.clone(), Dialect::MySql, ExecutionMode::DryRun(&mut buffer));
        Reconciler::default()
            .reconcile(&mut memory, &declared)
            .await
            .unwrap();
        assert_eq!(memory.schema(), &live);
    }
    assert_eq!(
        buffer,
        vec![
            "ALTER TABLE `tags` ADD COLUMN `id` bigint(20) NOT NULL",
            "ALTER TABLE `tags` ADD PRIMARY KEY (`id`)",
            "ALTER TABLE `tags` CHANGE `id` `id` bigint(20) NOT NULL AUTO_INCREMENT",
        ]
    );

    let mut memory = MemoryIntrospector::new(live, Dialect::MySql, ExecutionMode::Live);
    let reconciler = Reconciler::default();
    reconciler.reconcile(&mut memory, &declared).await.unwrap();
    assert!(reconciler.prepare(&mut memory, &declared).await.unwrap().is_empty());
}
