use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    CreateRecord {
        day: Weekday,
        start: TimeOfDay,
        end: TimeOfDay,
        tags: Vec<i64>,
    },
    /// `id` is `None` when the statement has no `WHERE id = ...`.
    UpdateRecord {
        id: Option<Ulid>,
        start: Option<TimeOfDay>,
        end: Option<TimeOfDay>,
    },
    DeleteRecord {
        id: Option<Ulid>,
    },
    SelectRecords {
        id: Option<Ulid>,
    },
    SelectSchedule {
        day: Option<Weekday>,
    },
    SelectWeeklySchedule,
}

const RECORD_INSERT_COLUMNS: [&str; 4] = ["day", "start_time", "end_time", "tags"];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    if table != "records" {
        return Err(SqlError::UnknownTable(table));
    }
    let values = extract_insert_values(insert)?;
    if values.len() < 3 {
        return Err(SqlError::WrongArity("records", 3, values.len()));
    }

    // Without a column list, values follow the table's declared column order.
    let columns: Vec<String> = if insert.columns.is_empty() {
        RECORD_INSERT_COLUMNS
            .iter()
            .take(values.len())
            .map(|c| c.to_string())
            .collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if columns.len() != values.len() {
        return Err(SqlError::Parse(format!(
            "INSERT has {} columns but {} values",
            columns.len(),
            values.len()
        )));
    }

    let (mut day, mut start, mut end, mut tags) = (None, None, None, None);
    for (column, expr) in columns.iter().zip(&values) {
        let duplicate = match column.as_str() {
            "day" => day.replace(parse_weekday(expr)?).is_some(),
            "start_time" => start.replace(parse_time(expr)?).is_some(),
            "end_time" => end.replace(parse_time(expr)?).is_some(),
            "tags" => tags.replace(parse_tags(expr)?).is_some(),
            "id" => return Err(SqlError::Unsupported("id is assigned by the server".into())),
            _ => return Err(SqlError::Parse(format!("unknown column: {column}"))),
        };
        if duplicate {
            return Err(SqlError::Parse(format!("duplicate column: {column}")));
        }
    }

    Ok(Command::CreateRecord {
        day: day.ok_or(SqlError::MissingColumn("day"))?,
        start: start.ok_or(SqlError::MissingColumn("start_time"))?,
        end: end.ok_or(SqlError::MissingColumn("end_time"))?,
        tags: tags.unwrap_or_default(),
    })
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let name = table_factor_name(&table.relation)?;
    if name != "records" {
        return Err(SqlError::UnknownTable(name));
    }

    let (mut start, mut end) = (None, None);
    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        match column.as_str() {
            "start_time" => start = Some(parse_time(&assignment.value)?),
            "end_time" => end = Some(parse_time(&assignment.value)?),
            "id" | "day" | "tags" => {
                return Err(SqlError::Unsupported(format!("{column} cannot be changed")));
            }
            _ => return Err(SqlError::Parse(format!("unknown column: {column}"))),
        }
    }

    Ok(Command::UpdateRecord {
        id: extract_where_id(selection)?,
        start,
        end,
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "records" {
        return Err(SqlError::UnknownTable(table));
    }
    Ok(Command::DeleteRecord {
        id: extract_where_id(&delete.selection)?,
    })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    match table.as_str() {
        "records" => Ok(Command::SelectRecords {
            id: extract_where_id(&select.selection)?,
        }),
        "schedule" => {
            let day = match &select.selection {
                Some(expr) => Some(extract_where_day(expr)?),
                None => None,
            };
            Ok(Command::SelectSchedule { day })
        }
        "weekly_schedule" => Ok(Command::SelectWeeklySchedule),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [row] => Ok(row.clone()),
            [] => Err(SqlError::Parse("empty VALUES".into())),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

/// `WHERE id = '<ulid>'`. No WHERE at all is `Ok(None)`; any other filter is an error.
fn extract_where_id(selection: &Option<Expr>) -> Result<Option<Ulid>, SqlError> {
    let Some(sel) = selection else {
        return Ok(None);
    };
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("id") => parse_ulid_expr(right).map(Some),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn extract_where_day(expr: &Expr) -> Result<Weekday, SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("day") => parse_weekday(right),
        _ => Err(SqlError::MissingFilter("day")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_string_expr(expr: &Expr) -> Result<&str, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.as_str()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => {
            Ulid::from_string(s).map_err(|e| SqlError::InvalidValue(format!("bad record id: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_weekday(expr: &Expr) -> Result<Weekday, SqlError> {
    parse_string_expr(expr)?.parse().map_err(SqlError::InvalidValue)
}

fn parse_time(expr: &Expr) -> Result<TimeOfDay, SqlError> {
    parse_string_expr(expr)?.parse().map_err(SqlError::InvalidValue)
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64_expr(expr)?);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _) | Value::SingleQuotedString(s)) => s
            .parse()
            .map_err(|e| SqlError::InvalidValue(format!("bad tag {s}: {e}"))),
        Some(value) => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

/// Tags as a JSON array string (`'[1,2]'`), `ARRAY[1,2]`, or `NULL`.
fn parse_tags(expr: &Expr) -> Result<Vec<i64>, SqlError> {
    if let Expr::Array(array) = expr {
        return array.elem.iter().map(parse_i64_expr).collect();
    }
    match extract_value(expr) {
        Some(Value::Null) => Ok(Vec::new()),
        Some(Value::SingleQuotedString(s)) => serde_json::from_str(s)
            .map_err(|e| SqlError::InvalidValue(format!("tags must be a JSON array of integers: {e}"))),
        Some(value) => Err(SqlError::Parse(format!("expected tags, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    MissingColumn(&'static str),
    InvalidValue(String),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected at least {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::InvalidValue(s) => write!(f, "invalid value: {s}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn parse_insert_record() {
        let sql = "INSERT INTO records (day, start_time, end_time, tags) VALUES ('monday', '12:15', '13:00', '[1, 2, 3, 4]')";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::CreateRecord {
                day: Weekday::Monday,
                start: t("12:15"),
                end: t("13:00"),
                tags: vec![1, 2, 3, 4],
            }
        );
    }

    #[test]
    fn parse_insert_array_tags() {
        let sql = "INSERT INTO records (day, start_time, end_time, tags) VALUES ('friday', '08:00', '09:00', ARRAY[5, -6])";
        match parse_sql(sql).unwrap() {
            Command::CreateRecord { tags, .. } => assert_eq!(tags, [5, -6]),
            other => panic!("expected CreateRecord, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_without_or_null_tags() {
        for sql in [
            "INSERT INTO records (day, start_time, end_time) VALUES ('sunday', '08:00', '09:00')",
            "INSERT INTO records (day, start_time, end_time, tags) VALUES ('sunday', '08:00', '09:00', NULL)",
        ] {
            match parse_sql(sql).unwrap() {
                Command::CreateRecord { day, tags, .. } => {
                    assert_eq!(day, Weekday::Sunday);
                    assert!(tags.is_empty());
                }
                other => panic!("expected CreateRecord, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_insert_rejects_bad_values() {
        let bad = [
            "INSERT INTO records (day, start_time, end_time) VALUES ('someday', '08:00', '09:00')",
            "INSERT INTO records (day, start_time, end_time) VALUES ('monday', '8am', '09:00')",
            "INSERT INTO records (day, start_time, end_time) VALUES ('monday', '08:00', '25:00')",
            "INSERT INTO records (day, start_time, end_time, tags) VALUES ('monday', '08:00', '09:00', '[\"a\"]')",
        ];
        for sql in bad {
            assert!(matches!(parse_sql(sql), Err(SqlError::InvalidValue(_))), "{sql}");
        }
    }

    #[test]
    fn parse_insert_follows_column_list() {
        let sql = "INSERT INTO records (day, end_time, start_time) VALUES ('monday', '10:00', '09:00')";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::CreateRecord {
                day: Weekday::Monday,
                start: t("09:00"),
                end: t("10:00"),
                tags: vec![],
            }
        );

        let sql = "INSERT INTO records (tags, day, start_time, end_time) VALUES ('[1]', 'tuesday', '09:00', '10:00')";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::CreateRecord {
                day: Weekday::Tuesday,
                start: t("09:00"),
                end: t("10:00"),
                tags: vec![1],
            }
        );
    }

    #[test]
    fn parse_insert_without_column_list() {
        let sql = "INSERT INTO records VALUES ('saturday', '07:00', '08:00', '[3]')";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::CreateRecord {
                day: Weekday::Saturday,
                start: t("07:00"),
                end: t("08:00"),
                tags: vec![3],
            }
        );
    }

    #[test]
    fn parse_insert_rejects_bad_columns() {
        let with_id = format!(
            "INSERT INTO records (id, day, start_time, end_time) VALUES ('{ID}', 'monday', '09:00', '10:00')"
        );
        assert!(matches!(parse_sql(&with_id), Err(SqlError::Unsupported(_))));

        let unknown = "INSERT INTO records (day, start_time, end_time, note) VALUES ('monday', '09:00', '10:00', 'x')";
        assert!(matches!(parse_sql(unknown), Err(SqlError::Parse(_))));

        let duplicate = "INSERT INTO records (day, start_time, start_time) VALUES ('monday', '09:00', '10:00')";
        assert!(matches!(parse_sql(duplicate), Err(SqlError::Parse(_))));

        let missing = "INSERT INTO records (day, start_time, tags) VALUES ('monday', '09:00', NULL)";
        assert!(matches!(parse_sql(missing), Err(SqlError::MissingColumn("end_time"))));

        let too_many = "INSERT INTO records VALUES ('monday', '09:00', '10:00', NULL, 'extra')";
        assert!(matches!(parse_sql(too_many), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_insert_wrong_arity() {
        let sql = "INSERT INTO records (day, start_time) VALUES ('monday', '08:00')";
        assert!(matches!(parse_sql(sql), Err(SqlError::WrongArity("records", 3, 2))));
    }

    #[test]
    fn parse_update_partial() {
        let sql = format!("UPDATE records SET start_time = '10:00' WHERE id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateRecord {
                id: Some(ID.parse().unwrap()),
                start: Some(t("10:00")),
                end: None,
            }
        );
    }

    #[test]
    fn parse_update_both_bounds() {
        let sql = format!("UPDATE records SET start_time = '10:00', end_time = '11:30' WHERE id = '{ID}'");
        match parse_sql(&sql).unwrap() {
            Command::UpdateRecord { start, end, .. } => {
                assert_eq!(start, Some(t("10:00")));
                assert_eq!(end, Some(t("11:30")));
            }
            other => panic!("expected UpdateRecord, got {other:?}"),
        }
    }

    #[test]
    fn parse_update_without_id() {
        let sql = "UPDATE records SET end_time = '11:30'";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::UpdateRecord { id: None, start: None, end: Some(t("11:30")) }
        );
    }

    #[test]
    fn parse_update_immutable_columns_rejected() {
        for column in ["day = 'monday'", "tags = '[1]'"] {
            let sql = format!("UPDATE records SET {column} WHERE id = '{ID}'");
            assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))), "{sql}");
        }
    }

    #[test]
    fn parse_delete_record() {
        let sql = format!("DELETE FROM records WHERE id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::DeleteRecord { id: Some(ID.parse().unwrap()) }
        );
        assert_eq!(
            parse_sql("DELETE FROM records").unwrap(),
            Command::DeleteRecord { id: None }
        );
    }

    #[test]
    fn parse_delete_bad_filter() {
        let sql = "DELETE FROM records WHERE day = 'monday'";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_bad_ulid() {
        let sql = "DELETE FROM records WHERE id = 'not-a-ulid'";
        assert!(matches!(parse_sql(sql), Err(SqlError::InvalidValue(_))));
    }

    #[test]
    fn parse_selects() {
        assert_eq!(
            parse_sql("SELECT * FROM schedule").unwrap(),
            Command::SelectSchedule { day: None }
        );
        assert_eq!(
            parse_sql("SELECT * FROM schedule WHERE day = 'Tuesday'").unwrap(),
            Command::SelectSchedule { day: Some(Weekday::Tuesday) }
        );
        assert_eq!(
            parse_sql("SELECT * FROM weekly_schedule").unwrap(),
            Command::SelectWeeklySchedule
        );
        assert_eq!(
            parse_sql("SELECT * FROM records").unwrap(),
            Command::SelectRecords { id: None }
        );
        assert_eq!(
            parse_sql(&format!("SELECT * FROM records WHERE id = '{ID}'")).unwrap(),
            Command::SelectRecords { id: Some(ID.parse().unwrap()) }
        );
    }

    #[test]
    fn parse_unknown_table_errors() {
        assert!(matches!(
            parse_sql("SELECT * FROM calendar"),
            Err(SqlError::UnknownTable(_))
        ));
        assert!(matches!(
            parse_sql("INSERT INTO foobar (a) VALUES (1)"),
            Err(SqlError::UnknownTable(_))
        ));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
