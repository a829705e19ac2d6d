use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tracing::debug;

use crate::auth::SchedulePasswordSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command, SqlError};
use crate::tenant::TenantManager;

pub struct WeekslotHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<WeekslotQueryParser>,
}

impl WeekslotHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(WeekslotQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    /// Parse, execute and record metrics for one statement.
    async fn run_sql<C: ClientInfo>(&self, client: &C, query: &str) -> PgWireResult<Response> {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);

        let started = Instant::now();
        let result = self.execute_command(&engine, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            debug!("{label} rejected: {e}");
        }
        result
    }

    async fn execute_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Response> {
        match cmd {
            Command::CreateRecord {
                day,
                start,
                end,
                tags,
            } => {
                let record = engine
                    .create_record(day, start, end, tags)
                    .await
                    .map_err(engine_err)?;
                Ok(records_response(std::slice::from_ref(&record)))
            }
            Command::UpdateRecord { id, start, end } => {
                let id = id.ok_or_else(|| engine_err(EngineError::MissingIdentifier))?;
                let record = engine
                    .update_record(id, start, end)
                    .await
                    .map_err(engine_err)?;
                Ok(records_response(std::slice::from_ref(&record)))
            }
            Command::DeleteRecord { id } => {
                let id = id.ok_or_else(|| engine_err(EngineError::MissingIdentifier))?;
                engine.delete_record(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectRecords { id: Some(id) } => {
                let record = engine.get_record(id).await.map_err(engine_err)?;
                Ok(records_response(std::slice::from_ref(&record)))
            }
            Command::SelectRecords { id: None } => {
                Ok(records_response(&engine.list_records().await))
            }
            Command::SelectSchedule { day } => {
                let week = engine.weekly_schedule().await;
                let schema = Arc::new(schedule_schema());
                let rows: Vec<PgWireResult<_>> = week
                    .days
                    .iter()
                    .filter(|d| day.is_none_or(|wanted| d.day == wanted))
                    .flat_map(|d| d.slots.iter().map(move |slot| (d.day, slot)))
                    .map(|(day, slot)| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&day.name())?;
                        encoder.encode_field(&slot.record_id.to_string())?;
                        encoder.encode_field(&slot.start)?;
                        encoder.encode_field(&slot.stop)?;
                        encoder.encode_field(&tags_json(&slot.tags))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectWeeklySchedule => {
                let week = engine.weekly_schedule().await;
                let json = week.to_json().map_err(|e| PgWireError::ApiError(Box::new(e)))?;
                let schema = Arc::new(weekly_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                let row = encoder.encode_field(&json).map(|()| encoder.take_row());
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(vec![row]))))
            }
        }
    }
}

fn records_response(records: &[Record]) -> Response {
    let schema = Arc::new(records_schema());
    let rows: Vec<PgWireResult<_>> = records
        .iter()
        .map(|record| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&record.id.to_string())?;
            encoder.encode_field(&record.day.name())?;
            encoder.encode_field(&record.span.start.to_string())?;
            encoder.encode_field(&record.span.end.to_string())?;
            encoder.encode_field(&tags_json(&record.tags))?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn tags_json(tags: &[i64]) -> String {
    serde_json::Value::from(tags.to_vec()).to_string()
}

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn records_schema() -> Vec<FieldInfo> {
    ["id", "day", "start_time", "end_time", "tags"]
        .into_iter()
        .map(text_field)
        .collect()
}

fn schedule_schema() -> Vec<FieldInfo> {
    ["day", "record_id", "start", "stop", "tags"]
        .into_iter()
        .map(text_field)
        .collect()
}

fn weekly_schema() -> Vec<FieldInfo> {
    vec![text_field("schedule")]
}

/// Result columns for a statement, decided before its parameters are bound.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.trim_start().to_uppercase();
    if upper.starts_with("DELETE") {
        vec![]
    } else if upper.contains("WEEKLY_SCHEDULE") {
        weekly_schema()
    } else if upper.contains("SCHEDULE") {
        schedule_schema()
    } else if upper.contains("RECORDS") {
        records_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for WeekslotHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run_sql(client, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct WeekslotQueryParser;

#[async_trait]
impl QueryParser for WeekslotQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for WeekslotHandler {
    type Statement = String;
    type QueryParser = WeekslotQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        self.run_sql(client, &sql).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

fn substitute_params(portal: &Portal<String>) -> String {
    bind_params(&portal.statement.statement, &portal.parameters)
}

/// Inline bound text parameters as quoted literals in one left-to-right pass.
/// Placeholders inside quoted text, and text produced by an earlier
/// substitution, are left alone. Unbound placeholders stay as written.
fn bind_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut chars = sql.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                out.push(c);
            }
            None if c == '$' => {
                let mut end = i + 1;
                while let Some(&(j, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    end = j + 1;
                    chars.next();
                }
                let param = sql[i + 1..end]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|idx| params.get(idx));
                match param {
                    Some(Some(bytes)) => {
                        let text = String::from_utf8_lossy(bytes.as_ref());
                        out.push('\'');
                        out.push_str(&text.replace('\'', "''"));
                        out.push('\'');
                    }
                    Some(None) => out.push_str("NULL"),
                    None => out.push_str(&sql[i..end]),
                }
            }
            None => out.push(c),
        }
    }
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct WeekslotFactory {
    handler: Arc<WeekslotHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<SchedulePasswordSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl WeekslotFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        Self {
            handler: Arc::new(WeekslotHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                SchedulePasswordSource::new(password),
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for WeekslotFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = WeekslotFactory::new(tenant_manager, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn engine_sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::IntervalConflict { .. } => "23P01",
        EngineError::RecordNotFound(_) => "P0002",
        _ => "P0001",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        engine_sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_sqlstate(e: &SqlError) -> &'static str {
    match e {
        SqlError::InvalidValue(_) => "22007",
        _ => "42601",
    }
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sql_sqlstate(&e).into(),
        e.to_string(),
    )))
}
