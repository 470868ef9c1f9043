//! High-level client API.

use crate::connection::{ConnectionConfig, HttpTransport, Transport};
use crate::error::ClientError;
use crate::tracker::{EntityTracker, Tracked};
use dbapi_protocol::message::{delete_body, select_body};
use dbapi_protocol::{
    Conjunction, DecodeMode, Decoder, Encoder, InstanceInfo, Operation, ProtocolError, Record,
    Request, SchemaDescriptor, SchemaOptions, SchemaRegistry, Value,
};
use std::sync::Arc;

/// High-level client for dbapi.
///
/// Owns the schema registry and the entity tracker. Records returned by
/// fetch and insert come back as [`Tracked`] so they can be updated later.
pub struct Client<T: Transport = HttpTransport> {
    transport: T,
    registry: SchemaRegistry,
    tracker: EntityTracker,
}

impl Client<HttpTransport> {
    /// Creates an HTTP client for the given configuration.
    pub fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(&config)?;
        tracing::debug!(url = %transport.base_url(), "Created HTTP client");
        Ok(Self::with_transport(transport, config.schema_options))
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(transport: T, options: SchemaOptions) -> Self {
        Self {
            transport,
            registry: SchemaRegistry::with_options(options),
            tracker: EntityTracker::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &EntityTracker {
        &self.tracker
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    fn schema<R: Record>(&self) -> Result<Arc<SchemaDescriptor>, ClientError> {
        Ok(self.registry.describe::<R>()?)
    }

    async fn execute(&self, request: Request) -> Result<String, ClientError> {
        tracing::debug!(
            op = %request.op,
            target = request.target.as_deref().unwrap_or(""),
            "Sending request"
        );
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            tracing::debug!(status = response.status, "Request failed");
            return Err(ClientError::Transport {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response.body)
    }

    fn track_decoded<R: Record>(
        &self,
        table: &str,
        schema: &Arc<SchemaDescriptor>,
        rows: Vec<(R, Vec<Value>)>,
    ) -> Vec<Tracked<R>> {
        rows.into_iter()
            .map(|(record, persisted)| self.tracker.track_decoded(table, schema, record, persisted))
            .collect()
    }

    /// Renders a WHERE clause from field/value pairs, coercing each value to
    /// the declared field type. Unknown fields fail before any I/O.
    fn where_clause(
        schema: &SchemaDescriptor,
        filters: &[(&str, Value)],
    ) -> Result<String, ClientError> {
        let mut terms = Vec::with_capacity(filters.len());
        for (name, value) in filters {
            let field = schema.require_field(name)?;
            terms.push((field, value.clone().coerce(field.name, field.field_type)?));
        }
        let clause = Encoder::encode_predicate(
            terms.iter().map(|(field, value)| (*field, value)),
            Conjunction::Where,
        )?;
        Ok(clause)
    }

    fn identity_clause(schema: &SchemaDescriptor, id: Value) -> Result<(String, Value), ClientError> {
        let identity = schema.require_identity()?;
        let id = id.coerce(identity.name, identity.field_type)?;
        let clause = Encoder::encode_predicate([(identity, &id)], Conjunction::Where)?;
        Ok((clause, id))
    }

    // =========================================================================
    // Table management
    // =========================================================================

    /// Creates `table` with the columns of `R`. Fails if it already exists.
    pub async fn create_table<R: Record>(&self, table: &str) -> Result<(), ClientError> {
        let schema = self.schema::<R>()?;
        let request = Request::to_target(Operation::CreateTable, table)?
            .with_body(schema.column_definitions());
        self.execute(request).await?;
        Ok(())
    }

    /// Creates `table` with the columns of `R` unless it already exists.
    pub async fn ensure_table<R: Record>(&self, table: &str) -> Result<(), ClientError> {
        let schema = self.schema::<R>()?;
        let request = Request::to_target(Operation::EnsureTable, table)?
            .with_body(schema.column_definitions());
        self.execute(request).await?;
        Ok(())
    }

    /// Drops `table` and forgets every snapshot taken from it.
    pub async fn drop_table(&self, table: &str) -> Result<(), ClientError> {
        let request = Request::to_target(Operation::DropTable, table)?;
        self.execute(request).await?;
        let forgotten = self.tracker.untrack_table(table);
        tracing::debug!(table, forgotten, "Dropped table");
        Ok(())
    }

    /// Names of all tables in the store.
    pub async fn list_tables(&self) -> Result<Vec<String>, ClientError> {
        let body = self.execute(Request::new(Operation::ListTables)).await?;
        Ok(serde_json::from_str(&body)?)
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    /// Fetches the rows of `table` matching every `(field, value)` pair.
    pub async fn fetch_where<R: Record>(
        &self,
        table: &str,
        filters: &[(&str, Value)],
    ) -> Result<Vec<Tracked<R>>, ClientError> {
        self.fetch_where_with_mode(table, filters, DecodeMode::Strict)
            .await
    }

    pub async fn fetch_where_with_mode<R: Record>(
        &self,
        table: &str,
        filters: &[(&str, Value)],
        mode: DecodeMode,
    ) -> Result<Vec<Tracked<R>>, ClientError> {
        if filters.is_empty() {
            return self.fetch_all_with_mode(table, mode).await;
        }
        let schema = self.schema::<R>()?;
        let where_clause = Self::where_clause(&schema, filters)?;
        let request =
            Request::to_target(Operation::Select, table)?.with_body(select_body(&where_clause));

        let body = self.execute(request).await?;
        let rows = Decoder::new(mode).decode_row_set_values(&schema, &body)?;
        Ok(self.track_decoded(table, &schema, rows))
    }

    /// Fetches the row whose identity equals `id`. `None` when absent.
    pub async fn fetch_by_id<R: Record>(
        &self,
        table: &str,
        id: impl Into<Value>,
    ) -> Result<Option<Tracked<R>>, ClientError> {
        let schema = self.schema::<R>()?;
        let (where_clause, _) = Self::identity_clause(&schema, id.into())?;
        let request =
            Request::to_target(Operation::Select, table)?.with_body(select_body(&where_clause));

        let body = self.execute(request).await?;
        let mut rows: Vec<(R, Vec<Value>)> =
            Decoder::strict().decode_row_set_values(&schema, &body)?;
        if rows.len() > 1 {
            return Err(ProtocolError::MalformedFrame {
                framing: "row set",
                reason: format!("expected at most one row, got {}", rows.len()),
            }
            .into());
        }
        Ok(rows
            .pop()
            .map(|(record, persisted)| self.tracker.track_decoded(table, &schema, record, persisted)))
    }

    /// Fetches every row of `table`.
    pub async fn fetch_all<R: Record>(&self, table: &str) -> Result<Vec<Tracked<R>>, ClientError> {
        self.fetch_all_with_mode(table, DecodeMode::Strict).await
    }

    pub async fn fetch_all_with_mode<R: Record>(
        &self,
        table: &str,
        mode: DecodeMode,
    ) -> Result<Vec<Tracked<R>>, ClientError> {
        let schema = self.schema::<R>()?;
        let request = Request::to_target(Operation::SelectAll, table)?;
        let body = self.execute(request).await?;
        let rows = Decoder::new(mode).decode_row_set_values(&schema, &body)?;
        Ok(self.track_decoded(table, &schema, rows))
    }

    // =========================================================================
    // Insert, update, delete
    // =========================================================================

    /// Inserts one record and tracks it.
    pub async fn insert<R: Record>(&self, table: &str, record: R) -> Result<Tracked<R>, ClientError> {
        let schema = self.schema::<R>()?;
        let body = Encoder::encode_row(&schema, &record)?;
        let request = Request::to_target(Operation::Insert, table)?.with_body(body);
        self.execute(request).await?;
        Ok(self.tracker.track_record(table, &schema, record))
    }

    /// Inserts several records in one request and tracks them.
    pub async fn insert_many<R: Record>(
        &self,
        table: &str,
        records: Vec<R>,
    ) -> Result<Vec<Tracked<R>>, ClientError> {
        let request = Request::to_target(Operation::Insert, table)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let schema = self.schema::<R>()?;
        let body = Encoder::encode_insert_values(&schema, &records)?;
        self.execute(request.with_body(body)).await?;
        Ok(records
            .into_iter()
            .map(|record| self.tracker.track_record(table, &schema, record))
            .collect())
    }

    /// Writes the changed fields of a tracked record back to its table.
    ///
    /// The row is matched by its snapshot. Returns `false` without sending a
    /// request when nothing changed. The snapshot is kept as is.
    pub async fn update<R: Record>(&self, tracked: &Tracked<R>) -> Result<bool, ClientError> {
        let update =
            self.tracker
                .build_update_request(tracked.table(), tracked.handle(), tracked.record())?;
        if update.is_empty() {
            tracing::debug!(table = tracked.table(), "No changed fields; skipping update");
            return Ok(false);
        }
        let request =
            Request::to_target(Operation::Update, tracked.table())?.with_body(update.body());
        self.execute(request).await?;
        Ok(true)
    }

    /// Deletes the row matching the record's current fields and untracks it.
    ///
    /// On failure the record stays tracked, so the delete can be retried.
    pub async fn delete<R: Record>(&self, tracked: &Tracked<R>) -> Result<(), ClientError> {
        self.delete_record(tracked.table(), tracked.record()).await?;
        self.tracker.untrack(tracked.table(), tracked.handle());
        Ok(())
    }

    /// Deletes the rows matching every current field of `record`.
    pub async fn delete_record<R: Record>(&self, table: &str, record: &R) -> Result<(), ClientError> {
        let schema = self.schema::<R>()?;
        let where_clause = Encoder::encode_record_predicate(&schema, record, Conjunction::Where)?;
        let request =
            Request::to_target(Operation::Delete, table)?.with_body(delete_body(&where_clause));
        self.execute(request).await?;
        Ok(())
    }

    /// Deletes the row whose identity equals `id` and untracks every
    /// snapshot of it.
    pub async fn delete_by_id<R: Record>(
        &self,
        table: &str,
        id: impl Into<Value>,
    ) -> Result<(), ClientError> {
        let schema = self.schema::<R>()?;
        let (where_clause, id) = Self::identity_clause(&schema, id.into())?;
        let request =
            Request::to_target(Operation::Delete, table)?.with_body(delete_body(&where_clause));
        self.execute(request).await?;
        self.tracker.untrack_by_id(table, &id);
        Ok(())
    }

    /// Forgets the snapshot of a record without touching the store.
    pub fn forget<R: Record>(&self, tracked: Tracked<R>) -> R {
        self.tracker.untrack(tracked.table(), tracked.handle());
        tracked.into_inner()
    }

    // =========================================================================
    // Message channels
    // =========================================================================

    /// Appends records to `channel`. The broker rejects the whole batch when
    /// it would exceed the channel's capacity.
    pub async fn send_messages<R: Record>(&self, channel: &str, messages: &[R]) -> Result<(), ClientError> {
        let schema = self.schema::<R>()?;
        let body = Encoder::encode_message_batch(&schema, messages)?;
        let request = Request::to_target(Operation::SendChannel, channel)?.with_body(body);
        self.execute(request).await?;
        Ok(())
    }

    /// Returns and clears the messages of `channel`.
    pub async fn read_messages<R: Record>(&self, channel: &str) -> Result<Vec<R>, ClientError> {
        self.read_messages_with_mode(channel, DecodeMode::Strict).await
    }

    pub async fn read_messages_with_mode<R: Record>(
        &self,
        channel: &str,
        mode: DecodeMode,
    ) -> Result<Vec<R>, ClientError> {
        self.receive(Operation::ReadChannel, channel, mode).await
    }

    /// Returns the messages of `channel` without clearing them.
    pub async fn peek_messages<R: Record>(&self, channel: &str) -> Result<Vec<R>, ClientError> {
        self.receive(Operation::PeekChannel, channel, DecodeMode::Strict)
            .await
    }

    async fn receive<R: Record>(
        &self,
        op: Operation,
        channel: &str,
        mode: DecodeMode,
    ) -> Result<Vec<R>, ClientError> {
        let schema = self.schema::<R>()?;
        let body = self.execute(Request::to_target(op, channel)?).await?;
        Ok(Decoder::new(mode).decode_message_batch(&schema, &body)?)
    }

    /// Names of all channels.
    pub async fn list_channels(&self) -> Result<Vec<String>, ClientError> {
        let body = self.execute(Request::new(Operation::ListChannels)).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Removes `channel` and its messages.
    pub async fn clear_channel(&self, channel: &str) -> Result<(), ClientError> {
        self.execute(Request::to_target(Operation::ClearChannel, channel)?)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Instance
    // =========================================================================

    pub async fn info(&self) -> Result<InstanceInfo, ClientError> {
        let body = self.execute(Request::new(Operation::Info)).await?;
        Ok(serde_json::from_str(&body)?)
    }
}
