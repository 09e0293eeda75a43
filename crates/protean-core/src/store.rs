//! Storage traits, one per engine component.
//!
//! Implemented by storage backends (e.g. `protean-store-sqlite`). The
//! services in [`crate::service`] and the HTTP layer depend on these
//! abstractions, not on a concrete backend.
//!
//! All methods return `Send` futures so the traits can be used from a
//! multi-threaded runtime (e.g. tokio with `axum`).

use std::future::Future;

use crate::{
  Result,
  entity::{EntityDefinition, NewEntity, NewField},
  query::QueryOptions,
  record::{NewRecord, Page, Record, ValueMap},
};

// ─── Metadata ────────────────────────────────────────────────────────────────

/// Persists entity and field definitions. Holds no business data.
pub trait MetadataStore: Send + Sync {
  /// Persist a definition and its fields.
  ///
  /// Generates a code when `input.entity_code` is `None`. Fails with
  /// [`crate::Error::DuplicateCode`] if a non-deleted definition with the same
  /// `(code, app_id)` exists.
  fn create_entity<'a>(
    &'a self,
    input: NewEntity,
    actor: &'a str,
  ) -> impl Future<Output = Result<EntityDefinition>> + Send + 'a;

  /// Look up a non-deleted definition by id, with its ordered fields.
  fn get_entity(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<EntityDefinition>>> + Send + '_;

  fn get_entity_by_code<'a>(
    &'a self,
    app_id: i64,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<EntityDefinition>>> + Send + 'a;

  fn get_entity_by_name<'a>(
    &'a self,
    app_id: i64,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<EntityDefinition>>> + Send + 'a;

  /// Non-deleted definitions of one application, by `sort_order` then id.
  fn list_entities(
    &self,
    app_id: i64,
  ) -> impl Future<Output = Result<Vec<EntityDefinition>>> + Send + '_;

  /// Every non-deleted definition; used to build the registry at startup.
  fn list_all_entities(
    &self,
  ) -> impl Future<Output = Result<Vec<EntityDefinition>>> + Send + '_;

  /// Replace the complete field list and increment the entity version.
  ///
  /// This is delete-then-insert, not a patch: fields missing from `fields`
  /// are gone afterwards.
  fn replace_fields<'a>(
    &'a self,
    id: i64,
    fields: Vec<NewField>,
    actor: &'a str,
  ) -> impl Future<Output = Result<EntityDefinition>> + Send + 'a;

  fn set_table_created(
    &self,
    id: i64,
    created: bool,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Soft-delete the definition and its fields. Returns the definition as
  /// it was before deletion.
  fn soft_delete_entity<'a>(
    &'a self,
    id: i64,
    actor: &'a str,
  ) -> impl Future<Output = Result<EntityDefinition>> + Send + 'a;
}

// ─── Schema ──────────────────────────────────────────────────────────────────

/// Generates and executes DDL for entity tables.
pub trait SchemaMaterializer: Send + Sync {
  /// Create the backing table (and indexes) for `entity`, using the layout
  /// of its kind. Fails with [`crate::Error::Schema`] on any DDL error,
  /// including an already existing table.
  fn create_table<'a>(
    &'a self,
    entity: &'a EntityDefinition,
  ) -> impl Future<Output = Result<()>> + Send + 'a;

  /// Drop a table. Idempotent.
  fn drop_table<'a>(
    &'a self,
    table_name: &'a str,
  ) -> impl Future<Output = Result<()>> + Send + 'a;

  fn table_exists<'a>(
    &'a self,
    table_name: &'a str,
  ) -> impl Future<Output = Result<bool>> + Send + 'a;
}

// ─── Documents ───────────────────────────────────────────────────────────────

/// One JSON document per record in a shared table.
pub trait DocumentStore: Send + Sync {
  /// Generate a record id, store `input.data` as JSON with `version = 1`
  /// and `ACTIVE` status.
  fn insert_record(
    &self,
    input: NewRecord,
  ) -> impl Future<Output = Result<Record>> + Send + '_;

  /// Look up a record by storage row id.
  fn get_record(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Record>>> + Send + '_;

  fn get_record_by_record_id<'a>(
    &'a self,
    entity_id: i64,
    record_id: &'a str,
  ) -> impl Future<Output = Result<Option<Record>>> + Send + 'a;

  /// One page (1-based) of non-deleted records, newest first.
  fn list_records<'a>(
    &'a self,
    app_id: i64,
    entity_code: &'a str,
    page: u32,
    page_size: u32,
  ) -> impl Future<Output = Result<Vec<Record>>> + Send + 'a;

  /// Replace the stored values and increment the version by one. The
  /// version is not compared against anything: last write wins.
  fn update_record<'a>(
    &'a self,
    id: i64,
    data: ValueMap,
    actor: &'a str,
  ) -> impl Future<Output = Result<Record>> + Send + 'a;

  /// Remove the storage row. Fails with [`crate::Error::RecordNotFound`] if
  /// it does not exist.
  fn delete_record(&self, id: i64) -> impl Future<Output = Result<()>> + Send + '_;

  fn delete_record_by_record_id<'a>(
    &'a self,
    entity_id: i64,
    record_id: &'a str,
  ) -> impl Future<Output = Result<()>> + Send + 'a;

  /// Run a compiled `$filter`/`$orderby`/pagination query over the
  /// documents of `entity`. Its declared fields take precedence over the
  /// storage columns of the same name. `total` is set when `opts.count` is.
  fn query_records<'a>(
    &'a self,
    entity: &'a EntityDefinition,
    opts: &'a QueryOptions,
  ) -> impl Future<Output = Result<Page<Record>>> + Send + 'a;
}

// ─── Materialised tables ─────────────────────────────────────────────────────

/// Rows of an entity whose table has been materialised.
pub trait TableStore: Send + Sync {
  /// Insert one row. Template-layout tables get their system columns
  /// filled in. Returns the row as stored.
  fn insert_row<'a>(
    &'a self,
    entity: &'a EntityDefinition,
    data: ValueMap,
    actor: &'a str,
  ) -> impl Future<Output = Result<ValueMap>> + Send + 'a;

  /// Query real columns with the same grammar as [`DocumentStore::query_records`].
  fn query_rows<'a>(
    &'a self,
    entity: &'a EntityDefinition,
    opts: &'a QueryOptions,
  ) -> impl Future<Output = Result<Page<ValueMap>>> + Send + 'a;

  // A row is addressed by `key`: its `record_id` on template tables, its
  // key value on native ones (the key values joined with `,` in field order
  // when the key is composite).

  fn get_row<'a>(
    &'a self,
    entity: &'a EntityDefinition,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<ValueMap>>> + Send + 'a;

  /// Set the supplied columns of one row. Template rows also get
  /// `version + 1` and a fresh `updated_at`. Fails with
  /// [`crate::Error::RecordNotFound`] when no row matches.
  fn update_row<'a>(
    &'a self,
    entity: &'a EntityDefinition,
    key: &'a str,
    data: ValueMap,
    actor: &'a str,
  ) -> impl Future<Output = Result<ValueMap>> + Send + 'a;

  /// Hard-delete one row; [`crate::Error::RecordNotFound`] when none matches.
  fn delete_row<'a>(
    &'a self,
    entity: &'a EntityDefinition,
    key: &'a str,
  ) -> impl Future<Output = Result<()>> + Send + 'a;
}

/// Everything the services need from one backend.
pub trait EntityBackend:
  MetadataStore + SchemaMaterializer + DocumentStore + TableStore
{
}

impl<T> EntityBackend for T where
  T: MetadataStore + SchemaMaterializer + DocumentStore + TableStore
{
}
