//! Integration tests for `SqliteStore` against an in-memory database, alone
//! and behind the core services.

use std::{collections::HashMap, sync::Arc};

use protean_core::{
  Error as CoreError,
  entity::{EntityDefinition, EntityKind, FieldType, NewEntity, NewField},
  query::QueryOptions,
  record::{NewRecord, ValueMap},
  registry::EntityRegistry,
  service::{EntityDataService, EntityDefinitionService, StoredRecord},
  store::{DocumentStore, MetadataStore, SchemaMaterializer},
};
use serde_json::json;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn values(v: serde_json::Value) -> ValueMap {
  match v {
    serde_json::Value::Object(map) => map,
    other => panic!("not an object: {other}"),
  }
}

fn params(pairs: &[(&str, &str)]) -> QueryOptions {
  let map: HashMap<String, String> =
    pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
  QueryOptions::from_params(&map)
}

fn product() -> NewEntity {
  NewEntity::new(1, "Product", "product", vec![
    NewField::new("name", FieldType::String).not_null().display_name("Name"),
    NewField::new("price", FieldType::Decimal),
    NewField::new("stock", FieldType::Integer).default_value("0"),
    NewField::new("active", FieldType::Boolean),
  ])
  .with_code("product")
}

fn new_record(entity_id: i64, data: serde_json::Value) -> NewRecord {
  NewRecord {
    entity_id,
    entity_code: "product".into(),
    app_id: 1,
    data: values(data),
    actor: "tester".into(),
  }
}

// ─── Metadata ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_get_by_code_keeps_fields() {
  let s = store().await;
  let created = s.create_entity(product(), "tester").await.unwrap();
  assert_eq!(created.version, 1);
  assert!(!created.table_created);

  let fetched = s.get_entity_by_code(1, "product").await.unwrap().unwrap();
  assert_eq!(fetched.id, created.id);
  assert_eq!(fetched.fields.len(), 4);
  let types: Vec<FieldType> = fetched.fields.iter().map(|f| f.field_type).collect();
  assert_eq!(types, [FieldType::String, FieldType::Decimal, FieldType::Integer, FieldType::Boolean]);
  assert_eq!(fetched.fields[0].db_type, "VARCHAR(255)");
  assert_eq!(fetched.fields[1].db_type, "DECIMAL(10,2)");
  assert_eq!(fetched.fields[0].display_name.as_deref(), Some("Name"));
  assert_eq!(fetched.fields[2].default_value.as_deref(), Some("0"));
  assert_eq!(fetched.created_by, "tester");
}

#[tokio::test]
async fn get_by_name_and_id() {
  let s = store().await;
  let created = s.create_entity(product(), "tester").await.unwrap();

  assert_eq!(s.get_entity_by_name(1, "Product").await.unwrap().unwrap().id, created.id);
  assert!(s.get_entity_by_name(2, "Product").await.unwrap().is_none());
  assert_eq!(s.get_entity(created.id).await.unwrap().unwrap().entity_code, "product");
  assert!(s.get_entity(created.id + 100).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_code_in_same_app_is_rejected() {
  let s = store().await;
  s.create_entity(product(), "tester").await.unwrap();

  let err = s.create_entity(product(), "tester").await.unwrap_err();
  assert!(matches!(err, CoreError::DuplicateCode { ref code, app_id: 1 } if code == "product"));

  // Other applications may reuse the code, though not the table.
  let mut other = product();
  other.app_id = 2;
  other.table_name = "product_2".into();
  s.create_entity(other, "tester").await.unwrap();
}

#[tokio::test]
async fn code_is_reusable_after_soft_delete() {
  let s = store().await;
  let first = s.create_entity(product(), "tester").await.unwrap();
  s.soft_delete_entity(first.id, "tester").await.unwrap();

  let second = s.create_entity(product(), "tester").await.unwrap();
  assert_ne!(first.id, second.id);
  assert_eq!(s.get_entity_by_code(1, "product").await.unwrap().unwrap().id, second.id);
}

#[tokio::test]
async fn missing_code_is_generated() {
  let s = store().await;
  let mut input = product();
  input.entity_code = None;
  let created = s.create_entity(input, "tester").await.unwrap();
  assert!(created.entity_code.starts_with("entity_"));
  assert_eq!(created.entity_code.len(), "entity_".len() + 12);
}

#[tokio::test]
async fn replace_fields_swaps_the_whole_set() {
  let s = store().await;
  let created = s.create_entity(product(), "tester").await.unwrap();

  let updated = s
    .replace_fields(created.id, vec![NewField::new("title", FieldType::Text)], "editor")
    .await
    .unwrap();
  assert_eq!(updated.version, 2);
  assert_eq!(updated.updated_by, "editor");
  assert_eq!(updated.fields.len(), 1);
  assert_eq!(updated.fields[0].field_name, "title");

  let again = s
    .replace_fields(created.id, vec![NewField::new("sku", FieldType::String)], "editor")
    .await
    .unwrap();
  assert_eq!(again.version, 3);

  let err = s.replace_fields(9999, vec![], "editor").await.unwrap_err();
  assert!(err.is_not_found());
}

#[tokio::test]
async fn listing_skips_deleted_definitions() {
  let s = store().await;
  let a = s.create_entity(product(), "tester").await.unwrap();
  let mut order = NewEntity::new(1, "Order", "orders", vec![NewField::new("total", FieldType::Decimal)]);
  order.sort_order = -1;
  s.create_entity(order, "tester").await.unwrap();
  let mut elsewhere = product();
  elsewhere.app_id = 9;
  elsewhere.table_name = "product_9".into();
  s.create_entity(elsewhere, "tester").await.unwrap();

  let listed = s.list_entities(1).await.unwrap();
  assert_eq!(
    listed.iter().map(|e| e.entity_name.as_str()).collect::<Vec<_>>(),
    ["Order", "Product"]
  );

  s.soft_delete_entity(a.id, "tester").await.unwrap();
  assert_eq!(s.list_entities(1).await.unwrap().len(), 1);
  assert_eq!(s.list_all_entities().await.unwrap().len(), 2);

  let err = s.soft_delete_entity(a.id, "tester").await.unwrap_err();
  assert!(matches!(err, CoreError::EntityNotFound(_)));
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_drop_table_twice() {
  let s = store().await;
  let entity = s.create_entity(product(), "tester").await.unwrap();

  s.create_table(&entity).await.unwrap();
  assert!(s.table_exists("product").await.unwrap());

  s.drop_table("product").await.unwrap();
  s.drop_table("product").await.unwrap();
  assert!(!s.table_exists("product").await.unwrap());
}

#[tokio::test]
async fn creating_an_existing_table_is_a_schema_error() {
  let s = store().await;
  let entity = s.create_entity(product(), "tester").await.unwrap();
  s.create_table(&entity).await.unwrap();

  let err = s.create_table(&entity).await.unwrap_err();
  assert!(matches!(err, CoreError::Schema { ref table, .. } if table == "product"));
}

#[tokio::test]
async fn engine_tables_are_never_dropped() {
  let s = store().await;
  let entity = s.create_entity(product(), "tester").await.unwrap();

  for table in ["entity_data_storage", "Entity_Definitions", "sqlite_master"] {
    let err = s.drop_table(table).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)), "{table}: {err}");
  }
  assert!(s.table_exists("entity_data_storage").await.unwrap());
  s.insert_record(new_record(entity.id, json!({"name": "still here"})))
    .await
    .unwrap();
}

#[tokio::test]
async fn a_live_table_name_cannot_be_claimed_twice() {
  let s = store().await;
  let first = s.create_entity(product(), "tester").await.unwrap();

  let copy = NewEntity::new(1, "Product copy", "PRODUCT", vec![NewField::new(
    "x",
    FieldType::Text,
  )])
  .with_code("product_copy");
  let err = s.create_entity(copy.clone(), "tester").await.unwrap_err();
  assert!(matches!(err, CoreError::Validation(ref m) if m.contains("product")));

  // Freed once the owner is soft-deleted.
  s.soft_delete_entity(first.id, "tester").await.unwrap();
  s.create_entity(copy, "tester").await.unwrap();
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_fetch_round_trips_multibyte_text() {
  let s = store().await;
  let entity = s.create_entity(product(), "tester").await.unwrap();
  let data = json!({
    "name": "全角テキスト ＡＢＣ ü 😀",
    "price": 12.5,
    "active": true,
  });

  let inserted = s.insert_record(new_record(entity.id, data.clone())).await.unwrap();
  assert_eq!(inserted.version, 1);
  assert_eq!(inserted.record_id.len(), 32);

  let fetched = s
    .get_record_by_record_id(entity.id, &inserted.record_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(serde_json::Value::Object(fetched.data), data);
  assert_eq!(fetched.id, inserted.id);
  assert_eq!(fetched.created_by, "tester");

  assert!(s.get_record_by_record_id(entity.id, "nope").await.unwrap().is_none());
}

#[tokio::test]
async fn update_increments_version_by_one() {
  let s = store().await;
  let entity = s.create_entity(product(), "tester").await.unwrap();
  let rec = s.insert_record(new_record(entity.id, json!({"name": "a"}))).await.unwrap();

  let v2 = s.update_record(rec.id, values(json!({"name": "b"})), "editor").await.unwrap();
  assert_eq!(v2.version, 2);
  assert_eq!(v2.updated_by, "editor");
  assert_eq!(v2.created_by, "tester");
  assert_eq!(v2.data["name"], "b");

  let v3 = s.update_record(rec.id, values(json!({"name": "c"})), "editor").await.unwrap();
  assert_eq!(v3.version, 3);

  let err = s.update_record(rec.id + 1, ValueMap::new(), "editor").await.unwrap_err();
  assert!(matches!(err, CoreError::RecordNotFound(_)));
}

#[tokio::test]
async fn deleting_twice_is_not_found() {
  let s = store().await;
  let entity = s.create_entity(product(), "tester").await.unwrap();
  let a = s.insert_record(new_record(entity.id, json!({"name": "a"}))).await.unwrap();
  let b = s.insert_record(new_record(entity.id, json!({"name": "b"}))).await.unwrap();

  s.delete_record(a.id).await.unwrap();
  assert!(s.get_record(a.id).await.unwrap().is_none());
  let err = s.delete_record(a.id).await.unwrap_err();
  assert!(matches!(err, CoreError::RecordNotFound(_)));

  s.delete_record_by_record_id(entity.id, &b.record_id).await.unwrap();
  let err = s
    .delete_record_by_record_id(entity.id, &b.record_id)
    .await
    .unwrap_err();
  assert!(err.is_not_found());
}

#[tokio::test]
async fn list_pages_newest_first() {
  let s = store().await;
  let entity = s.create_entity(product(), "tester").await.unwrap();
  for i in 1..=5 {
    s.insert_record(new_record(entity.id, json!({"name": format!("p{i}")})))
      .await
      .unwrap();
  }

  let first = s.list_records(1, "product", 1, 2).await.unwrap();
  let names: Vec<_> = first.iter().map(|r| r.data["name"].clone()).collect();
  assert_eq!(names, [json!("p5"), json!("p4")]);

  let last = s.list_records(1, "product", 3, 2).await.unwrap();
  assert_eq!(last.len(), 1);
  assert_eq!(last[0].data["name"], "p1");

  assert!(s.list_records(1, "other", 1, 10).await.unwrap().is_empty());
}

// ─── Queries ─────────────────────────────────────────────────────────────────

async fn seeded() -> (SqliteStore, EntityDefinition) {
  let s = store().await;
  let entity = s.create_entity(product(), "tester").await.unwrap();
  for (name, price) in [("MacBook", 2000), ("iPhone 15", 5000), ("Pixel", 3000)] {
    s.insert_record(new_record(entity.id, json!({"name": name, "price": price})))
      .await
      .unwrap();
  }
  (s, entity)
}

fn names(page: &[protean_core::record::Record]) -> Vec<String> {
  let mut out: Vec<String> = page
    .iter()
    .map(|r| r.data["name"].as_str().unwrap_or_default().to_owned())
    .collect();
  out.sort();
  out
}

#[tokio::test]
async fn numeric_comparison_filters() {
  let (s, e) = seeded().await;
  let page = s
    .query_records(&e, &params(&[("$filter", "price gt 3000")]))
    .await
    .unwrap();
  assert_eq!(names(&page.items), ["iPhone 15"]);

  let page = s
    .query_records(&e, &params(&[("$filter", "price le '3000'")]))
    .await
    .unwrap();
  assert_eq!(names(&page.items), ["MacBook", "Pixel"]);

  let page = s
    .query_records(&e, &params(&[("$filter", "price eq 3000")]))
    .await
    .unwrap();
  assert_eq!(names(&page.items), ["Pixel"]);
}

#[tokio::test]
async fn text_functions_and_equality() {
  let (s, e) = seeded().await;
  let page = s
    .query_records(&e, &params(&[("$filter", "contains(name,'phone')")]))
    .await
    .unwrap();
  assert_eq!(names(&page.items), ["iPhone 15"]);

  let page = s
    .query_records(&e, &params(&[("$filter", "startswith(name, 'Mac')")]))
    .await
    .unwrap();
  assert_eq!(names(&page.items), ["MacBook"]);

  let page = s
    .query_records(&e, &params(&[("$filter", "name ne 'Pixel'")]))
    .await
    .unwrap();
  assert_eq!(names(&page.items), ["MacBook", "iPhone 15"]);
}

#[tokio::test]
async fn unparseable_filter_returns_everything() {
  let (s, e) = seeded().await;
  let page = s
    .query_records(&e, &params(&[("$filter", "price >>> 'x' and or ((")]))
    .await
    .unwrap();
  assert_eq!(page.items.len(), 3);
}

#[tokio::test]
async fn orderby_and_count() {
  let (s, e) = seeded().await;
  let page = s
    .query_records(
      &e,
      &params(&[("$orderby", "price desc"), ("$top", "2"), ("$count", "true")]),
    )
    .await
    .unwrap();
  let ordered: Vec<_> = page.items.iter().map(|r| r.data["name"].clone()).collect();
  assert_eq!(ordered, [json!("iPhone 15"), json!("Pixel")]);
  assert_eq!(page.total, Some(3));

  let page = s
    .query_records(&e, &params(&[("$orderby", "price sideways")]))
    .await
    .unwrap();
  // Falls back to newest first.
  assert_eq!(page.items[0].data["name"], "Pixel");
  assert_eq!(page.total, None);
}

#[tokio::test]
async fn top_and_skip_select_by_recency() {
  let s = store().await;
  let entity = s.create_entity(product(), "tester").await.unwrap();
  for i in 1..=5 {
    s.insert_record(new_record(entity.id, json!({"name": format!("r{i}")})))
      .await
      .unwrap();
  }

  let page = s
    .query_records(&entity, &params(&[("$top", "2"), ("$skip", "2")]))
    .await
    .unwrap();
  let got: Vec<_> = page.items.iter().map(|r| r.data["name"].clone()).collect();
  // Newest first: r5 r4 | r3 r2 | r1
  assert_eq!(got, [json!("r3"), json!("r2")]);
}

// ─── Services ────────────────────────────────────────────────────────────────

struct Services {
  store:       Arc<SqliteStore>,
  registry:    Arc<EntityRegistry>,
  definitions: EntityDefinitionService<SqliteStore>,
  data:        EntityDataService<SqliteStore>,
}

async fn services() -> Services {
  let store = Arc::new(store().await);
  let registry = Arc::new(EntityRegistry::load(store.as_ref()).await.unwrap());
  Services {
    definitions: EntityDefinitionService::new(Arc::clone(&store), Arc::clone(&registry)),
    data: EntityDataService::new(Arc::clone(&store), Arc::clone(&registry), "http://localhost:8080/"),
    store,
    registry,
  }
}

#[tokio::test]
async fn definition_service_validates_and_registers() {
  let svc = services().await;

  let err = svc
    .definitions
    .create(NewEntity::new(1, "", "t", vec![NewField::new("a", FieldType::String)]), "u")
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));

  let created = svc.definitions.create(product(), "u").await.unwrap();
  assert!(svc.registry.get_by_code(1, "product").is_some());

  svc.definitions.delete(created.id, false, "u").await.unwrap();
  assert!(svc.registry.get(created.id).is_none());
  assert!(svc.definitions.get(created.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn failed_materialisation_keeps_definition_for_retry() {
  let svc = services().await;
  // A stray table already occupies the name.
  svc
    .store
    .call(|conn| Ok(conn.execute_batch("CREATE TABLE product (x TEXT)")?))
    .await
    .unwrap();

  let err = svc.definitions.create(product().auto_create_table(), "u").await.unwrap_err();
  assert!(matches!(err, CoreError::Schema { .. }));

  let kept = svc.definitions.get_by_code(1, "product").await.unwrap();
  assert!(!kept.table_created);

  svc.store.drop_table("product").await.unwrap();
  let retried = svc.definitions.materialize(kept.id).await.unwrap();
  assert!(retried.table_created);
  assert!(svc.definitions.get(kept.id).await.unwrap().table_created);
}

#[tokio::test]
async fn delete_with_drop_table_removes_the_table() {
  let svc = services().await;
  let created = svc.definitions.create(product().auto_create_table(), "u").await.unwrap();
  assert!(created.table_created);
  assert!(svc.store.table_exists("product").await.unwrap());

  svc.definitions.delete(created.id, true, "u").await.unwrap();
  assert!(!svc.store.table_exists("product").await.unwrap());
}

#[tokio::test]
async fn definitions_cannot_target_engine_tables() {
  let svc = services().await;
  let input = NewEntity::new(1, "Sneaky", "entity_data_storage", vec![NewField::new(
    "name",
    FieldType::String,
  )]);
  let err = svc.definitions.create(input, "u").await.unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));
  assert!(svc.registry.is_empty());

  // Documents keep working.
  svc.definitions.create(product(), "u").await.unwrap();
  svc.data.create(1, "product", values(json!({"name": "a"})), "u").await.unwrap();
}

#[tokio::test]
async fn data_service_enforces_required_fields_and_drops_unknown_keys() {
  let svc = services().await;
  svc.definitions.create(product(), "u").await.unwrap();

  let err = svc
    .data
    .create(1, "product", values(json!({"price": 1})), "u")
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));

  let err = svc
    .data
    .create(1, "product", values(json!({"name": null})), "u")
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));

  let StoredRecord::Document(rec) = svc
    .data
    .create(1, "product", values(json!({"name": "n", "colour": "red", "id": 5})), "u")
    .await
    .unwrap()
  else {
    panic!("expected a document");
  };
  assert_eq!(rec.data.keys().collect::<Vec<_>>(), ["name"]);

  let err = svc
    .data
    .create(1, "missing", values(json!({"name": "n"})), "u")
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::EntityNotFound(_)));
}

#[tokio::test]
async fn data_service_update_and_delete_by_record_id() {
  let svc = services().await;
  let entity = svc.definitions.create(product(), "u").await.unwrap();
  let StoredRecord::Document(rec) = svc
    .data
    .create(1, "product", values(json!({"name": "a"})), "u")
    .await
    .unwrap()
  else {
    panic!("expected a document");
  };

  let StoredRecord::Document(updated) = svc
    .data
    .update_by_record_id(entity.id, &rec.record_id, values(json!({"name": "b"})), "v")
    .await
    .unwrap()
  else {
    panic!("expected a document");
  };
  assert_eq!(updated.version, rec.version + 1);

  let err = svc
    .data
    .update(rec.id, values(json!({"price": 1})), "v")
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));

  svc.data.delete_by_record_id(entity.id, &rec.record_id).await.unwrap();
  assert!(svc.data.get(rec.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn query_envelope_with_count_stats_and_select() {
  let svc = services().await;
  svc.definitions.create(product(), "u").await.unwrap();
  for (name, price) in [("a", 10), ("bb", 20), ("ccc", 30)] {
    svc
      .data
      .create(1, "product", values(json!({"name": name, "price": price})), "u")
      .await
      .unwrap();
  }

  let result = svc
    .data
    .query(
      1,
      "product",
      &params(&[("$select", "price"), ("$count", "true"), ("$stats", "true")]),
    )
    .await
    .unwrap();
  assert_eq!(result.context, "http://localhost:8080/$metadata#product");
  assert_eq!(result.count, Some(3));
  assert!(result.value.iter().all(|r| {
    let mut keys: Vec<_> = r.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys == ["id", "price"]
  }));

  let body = serde_json::to_value(&result).unwrap();
  assert_eq!(body["@odata.count"], 3);
  let price = &body["@odata.stats"]["price"];
  assert_eq!(price["count"], 3);
  assert_eq!(price["sum"], 60.0);
  assert_eq!(price["average"], 20.0);
  assert_eq!(price["min"], 10.0);
  assert_eq!(price["max"], 30.0);
  // Stats are taken before projection.
  assert_eq!(body["@odata.stats"]["name"]["max_length"], 3);

  let plain = svc.data.query(1, "product", &QueryOptions::default()).await.unwrap();
  let body = serde_json::to_value(&plain).unwrap();
  assert!(body.get("@odata.count").is_none());
  assert!(body.get("@odata.stats").is_none());
}

#[tokio::test]
async fn static_documents_keep_fields_named_like_system_columns() {
  let svc = services().await;
  let input = NewEntity::new(1, "Ticket", "ticket", vec![
    NewField::new("id", FieldType::Long).primary_key(),
    NewField::new("status", FieldType::String),
  ])
  .with_code("ticket")
  .with_kind(EntityKind::Static);
  svc.definitions.create(input, "u").await.unwrap();
  for (id, status) in [(7, "open"), (8, "closed")] {
    svc
      .data
      .create(1, "ticket", values(json!({"id": id, "status": status})), "u")
      .await
      .unwrap();
  }

  for filter in ["id eq 7", "status eq 'open'"] {
    let result = svc.data.query(1, "ticket", &params(&[("$filter", filter)])).await.unwrap();
    assert_eq!(result.value.len(), 1, "{filter}");
    let row = &result.value[0];
    assert_eq!(row["id"], 7);
    assert_eq!(row["status"], "open");
    assert_eq!(row["version"], 1);
  }

  let result = svc.data.query(1, "ticket", &params(&[("$orderby", "id")])).await.unwrap();
  let ids: Vec<_> = result.value.iter().map(|r| r["id"].clone()).collect();
  assert_eq!(ids, [json!(7), json!(8)]);
}

#[tokio::test]
async fn document_rows_render_timestamps_like_records() {
  let svc = services().await;
  svc.definitions.create(product(), "u").await.unwrap();
  let StoredRecord::Document(created) = svc
    .data
    .create(1, "product", values(json!({"name": "a"})), "u")
    .await
    .unwrap()
  else {
    panic!("expected a document");
  };

  let record = serde_json::to_value(svc.data.get(created.id).await.unwrap()).unwrap();
  let result = svc.data.query(1, "product", &QueryOptions::default()).await.unwrap();
  let row = &result.value[0];
  for key in ["created_at", "updated_at"] {
    assert_eq!(row[key], record[key], "{key}");
    assert!(row[key].as_str().is_some_and(|t| t.ends_with('Z')));
  }
}

#[tokio::test]
async fn table_backed_template_entity_routes_to_table() {
  let svc = services().await;
  svc.definitions.create(product().auto_create_table(), "u").await.unwrap();

  for (name, price) in [("MacBook", 2000), ("iPhone 15", 5000)] {
    let stored = svc
      .data
      .create(1, "product", values(json!({"name": name, "price": price, "active": true})), "u")
      .await
      .unwrap();
    let StoredRecord::Row(row) = stored else {
      panic!("expected a table row");
    };
    assert_eq!(row["version"], 1);
    assert_eq!(row["stock"], 0);
    assert_eq!(row["active"], true);
    assert_eq!(row["record_id"].as_str().map(str::len), Some(32));
  }
  // Nothing went to the document table.
  assert!(svc.store.list_records(1, "product", 1, 10).await.unwrap().is_empty());

  let result = svc
    .data
    .query(1, "product", &params(&[("$filter", "price gt 3000"), ("$count", "true")]))
    .await
    .unwrap();
  assert_eq!(result.count, Some(1));
  assert_eq!(result.value[0]["name"], "iPhone 15");

  let listed = svc.data.list(1, "product", 1, 10).await.unwrap();
  assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn table_rows_are_addressable_by_record_id() {
  let svc = services().await;
  let entity = svc.definitions.create(product().auto_create_table(), "u").await.unwrap();
  let StoredRecord::Row(row) = svc
    .data
    .create(1, "product", values(json!({"name": "a", "price": 10})), "u")
    .await
    .unwrap()
  else {
    panic!("expected a table row");
  };
  let rid = row["record_id"].as_str().unwrap().to_owned();

  let StoredRecord::Row(fetched) = svc.data.get_by_record_id(entity.id, &rid).await.unwrap() else {
    panic!("expected a table row");
  };
  assert_eq!(fetched["name"], "a");

  let StoredRecord::Row(updated) = svc
    .data
    .update_by_record_id(entity.id, &rid, values(json!({"name": "b"})), "v")
    .await
    .unwrap()
  else {
    panic!("expected a table row");
  };
  assert_eq!(updated["name"], "b");
  assert_eq!(updated["price"], 10);
  assert_eq!(updated["version"], 2);
  assert_eq!(updated["created_at"], row["created_at"]);

  let err = svc
    .data
    .update_by_record_id(entity.id, "missing", values(json!({"name": "c"})), "v")
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::RecordNotFound(_)));

  svc.data.delete_by_record_id(entity.id, &rid).await.unwrap();
  assert!(svc.data.get_by_record_id(entity.id, &rid).await.unwrap_err().is_not_found());
  let err = svc.data.delete_by_record_id(entity.id, &rid).await.unwrap_err();
  assert!(matches!(err, CoreError::RecordNotFound(_)));
}

#[tokio::test]
async fn static_entity_uses_native_columns_and_composite_key() {
  let svc = services().await;
  let input = NewEntity::new(1, "Order line", "order_line", vec![
    NewField::new("order_no", FieldType::Long).primary_key(),
    NewField::new("line_no", FieldType::Integer).primary_key(),
    NewField::new("sku", FieldType::String).indexed(),
    NewField::new("qty", FieldType::Integer),
  ])
  .with_code("order_line")
  .with_kind(EntityKind::Static)
  .auto_create_table();
  svc.definitions.create(input, "u").await.unwrap();

  for (line, sku, qty) in [(1, "A", 2), (2, "B", 7), (3, "C", 1)] {
    svc
      .data
      .create(
        1,
        "order_line",
        values(json!({"order_no": 100, "line_no": line, "sku": sku, "qty": qty})),
        "u",
      )
      .await
      .unwrap();
  }

  let dup = svc
    .data
    .create(1, "order_line", values(json!({"order_no": 100, "line_no": 1})), "u")
    .await
    .unwrap_err();
  assert!(matches!(dup, CoreError::Persistence { .. }));

  let result = svc
    .data
    .query(1, "order_line", &params(&[("$filter", "qty ge 2"), ("$orderby", "line_no desc")]))
    .await
    .unwrap();
  let lines: Vec<_> = result.value.iter().map(|r| r["line_no"].clone()).collect();
  assert_eq!(lines, [json!(2), json!(1)]);
  assert_eq!(result.value[0]["id"], "100,2");
  assert!(result.value[0].get("record_id").is_none());

  // The reported id addresses the row.
  let entity = svc.definitions.get_by_code(1, "order_line").await.unwrap();
  let StoredRecord::Row(row) = svc.data.get_by_record_id(entity.id, "100,2").await.unwrap() else {
    panic!("expected a table row");
  };
  assert_eq!(row["sku"], "B");

  let StoredRecord::Row(row) = svc
    .data
    .update_by_record_id(
      entity.id,
      "100,2",
      values(json!({"order_no": 100, "line_no": 2, "qty": 9})),
      "u",
    )
    .await
    .unwrap()
  else {
    panic!("expected a table row");
  };
  assert_eq!(row["qty"], 9);
  assert_eq!(row["sku"], "B");

  svc.data.delete_by_record_id(entity.id, "100,3").await.unwrap();
  for missing in ["100,3", "100", "100,2,1"] {
    let err = svc.data.get_by_record_id(entity.id, missing).await.unwrap_err();
    assert!(err.is_not_found(), "{missing}");
  }
}

#[tokio::test]
async fn registry_is_rebuilt_from_the_store() {
  let svc = services().await;
  svc.definitions.create(product(), "u").await.unwrap();
  let reloaded = EntityRegistry::load(svc.store.as_ref()).await.unwrap();
  assert_eq!(reloaded.len(), 1);
  assert!(reloaded.get_by_code(1, "product").is_some());
}
