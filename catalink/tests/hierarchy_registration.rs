mod common;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use catalink::{
    catalog::CatalogService,
    errors::LinkError,
    hierarchy::{RegistrationPlan, TableOutcome},
    models::{AssetKind, ConnectorType},
    storage::{MemoryObjectStore, ObjectStore},
    upsert::{ColumnReport, ConnectionSpec},
};
use common::init_test_context;

const BUCKET: &str = "landing-bucket";

fn plan(keys: &[&str]) -> RegistrationPlan {
    RegistrationPlan {
        connection: ConnectionSpec {
            name: "s3-landing".into(),
            connector: ConnectorType::S3,
            admin_users: vec!["data-admin".into()],
            admin_groups: vec!["platform".into()],
        },
        database_name: "landing".into(),
        schema_name: "csv".into(),
        bucket: BUCKET.into(),
        object_keys: keys.iter().map(|k| k.to_string()).collect(),
    }
}

async fn column_orders(
    catalog: &dyn CatalogService,
    table_qualified_name: &str,
    names: &[&str],
) -> Result<Vec<(String, Option<u32>, Option<String>)>> {
    let mut out = Vec::new();
    for name in names {
        let column = catalog
            .get_by_qualified_name(AssetKind::Column, &format!("{table_qualified_name}/{name}"))
            .await?
            .ok_or_else(|| anyhow::anyhow!("column {name} missing"))?;
        out.push((column.name, column.attributes.order, column.attributes.data_type));
    }
    Ok(out)
}

fn column_report(outcome: &TableOutcome) -> &ColumnReport {
    match outcome {
        TableOutcome::Registered { columns, .. } => columns,
        other => panic!("table not registered: {other:?}"),
    }
}

/// Every read fails the way an unavailable bucket does.
struct UnavailableStore;

#[async_trait]
impl ObjectStore for UnavailableStore {
    async fn get_object(&self, bucket: &str, key: &str) -> catalink::errors::Result<Vec<u8>> {
        Err(LinkError::Storage(format!("GET s3://{bucket}/{key} returned HTTP 503")))
    }
}

fn table_qn(outcome: &TableOutcome) -> &str {
    match outcome {
        TableOutcome::Registered {
            table_qualified_name,
            ..
        } => table_qualified_name,
        other => panic!("table not registered: {other:?}"),
    }
}

#[tokio::test]
async fn registration_is_idempotent_and_keeps_column_order() -> Result<()> {
    let ctx = init_test_context()?;
    let objects = Arc::new(MemoryObjectStore::new());
    objects.put(BUCKET, "crm/customers.csv", "id,name,email\n1,Ann,a@x.io\n2,Bob,b@x.io\n")?;

    let first = ctx.engine.register(objects.clone(), &plan(&["crm/customers.csv"])).await?;
    assert!(first.complete);
    let table = table_qn(&first.objects[0].outcome).to_string();
    assert!(table.ends_with("/landing/csv/crm_customers"));

    let connection = ctx
        .store
        .get_by_qualified_name(
            AssetKind::Connection,
            first.connection_qualified_name.as_deref().unwrap_or_default(),
        )
        .await?
        .expect("connection stored");
    assert_eq!(connection.attributes.admin_roles.len(), 1);
    assert_eq!(connection.attributes.admin_groups, vec!["platform".to_string()]);

    assert_eq!(
        column_orders(ctx.store.as_ref(), &table, &["id", "name", "email"]).await?,
        vec![
            ("id".into(), Some(1), Some("bigint".into())),
            ("name".into(), Some(2), Some("string".into())),
            ("email".into(), Some(3), Some("string".into())),
        ]
    );

    // A new leading column must not renumber the existing ones.
    objects.put(BUCKET, "crm/customers.csv", "region,id,name,email\neu,1,Ann,a@x.io\n")?;
    ctx.catalog.reset_counters();
    let second = ctx.engine.register(objects.clone(), &plan(&["crm/customers.csv"])).await?;

    assert_eq!(second.connection_qualified_name, first.connection_qualified_name);
    assert_eq!(ctx.catalog.created(), 1);
    match &second.objects[0].outcome {
        TableOutcome::Registered { columns, .. } => {
            assert_eq!(columns.created, vec!["region"]);
            assert_eq!(columns.existing, vec!["id", "name", "email"]);
            assert_eq!(columns.patched, vec!["region"]);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(
        column_orders(ctx.store.as_ref(), &table, &["id", "name", "email"]).await?
            .into_iter()
            .map(|(_, order, _)| order)
            .collect::<Vec<_>>(),
        vec![Some(1), Some(2), Some(3)]
    );

    ctx.catalog.reset_counters();
    ctx.engine.register(objects, &plan(&["crm/customers.csv"])).await?;
    assert_eq!(ctx.catalog.created(), 0);
    assert_eq!(ctx.store.count_assets(Some(AssetKind::Column))?, 4);
    Ok(())
}

#[tokio::test]
async fn one_failed_patch_leaves_siblings_typed() -> Result<()> {
    let ctx = init_test_context()?;
    let objects = Arc::new(MemoryObjectStore::new());
    objects.put(BUCKET, "events.csv", "a,b,c,d,e\n1,x,1.5,true,2\n")?;
    ctx.catalog.fail_patch_for("c");

    let report = ctx.engine.register(objects, &plan(&["events.csv"])).await?;
    let (table, columns) = match &report.objects[0].outcome {
        TableOutcome::Registered {
            table_qualified_name,
            columns,
        } => (table_qualified_name.clone(), columns.clone()),
        other => panic!("unexpected outcome {other:?}"),
    };

    assert_eq!(columns.created.len(), 5);
    assert_eq!(columns.patched, vec!["a", "b", "d", "e"]);
    assert_eq!(columns.patch_failed.len(), 1);
    assert_eq!(columns.patch_failed[0].0, "c");

    let typed = column_orders(ctx.store.as_ref(), &table, &["a", "b", "c", "d", "e"]).await?;
    let types: Vec<_> = typed.into_iter().map(|(_, _, t)| t).collect();
    assert_eq!(
        types,
        vec![
            Some("bigint".to_string()),
            Some("string".to_string()),
            None,
            Some("boolean".to_string()),
            Some("bigint".to_string()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn unparsable_objects_do_not_stop_the_run() -> Result<()> {
    let ctx = init_test_context()?;
    let objects = Arc::new(MemoryObjectStore::new());
    objects.put(BUCKET, "latin1.csv", b"id,caf\xe9\n1,2\n".to_vec())?;
    objects.put(BUCKET, "good.csv", "id\n1\n")?;

    let report = ctx
        .engine
        .register(objects, &plan(&["latin1.csv", "good.csv"]))
        .await?;

    assert!(matches!(report.objects[0].outcome, TableOutcome::Unreadable(_)));
    assert_eq!(report.registered_tables(), 1);
    Ok(())
}

#[tokio::test]
async fn storage_failures_end_the_run() -> Result<()> {
    let ctx = init_test_context()?;

    let result = ctx
        .engine
        .register(Arc::new(UnavailableStore), &plan(&["a.csv", "b.csv"]))
        .await;

    assert!(matches!(result, Err(LinkError::Storage(_))));
    assert_eq!(ctx.store.count_assets(Some(AssetKind::Table))?, 0);
    Ok(())
}

#[tokio::test]
async fn case_variants_of_a_header_create_one_column() -> Result<()> {
    let ctx = init_test_context()?;
    let objects = Arc::new(MemoryObjectStore::new());
    objects.put(BUCKET, "ids.csv", "ID,id\n1,2\n")?;

    let report = ctx.engine.register(objects, &plan(&["ids.csv"])).await?;
    let columns = column_report(&report.objects[0].outcome);

    assert_eq!(columns.created, vec!["ID"]);
    assert_eq!(columns.duplicates, vec!["id"]);
    assert_eq!(ctx.store.count_assets(Some(AssetKind::Column))?, 1);
    Ok(())
}

#[tokio::test]
async fn dropped_column_create_leaves_siblings_created_and_typed() -> Result<()> {
    let ctx = init_test_context()?;
    let objects = Arc::new(MemoryObjectStore::new());
    objects.put(BUCKET, "events.csv", "a,b,c\n1,x,true\n")?;
    ctx.catalog.drop_create_of("b");

    let report = ctx.engine.register(objects, &plan(&["events.csv"])).await?;
    let table = table_qn(&report.objects[0].outcome).to_string();
    let columns = column_report(&report.objects[0].outcome);

    assert_eq!(columns.created, vec!["a", "c"]);
    assert_eq!(columns.create_failed, vec!["b"]);
    assert_eq!(columns.patched, vec!["a", "c"]);
    assert!(columns.patch_failed.is_empty());
    assert_eq!(
        column_orders(ctx.store.as_ref(), &table, &["a", "c"]).await?,
        vec![
            ("a".into(), Some(1), Some("bigint".into())),
            ("c".into(), Some(3), Some("boolean".into())),
        ]
    );
    assert_eq!(ctx.store.count_assets(Some(AssetKind::Column))?, 2);
    Ok(())
}

#[tokio::test]
async fn resaved_columns_are_not_counted_as_created() -> Result<()> {
    let ctx = init_test_context()?;
    let objects = Arc::new(MemoryObjectStore::new());
    objects.put(BUCKET, "orders.csv", "id,total\n1,9.5\n")?;
    ctx.engine.register(objects.clone(), &plan(&["orders.csv"])).await?;

    ctx.catalog.hide_column_listings();
    ctx.catalog.reset_counters();
    let report = ctx.engine.register(objects, &plan(&["orders.csv"])).await?;
    let columns = column_report(&report.objects[0].outcome);

    assert!(columns.created.is_empty());
    assert_eq!(columns.existing, vec!["id", "total"]);
    assert!(columns.patched.is_empty());
    assert_eq!(ctx.catalog.created(), 0);
    assert_eq!(ctx.store.count_assets(Some(AssetKind::Column))?, 2);
    Ok(())
}
