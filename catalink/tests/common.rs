use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use catalink::{
    Catalink,
    catalog::{CatalogService, SqliteCatalog},
    errors::{LinkError, Result},
    models::{AssetDraft, AssetKind, CatalogAsset, ConnectorType, SaveResponse},
    query::SearchRequest,
};
use tempfile::TempDir;

/// Wraps a real catalog, counting calls and failing chosen writes.
pub struct RecordingCatalog {
    inner: Arc<SqliteCatalog>,
    pub saves: AtomicUsize,
    pub drafts_created: AtomicUsize,
    pub searches: AtomicUsize,
    /// Data-type patches for these column names fail with a transport error.
    failing_patches: Mutex<HashSet<String>>,
    /// Creates of these entity names are dropped from the save response.
    dropped_creates: Mutex<HashSet<String>>,
    /// Column searches come back empty, as when a listing is truncated.
    hidden_columns: AtomicBool,
}

#[allow(dead_code)]
impl RecordingCatalog {
    pub fn new(inner: Arc<SqliteCatalog>) -> Self {
        Self {
            inner,
            saves: AtomicUsize::new(0),
            drafts_created: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
            failing_patches: Mutex::new(HashSet::new()),
            dropped_creates: Mutex::new(HashSet::new()),
            hidden_columns: AtomicBool::new(false),
        }
    }

    pub fn fail_patch_for(&self, column: &str) {
        self.failing_patches.lock().unwrap().insert(column.to_string());
    }

    pub fn drop_create_of(&self, name: &str) {
        self.dropped_creates.lock().unwrap().insert(name.to_string());
    }

    pub fn hide_column_listings(&self) {
        self.hidden_columns.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.drafts_created.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.saves.store(0, Ordering::SeqCst);
        self.drafts_created.store(0, Ordering::SeqCst);
        self.searches.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatalogService for RecordingCatalog {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<CatalogAsset>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.hidden_columns.load(Ordering::SeqCst) && request.kind() == Some(AssetKind::Column) {
            return Ok(Vec::new());
        }
        self.inner.search(request).await
    }

    async fn save(&self, drafts: Vec<AssetDraft>) -> Result<SaveResponse> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        {
            let failing = self.failing_patches.lock().unwrap();
            if drafts
                .iter()
                .any(|d| d.guid.is_some() && d.attributes.data_type.is_some() && failing.contains(&d.name))
            {
                return Err(LinkError::Catalog("simulated 503 from catalog".into()));
            }
        }

        let dropped = self.dropped_creates.lock().unwrap().clone();
        let kept: Vec<AssetDraft> = drafts
            .into_iter()
            .filter(|d| d.guid.is_some() || !dropped.contains(&d.name))
            .collect();

        let response = self.inner.save(kept).await?;
        self.drafts_created
            .fetch_add(response.created.len(), Ordering::SeqCst);
        Ok(response)
    }

    async fn get_by_qualified_name(
        &self,
        kind: AssetKind,
        qualified_name: &str,
    ) -> Result<Option<CatalogAsset>> {
        self.inner.get_by_qualified_name(kind, qualified_name).await
    }

    async fn role_guid(&self, role_name: &str) -> Result<Option<String>> {
        self.inner.role_guid(role_name).await
    }
}

#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteCatalog>,
    pub catalog: Arc<RecordingCatalog>,
    pub engine: Catalink,
}

pub fn init_test_context() -> anyhow::Result<TestContext> {
    let _ = env_logger::builder().is_test(true).try_init();

    let temp_dir = tempfile::tempdir()?;
    let store = Arc::new(SqliteCatalog::open(temp_dir.path().join("catalog.sqlite"))?);
    store.initialize_schema()?;

    let catalog = Arc::new(RecordingCatalog::new(Arc::clone(&store)));
    let engine = Catalink::new(catalog.clone());

    Ok(TestContext {
        temp_dir,
        store,
        catalog,
        engine,
    })
}

/// Seeds a connection with one database and schema holding `tables`.
#[allow(dead_code)]
pub async fn seed_connection(
    store: &SqliteCatalog,
    name: &str,
    connector: ConnectorType,
    qualified_name: &str,
    tables: &[(&str, &[&str])],
) -> anyhow::Result<()> {
    let mut connection = AssetDraft::connection(name, connector, vec![], vec![], vec![]);
    connection.qualified_name = qualified_name.to_string();
    store.save(vec![connection]).await?;

    let database = first_created(store.save(vec![AssetDraft::database("warehouse", qualified_name)]).await?)?;
    let schema = first_created(store.save(vec![AssetDraft::schema("public", &database)]).await?)?;
    for (table, columns) in tables {
        let table = first_created(store.save(vec![AssetDraft::table(table, &schema)]).await?)?;
        let drafts = columns
            .iter()
            .enumerate()
            .map(|(i, column)| AssetDraft::column(column, &table, i as u32 + 1).with_data_type("string"))
            .collect();
        store.save(drafts).await?;
    }
    Ok(())
}

fn first_created(response: SaveResponse) -> anyhow::Result<CatalogAsset> {
    response
        .created
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("seed save created nothing"))
}
