use std::{
    cmp::Ordering,
    collections::{hash_map::Entry, HashMap},
    fmt::Debug,
    future::Future,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::fs::operations::{read_optional, write_atomically};

/// Anything that can live in a [RecordStore] collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    type Id: Copy + Eq + Debug + Serialize + Send + Sync + 'static;

    /// Name of the collection, also used as the file name by [JsonRecordStore].
    const COLLECTION: &'static str;

    fn id(&self) -> Self::Id;
}

type Filter<R> = Box<dyn Fn(&R) -> bool + Send + Sync>;
type Order<R> = Box<dyn Fn(&R, &R) -> Ordering + Send + Sync>;

/// Typed predicate + sort + limit, evaluated against a collection.
pub struct Query<R> {
    filters: Vec<Filter<R>>,
    order: Option<Order<R>>,
    limit: Option<usize>,
}

impl<R: Record> Query<R> {
    pub fn all() -> Self {
        Self {
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn by_id(id: R::Id) -> Self {
        Self::all().filter(move |record: &R| record.id() == id).limit(1)
    }

    /// Filters are combined, a record has to match all of them.
    pub fn filter(mut self, filter: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn sort_by(mut self, order: impl Fn(&R, &R) -> Ordering + Send + Sync + 'static) -> Self {
        self.order = Some(Box::new(order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn apply(&self, records: impl IntoIterator<Item = R>) -> Vec<R> {
        let mut matching = records
            .into_iter()
            .filter(|record| self.filters.iter().all(|filter| filter(record)))
            .collect::<Vec<_>>();
        if let Some(order) = &self.order {
            matching.sort_by(|a, b| order(a, b));
        }
        if let Some(limit) = self.limit {
            matching.truncate(limit);
        }
        matching
    }
}

/// Interface of the persistent store. Changes made through `insert` and `delete` are visible to
/// `fetch` immediately and become durable on `save`.
pub trait RecordStore {
    /// Inserts the record, replacing a stored record with the same id.
    fn insert<R: Record>(&self, record: R) -> impl Future<Output = Result<()>>;

    /// Returns whether a record was removed.
    fn delete<R: Record>(&self, id: R::Id) -> impl Future<Output = Result<bool>>;

    fn fetch<R: Record>(&self, query: Query<R>) -> impl Future<Output = Result<Vec<R>>>;

    /// Commits pending changes.
    fn save(&self) -> impl Future<Output = Result<()>>;

    fn get<R: Record>(&self, id: R::Id) -> impl Future<Output = Result<Option<R>>> {
        async move { Ok(self.fetch(Query::by_id(id)).await?.into_iter().next()) }
    }
}

impl<T: Deref> RecordStore for T
where
    T::Target: RecordStore,
{
    fn insert<R: Record>(&self, record: R) -> impl Future<Output = Result<()>> {
        self.deref().insert(record)
    }

    fn delete<R: Record>(&self, id: R::Id) -> impl Future<Output = Result<bool>> {
        self.deref().delete::<R>(id)
    }

    fn fetch<R: Record>(&self, query: Query<R>) -> impl Future<Output = Result<Vec<R>>> {
        self.deref().fetch(query)
    }

    fn save(&self) -> impl Future<Output = Result<()>> {
        self.deref().save()
    }
}

/// Stored form of a record. Rows that fail to parse keep a `Null` id: they are never returned
/// but survive rewrites of the collection.
struct Row {
    id: Value,
    body: Value,
}

#[derive(Default)]
struct Collection {
    rows: Vec<Row>,
    dirty: bool,
}

impl Collection {
    fn position(&self, id: &Value) -> Option<usize> {
        self.rows.iter().position(|row| !row.id.is_null() && &row.id == id)
    }
}

/// The main realization of [RecordStore]. Each collection is a JSON array in
/// `<record_dir>/<collection>.json`, loaded on first use and rewritten atomically on save.
pub struct JsonRecordStore {
    record_dir: PathBuf,
    collections: Mutex<HashMap<&'static str, Collection>>,
}

impl JsonRecordStore {
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self {
            record_dir,
            collections: Mutex::new(HashMap::new()),
        })
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.record_dir.join(format!("{collection}.json"))
    }

    async fn load<R: Record>(path: &Path) -> Result<Collection> {
        debug!("Loading {path:?}");
        let Some(contents) = read_optional(path).await? else {
            return Ok(Collection::default());
        };
        if contents.trim().is_empty() {
            return Ok(Collection::default());
        }

        let values: Vec<Value> = serde_json::from_str(&contents)
            .with_context(|| format!("Collection {path:?} is not a JSON array"))?;

        let mut rows = Vec::with_capacity(values.len());
        for body in values {
            let id = match serde_json::from_value::<R>(body.clone()) {
                Ok(record) => serde_json::to_value(record.id())?,
                Err(e) => {
                    warn!("Found illegal record in {path:?}, keeping it untouched: {e}");
                    Value::Null
                }
            };
            rows.push(Row { id, body });
        }

        Ok(Collection { rows, dirty: false })
    }

    /// Runs `action` against the collection of `R`, loading it if needed.
    async fn with_collection<R: Record, T>(
        &self,
        action: impl FnOnce(&mut Collection) -> Result<T>,
    ) -> Result<T> {
        let mut collections = self.collections.lock().await;
        let collection = match collections.entry(R::COLLECTION) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                entry.insert(Self::load::<R>(&self.collection_path(R::COLLECTION)).await?)
            }
        };
        action(collection)
    }
}

impl RecordStore for JsonRecordStore {
    async fn insert<R: Record>(&self, record: R) -> Result<()> {
        let id = serde_json::to_value(record.id())?;
        let body = serde_json::to_value(&record)?;
        self.with_collection::<R, _>(move |collection| {
            match collection.position(&id) {
                Some(index) => collection.rows[index].body = body,
                None => collection.rows.push(Row { id, body }),
            }
            collection.dirty = true;
            Ok(())
        })
        .await
    }

    async fn delete<R: Record>(&self, id: R::Id) -> Result<bool> {
        let id = serde_json::to_value(id)?;
        self.with_collection::<R, _>(move |collection| {
            let Some(index) = collection.position(&id) else {
                return Ok(false);
            };
            collection.rows.remove(index);
            collection.dirty = true;
            Ok(true)
        })
        .await
    }

    async fn fetch<R: Record>(&self, query: Query<R>) -> Result<Vec<R>> {
        let records = self
            .with_collection::<R, _>(|collection| {
                collection
                    .rows
                    .iter()
                    .filter(|row| !row.id.is_null())
                    .map(|row| Ok(serde_json::from_value::<R>(row.body.clone())?))
                    .collect::<Result<Vec<R>>>()
            })
            .await?;
        Ok(query.apply(records))
    }

    async fn save(&self) -> Result<()> {
        let mut collections = self.collections.lock().await;
        for (name, collection) in collections.iter_mut().filter(|(_, c)| c.dirty) {
            let bodies = collection.rows.iter().map(|row| &row.body).collect::<Vec<_>>();
            let serialized = serde_json::to_vec_pretty(&bodies)?;
            let path = self.collection_path(name);
            write_atomically(&path, &serialized)
                .await
                .with_context(|| format!("Failed to write collection {path:?}"))?;
            collection.dirty = false;
            debug!("Saved {} records into {path:?}", collection.rows.len());
        }
        Ok(())
    }
}
