use super::{
    errors::HolderError,
    layout::{StudyInfo, discover_studies},
    model::{
        Experiment,
        FieldKey,
        LoadSummary,
        RunId,
        find_duplicates,
    },
    reconcile::{
        ChangeListener,
        ListenerId,
        Reconciler,
        UpdateReport,
        loader_fn,
    },
    result::{GlobalResult, HolderResult},
    store::StoreHandle,
};
use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::{
    collections::BTreeSet,
    fmt::Display,
    sync::Arc,
};
use tracing::{debug, info};

// Database entries
//
// Connection -> Database -> Study -> Experiment. Каждый уровень загружается
// лениво и держит детей в Reconciler, поэтому перезагрузка сообщает
// слушателям только реальные изменения.

fn qualify(parent: &str, id: &str) -> String {
    format!("{}-{id}", parent.replace('/', ""))
}

fn load_error(key: &impl Display, err: impl Display) -> HolderError {
    HolderError::Load {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

// Connection

pub struct Connection {
    uri: String,
    store: StoreHandle,
    databases: Reconciler<String, Database>,
    open: bool,
    loaded: bool,
}

impl Connection {
    pub fn new(store: StoreHandle, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let loader_store = Arc::clone(&store);
        let parent = uri.clone();
        let databases = Reconciler::new(loader_fn(
            move |name: &String| Ok(Database::new(Arc::clone(&loader_store), &parent, name)),
            |name: &String, database: &mut Database| {
                debug!(database = %name, "closing database");
                database.close()
            },
        ));
        Self {
            uri,
            store,
            databases,
            open: true,
            loaded: false,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn qualified_id(&self) -> &str {
        &self.uri
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn load(&mut self) -> GlobalResult<UpdateReport> {
        let mut names = if self.open {
            self.store.database_names()?
        } else {
            Vec::new()
        };
        names.sort();
        self.loaded = true;
        let report = self.databases.update(&names)?;
        info!(uri = %self.uri, databases = names.len(), "connection loaded");
        Ok(report)
    }

    fn ensure_loaded(&mut self) -> GlobalResult<()> {
        if !self.loaded {
            self.load()?;
        }
        Ok(())
    }

    pub fn list_databases(&mut self) -> GlobalResult<Vec<String>> {
        self.ensure_loaded()?;
        Ok(self.databases.list_keys())
    }

    pub fn database(&mut self, name: &str) -> GlobalResult<&Database> {
        self.ensure_loaded()?;
        Ok(self.databases.get_by_key(&name.to_string())?)
    }

    pub fn database_mut(&mut self, name: &str) -> GlobalResult<&mut Database> {
        self.ensure_loaded()?;
        Ok(self.databases.get_by_key_mut(&name.to_string())?)
    }

    pub fn study_mut(&mut self, database: &str, study: &str) -> GlobalResult<&mut Study> {
        self.database_mut(database)?.study_mut(study)
    }

    // Study which is already held, nothing is loaded
    pub fn loaded_study(&self, database: &str, study: &str) -> GlobalResult<&Study> {
        let database = self.databases.get_by_key(&database.to_string())?;
        Ok(database.studies.get_by_key(&study.to_string())?)
    }

    pub fn subscribe_databases<L>(&mut self, listener: L) -> ListenerId
    where
        L: ChangeListener<String> + 'static,
    {
        self.databases.subscribe(listener)
    }

    // Unloads every database; later lists are empty
    pub fn close(&mut self) -> GlobalResult<()> {
        self.open = false;
        self.databases.clear()?;
        info!(uri = %self.uri, "connection closed");
        Ok(())
    }
}

// Database

pub struct Database {
    store: StoreHandle,
    name: String,
    qualified_id: String,
    // current assignment of study names to collections, read by the study loader
    study_info: Arc<RwLock<AHashMap<String, StudyInfo>>>,
    studies: Reconciler<String, Study>,
    loaded: bool,
}

impl Database {
    pub fn new(store: StoreHandle, parent_id: &str, name: &str) -> Self {
        let qualified_id = qualify(parent_id, name);
        let study_info: Arc<RwLock<AHashMap<String, StudyInfo>>> = Arc::default();

        let loader_store = Arc::clone(&store);
        let loader_info = Arc::clone(&study_info);
        let database = name.to_string();
        let parent = qualified_id.clone();
        let studies = Reconciler::new(loader_fn(
            move |study: &String| {
                let info = loader_info
                    .read()
                    .get(study)
                    .cloned()
                    .ok_or_else(|| load_error(study, "no collections assigned"))?;
                Ok(Study::new(Arc::clone(&loader_store), &database, &parent, info))
            },
            |_: &String, study: &mut Study| study.close(),
        ));

        Self {
            store,
            name: name.to_string(),
            qualified_id,
            study_info,
            studies,
            loaded: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_id(&self) -> &str {
        &self.qualified_id
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn load(&mut self) -> GlobalResult<UpdateReport> {
        let collections = self.store.collection_names(&self.name)?;
        let discovered = discover_studies(&collections);
        let mut names: Vec<String> = discovered.iter().map(|info| info.name.clone()).collect();
        names.sort();
        names.dedup();

        *self.study_info.write() = discovered
            .into_iter()
            .map(|info| (info.name.clone(), info))
            .collect();

        self.loaded = true;
        let report = self.studies.update(&names)?;
        debug!(database = %self.name, studies = names.len(), "database loaded");
        Ok(report)
    }

    fn ensure_loaded(&mut self) -> GlobalResult<()> {
        if !self.loaded {
            self.load()?;
        }
        Ok(())
    }

    pub fn list_studies(&mut self) -> GlobalResult<Vec<String>> {
        self.ensure_loaded()?;
        Ok(self.studies.list_keys())
    }

    pub fn study(&mut self, name: &str) -> GlobalResult<&Study> {
        self.ensure_loaded()?;
        Ok(self.studies.get_by_key(&name.to_string())?)
    }

    pub fn study_mut(&mut self, name: &str) -> GlobalResult<&mut Study> {
        self.ensure_loaded()?;
        Ok(self.studies.get_by_key_mut(&name.to_string())?)
    }

    pub fn study_info(&self, name: &str) -> Option<StudyInfo> {
        self.study_info.read().get(name).cloned()
    }

    pub fn subscribe_studies<L>(&mut self, listener: L) -> ListenerId
    where
        L: ChangeListener<String> + 'static,
    {
        self.studies.subscribe(listener)
    }

    /// Drops the runs collection of the study together with its private
    /// GridFS collections, then reloads the study list.
    pub fn delete_study(&mut self, name: &str) -> GlobalResult<UpdateReport> {
        self.ensure_loaded()?;
        let info = self.study_info(name).ok_or_else(|| HolderError::KeyNotFound {
            key: name.to_string(),
        })?;
        for collection in info.owned_collections() {
            self.store.drop_collection(&self.name, &collection)?;
        }
        info!(database = %self.name, study = name, "study deleted");
        self.load()
    }

    fn close(&mut self) -> HolderResult<()> {
        self.studies.clear()?;
        self.loaded = false;
        Ok(())
    }
}

// Study

pub struct Study {
    store: StoreHandle,
    database: String,
    info: StudyInfo,
    qualified_id: String,
    experiments: Reconciler<RunId, Experiment>,
    filter: Value,
    loaded: bool,
}

impl Study {
    pub fn new(store: StoreHandle, database: &str, parent_id: &str, info: StudyInfo) -> Self {
        let loader_store = Arc::clone(&store);
        let loader_database = database.to_string();
        let runs = info.runs_collection.clone();
        let experiments = Reconciler::new(loader_fn(
            move |id: &RunId| {
                let document = loader_store
                    .find_one(&loader_database, &runs, id, Some(Experiment::PROJECTION.as_slice()))
                    .map_err(|err| load_error(id, err))?;
                Experiment::from_document(&document).map_err(|err| load_error(id, err))
            },
            |_: &RunId, _: &mut Experiment| Ok(()),
        ));

        Self {
            store,
            database: database.to_string(),
            qualified_id: qualify(parent_id, &info.name),
            info,
            experiments,
            filter: Value::Object(Map::new()),
            loaded: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &StudyInfo {
        &self.info
    }

    pub fn qualified_id(&self) -> &str {
        &self.qualified_id
    }

    pub fn filter(&self) -> &Value {
        &self.filter
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Reloads the run ids matching `filter` (a MongoDB query document).
    /// Runs already held keep their data, new ones are fetched.
    pub fn load(&mut self, filter: &Value) -> GlobalResult<UpdateReport> {
        let mut ids = self.store.find_ids(&self.database, &self.info.runs_collection, filter)?;
        ids.sort();
        self.filter = filter.clone();
        self.loaded = true;
        let report = self.experiments.update(&ids)?;
        debug!(
            study = %self.qualified_id,
            runs = ids.len(),
            created = report.created,
            removed = report.removed,
            "study loaded"
        );
        Ok(report)
    }

    // Same filter as the last load
    pub fn reload(&mut self) -> GlobalResult<UpdateReport> {
        let filter = self.filter.clone();
        self.load(&filter)
    }

    pub fn ensure_loaded(&mut self) -> GlobalResult<()> {
        if !self.loaded {
            self.reload()?;
        }
        Ok(())
    }

    pub fn list_experiments(&mut self) -> GlobalResult<Vec<RunId>> {
        self.ensure_loaded()?;
        Ok(self.experiments.list_keys())
    }

    pub fn experiment(&self, id: &RunId) -> GlobalResult<&Experiment> {
        Ok(self.experiments.get_by_key(id)?)
    }

    pub fn experiment_mut(&mut self, id: &RunId) -> GlobalResult<&mut Experiment> {
        Ok(self.experiments.get_by_key_mut(id)?)
    }

    // Held runs in id order
    pub fn experiments(&self) -> Vec<&Experiment> {
        self.experiments.values()
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    // Fetches the complete document of one run
    pub fn load_details(&mut self, id: &RunId) -> GlobalResult<&Experiment> {
        let document = self.store.find_one(&self.database, &self.info.runs_collection, id, None)?;
        let experiment = self.experiments.get_by_key_mut(id)?;
        experiment.reload(document);
        Ok(experiment)
    }

    pub fn list_config_fields(&self) -> Vec<String> {
        let fields: BTreeSet<&str> = self.experiments
            .iter()
            .flat_map(|(_, experiment)| experiment.config_fields())
            .collect();
        fields.into_iter().map(str::to_string).collect()
    }

    pub fn list_result_fields(&self) -> Vec<String> {
        let fields: BTreeSet<&str> = self.experiments
            .iter()
            .flat_map(|(_, experiment)| experiment.result_fields())
            .collect();
        fields.into_iter().map(str::to_string).collect()
    }

    pub fn list_fields(&self) -> Vec<FieldKey> {
        self.list_config_fields()
            .into_iter()
            .map(FieldKey::config)
            .chain(self.list_result_fields().into_iter().map(FieldKey::result))
            .collect()
    }

    /// Deletes the given runs from the store and reloads with the last
    /// filter. Returns the number of deleted documents.
    pub fn delete_experiments(&mut self, ids: &[RunId]) -> GlobalResult<usize> {
        let deleted = self.store.delete_many(&self.database, &self.info.runs_collection, ids)?;
        info!(study = %self.qualified_id, requested = ids.len(), deleted, "runs deleted");
        self.reload()?;
        Ok(deleted)
    }

    pub fn summary(&self) -> LoadSummary {
        LoadSummary::of(self.experiments.values())
    }

    pub fn duplicates(&self) -> AHashSet<RunId> {
        find_duplicates(self.experiments.values())
    }

    pub fn subscribe_experiments<L>(&mut self, listener: L) -> ListenerId
    where
        L: ChangeListener<RunId> + 'static,
    {
        self.experiments.subscribe(listener)
    }

    pub fn unsubscribe_experiments(&mut self, id: ListenerId) -> bool {
        self.experiments.unsubscribe(id)
    }

    fn close(&mut self) -> HolderResult<()> {
        self.experiments.clear()?;
        self.loaded = false;
        Ok(())
    }
}
