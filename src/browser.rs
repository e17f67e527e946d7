use super::{
    entries::{Connection, Study},
    errors::{QueryError, StateError},
    model::{Experiment, FieldKey, FieldKind, LoadSummary, ResultStats, RunId},
    reconcile::{ChangeListener, KeysOnly, ListenerId, Reconciler, UpdateReport},
    result::GlobalResult,
    settings::SettingsStore,
    sort::{SortOrder, sort_experiments},
    state::{DbFilter, FieldChanges, Fields, RowMarker, ViewMode, format_value},
};
use ahash::AHashSet;
use roaring::RoaringBitmap;
use serde_json::Value;
use std::{
    fmt::{self, Display},
    sync::Arc,
};
use tracing::{debug, info, warn};

#[derive(Debug,Clone,PartialEq,Eq,Hash)]
pub struct StudyPath {
    pub database: String,
    pub study: String,
}

impl StudyPath {
    pub fn new(database: impl Into<String>, study: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            study: study.into(),
        }
    }
}

impl Display for StudyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,"{}/{}", self.database, self.study)
    }
}

#[derive(Debug,Clone,PartialEq)]
pub enum BrowserEvent {
    SelectStudy(Option<StudyPath>),
    SetFilter(String),
    RequestSort {
        field: FieldKey,
        position: usize,
    },
    ShowField(FieldKey),
    HideField(FieldKey),
    MoveFieldUp(usize),
    MoveFieldDown(usize),
    SetViewMode(ViewMode),
    Reload,
    DeleteExperiments(Vec<RunId>),
}

#[derive(Debug,Clone,PartialEq)]
pub enum BrowserEffect {
    StudyChanged(Option<StudyPath>),
    FilterAccepted {
        text: String,
        query: Value,
    },
    FilterRejected {
        text: String,
        error: QueryError,
    },
    FieldsChanged(FieldChanges),
    SortOrderChanged(Vec<FieldKey>),
    ViewModeChanged(ViewMode),
    RowsChanged(UpdateReport),
    ExperimentsDeleted {
        requested: usize,
        deleted: usize,
    },
    Summary(LoadSummary),
}

// Browser
//
// Единственная точка изменения состояния: handle() принимает событие,
// меняет состояние, сохраняет настройки исследования и возвращает
// список эффектов для представления.

pub struct Browser {
    connection: Connection,
    settings: Arc<SettingsStore>,
    current: Option<StudyPath>,
    qualified_id: Option<String>,
    sort_order: SortOrder,
    filter: DbFilter,
    fields: Fields,
    view_mode: ViewMode,
    rows: Reconciler<RunId, ()>,
    duplicates: AHashSet<RunId>,
}

fn current_study<'a>(
    connection: &'a mut Connection,
    current: Option<&StudyPath>,
) -> GlobalResult<&'a mut Study> {
    let path = current.ok_or(StateError::NoStudySelected)?;
    connection.study_mut(&path.database, &path.study)
}

impl Browser {
    pub fn new(connection: Connection, settings: Arc<SettingsStore>) -> GlobalResult<Self> {
        let uri = connection.uri().to_string();
        settings.update(|all| all.general.last_uri = uri)?;
        Ok(Self {
            connection,
            settings,
            current: None,
            qualified_id: None,
            sort_order: SortOrder::new(),
            filter: DbFilter::new(),
            fields: Fields::new(),
            view_mode: ViewMode::default(),
            rows: Reconciler::new(KeysOnly),
            duplicates: AHashSet::new(),
        })
    }

    // State transitions

    pub fn handle(&mut self, event: BrowserEvent) -> GlobalResult<Vec<BrowserEffect>> {
        debug!(?event, "browser event");
        match event {
            BrowserEvent::SelectStudy(path) => self.select_study(path),
            BrowserEvent::SetFilter(text) => self.set_filter(text),
            BrowserEvent::RequestSort { field, position } => {
                self.sort_order.sort_request(field, position)?;
                self.save_state()?;
                let mut effects = vec![BrowserEffect::SortOrderChanged(self.sort_order.order().to_vec())];
                effects.push(self.resort()?);
                Ok(effects)
            }
            BrowserEvent::ShowField(field) => {
                let changes = self.fields.show(&field)?;
                self.after_fields_change(changes)
            }
            BrowserEvent::HideField(field) => {
                let changes = self.fields.hide(&field)?;
                self.after_fields_change(changes)
            }
            BrowserEvent::MoveFieldUp(row) => {
                let changes = self.fields.move_up(row);
                self.after_fields_change(changes)
            }
            BrowserEvent::MoveFieldDown(row) => {
                let changes = self.fields.move_down(row);
                self.after_fields_change(changes)
            }
            BrowserEvent::SetViewMode(mode) => {
                self.view_mode = mode;
                self.save_state()?;
                Ok(vec![BrowserEffect::ViewModeChanged(mode)])
            }
            BrowserEvent::Reload => {
                current_study(&mut self.connection, self.current.as_ref())?.reload()?;
                self.after_reload()
            }
            BrowserEvent::DeleteExperiments(ids) => self.delete_experiments(ids),
        }
    }

    fn select_study(&mut self, path: Option<StudyPath>) -> GlobalResult<Vec<BrowserEffect>> {
        let Some(path) = path else {
            self.current = None;
            self.qualified_id = None;
            self.filter = DbFilter::new();
            let changes = self.fields.set_fields(Vec::new(), Vec::new());
            self.sort_order.clear();
            let report = self.rows.clear()?;
            self.duplicates.clear();
            return Ok(vec![
                BrowserEffect::StudyChanged(None),
                BrowserEffect::FieldsChanged(changes),
                BrowserEffect::SortOrderChanged(Vec::new()),
                BrowserEffect::RowsChanged(report),
            ]);
        };

        // run ids repeat across studies, so rows of another study are never reused
        let switched = self.current.as_ref() != Some(&path);
        let study = self.connection.study_mut(&path.database, &path.study)?;
        let qualified_id = study.qualified_id().to_string();
        let saved = self.settings.study(&qualified_id).unwrap_or_default();

        let mut filter = DbFilter::new();
        if filter.try_set_filter_text(&saved.filter_text).is_err() {
            warn!(study = %qualified_id, "saved filter is invalid, falling back to empty filter");
        }
        study.load(filter.query())?;

        let available = study.list_fields();
        let changes = self.fields.load(
            &available,
            saved.visible_fields.as_deref(),
            saved.invisible_fields.as_deref(),
        );
        self.sort_order.set_available_fields(self.fields.visible().to_vec());
        self.sort_order.replace_order(saved.sort_order);
        self.view_mode = saved.view_mode;
        self.filter = filter;
        self.current = Some(path.clone());
        self.qualified_id = Some(qualified_id);
        self.save_state()?;
        info!(study = %path, "study selected");

        let mut effects = vec![
            BrowserEffect::StudyChanged(Some(path)),
            BrowserEffect::FilterAccepted {
                text: self.filter.text().to_string(),
                query: self.filter.query().clone(),
            },
            BrowserEffect::FieldsChanged(changes),
            BrowserEffect::SortOrderChanged(self.sort_order.order().to_vec()),
            BrowserEffect::ViewModeChanged(self.view_mode),
        ];
        if switched && !self.rows.is_empty() {
            effects.push(BrowserEffect::RowsChanged(self.rows.clear()?));
        }
        effects.push(self.resort()?);
        effects.extend(self.summary().map(BrowserEffect::Summary));
        Ok(effects)
    }

    fn set_filter(&mut self, text: String) -> GlobalResult<Vec<BrowserEffect>> {
        if self.current.is_none() {
            return Err(StateError::NoStudySelected.into());
        }
        let query = match self.filter.try_set_filter_text(&text) {
            Ok(query) => query.clone(),
            Err(error) => return Ok(vec![BrowserEffect::FilterRejected { text, error }]),
        };
        self.save_state()?;
        current_study(&mut self.connection, self.current.as_ref())?.load(&query)?;

        let mut effects = vec![BrowserEffect::FilterAccepted { text, query }];
        effects.extend(self.after_reload()?);
        Ok(effects)
    }

    fn delete_experiments(&mut self, ids: Vec<RunId>) -> GlobalResult<Vec<BrowserEffect>> {
        let study = current_study(&mut self.connection, self.current.as_ref())?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let deleted = study.delete_experiments(&ids)?;
        let mut effects = vec![BrowserEffect::ExperimentsDeleted {
            requested: ids.len(),
            deleted,
        }];
        effects.extend(self.after_reload()?);
        Ok(effects)
    }

    // Fields of the reloaded study, then rows
    fn after_reload(&mut self) -> GlobalResult<Vec<BrowserEffect>> {
        let study = current_study(&mut self.connection, self.current.as_ref())?;
        let available = study.list_fields();
        let visible = self.fields.visible().to_vec();
        let invisible = self.fields.invisible().to_vec();
        let changes = self.fields.load(&available, Some(visible.as_slice()), Some(invisible.as_slice()));

        let mut effects = self.after_fields_change(changes)?;
        effects.extend(self.summary().map(BrowserEffect::Summary));
        Ok(effects)
    }

    fn after_fields_change(&mut self, changes: FieldChanges) -> GlobalResult<Vec<BrowserEffect>> {
        if changes.is_empty() {
            return Ok(vec![self.resort()?]);
        }
        let previous_order = self.sort_order.order().to_vec();
        self.sort_order.set_available_fields(self.fields.visible().to_vec());
        self.save_state()?;

        let mut effects = vec![BrowserEffect::FieldsChanged(changes)];
        if previous_order != self.sort_order.order() {
            effects.push(BrowserEffect::SortOrderChanged(self.sort_order.order().to_vec()));
        }
        effects.push(self.resort()?);
        Ok(effects)
    }

    fn resort(&mut self) -> GlobalResult<BrowserEffect> {
        let study = current_study(&mut self.connection, self.current.as_ref())?;
        let experiments = study.experiments();
        let sorted = sort_experiments(experiments.iter().copied(), self.sort_order.order());
        self.duplicates = study.duplicates();
        let report = self.rows.update(&sorted)?;
        Ok(BrowserEffect::RowsChanged(report))
    }

    fn save_state(&self) -> GlobalResult<()> {
        let Some(qualified_id) = &self.qualified_id else {
            return Ok(());
        };
        self.settings.update_study(qualified_id, |saved| {
            saved.filter_text = self.filter.text().to_string();
            saved.view_mode = self.view_mode;
            saved.sort_order = self.sort_order.order().to_vec();
            saved.visible_fields = Some(self.fields.visible().to_vec());
            saved.invisible_fields = Some(self.fields.invisible().to_vec());
        })?;
        Ok(())
    }

    // Observers of the sorted row list

    pub fn subscribe_rows<L>(&mut self, listener: L) -> ListenerId
    where
        L: ChangeListener<RunId> + 'static,
    {
        self.rows.subscribe(listener)
    }

    pub fn unsubscribe_rows(&mut self, id: ListenerId) -> bool {
        self.rows.unsubscribe(id)
    }

    // Accessors

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn current_study(&self) -> Option<&StudyPath> {
        self.current.as_ref()
    }

    pub fn study(&self) -> GlobalResult<&Study> {
        let path = self.current.as_ref().ok_or(StateError::NoStudySelected)?;
        self.connection.loaded_study(&path.database, &path.study)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn sort_order(&self) -> &SortOrder {
        &self.sort_order
    }

    pub fn filter(&self) -> &DbFilter {
        &self.filter
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn rows(&self) -> &[RunId] {
        self.rows.keys()
    }

    pub fn row(&self, position: usize) -> GlobalResult<&Experiment> {
        let (id, _) = self.rows.get_by_position(position)?;
        self.study()?.experiment(id)
    }

    pub fn marker(&self, position: usize) -> GlobalResult<RowMarker> {
        let experiment = self.row(position)?;
        Ok(RowMarker::of(experiment, self.duplicates.contains(experiment.id())))
    }

    pub fn summary(&self) -> Option<LoadSummary> {
        self.study().ok().map(Study::summary)
    }

    /// Average and maximum of the result columns over the selected rows
    /// (row positions), or over all rows without a selection.
    pub fn result_stats(&self, selection: Option<&RoaringBitmap>) -> GlobalResult<ResultStats> {
        let study = self.study()?;
        let mut selected = Vec::new();
        for (position, id) in self.rows.keys().iter().enumerate() {
            if selection.is_none_or(|rows| rows.contains(position as u32)) {
                selected.push(study.experiment(id)?);
            }
        }
        Ok(ResultStats::over(selected)?)
    }

    // Result values follow the view mode, configuration values are shown raw
    pub fn format_cell(&self, position: usize, field: &FieldKey) -> GlobalResult<String> {
        let experiment = self.row(position)?;
        let mode = match field.kind {
            FieldKind::Config => ViewMode::Raw,
            FieldKind::Result => self.view_mode,
        };
        Ok(format_value(experiment.field(field), mode))
    }

    pub fn column_width(&self, field: &FieldKey) -> u32 {
        self.qualified_id
            .as_deref()
            .and_then(|id| self.settings.study(id))
            .unwrap_or_default()
            .column_width(field)
    }

    pub fn set_column_width(&self, field: &FieldKey, width: u32) -> GlobalResult<()> {
        let Some(qualified_id) = &self.qualified_id else {
            return Err(StateError::NoStudySelected.into());
        };
        self.settings.update_study(qualified_id, |saved| {
            saved.column_widths.insert(field.to_string(), width);
        })?;
        Ok(())
    }
}
