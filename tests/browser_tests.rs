mod common;

#[cfg(test)]
mod unit_tests {
    use super::common::{URI, lab_store};
    use parking_lot::Mutex;
    use sacred_browser::{
        browser::{Browser, BrowserEffect, BrowserEvent, StudyPath},
        diff::Change,
        entries::Connection,
        errors::{GlobalError, QueryError, StateError},
        model::{FieldKey, RunId},
        reconcile::ChangeListener,
        result::HolderResult,
        settings::{DEFAULT_COLUMN_WIDTH, SettingsStore},
        state::{RowMarker, ViewMode},
        store::StoreHandle,
    };
    use roaring::RoaringBitmap;
    use serde_json::json;
    use std::sync::Arc;

    const MNIST: &str = "mongodb:localhost:27017-lab-mnist";

    fn mnist() -> StudyPath {
        StudyPath::new("lab", "mnist")
    }

    fn open_browser(store: StoreHandle, settings: Arc<SettingsStore>) -> Browser {
        let mut browser = Browser::new(Connection::new(store, URI), settings).unwrap();
        browser.handle(BrowserEvent::SelectStudy(Some(mnist()))).unwrap();
        browser
    }

    fn fresh_browser() -> Browser {
        open_browser(lab_store().into_handle(), Arc::new(SettingsStore::default()))
    }

    fn ids(values: &[i64]) -> Vec<RunId> {
        values.iter().map(|id| RunId::Int(*id)).collect()
    }

    fn lr() -> FieldKey {
        FieldKey::config("lr")
    }

    #[test]
    fn test_select_study() {
        println!("== Select Study ==");

        let settings = Arc::new(SettingsStore::default());
        let mut browser = Browser::new(Connection::new(lab_store().into_handle(), URI), settings.clone()).unwrap();
        assert!(browser.current_study().is_none());

        let effects = browser.handle(BrowserEvent::SelectStudy(Some(mnist()))).unwrap();
        assert_eq!(effects[0], BrowserEffect::StudyChanged(Some(mnist())));
        assert!(effects.iter().any(|effect| matches!(effect, BrowserEffect::RowsChanged(report) if report.created == 4)));
        assert!(effects.iter().any(|effect| matches!(effect, BrowserEffect::Summary(summary) if summary.loaded == 4)));

        assert_eq!(browser.rows(), ids(&[1, 2, 3, 4]).as_slice());
        assert_eq!(browser.fields().visible().len(), 6);
        assert!(browser.fields().invisible().is_empty());
        assert!(browser.sort_order().order().is_empty());
        assert_eq!(browser.view_mode(), ViewMode::Rounded);
        assert_eq!(settings.general().last_uri, URI);
        assert!(settings.study(MNIST).is_some());

        println!("== Select Study == success");
    }

    #[test]
    fn test_sort_request() {
        let mut browser = fresh_browser();
        let effects = browser
            .handle(BrowserEvent::RequestSort { field: lr(), position: 0 })
            .unwrap();
        assert_eq!(effects[0], BrowserEffect::SortOrderChanged(vec![lr()]));
        // 0.001, 0.01, then the two 0.1 runs by id
        assert_eq!(browser.rows(), ids(&[4, 2, 1, 3]).as_slice());

        browser
            .handle(BrowserEvent::RequestSort { field: FieldKey::result("Result 0"), position: 0 })
            .unwrap();
        assert_eq!(browser.sort_order().order(), &[FieldKey::result("Result 0"), lr()]);
        // missing results sort as `---` text, before numbers
        assert_eq!(browser.rows(), ids(&[4, 2, 3, 1]).as_slice());
    }

    #[test]
    fn test_sort_on_unknown_field() {
        let mut browser = fresh_browser();
        let err = browser
            .handle(BrowserEvent::RequestSort { field: FieldKey::config("momentum"), position: 0 })
            .unwrap_err();
        assert_eq!(
            err,
            GlobalError::State(StateError::FieldNotAvailable { field: "config.momentum".to_string() })
        );
    }

    #[test]
    fn test_set_filter() {
        let mut browser = fresh_browser();
        let effects = browser.handle(BrowserEvent::SetFilter("lr: 0.1".to_string())).unwrap();
        assert!(matches!(&effects[0], BrowserEffect::FilterAccepted { text, .. } if text == "lr: 0.1"));
        assert_eq!(browser.rows(), ids(&[1, 3]).as_slice());
        assert_eq!(browser.filter().text(), "lr: 0.1");
        // dropout only exists on run 4
        assert!(browser.fields().visible_position(&FieldKey::config("dropout")).is_none());
        assert_eq!(browser.settings().study(MNIST).unwrap().filter_text, "lr: 0.1");
    }

    #[test]
    fn test_rejected_filter_keeps_previous() {
        let mut browser = fresh_browser();
        browser.handle(BrowserEvent::SetFilter("lr: 0.1".to_string())).unwrap();

        let effects = browser.handle(BrowserEvent::SetFilter("lr 0.1".to_string())).unwrap();
        assert_eq!(
            effects,
            vec![BrowserEffect::FilterRejected {
                text: "lr 0.1".to_string(),
                error: QueryError::MissingColon { line: 1 },
            }]
        );
        assert_eq!(browser.filter().text(), "lr: 0.1");
        assert_eq!(browser.rows(), ids(&[1, 3]).as_slice());
    }

    #[test]
    fn test_filter_without_study() {
        let settings = Arc::new(SettingsStore::default());
        let mut browser = Browser::new(Connection::new(lab_store().into_handle(), URI), settings).unwrap();
        let err = browser.handle(BrowserEvent::SetFilter("lr: 1".to_string())).unwrap_err();
        assert_eq!(err, GlobalError::State(StateError::NoStudySelected));
    }

    #[test]
    fn test_hide_sorted_field() {
        let mut browser = fresh_browser();
        browser.handle(BrowserEvent::RequestSort { field: lr(), position: 0 }).unwrap();

        let effects = browser.handle(BrowserEvent::HideField(lr())).unwrap();
        assert!(matches!(&effects[0], BrowserEffect::FieldsChanged(changes) if !changes.is_empty()));
        assert!(effects.contains(&BrowserEffect::SortOrderChanged(Vec::new())));
        assert_eq!(browser.fields().invisible(), &[lr()]);
        assert_eq!(browser.rows(), ids(&[1, 2, 3, 4]).as_slice());

        browser.handle(BrowserEvent::ShowField(lr())).unwrap();
        assert_eq!(browser.fields().visible().last(), Some(&lr()));
        assert!(browser.fields().invisible().is_empty());
    }

    #[test]
    fn test_move_fields() {
        let mut browser = fresh_browser();
        let first = browser.fields().visible()[0].clone();
        let second = browser.fields().visible()[1].clone();

        let effects = browser.handle(BrowserEvent::MoveFieldDown(0)).unwrap();
        assert!(matches!(&effects[0], BrowserEffect::FieldsChanged(_)));
        assert_eq!(&browser.fields().visible()[..2], &[second.clone(), first.clone()]);

        browser.handle(BrowserEvent::MoveFieldUp(1)).unwrap();
        assert_eq!(&browser.fields().visible()[..2], &[first, second]);

        // out of range moves change nothing
        let effects = browser.handle(BrowserEvent::MoveFieldUp(0)).unwrap();
        assert!(matches!(effects.as_slice(), [BrowserEffect::RowsChanged(report)] if report.is_noop()));
        let before = browser.fields().visible().to_vec();
        let effects = browser.handle(BrowserEvent::MoveFieldDown(usize::MAX)).unwrap();
        assert!(matches!(effects.as_slice(), [BrowserEffect::RowsChanged(report)] if report.is_noop()));
        assert_eq!(browser.fields().visible(), before.as_slice());
    }

    #[test]
    fn test_format_cells() {
        let mut browser = fresh_browser();
        let result = FieldKey::result("Result 0");

        assert_eq!(browser.format_cell(0, &result).unwrap(), "0.90");
        assert_eq!(browser.format_cell(0, &lr()).unwrap(), "0.1");
        assert_eq!(browser.format_cell(0, &FieldKey::config("dropout")).unwrap(), "---");
        assert_eq!(browser.format_cell(1, &result).unwrap(), "---");

        browser.handle(BrowserEvent::SetViewMode(ViewMode::Percent)).unwrap();
        assert_eq!(browser.format_cell(0, &result).unwrap(), "90.00%");
        // configuration values are never rescaled
        assert_eq!(browser.format_cell(0, &lr()).unwrap(), "0.1");

        browser.handle(BrowserEvent::SetViewMode(ViewMode::Raw)).unwrap();
        assert_eq!(browser.format_cell(0, &result).unwrap(), "0.9");

        assert!(browser.format_cell(9, &result).is_err());
    }

    #[test]
    fn test_row_markers() {
        let browser = fresh_browser();
        let markers: Vec<RowMarker> = (0..4).map(|row| browser.marker(row).unwrap()).collect();
        assert_eq!(
            markers,
            vec![RowMarker::Normal, RowMarker::Failed, RowMarker::Duplicate, RowMarker::Running]
        );
    }

    #[test]
    fn test_result_stats() {
        let browser = fresh_browser();
        let stats = browser.result_stats(None).unwrap();
        assert_eq!(stats.rows, 2);
        assert_eq!(stats.fields, vec!["Result 0", "Result 1"]);
        assert!((stats.averages[0] - 0.85).abs() < 1e-9);
        assert!((stats.averages[1] - 0.2).abs() < 1e-9);
        assert_eq!(stats.maxima, vec![0.9, 0.3]);

        let mut selection = RoaringBitmap::new();
        selection.insert(2);
        let stats = browser.result_stats(Some(&selection)).unwrap();
        assert_eq!(stats.rows, 1);
        assert_eq!(stats.maxima, vec![0.8, 0.3]);

        // only runs without results
        let mut selection = RoaringBitmap::new();
        selection.insert(1);
        selection.insert(3);
        assert!(browser.result_stats(Some(&selection)).is_err());
    }

    #[test]
    fn test_delete_experiments() {
        let store = Arc::new(lab_store());
        let mut browser = open_browser(store.clone(), Arc::new(SettingsStore::default()));

        let effects = browser
            .handle(BrowserEvent::DeleteExperiments(ids(&[2, 4])))
            .unwrap();
        assert_eq!(effects[0], BrowserEffect::ExperimentsDeleted { requested: 2, deleted: 2 });
        assert_eq!(browser.rows(), ids(&[1, 3]).as_slice());
        assert_eq!(store.document_count("lab", "mnist.runs").unwrap(), 2);

        assert!(browser.handle(BrowserEvent::DeleteExperiments(Vec::new())).unwrap().is_empty());
    }

    #[test]
    fn test_state_is_restored_per_study() {
        let store: StoreHandle = Arc::new(lab_store());
        let settings = Arc::new(SettingsStore::default());

        let mut browser = open_browser(Arc::clone(&store), settings.clone());
        browser.handle(BrowserEvent::SetFilter("lr: 0.1".to_string())).unwrap();
        browser.handle(BrowserEvent::HideField(FieldKey::config("seed"))).unwrap();
        browser.handle(BrowserEvent::RequestSort { field: FieldKey::result("Result 0"), position: 0 }).unwrap();
        browser.handle(BrowserEvent::SetViewMode(ViewMode::Percent)).unwrap();
        browser.set_column_width(&lr(), 120).unwrap();
        drop(browser);

        let browser = open_browser(store, settings);
        assert_eq!(browser.filter().text(), "lr: 0.1");
        assert_eq!(browser.rows(), ids(&[3, 1]).as_slice());
        assert_eq!(browser.fields().invisible(), &[FieldKey::config("seed")]);
        assert_eq!(browser.sort_order().order(), &[FieldKey::result("Result 0")]);
        assert_eq!(browser.view_mode(), ViewMode::Percent);
        assert_eq!(browser.column_width(&lr()), 120);
        assert_eq!(browser.column_width(&FieldKey::config("seed")), DEFAULT_COLUMN_WIDTH);
    }

    #[test]
    fn test_invalid_saved_filter_falls_back_to_empty() {
        let settings = Arc::new(SettingsStore::default());
        settings
            .update_study(MNIST, |saved| saved.filter_text = "no colon here".to_string())
            .unwrap();

        let browser = open_browser(lab_store().into_handle(), settings);
        assert_eq!(browser.filter().text(), "");
        assert_eq!(browser.rows().len(), 4);
    }

    #[test]
    fn test_row_listener_mirrors_rows() {
        #[derive(Default)]
        struct Mirror {
            rows: Vec<RunId>,
        }

        impl ChangeListener<RunId> for Mirror {
            fn after_change(&mut self, change: &Change<RunId>, _keys: &[RunId]) -> HolderResult<()> {
                change.apply(&mut self.rows);
                Ok(())
            }
        }

        let settings = Arc::new(SettingsStore::default());
        let mut browser = Browser::new(Connection::new(lab_store().into_handle(), URI), settings).unwrap();
        let mirror = Arc::new(Mutex::new(Mirror::default()));
        let id = browser.subscribe_rows(Arc::clone(&mirror));

        browser.handle(BrowserEvent::SelectStudy(Some(mnist()))).unwrap();
        browser.handle(BrowserEvent::RequestSort { field: lr(), position: 0 }).unwrap();
        browser.handle(BrowserEvent::SetFilter("model.layers: 2".to_string())).unwrap();
        assert_eq!(mirror.lock().rows, browser.rows());

        assert!(browser.unsubscribe_rows(id));
        browser.handle(BrowserEvent::SelectStudy(None)).unwrap();
        assert!(browser.rows().is_empty());
        assert_eq!(mirror.lock().rows, ids(&[4, 1, 3]));
    }

    #[test]
    fn test_switching_studies_replaces_rows_with_same_ids() {
        println!("== Switch Study Rows ==");

        #[derive(Default)]
        struct Inserted {
            rows: Vec<RunId>,
            inserted: Vec<RunId>,
        }

        impl ChangeListener<RunId> for Inserted {
            fn after_change(&mut self, change: &Change<RunId>, _keys: &[RunId]) -> HolderResult<()> {
                if let Change::Insert { elements, .. } = change {
                    self.inserted.extend(elements.iter().cloned());
                }
                change.apply(&mut self.rows);
                Ok(())
            }
        }

        let store = lab_store();
        for id in [1, 2] {
            store.insert(
                "lab",
                "cifar.runs",
                json!({"_id": id, "status": "COMPLETED", "config": {"lr": 0.5}, "result": [0.7]}),
            );
        }
        let mut browser = open_browser(store.into_handle(), Arc::new(SettingsStore::default()));
        let listener = Arc::new(Mutex::new(Inserted::default()));
        listener.lock().rows = browser.rows().to_vec();
        browser.subscribe_rows(Arc::clone(&listener));

        browser
            .handle(BrowserEvent::SelectStudy(Some(StudyPath::new("lab", "cifar"))))
            .unwrap();
        assert_eq!(browser.rows(), ids(&[1, 2]).as_slice());

        // rows 1 and 2 belong to another study now, so they are announced again
        let listener = listener.lock();
        assert_eq!(listener.inserted, ids(&[1, 2]));
        assert_eq!(listener.rows, browser.rows());

        println!("== Switch Study Rows == success");
    }

    #[test]
    fn test_reselecting_same_study_keeps_rows() {
        let mut browser = fresh_browser();
        let effects = browser.handle(BrowserEvent::SelectStudy(Some(mnist()))).unwrap();
        let reports: Vec<_> = effects
            .iter()
            .filter_map(|effect| match effect {
                BrowserEffect::RowsChanged(report) => Some(*report),
                _ => None,
            })
            .collect();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_noop());
    }

    #[test]
    fn test_select_other_study() {
        let mut browser = fresh_browser();
        browser
            .handle(BrowserEvent::SelectStudy(Some(StudyPath::new("lab", "(default)"))))
            .unwrap();
        assert_eq!(browser.rows(), &[RunId::Text("a1".to_string())]);
        assert_eq!(browser.format_cell(0, &FieldKey::result("Result 0")).unwrap(), "0.50");
        assert_eq!(browser.study().unwrap().name(), "(default)");

        let mut browser = open_browser(lab_store().into_handle(), Arc::new(SettingsStore::default()));
        browser
            .handle(BrowserEvent::SelectStudy(Some(StudyPath::new("archive", "(experiments)"))))
            .unwrap();
        assert_eq!(browser.marker(0).unwrap(), RowMarker::Interrupted);
        assert!(browser.summary().is_some());
    }
}
