// Study discovery
//
// Sacred хранит запуски в коллекциях `<prefix>runs`, а файлы в GridFS
// (`<root>.files` / `<root>.chunks`). Старые версии писали в `experiments`
// или в произвольные коллекции рядом с общим корнем `fs`.

pub const EXPERIMENTS_COLLECTION: &str = "experiments";
pub const SHARED_GRID_ROOT: &str = "fs";
const RUNS_SUFFIX: &str = "runs";
const FILES_SUFFIX: &str = ".files";
const CHUNKS_SUFFIX: &str = ".chunks";
const SYSTEM_INDEXES: &str = "system.indexes";

#[derive(Debug,Clone,PartialEq,Eq,Hash)]
pub struct StudyInfo {
    pub name: String,
    pub runs_collection: String,
    pub grid_root: Option<String>,
}

impl StudyInfo {
    fn new(name: impl Into<String>, runs_collection: impl Into<String>, grid_root: Option<&str>) -> Self {
        Self {
            name: name.into(),
            runs_collection: runs_collection.into(),
            grid_root: grid_root.map(str::to_string),
        }
    }

    // Collections owned only by this study, dropped together with it
    pub fn owned_collections(&self) -> Vec<String> {
        let mut owned = vec![self.runs_collection.clone()];
        if let Some(root) = self.grid_root.as_deref().filter(|root| *root != SHARED_GRID_ROOT) {
            owned.push(format!("{root}{FILES_SUFFIX}"));
            owned.push(format!("{root}{CHUNKS_SUFFIX}"));
        }
        owned
    }
}

/// Maps the collection names of one database to studies.
///
/// 1. `experiments` is the study `(experiments)` without files.
/// 2. Every `<base>runs` collection is a study named after `<base>` without
///    trailing dots (`(default)` for a bare `runs`). Its files live in
///    `<base>files`/`<base>chunks` when both exist, else in the shared `fs`
///    root when that exists.
/// 3. With a shared `fs` root every other collection, except GridFS and
///    system collections, is a study of its own.
pub fn discover_studies<S: AsRef<str>>(collection_names: &[S]) -> Vec<StudyInfo> {
    let mut names: Vec<&str> = collection_names.iter().map(AsRef::as_ref).collect();
    let shared_root = has(&names, "fs.files") && has(&names, "fs.chunks");
    let mut studies = Vec::new();

    if let Some(pos) = names.iter().position(|name| *name == EXPERIMENTS_COLLECTION) {
        names.remove(pos);
        studies.push(StudyInfo::new("(experiments)", EXPERIMENTS_COLLECTION, None));
    }

    for runs in names.iter().filter(|name| name.ends_with(RUNS_SUFFIX)) {
        let base = &runs[..runs.len() - RUNS_SUFFIX.len()];
        let trimmed = base.trim_end_matches('.');
        let visible = if base.is_empty() { "(default)" } else { trimmed };

        let own_files = format!("{base}files");
        let own_chunks = format!("{base}chunks");
        let grid_root = if has(&names, own_files.as_str()) && has(&names, own_chunks.as_str()) {
            Some(trimmed)
        } else if shared_root {
            Some(SHARED_GRID_ROOT)
        } else {
            None
        };
        studies.push(StudyInfo::new(visible, *runs, grid_root));
    }

    names.retain(|name| {
        let private_files = name.ends_with(FILES_SUFFIX) && *name != "fs.files";
        let private_chunks = name.ends_with(CHUNKS_SUFFIX) && *name != "fs.chunks";
        !(private_files || private_chunks || name.ends_with(RUNS_SUFFIX))
    });

    if shared_root {
        for name in &names {
            if !matches!(*name, SYSTEM_INDEXES | "fs.files" | "fs.chunks") {
                studies.push(StudyInfo::new(*name, *name, Some(SHARED_GRID_ROOT)));
            }
        }
    }

    studies
}

fn has(names: &[&str], wanted: &str) -> bool {
    names.contains(&wanted)
}
