use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use sacred_browser::{
    errors::{GlobalError, StoreError},
    logging::init_logging,
    result::GlobalResult,
    *,
};
use std::{fs, path::PathBuf, process, sync::Arc};

fn cli() -> Command {
    let dump = Arg::new("dump")
        .long("dump")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("JSON dump {database: {collection: [documents]}}");
    let database = Arg::new("database")
        .long("database")
        .required(true)
        .help("Database name");
    let study = Arg::new("study")
        .long("study")
        .required(true)
        .help("Study name as listed by `studies`");

    Command::new("sacred-browser")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Browse, filter, sort and delete Sacred experiment runs")
        .subcommand_required(true)
        .arg(
            Arg::new("settings")
                .long("settings")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML settings file (kept in memory when omitted)"),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .global(true)
                .help("Log filter directive, e.g. debug or sacred_browser=trace"),
        )
        .subcommand(
            Command::new("databases")
                .about("List databases")
                .arg(dump.clone()),
        )
        .subcommand(
            Command::new("studies")
                .about("List the studies of a database")
                .arg(dump.clone())
                .arg(database.clone()),
        )
        .subcommand(
            Command::new("list")
                .about("List the runs of a study")
                .arg(dump.clone())
                .arg(database.clone())
                .arg(study.clone())
                .arg(
                    Arg::new("filter")
                        .long("filter")
                        .conflicts_with("filter-file")
                        .help("Filter text, lines separated by ';'; a regex containing ';' needs --filter-file"),
                )
                .arg(
                    Arg::new("filter-file")
                        .long("filter-file")
                        .value_parser(value_parser!(PathBuf))
                        .help("File with filter text"),
                )
                .arg(
                    Arg::new("sort")
                        .long("sort")
                        .value_delimiter(',')
                        .help("Sort fields, e.g. config.lr,result.Result 0"),
                )
                .arg(
                    Arg::new("view-mode")
                        .long("view-mode")
                        .value_parser(["raw", "rounded", "percent"])
                        .help("Formatting of result values"),
                )
                .arg(
                    Arg::new("stats")
                        .long("stats")
                        .action(ArgAction::SetTrue)
                        .help("Print average and maximum of the result columns"),
                ),
        )
        .subcommand(
            Command::new("check-filter")
                .about("Print the query generated from a filter")
                .arg(
                    Arg::new("text")
                        .required(true)
                        .help("Filter text, lines separated by ';'"),
                ),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete runs from a study and write the dump back")
                .arg(dump)
                .arg(database)
                .arg(study)
                .arg(
                    Arg::new("id")
                        .long("id")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(RunId))
                        .help("Run ids to delete"),
                ),
        )
}

fn main() {
    let matches = cli().get_matches();
    init_logging(matches.get_one::<String>("log").map(String::as_str));

    if let Err(err) = run(&matches) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> GlobalResult<()> {
    let settings = Arc::new(match matches.get_one::<PathBuf>("settings") {
        Some(path) => SettingsStore::open(path)?,
        None => SettingsStore::default(),
    });

    match matches.subcommand() {
        Some(("databases", args)) => {
            let mut connection = open_connection(args, &settings)?;
            for name in connection.list_databases()? {
                println!("{name}");
            }
        }
        Some(("studies", args)) => {
            let mut connection = open_connection(args, &settings)?;
            let database = connection.database_mut(required(args, "database"))?;
            for name in database.list_studies()? {
                let info = database.study_info(&name);
                let runs = info.as_ref().map_or("", |info| info.runs_collection.as_str());
                let root = info
                    .as_ref()
                    .and_then(|info| info.grid_root.clone())
                    .unwrap_or_else(|| "-".to_string());
                println!("{name}\t{runs}\t{root}");
            }
        }
        Some(("list", args)) => list(args, settings)?,
        Some(("check-filter", args)) => {
            let query = parse_query(&filter_lines(required(args, "text")))?;
            println!("{}", serde_json::to_string_pretty(&query).unwrap_or_default());
        }
        Some(("delete", args)) => {
            let path = dump_path(args)?;
            let store = Arc::new(MemoryStore::from_path(path)?);
            let handle: StoreHandle = store.clone();
            let mut connection = Connection::new(handle, settings.general().last_uri);
            let ids: Vec<RunId> = args.get_many::<RunId>("id").into_iter().flatten().cloned().collect();
            let study = connection.study_mut(required(args, "database"), required(args, "study"))?;
            study.load(&serde_json::json!({}))?;
            let deleted = study.delete_experiments(&ids)?;
            store.write_dump(path)?;
            println!("deleted {deleted} of {} runs", ids.len());
        }
        _ => {}
    }
    Ok(())
}

fn list(args: &ArgMatches, settings: Arc<SettingsStore>) -> GlobalResult<()> {
    let connection = open_connection(args, &settings)?;
    let mut browser = Browser::new(connection, settings)?;
    let path = StudyPath::new(required(args, "database"), required(args, "study"));
    browser.handle(BrowserEvent::SelectStudy(Some(path)))?;

    let filter = match (args.get_one::<String>("filter"), args.get_one::<PathBuf>("filter-file")) {
        (Some(text), _) => Some(filter_lines(text)),
        (None, Some(file)) => Some(fs::read_to_string(file).map_err(|err| StoreError::Dump {
            reason: format!("{}: {err}", file.display()),
        })?),
        (None, None) => None,
    };
    if let Some(text) = filter {
        for effect in browser.handle(BrowserEvent::SetFilter(text))? {
            if let BrowserEffect::FilterRejected { error, .. } = effect {
                return Err(GlobalError::Query(error));
            }
        }
    }

    if let Some(fields) = args.get_many::<String>("sort") {
        for (position, field) in fields.enumerate() {
            let field: FieldKey = field.parse().map_err(GlobalError::Model)?;
            browser.handle(BrowserEvent::RequestSort { field, position })?;
        }
    }
    if let Some(mode) = args.get_one::<String>("view-mode") {
        let mode = mode.parse::<ViewMode>().unwrap_or_default();
        browser.handle(BrowserEvent::SetViewMode(mode))?;
    }

    let columns = browser.fields().visible().to_vec();
    let header: Vec<String> = columns.iter().map(ToString::to_string).collect();
    println!("id\tstatus\t{}", header.join("\t"));
    for position in 0..browser.rows().len() {
        let experiment = browser.row(position)?;
        let cells = columns
            .iter()
            .map(|field| browser.format_cell(position, field))
            .collect::<GlobalResult<Vec<String>>>()?;
        let marker = match browser.marker(position)? {
            RowMarker::Duplicate => " (duplicate)",
            _ => "",
        };
        println!("{}{marker}\t{}\t{}", experiment.id(), experiment.status(), cells.join("\t"));
    }

    if let Some(summary) = browser.summary() {
        println!("{summary}");
    }
    if args.get_flag("stats") {
        let stats = browser.result_stats(None)?;
        for ((field, average), maximum) in stats.fields.iter().zip(&stats.averages).zip(&stats.maxima) {
            println!("{field}\tavg {average:.4}\tmax {maximum:.4}");
        }
    }
    Ok(())
}

fn open_connection(args: &ArgMatches, settings: &SettingsStore) -> GlobalResult<Connection> {
    let store = MemoryStore::from_path(dump_path(args)?)?;
    Ok(Connection::new(store.into_handle(), settings.general().last_uri))
}

fn dump_path(args: &ArgMatches) -> GlobalResult<&PathBuf> {
    args.get_one::<PathBuf>("dump").ok_or_else(|| {
        StoreError::Dump {
            reason: "no dump file given".to_string(),
        }
        .into()
    })
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> &'a str {
    args.get_one::<String>(name).map(String::as_str).unwrap_or_default()
}

// `;` separates filter lines on the command line
fn filter_lines(text: &str) -> String {
    text.replace(';', "\n")
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_filter_lines_split_on_semicolon() {
        let args = cli()
            .try_get_matches_from([
                "sacred-browser", "list", "--dump", "lab.json", "--database", "lab", "--study", "mnist",
                "--filter", "lr: 0.1;seed: [1, 2]",
            ])
            .unwrap();
        let (_, list) = args.subcommand().unwrap();
        let text = filter_lines(list.get_one::<String>("filter").unwrap());
        assert_eq!(text, "lr: 0.1\nseed: [1, 2]");
        assert!(parse_query(&text).is_ok());
    }

    #[test]
    fn test_filter_help_points_to_file() {
        let command = cli();
        let list = command.find_subcommand("list").unwrap();
        let filter = list.get_arguments().find(|arg| arg.get_id() == "filter").unwrap();
        assert!(filter.get_help().unwrap().to_string().contains("--filter-file"));
    }
}
