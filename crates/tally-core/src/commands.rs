use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tally_shared::{
    Category, FilterPatch, FilterState, Priority, Selector, SortDirection, SortKey, SortPatch,
    SortState, Tag, Theme, ThemePatch, new_id,
};
use tracing::{debug, info, instrument};

use crate::cli::{
    AddArgs, Command, EditArgs, FilterArgs, LabelCommand, PrefsArgs, SortArgs, ThemeArgs,
};
use crate::config::{Config, DarkMode, host_prefers_dark};
use crate::datastore::{DataStore, SavedPrefs};
use crate::datetime::parse_due_expr;
use crate::draft::{TaskDraft, TaskEdit, ValidationError, resolve_task};
use crate::render::Renderer;
use crate::stats::{Stats, pending_visible};
use crate::store::{Action, Snapshot, Store, next_rank, reorder};
use crate::view::project;

const DEFAULT_LABEL_COLOR: &str = "#64748b";

#[instrument(skip(datastore, cfg, renderer, command))]
pub fn dispatch(
    datastore: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let mut store = Store::new(load_snapshot(datastore, cfg)?);

    match command {
        Command::List(args) => cmd_list(&mut store, renderer, &args.filter, &args.sort, now),
        Command::Add(args) => cmd_add(&mut store, datastore, args, now),
        Command::Edit(args) => cmd_edit(&mut store, datastore, args, now),
        Command::Done { task } => cmd_done(&mut store, datastore, &task),
        Command::Delete { task } => cmd_delete(&mut store, datastore, &task),
        Command::Move { task, position } => cmd_move(&mut store, datastore, &task, position),
        Command::Info { task } => {
            let snapshot = store.snapshot();
            let found = resolve_task(&snapshot.tasks, &task)?;
            renderer.print_task_info(found, snapshot)
        }
        Command::Stats => cmd_stats(&store, renderer, now),
        Command::Category(sub) => cmd_category(&mut store, datastore, renderer, sub),
        Command::Tag(sub) => cmd_tag(&mut store, datastore, renderer, sub),
        Command::Theme(args) => cmd_theme(&mut store, datastore, args),
        Command::Prefs(args) => cmd_prefs(&mut store, datastore, cfg, args),
        Command::Show => cmd_show(cfg),
    }
}

/// Builds the startup snapshot: persisted collections, then saved
/// preferences, falling back to config defaults for anything never saved.
#[instrument(skip(datastore, cfg))]
pub fn load_snapshot(datastore: &DataStore, cfg: &Config) -> anyhow::Result<Snapshot> {
    let prefers_dark = match cfg.dark_mode()? {
        DarkMode::Auto => host_prefers_dark(),
        DarkMode::On => true,
        DarkMode::Off => false,
    };

    let collections = datastore.load_collections()?;
    let prefs = datastore.load_prefs()?;

    let mut store = Store::new(Snapshot::new(prefers_dark));
    store.dispatch(Action::SetTasks(collections.tasks));
    store.dispatch(Action::SetCategories(collections.categories));
    store.dispatch(Action::SetTags(collections.tags));

    let filter = prefs.filter.unwrap_or_else(|| FilterState {
        show_completed: cfg.show_completed(),
        ..FilterState::default()
    });
    store.dispatch(Action::PatchFilter(full_filter_patch(filter)));

    let sort = match prefs.sort {
        Some(sort) => sort,
        None => cfg.sort_state()?,
    };
    store.dispatch(Action::PatchSort(SortPatch {
        key: Some(sort.key),
        direction: Some(sort.direction),
    }));

    let theme = prefs.theme.unwrap_or_else(|| Theme {
        name: cfg.get("theme.name").unwrap_or_else(|| "system".to_string()),
        ..Theme::seeded(prefers_dark)
    });
    store.dispatch(Action::PatchTheme(ThemePatch {
        name: Some(theme.name),
        background: Some(theme.background),
        dark: Some(theme.dark),
    }));

    let snapshot = store.into_snapshot();
    debug!(
        tasks = snapshot.tasks.len(),
        categories = snapshot.categories.len(),
        tags = snapshot.tags.len(),
        "loaded snapshot"
    );
    Ok(snapshot)
}

fn full_filter_patch(filter: FilterState) -> FilterPatch {
    FilterPatch {
        search: Some(filter.search),
        priority: Some(filter.priority),
        category: Some(filter.category),
        tags: Some(filter.tags),
        show_completed: Some(filter.show_completed),
    }
}

#[instrument(skip(store, renderer, filter, sort, now))]
fn cmd_list(
    store: &mut Store,
    renderer: &mut Renderer,
    filter: &FilterArgs,
    sort: &SortArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command list");

    let filter_patch = filter_patch_from_args(store.snapshot(), filter)?;
    store.dispatch(Action::PatchFilter(filter_patch));
    let sort_patch = sort_patch_from_args(&store.snapshot().sort, sort);
    store.dispatch(Action::PatchSort(sort_patch));

    let snapshot = store.snapshot();
    let visible = snapshot.visible_tasks();
    debug!(visible = visible.len(), total = snapshot.tasks.len(), "projected tasks");

    renderer.print_task_table(&visible, snapshot, now)?;
    println!(
        "{} of {} tasks, {} pending",
        visible.len(),
        snapshot.tasks.len(),
        pending_visible(&visible)
    );
    Ok(())
}

#[instrument(skip(store, datastore, args, now))]
fn cmd_add(
    store: &mut Store,
    datastore: &DataStore,
    args: AddArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    let snapshot = store.snapshot();
    let due = args
        .due
        .as_deref()
        .map(|raw| parse_due_expr(raw, now))
        .transpose()?;
    let category_id = args
        .category
        .as_deref()
        .map(|raw| resolve_category_id(snapshot, raw))
        .transpose()?;
    let tags = args
        .tags
        .iter()
        .map(|raw| resolve_tag_id(snapshot, raw))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let draft = TaskDraft {
        title: args.title.join(" "),
        description: args.description,
        due,
        priority: args.priority.unwrap_or_default(),
        category_id,
        tags,
    };
    let task = draft.into_task(new_id(), now, Some(next_rank(&snapshot.tasks)))?;
    let id = task.id.clone();

    store.dispatch(Action::AddTask(task));
    datastore.save_tasks(&store.snapshot().tasks)?;

    println!("Created task {}.", short(&id));
    Ok(())
}

#[instrument(skip(store, datastore, args, now))]
fn cmd_edit(
    store: &mut Store,
    datastore: &DataStore,
    args: EditArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command edit");

    let snapshot = store.snapshot();
    let task = resolve_task(&snapshot.tasks, &args.task)?;

    let description = if args.clear_desc {
        Some(None)
    } else {
        args.description.map(Some)
    };
    let due = if args.clear_due {
        Some(None)
    } else {
        args.due
            .as_deref()
            .map(|raw| parse_due_expr(raw, now).map(Some))
            .transpose()?
    };
    let category_id = if args.clear_category {
        Some(None)
    } else {
        args.category
            .as_deref()
            .map(|raw| resolve_category_id(snapshot, raw).map(Some))
            .transpose()?
    };
    let toggle_tags = args
        .toggle_tags
        .iter()
        .map(|raw| resolve_tag_id(snapshot, raw))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let edit = TaskEdit {
        title: args.title,
        description,
        due,
        priority: args.priority,
        category_id,
        tags: None,
        toggle_tags,
    };
    if edit.is_empty() {
        return Err(anyhow!("nothing to change for task {}", short(&task.id)));
    }

    let updated = edit.apply(task, now)?;
    let id = updated.id.clone();
    store.dispatch(Action::UpdateTask(updated));
    datastore.save_tasks(&store.snapshot().tasks)?;

    println!("Modified task {}.", short(&id));
    Ok(())
}

#[instrument(skip(store, datastore))]
fn cmd_done(store: &mut Store, datastore: &DataStore, reference: &str) -> anyhow::Result<()> {
    info!("command done");

    let id = resolve_task(&store.snapshot().tasks, reference)?.id.clone();
    store.dispatch(Action::ToggleTask(id.clone()));
    datastore.save_tasks(&store.snapshot().tasks)?;

    let completed = store.snapshot().task(&id).is_some_and(|t| t.completed);
    if completed {
        println!("Completed task {}.", short(&id));
    } else {
        println!("Reopened task {}.", short(&id));
    }
    Ok(())
}

#[instrument(skip(store, datastore))]
fn cmd_delete(store: &mut Store, datastore: &DataStore, reference: &str) -> anyhow::Result<()> {
    info!("command delete");

    let id = resolve_task(&store.snapshot().tasks, reference)?.id.clone();
    store.dispatch(Action::RemoveTask(id.clone()));
    datastore.save_tasks(&store.snapshot().tasks)?;

    println!("Deleted task {}.", short(&id));
    Ok(())
}

#[instrument(skip(store, datastore))]
fn cmd_move(
    store: &mut Store,
    datastore: &DataStore,
    reference: &str,
    position: usize,
) -> anyhow::Result<()> {
    info!("command move");

    if position == 0 {
        return Err(anyhow!("positions start at 1"));
    }

    let snapshot = store.snapshot();
    let id = resolve_task(&snapshot.tasks, reference)?.id.clone();
    let manual = SortState {
        key: SortKey::Manual,
        direction: SortDirection::Asc,
    };
    let ordered = project(&snapshot.tasks, &FilterState::default(), &manual);
    let reordered = reorder(&ordered, &id, position - 1)
        .ok_or_else(|| ValidationError::UnknownTask(reference.to_string()))?;

    store.dispatch(Action::ReorderTasks(reordered));
    datastore.save_tasks(&store.snapshot().tasks)?;

    println!("Moved task {} to position {}.", short(&id), position);
    Ok(())
}

fn cmd_stats(store: &Store, renderer: &mut Renderer, now: DateTime<Utc>) -> anyhow::Result<()> {
    let snapshot = store.snapshot();
    let stats = Stats::collect(&snapshot.tasks, now);
    let visible = snapshot.visible_tasks();
    renderer.print_stats(&stats, pending_visible(&visible))
}

#[instrument(skip(store, datastore, renderer, sub))]
fn cmd_category(
    store: &mut Store,
    datastore: &DataStore,
    renderer: &mut Renderer,
    sub: LabelCommand,
) -> anyhow::Result<()> {
    match sub {
        LabelCommand::Add { name, color } => {
            let name = clean_label_name(&name, "category")?;
            if store
                .snapshot()
                .categories
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&name))
            {
                return Err(anyhow!("category '{name}' already exists"));
            }

            let mut categories = store.snapshot().categories.clone();
            categories.push(Category {
                id: new_id(),
                name: name.clone(),
                color: color.unwrap_or_else(|| DEFAULT_LABEL_COLOR.to_string()),
            });
            store.dispatch(Action::SetCategories(categories));
            datastore.save_categories(&store.snapshot().categories)?;

            println!("Created category {name}.");
            Ok(())
        }
        LabelCommand::List => {
            let snapshot = store.snapshot();
            let rows = snapshot
                .categories
                .iter()
                .map(|c| {
                    let count = snapshot
                        .tasks
                        .iter()
                        .filter(|t| t.category_id.as_deref() == Some(c.id.as_str()))
                        .count();
                    vec![
                        short(&c.id).to_string(),
                        c.name.clone(),
                        c.color.clone(),
                        count.to_string(),
                    ]
                })
                .collect();
            renderer.print_rows(&["ID", "Name", "Color", "Tasks"], rows)
        }
    }
}

#[instrument(skip(store, datastore, renderer, sub))]
fn cmd_tag(
    store: &mut Store,
    datastore: &DataStore,
    renderer: &mut Renderer,
    sub: LabelCommand,
) -> anyhow::Result<()> {
    match sub {
        LabelCommand::Add { name, color } => {
            let name = clean_label_name(&name, "tag")?;
            if store
                .snapshot()
                .tags
                .iter()
                .any(|t| t.name.eq_ignore_ascii_case(&name))
            {
                return Err(anyhow!("tag '{name}' already exists"));
            }

            let mut tags = store.snapshot().tags.clone();
            tags.push(Tag {
                id: new_id(),
                name: name.clone(),
                color: color.unwrap_or_else(|| DEFAULT_LABEL_COLOR.to_string()),
            });
            store.dispatch(Action::SetTags(tags));
            datastore.save_tags(&store.snapshot().tags)?;

            println!("Created tag {name}.");
            Ok(())
        }
        LabelCommand::List => {
            let snapshot = store.snapshot();
            let rows = snapshot
                .tags
                .iter()
                .map(|tag| {
                    let count = snapshot.tasks.iter().filter(|t| t.has_tag(&tag.id)).count();
                    vec![
                        short(&tag.id).to_string(),
                        tag.name.clone(),
                        tag.color.clone(),
                        count.to_string(),
                    ]
                })
                .collect();
            renderer.print_rows(&["ID", "Name", "Color", "Tasks"], rows)
        }
    }
}

#[instrument(skip(store, datastore, args))]
fn cmd_theme(store: &mut Store, datastore: &DataStore, args: ThemeArgs) -> anyhow::Result<()> {
    info!("command theme");

    let dark = args
        .dark
        .as_deref()
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "y" | "yes" | "on" | "true" => Ok(true),
            "0" | "n" | "no" | "off" | "false" => Ok(false),
            other => Err(anyhow!("invalid --dark value: {other}")),
        })
        .transpose()?;
    let background = if args.clear_background {
        Some(None)
    } else {
        args.background.map(Some)
    };

    store.dispatch(Action::PatchTheme(ThemePatch {
        name: args.name,
        background,
        dark,
    }));

    let mut prefs = datastore.load_prefs()?;
    let theme = store.snapshot().theme.clone();
    prefs.theme = Some(theme.clone());
    datastore.save_prefs(&prefs)?;

    println!(
        "Theme {} ({}){}",
        theme.name,
        if theme.dark { "dark" } else { "light" },
        theme
            .background
            .as_ref()
            .map(|bg| format!(", background {bg}"))
            .unwrap_or_default()
    );
    Ok(())
}

#[instrument(skip(store, datastore, cfg, args))]
fn cmd_prefs(
    store: &mut Store,
    datastore: &DataStore,
    cfg: &Config,
    args: PrefsArgs,
) -> anyhow::Result<()> {
    info!("command prefs");

    let mut prefs = datastore.load_prefs()?;
    if args.reset {
        prefs = SavedPrefs {
            theme: prefs.theme,
            ..SavedPrefs::default()
        };
        let defaults = FilterState {
            show_completed: cfg.show_completed(),
            ..FilterState::default()
        };
        store.dispatch(Action::PatchFilter(full_filter_patch(defaults)));
        let sort = cfg.sort_state()?;
        store.dispatch(Action::PatchSort(SortPatch {
            key: Some(sort.key),
            direction: Some(sort.direction),
        }));
    }

    let filter_patch = filter_patch_from_args(store.snapshot(), &args.filter)?;
    let sort_patch = sort_patch_from_args(&store.snapshot().sort, &args.sort);
    let touched_filter = filter_patch != FilterPatch::default();
    let touched_sort = sort_patch != SortPatch::default();

    store.dispatch(Action::PatchFilter(filter_patch));
    store.dispatch(Action::PatchSort(sort_patch));

    let snapshot = store.snapshot();
    if touched_filter {
        prefs.filter = Some(snapshot.filter.clone());
    }
    if touched_sort {
        prefs.sort = Some(snapshot.sort);
    }
    datastore
        .save_prefs(&prefs)
        .context("failed to save preferences")?;

    println!(
        "Sorting by {} {}; completed tasks {}.",
        snapshot.sort.key.as_str(),
        snapshot.sort.direction.as_str(),
        if snapshot.filter.show_completed {
            "shown"
        } else {
            "hidden"
        }
    );
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (k, v) in entries {
        println!("{k}={v}");
    }
    for file in &cfg.loaded_files {
        println!("# loaded {}", file.display());
    }
    Ok(())
}

fn filter_patch_from_args(snapshot: &Snapshot, args: &FilterArgs) -> anyhow::Result<FilterPatch> {
    let priority = args
        .priority
        .as_deref()
        .map(|raw| {
            if raw.eq_ignore_ascii_case("all") {
                Ok(Selector::All)
            } else {
                raw.parse::<Priority>()
                    .map(Selector::Only)
                    .map_err(|e| anyhow!(e))
            }
        })
        .transpose()?;
    let category = args
        .category
        .as_deref()
        .map(|raw| {
            if raw.eq_ignore_ascii_case("all") {
                Ok(Selector::All)
            } else {
                resolve_category_id(snapshot, raw).map(Selector::Only)
            }
        })
        .transpose()?;
    let tags = if args.tags.is_empty() {
        None
    } else {
        Some(
            args.tags
                .iter()
                .map(|raw| resolve_tag_id(snapshot, raw))
                .collect::<anyhow::Result<Vec<_>>>()?,
        )
    };
    let show_completed = if args.show_completed {
        Some(true)
    } else if args.hide_completed {
        Some(false)
    } else {
        None
    };

    Ok(FilterPatch {
        search: args.search.clone(),
        priority,
        category,
        tags,
        show_completed,
    })
}

/// An explicit direction wins; a bare key behaves like clicking a column
/// header.
fn sort_patch_from_args(current: &SortState, args: &SortArgs) -> SortPatch {
    match (args.sort, args.direction()) {
        (Some(key), Some(direction)) => SortPatch {
            key: Some(key),
            direction: Some(direction),
        },
        (Some(key), None) => SortPatch::toggle(current, key),
        (None, direction) => SortPatch {
            key: None,
            direction,
        },
    }
}

fn resolve_category_id(snapshot: &Snapshot, raw: &str) -> anyhow::Result<String> {
    let raw = raw.trim();
    snapshot
        .categories
        .iter()
        .find(|c| c.id == raw || c.name.eq_ignore_ascii_case(raw))
        .or_else(|| unique_prefix(&snapshot.categories, raw, |c| c.id.as_str()))
        .map(|c| c.id.clone())
        .ok_or_else(|| anyhow!("unknown category: {raw}"))
}

fn resolve_tag_id(snapshot: &Snapshot, raw: &str) -> anyhow::Result<String> {
    let raw = raw.trim().trim_start_matches('+');
    snapshot
        .tags
        .iter()
        .find(|t| t.id == raw || t.name.eq_ignore_ascii_case(raw))
        .or_else(|| unique_prefix(&snapshot.tags, raw, |t| t.id.as_str()))
        .map(|t| t.id.clone())
        .ok_or_else(|| anyhow!("unknown tag: {raw}"))
}

fn unique_prefix<'a, T>(items: &'a [T], prefix: &str, id: impl Fn(&T) -> &str) -> Option<&'a T> {
    if prefix.is_empty() {
        return None;
    }
    let mut hits = items.iter().filter(|item| id(item).starts_with(prefix));
    let first = hits.next()?;
    if hits.next().is_some() { None } else { Some(first) }
}

fn clean_label_name(raw: &str, kind: &'static str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName { kind });
    }
    Ok(name.to_string())
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tally_shared::Task;
    use tempfile::TempDir;

    use super::*;
    use crate::cli::ListArgs;

    fn setup() -> (TempDir, DataStore, Config) {
        let dir = TempDir::new().unwrap();
        let datastore = DataStore::open(dir.path()).unwrap();
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![
            ("color".to_string(), "off".to_string()),
            ("theme.dark".to_string(), "off".to_string()),
        ]);
        (dir, datastore, cfg)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn seed(datastore: &DataStore) {
        let mut milk = Task::with_id("aaaa1111", "buy milk", now());
        milk.order = Some(0);
        let mut taxes = Task::with_id("bbbb2222", "file taxes", now());
        taxes.order = Some(1);
        taxes.priority = Priority::High;
        datastore.save_tasks(&[milk, taxes]).unwrap();
        datastore
            .save_categories(&[Category {
                id: "cat-home".to_string(),
                name: "Home".to_string(),
                color: "#22c55e".to_string(),
            }])
            .unwrap();
        datastore
            .save_tags(&[Tag {
                id: "tag-errand".to_string(),
                name: "errand".to_string(),
                color: "#eab308".to_string(),
            }])
            .unwrap();
    }

    fn run(datastore: &DataStore, cfg: &Config, command: Command) -> anyhow::Result<()> {
        let mut renderer = Renderer::new(cfg)?;
        dispatch(datastore, cfg, &mut renderer, command)
    }

    #[test]
    fn startup_snapshot_uses_config_when_nothing_saved() {
        let (_dir, datastore, mut cfg) = setup();
        cfg.apply_overrides(vec![
            ("sort.key".to_string(), "due".to_string()),
            ("filter.show_completed".to_string(), "off".to_string()),
            ("theme.dark".to_string(), "on".to_string()),
        ]);
        let snapshot = load_snapshot(&datastore, &cfg).unwrap();
        assert_eq!(snapshot.sort.key, SortKey::Due);
        assert_eq!(snapshot.sort.direction, SortDirection::Desc);
        assert!(!snapshot.filter.show_completed);
        assert!(snapshot.theme.dark);
        assert_eq!(snapshot.theme.name, "system");
    }

    #[test]
    fn add_resolves_labels_and_appends_rank() {
        let (_dir, datastore, cfg) = setup();
        seed(&datastore);

        let args = AddArgs {
            title: vec!["water".to_string(), "plants".to_string()],
            description: None,
            due: Some("2024-03-05".to_string()),
            priority: Some(Priority::Low),
            category: Some("home".to_string()),
            tags: vec!["+errand".to_string()],
        };
        run(&datastore, &cfg, Command::Add(args)).unwrap();

        let tasks = datastore.load_tasks().unwrap();
        assert_eq!(tasks.len(), 3);
        let added = &tasks[2];
        assert_eq!(added.title, "water plants");
        assert_eq!(added.priority, Priority::Low);
        assert_eq!(added.category_id.as_deref(), Some("cat-home"));
        assert_eq!(added.tags, vec!["tag-errand".to_string()]);
        assert_eq!(added.order, Some(2));
        assert!(added.due.is_some());
    }

    #[test]
    fn add_rejects_blank_title_and_unknown_tag() {
        let (_dir, datastore, cfg) = setup();
        seed(&datastore);

        let blank = AddArgs {
            title: vec!["   ".to_string()],
            description: None,
            due: None,
            priority: None,
            category: None,
            tags: vec![],
        };
        let err = run(&datastore, &cfg, Command::Add(blank)).unwrap_err();
        assert!(err.to_string().contains("title cannot be empty"));

        let unknown = AddArgs {
            title: vec!["x".to_string()],
            description: None,
            due: None,
            priority: None,
            category: None,
            tags: vec!["nope".to_string()],
        };
        assert!(run(&datastore, &cfg, Command::Add(unknown)).is_err());
        assert_eq!(datastore.load_tasks().unwrap().len(), 2);
    }

    #[test]
    fn done_toggles_by_prefix() {
        let (_dir, datastore, cfg) = setup();
        seed(&datastore);

        run(&datastore, &cfg, Command::Done { task: "bbbb".to_string() }).unwrap();
        let tasks = datastore.load_tasks().unwrap();
        assert!(tasks[1].completed);
        assert!(!tasks[0].completed);

        run(&datastore, &cfg, Command::Done { task: "bbbb".to_string() }).unwrap();
        assert!(!datastore.load_tasks().unwrap()[1].completed);
    }

    #[test]
    fn edit_toggles_tags_and_clears_fields() {
        let (_dir, datastore, cfg) = setup();
        seed(&datastore);

        let edit = |toggle: Vec<String>, clear_category: bool, category: Option<String>| EditArgs {
            task: "aaaa".to_string(),
            title: None,
            description: None,
            clear_desc: false,
            due: None,
            clear_due: false,
            priority: None,
            category,
            clear_category,
            toggle_tags: toggle,
        };

        run(
            &datastore,
            &cfg,
            Command::Edit(edit(vec!["errand".to_string()], false, Some("Home".to_string()))),
        )
        .unwrap();
        let task = datastore.load_tasks().unwrap().remove(0);
        assert_eq!(task.tags, vec!["tag-errand".to_string()]);
        assert_eq!(task.category_id.as_deref(), Some("cat-home"));

        run(
            &datastore,
            &cfg,
            Command::Edit(edit(vec!["errand".to_string()], true, None)),
        )
        .unwrap();
        let task = datastore.load_tasks().unwrap().remove(0);
        assert!(task.tags.is_empty());
        assert_eq!(task.category_id, None);

        let err = run(&datastore, &cfg, Command::Edit(edit(vec![], false, None))).unwrap_err();
        assert!(err.to_string().contains("nothing to change"));
    }

    #[test]
    fn delete_and_unknown_reference() {
        let (_dir, datastore, cfg) = setup();
        seed(&datastore);

        run(&datastore, &cfg, Command::Delete { task: "aaaa1111".to_string() }).unwrap();
        let tasks = datastore.load_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "bbbb2222");

        let err = run(&datastore, &cfg, Command::Delete { task: "zzz".to_string() }).unwrap_err();
        assert!(err.to_string().contains("no task matches"));
    }

    #[test]
    fn move_renumbers_manual_ranks() {
        let (_dir, datastore, cfg) = setup();
        seed(&datastore);

        run(
            &datastore,
            &cfg,
            Command::Move {
                task: "bbbb".to_string(),
                position: 1,
            },
        )
        .unwrap();
        let tasks = datastore.load_tasks().unwrap();
        assert_eq!(tasks[0].id, "bbbb2222");
        assert_eq!(tasks[0].order, Some(0));
        assert_eq!(tasks[1].id, "aaaa1111");
        assert_eq!(tasks[1].order, Some(1));

        assert!(
            run(
                &datastore,
                &cfg,
                Command::Move {
                    task: "aaaa".to_string(),
                    position: 0,
                },
            )
            .is_err()
        );
    }

    #[test]
    fn labels_are_created_once() {
        let (_dir, datastore, cfg) = setup();

        let add = |name: &str| {
            Command::Category(LabelCommand::Add {
                name: name.to_string(),
                color: None,
            })
        };
        run(&datastore, &cfg, add("Work")).unwrap();
        assert!(run(&datastore, &cfg, add("work")).is_err());
        assert!(run(&datastore, &cfg, add("  ")).is_err());

        let categories = datastore.load_categories().unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].color, DEFAULT_LABEL_COLOR);

        run(
            &datastore,
            &cfg,
            Command::Tag(LabelCommand::Add {
                name: "urgent".to_string(),
                color: Some("#ef4444".to_string()),
            }),
        )
        .unwrap();
        assert_eq!(datastore.load_tags().unwrap()[0].name, "urgent");
    }

    #[test]
    fn theme_changes_are_saved() {
        let (_dir, datastore, cfg) = setup();

        run(
            &datastore,
            &cfg,
            Command::Theme(ThemeArgs {
                name: Some("ocean".to_string()),
                background: Some("waves.jpg".to_string()),
                clear_background: false,
                dark: Some("on".to_string()),
            }),
        )
        .unwrap();
        let theme = datastore.load_prefs().unwrap().theme.unwrap();
        assert_eq!(theme.name, "ocean");
        assert_eq!(theme.background.as_deref(), Some("waves.jpg"));
        assert!(theme.dark);

        run(
            &datastore,
            &cfg,
            Command::Theme(ThemeArgs {
                name: None,
                background: None,
                clear_background: true,
                dark: None,
            }),
        )
        .unwrap();
        let snapshot = load_snapshot(&datastore, &cfg).unwrap();
        assert_eq!(snapshot.theme.name, "ocean");
        assert_eq!(snapshot.theme.background, None);
    }

    #[test]
    fn prefs_persist_filter_and_sort() {
        let (_dir, datastore, cfg) = setup();
        seed(&datastore);

        run(
            &datastore,
            &cfg,
            Command::Prefs(PrefsArgs {
                filter: FilterArgs {
                    priority: Some("high".to_string()),
                    category: Some("home".to_string()),
                    hide_completed: true,
                    ..FilterArgs::default()
                },
                sort: SortArgs {
                    sort: Some(SortKey::Priority),
                    ..SortArgs::default()
                },
                reset: false,
            }),
        )
        .unwrap();

        let snapshot = load_snapshot(&datastore, &cfg).unwrap();
        assert_eq!(snapshot.filter.priority, Selector::Only(Priority::High));
        assert_eq!(snapshot.filter.category, Selector::Only("cat-home".to_string()));
        assert!(!snapshot.filter.show_completed);
        assert_eq!(snapshot.sort.key, SortKey::Priority);
        assert_eq!(snapshot.sort.direction, SortDirection::Asc);

        run(
            &datastore,
            &cfg,
            Command::Prefs(PrefsArgs {
                filter: FilterArgs::default(),
                sort: SortArgs::default(),
                reset: true,
            }),
        )
        .unwrap();
        let snapshot = load_snapshot(&datastore, &cfg).unwrap();
        assert_eq!(snapshot.filter, FilterState::default());
        assert_eq!(snapshot.sort, SortState::default());
    }

    #[test]
    fn list_does_not_persist_its_flags() {
        let (_dir, datastore, cfg) = setup();
        seed(&datastore);

        run(
            &datastore,
            &cfg,
            Command::List(ListArgs {
                filter: FilterArgs {
                    search: Some("milk".to_string()),
                    ..FilterArgs::default()
                },
                sort: SortArgs::default(),
            }),
        )
        .unwrap();
        assert_eq!(datastore.load_prefs().unwrap(), SavedPrefs::default());
    }

    #[test]
    fn bare_sort_key_behaves_like_a_header_click() {
        let current = SortState::default();
        let first = sort_patch_from_args(
            &current,
            &SortArgs {
                sort: Some(SortKey::Created),
                ..SortArgs::default()
            },
        );
        assert_eq!(first.direction, Some(SortDirection::Asc));
        assert_eq!(first.key, None);

        let explicit = sort_patch_from_args(
            &current,
            &SortArgs {
                sort: Some(SortKey::Due),
                desc: true,
                ..SortArgs::default()
            },
        );
        assert_eq!(explicit.key, Some(SortKey::Due));
        assert_eq!(explicit.direction, Some(SortDirection::Desc));
    }
}
