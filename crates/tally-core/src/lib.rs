pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod draft;
pub mod render;
pub mod stats;
pub mod store;
pub mod view;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        "starting tally CLI"
    );
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.tallyrc.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let datastore = datastore::DataStore::open(&data_dir).with_context(|| {
        format!("failed to open datastore at {}", data_dir.display())
    })?;

    let mut renderer = render::Renderer::new(&cfg)?;
    let command = cli.command.unwrap_or_else(|| {
        debug!("no explicit command, using default list");
        cli::Command::List(cli::ListArgs {
            filter: cli::FilterArgs::default(),
            sort: cli::SortArgs::default(),
        })
    });

    commands::dispatch(&datastore, &cfg, &mut renderer, command)?;

    info!("done");
    Ok(())
}
