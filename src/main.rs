use anyhow::{anyhow, Context};
use clap::Parser;
use modelpack_selector::domain::model::{ModelSelection, Repository};
use modelpack_selector::utils::{logger, validation::Validate};
use modelpack_selector::{
    CatalogFile, CliConfig, InMemoryCatalog, InMemoryRepositoryManager, Notice, SelectionSession,
    SelectorConfig, SelectorError, SessionHandle, SpawnedSession,
};
use std::sync::Arc;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    let config = match cli.validate().and_then(|_| cli.resolve()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    if cli.json || config.logging.json {
        logger::init_json_logger(cli.verbose, Some(&config.logging.level));
    } else {
        logger::init_cli_logger(cli.verbose, Some(&config.logging.level));
    }

    tracing::info!("Starting modelpack-selector");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
        tracing::debug!("Selector config: {:?}", config);
    }

    if let Err(err) = run(&cli, &config).await {
        tracing::error!("❌ Selection failed: {:#}", err);
        let exit_code = match err.downcast_ref::<SelectorError>() {
            Some(e) => {
                eprintln!("❌ {}", e.user_friendly_message());
                eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
                if e.is_fetch_error() {
                    2
                } else {
                    1
                }
            }
            None => {
                eprintln!("❌ {:#}", err);
                1
            }
        };
        std::process::exit(exit_code);
    }

    Ok(())
}

async fn run(cli: &CliConfig, config: &SelectorConfig) -> anyhow::Result<()> {
    let catalog_file = CatalogFile::from_file(&cli.catalog)
        .with_context(|| format!("loading catalog {}", cli.catalog))?;
    catalog_file.validate()?;

    let repositories = Arc::new(InMemoryRepositoryManager::new(
        catalog_file.repository_states()?,
    ));
    let catalog = InMemoryCatalog::from_catalog_file(&catalog_file)?
        .with_repositories(Arc::clone(&repositories));

    let SpawnedSession {
        handle: session,
        mut notices,
        task,
    } = SelectionSession::spawn(Arc::new(catalog), repositories, config);

    if !cli.disabled_repositories.is_empty() {
        for uri in &cli.disabled_repositories {
            session.toggle_repository(Repository::parse(uri)?, false)?;
        }
        session.refresh()?;
    }
    session.wait_until_idle().await?;
    report_notices(&mut notices)?;

    let selection = match &cli.package {
        Some(package) => Some(select(cli, config, &session, &mut notices, package).await?),
        None => None,
    };

    let snapshot = session.snapshot().await?;
    session.shutdown()?;
    task.await?;

    if cli.json {
        println!("{}", snapshot.to_json_report(selection.flatten().as_ref())?);
        return Ok(());
    }

    println!("Repositories:");
    for line in &snapshot.repositories {
        let mark = if line.enabled { "x" } else { " " };
        println!("  [{}] {}", mark, line.label);
    }
    println!();
    match selection {
        None => {
            println!("Available packages:");
            print!("{}", snapshot.tree.to_text());
        }
        Some(Some(selection)) => print_selection(&selection),
        Some(None) => return Err(anyhow!("the selection is incomplete")),
    }
    Ok(())
}

/// Walks the cascade: package variant, then the named (or default) entries of
/// each level below it.
async fn select(
    cli: &CliConfig,
    config: &SelectorConfig,
    session: &SessionHandle,
    notices: &mut broadcast::Receiver<Notice>,
    package: &str,
) -> anyhow::Result<Option<ModelSelection>> {
    let variant = match &cli.variant {
        Some(variant) => session.find_variant(package, variant).await?,
        None => session
            .variant_tree()
            .await?
            .leaves()
            .find(|candidate| candidate.package.name == package)
            .cloned(),
    }
    .ok_or_else(|| anyhow!("no visible variant of package '{}'", package))?;

    tracing::info!("📦 Selecting {}", variant);
    session.select_package(Some(variant))?;
    session.wait_until_idle().await?;
    report_notices(notices)?;

    if let Some(name) = &cli.definition {
        let available = session.snapshot().await?.selection.available_definitions;
        let definition = pick(&available, name, "model definition", |d| d.name.as_str())?;
        session.select_definition(Some(definition))?;
    }
    if let Some(name) = &cli.sequence {
        let available = session.snapshot().await?.selection.available_sequences;
        let sequence = pick(&available, name, "sequence", |s| s.name.as_str())?;
        session.select_sequence(Some(sequence))?;
    }
    if let Some(name) = &cli.optics {
        let available = session.snapshot().await?.selection.available_optics;
        let optics = pick(&available, name, "optics", |o| o.name.as_str())?;
        session.select_optics(Some(optics))?;
    }
    if let Some(name) = &cli.range {
        let available = session.snapshot().await?.selection.available_ranges;
        let range = pick(&available, name, "range", |r| r.name.as_str())?;
        session.select_range(Some(range))?;
    }

    Ok(session.finish(config.selection.selection_type).await?)
}

fn pick<T: Clone>(
    items: &[T],
    name: &str,
    what: &str,
    name_of: impl Fn(&T) -> &str,
) -> anyhow::Result<T> {
    items
        .iter()
        .find(|&item| name_of(item) == name)
        .cloned()
        .ok_or_else(|| {
            let choices: Vec<&str> = items.iter().map(&name_of).collect();
            anyhow!("{} '{}' not available (choices: {})", what, name, choices.join(", "))
        })
}

/// Turns the first pending failure notice into an error.
fn report_notices(notices: &mut broadcast::Receiver<Notice>) -> anyhow::Result<()> {
    match notices.try_recv() {
        Ok(notice) => Err(anyhow!("{} failed: {}", notice.operation, notice.message)),
        Err(_) => Ok(()),
    }
}

fn print_selection(selection: &ModelSelection) {
    println!("Model definition: {}", selection.definition.name);
    if let Some(startup) = &selection.startup {
        println!("Optics:           {}", startup.optics.name);
        println!("Range:            {}", startup.range.name);
    }
}
