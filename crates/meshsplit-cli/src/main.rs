use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_yaml::{Mapping, Value};

use meshsplit_core::change::{Change, ChangeSet};
use meshsplit_core::{ProjectFile, ResourceType};
use meshsplit_dbt::{Catalog, DependencyGraph, Manifest, ResourceRegistry};
use meshsplit_plan::{
    Contractor, Grouper, ProjectLinker, Subproject, SubprojectPlanner, Versioner,
};
use meshsplit_storage::{ChangeSetProcessor, FileStore, Reporter};

/// meshsplit - split a monolithic dbt project into a mesh of subprojects
#[derive(Parser)]
#[command(name = "meshsplit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the dbt project to operate on
    #[arg(long, global = true, default_value = ".")]
    project_path: PathBuf,

    /// Print the planned changes without writing anything
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Carve a subproject out of the current project
    Split {
        /// Name of the new subproject
        name: String,

        /// Resources to take along (unique ids or model names)
        #[arg(long, num_args = 1.., required = true)]
        select: Vec<String>,

        /// Directory for the new project (default: `<name>` beside the
        /// current project)
        #[arg(long)]
        create_path: Option<PathBuf>,
    },

    /// Enforce a schema contract on one or more models
    Contract {
        /// Models to contract (unique ids or model names)
        #[arg(num_args = 1.., required = true)]
        models: Vec<String>,
    },

    /// Create a group and assign the selected resources to it
    Group {
        /// Name of the new group
        name: String,

        /// Group owner name
        #[arg(long)]
        owner_name: Option<String>,

        /// Group owner email
        #[arg(long)]
        owner_email: Option<String>,

        /// Resources to assign (unique ids or model names)
        #[arg(long, num_args = 1.., required = true)]
        select: Vec<String>,
    },

    /// Add or advance a version for one or more models
    Version {
        /// Models to version (unique ids or model names)
        #[arg(num_args = 1.., required = true)]
        models: Vec<String>,

        /// Define the new version without making it the latest
        #[arg(long)]
        prerelease: bool,

        /// File stem for the new version's code file
        #[arg(long)]
        defined_in: Option<String>,

        /// File stem for the bumped version's copy target; wins over
        /// --defined-in
        #[arg(long = "override")]
        stem_override: Option<String>,
    },

    /// Detect and formalize dependencies on another project
    Connect {
        /// Path to the downstream dbt project
        #[arg(long)]
        downstream_path: PathBuf,
    },
}

struct LoadedProject {
    root: PathBuf,
    project: ProjectFile,
    registry: ResourceRegistry,
    graph: DependencyGraph,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let loaded = load_project(&cli.project_path)?;

    let changes = match cli.command {
        Commands::Split {
            name,
            select,
            create_path,
        } => split_command(&loaded, &name, &select, create_path)?,
        Commands::Contract { models } => contract_command(&loaded, &models)?,
        Commands::Group {
            name,
            owner_name,
            owner_email,
            select,
        } => group_command(&loaded, &name, owner_name, owner_email, &select)?,
        Commands::Version {
            models,
            prerelease,
            defined_in,
            stem_override,
        } => version_command(
            &loaded,
            &models,
            prerelease,
            defined_in.as_deref(),
            stem_override.as_deref(),
        )?,
        Commands::Connect { downstream_path } => connect_command(&loaded, &downstream_path)?,
    };

    if changes.iter().all(|set| set.is_empty()) {
        println!("{}", "Nothing to do".yellow());
        return Ok(());
    }

    let store = FileStore::rooted(&loaded.root);
    let processor = ChangeSetProcessor::new(&store, &ConsoleReporter);
    processor.process(&changes, cli.dry_run)?;
    Ok(())
}

fn load_project(path: &Path) -> Result<LoadedProject> {
    let root = absolutize(path)?;

    let manifest_path = root.join("target/manifest.json");
    if !manifest_path.exists() {
        bail!(
            "manifest not found at {}; run `dbt parse` first",
            manifest_path.display()
        );
    }
    let manifest = Manifest::from_file(&manifest_path)?;

    let catalog_path = root.join("target/catalog.json");
    let catalog = if catalog_path.exists() {
        Some(Catalog::from_file(&catalog_path)?)
    } else {
        tracing::debug!(path = %catalog_path.display(), "no catalog, contracts will omit column types");
        None
    };

    let registry = ResourceRegistry::from_artifacts(&manifest, catalog.as_ref(), &root);
    let graph = DependencyGraph::from_registry(&registry);

    let project_path = root.join("dbt_project.yml");
    let contents = std::fs::read_to_string(&project_path)
        .with_context(|| format!("cannot read {}", project_path.display()))?;
    let project = ProjectFile::from_value(serde_yaml::from_str(&contents)?)?;

    Ok(LoadedProject {
        root,
        project,
        registry,
        graph,
    })
}

fn split_command(
    loaded: &LoadedProject,
    name: &str,
    select: &[String],
    create_path: Option<PathBuf>,
) -> Result<Vec<ChangeSet>> {
    let target = match create_path {
        Some(path) => absolutize(&path)?,
        None => loaded
            .root
            .parent()
            .unwrap_or(&loaded.root)
            .join(name),
    };

    let mut subproject = Subproject::new(name, target);
    for selector in select {
        let unique_id = resolve(&loaded.registry, selector)?;
        match loaded.registry.resource_type_of(&unique_id) {
            Some(ResourceType::Macro) => {
                subproject.custom_macros.insert(unique_id);
            }
            Some(ResourceType::Group) => {
                subproject.groups.insert(unique_id);
            }
            _ => {
                subproject.resources.insert(unique_id);
            }
        }
    }

    let store = FileStore::rooted(&loaded.root);
    let planner = SubprojectPlanner::new(&loaded.registry, &loaded.graph, &store);
    let changes = planner.initialize(&subproject, &loaded.project)?;
    Ok(vec![changes])
}

fn contract_command(loaded: &LoadedProject, models: &[String]) -> Result<Vec<ChangeSet>> {
    let contractor = Contractor::new(&loaded.registry);
    let mut changes = ChangeSet::new();
    for selector in models {
        let unique_id = resolve(&loaded.registry, selector)?;
        changes.push(contractor.generate_contract(&unique_id)?);
    }
    Ok(vec![changes])
}

fn group_command(
    loaded: &LoadedProject,
    name: &str,
    owner_name: Option<String>,
    owner_email: Option<String>,
    select: &[String],
) -> Result<Vec<ChangeSet>> {
    if owner_name.is_none() && owner_email.is_none() {
        bail!("a group needs an owner: pass --owner-name and/or --owner-email");
    }
    let mut owner = Mapping::new();
    if let Some(owner_name) = owner_name {
        owner.insert(Value::from("name"), Value::from(owner_name));
    }
    if let Some(owner_email) = owner_email {
        owner.insert(Value::from("email"), Value::from(owner_email));
    }

    let mut selected = BTreeSet::new();
    for selector in select {
        selected.insert(resolve(&loaded.registry, selector)?);
    }

    let cleaned = loaded.graph.clean_subgraph(|id| {
        loaded
            .registry
            .resource_type_of(id)
            .map(|t| t.can_be_public())
            .unwrap_or(false)
    });
    let interface = cleaned.identify_interface(&selected);

    let grouper = Grouper::new(&loaded.registry);
    let mut changes = ChangeSet::new();
    changes.push(grouper.add_group(
        name,
        owner,
        loaded.root.join("models/_groups.yml"),
    )?);
    for unique_id in &selected {
        let access = Grouper::access_for(interface.contains(unique_id));
        changes.push(grouper.generate_access(unique_id, access, Some(name))?);
    }
    Ok(vec![changes])
}

fn version_command(
    loaded: &LoadedProject,
    models: &[String],
    prerelease: bool,
    defined_in: Option<&str>,
    stem_override: Option<&str>,
) -> Result<Vec<ChangeSet>> {
    let versioner = Versioner::new(&loaded.registry);
    let mut changes = ChangeSet::new();
    for selector in models {
        let unique_id = resolve(&loaded.registry, selector)?;
        let resource = loaded.registry.get(&unique_id)?;
        let planned = if resource.is_versioned() {
            versioner.bump_version(&unique_id, prerelease, defined_in, stem_override)?
        } else {
            versioner.add_version(&unique_id, defined_in)?
        };
        changes.extend(planned);
    }
    Ok(vec![changes])
}

fn connect_command(loaded: &LoadedProject, downstream_path: &Path) -> Result<Vec<ChangeSet>> {
    let downstream = load_project(downstream_path)?;
    let store = FileStore::new(&downstream.root, &downstream.root);
    let linker = ProjectLinker::new(&loaded.registry, &downstream.registry, &store);

    let dependencies = linker.discover();
    if dependencies.is_empty() {
        println!(
            "{} between {} and {}",
            "No informal dependencies found".yellow(),
            loaded.registry.project_name(),
            downstream.registry.project_name()
        );
        return Ok(Vec::new());
    }

    let mut sets = Vec::new();
    for dependency in &dependencies {
        println!(
            "{} {} -> {} ({:?})",
            "Found".cyan(),
            dependency.upstream_resource,
            dependency.downstream_resource,
            dependency.dependency_type
        );
        sets.push(linker.resolve(dependency)?);
    }
    Ok(sets)
}

/// Resolve a selector to a unique id: exact ids pass through, bare names
/// match a model in the loaded project.
fn resolve(registry: &ResourceRegistry, selector: &str) -> Result<String> {
    if registry.contains(selector) {
        return Ok(selector.to_string());
    }
    let matches: Vec<_> = registry
        .resources()
        .filter(|r| r.name == selector)
        .collect();
    match matches.as_slice() {
        [] => bail!("no resource named `{selector}` in {}", registry.project_name()),
        [resource] => Ok(resource.unique_id.clone()),
        many => bail!(
            "`{selector}` is ambiguous; use one of: {}",
            many.iter()
                .map(|r| r.unique_id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Console progress output for the processor.
struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn begin_set(&self, index: usize, total: usize, changes: usize) {
        println!(
            "{} change set {index} of {total} ({changes} changes)",
            "Processing".cyan()
        );
    }

    fn step(&self, step: usize, change: &Change, dry_run: bool) {
        let tag = if dry_run {
            "Plan".yellow()
        } else {
            "Apply".green()
        };
        println!("  {tag} {step}: {change}");
    }

    fn finished(&self, handled: usize, dry_run: bool) {
        if dry_run {
            println!(
                "{} {handled} planned changes (dry run, nothing written)",
                "Done".cyan()
            );
        } else {
            println!("{} {handled} changes applied", "Done".green());
        }
    }
}
