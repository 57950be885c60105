use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowgroup_core::{LayoutConfig, NodeId, OperationReport, Provider, Size, Vec2};
use flowgroup_events::Event;
use flowgroup_graph::{ChildPolicy, EditorSession, NodeTable, ResourceTemplate, transform};
use flowgroup_project::Project;
use flowgroup_storage::Storage;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, debug};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the diagram document
    #[arg(short, long, default_value = "diagram.json")]
    doc: PathBuf,

    /// JSON file with layout configuration overrides
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the layout cache database (defaults to a sidecar of the document)
    #[arg(long)]
    layout_db: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty diagram document
    New {
        #[arg(long)]
        name: Option<String>,
    },
    /// Drop a new resource at a canvas position
    AddLeaf {
        label: String,
        #[arg(long, default_value = "generic")]
        provider: Provider,
        #[arg(long, allow_negative_numbers = true)]
        x: f32,
        #[arg(long, allow_negative_numbers = true)]
        y: f32,
    },
    /// Create an empty group in the middle of the viewport
    AddGroup {
        #[arg(long, default_value = "generic")]
        provider: Provider,
        #[arg(long)]
        label: Option<String>,
    },
    /// Wrap two or more nodes in a new group
    Group {
        #[arg(required = true, num_args = 2..)]
        ids: Vec<String>,
    },
    /// Replace the selection; no ids clears it
    Select { ids: Vec<String> },
    /// Dissolve a group, or the groups of the current selection
    Ungroup { id: Option<String> },
    /// Toggle a group between collapsed and expanded
    #[command(alias = "expand")]
    Collapse { id: String },
    /// Resize an expanded group, never below the minimum group size
    Resize {
        id: String,
        #[arg(long)]
        width: f32,
        #[arg(long)]
        height: f32,
    },
    Minimize { id: String },
    Restore { id: String },
    /// Drag a node to a canvas position, dropping it into whatever group is there
    Move {
        id: String,
        #[arg(long, allow_negative_numbers = true)]
        x: f32,
        #[arg(long, allow_negative_numbers = true)]
        y: f32,
    },
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Keep the children of deleted groups
        #[arg(long)]
        promote: bool,
    },
    Rename { id: String, label: String },
    Duplicate { id: String },
    /// Print the node tree
    Show {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    if let Command::New { name } = &args.command {
        let name = name.clone().unwrap_or_else(|| document_name(&args.doc));
        let mut project = Project::new(name, args.doc.clone());
        project.save()?;
        println!("Created {}", args.doc.display());
        return Ok(());
    }

    let mut project = Project::open_or_create(args.doc.clone())?;
    if let Some(config_path) = &args.config {
        project.document.config = load_config(config_path)?;
    }

    if let Command::Show { json } = &args.command {
        if *json {
            println!("{}", serde_json::to_string_pretty(&project.document.nodes)?);
        } else {
            print_tree(&project.document.nodes);
        }
        return Ok(());
    }

    let storage = match &args.layout_db {
        Some(path) => Storage::open(path)
            .with_context(|| format!("opening layout store {}", path.display()))?,
        None => project.open_layout_store()?,
    };
    project.reconcile_layout_store(&storage)?;

    let mut session =
        EditorSession::with_cache(project.document.config.clone(), Box::new(storage));
    session.load_table(project.document.nodes.clone());
    session.set_viewport(project.document.viewport);

    let report = run(&mut session, args.command)?;
    print_report(&report);
    log_events(&session.bus().drain());

    project.document.nodes = session.into_table();
    project.save()?;
    Ok(())
}

fn run(session: &mut EditorSession, command: Command) -> Result<OperationReport> {
    let report = match command {
        Command::AddLeaf {
            label,
            provider,
            x,
            y,
        } => {
            let template = ResourceTemplate::new(label, provider);
            session.drop_new_resource(&template, Vec2::new(x, y))?
        }
        Command::AddGroup { provider, label } => {
            let mut report = session.create_empty_group(provider)?;
            if let (Some(label), Some(id)) = (label, report.created.clone()) {
                report.merge(session.rename(&id, &label)?);
            }
            report
        }
        Command::Group { ids } => session.group_nodes(&node_ids(ids))?,
        Command::Select { ids } => {
            if ids.is_empty() {
                session.clear_selection();
            } else {
                session.select(&node_ids(ids))?;
            }
            OperationReport::default()
        }
        Command::Ungroup { id } => session.ungroup(id.map(NodeId::from).as_ref())?,
        Command::Collapse { id } => session.toggle_collapse(&NodeId::from(id))?,
        Command::Resize { id, width, height } => {
            session.resize_group(&NodeId::from(id), Size::new(width, height))?
        }
        Command::Minimize { id } => session.minimize(&NodeId::from(id))?,
        Command::Restore { id } => session.restore(&NodeId::from(id))?,
        Command::Move { id, x, y } => session.move_node(&NodeId::from(id), Vec2::new(x, y))?,
        Command::Delete { ids, promote } => {
            let policy = if promote {
                ChildPolicy::Promote
            } else {
                ChildPolicy::Delete
            };
            session.delete(&node_ids(ids), policy)?
        }
        Command::Rename { id, label } => session.rename(&NodeId::from(id), &label)?,
        Command::Duplicate { id } => session.duplicate(&NodeId::from(id))?,
        Command::New { .. } | Command::Show { .. } => OperationReport::default(),
    };
    Ok(report)
}

fn node_ids(ids: Vec<String>) -> Vec<NodeId> {
    ids.into_iter().map(NodeId::from).collect()
}

fn document_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Diagram")
        .to_string()
}

fn load_config(path: &Path) -> Result<LayoutConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading layout config {}", path.display()))?;
    let config = serde_json::from_str(&content)
        .with_context(|| format!("parsing layout config {}", path.display()))?;
    Ok(config)
}

fn print_report(report: &OperationReport) {
    if let Some(id) = &report.created {
        println!("created {id}");
    }
    if !report.changed.is_empty() {
        println!("changed {}", join_ids(&report.changed));
    }
    if !report.removed.is_empty() {
        println!("removed {}", join_ids(&report.removed));
    }
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
}

fn log_events(events: &[Event]) {
    for event in events {
        debug!(?event, "Session event");
    }
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_tree(table: &NodeTable) {
    for node in table.iter().filter(|node| node.parent_id.is_none()) {
        print_node(table, &node.id, 0);
    }
}

fn print_node(table: &NodeTable, id: &NodeId, depth: usize) {
    let Some(node) = table.get(id) else {
        return;
    };
    let position = transform::to_absolute(table, id).unwrap_or(node.position);
    let kind = if node.is_group() {
        format!("group/{}", node.state())
    } else {
        "leaf".to_string()
    };
    let hidden = if node.is_visible() { "" } else { " hidden" };
    let selected = if node.selected { " selected" } else { "" };
    println!(
        "{indent}{id} [{kind}] {label:?} at ({x}, {y}) {w}x{h} {provider}{hidden}{selected}",
        indent = "  ".repeat(depth),
        label = node.label,
        x = position.x,
        y = position.y,
        w = node.size.width,
        h = node.size.height,
        provider = node.provider,
    );
    for child in table.children_of(id) {
        print_node(table, &child, depth + 1);
    }
}
