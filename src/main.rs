// Taskweave — Workflow automation engine in Rust
// License: Apache-2.0

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use taskweave::action::build_dispatcher;
use taskweave::config::Config;
use taskweave::prompt::PromptStore;
use taskweave::workflow::parser::parse_workflow_file;
use taskweave::workflow::{StepStatus, Workflow, WorkflowEngine, WorkflowStep, WorkflowStore};

const LOGO: &str = "🧵";

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "taskweave",
    about = "Taskweave — chain AI, issue tracker, document and mail actions into workflows",
    version
)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config file, workspace, default prompts and a sample workflow
    Init,
    /// List stored workflows
    List,
    /// Print a stored workflow definition
    Show { id: String },
    /// Validate a workflow file (JSON or YAML) and store it
    Import { file: PathBuf },
    /// Validate a workflow file without storing it
    Validate { file: PathBuf },
    /// Run a stored workflow
    Run {
        id: String,
        /// Input variable, repeatable: --var key=value (value parsed as JSON when possible)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
        /// Print the full execution result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage prompt templates
    Prompts {
        #[command(subcommand)]
        command: PromptCommands,
    },
    /// Show configuration, workspace and handler status
    Status,
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum PromptCommands {
    /// List prompt templates
    List,
    /// Print a prompt template
    Show { id: String },
    /// Delete a prompt template
    Delete { id: String },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    taskweave::logger::init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let outcome = match cli.command {
        Commands::Init => init_cmd(config_path).await,
        Commands::List => list_cmd(config_path).await,
        Commands::Show { id } => show_cmd(config_path, &id).await,
        Commands::Import { file } => import_cmd(config_path, &file).await,
        Commands::Validate { file } => validate_cmd(&file),
        Commands::Run { id, vars, json } => run_cmd(config_path, &id, &vars, json).await,
        Commands::Prompts { command } => prompts_cmd(config_path, command).await,
        Commands::Status => status_cmd(config_path).await,
        Commands::Version => {
            version_cmd();
            Ok(())
        }
    };

    if let Err(e) = outcome {
        eprintln!("{} Error: {:#}", LOGO, e);
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Workflow commands
// ---------------------------------------------------------------------------

async fn list_cmd(config_path: Option<&str>) -> anyhow::Result<()> {
    let cfg = load_config(config_path);
    let store = WorkflowStore::new(cfg.workflows_dir()?);
    let workflows = store.list().await?;

    if workflows.is_empty() {
        println!("No workflows found in {}", store.dir().display());
        return Ok(());
    }
    for wf in workflows {
        println!("  {:<24} {}", wf.id, wf.name);
        if !wf.description.is_empty() {
            println!("  {:<24} {}", "", wf.description);
        }
    }
    Ok(())
}

async fn show_cmd(config_path: Option<&str>, id: &str) -> anyhow::Result<()> {
    let cfg = load_config(config_path);
    let store = WorkflowStore::new(cfg.workflows_dir()?);
    let workflow = store.load(id).await?;
    println!("{}", serde_json::to_string_pretty(&workflow)?);
    Ok(())
}

async fn import_cmd(config_path: Option<&str>, file: &std::path::Path) -> anyhow::Result<()> {
    let cfg = load_config(config_path);
    let workflow = parse_workflow_file(file)?;
    let store = WorkflowStore::new(cfg.workflows_dir()?);
    let replaced = store.exists(&workflow.id).await;
    store.save(&workflow).await?;

    println!(
        "  ✅ {} workflow '{}' ({} steps)",
        if replaced { "Updated" } else { "Imported" },
        workflow.id,
        workflow.steps.len()
    );
    Ok(())
}

fn validate_cmd(file: &std::path::Path) -> anyhow::Result<()> {
    let workflow = parse_workflow_file(file)?;
    let plan = workflow.execution_plan()?;
    let order: Vec<&str> = plan.iter().map(|s| s.id.as_str()).collect();
    println!("  ✅ '{}' is valid", workflow.id);
    println!(
        "     mode: {}",
        if workflow.is_explicit_chain() { "explicit chain" } else { "sequential" }
    );
    println!("     order: {}", order.join(" → "));
    Ok(())
}

async fn run_cmd(
    config_path: Option<&str>,
    id: &str,
    vars: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let cfg = load_config(config_path);
    let initial = parse_vars(vars)?;

    let store = WorkflowStore::new(cfg.workflows_dir()?);
    let workflow = store.load(id).await?;

    let prompts = Arc::new(PromptStore::new(cfg.prompts_dir()?));
    let dispatcher = Arc::new(build_dispatcher(&cfg, Some(prompts))?);
    let engine = WorkflowEngine::new(dispatcher);

    let result = engine.execute(&workflow, initial).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{} Workflow '{}' — run {}", LOGO, result.workflow_id(), result.run_id());
        for step in result.steps() {
            match step.status {
                StepStatus::Succeeded => {
                    println!("  ✅ {} ({}ms)", step.step_id, step.duration_ms);
                    if let Some(output) = &step.output {
                        println!("     {}", preview(output));
                    }
                }
                StepStatus::Failed => {
                    println!("  ❌ {}", step.step_id);
                    if let Some(err) = &step.error {
                        println!("     {}", err.message);
                    }
                }
                StepStatus::Skipped => println!("  ⏭️  {} (skipped)", step.step_id),
            }
        }
    }

    if !result.is_success() {
        anyhow::bail!("workflow '{}' failed", result.workflow_id());
    }
    Ok(())
}

/// Parse `key=value` pairs; values that parse as JSON keep their type.
fn parse_vars(vars: &[String]) -> anyhow::Result<HashMap<String, Value>> {
    let mut out = HashMap::new();
    for pair in vars {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("invalid --var '{}', expected KEY=VALUE", pair))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        out.insert(key.trim().to_string(), value);
    }
    Ok(out)
}

fn preview(value: &Value) -> String {
    let text = taskweave::template::stringify(value);
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() > 100 || text.lines().nth(1).is_some() {
        format!("{}…", first_line.chars().take(100).collect::<String>())
    } else {
        first_line.to_string()
    }
}

// ---------------------------------------------------------------------------
// Prompt commands
// ---------------------------------------------------------------------------

async fn prompts_cmd(config_path: Option<&str>, command: PromptCommands) -> anyhow::Result<()> {
    let cfg = load_config(config_path);
    let store = PromptStore::new(cfg.prompts_dir()?);

    match command {
        PromptCommands::List => {
            for p in store.list().await? {
                println!("  {:<20} {} — {}", p.id, p.name, p.description);
            }
        }
        PromptCommands::Show { id } => {
            println!("{}", serde_json::to_string_pretty(&store.load(&id).await?)?);
        }
        PromptCommands::Delete { id } => {
            store.delete(&id).await?;
            println!("  🗑️  Deleted prompt template '{}'", id);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Init command
// ---------------------------------------------------------------------------

async fn init_cmd(config_path: Option<&str>) -> anyhow::Result<()> {
    println!("{} Taskweave init — setting up your workspace\n", LOGO);

    let path = resolve_config_path(config_path);
    let cfg = if path.exists() {
        println!("  ⏭️  Config already exists at {}", path.display());
        load_config(config_path)
    } else {
        let cfg = Config::default();
        cfg.save(&path)?;
        println!("  ✅ Config created at {}", path.display());
        cfg
    };

    let workflows_dir = cfg.workflows_dir()?;
    let prompts_dir = cfg.prompts_dir()?;
    std::fs::create_dir_all(&workflows_dir)?;
    std::fs::create_dir_all(&prompts_dir)?;

    for id in PromptStore::new(&prompts_dir).install_defaults().await? {
        println!("  ✅ Created prompt template {}", id);
    }

    let store = WorkflowStore::new(&workflows_dir);
    let sample = sample_workflow();
    if !store.exists(&sample.id).await {
        store.save(&sample).await?;
        println!("  ✅ Created sample workflow {}", sample.id);
    }

    println!("\n{} Setup complete!", LOGO);
    println!("\nNext steps:");
    println!("  1. Edit {} and add your API keys", path.display());
    println!(
        "  2. Run: taskweave run {} --var task=\"Rotate TLS certificates\"",
        sample.id
    );
    Ok(())
}

fn sample_workflow() -> Workflow {
    Workflow {
        schema_version: taskweave::workflow::SCHEMA_VERSION,
        id: "sop-to-issue".into(),
        name: "SOP to issue".into(),
        description: "Draft an SOP for a task and file it as an issue".into(),
        steps: vec![
            WorkflowStep::new("draft", "text-generation", "generate_sop")
                .with_param("task_description", "{{task}}")
                .then("file"),
            WorkflowStep::new("file", "issue-tracker", "create_issue")
                .with_param("repo_name", "{{repo}}")
                .with_param("title", "SOP: {{task}}")
                .with_param("body", "{{draft_output}}"),
        ],
        variables: HashMap::from([("repo".to_string(), Value::String("owner/repo".into()))]),
    }
}

// ---------------------------------------------------------------------------
// Other commands
// ---------------------------------------------------------------------------

fn version_cmd() {
    println!("{} Taskweave v{}", LOGO, taskweave::VERSION);
    println!("  Built with Rust 🦀");
}

async fn status_cmd(config_path: Option<&str>) -> anyhow::Result<()> {
    println!("{} Taskweave Status\n", LOGO);

    let path = resolve_config_path(config_path);
    let cfg = load_config(config_path);

    if path.exists() {
        println!("  Config:    ✅ {}", path.display());
    } else {
        println!("  Config:    ❌ Not found (run 'taskweave init')");
    }

    if let Err(e) = cfg.validate() {
        println!("  Config:    ❌ {}", e);
    }

    match cfg.workspace_path() {
        Ok(ws) if ws.exists() => println!("  Workspace: ✅ {}", ws.display()),
        Ok(ws) => println!("  Workspace: ❌ {} (not created)", ws.display()),
        Err(_) => println!("  Workspace: ❌ Could not resolve path"),
    }

    println!("  Model:     {}", cfg.text_generation.model);

    let configured = cfg.configured_integrations();
    let dispatcher = build_dispatcher(&cfg, None)?;
    println!("  Handlers:  {} registered", dispatcher.count());
    for (step_type, actions) in dispatcher.handlers() {
        let mark = if step_type == "transform" || configured.iter().any(|c| *c == step_type) {
            "✅"
        } else {
            "  "
        };
        println!("    {} {:<16} {}", mark, step_type, actions.join(", "));
    }

    let store = WorkflowStore::new(cfg.workflows_dir()?);
    println!("  Workflows: {}", store.list().await?.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_config_path(path: Option<&str>) -> PathBuf {
    if let Some(p) = path {
        PathBuf::from(p)
    } else {
        Config::default_path().unwrap_or_else(|_| PathBuf::from("config.json"))
    }
}

fn load_config(path: Option<&str>) -> Config {
    Config::load(&resolve_config_path(path)).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}, using defaults", e);
        Config::default()
    })
}
