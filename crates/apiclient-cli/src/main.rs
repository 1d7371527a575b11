//! apiclient CLI: API request collections kept as plain files.
//!
//! Commands: init, status, tree, collection, folder, request, reorder,
//! env, export, import, watch, serve, completions

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn, Level};

use apiclient_core::paths::{COLLECTIONS_DIR, ENVIRONMENTS_DIR};
use apiclient_core::{
    Auth, Environment, HttpMethod, ItemKind, KeyValue, Node, RawLanguage, Request, RequestBody,
    RequestPatch, Variable, VariableKind,
};
use apiclient_mcp::ApiClientMcpService;
use apiclient_store::{CollectionStore, DocumentFormat, Storage, StorageWatcher, StoreConfig};

#[derive(Parser)]
#[command(name = "apiclient")]
#[command(version)]
#[command(about = "API request collections synced to plain files")]
struct Cli {
    /// Workspace root [default: $APICLIENT_ROOT, else the current directory]
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Workspace name recorded on first use [default: $APICLIENT_WORKSPACE, else the root's name]
    #[arg(long, global = true)]
    workspace_name: Option<String>,

    /// Log store activity to stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create workspace metadata and top-level directories
    Init,
    /// Workspace metadata and item counts
    Status,
    /// Print collection trees
    Tree {
        /// Only this collection
        collection: Option<String>,
        /// Print JSON instead of an indented outline
        #[arg(long)]
        json: bool,
    },
    /// Create, rename, delete and list collections
    #[command(subcommand)]
    Collection(CollectionCommand),
    /// Create, rename, delete and move folders
    #[command(subcommand)]
    Folder(FolderCommand),
    /// Create, show, update, rename, delete and move requests
    #[command(subcommand, alias = "req")]
    Request(RequestCommand),
    /// Move a child to another position among its siblings
    Reorder {
        collection: String,
        /// Owning folder path as "A/B" (omit for the collection root)
        #[arg(long)]
        folder: Option<String>,
        /// Which child list: folder or request
        kind: ItemKind,
        from: usize,
        to: usize,
    },
    /// Manage environments
    #[command(subcommand)]
    Env(EnvCommand),
    /// Write a collection as a JSON or YAML document
    Export {
        collection: String,
        /// Output file [default: stdout]
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Document format [default: from the output extension, else json]
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
    /// Add a collection from a JSON or YAML document
    Import { file: PathBuf },
    /// Reload collections as their files change, printing one JSON line per reload
    Watch {
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Serve the workspace read-only over MCP on stdio
    Serve,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum CollectionCommand {
    /// Create an empty collection
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Rename a collection, relocating its files
    Rename { name: String, new_name: String },
    /// Delete a collection and its files
    Delete { name: String },
    /// List collections with request counts
    List,
}

#[derive(Subcommand)]
enum FolderCommand {
    /// Append an empty folder
    Create {
        collection: String,
        name: String,
        /// Parent folder path as "A/B" (omit for the collection root)
        #[arg(long)]
        parent: Option<String>,
    },
    /// Rename the folder at PATH
    Rename {
        collection: String,
        path: String,
        new_name: String,
    },
    /// Delete the folder at PATH with everything below it
    Delete { collection: String, path: String },
    /// Move the folder at PATH under another parent
    Move {
        collection: String,
        path: String,
        /// Destination parent path (omit for the collection root)
        #[arg(long)]
        to: Option<String>,
    },
}

#[derive(Subcommand)]
enum RequestCommand {
    /// Append a new request
    Create {
        collection: String,
        name: String,
        #[arg(long)]
        folder: Option<String>,
        #[command(flatten)]
        fields: RequestFields,
    },
    /// Print a request as JSON
    Show {
        collection: String,
        name: String,
        #[arg(long)]
        folder: Option<String>,
    },
    /// Change a request's content; omitted fields are kept
    Update {
        collection: String,
        name: String,
        #[arg(long)]
        folder: Option<String>,
        #[command(flatten)]
        fields: RequestFields,
        /// Remove the body
        #[arg(long, conflicts_with = "body")]
        clear_body: bool,
        /// Remove the authorization
        #[arg(long, conflicts_with = "bearer")]
        clear_auth: bool,
    },
    /// Rename a request
    Rename {
        collection: String,
        name: String,
        new_name: String,
        #[arg(long)]
        folder: Option<String>,
    },
    /// Delete a request and its document
    Delete {
        collection: String,
        name: String,
        #[arg(long)]
        folder: Option<String>,
    },
    /// Move a request to another folder or collection
    Move {
        collection: String,
        name: String,
        #[arg(long)]
        folder: Option<String>,
        /// Destination collection [default: the same collection]
        #[arg(long)]
        to_collection: Option<String>,
        /// Destination folder path (omit for the collection root)
        #[arg(long)]
        to_folder: Option<String>,
    },
}

#[derive(clap::Args)]
struct RequestFields {
    /// HTTP method
    #[arg(short = 'X', long)]
    method: Option<HttpMethod>,
    /// URL template, may contain {{variables}}
    #[arg(long)]
    url: Option<String>,
    /// Header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Query parameter as "key=value" (repeatable)
    #[arg(long = "param")]
    params: Vec<String>,
    /// Raw body text
    #[arg(long)]
    body: Option<String>,
    /// Language hint for --body
    #[arg(long, value_enum, default_value_t = LanguageArg::Text)]
    language: LanguageArg,
    /// Bearer token sent as Authorization
    #[arg(long)]
    bearer: Option<String>,
    /// Script run before the request is sent
    #[arg(long)]
    pre_script: Option<String>,
    /// Script run after the response arrives
    #[arg(long)]
    post_script: Option<String>,
}

#[derive(Subcommand)]
enum EnvCommand {
    /// Create an environment
    Create {
        name: String,
        /// Plain variable as "key=value" (repeatable)
        #[arg(long = "var")]
        vars: Vec<String>,
        /// Secret variable as "key=value" (repeatable)
        #[arg(long = "secret")]
        secrets: Vec<String>,
    },
    /// Replace an environment's variables
    Set {
        name: String,
        #[arg(long = "var")]
        vars: Vec<String>,
        #[arg(long = "secret")]
        secrets: Vec<String>,
    },
    /// Rename an environment
    Rename { name: String, new_name: String },
    /// Delete an environment
    Delete { name: String },
    /// List environments, secrets masked
    List {
        #[arg(long)]
        show_secrets: bool,
    },
    /// Select the active environment; omit NAME to clear the selection
    Select { name: Option<String> },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Yaml,
}

impl From<FormatArg> for DocumentFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Json => DocumentFormat::Json,
            FormatArg::Yaml => DocumentFormat::Yaml,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LanguageArg {
    Json,
    Xml,
    Html,
    Javascript,
    Text,
}

impl From<LanguageArg> for RawLanguage {
    fn from(l: LanguageArg) -> Self {
        match l {
            LanguageArg::Json => RawLanguage::Json,
            LanguageArg::Xml => RawLanguage::Xml,
            LanguageArg::Html => RawLanguage::Html,
            LanguageArg::Javascript => RawLanguage::Javascript,
            LanguageArg::Text => RawLanguage::Text,
        }
    }
}

impl RequestFields {
    fn into_patch(self) -> Result<RequestPatch> {
        let headers = self
            .headers
            .iter()
            .map(|h| parse_pair(h, ':'))
            .collect::<Result<Vec<_>>>()?;
        let params = self
            .params
            .iter()
            .map(|p| parse_pair(p, '='))
            .collect::<Result<Vec<_>>>()?;
        let language = RawLanguage::from(self.language);
        Ok(RequestPatch {
            method: self.method,
            url: self.url,
            headers: (!headers.is_empty()).then_some(headers),
            params: (!params.is_empty()).then_some(params),
            body: self
                .body
                .map(|content| Some(RequestBody::Raw { content, language })),
            auth: self.bearer.map(|token| Some(Auth::Bearer { token })),
            pre_request_script: self.pre_script.map(Some),
            post_response_script: self.post_script.map(Some),
        })
    }
}

fn parse_pair(input: &str, separator: char) -> Result<KeyValue> {
    match input.split_once(separator) {
        Some((key, value)) if !key.trim().is_empty() => Ok(KeyValue::new(key.trim(), value.trim())),
        _ => bail!("expected \"key{separator}value\", got {input:?}"),
    }
}

fn variables(vars: &[String], secrets: &[String]) -> Result<Vec<Variable>> {
    let mut out = Vec::with_capacity(vars.len() + secrets.len());
    for var in vars {
        let pair = parse_pair(var, '=')?;
        out.push(Variable::plain(pair.key, pair.value));
    }
    for secret in secrets {
        let pair = parse_pair(secret, '=')?;
        out.push(Variable::secret(pair.key, pair.value));
    }
    Ok(out)
}

/// Split "A/B" into folder segments; `None` or "" is the collection root.
fn segments(path: Option<&str>) -> Vec<&str> {
    path.map(|p| p.split('/').filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn collection_json(store: &CollectionStore, name: &str) -> Result<()> {
    let collection = store
        .collection(name)
        .with_context(|| format!("collection '{name}' is not loaded"))?;
    print_json(&collection)
}

fn environment_json(env: &Environment, show_secrets: bool) -> serde_json::Value {
    let variables: Vec<serde_json::Value> = env
        .variables
        .iter()
        .map(|v| {
            let value = match v.kind {
                VariableKind::Secret if !show_secrets => "********",
                _ => v.value.as_str(),
            };
            serde_json::json!({
                "key": v.key,
                "value": value,
                "type": v.kind,
                "enabled": v.enabled,
            })
        })
        .collect();
    serde_json::json!({ "name": env.name, "variables": variables })
}

fn method_label(method: HttpMethod) -> String {
    format!("{method:?}").to_uppercase()
}

fn print_outline(node: &dyn Node, depth: usize) {
    let indent = depth * 2;
    for folder in node.folders() {
        println!("{:indent$}{}/", "", folder.name);
        print_outline(folder, depth + 1);
    }
    for request in node.requests() {
        println!(
            "{:indent$}{:<7} {}  {}",
            "",
            method_label(request.method),
            request.name,
            request.url
        );
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "apiclient", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = StoreConfig::from_env();
    if let Some(root) = cli.root {
        config = config.with_root(root);
    }
    if let Some(name) = cli.workspace_name {
        config = config.with_workspace_name(name);
    }

    if let Commands::Serve = cli.command {
        return serve(&config).await;
    }

    let store = CollectionStore::open_config(&config)
        .await
        .with_context(|| format!("failed to open workspace at {}", config.root.display()))?;

    match cli.command {
        Commands::Init => {
            store.storage().create_directory(COLLECTIONS_DIR).await?;
            store.storage().create_directory(ENVIRONMENTS_DIR).await?;
            let workspace = store.workspace();
            print_json(&serde_json::json!({
                "initialized": config.root.display().to_string(),
                "name": workspace.name,
                "version": workspace.version,
            }))?;
        }
        Commands::Status => {
            let workspace = store.workspace();
            let (collections, requests) =
                store.with_index(|index| (index.len(), index.total_requests()));
            print_json(&serde_json::json!({
                "root": config.root.display().to_string(),
                "name": workspace.name,
                "version": workspace.version,
                "created_at": workspace.created_at.to_rfc3339(),
                "updated_at": workspace.updated_at.to_rfc3339(),
                "selected_environment": workspace.selected_environment,
                "collections": collections,
                "requests": requests,
                "environments": store.environments().len(),
            }))?;
        }
        Commands::Tree { collection, json } => {
            let collections = match collection {
                Some(name) => vec![store
                    .collection(&name)
                    .with_context(|| format!("collection '{name}' not found"))?],
                None => store.collections().into_values().collect(),
            };
            if json {
                print_json(&collections)?;
            } else {
                for collection in &collections {
                    println!("{}", collection.name);
                    print_outline(collection, 1);
                }
            }
        }
        Commands::Collection(cmd) => run_collection(&store, cmd).await?,
        Commands::Folder(cmd) => run_folder(&store, cmd).await?,
        Commands::Request(cmd) => run_request(&store, cmd).await?,
        Commands::Reorder {
            collection,
            folder,
            kind,
            from,
            to,
        } => {
            store
                .reorder_items(&collection, &segments(folder.as_deref()), kind, from, to)
                .await?;
            collection_json(&store, &collection)?;
        }
        Commands::Env(cmd) => run_env(&store, cmd).await?,
        Commands::Export {
            collection,
            output,
            format,
        } => {
            let snapshot = store.export_collection(&collection)?;
            let format = match (format, &output) {
                (Some(f), _) => f.into(),
                (None, Some(path)) => DocumentFormat::from_path(path),
                (None, None) => DocumentFormat::Json,
            };
            let text = format.render(&snapshot)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, text)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    print_json(&serde_json::json!({
                        "exported": collection,
                        "path": path.display().to_string(),
                    }))?;
                }
                None => print!("{text}"),
            }
        }
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let collection = DocumentFormat::from_path(&file).parse(&text)?;
            let name = collection.name.clone();
            store.import_collection(collection).await?;
            collection_json(&store, &name)?;
        }
        Commands::Watch { seconds } => watch(&store, &config.root, seconds).await?,
        Commands::Serve | Commands::Completions { .. } => {}
    }
    Ok(())
}

async fn run_collection(store: &CollectionStore, cmd: CollectionCommand) -> Result<()> {
    match cmd {
        CollectionCommand::Create { name, description } => {
            let collection = store.create_collection(&name, description).await?;
            print_json(&collection)
        }
        CollectionCommand::Rename { name, new_name } => {
            store.rename_collection(&name, &new_name).await?;
            collection_json(store, &new_name)
        }
        CollectionCommand::Delete { name } => {
            store.delete_collection(&name).await?;
            print_json(&serde_json::json!({ "deleted": name }))
        }
        CollectionCommand::List => {
            let list: Vec<serde_json::Value> = store
                .collections()
                .values()
                .map(|c| {
                    serde_json::json!({
                        "name": c.name,
                        "description": c.description,
                        "requests": c.request_count(),
                    })
                })
                .collect();
            print_json(&list)
        }
    }
}

async fn run_folder(store: &CollectionStore, cmd: FolderCommand) -> Result<()> {
    match cmd {
        FolderCommand::Create {
            collection,
            name,
            parent,
        } => {
            store
                .create_folder(&collection, &segments(parent.as_deref()), &name)
                .await?;
            collection_json(store, &collection)
        }
        FolderCommand::Rename {
            collection,
            path,
            new_name,
        } => {
            store
                .rename_folder(&collection, &segments(Some(path.as_str())), &new_name)
                .await?;
            collection_json(store, &collection)
        }
        FolderCommand::Delete { collection, path } => {
            store
                .delete_folder(&collection, &segments(Some(path.as_str())))
                .await?;
            collection_json(store, &collection)
        }
        FolderCommand::Move {
            collection,
            path,
            to,
        } => {
            store
                .move_folder(
                    &collection,
                    &segments(Some(path.as_str())),
                    &segments(to.as_deref()),
                )
                .await?;
            collection_json(store, &collection)
        }
    }
}

async fn run_request(store: &CollectionStore, cmd: RequestCommand) -> Result<()> {
    match cmd {
        RequestCommand::Create {
            collection,
            name,
            folder,
            fields,
        } => {
            let mut request = Request::new(name, HttpMethod::default(), "");
            request.apply(fields.into_patch()?);
            let folders = segments(folder.as_deref());
            store
                .create_request(&collection, &folders, request.clone())
                .await?;
            print_json(&request)
        }
        RequestCommand::Show {
            collection,
            name,
            folder,
        } => {
            let request = store
                .get_request(&collection, &segments(folder.as_deref()), &name)
                .with_context(|| format!("request '{name}' not found"))?;
            print_json(&request)
        }
        RequestCommand::Update {
            collection,
            name,
            folder,
            fields,
            clear_body,
            clear_auth,
        } => {
            let mut patch = fields.into_patch()?;
            if clear_body {
                patch.body = Some(None);
            }
            if clear_auth {
                patch.auth = Some(None);
            }
            if patch.is_empty() {
                bail!("nothing to update; pass at least one field");
            }
            let request = store
                .update_request(&collection, &segments(folder.as_deref()), &name, patch)
                .await?;
            print_json(&request)
        }
        RequestCommand::Rename {
            collection,
            name,
            new_name,
            folder,
        } => {
            let folders = segments(folder.as_deref());
            store
                .rename_request(&collection, &folders, &name, &new_name)
                .await?;
            let request = store
                .get_request(&collection, &folders, &new_name)
                .with_context(|| format!("request '{new_name}' not found after rename"))?;
            print_json(&request)
        }
        RequestCommand::Delete {
            collection,
            name,
            folder,
        } => {
            store
                .delete_request(&collection, &segments(folder.as_deref()), &name)
                .await?;
            print_json(&serde_json::json!({ "deleted": name }))
        }
        RequestCommand::Move {
            collection,
            name,
            folder,
            to_collection,
            to_folder,
        } => {
            let target = to_collection.unwrap_or_else(|| collection.clone());
            store
                .move_request(
                    &collection,
                    &segments(folder.as_deref()),
                    &target,
                    &segments(to_folder.as_deref()),
                    &name,
                )
                .await?;
            collection_json(store, &target)
        }
    }
}

async fn run_env(store: &CollectionStore, cmd: EnvCommand) -> Result<()> {
    match cmd {
        EnvCommand::Create {
            name,
            vars,
            secrets,
        } => {
            let env = store
                .create_environment(&name, variables(&vars, &secrets)?)
                .await?;
            print_json(&environment_json(&env, false))
        }
        EnvCommand::Set {
            name,
            vars,
            secrets,
        } => {
            let env = store
                .update_environment(&name, variables(&vars, &secrets)?)
                .await?;
            print_json(&environment_json(&env, false))
        }
        EnvCommand::Rename { name, new_name } => {
            store.rename_environment(&name, &new_name).await?;
            print_json(&serde_json::json!({ "renamed": name, "to": new_name }))
        }
        EnvCommand::Delete { name } => {
            store.delete_environment(&name).await?;
            print_json(&serde_json::json!({ "deleted": name }))
        }
        EnvCommand::List { show_secrets } => {
            let list: Vec<serde_json::Value> = store
                .environments()
                .iter()
                .map(|env| environment_json(env, show_secrets))
                .collect();
            print_json(&list)
        }
        EnvCommand::Select { name } => {
            store.select_environment(name.as_deref()).await?;
            print_json(&serde_json::json!({ "selected_environment": name }))
        }
    }
}

async fn watch(store: &CollectionStore, root: &Path, seconds: Option<u64>) -> Result<()> {
    let watcher = StorageWatcher::start(root)?;
    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    info!(root = %root.display(), "watching for changes");

    while deadline.map_or(true, |d| Instant::now() < d) {
        let Some(first) =
            tokio::task::block_in_place(|| watcher.recv_timeout(Duration::from_millis(250)))
        else {
            continue;
        };
        // Coalesce a burst of events into one reload per collection.
        let mut keys = BTreeSet::new();
        let mut environments = false;
        for event in std::iter::once(first).chain(std::iter::from_fn(|| watcher.try_recv())) {
            match event.collection_key() {
                Some(key) => {
                    keys.insert(key.to_string());
                }
                None => environments |= event.is_environment(),
            }
        }

        if environments {
            match store.reload_all().await {
                Ok(()) => println!("{}", serde_json::json!({ "reloaded": "workspace" })),
                Err(e) => warn!(error = %e, "reload failed"),
            }
            continue;
        }
        for key in keys {
            match store.reload_key(&key).await {
                Ok(collection) => println!(
                    "{}",
                    serde_json::json!({ "reloaded": key, "collection": collection })
                ),
                Err(e) => warn!(key, error = %e, "reload failed"),
            }
        }
    }
    Ok(())
}

async fn serve(config: &StoreConfig) -> Result<()> {
    use rmcp::ServiceExt;

    let service = ApiClientMcpService::new(config.root.clone());
    let server = service
        .serve(rmcp::transport::stdio())
        .await
        .context("failed to start MCP server")?;
    server.waiting().await?;
    Ok(())
}
