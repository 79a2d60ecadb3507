use std::{
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use linkshelf::entries::outline;
use linkshelf::opener::SystemOpener;
use linkshelf::resolve::display_path;
use linkshelf::shell::Session;
use linkshelf::{EntryKind, JsonFileStore, Operation, Shelf};

#[derive(Debug, Parser)]
#[command(
    name = "linkshelf",
    about = "Bookmarks organized in a tree of categories",
    version
)]
struct Cli {
    /// JSON document holding the shelf.
    #[arg(
        long,
        global = true,
        env = "LINKSHELF_FILE",
        default_value = "products.json"
    )]
    file: PathBuf,
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Interactive shell (the default).
    Shell,

    /// Print the entries of one category.
    List(ListArgs),

    /// Add a link to a category.
    Add(AddArgs),

    /// Create a category.
    Mkdir(MkdirArgs),

    /// Print the whole shelf as an outline.
    Tree,
}

#[derive(Debug, Args)]
struct ListArgs {
    /// Category path from the root, one name per argument.
    path: Vec<String>,
    /// Emit JSON instead of a numbered list.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct AddArgs {
    url: String,
    /// Optional description shown instead of the URL.
    #[arg(default_value = "")]
    description: String,
    /// Category path to add the link under.
    #[arg(long = "at", num_args = 1..)]
    at: Vec<String>,
}

#[derive(Debug, Args)]
struct MkdirArgs {
    name: String,
    /// Parent category path; the root when omitted.
    #[arg(long = "at", num_args = 1..)]
    at: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut shelf = Shelf::open(JsonFileStore::new(&cli.file));
    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => handle_shell(&mut shelf),
        Commands::List(args) => handle_list(&shelf, args),
        Commands::Add(args) => handle_add(&mut shelf, args),
        Commands::Mkdir(args) => handle_mkdir(&mut shelf, args),
        Commands::Tree => {
            print!("{}", outline(shelf.tree()));
            Ok(())
        }
    }
}

fn handle_shell(shelf: &mut Shelf<JsonFileStore>) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut session = Session::new(shelf, SystemOpener);
    session
        .run(&mut stdin.lock(), &mut stdout.lock())
        .context("running interactive shell")
}

fn handle_list(shelf: &Shelf<JsonFileStore>, args: ListArgs) -> Result<()> {
    let ListArgs { path, json } = args;
    let items = shelf.display_list(&path);

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        eprintln!("📭 {} is empty.", display_path(&path));
        return Ok(());
    }
    let mut out = io::stdout().lock();
    for (number, item) in items.iter().enumerate() {
        let marker = match item.kind {
            EntryKind::Category => "📁",
            EntryKind::Link => "🔗",
        };
        writeln!(out, "[{}] {marker} {}", number + 1, item.label)?;
    }
    Ok(())
}

fn handle_add(shelf: &mut Shelf<JsonFileStore>, args: AddArgs) -> Result<()> {
    let AddArgs {
        url,
        description,
        at,
    } = args;
    let applied = shelf
        .execute(&at, Operation::AddLink { url, description })
        .with_context(|| format!("adding link under {}", display_path(&at)))?;
    println!("{applied}");
    Ok(())
}

fn handle_mkdir(shelf: &mut Shelf<JsonFileStore>, args: MkdirArgs) -> Result<()> {
    let MkdirArgs { name, at } = args;
    let applied = shelf
        .execute(&at, Operation::AddCategory { name })
        .with_context(|| format!("creating category under {}", display_path(&at)))?;
    println!("{applied}");
    Ok(())
}
