use anyhow::Result;
use clap::{Parser, Subcommand};
use dircache::areas::repository::Repository;
use dircache::commands::plumbing::update_index::UpdateIndexOptions;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "dircache",
    version = "0.1.0",
    author = "Sami Barbut-Dica",
    about = "A Git directory cache (index) tool",
    long_about = "This is an implementation of Git's directory cache, written in Rust. \
    It reads and writes the index file Git itself uses, \
    and offers the plumbing needed to stage, unstage and inspect entries.",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

OPTIONS:
    {all-args}
",
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        name = "init",
        about = "Initialize a new repository",
        long_about = "This command initializes a new repository in the current directory or at the specified path."
    )]
    Init {
        #[arg(index = 1, help = "The path to the repository")]
        path: Option<String>,
    },
    #[command(
        name = "hash-object",
        about = "Hash an object and optionally write it to the object database",
        long_about = "This command hashes an object file and can write it to the object database. \
        It requires the path to the file to be specified."
    )]
    HashObject {
        #[arg(short, long, required = false, help = "Write the object to the object database")]
        write: bool,
        #[arg(index = 1)]
        file: String,
    },
    #[command(
        name = "add",
        about = "Add file contents to the index",
        long_about = "This command stages files, expanding directories to the files below them."
    )]
    Add {
        #[arg(index = 1, required = true, help = "The paths to stage")]
        paths: Vec<String>,
    },
    #[command(
        name = "rm",
        about = "Remove files from the index",
        long_about = "This command unstages files. The working tree is never touched, so --cached is required."
    )]
    Rm {
        #[arg(long, required = true, help = "Only remove from the index")]
        cached: bool,
        #[arg(short, help = "Allow recursive removal of directories")]
        r: bool,
        #[arg(index = 1, required = true, help = "The paths to unstage")]
        paths: Vec<String>,
    },
    #[command(
        name = "update-index",
        about = "Register file contents in the working tree to the index",
        long_about = "This command edits index entries directly, from working tree files or from \
        explicit <mode>,<oid>,<path> triples."
    )]
    UpdateIndex {
        #[arg(long, help = "Stage files that are not in the index yet")]
        add: bool,
        #[arg(long, help = "Unstage listed files missing from the working tree")]
        remove: bool,
        #[arg(long = "force-remove", help = "Unstage listed files even if they still exist")]
        force_remove: bool,
        #[arg(long, value_name = "MODE,OID,PATH", help = "Insert the given entry directly")]
        cacheinfo: Vec<String>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=3), help = "Stage of --cacheinfo entries")]
        stage: Option<u8>,
        #[arg(index = 1)]
        paths: Vec<String>,
    },
    #[command(
        name = "ls-files",
        about = "Show information about files in the index",
        long_about = "This command lists the staged paths, optionally with their mode, object id and stage."
    )]
    LsFiles {
        #[arg(short, long, help = "Show mode, object id and stage of every entry")]
        stage: bool,
        #[arg(short, long, help = "Show only unmerged entries")]
        unmerged: bool,
    },
    #[command(
        name = "write-tree",
        about = "Create a tree object from the current index",
        long_about = "This command stores the staged entries as tree objects and prints the root tree id."
    )]
    WriteTree,
    #[command(
        name = "read-tree",
        about = "Read tree information into the index",
        long_about = "This command replaces the index with a tree, or grafts the tree under a prefix."
    )]
    ReadTree {
        #[arg(long, value_name = "DIR/", help = "Read the tree into this subdirectory")]
        prefix: Option<String>,
        #[arg(long, help = "Empty the index instead of reading a tree")]
        empty: bool,
        #[arg(index = 1)]
        tree: Option<String>,
    },
}

fn open_repository() -> Result<Repository> {
    let pwd = std::env::current_dir()?;
    Repository::new(&pwd.to_string_lossy(), Box::new(std::io::stdout()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries command output, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => {
            let mut repository = match path {
                Some(path) => Repository::new(&path, Box::new(std::io::stdout()))?,
                None => open_repository()?,
            };

            repository.init().await?
        }
        Commands::HashObject { write, file } => open_repository()?.hash_object(&file, write)?,
        Commands::Add { paths } => open_repository()?.add(&paths).await?,
        Commands::Rm { cached, r, paths } => {
            if !cached {
                anyhow::bail!("only --cached removal is supported");
            }

            open_repository()?.rm_cached(&paths, r).await?
        }
        Commands::UpdateIndex {
            add,
            remove,
            force_remove,
            cacheinfo,
            stage,
            paths,
        } => {
            let options = UpdateIndexOptions::new(add, remove, force_remove, cacheinfo, stage);

            open_repository()?.update_index(options, &paths).await?
        }
        Commands::LsFiles { stage, unmerged } => {
            open_repository()?.ls_files(stage, unmerged).await?
        }
        Commands::WriteTree => open_repository()?.write_tree().await?,
        Commands::ReadTree {
            prefix,
            empty,
            tree,
        } => {
            open_repository()?
                .read_tree(tree.as_deref(), prefix.as_deref(), empty)
                .await?
        }
    }

    Ok(())
}
