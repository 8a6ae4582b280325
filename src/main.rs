//! libellus CLI - path-level access to a branch of a git repository

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use libellus::{Error, IoResultExt, Repo, Repository};

#[derive(Parser)]
#[command(name = "libellus")]
#[command(about = "list, read and commit single files in a git repository")]
#[command(version)]
struct Cli {
    /// repository path (bare, or a work tree containing .git)
    #[arg(short, long, global = true, default_value = ".")]
    repo: PathBuf,

    /// ref to operate on instead of the configured one
    #[arg(long = "ref", global = true, env = "LIBELLUS_REF")]
    ref_name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// initialize an empty bare repository
    Init {
        /// path to create repository at
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// list a directory
    Ls {
        /// directory path, root if omitted
        #[arg(default_value = "")]
        path: String,
    },

    /// print a file
    Cat {
        /// file path
        path: String,
    },

    /// commit a file, read from stdin unless --file is given
    Put {
        /// destination path in the tree
        path: String,

        /// commit message
        #[arg(short, long)]
        message: Option<String>,

        /// read contents from this file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// show first-parent history
    Log {
        /// maximum number of commits to show
        #[arg(short = 'n', long)]
        max_count: Option<usize>,
    },

    /// count objects in the store
    CountObjects,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn open(cli: &Cli) -> libellus::Result<Repository> {
    match &cli.ref_name {
        Some(ref_name) => Repository::open_ref(&cli.repo, ref_name),
        None => Repository::open(&cli.repo),
    }
}

fn run(cli: Cli) -> libellus::Result<()> {
    match &cli.command {
        Commands::Init { path } => {
            Repo::init(path)?;
            println!("initialized empty repository at {}", path.display());
        }

        Commands::Ls { path } => {
            let repository = open(&cli)?;
            let files = repository
                .list(path)?
                .ok_or_else(|| Error::PathNotFound(path.clone()))?;

            for file in files {
                let kind = if file.is_blob { "blob" } else { "tree" };
                println!("{} {}\t{}", kind, file.oid, file.name);
            }
        }

        Commands::Cat { path } => {
            let repository = open(&cli)?;
            let data = repository
                .read(path)?
                .ok_or_else(|| Error::PathNotFound(path.clone()))?;

            io::stdout().write_all(&data).with_path("stdout")?;
        }

        Commands::Put {
            path,
            message,
            file,
        } => {
            let repository = open(&cli)?;
            let contents = match file {
                Some(file) => std::fs::read(file).with_path(file)?,
                None => {
                    let mut buf = Vec::new();
                    io::stdin().read_to_end(&mut buf).with_path("stdin")?;
                    buf
                }
            };

            let message = message.clone().unwrap_or_else(|| format!("update {}\n", path));
            let oid = repository.commit(&message, path, &contents)?;
            println!("{}", oid);
        }

        Commands::Log { max_count } => {
            let repository = open(&cli)?;
            for entry in repository.log(*max_count)? {
                println!("{}", entry);
            }
        }

        Commands::CountObjects => {
            let repository = open(&cli)?;
            println!("{}", repository.count_objects()?);
        }
    }

    Ok(())
}
