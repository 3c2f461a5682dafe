//! todo - command-line client for the todo service.

mod commands;
mod transport;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use todo_sync::TodoId;
use tracing_subscriber::EnvFilter;

use crate::commands::{format_todo, App, Config, EditArgs};
use crate::transport::UreqTransport;

/// Manage your todo list from the terminal.
#[derive(Parser)]
#[command(name = "todo")]
#[command(about = "Command-line client for the todo service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the todo server
    #[arg(long, env = "TODO_SERVER_URL", default_value = "http://localhost:3000", global = true)]
    server: String,

    /// Where the session token is kept between invocations
    #[arg(long, env = "TODO_TOKEN_FILE", global = true)]
    token_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Register {
        username: String,
        #[arg(long, env = "TODO_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "")]
        email: String,
    },

    /// Log in and remember the session
    Login {
        username: String,
        #[arg(long, env = "TODO_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// End the session
    Logout,

    /// Show all todos, newest first
    List,

    /// Add a todo
    Add {
        /// Title of the new todo
        title: String,
    },

    /// Change a todo's title or completion
    Edit {
        /// Todo ID
        id: String,
        #[command(flatten)]
        changes: EditFlags,
    },

    /// Delete a todo
    Delete {
        /// Todo ID
        id: String,
    },
}

#[derive(Args)]
struct EditFlags {
    /// New title
    #[arg(long)]
    title: Option<String>,

    /// Mark as completed
    #[arg(long, conflicts_with = "undone")]
    done: bool,

    /// Mark as not completed
    #[arg(long)]
    undone: bool,
}

impl From<EditFlags> for EditArgs {
    fn from(flags: EditFlags) -> Self {
        let completed = match (flags.done, flags.undone) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        EditArgs {
            title: flags.title,
            completed,
        }
    }
}

fn default_token_file() -> Result<PathBuf> {
    let base = dirs::data_local_dir().context("could not determine a data directory; pass --token-file")?;
    Ok(base.join("todo-cli").join("token"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let token_file = match cli.token_file {
        Some(path) => path,
        None => default_token_file()?,
    };
    let config = Config {
        server: cli.server,
        token_file,
    };
    let mut app = App::new(&config, UreqTransport::new());

    match cli.command {
        Commands::Register {
            username,
            password,
            email,
        } => {
            app.register(&username, &password, &email)?;
            println!("Registered {username}. Run `todo login {username}` to start.");
        }
        Commands::Login { username, password } => {
            if app.is_authenticated() {
                tracing::debug!("replacing the current session");
            }
            app.login(&username, &password)?;
            println!("Logged in as {username}");
        }
        Commands::Logout => {
            if app.logout()? {
                println!("Logged out");
            } else {
                println!("Not logged in");
            }
        }
        Commands::List => {
            let todos = app.list()?;
            if todos.is_empty() {
                println!("No todos yet");
            }
            for todo in &todos {
                println!("{}", format_todo(todo));
            }
        }
        Commands::Add { title } => {
            let todo = app.add(&title)?;
            println!("{}", format_todo(&todo));
        }
        Commands::Edit { id, changes } => {
            let todo = app.edit(&TodoId::from(id), changes.into())?;
            println!("{}", format_todo(&todo));
        }
        Commands::Delete { id } => {
            let id = TodoId::from(id);
            app.delete(&id)?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}
