use clap::{Args as ClapArgs, Parser, Subcommand};
use std::io::{self, BufReader};
use std::path::PathBuf;

use process_tracker::client::ApiClient;
use process_tracker::config::ServerConfig;
use process_tracker::dashboard::{self, print_instances, print_processes, print_stats};
use process_tracker::models::{CreateProcess, ListInstances, Role, UpdateProcess};
use process_tracker::popout::surface_opener;
use process_tracker::registry::users;
use process_tracker::session::Session;

#[derive(Parser, Debug)]
#[command(author, version, about = "Track time spent on repeatable processes")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Where the API lives and who is calling it
#[derive(ClapArgs, Debug)]
struct Connection {
    /// API base URL (overrides the session file)
    #[arg(long)]
    server: Option<String>,

    /// API token (overrides the session file)
    #[arg(long)]
    token: Option<String>,
}

impl Connection {
    fn session(self) -> Result<Session, Box<dyn std::error::Error>> {
        Session::from_flags(self.server, self.token).map_err(|e| e.to_string().into())
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Create a user and print its API token
    AddUser {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Role of the new user
        #[arg(short, long, value_enum, default_value = "user")]
        role: Role,
    },
    /// Show who the token belongs to
    Whoami {
        #[command(flatten)]
        connection: Connection,
    },
    /// List the processes visible to you
    Processes {
        #[command(flatten)]
        connection: Connection,
    },
    /// Define a new process, then enter its metadata fields
    CreateProcess {
        /// Process name
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Share with every user (admins only; ignored otherwise)
        #[arg(long)]
        official: bool,

        #[command(flatten)]
        connection: Connection,
    },
    /// Rename, re-describe or redefine the fields of a process
    EditProcess {
        /// Process id
        id: i64,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Enter the metadata fields again
        #[arg(long)]
        fields: bool,

        #[command(flatten)]
        connection: Connection,
    },
    /// Delete a process together with all of its instances
    DeleteProcess {
        /// Process id
        id: i64,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        #[command(flatten)]
        connection: Connection,
    },
    /// List your instances, newest first
    Instances {
        /// Only instances of this process
        #[arg(long)]
        process: Option<i64>,

        #[arg(long)]
        limit: Option<i64>,

        #[arg(long)]
        offset: Option<i64>,

        #[command(flatten)]
        connection: Connection,
    },
    /// Totals over your completed instances
    Stats {
        #[command(flatten)]
        connection: Connection,
    },
    /// Time instances of a process interactively
    Track {
        /// Process to track (prompted for when omitted)
        #[arg(long)]
        process: Option<i64>,

        /// Pop the timer out onto this terminal device (e.g. /dev/pts/3);
        /// Enter typed there stops the timer
        #[arg(long)]
        popout_tty: Option<PathBuf>,

        #[command(flatten)]
        connection: Connection,
    },
    /// Edit the metadata of a recorded instance
    EditInstance {
        /// Instance id
        id: i64,

        #[command(flatten)]
        connection: Connection,
    },
    /// Delete one of your instances
    DeleteInstance {
        /// Instance id
        id: i64,

        #[command(flatten)]
        connection: Connection,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match args.command {
        Command::Serve { config, port } => serve(config, port),
        Command::AddUser { config, name, role } => add_user(config, name, role),
        Command::Whoami { connection } => {
            let session = connection.session()?;
            let user = ApiClient::new().me(&session)?;
            println!("{} '{}' ({}) at {}", user.id, user.name, user.role.as_str(), session.server_url);
            Ok(())
        }
        Command::Processes { connection } => {
            let session = connection.session()?;
            let processes = ApiClient::new().list_processes(&session)?;
            print_processes(&processes, &mut io::stdout())?;
            Ok(())
        }
        Command::CreateProcess {
            name,
            description,
            official,
            connection,
        } => {
            let session = connection.session()?;
            let request = CreateProcess {
                name: Some(name),
                description,
                metadata_schema: None,
                is_official: Some(official),
            };
            dashboard::create_process(
                &ApiClient::new(),
                &session,
                request,
                &mut io::stdin().lock(),
                &mut io::stdout(),
            )?;
            Ok(())
        }
        Command::EditProcess {
            id,
            name,
            description,
            fields,
            connection,
        } => {
            let session = connection.session()?;
            let request = UpdateProcess {
                name,
                description,
                metadata_schema: None,
            };
            dashboard::edit_process(
                &ApiClient::new(),
                &session,
                id,
                request,
                fields,
                &mut io::stdin().lock(),
                &mut io::stdout(),
            )?;
            Ok(())
        }
        Command::DeleteProcess {
            id,
            yes,
            connection,
        } => {
            let session = connection.session()?;
            dashboard::delete_process(
                &ApiClient::new(),
                &session,
                id,
                yes,
                &mut io::stdin().lock(),
                &mut io::stdout(),
            )?;
            Ok(())
        }
        Command::Instances {
            process,
            limit,
            offset,
            connection,
        } => {
            let session = connection.session()?;
            let filter = ListInstances {
                process_id: process,
                limit,
                offset,
            };
            let instances = ApiClient::new().list_instances(&session, &filter)?;
            print_instances(&instances, &mut io::stdout())?;
            Ok(())
        }
        Command::Stats { connection } => {
            let session = connection.session()?;
            let stats = ApiClient::new().summary(&session)?;
            print_stats(&stats, &mut io::stdout())?;
            Ok(())
        }
        Command::Track {
            process,
            popout_tty,
            connection,
        } => {
            let session = connection.session()?;
            let surfaces = surface_opener(popout_tty);
            let completed = dashboard::track(
                &ApiClient::new(),
                &session,
                process,
                BufReader::new(io::stdin()),
                &mut io::stdout(),
                surfaces.as_deref(),
            )?;
            println!("{} instance(s) recorded", completed.len());
            Ok(())
        }
        Command::EditInstance { id, connection } => {
            let session = connection.session()?;
            dashboard::edit_instance(
                &ApiClient::new(),
                &session,
                id,
                &mut io::stdin().lock(),
                &mut io::stdout(),
            )?;
            Ok(())
        }
        Command::DeleteInstance { id, connection } => {
            let session = connection.session()?;
            let message = ApiClient::new().delete_instance(&session, id)?;
            println!("{}", message);
            Ok(())
        }
    }
}

fn serve(config_path: PathBuf, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::load(&config_path)?;
    if let Some(port) = port_override {
        config.api_port = port;
    }
    process_tracker::api::serve(&config)
}

fn add_user(config_path: PathBuf, name: String, role: Role) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load(&config_path)?;

    let rt = tokio::runtime::Runtime::new()?;
    let (user, token) = rt.block_on(async {
        let pool = process_tracker::db::open_and_init(&config.database_path)
            .await
            .map_err(|e| e.to_string())?;
        users::create(&pool, &name, role)
            .await
            .map_err(|e| e.to_string())
    })?;

    println!("Created user {} '{}' ({})", user.id, user.name, user.role.as_str());
    println!("API token: {}", token);
    Ok(())
}
