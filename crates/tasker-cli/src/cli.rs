use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tasker")]
#[command(about = "Offline-first task and project tracker")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store remote connection settings
    Setup {
        /// Remote database URL (libsql://, https://)
        #[arg(long, value_name = "URL", required_unless_present = "clear")]
        url: Option<String>,
        /// Remote auth token
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
        /// Seconds between availability probes
        #[arg(long, value_name = "SECS")]
        probe_interval: Option<u64>,
        /// Seconds a single remote call may take
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Forget the remote store and work locally only
        #[arg(long, conflicts_with_all = ["url", "token"])]
        clear: bool,
    },
    /// Manage accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Log in and remember the session on this machine
    Login {
        /// Username
        username: String,
        /// Session lifetime in days
        #[arg(long, default_value = "30")]
        days: i64,
    },
    /// End the current session
    Logout,
    /// Show or change the current session
    Session {
        /// New session lifetime in days (restarts the expiry clock)
        #[arg(long)]
        days: Option<i64>,
        /// Resume this session automatically on later runs
        #[arg(long)]
        auto_login: Option<bool>,
    },
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Reconcile the local store with the remote store
    Sync {
        #[arg(long, value_enum, default_value_t = SyncDirection::Both)]
        direction: SyncDirection,
    },
    /// Show remote availability and pending changes
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a new account
    #[command(alias = "new")]
    Create {
        /// Username
        username: String,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a project
    #[command(alias = "new")]
    Add {
        /// Project name
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long, value_enum, default_value_t = PriorityArg::None)]
        priority: PriorityArg,
    },
    /// List projects
    #[command(alias = "ls")]
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a project by name
    Delete {
        /// Project name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Create a task
    #[command(alias = "new")]
    Add(AddTaskArgs),
    /// List tasks
    #[command(alias = "ls")]
    List {
        /// Only tasks in this project
        #[arg(short, long, value_name = "NAME")]
        project: Option<String>,
        /// Include finished tasks
        #[arg(short, long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change fields of a task
    Update(UpdateTaskArgs),
    /// Mark a task finished
    Done {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Delete a task
    Delete {
        /// Task ID or unique ID prefix
        id: String,
    },
}

#[derive(Args)]
pub struct AddTaskArgs {
    /// Task title
    pub title: String,
    #[arg(short, long, default_value = "")]
    pub description: String,
    /// Project name
    #[arg(short, long, value_name = "NAME")]
    pub project: Option<String>,
    #[arg(long, value_enum, default_value_t = PriorityArg::None)]
    pub priority: PriorityArg,
    /// Due date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub due: Option<String>,
    /// Estimated minutes of work
    #[arg(long, value_name = "MINUTES")]
    pub estimate: Option<i64>,
}

#[derive(Args)]
pub struct UpdateTaskArgs {
    /// Task ID or unique ID prefix
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(short, long)]
    pub description: Option<String>,
    #[arg(long, value_enum)]
    pub priority: Option<PriorityArg>,
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,
    /// Due date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", conflicts_with = "clear_due")]
    pub due: Option<String>,
    #[arg(long)]
    pub clear_due: bool,
    /// Assignee name
    #[arg(long, value_name = "NAME", conflicts_with = "unassign")]
    pub assign: Option<String>,
    #[arg(long)]
    pub unassign: bool,
    /// Estimated minutes of work
    #[arg(long, value_name = "MINUTES")]
    pub estimate: Option<i64>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PriorityArg {
    None,
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusArg {
    NotAssigned,
    Assigned,
    Active,
    Paused,
    Blocked,
    Testing,
    Finished,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SyncDirection {
    /// Push pending local changes, then pull remote changes
    Both,
    Push,
    Pull,
}
