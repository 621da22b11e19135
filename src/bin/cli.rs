// Examsy administration CLI
// Runs the sync core against the store file and drives it through the dispatcher

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;

use examsy_sync::config::Config;
use examsy_sync::import;
use examsy_sync::model::{generate_id, ExamSession, Room, SessionPatch, Student, StudentPatch, StudentStatus};
use examsy_sync::session::{verify_proctor, verify_student};
use examsy_sync::{Command, ExamsyCore, SessionState};

#[derive(Parser)]
#[command(name = "examsy-cli")]
#[command(about = "Examsy data and session management tool", long_about = None)]
struct Cli {
    /// Store file (default: EXAMSY_STORE_FILE or ./examsy-store.json)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Credential file (default: EXAMSY_CREDENTIAL_FILE or ./examsy-auth.json)
    #[arg(long)]
    auth: Option<PathBuf>,

    /// Print sync logs
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListTarget {
    Students,
    Sessions,
    Rooms,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the student import template
    Template {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import students from a CSV file
    Import {
        file: PathBuf,
    },

    /// List documents of a collection
    List {
        #[arg(value_enum)]
        target: ListTarget,

        /// Filter students by name or NIS
        #[arg(short, long)]
        search: Option<String>,

        /// Filter students by room id
        #[arg(short, long)]
        room: Option<String>,
    },

    /// Add or overwrite a student
    AddStudent {
        #[arg(long)]
        nis: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "7")]
        class: String,
        #[arg(long)]
        room: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long, default_value = "NOT_STARTED")]
        status: String,
    },

    /// Create a room with its proctor account
    AddRoom {
        #[arg(long)]
        name: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value_t = 0)]
        capacity: u32,
    },

    /// Create an exam session (inactive until toggled)
    AddSession {
        #[arg(long)]
        name: String,
        #[arg(long)]
        class: String,
        #[arg(long)]
        pin: String,
        #[arg(long, default_value_t = 60)]
        duration: u32,
        #[arg(long, default_value = "")]
        pdf_url: String,
    },

    /// Flip a session between active and inactive
    ToggleSession {
        id: String,
    },

    /// Delete one student
    DeleteStudent {
        nis: String,
    },

    /// Delete several students one by one
    BulkDelete {
        #[arg(required = true)]
        nis: Vec<String>,
    },

    /// Set status and/or room on several students atomically
    BulkUpdate {
        #[arg(required = true)]
        nis: Vec<String>,
        #[arg(long)]
        status: Option<String>,
        /// Room id, or an empty string to clear
        #[arg(long)]
        room: Option<String>,
    },

    LoginAdmin {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    LoginProctor {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    /// Log a student into their exam
    LoginStudent {
        #[arg(long)]
        nis: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        pin: String,
        /// Finish the exam right after entering it
        #[arg(long)]
        finish: bool,
    },

    Logout,

    /// Show the current session
    Whoami,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(store) = cli.store.clone() {
        config.storage.store_file = store;
    }
    if let Some(auth) = cli.auth.clone() {
        config.storage.credential_file = auth;
    }
    if cli.verbose {
        config.init_tracing();
    }

    if let Commands::Template { output } = &cli.command {
        write_template(output.as_ref());
        return;
    }

    let core = match ExamsyCore::start(&config).await {
        Ok(core) => core,
        Err(e) => {
            println!("{} Cannot open store: {}", "✗".red(), e);
            std::process::exit(1);
        }
    };
    core.mirror.wait_all().await;

    let changed = run_command(&cli.command, &core, &config).await;

    core.shutdown();
    if changed {
        if let Err(e) = core.persist(&config).await {
            println!("{} Failed to save store: {}", "✗".red(), e);
            std::process::exit(1);
        }
    }
}

/// Returns whether the store may have changed
async fn run_command(command: &Commands, core: &ExamsyCore, config: &Config) -> bool {
    match command {
        Commands::Template { .. } => false,
        Commands::Import { file } => {
            import_students(core, config, file).await;
            true
        }
        Commands::List { target, search, room } => {
            list(core, *target, search.as_deref(), room.as_deref());
            false
        }
        Commands::AddStudent {
            nis,
            name,
            class,
            room,
            password,
            status,
        } => {
            let Some(status) = StudentStatus::parse_lenient(status) else {
                println!("{} Unknown status {}", "✗".red(), status);
                return false;
            };
            let student = Student {
                nis: nis.trim().to_string(),
                name: name.trim().to_uppercase(),
                class: class.clone(),
                room_id: room.clone().filter(|r| !r.is_empty()),
                password: password
                    .clone()
                    .unwrap_or_else(|| config.import.default_password.clone()),
                status,
                violations: 0,
            };
            report(core.dispatcher.dispatch(Command::AddStudent(student)).await, "Student saved");
            true
        }
        Commands::AddRoom {
            name,
            username,
            password,
            capacity,
        } => {
            let room = Room {
                id: generate_id(),
                name: name.clone(),
                username: username.clone(),
                password: password.clone(),
                capacity: *capacity,
            };
            let id = room.id.clone();
            report(
                core.dispatcher.dispatch(Command::AddRoom(room)).await,
                &format!("Room {} created", id),
            );
            true
        }
        Commands::AddSession {
            name,
            class,
            pin,
            duration,
            pdf_url,
        } => {
            let mut session = ExamSession::new(generate_id(), name.clone());
            session.class = class.clone();
            session.pin = pin.clone();
            session.duration_minutes = *duration;
            session.pdf_url = pdf_url.clone();
            let id = session.id.clone();
            report(
                core.dispatcher.dispatch(Command::AddSession(session)).await,
                &format!("Session {} created", id),
            );
            true
        }
        Commands::ToggleSession { id } => {
            let Some(session) = core.mirror.sessions().get(id).cloned() else {
                println!("{} Session {} not found", "✗".red(), id);
                return false;
            };
            let ok = core
                .dispatcher
                .dispatch(Command::UpdateSession {
                    id: id.clone(),
                    patch: SessionPatch::active(!session.is_active),
                })
                .await;
            let label = if session.is_active { "deactivated" } else { "activated" };
            report(ok, &format!("Session {} {}", id, label));
            true
        }
        Commands::DeleteStudent { nis } => {
            let ok = core
                .dispatcher
                .dispatch(Command::DeleteStudent { nis: nis.clone() })
                .await;
            report(ok, "Student deleted");
            true
        }
        Commands::BulkDelete { nis } => {
            let deleted = core.dispatcher.delete_students(nis).await;
            println!("{} {} of {} students deleted", "✓".green(), deleted, nis.len());
            true
        }
        Commands::BulkUpdate { nis, status, room } => {
            let mut updates = StudentPatch::default();
            if let Some(status) = status {
                match StudentStatus::parse_lenient(status) {
                    Some(s) => updates.status = Some(s),
                    None => {
                        println!("{} Unknown status {}", "✗".red(), status);
                        return false;
                    }
                }
            }
            if let Some(room) = room {
                updates.room_id = Some(Some(room.clone()).filter(|r| !r.is_empty()));
            }
            if updates.is_empty() {
                println!("{}", "Nothing to update: pass --status and/or --room".yellow());
                return false;
            }
            let ok = core
                .dispatcher
                .dispatch(Command::BulkUpdateStudents {
                    selected_ids: nis.clone(),
                    updates,
                })
                .await;
            report(ok, &format!("{} students updated", nis.len()));
            true
        }
        Commands::LoginAdmin { username, password } => {
            if !config.admin_matches(username, password) {
                println!("{} Invalid admin credentials", "✗".red());
                return false;
            }
            let result = core.session.lock().await.login_admin();
            match result {
                Ok(()) => println!("{} Logged in as ADMIN", "✓".green()),
                Err(e) => println!("{} {}", "✗".red(), e),
            }
            false
        }
        Commands::LoginProctor { username, password } => {
            let rooms = core.mirror.rooms();
            let room = match verify_proctor(&rooms, username, password) {
                Ok(room) => room.clone(),
                Err(e) => {
                    println!("{} {}", "✗".red(), e);
                    return false;
                }
            };
            let result = core.session.lock().await.login_proctor(&room);
            match result {
                Ok(()) => println!("{} Proctoring {} ({})", "✓".green(), room.name, room.id),
                Err(e) => println!("{} {}", "✗".red(), e),
            }
            false
        }
        Commands::LoginStudent {
            nis,
            password,
            pin,
            finish,
        } => {
            login_student(core, nis, password, pin, *finish).await;
            true
        }
        Commands::Logout => {
            let result = core.session.lock().await.logout();
            match result {
                Ok(()) => println!("{} Logged out", "✓".green()),
                Err(e) => println!("{} {}", "✗".red(), e),
            }
            false
        }
        Commands::Whoami => {
            let state = core.session.lock().await.state().clone();
            match &state {
                SessionState::Proctor { room_id } => println!(
                    "{} (room {})",
                    state.to_string().cyan(),
                    core.mirror.room_label(Some(room_id))
                ),
                other => println!("{}", other.to_string().cyan()),
            }
            false
        }
    }
}

fn report(ok: bool, success: &str) {
    if ok {
        println!("{} {}", "✓".green(), success);
    } else {
        println!("{} Operation failed, please retry", "✗".red());
    }
}

fn write_template(output: Option<&PathBuf>) {
    let content = import::template();
    match output {
        Some(path) => match std::fs::write(path, format!("\u{feff}{}\n", content)) {
            Ok(()) => println!("{} Template written to {}", "✓".green(), path.display()),
            Err(e) => println!("{} Cannot write template: {}", "✗".red(), e),
        },
        None => println!("{}", content),
    }
}

async fn import_students(core: &ExamsyCore, config: &Config, file: &PathBuf) {
    println!("{}", format!("Importing {}...", file.display()).cyan());

    let text = match import::read_file(file).await {
        Ok(text) => text,
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            return;
        }
    };

    let rooms = core.mirror.rooms();
    let report = import::run(&core.dispatcher, &text, &rooms, &config.import).await;

    println!("  Succeeded: {}", report.succeeded.to_string().green());
    println!("  Failed:    {}", report.failed.to_string().red());
    println!("  Skipped:   {}", report.skipped.to_string().yellow());
    for nis in &report.failed_nis {
        println!("    {} {}", "✗".red(), nis);
    }
}

fn list(core: &ExamsyCore, target: ListTarget, search: Option<&str>, room: Option<&str>) {
    match target {
        ListTarget::Students => {
            let students = core.mirror.filter_students(search.unwrap_or(""), room);
            println!("{}", format!("{} students", students.len()).cyan());
            for s in students {
                println!(
                    "  {:<10} {:<28} kelas {:<3} {:<12} {:<12} violations {}",
                    s.nis,
                    s.name,
                    s.class,
                    core.mirror.room_label(s.room()),
                    status_label(s.status),
                    s.violations
                );
            }
        }
        ListTarget::Sessions => {
            let sessions = core.mirror.sessions();
            println!("{}", format!("{} sessions", sessions.len()).cyan());
            for s in sessions.values() {
                let active = if s.is_active { "ACTIVE".green() } else { "INACTIVE".red() };
                println!(
                    "  {:<16} {:<24} kelas {:<3} pin {:<8} {} min {}",
                    s.id, s.name, s.class, s.pin, s.duration_minutes, active
                );
            }
        }
        ListTarget::Rooms => {
            let rooms = core.mirror.rooms();
            println!("{}", format!("{} rooms", rooms.len()).cyan());
            for r in rooms.values() {
                let assigned = core.mirror.students_in_room(&r.id).len();
                println!(
                    "  {:<16} {:<16} proctor {:<12} {}/{}",
                    r.id, r.name, r.username, assigned, r.capacity
                );
            }
        }
    }
}

fn status_label(status: StudentStatus) -> ColoredString {
    match status {
        StudentStatus::NotStarted => status.as_str().normal(),
        StudentStatus::InProgress => status.as_str().blue(),
        StudentStatus::Finished => status.as_str().green(),
        StudentStatus::Blocked => status.as_str().red(),
    }
}

async fn login_student(core: &ExamsyCore, nis: &str, password: &str, pin: &str, finish: bool) {
    let students = core.mirror.students();
    let sessions = core.mirror.sessions();
    let (student, session) = match verify_student(&students, &sessions, nis, password, pin) {
        Ok(found) => found,
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            return;
        }
    };

    let mut machine = core.session.lock().await;
    match machine.login_student(&core.dispatcher, student, session).await {
        Ok(true) => println!("{} {} entered {}", "✓".green(), student.name, session.name),
        Ok(false) => {
            println!("{} Login could not be processed, check your connection", "✗".red());
            return;
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            return;
        }
    }

    if finish {
        match machine.finish_exam(&core.dispatcher).await {
            Ok(true) => println!("{} Exam finished", "✓".green()),
            Ok(false) => println!("{} Exam closed, but the finish was not recorded", "⚠".yellow()),
            Err(e) => println!("{} {}", "✗".red(), e),
        }
    }
}
