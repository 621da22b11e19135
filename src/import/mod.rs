//! CSV student import
//!
//! Column order is `nis,nama,kelas,ruang,password,status`; the first line is
//! a header. Rows missing a NIS or a name are skipped and never dispatched.
//! Every other row is sent as its own `ADD_STUDENT`, one after another, so a
//! failed row does not stop the rest.

use std::path::Path;

use crate::config::ImportConfig;
use crate::dispatch::{Command, Dispatcher};
use crate::error::{Result, SyncError};
use crate::mirror::{find_room_by_name, Mapping};
use crate::model::{Room, Student, StudentStatus};

pub const TEMPLATE_HEADER: &str = "NIS,NAMA,KELAS,RUANG,PASSWORD,STATUS";

const TEMPLATE_ROWS: [&str; 3] = [
    "123001,AHMAD JUNAIDI,7,RUANG 01,pass123,NOT_STARTED",
    "123002,SITI AMINAH,8,RUANG 02,pass456,NOT_STARTED",
    "123003,BUDI SETIAWAN,9,,user789,NOT_STARTED",
];

/// Rows ready for dispatch plus how many were skipped as malformed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedImport {
    pub students: Vec<Student>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failed_nis: Vec<String>,
}

/// Reads an import file as UTF-8 text
pub async fn read_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SyncError::ImportRead(format!("{}: {}", path.display(), e)))
}

/// Template file content offered to admins
pub fn template() -> String {
    let mut out = String::from(TEMPLATE_HEADER);
    for row in TEMPLATE_ROWS {
        out.push('\n');
        out.push_str(row);
    }
    out
}

pub fn parse(text: &str, rooms: &Mapping<Room>, defaults: &ImportConfig) -> ParsedImport {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut parsed = ParsedImport::default();

    let rows = text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .skip(1);

    for (index, line) in rows.enumerate() {
        match parse_row(line, rooms, defaults) {
            Some(student) => parsed.students.push(student),
            None => {
                tracing::debug!(row = index + 2, "Skipping import row without NIS or name");
                parsed.skipped += 1;
            }
        }
    }

    parsed
}

fn parse_row(line: &str, rooms: &Mapping<Room>, defaults: &ImportConfig) -> Option<Student> {
    let cols: Vec<&str> = line.split(',').map(str::trim).collect();
    let col = |i: usize| cols.get(i).copied().unwrap_or("");

    let (nis, name) = (col(0), col(1));
    if nis.is_empty() || name.is_empty() {
        return None;
    }

    let room_id = find_room_by_name(rooms, col(3)).map(|r| r.id.clone());

    let class = match col(2) {
        "" => defaults.default_class.clone(),
        class => class.to_string(),
    };
    let password = match col(4) {
        "" => defaults.default_password.clone(),
        password => password.to_string(),
    };

    Some(Student {
        nis: nis.to_string(),
        name: name.to_uppercase(),
        class,
        room_id,
        password,
        status: StudentStatus::parse_lenient(col(5)).unwrap_or_default(),
        violations: 0,
    })
}

/// Parses `text` and dispatches each valid row sequentially
pub async fn run(
    dispatcher: &Dispatcher,
    text: &str,
    rooms: &Mapping<Room>,
    defaults: &ImportConfig,
) -> ImportReport {
    let parsed = parse(text, rooms, defaults);
    let mut report = ImportReport {
        skipped: parsed.skipped,
        ..Default::default()
    };

    for student in parsed.students {
        let nis = student.nis.clone();
        if dispatcher.dispatch(Command::AddStudent(student)).await {
            report.succeeded += 1;
        } else {
            report.failed += 1;
            report.failed_nis.push(nis);
        }
    }

    tracing::info!(
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        "Student import finished"
    );
    report
}
