use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn sqlkeep(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sqlkeep"))
        .args(args)
        .output()
        .expect("failed to run sqlkeep")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn s(path: &Path) -> &str {
    path.to_str().unwrap()
}

/// An empty file is a valid, empty SQLite database at user_version 0.
fn empty_seed(dir: &TempDir) -> PathBuf {
    let seed = dir.path().join("seed.db");
    fs::write(&seed, b"").unwrap();
    seed
}

fn write_script(dir: &TempDir, name: &str, sql: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, sql).unwrap();
    path
}

/// Installs an empty seed and creates a `notes` table in it.
fn prepared_db(dir: &TempDir) -> PathBuf {
    let db = dir.path().join("app.db");
    let seed = empty_seed(dir);
    assert!(sqlkeep(&["install", "--seed", s(&seed), "--db", s(&db)]).status.success());
    let script = write_script(
        dir,
        "schema.sql",
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT, pinned INTEGER);\n\
         INSERT INTO notes (body, pinned) VALUES ('first', 1);\n\
         INSERT INTO notes (body, pinned) VALUES (NULL, 0);",
    );
    assert!(sqlkeep(&["exec", "--db", s(&db), "--script", s(&script)]).status.success());
    db
}

// ---------------------------------------------------------------------------
// install
// ---------------------------------------------------------------------------

#[test]
fn test_install_copies_seed_once() {
    let dir = TempDir::new().unwrap();
    let seed = empty_seed(&dir);
    let db = dir.path().join("data/app.db");

    let first = sqlkeep(&["install", "--seed", s(&seed), "--db", s(&db)]);
    assert!(first.status.success());
    assert!(stdout(&first).contains("Installed"));
    assert!(db.exists());

    let second = sqlkeep(&["install", "--seed", s(&seed), "--db", s(&db)]);
    assert!(second.status.success());
    assert!(stdout(&second).contains("already present"));
}

#[test]
fn test_install_reads_seed_from_config() {
    let dir = TempDir::new().unwrap();
    let seed = empty_seed(&dir);
    let config = write_script(&dir, "db.yml", &format!("seed_path: {}\n", s(&seed)));
    let db = dir.path().join("app.db");

    let output = sqlkeep(&["--config", s(&config), "install", "--db", s(&db)]);
    assert!(output.status.success());
    assert!(db.exists());
}

#[test]
fn test_install_fails_without_seed() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("app.db");
    let output = sqlkeep(&["install", "--db", s(&db)]);
    assert!(!output.status.success());
    assert!(!db.exists());
}

// ---------------------------------------------------------------------------
// version / exec / query
// ---------------------------------------------------------------------------

#[test]
fn test_version_of_fresh_database_is_zero() {
    let dir = TempDir::new().unwrap();
    let db = prepared_db(&dir);
    let output = sqlkeep(&["version", "--db", s(&db)]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "0");
}

#[test]
fn test_version_of_missing_database_fails() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("absent.db");
    let output = sqlkeep(&["version", "--db", s(&db)]);
    assert!(!output.status.success());
    assert!(!db.exists(), "opening must never create a database");
}

#[test]
fn test_query_prints_table_with_nulls() {
    let dir = TempDir::new().unwrap();
    let db = prepared_db(&dir);
    let output = sqlkeep(&[
        "query",
        "--db",
        s(&db),
        "SELECT body, pinned FROM notes ORDER BY id",
    ]);
    assert!(output.status.success());
    let text = stdout(&output);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, vec!["body\tpinned", "first\t1", "NULL\t0"]);
}

#[test]
fn test_query_prints_json() {
    let dir = TempDir::new().unwrap();
    let db = prepared_db(&dir);
    let output = sqlkeep(&[
        "query",
        "--db",
        s(&db),
        "--format",
        "json",
        "SELECT body FROM notes ORDER BY id",
    ]);
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["body"], "first");
    assert!(rows[1]["body"].is_null());
}

#[test]
fn test_exec_in_transaction_rolls_back_on_failure() {
    let dir = TempDir::new().unwrap();
    let db = prepared_db(&dir);
    let script = write_script(
        &dir,
        "bad.sql",
        "INSERT INTO notes (body) VALUES ('third');\nINSERT INTO missing VALUES (1);",
    );
    let output = sqlkeep(&["exec", "--db", s(&db), "--script", s(&script), "--transaction"]);
    assert!(!output.status.success());

    let count = sqlkeep(&["query", "--db", s(&db), "SELECT COUNT(*) AS n FROM notes"]);
    assert_eq!(stdout(&count).lines().nth(1), Some("2"));
}

#[test]
fn test_exec_logs_failed_rollback() {
    let dir = TempDir::new().unwrap();
    let db = prepared_db(&dir);
    let script = write_script(
        &dir,
        "early_commit.sql",
        "INSERT INTO notes (body) VALUES ('third');\nCOMMIT;\nINSERT INTO missing VALUES (1);",
    );
    let output = Command::new(env!("CARGO_BIN_EXE_sqlkeep"))
        .args(["exec", "--db", s(&db), "--script", s(&script), "--transaction"])
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run sqlkeep");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Rollback after failed script"), "{stderr}");
}

#[test]
fn test_version_uses_global_config() {
    let dir = TempDir::new().unwrap();
    let db = prepared_db(&dir);

    let config = write_script(&dir, "db.yml", "schema_version: 5\nbusy_timeout_ms: 250\n");
    let output = sqlkeep(&["--config", s(&config), "version", "--db", s(&db)]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "0", "version must never migrate");

    let broken = write_script(&dir, "broken.yml", "busy_timeout_ms: [not, a, number]\n");
    let output = sqlkeep(&["--config", s(&broken), "version", "--db", s(&db)]);
    assert!(!output.status.success());
}

// ---------------------------------------------------------------------------
// migrate
// ---------------------------------------------------------------------------

#[test]
fn test_migrate_applies_each_version_script() {
    let dir = TempDir::new().unwrap();
    let db = prepared_db(&dir);
    let scripts = dir.path().join("migrations");
    fs::create_dir_all(&scripts).unwrap();
    fs::write(scripts.join("1.sql"), "ALTER TABLE notes ADD COLUMN created TEXT;").unwrap();
    fs::write(scripts.join("2.sql"), "CREATE TABLE tags (name TEXT);").unwrap();

    let output = sqlkeep(&[
        "migrate",
        "--db",
        s(&db),
        "--to",
        "2",
        "--script-dir",
        s(&scripts),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("from version 0 to 2"));

    let version = sqlkeep(&["version", "--db", s(&db)]);
    assert_eq!(stdout(&version).trim(), "2");

    let again = sqlkeep(&[
        "migrate",
        "--db",
        s(&db),
        "--to",
        "2",
        "--script-dir",
        s(&scripts),
    ]);
    assert!(again.status.success());
    assert!(stdout(&again).contains("Already at version 2"));
}

#[test]
fn test_migrate_failure_keeps_old_version() {
    let dir = TempDir::new().unwrap();
    let db = prepared_db(&dir);
    let scripts = dir.path().join("migrations");
    fs::create_dir_all(&scripts).unwrap();
    fs::write(scripts.join("1.sql"), "CREATE TABLE tags (name TEXT);").unwrap();
    // 2.sql is missing on purpose.

    let output = sqlkeep(&[
        "migrate",
        "--db",
        s(&db),
        "--to",
        "2",
        "--script-dir",
        s(&scripts),
    ]);
    assert!(!output.status.success());

    let version = sqlkeep(&["version", "--db", s(&db)]);
    assert_eq!(stdout(&version).trim(), "0");
    let tags = sqlkeep(&["query", "--db", s(&db), "SELECT * FROM tags"]);
    assert!(!tags.status.success(), "tags table must have been rolled back");
}

#[test]
fn test_migrate_refuses_downgrade() {
    let dir = TempDir::new().unwrap();
    let db = prepared_db(&dir);
    let scripts = dir.path().join("migrations");
    fs::create_dir_all(&scripts).unwrap();
    fs::write(scripts.join("1.sql"), "SELECT 1;").unwrap();
    fs::write(scripts.join("2.sql"), "SELECT 1;").unwrap();
    let up = sqlkeep(&["migrate", "--db", s(&db), "--to", "2", "--script-dir", s(&scripts)]);
    assert!(up.status.success());

    let down = sqlkeep(&["migrate", "--db", s(&db), "--to", "1", "--script-dir", s(&scripts)]);
    assert!(!down.status.success());
    assert!(String::from_utf8_lossy(&down.stderr).contains("newer than expected"));
}
