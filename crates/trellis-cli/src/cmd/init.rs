use anyhow::{Context as _, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use trellis_core::config::STORE_DIR;
use trellis_core::db::{migrations, open_store};

use super::Session;
use crate::output::{pretty_kv, render};

const CONFIG_TOML: &str = "[store]\n\
    # path = \".trellis/trellis.sqlite3\"\n\
    \n\
    [sync]\n\
    source = \"knowledge\"\n\
    # feed = \"projects.json\"\n\
    \n\
    [defaults]\n\
    owner_type = \"human\"\n\
    priority = \"medium\"\n\
    project_color = \"#6B7280\"\n";

#[derive(Debug, Serialize)]
struct InitReport {
    root: PathBuf,
    config: PathBuf,
    config_written: bool,
    db_path: PathBuf,
    schema_version: u32,
}

/// Execute `trellis init`. Creates the project skeleton:
///
/// ```text
/// .trellis/
///   config.toml       (written only when absent)
///   trellis.sqlite3   (or the configured store path)
/// ```
///
/// Safe to run again: an existing config is left alone and the store is
/// migrated in place.
///
/// # Errors
///
/// Returns an error if any filesystem or store operation fails.
pub fn run_init(session: &Session) -> Result<()> {
    let report = init_project(&session.root, &session.config.db_path)?;
    render(session.output, &report, |report, w| {
        if report.config_written {
            writeln!(w, "✓ Initialized {STORE_DIR}/ project structure.")?;
        } else {
            writeln!(w, "✓ {STORE_DIR}/ already initialized; store is up to date.")?;
        }
        writeln!(w)?;
        pretty_kv(w, "config", report.config.display().to_string())?;
        pretty_kv(w, "store", report.db_path.display().to_string())?;
        pretty_kv(w, "schema", format!("v{}", report.schema_version))?;
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  Set your identity (required for changes):")?;
        writeln!(w, "    export TRELLIS_ACTOR=your-name")?;
        writeln!(w)?;
        writeln!(w, "  Create your first task:")?;
        writeln!(w, "    trellis task add \"My first task\"")
    })
}

fn init_project(root: &Path, db_path: &Path) -> Result<InitReport> {
    let dir = root.join(STORE_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let config = dir.join("config.toml");
    let config_written = !config.exists();
    if config_written {
        std::fs::write(&config, CONFIG_TOML)
            .with_context(|| format!("Failed to write config: {}", config.display()))?;
    }

    let conn = open_store(db_path)?;
    let schema_version =
        migrations::current_schema_version(&conn).context("read schema version")?;

    Ok(InitReport {
        root: root.to_path_buf(),
        config,
        config_written,
        db_path: db_path.to_path_buf(),
        schema_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::config::{DB_FILE, load_project_config};
    use trellis_core::model::task::Priority;
    use trellis_core::OwnerType;

    #[test]
    fn fresh_init_creates_config_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join(STORE_DIR).join(DB_FILE);
        let report = init_project(dir.path(), &db).expect("init");

        assert!(report.config_written);
        assert!(db.is_file());
        assert_eq!(report.schema_version, migrations::LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn template_parses_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join(STORE_DIR).join(DB_FILE);
        init_project(dir.path(), &db).unwrap();
        let parsed = load_project_config(dir.path()).unwrap();
        assert_eq!(parsed.store.path, None);
        assert_eq!(parsed.sync.source, "knowledge");
        assert_eq!(parsed.sync.feed, None);
        assert_eq!(parsed.defaults.owner_type, OwnerType::Human);
        assert_eq!(parsed.defaults.priority, Priority::Medium);
        assert_eq!(parsed.defaults.project_color, "#6B7280");
    }

    #[test]
    fn reinit_keeps_edited_config() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join(STORE_DIR).join(DB_FILE);
        init_project(dir.path(), &db).unwrap();

        let config = dir.path().join(STORE_DIR).join("config.toml");
        std::fs::write(&config, "[sync]\nsource = \"notes\"\n").unwrap();

        let again = init_project(dir.path(), &db).unwrap();
        assert!(!again.config_written);
        assert_eq!(
            std::fs::read_to_string(&config).unwrap(),
            "[sync]\nsource = \"notes\"\n"
        );
    }
}
