//! Opening the SQLite database that holds raw tables and layers.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use osmgis_core::store::{SqliteOsmStore, SqliteOsmStoreError};
use thiserror::Error;

/// Errors raised by [`open_database`].
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to create the parent directory of the database file.
    #[error("failed to create parent directory {path:?}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening the database failed.
    #[error(transparent)]
    Open(#[from] SqliteOsmStoreError),
}

/// Open (or create) the database at `path`, creating missing parent
/// directories first.
///
/// # Examples
/// ```no_run
/// use camino::Utf8Path;
/// use osmgis_data::open_database;
///
/// let store = open_database(Utf8Path::new("out/vannes.sqlite"))?;
/// # drop(store);
/// # Ok::<(), osmgis_data::DatabaseError>(())
/// ```
///
/// # Errors
/// Returns [`DatabaseError::CreateDirectory`] when the parent directory cannot
/// be created and [`DatabaseError::Open`] when SQLite rejects the file.
pub fn open_database(path: &Utf8Path) -> Result<SqliteOsmStore, DatabaseError> {
    ensure_parent_dir(path)?;
    Ok(SqliteOsmStore::open(path.as_std_path())?)
}

fn ensure_parent_dir(path: &Utf8Path) -> Result<(), DatabaseError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }
    let (base, relative) = match parent.strip_prefix("/") {
        Ok(relative) => ("/", relative),
        Err(_) => (".", parent),
    };
    let create_error = |source| DatabaseError::CreateDirectory {
        path: parent.to_path_buf(),
        source,
    };
    fs_utf8::Dir::open_ambient_dir(base, ambient_authority())
        .map_err(create_error)?
        .create_dir_all(relative)
        .map_err(create_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmgis_core::store::{OsmStore, RawSnapshot, TablePrefix};
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    fn creates_missing_parent_directories() {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        let path = root.join("nested/deeper/osm.sqlite");

        let mut store = open_database(&path).expect("database opens");
        let prefix = TablePrefix::new("osm").expect("prefix");
        store
            .load_raw(&prefix, &RawSnapshot::default())
            .expect("raw tables created");

        assert!(path.as_std_path().is_file());
    }

    #[rstest]
    fn reports_parent_that_is_a_file() {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        let blocker = root.join("blocker");
        std::fs::write(&blocker, b"not a directory").expect("write blocker");

        let err = open_database(&blocker.join("osm.sqlite")).expect_err("parent is a file");
        assert!(matches!(err, DatabaseError::CreateDirectory { .. }));
    }
}
