//! Lazy, formatting-preserving access to a single `pyproject.toml`.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use toml_edit::{ArrayOfTables, DocumentMut, Item, Table, TableLike, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::format::TomlFormatter;

pub const FILE_NAME: &str = "pyproject.toml";

/// Returned by [`Manifest::persist`] when the file on disk was replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestChange {
    /// SHA-256 of the replaced content, `None` when the file was created.
    pub previous_hash: Option<String>,
}

/// A project manifest file.
///
/// The document is read on first access and cleared by [`persist`](Self::persist).
pub struct Manifest {
    path: PathBuf,
    document: Option<DocumentMut>,
    formatter: Arc<dyn TomlFormatter>,
}

impl Manifest {
    /// `path` may be the manifest file or the directory containing it.
    pub fn new(path: impl AsRef<Path>, formatter: Arc<dyn TomlFormatter>) -> Self {
        let path = path.as_ref();
        let path = if path.is_dir() {
            path.join(FILE_NAME)
        } else {
            path.to_path_buf()
        };
        Self {
            path,
            document: None,
            formatter,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the manifest.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn is_loaded(&self) -> bool {
        self.document.is_some()
    }

    /// Loads the document from disk on first call.
    pub fn load(&mut self) -> Result<&mut DocumentMut> {
        if self.document.is_none() {
            debug!("Reading: {}", self.path.display());
            let content = fs::read_to_string(&self.path).map_err(|e| Error::ManifestRead {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
            let document = content
                .parse::<DocumentMut>()
                .map_err(|e| Error::ManifestRead {
                    path: self.path.clone(),
                    message: e.to_string(),
                })?;
            self.document = Some(document);
        }
        self.document.as_mut().ok_or_else(|| Error::ManifestRead {
            path: self.path.clone(),
            message: "document unavailable".to_string(),
        })
    }

    /// Drops the in-memory document without writing it.
    pub fn unload(&mut self) {
        self.document = None;
    }

    /// `project.name`, if declared.
    pub fn name(&mut self) -> Result<Option<String>> {
        let Some(project) = self.table(&["project"], false)? else {
            return Ok(None);
        };
        Ok(project
            .get("name")
            .and_then(|name| name.as_str())
            .map(|name| name.to_string()))
    }

    /// Walks nested tables by `keys`.
    ///
    /// A missing or non-table intermediate yields `None`, unless `create` is
    /// set, in which case an empty table is put in its place.
    pub fn table(&mut self, keys: &[&str], create: bool) -> Result<Option<&mut dyn TableLike>> {
        let document = self.load()?;
        Ok(walk_tables(document.as_table_mut(), keys, create))
    }

    /// Writes the in-memory document back through the formatter.
    ///
    /// The file is replaced only when the formatted bytes differ from what is
    /// on disk; otherwise it is left untouched, modification time included.
    /// The in-memory document is cleared in every case.
    pub fn persist(&mut self, force_format: bool) -> Result<Option<ManifestChange>> {
        let document = self.document.take();
        if document.is_none() && !force_format {
            return Ok(None);
        }

        let original = match fs::read(&self.path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let content = match document {
            Some(mut document) => {
                debug!("Persisting: {}", self.path.display());
                prune(document.as_table_mut());
                document.to_string().into_bytes()
            }
            None => original.clone().ok_or_else(|| Error::ManifestRead {
                path: self.path.clone(),
                message: "nothing to format".to_string(),
            })?,
        };

        fs::create_dir_all(self.dir())?;
        let mut staged = tempfile::Builder::new()
            .prefix(".pyproject-")
            .suffix(".toml")
            .tempfile_in(self.dir())?;
        staged.write_all(&content)?;
        staged.flush()?;

        self.formatter.format(staged.path())?;

        let formatted = fs::read(staged.path())?;
        let previous_hash = original.as_deref().map(content_hash);
        if previous_hash.as_deref() == Some(content_hash(&formatted).as_str()) {
            debug!("File unchanged: {}", self.path.display());
            return Ok(None);
        }

        match fs::metadata(&self.path) {
            Ok(metadata) => fs::set_permissions(staged.path(), metadata.permissions())?,
            Err(_) => set_default_permissions(staged.path())?,
        }
        staged.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        debug!("File updated: {}", self.path.display());
        Ok(Some(ManifestChange { previous_hash }))
    }
}

impl fmt::Debug for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.document {
            Some(ref document) => document
                .get("project")
                .and_then(|project| project.get("name"))
                .and_then(|name| name.as_str())
                .unwrap_or("[UNKNOWN]"),
            None => "[UNLOADED]",
        };
        write!(f, "Manifest(name={} path={})", name, self.path.display())
    }
}

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(unix)]
fn set_default_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// See [`Manifest::table`].
pub fn walk_tables<'a>(
    root: &'a mut dyn TableLike,
    keys: &[&str],
    create: bool,
) -> Option<&'a mut dyn TableLike> {
    let mut current = root;
    for key in keys {
        let is_table = current.get(key).is_some_and(|item| item.is_table_like());
        if !is_table {
            if !create {
                return None;
            }
            let mut table = Table::new();
            table.set_implicit(true);
            current.insert(key, Item::Table(table));
        }
        current = current.get_mut(key)?.as_table_like_mut()?;
    }
    Some(current)
}

/// Removes empty tables and arrays at every depth.
///
/// Containers emptied by the removal of their children are removed too.
/// Scalars are never removed.
pub fn prune(table: &mut dyn TableLike) {
    let keys: Vec<String> = table.iter().map(|(key, _)| key.to_string()).collect();
    for key in keys {
        let empty = match table.get_mut(&key) {
            Some(item) => {
                prune_item(item);
                is_empty_item(item)
            }
            None => false,
        };
        if empty {
            table.remove(&key);
        }
    }
}

fn prune_item(item: &mut Item) {
    match item {
        Item::Table(table) => prune(table),
        Item::ArrayOfTables(tables) => prune_tables(tables),
        Item::Value(value) => prune_value(value),
        Item::None => {}
    }
}

fn prune_tables(tables: &mut ArrayOfTables) {
    for index in (0..tables.len()).rev() {
        let empty = match tables.get_mut(index) {
            Some(table) => {
                prune(table);
                table.is_empty()
            }
            None => false,
        };
        if empty {
            tables.remove(index);
        }
    }
}

fn prune_value(value: &mut Value) {
    match value {
        Value::Array(array) => {
            for index in (0..array.len()).rev() {
                let empty = match array.get_mut(index) {
                    Some(element) => {
                        prune_value(element);
                        is_empty_value(element)
                    }
                    None => false,
                };
                if empty {
                    array.remove(index);
                }
            }
        }
        Value::InlineTable(table) => prune(table),
        _ => {}
    }
}

fn is_empty_item(item: &Item) -> bool {
    match item {
        Item::Table(table) => table.is_empty(),
        Item::ArrayOfTables(tables) => tables.is_empty(),
        Item::Value(value) => is_empty_value(value),
        Item::None => false,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Array(array) => array.is_empty(),
        Value::InlineTable(table) => table.is_empty(),
        _ => false,
    }
}
