pub mod disk;
pub mod memory;

use crate::core::error::StoreError;
use fjall::Keyspace;
use std::path::Path;
use tracing::debug;

/// Opens (creating if needed) the fjall keyspace that holds records and rates.
pub fn open_keyspace(path: &Path) -> Result<Keyspace, StoreError> {
    std::fs::create_dir_all(path)?;
    debug!("Opening keyspace at {}", path.display());
    Ok(fjall::Config::new(path).open()?)
}
