use std::path::PathBuf;

use crate::{prelude::*, tracker::EnergySnapshot};

/// Persistence boundary for the tracker state.
pub trait SnapshotStore {
    /// Load the last saved snapshot, `None` on the very first run.
    fn load(&self) -> Result<Option<EnergySnapshot>>;

    fn save(&mut self, snapshot: &EnergySnapshot) -> Result;
}

/// Snapshot kept as a pretty-printed JSON file.
#[must_use]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SnapshotStore for JsonFileStore {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    fn load(&self) -> Result<Option<EnergySnapshot>> {
        if !self.path.is_file() {
            info!("no saved snapshot");
            return Ok(None);
        }
        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read `{}`", self.path.display()))?;
        let snapshot = serde_json::from_str(&json)
            .with_context(|| format!("failed to deserialize `{}`", self.path.display()))?;
        Ok(Some(snapshot))
    }

    /// Write into a sibling file first and rename it over, so a crash never leaves a torn snapshot.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    fn save(&mut self, snapshot: &EnergySnapshot) -> Result {
        let json = serde_json::to_string_pretty(snapshot)?;
        let temporary_path = self.path.with_extension("json.tmp");
        std::fs::write(&temporary_path, json)
            .with_context(|| format!("failed to write `{}`", temporary_path.display()))?;
        std::fs::rename(&temporary_path, &self.path)
            .with_context(|| format!("failed to replace `{}`", self.path.display()))?;
        debug!("saved");
        Ok(())
    }
}

#[cfg(test)]
pub mod doubles {
    use super::*;

    #[derive(Default)]
    pub struct MemoryStore {
        pub snapshot: Option<EnergySnapshot>,
        pub n_saves: usize,
    }

    impl SnapshotStore for MemoryStore {
        fn load(&self) -> Result<Option<EnergySnapshot>> {
            Ok(self.snapshot.clone())
        }

        fn save(&mut self, snapshot: &EnergySnapshot) -> Result {
            self.snapshot = Some(snapshot.clone());
            self.n_saves += 1;
            Ok(())
        }
    }

    /// Loads nothing and fails every save.
    pub struct FailingStore;

    impl SnapshotStore for FailingStore {
        fn load(&self) -> Result<Option<EnergySnapshot>> {
            Ok(None)
        }

        fn save(&mut self, _snapshot: &EnergySnapshot) -> Result {
            bail!("disk is full")
        }
    }

    /// Holds a snapshot that cannot be read back.
    pub struct CorruptStore {
        pub n_saves: usize,
    }

    impl SnapshotStore for CorruptStore {
        fn load(&self) -> Result<Option<EnergySnapshot>> {
            bail!("expected value at line 1 column 1")
        }

        fn save(&mut self, _snapshot: &EnergySnapshot) -> Result {
            self.n_saves += 1;
            Ok(())
        }
    }
}
