//! Process-wide list of named distributor instances.
//!
//! The writer lock is taken only on insert and remove (construction and
//! teardown); everything else is a shared read. A poisoned lock surfaces to
//! the constructor as [`DistributorError::NoRegistry`](crate::DistributorError::NoRegistry).

use std::sync::{OnceLock, RwLock};

/// Descriptive record of a registered instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Registered instance name.
    pub name: String,
    /// Worker count the instance was created with.
    pub num_workers: usize,
    /// NUMA node the slot memory was requested on, if any.
    pub numa_node: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegisterError {
    /// The registry lock is poisoned.
    Unavailable,
    /// An instance with this name is already registered.
    Duplicate,
}

/// Name-keyed list of live instances.
pub struct Registry {
    entries: RwLock<Vec<InstanceInfo>>,
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry all instances register with.
pub fn global() -> &'static Registry {
    GLOBAL.get_or_init(Registry::new)
}

impl Registry {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, info: InstanceInfo) -> Result<(), RegisterError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| RegisterError::Unavailable)?;
        if entries.iter().any(|e| e.name == info.name) {
            return Err(RegisterError::Duplicate);
        }
        entries.push(info);
        Ok(())
    }

    pub(crate) fn unregister(&self, name: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|e| e.name != name);
        }
    }

    /// Looks up a registered instance by name.
    pub fn lookup(&self, name: &str) -> Option<InstanceInfo> {
        self.entries
            .read()
            .ok()?
            .iter()
            .find(|e| e.name == name)
            .cloned()
    }

    /// Names of all currently registered instances.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str) -> InstanceInfo {
        InstanceInfo {
            name: name.to_owned(),
            num_workers: 2,
            numa_node: None,
        }
    }

    #[test]
    fn register_lookup_unregister() {
        let reg = Registry::new();
        reg.register(info("alpha")).unwrap();
        assert_eq!(reg.lookup("alpha").unwrap().num_workers, 2);
        assert!(reg.lookup("beta").is_none());

        reg.unregister("alpha");
        assert!(reg.lookup("alpha").is_none());
    }

    #[test]
    fn duplicate_names_rejected() {
        let reg = Registry::new();
        reg.register(info("dup")).unwrap();
        assert_eq!(reg.register(info("dup")), Err(RegisterError::Duplicate));
        // The original registration survives the rejected attempt.
        assert_eq!(reg.names(), vec!["dup".to_owned()]);
    }
}
