use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use metalock::{LockError, LockRegistry, LockedOperation, MetaLock, NameLock};

use super::Auditor;

const PUBLIC_DOMAIN: &str = "PublicDomain";
const PERSONAL_DOMAIN: &str = "PersonalDomain";

#[derive(Debug, PartialEq)]
pub enum RecordError {
    Lock(LockError),
    EmptyValue(String),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Lock(err) => write!(f, "lock error: {}", err),
            RecordError::EmptyValue(key) => write!(f, "empty value for record {}", key),
        }
    }
}

impl std::error::Error for RecordError {}

impl From<LockError> for RecordError {
    fn from(value: LockError) -> Self {
        RecordError::Lock(value)
    }
}

/// A registry of domains and records whose writes must not interleave.
///
/// Every operation does a fixed amount of "work" between two audited
/// actions, so tests can tell serialized calls from overlapping ones.
pub struct DemoRegistryService {
    registry: Arc<LockRegistry>,
    auditor: Auditor,
    records: Mutex<HashMap<String, String>>,
    work: Duration,
    create_directory: LockedOperation,
    index_public: LockedOperation,
    index_personal: LockedOperation,
    backup: LockedOperation,
    save: LockedOperation,
    add_money: LockedOperation,
}

impl DemoRegistryService {
    pub fn new(work: Duration) -> Self {
        Self::with_registry(Arc::new(LockRegistry::new()), work)
    }

    pub fn with_registry(registry: Arc<LockRegistry>, work: Duration) -> Self {
        DemoRegistryService {
            registry,
            auditor: Auditor::new(),
            records: Mutex::new(HashMap::new()),
            work,
            create_directory: LockedOperation::new("create_directory", ["directory_name"])
                .with_name_lock(NameLock::new([PUBLIC_DOMAIN])),
            index_public: LockedOperation::new("index_public_domain", Vec::<String>::new())
                .with_name_lock(NameLock::new([PUBLIC_DOMAIN])),
            index_personal: LockedOperation::new("index_personal_domain", Vec::<String>::new())
                .with_name_lock(NameLock::new([PERSONAL_DOMAIN])),
            backup: LockedOperation::new("backup_domains", Vec::<String>::new())
                .with_name_lock(NameLock::new([PUBLIC_DOMAIN, PERSONAL_DOMAIN])),
            save: LockedOperation::new("save_record", ["record_key", "record_value"])
                .with_meta_lock(MetaLock::new("Record", ["record_key"])),
            add_money: LockedOperation::new(
                "add_money_for_user",
                ["first_name", "last_name", "amount"],
            )
            .with_meta_lock(MetaLock::new("User", ["first_name", "last_name"])),
        }
    }

    pub fn registry(&self) -> &LockRegistry {
        &self.registry
    }

    pub fn auditor(&self) -> &Auditor {
        &self.auditor
    }

    pub fn record(&self, key: &str) -> Option<String> {
        self.records.lock().unwrap().get(key).cloned()
    }

    fn work(&self) {
        thread::sleep(self.work);
    }

    pub fn create_directory_in_public_domain(&self, name: &str) {
        self.create_directory
            .call(&self.registry, &[Some(name)], || {
                self.auditor.log(format!("Creating Public {}", name));
                self.work();
                self.auditor.log(format!("Created Public {}", name));
            })
            .unwrap();
    }

    pub fn index_public_domain(&self) {
        self.index_public
            .call(&self.registry, &[] as &[Option<&str>], || {
                self.auditor.log("Indexing Public");
                self.work();
                self.auditor.log("Indexed Public");
            })
            .unwrap();
    }

    pub fn index_personal_domain(&self) {
        self.index_personal
            .call(&self.registry, &[] as &[Option<&str>], || {
                self.auditor.log("Indexing Personal");
                self.work();
                self.auditor.log("Indexed Personal");
            })
            .unwrap();
    }

    pub fn backup_domains(&self) {
        self.backup
            .call(&self.registry, &[] as &[Option<&str>], || {
                self.auditor.log("Backup started");
                self.work();
                self.auditor.log("Backup done");
            })
            .unwrap();
    }

    /// Insert or update a record. Empty values are rejected after the
    /// lookup, while the record's lock is held.
    pub fn save_record(&self, key: &str, value: &str) -> Result<(), RecordError> {
        self.save
            .try_call(&self.registry, &[Some(key), Some(value)], || {
                self.auditor.log(format!("Save select {}", key));
                let existing = self.record(key);
                self.work();

                if value.is_empty() {
                    self.auditor.log(format!("Save reject {}", key));
                    return Err(RecordError::EmptyValue(key.to_string()));
                }

                let verb = if existing.is_some() { "update" } else { "insert" };
                self.auditor.log(format!("Save {} {} {}", verb, key, value));
                self.records
                    .lock()
                    .unwrap()
                    .insert(key.to_string(), value.to_string());
                Ok(())
            })
    }

    pub fn add_money_for_user(&self, first_name: &str, last_name: &str, amount: u32) {
        let amount_arg = amount.to_string();
        self.add_money
            .call(
                &self.registry,
                &[Some(first_name), Some(last_name), Some(amount_arg.as_str())],
                || {
                    self.auditor.log(format!(
                        "Add {} money for {} {}",
                        amount, first_name, last_name
                    ));
                    self.work();
                    self.auditor.log(format!(
                        "Added {} money for {} {}",
                        amount, first_name, last_name
                    ));
                },
            )
            .unwrap();
    }
}
