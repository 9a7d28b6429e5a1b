//! Journal storage: the trait and a file-backed implementation.
//!
//! Entries are JSON files grouped by organization and date:
//! ```text
//! {root}/
//!   {organization_id}/
//!     HEAD                 content hash of the latest entry
//!     2024/
//!       01/
//!         15/
//!           {entry_id}.json
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use netguard_core::OrgId;

use crate::error::{JournalError, Result};
use crate::session::JournalSession;
use crate::{EntryId, JournalEntry};

const HEAD_FILE: &str = "HEAD";

/// Filters for [`JournalStore::list`].
#[derive(Debug, Default)]
pub struct JournalQuery {
    pub organization_id: Option<OrgId>,
    pub component: Option<String>,
    /// Only entries started at or after this time.
    pub from: Option<DateTime<Utc>>,
    /// Only entries started at or before this time.
    pub to: Option<DateTime<Utc>>,
}

/// Outcome of a successful chain verification.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainReport {
    pub organization_id: OrgId,
    pub entries: usize,
    pub head: Option<String>,
}

pub trait JournalStore: Send + Sync {
    /// Seal the session after the organization's current head and persist it.
    fn append(&self, session: JournalSession) -> Result<JournalEntry>;

    /// Retrieve an entry, verifying its content hash.
    fn get(&self, org: &OrgId, id: EntryId) -> Result<JournalEntry>;

    /// Entries matching the query, newest first.
    fn list(&self, query: &JournalQuery) -> Result<Vec<JournalEntry>>;

    /// Content hash of the organization's latest entry.
    fn head(&self, org: &OrgId) -> Result<Option<String>>;

    /// Walk the chain from HEAD, checking every hash and every link, and
    /// that no stored entry is unreachable.
    fn verify_chain(&self, org: &OrgId) -> Result<ChainReport>;
}

pub struct FileJournalStore {
    root: PathBuf,
    append_lock: Mutex<()>,
}

impl FileJournalStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            append_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn org_dir(&self, org: &OrgId) -> PathBuf {
        self.root.join(org.0.to_string())
    }

    fn head_path(&self, org: &OrgId) -> PathBuf {
        self.org_dir(org).join(HEAD_FILE)
    }

    fn entry_path(&self, entry: &JournalEntry) -> PathBuf {
        let date = entry.started_at.format("%Y/%m/%d");
        self.org_dir(&entry.organization_id)
            .join(format!("{}/{}.json", date, entry.id.0))
    }

    fn find_path(&self, org: &OrgId, id: EntryId) -> Result<PathBuf> {
        let filename = format!("{}.json", id.0);
        find_file_recursive(&self.org_dir(org), &filename).ok_or(JournalError::NotFound(id))
    }

    fn write_head(&self, org: &OrgId, hash: &str) -> Result<()> {
        let path = self.head_path(org);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, hash)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn org_entries(&self, org: &OrgId) -> Result<Vec<JournalEntry>> {
        let query = JournalQuery {
            organization_id: Some(*org),
            ..Default::default()
        };
        let mut entries = Vec::new();
        collect_entries_recursive(&self.org_dir(org), &query, &mut entries)?;
        Ok(entries)
    }
}

impl JournalStore for FileJournalStore {
    fn append(&self, session: JournalSession) -> Result<JournalEntry> {
        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let org = session.organization_id();
        let previous = self.head(&org)?;
        let entry = session.finalize(previous);
        let hash = entry
            .content_hash
            .clone()
            .ok_or(JournalError::NotFinalized)?;

        let path = self.entry_path(&entry);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(&entry)?)?;
        self.write_head(&org, &hash)?;

        tracing::debug!(
            entry_id = %entry.id,
            org = %org,
            path = %path.display(),
            "Journal entry appended"
        );
        Ok(entry)
    }

    fn get(&self, org: &OrgId, id: EntryId) -> Result<JournalEntry> {
        let path = self.find_path(org, id)?;
        let entry: JournalEntry = serde_json::from_str(&fs::read_to_string(&path)?)?;
        if !entry.verify_integrity() {
            return Err(JournalError::IntegrityViolation(id));
        }
        Ok(entry)
    }

    fn list(&self, query: &JournalQuery) -> Result<Vec<JournalEntry>> {
        let dir = match &query.organization_id {
            Some(org) => self.org_dir(org),
            None => self.root.clone(),
        };
        let mut results = Vec::new();
        collect_entries_recursive(&dir, query, &mut results)?;
        results.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(results)
    }

    fn head(&self, org: &OrgId) -> Result<Option<String>> {
        match fs::read_to_string(self.head_path(org)) {
            Ok(raw) => {
                let hash = raw.trim();
                Ok((!hash.is_empty()).then(|| hash.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn verify_chain(&self, org: &OrgId) -> Result<ChainReport> {
        let entries = self.org_entries(org)?;
        let broken = |detail: String| JournalError::BrokenChain {
            organization_id: *org,
            detail,
        };

        let mut by_hash: HashMap<String, &JournalEntry> = HashMap::new();
        for entry in &entries {
            if !entry.verify_integrity() {
                return Err(JournalError::IntegrityViolation(entry.id));
            }
            if let Some(hash) = &entry.content_hash {
                by_hash.insert(hash.clone(), entry);
            }
        }

        let Some(head) = self.head(org)? else {
            if entries.is_empty() {
                return Ok(ChainReport {
                    organization_id: *org,
                    entries: 0,
                    head: None,
                });
            }
            return Err(broken(format!("{} entries but no HEAD", entries.len())));
        };

        let mut visited = 0usize;
        let mut cursor = head.clone();
        loop {
            let entry = by_hash
                .get(&cursor)
                .ok_or_else(|| broken(format!("no entry with hash {cursor}")))?;
            visited += 1;
            if visited > entries.len() {
                return Err(broken("chain loops back on itself".to_string()));
            }
            match &entry.previous_hash {
                Some(previous) => cursor = previous.clone(),
                None => break,
            }
        }

        if visited != entries.len() {
            return Err(broken(format!(
                "{} entries are not reachable from HEAD",
                entries.len() - visited
            )));
        }

        Ok(ChainReport {
            organization_id: *org,
            entries: visited,
            head: Some(head),
        })
    }
}

fn find_file_recursive(dir: &Path, filename: &str) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }

    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_file_recursive(&path, filename) {
                return Some(found);
            }
        } else if path.file_name().and_then(|n| n.to_str()) == Some(filename) {
            return Some(path);
        }
    }

    None
}

fn collect_entries_recursive(
    dir: &Path,
    query: &JournalQuery,
    results: &mut Vec<JournalEntry>,
) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_entries_recursive(&path, query, results)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let journal_entry: JournalEntry = serde_json::from_str(&fs::read_to_string(&path)?)?;
            if matches_query(&journal_entry, query) {
                results.push(journal_entry);
            }
        }
    }

    Ok(())
}

fn matches_query(entry: &JournalEntry, query: &JournalQuery) -> bool {
    if let Some(org) = &query.organization_id {
        if &entry.organization_id != org {
            return false;
        }
    }
    if let Some(component) = &query.component {
        if &entry.component != component {
            return false;
        }
    }
    if let Some(from) = &query.from {
        if &entry.started_at < from {
            return false;
        }
    }
    if let Some(to) = &query.to {
        if &entry.started_at > to {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(org: OrgId, component: &str) -> JournalSession {
        let mut session = JournalSession::new(org, component, "Scan 10.0.0.0/24");
        session.set_context(serde_json::json!({"target": "10.0.0.0/24"}));
        session.add_decision("standard profile", "configured", 1.0);
        session.add_step(
            "network_scan",
            "Scanned 254 addresses",
            serde_json::json!({"hosts_up": 7}),
            true,
        );
        session
    }

    #[test]
    fn append_and_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJournalStore::new(dir.path()).unwrap();
        let org = OrgId::new();

        let entry = store.append(session(org, "netguard-discover")).unwrap();
        let retrieved = store.get(&org, entry.id).unwrap();

        assert_eq!(retrieved, entry);
        assert_eq!(retrieved.previous_hash, None);
        assert_eq!(store.head(&org).unwrap(), entry.content_hash);

        // Stored under the organization's dated directory.
        let path = store.find_path(&org, entry.id).unwrap();
        assert!(path.starts_with(dir.path().join(org.0.to_string())));
    }

    #[test]
    fn entries_chain_per_organization() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJournalStore::new(dir.path()).unwrap();
        let org = OrgId::new();
        let other = OrgId::new();

        let first = store.append(session(org, "netguard-discover")).unwrap();
        let unrelated = store.append(session(other, "netguard-discover")).unwrap();
        let second = store.append(session(org, "netguard-anomaly")).unwrap();

        assert_eq!(second.previous_hash, first.content_hash);
        assert_eq!(unrelated.previous_hash, None);

        let report = store.verify_chain(&org).unwrap();
        assert_eq!(report.entries, 2);
        assert_eq!(report.head, second.content_hash);
        assert_eq!(store.verify_chain(&other).unwrap().entries, 1);
    }

    #[test]
    fn tampering_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJournalStore::new(dir.path()).unwrap();
        let org = OrgId::new();
        let entry = store.append(session(org, "netguard-discover")).unwrap();
        store.append(session(org, "netguard-discover")).unwrap();

        let path = store.find_path(&org, entry.id).unwrap();
        let mut tampered: JournalEntry =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        tampered.intent = "Nothing to see here".to_string();
        fs::write(&path, serde_json::to_string_pretty(&tampered).unwrap()).unwrap();

        assert!(matches!(
            store.get(&org, entry.id),
            Err(JournalError::IntegrityViolation(_))
        ));
        assert!(matches!(
            store.verify_chain(&org),
            Err(JournalError::IntegrityViolation(_))
        ));
    }

    #[test]
    fn deleted_entry_breaks_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJournalStore::new(dir.path()).unwrap();
        let org = OrgId::new();
        store.append(session(org, "netguard-discover")).unwrap();
        let middle = store.append(session(org, "netguard-discover")).unwrap();
        store.append(session(org, "netguard-discover")).unwrap();

        fs::remove_file(store.find_path(&org, middle.id).unwrap()).unwrap();
        assert!(matches!(
            store.verify_chain(&org),
            Err(JournalError::BrokenChain { .. })
        ));
    }

    #[test]
    fn empty_journal_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJournalStore::new(dir.path()).unwrap();
        let report = store.verify_chain(&OrgId::new()).unwrap();
        assert_eq!(report.entries, 0);
        assert_eq!(report.head, None);
    }

    #[test]
    fn list_filters_by_org_and_component() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJournalStore::new(dir.path()).unwrap();
        let org = OrgId::new();

        store.append(session(org, "netguard-discover")).unwrap();
        store.append(session(org, "netguard-anomaly")).unwrap();
        store.append(session(OrgId::new(), "netguard-discover")).unwrap();

        let all = store.list(&JournalQuery::default()).unwrap();
        assert_eq!(all.len(), 3);

        let scans = store
            .list(&JournalQuery {
                organization_id: Some(org),
                component: Some("netguard-discover".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].organization_id, org);
    }
}
