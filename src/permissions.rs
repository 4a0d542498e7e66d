//! Access control and write-through persistence shared by files and tags.
//!
//! `PermissionedDocument` answers read/write questions from a record's access
//! lists. `SyncableDocument` adds the changelog and the write-through `sync`
//! against the metadata store. Checks run here, before any store call.

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::error::{PodaciError, Result};
use crate::filesystem::FileSystem;
use crate::identity::Principal;
use crate::index::{DocKind, UpdateOutcome};
use crate::records::{insert_unique, remove_value, AccessControl, ChangelogEntry};

pub trait PermissionedDocument {
    fn access(&self) -> &AccessControl;
    fn access_mut(&mut self) -> &mut AccessControl;

    fn has_read_access(&self, user: &Principal) -> bool { self.access().can_read(&user.user_id) }

    fn has_write_access(&self, user: &Principal) -> bool { self.access().can_write(&user.user_id) }
}

pub trait SyncableDocument: PermissionedDocument {
    const KIND: DocKind;

    fn id(&self) -> Option<&str>;
    fn fs(&self) -> &FileSystem;
    /// Full document as stored in the index.
    fn body(&self) -> Result<Value>;
    fn changelog_mut(&mut self) -> &mut Vec<ChangelogEntry>;

    fn denied(&self, user: &Principal, access: &'static str) -> PodaciError {
        PodaciError::PermissionDenied {
            user: user.user_id.clone(),
            access,
            kind: Self::KIND.as_str(),
            id: self.id().unwrap_or("<unsaved>").to_string(),
        }
    }

    /// Acting user, if they may read this document.
    fn ensure_read(&self) -> Result<Principal> {
        let user = self.fs().require_user()?;
        if !self.has_read_access(&user) {
            return Err(self.denied(&user, "read"));
        }
        Ok(user)
    }

    /// Acting user, if they may write this document.
    fn ensure_write(&self) -> Result<Principal> {
        let user = self.fs().require_user()?;
        if !self.has_write_access(&user) {
            return Err(self.denied(&user, "write"));
        }
        Ok(user)
    }

    /// Write the cached record back to the index. Unsaved documents have nothing to sync.
    fn sync(&mut self) -> Result<()> {
        let user = self.fs().require_user()?;
        if self.id().is_none() {
            return Ok(());
        }
        if !self.has_write_access(&user) {
            return Err(self.denied(&user, "write"));
        }
        self.persist().map(|_| ())
    }

    /// Unchecked write-through; callers have already decided the write is allowed.
    fn persist(&self) -> Result<UpdateOutcome> {
        let id = self.id().ok_or(PodaciError::MissingField("id"))?;
        let out = self.fs().meta().update_document(Self::KIND, id, &self.body()?, true)?;
        debug!(target: "podaci::fs", "sync {} id={} version={} noop={}{}", Self::KIND, id, out.version, out.noop, self.fs().corr_suffix());
        Ok(out)
    }

    /// Append a changelog entry by the acting user, optionally syncing right away.
    fn log(&mut self, message: &str, sync: bool) -> Result<()> {
        let user = if sync { self.ensure_write()? } else { self.fs().require_user()? };
        self.changelog_mut().push(ChangelogEntry { date: Utc::now(), user: user.user_id, message: message.to_string() });
        if sync {
            self.sync()?;
        }
        Ok(())
    }

    /// Grant `user` read access, and write access when `write` is set. Granting twice changes nothing.
    fn add_user(&mut self, user: &Principal, write: bool) -> Result<()> {
        self.ensure_write()?;
        let acl = self.access_mut();
        let mut changed = insert_unique(&mut acl.allowed_users, &user.user_id);
        if write {
            changed |= insert_unique(&mut acl.allowed_write_users, &user.user_id);
        }
        if !changed {
            return Ok(());
        }
        let access = if write { "read/write" } else { "read" };
        self.log(&format!("Gave {} access to {}", access, user.display_name()), false)?;
        self.sync()
    }

    /// Revoke all access for `user`. Fails with `Absent` when they had none.
    fn remove_user(&mut self, user: &Principal) -> Result<()> {
        self.ensure_write()?;
        let acl = self.access_mut();
        let had_read = remove_value(&mut acl.allowed_users, &user.user_id);
        let had_write = remove_value(&mut acl.allowed_write_users, &user.user_id);
        if !had_read && !had_write {
            return Err(PodaciError::absent("allowed_users", user.user_id.clone()));
        }
        self.log(&format!("Removed access for {}", user.display_name()), false)?;
        // a user revoking themselves loses write access; the change still has to land
        if self.id().is_none() {
            return Ok(());
        }
        self.persist().map(|_| ())
    }
}
