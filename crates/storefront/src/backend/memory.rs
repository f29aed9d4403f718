//! In-process backend.
//!
//! Implements both collaborator traits over plain maps guarded by a mutex.
//! Patch semantics match the Firebase backend: patches are all-or-nothing,
//! updates require an existing document, and increments treat a missing
//! field as zero. Used by the test suites and by `VINTAGE_BACKEND=memory`.
//!
//! Failure injection (`set_fail_reads`, `set_fail_writes`) lets tests drive
//! the store's error paths without a network.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use vintage_core::{Email, UserId};

use super::{
    AuthIdentity, BackendError, Document, DocumentPatch, DocumentStore, FieldOp, FieldPath,
    Fields, IdentityService,
};

/// Minimum password length, same as the hosted identity provider.
const MIN_PASSWORD_LENGTH: usize = 6;

struct Account {
    password: String,
    identity: AuthIdentity,
}

#[derive(Default)]
struct MemoryInner {
    /// Accounts keyed by normalized email.
    accounts: HashMap<String, Account>,
    /// Collections keyed by name; documents ordered by id like a listing.
    collections: HashMap<String, BTreeMap<String, Fields>>,
}

/// In-memory identity provider and document store.
pub struct InMemoryBackend {
    inner: Mutex<MemoryInner>,
    session: watch::Sender<Option<AuthIdentity>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// An empty backend with no session.
    #[must_use]
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            inner: Mutex::new(MemoryInner::default()),
            session,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an account without signing it in.
    pub fn add_account(
        &self,
        email: &Email,
        password: &str,
        display_name: Option<&str>,
    ) -> AuthIdentity {
        let identity = AuthIdentity {
            uid: UserId::new(Uuid::new_v4().simple().to_string()),
            email: email.as_str().to_owned(),
            display_name: display_name.map(str::to_owned),
            photo_url: None,
        };
        self.lock().accounts.insert(
            email.as_str().to_owned(),
            Account {
                password: password.to_owned(),
                identity: identity.clone(),
            },
        );
        identity
    }

    /// Pretend a session survived from an earlier run.
    pub fn restore_session(&self, identity: AuthIdentity) {
        self.session.send_replace(Some(identity));
    }

    /// Put a document in place, bypassing failure injection.
    pub fn insert_document(&self, collection: &str, id: &str, fields: Fields) {
        self.lock()
            .collections
            .entry(collection.to_owned())
            .or_default()
            .insert(id.to_owned(), fields);
    }

    /// Read a document, bypassing failure injection.
    #[must_use]
    pub fn document(&self, collection: &str, id: &str) -> Option<Fields> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Make every document read fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every document write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful document writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> Result<(), BackendError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("injected read failure".to_owned()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), BackendError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("injected write failure".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityService for InMemoryBackend {
    async fn create_account(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthIdentity, BackendError> {
        let password = password.expose_secret();
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(BackendError::WeakPassword(format!(
                "password should be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        if self.lock().accounts.contains_key(email.as_str()) {
            return Err(BackendError::EmailExists);
        }

        let identity = self.add_account(email, password, None);
        debug!(uid = %identity.uid, "Created in-memory account");
        self.session.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn set_display_name(
        &self,
        identity: &AuthIdentity,
        name: &str,
    ) -> Result<AuthIdentity, BackendError> {
        let updated = {
            let mut inner = self.lock();
            let account = inner
                .accounts
                .values_mut()
                .find(|a| a.identity.uid == identity.uid)
                .ok_or(BackendError::Unauthenticated)?;
            account.identity.display_name = Some(name.to_owned());
            account.identity.clone()
        };

        self.session.send_if_modified(|current| match current {
            Some(signed_in) if signed_in.uid == updated.uid => {
                signed_in.display_name = updated.display_name.clone();
                // A profile edit is not a session transition.
                false
            }
            _ => false,
        });
        Ok(updated)
    }

    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthIdentity, BackendError> {
        let identity = {
            let inner = self.lock();
            let account = inner
                .accounts
                .get(email.as_str())
                .ok_or(BackendError::InvalidCredentials)?;
            if account.password != password.expose_secret() {
                return Err(BackendError::InvalidCredentials);
            }
            account.identity.clone()
        };

        self.session.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.session.send_replace(None);
        Ok(())
    }

    fn session_changes(&self) -> watch::Receiver<Option<AuthIdentity>> {
        self.session.subscribe()
    }
}

#[async_trait]
impl DocumentStore for InMemoryBackend {
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, BackendError> {
        self.check_reads()?;
        Ok(self
            .lock()
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BackendError> {
        self.check_reads()?;
        Ok(self.document(collection, id).map(|fields| Document {
            id: id.to_owned(),
            fields,
        }))
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<(), BackendError> {
        self.check_writes()?;
        self.insert_document(collection, id, fields);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: DocumentPatch,
    ) -> Result<(), BackendError> {
        self.check_writes()?;

        let mut inner = self.lock();
        let doc = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| BackendError::NotFound(format!("{collection}/{id}")))?;

        // Apply to a copy so a failing op leaves the document untouched.
        let mut updated = doc.clone();
        for op in patch.ops() {
            apply_op(&mut updated, op)?;
        }
        *doc = updated;
        drop(inner);

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Walk to the map that owns the last segment of `path`, creating maps on
/// the way. Non-map values in the way are replaced, as the hosted store does.
fn parent_map<'a>(
    fields: &'a mut Fields,
    path: &'a FieldPath,
) -> Option<(&'a mut Fields, &'a str)> {
    let (last, parents) = path.segments().split_last()?;
    let mut current = fields;
    for segment in parents {
        let slot = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Fields::new()));
        if !slot.is_object() {
            *slot = Value::Object(Fields::new());
        }
        current = slot.as_object_mut()?;
    }
    Some((current, last.as_str()))
}

fn apply_op(fields: &mut Fields, op: &FieldOp) -> Result<(), BackendError> {
    let invalid_path = || BackendError::Rejected {
        status: 400,
        message: format!("invalid field path '{}'", op.path()),
    };

    match op {
        FieldOp::Set(path, value) => {
            let (parent, key) = parent_map(fields, path).ok_or_else(invalid_path)?;
            parent.insert(key.to_owned(), value.clone());
        }
        FieldOp::Delete(path) => {
            if let Some((parent, key)) = existing_parent(fields, path) {
                parent.remove(key);
            }
        }
        FieldOp::Increment(path, by) => {
            let (parent, key) = parent_map(fields, path).ok_or_else(invalid_path)?;
            let current = match parent.get(key) {
                None | Some(Value::Null) => 0,
                Some(Value::Number(n)) => n.as_i64().ok_or_else(|| BackendError::Rejected {
                    status: 400,
                    message: format!("field '{path}' is not an integer"),
                })?,
                Some(_) => {
                    return Err(BackendError::Rejected {
                        status: 400,
                        message: format!("field '{path}' is not an integer"),
                    });
                }
            };
            parent.insert(key.to_owned(), Value::from(current.saturating_add(*by)));
        }
    }
    Ok(())
}

/// Like [`parent_map`] but never creates anything.
fn existing_parent<'a>(
    fields: &'a mut Fields,
    path: &'a FieldPath,
) -> Option<(&'a mut Fields, &'a str)> {
    let (last, parents) = path.segments().split_last()?;
    let mut current = fields;
    for segment in parents {
        current = current.get_mut(segment)?.as_object_mut()?;
    }
    Some((current, last.as_str()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_owned())
    }

    #[tokio::test]
    async fn test_patch_set_delete_increment() {
        let backend = InMemoryBackend::new();
        backend.insert_document("users", "u1", fields(json!({"cart": {}})));

        let patch = DocumentPatch::new()
            .set(FieldPath::new(["cart", "p1"]), json!({"id": "p1", "quantity": 1}))
            .increment(FieldPath::new(["cart", "p1", "quantity"]), 2)
            .set(FieldPath::new(["wishlist", "p9"]), json!({"id": "p9"}));
        backend.update("users", "u1", patch).await.unwrap();

        let doc = backend.document("users", "u1").unwrap();
        assert_eq!(doc["cart"]["p1"]["quantity"], 3);
        assert_eq!(doc["wishlist"]["p9"]["id"], "p9");

        let patch = DocumentPatch::new().delete(FieldPath::new(["cart", "p1"]));
        backend.update("users", "u1", patch).await.unwrap();
        let doc = backend.document("users", "u1").unwrap();
        assert_eq!(doc["cart"], json!({}));
        assert_eq!(backend.write_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_patch_is_atomic() {
        let backend = InMemoryBackend::new();
        backend.insert_document("users", "u1", fields(json!({"name": "x"})));

        let patch = DocumentPatch::new()
            .set(FieldPath::new(["cart", "p1"]), json!({"id": "p1"}))
            .increment(FieldPath::new(["name"]), 1);
        let err = backend.update("users", "u1", patch).await.unwrap_err();

        assert!(matches!(err, BackendError::Rejected { status: 400, .. }));
        assert_eq!(backend.document("users", "u1").unwrap(), fields(json!({"name": "x"})));
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let backend = InMemoryBackend::new();
        let err = backend
            .update("users", "ghost", DocumentPatch::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_all_lists_in_id_order() {
        let backend = InMemoryBackend::new();
        backend.insert_document("products", "b", Fields::new());
        backend.insert_document("products", "a", Fields::new());

        let ids: Vec<_> = backend
            .get_all("products")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(backend.get_all("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let backend = InMemoryBackend::new();
        backend.set_fail_reads(true);
        assert!(matches!(
            backend.get("users", "u1").await,
            Err(BackendError::Unavailable(_))
        ));

        backend.set_fail_writes(true);
        assert!(backend.set("users", "u1", Fields::new()).await.is_err());
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn test_account_lifecycle_drives_session() {
        let backend = InMemoryBackend::new();
        let mut session = backend.session_changes();
        assert!(session.borrow_and_update().is_none());

        let email = Email::parse("rina@example.com").unwrap();
        let created = backend
            .create_account(&email, &secret("rahasia123"))
            .await
            .unwrap();
        assert!(session.has_changed().unwrap());
        assert_eq!(session.borrow_and_update().as_ref().unwrap().uid, created.uid);

        let err = backend
            .create_account(&email, &secret("rahasia123"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::EmailExists));

        backend.sign_out().await.unwrap();
        assert!(session.borrow_and_update().is_none());

        let err = backend.sign_in(&email, &secret("wrong-pass")).await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidCredentials));

        let signed_in = backend.sign_in(&email, &secret("rahasia123")).await.unwrap();
        assert_eq!(signed_in.uid, created.uid);
    }

    #[tokio::test]
    async fn test_weak_password_rejected() {
        let backend = InMemoryBackend::new();
        let email = Email::parse("rina@example.com").unwrap();
        let err = backend.create_account(&email, &secret("123")).await.unwrap_err();
        assert!(matches!(err, BackendError::WeakPassword(_)));
    }

    #[tokio::test]
    async fn test_set_display_name_is_not_a_transition() {
        let backend = InMemoryBackend::new();
        let email = Email::parse("rina@example.com").unwrap();
        let identity = backend
            .create_account(&email, &secret("rahasia123"))
            .await
            .unwrap();
        let mut session = backend.session_changes();
        session.borrow_and_update();

        let updated = backend
            .set_display_name(&identity, "Rina Wijaya")
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Rina Wijaya"));
        assert!(!session.has_changed().unwrap());
        assert_eq!(
            session.borrow().as_ref().unwrap().display_name.as_deref(),
            Some("Rina Wijaya")
        );
    }
}
