//! In-process backend.
//!
//! Keeps tables, accounts, stored objects and change subscribers in memory.
//! Writes publish row changes to matching channels the way the hosted change
//! feed does, and failures can be injected per operation so callers' error
//! paths can be exercised without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;
use vitrine_core::{Email, Role, UserId};

use super::query::{Embed, Filter, Join, Query, compare_values, same_scalar, tables};
use super::{
    AuthBackend, AuthChangeEvent, AuthEventKind, AuthSession, AuthSubscription, AuthUser,
    BackendError, ChangeEvent, ChangeFilter, ChangeKind, ChannelHandle, DataBackend,
    RealtimeBackend, RealtimeChannel, StorageBackend,
};

/// Base of the public URLs handed out for stored objects.
pub const PUBLIC_STORAGE_URL: &str = "https://memory.invalid/storage/v1/object/public";

/// Status used for injected failures.
const FAULT_STATUS: u16 = 503;

/// Operation that can be made to fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// `select`/`select_single`/`count` on a table.
    Select(String),
    /// `insert`/`update`/`upsert`/`delete` on a table.
    Write(String),
    SignIn,
    SignOut,
    Upload,
    Remove,
}

#[derive(Debug)]
struct ArmedFault {
    fault: Fault,
    remaining: u32,
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user: AuthUser,
}

#[derive(Debug)]
struct Subscriber {
    handle: ChannelHandle,
    filter: ChangeFilter,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

struct Inner {
    tables: Mutex<HashMap<String, Vec<JsonValue>>>,
    serials: Mutex<HashMap<String, (String, i64)>>,
    last_created: Mutex<DateTime<Utc>>,
    accounts: Mutex<HashMap<String, Account>>,
    session: Mutex<Option<AuthSession>>,
    auth_events: broadcast::Sender<AuthChangeEvent>,
    objects: Mutex<HashMap<(String, String), (Vec<u8>, String)>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_channel: AtomicU64,
    faults: Mutex<Vec<ArmedFault>>,
    select_calls: Mutex<HashMap<String, usize>>,
}

/// Backend that lives entirely in memory.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBackend {
    /// Empty backend. `orders.order_number` is filled from a sequence.
    #[must_use]
    pub fn new() -> Self {
        let (auth_events, _) = broadcast::channel(64);
        let mut serials = HashMap::new();
        serials.insert(tables::ORDERS.to_owned(), ("order_number".to_owned(), 0));

        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(HashMap::new()),
                serials: Mutex::new(serials),
                last_created: Mutex::new(DateTime::<Utc>::MIN_UTC),
                accounts: Mutex::new(HashMap::new()),
                session: Mutex::new(None),
                auth_events,
                objects: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(Vec::new()),
                next_channel: AtomicU64::new(1),
                faults: Mutex::new(Vec::new()),
                select_calls: Mutex::new(HashMap::new()),
            }),
        }
    }

    // =========================================================================
    // Seeding and inspection
    // =========================================================================

    /// Store rows as-is, without publishing changes.
    pub fn seed<I>(&self, table: &str, rows: I)
    where
        I: IntoIterator<Item = JsonValue>,
    {
        let stored: Vec<JsonValue> = rows.into_iter().map(|row| self.prepare_row(table, row)).collect();
        lock(&self.inner.tables)
            .entry(table.to_owned())
            .or_default()
            .extend(stored);
    }

    /// Snapshot of a table.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<JsonValue> {
        lock(&self.inner.tables)
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Register an account and its profile row.
    pub fn add_user(&self, email: &str, password: &str, role: Role) -> UserId {
        let id = UserId::new();
        let user = AuthUser {
            id,
            email: Some(email.to_owned()),
            user_metadata: serde_json::json!({ "role": role.as_str() }),
        };
        lock(&self.inner.accounts).insert(
            email.to_owned(),
            Account {
                password: password.to_owned(),
                user,
            },
        );
        self.seed(
            tables::PROFILES,
            [serde_json::json!({
                "id": id,
                "username": email,
                "full_name": "",
                "role": role.as_str(),
                "active": true,
            })],
        );
        id
    }

    /// Put an existing account's session in place without an auth event,
    /// as if it had been persisted by an earlier run.
    pub fn restore_session(&self, email: &str) -> Option<AuthSession> {
        let account = lock(&self.inner.accounts).get(email).cloned()?;
        let session = issue_session(account.user);
        *lock(&self.inner.session) = Some(session.clone());
        Some(session)
    }

    /// Publish an auth-state event to subscribers.
    pub fn emit_auth(&self, event: AuthChangeEvent) {
        *lock(&self.inner.session) = event.session.clone();
        // No receivers is fine.
        let _ = self.inner.auth_events.send(event);
    }

    /// Publish a row change to matching channels.
    pub fn emit_change(&self, event: ChangeEvent) {
        let mut subscribers = lock(&self.inner.subscribers);
        subscribers.retain(|subscriber| !subscriber.sender.is_closed());
        for subscriber in subscribers.iter() {
            if subscriber.filter.accepts(&event) {
                let _ = subscriber.sender.send(event.clone());
            }
        }
    }

    /// Make the next `times` attempts of `fault` fail with a 503.
    pub fn fail(&self, fault: Fault, times: u32) {
        lock(&self.inner.faults).push(ArmedFault {
            fault,
            remaining: times,
        });
    }

    /// Number of reads issued against `table`.
    #[must_use]
    pub fn select_calls(&self, table: &str) -> usize {
        lock(&self.inner.select_calls)
            .get(table)
            .copied()
            .unwrap_or(0)
    }

    /// Number of open change channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }

    /// Stored object bytes.
    #[must_use]
    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        lock(&self.inner.objects)
            .get(&(bucket.to_owned(), path.to_owned()))
            .map(|(bytes, _)| bytes.clone())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn check(&self, fault: &Fault) -> Result<(), BackendError> {
        let mut faults = lock(&self.inner.faults);
        if let Some(armed) = faults
            .iter_mut()
            .find(|armed| armed.fault == *fault && armed.remaining > 0)
        {
            armed.remaining -= 1;
            debug!(?fault, remaining = armed.remaining, "Injected backend failure");
            return Err(BackendError::api(FAULT_STATUS, "injected failure"));
        }
        faults.retain(|armed| armed.remaining > 0);
        Ok(())
    }

    fn next_created_at(&self) -> String {
        let mut last = lock(&self.inner.last_created);
        let now = Utc::now();
        let next = if now > *last {
            now
        } else {
            *last + ChronoDuration::microseconds(1)
        };
        *last = next;
        next.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Fill `id`, `created_at` and any serial column missing from a row.
    fn prepare_row(&self, table: &str, row: JsonValue) -> JsonValue {
        let JsonValue::Object(mut map) = row else {
            return row;
        };
        if !map.contains_key("id") {
            map.insert("id".to_owned(), JsonValue::String(Uuid::new_v4().to_string()));
        }
        if !map.contains_key("created_at") {
            map.insert("created_at".to_owned(), JsonValue::String(self.next_created_at()));
        }
        if let Some((column, counter)) = lock(&self.inner.serials).get_mut(table)
            && !map.contains_key(column.as_str())
        {
            *counter += 1;
            map.insert(column.clone(), JsonValue::from(*counter));
        }
        JsonValue::Object(map)
    }

    fn publish(&self, table: &str, kind: ChangeKind, record: JsonValue, old_record: JsonValue) {
        self.emit_change(ChangeEvent {
            table: table.to_owned(),
            kind,
            record,
            old_record,
        });
    }
}

fn issue_session(user: AuthUser) -> AuthSession {
    AuthSession {
        access_token: SecretString::from(Uuid::new_v4().to_string()),
        refresh_token: Some(SecretString::from(Uuid::new_v4().to_string())),
        expires_at: Some(Utc::now().timestamp() + 3600),
        user,
    }
}

fn project(row: &JsonValue, columns: &[String]) -> JsonValue {
    if columns.is_empty() {
        return row.clone();
    }
    let mut out = Map::new();
    for column in columns {
        out.insert(
            column.clone(),
            row.get(column).cloned().unwrap_or(JsonValue::Null),
        );
    }
    JsonValue::Object(out)
}

fn same_value(a: Option<&JsonValue>, b: Option<&JsonValue>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_null() => same_scalar(a, b),
        _ => false,
    }
}

/// Embedded value for `row`, or `None` when an inner join drops the row.
fn resolve_embed(
    tables: &HashMap<String, Vec<JsonValue>>,
    row: &JsonValue,
    embed: &Embed,
) -> Option<JsonValue> {
    let related = tables.get(&embed.relation).map_or(&[][..], Vec::as_slice);
    match &embed.join {
        Join::ToOne { local_key } => {
            let found = related
                .iter()
                .find(|candidate| same_value(row.get(local_key), candidate.get("id")));
            match found {
                Some(candidate) => Some(project(candidate, &embed.columns)),
                None if embed.inner => None,
                None => Some(JsonValue::Null),
            }
        }
        Join::ToMany { foreign_key } => {
            let children: Vec<JsonValue> = related
                .iter()
                .filter(|candidate| same_value(row.get("id"), candidate.get(foreign_key)))
                .map(|candidate| project(candidate, &embed.columns))
                .collect();
            if children.is_empty() && embed.inner {
                None
            } else {
                Some(JsonValue::Array(children))
            }
        }
    }
}

fn merge(target: &mut JsonValue, patch: &JsonValue) {
    if let (JsonValue::Object(target), JsonValue::Object(patch)) = (target, patch) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

// =============================================================================
// Trait implementations
// =============================================================================

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn get_session(&self) -> Result<Option<AuthSession>, BackendError> {
        Ok(lock(&self.inner.session).clone())
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        AuthSubscription::new(self.inner.auth_events.subscribe())
    }

    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        self.check(&Fault::SignIn)?;
        let account = lock(&self.inner.accounts)
            .get(email.as_str())
            .cloned()
            .ok_or(BackendError::InvalidCredentials)?;
        if account.password != password.expose_secret() {
            return Err(BackendError::InvalidCredentials);
        }

        let session = issue_session(account.user);
        self.emit_auth(AuthChangeEvent::new(
            AuthEventKind::SignedIn,
            Some(session.clone()),
        ));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
        metadata: JsonValue,
    ) -> Result<AuthUser, BackendError> {
        if lock(&self.inner.accounts).contains_key(email.as_str()) {
            return Err(BackendError::api(422, "User already registered"));
        }

        let user = AuthUser {
            id: UserId::new(),
            email: Some(email.to_string()),
            user_metadata: metadata,
        };
        lock(&self.inner.accounts).insert(
            email.to_string(),
            Account {
                password: password.expose_secret().to_owned(),
                user: user.clone(),
            },
        );

        // Mirrors the profile row the hosted database creates on sign-up.
        let metadata = &user.user_metadata;
        self.seed(
            tables::PROFILES,
            [serde_json::json!({
                "id": user.id,
                "username": email.as_str(),
                "full_name": metadata.get("full_name").cloned().unwrap_or(JsonValue::Null),
                "role": metadata.get("role").cloned().unwrap_or_else(|| JsonValue::from(Role::Customer.as_str())),
                "active": true,
            })],
        );
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.check(&Fault::SignOut)?;
        self.emit_auth(AuthChangeEvent::signed_out());
        Ok(())
    }
}

#[async_trait]
impl DataBackend for MemoryBackend {
    async fn select(&self, query: &Query) -> Result<Vec<JsonValue>, BackendError> {
        *lock(&self.inner.select_calls)
            .entry(query.table.clone())
            .or_insert(0) += 1;
        self.check(&Fault::Select(query.table.clone()))?;

        let tables = lock(&self.inner.tables);
        let source = tables.get(&query.table).map_or(&[][..], Vec::as_slice);

        let mut matched: Vec<(&JsonValue, Vec<(String, JsonValue)>)> = Vec::new();
        'rows: for row in source {
            if !query.filters.iter().all(|filter| filter.matches(row)) {
                continue;
            }
            if let Some(pattern) = &query.pattern
                && !pattern.matches(row)
            {
                continue;
            }
            let mut embedded = Vec::with_capacity(query.embeds.len());
            for embed in &query.embeds {
                let Some(value) = resolve_embed(&tables, row, embed) else {
                    continue 'rows;
                };
                embedded.push((embed.key().to_owned(), value));
            }
            matched.push((row, embedded));
        }

        if let Some(order) = &query.order {
            matched.sort_by(|(a, _), (b, _)| {
                let ordering = compare_values(
                    a.get(&order.column).unwrap_or(&JsonValue::Null),
                    b.get(&order.column).unwrap_or(&JsonValue::Null),
                );
                match order.direction {
                    super::Direction::Asc => ordering,
                    super::Direction::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }

        Ok(matched
            .into_iter()
            .map(|(row, embedded)| {
                let mut out = project(row, &query.columns);
                if let JsonValue::Object(map) = &mut out {
                    map.extend(embedded);
                }
                out
            })
            .collect())
    }

    async fn count(&self, table: &str) -> Result<u64, BackendError> {
        self.check(&Fault::Select(table.to_owned()))?;
        let count = lock(&self.inner.tables).get(table).map_or(0, Vec::len);
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn insert(&self, table: &str, rows: JsonValue) -> Result<Vec<JsonValue>, BackendError> {
        self.check(&Fault::Write(table.to_owned()))?;
        let rows = match rows {
            JsonValue::Array(rows) => rows,
            row => vec![row],
        };
        let stored: Vec<JsonValue> = rows
            .into_iter()
            .map(|row| self.prepare_row(table, row))
            .collect();
        lock(&self.inner.tables)
            .entry(table.to_owned())
            .or_default()
            .extend(stored.iter().cloned());
        for row in &stored {
            self.publish(table, ChangeKind::Insert, row.clone(), JsonValue::Null);
        }
        Ok(stored)
    }

    async fn update(
        &self,
        table: &str,
        patch: JsonValue,
        filters: &[Filter],
    ) -> Result<(), BackendError> {
        self.check(&Fault::Write(table.to_owned()))?;
        let mut changes = Vec::new();
        {
            let mut tables = lock(&self.inner.tables);
            for row in tables.entry(table.to_owned()).or_default().iter_mut() {
                if filters.iter().all(|filter| filter.matches(row)) {
                    let old = row.clone();
                    merge(row, &patch);
                    changes.push((row.clone(), old));
                }
            }
        }
        for (record, old) in changes {
            self.publish(table, ChangeKind::Update, record, old);
        }
        Ok(())
    }

    async fn upsert(
        &self,
        table: &str,
        row: JsonValue,
        on_conflict: &str,
    ) -> Result<(), BackendError> {
        self.check(&Fault::Write(table.to_owned()))?;
        let conflict: Vec<Filter> = on_conflict
            .split(',')
            .map(str::trim)
            .filter(|column| !column.is_empty())
            .map(|column| Filter::eq(column, row.get(column).cloned().unwrap_or(JsonValue::Null)))
            .collect();

        let change = {
            let mut tables = lock(&self.inner.tables);
            let rows = tables.entry(table.to_owned()).or_default();
            if let Some(existing) = rows
                .iter_mut()
                .find(|existing| conflict.iter().all(|filter| filter.matches(existing)))
            {
                let old = existing.clone();
                merge(existing, &row);
                (ChangeKind::Update, existing.clone(), old)
            } else {
                let stored = self.prepare_row(table, row);
                rows.push(stored.clone());
                (ChangeKind::Insert, stored, JsonValue::Null)
            }
        };
        let (kind, record, old) = change;
        self.publish(table, kind, record, old);
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), BackendError> {
        self.check(&Fault::Write(table.to_owned()))?;
        let removed: Vec<JsonValue> = {
            let mut tables = lock(&self.inner.tables);
            let rows = tables.entry(table.to_owned()).or_default();
            let (removed, kept): (Vec<JsonValue>, Vec<JsonValue>) = rows
                .drain(..)
                .partition(|row| filters.iter().all(|filter| filter.matches(row)));
            *rows = kept;
            removed
        };
        for old in removed {
            self.publish(table, ChangeKind::Delete, serde_json::json!({}), old);
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        self.check(&Fault::Upload)?;
        let mut objects = lock(&self.inner.objects);
        let key = (bucket.to_owned(), path.to_owned());
        if objects.contains_key(&key) {
            return Err(BackendError::api(409, "The resource already exists"));
        }
        objects.insert(key, (bytes, content_type.to_owned()));
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{PUBLIC_STORAGE_URL}/{bucket}/{path}")
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), BackendError> {
        self.check(&Fault::Remove)?;
        let mut objects = lock(&self.inner.objects);
        for path in paths {
            objects.remove(&(bucket.to_owned(), path.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl RealtimeBackend for MemoryBackend {
    async fn channel(
        &self,
        name: &str,
        filter: ChangeFilter,
    ) -> Result<RealtimeChannel, BackendError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = ChannelHandle {
            id: self.inner.next_channel.fetch_add(1, AtomicOrdering::Relaxed),
            name: name.to_owned(),
        };
        lock(&self.inner.subscribers).push(Subscriber {
            handle: handle.clone(),
            filter,
            sender,
        });
        Ok(RealtimeChannel::new(handle, receiver))
    }

    async fn remove_channel(&self, handle: &ChannelHandle) -> Result<(), BackendError> {
        lock(&self.inner.subscribers).retain(|subscriber| subscriber.handle != *handle);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::super::Direction;
    use super::*;

    fn catalog() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.seed(
            tables::CATEGORIES,
            [
                json!({"id": "c1", "name": "Bebidas"}),
                json!({"id": "c2", "name": "Vazia"}),
            ],
        );
        backend.seed(
            tables::PRODUCTS,
            [
                json!({"id": "p1", "name": "Suco", "code": "S1", "category_id": "c1", "active": true, "price": 5}),
                json!({"id": "p2", "name": "Água", "code": "A1", "category_id": "c1", "active": true, "price": 2}),
                json!({"id": "p3", "name": "Avulso", "code": "X1", "category_id": null, "active": true, "price": 1}),
            ],
        );
        backend
    }

    #[tokio::test]
    async fn test_inner_embed_drops_unrelated_rows() {
        let backend = catalog();
        let rows = backend
            .select(
                &Query::table(tables::PRODUCTS)
                    .embed(Embed::to_one(tables::CATEGORIES, "category_id").columns(["name"]).inner())
                    .order("name", Direction::Asc),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Suco");
        assert_eq!(rows[0]["categories"], json!({"name": "Bebidas"}));
    }

    #[tokio::test]
    async fn test_to_many_embed() {
        let backend = catalog();
        let rows = backend
            .select(
                &Query::table(tables::CATEGORIES)
                    .embed(Embed::to_many(tables::PRODUCTS, "category_id").columns(["id", "name"]))
                    .order("name", Direction::Asc),
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["products"].as_array().unwrap().len(), 2);
        assert_eq!(rows[1]["products"], json!([]));
    }

    #[tokio::test]
    async fn test_select_single_errors() {
        let backend = catalog();
        let none = backend
            .select_single(&Query::table(tables::PRODUCTS).eq("id", "missing"))
            .await;
        assert!(matches!(none, Err(BackendError::NotFound)));
        let many = backend.select_single(&Query::table(tables::PRODUCTS)).await;
        assert!(matches!(many, Err(BackendError::MultipleRows(3))));
    }

    #[tokio::test]
    async fn test_upsert_merges_on_conflict_columns() {
        let backend = MemoryBackend::new();
        let row = json!({"user_id": "u1", "product_id": "p1", "quantity": 1});
        backend.upsert(tables::CART_ITEMS, row, "user_id,product_id").await.unwrap();
        let row = json!({"user_id": "u1", "product_id": "p1", "quantity": 3});
        backend.upsert(tables::CART_ITEMS, row, "user_id,product_id").await.unwrap();

        let rows = backend.rows(tables::CART_ITEMS);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["quantity"], 3);
    }

    #[tokio::test]
    async fn test_orders_get_sequential_numbers() {
        let backend = MemoryBackend::new();
        let first = backend.insert(tables::ORDERS, json!({"status": "completed"})).await.unwrap();
        let second = backend.insert(tables::ORDERS, json!({"status": "completed"})).await.unwrap();
        assert_eq!(first[0]["order_number"], 1);
        assert_eq!(second[0]["order_number"], 2);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let backend = catalog();
        backend.fail(Fault::Select(tables::PRODUCTS.to_owned()), 1);
        assert!(backend.select(&Query::table(tables::PRODUCTS)).await.is_err());
        assert!(backend.select(&Query::table(tables::PRODUCTS)).await.is_ok());
        assert_eq!(backend.select_calls(tables::PRODUCTS), 2);
    }

    #[tokio::test]
    async fn test_updates_reach_subscribed_channels() {
        let backend = MemoryBackend::new();
        backend.seed(tables::COMPANY_SETTINGS, [json!({"id": "s1", "name": "Velha"})]);
        let (handle, mut events) = backend
            .channel("settings", ChangeFilter::table(tables::COMPANY_SETTINGS, ChangeKind::Update))
            .await
            .unwrap()
            .into_parts();

        backend
            .update(tables::COMPANY_SETTINGS, json!({"name": "Nova"}), &[Filter::eq("id", "s1")])
            .await
            .unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.record["name"], "Nova");
        assert_eq!(event.old_record["name"], "Velha");

        backend.remove_channel(&handle).await.unwrap();
        assert!(events.recv().await.is_none());
        assert_eq!(backend.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_sign_in_checks_password_and_emits_event() {
        let backend = MemoryBackend::new();
        backend.add_user("ana@loja.com", "s3nha-forte", Role::Admin);
        let mut events = backend.on_auth_state_change();

        let email = Email::parse("ana@loja.com").unwrap();
        let wrong = backend
            .sign_in_with_password(&email, &SecretString::from("errada"))
            .await;
        assert!(matches!(wrong, Err(BackendError::InvalidCredentials)));

        let session = backend
            .sign_in_with_password(&email, &SecretString::from("s3nha-forte"))
            .await
            .unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedIn);
        assert_eq!(event.session.unwrap().user.id, session.user.id);
    }

    #[tokio::test]
    async fn test_storage_round_trip() {
        let backend = MemoryBackend::new();
        backend
            .upload("product-images", "products/a.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert_eq!(
            backend.public_url("product-images", "products/a.png"),
            format!("{PUBLIC_STORAGE_URL}/product-images/products/a.png")
        );
        backend
            .remove("product-images", &["products/a.png".to_owned()])
            .await
            .unwrap();
        assert!(backend.object("product-images", "products/a.png").is_none());
    }
}
