//! End-to-end synchronization scenarios over a captured transport.
//!
//! These tests drive a [`DbConnection`] with hand-built server frames and
//! assert the full contract: snapshot application, primary-key update
//! coalescing, reducer failure isolation, and subscription replacement.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use eddy_client::messages::{
    IdentityToken, InitialSubscription, ServerMessage, TableUpdate, TransactionUpdate, UpdateStatus,
};
use eddy_client::{
    ClientError, ConnectionId, DbConnection, Identity, PrimaryKeyRow, Row, SchemaRegistry, Status,
    SubscriptionState, Transport, TransportError,
};
use eddy_codec::{AlgebraicType, AlgebraicValue, DecodeError, ProductType, Reader, Writer};

// ---------------------------------------------------------------------------
// Binding set under test
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct User {
    id: u32,
    name: String,
}

impl Row for User {
    const TABLE_NAME: &'static str = "user";

    fn write_bsatn(&self, w: &mut Writer) {
        w.put_u32(self.id);
        w.put_str(&self.name);
    }

    fn read_bsatn(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            id: r.get_u32()?,
            name: r.get_string()?,
        })
    }
}

impl PrimaryKeyRow for User {
    type Key = u32;

    fn primary_key(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Message {
    sender: u32,
    text: String,
}

impl Row for Message {
    const TABLE_NAME: &'static str = "message";

    fn write_bsatn(&self, w: &mut Writer) {
        w.put_u32(self.sender);
        w.put_str(&self.text);
    }

    fn read_bsatn(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            sender: r.get_u32()?,
            text: r.get_string()?,
        })
    }
}

fn registry() -> Arc<SchemaRegistry> {
    Arc::new(
        SchemaRegistry::builder()
            .table_with_primary_key::<User>()
            .table::<Message>()
            .reducer(
                "set_name",
                ProductType::new([("name", AlgebraicType::String)]),
            )
            .build()
            .unwrap(),
    )
}

// ---------------------------------------------------------------------------
// Test harness
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct FakeTransport {
    sent: Arc<Mutex<Vec<Bytes>>>,
}

impl Transport for FakeTransport {
    fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.sent.lock().push(frame);
        Ok(())
    }
}

const MY_IDENTITY: [u8; 32] = [7; 32];
const MY_CONNECTION: [u8; 16] = [3; 16];

fn connected() -> DbConnection {
    let mut conn =
        DbConnection::builder().build(registry(), Box::new(FakeTransport::default()));
    conn.handle_frame(
        &ServerMessage::IdentityToken(IdentityToken {
            identity: Identity::from_bytes(MY_IDENTITY),
            token: "tok".into(),
            connection_id: ConnectionId::from_bytes(MY_CONNECTION),
        })
        .encode(),
    )
    .unwrap();
    conn
}

fn user(id: u32, name: &str) -> User {
    User {
        id,
        name: name.into(),
    }
}

fn user_update(inserts: &[User], deletes: &[User]) -> TableUpdate {
    TableUpdate {
        table_name: User::TABLE_NAME.into(),
        inserts: inserts.iter().map(Row::encoded).collect(),
        deletes: deletes.iter().map(Row::encoded).collect(),
    }
}

fn snapshot_frame(request_id: u32, tables: Vec<TableUpdate>) -> Bytes {
    ServerMessage::InitialSubscription(InitialSubscription { tables, request_id }).encode()
}

fn commit_frame(reducer: &str, args: &AlgebraicValue, tables: Vec<TableUpdate>) -> Bytes {
    ServerMessage::TransactionUpdate(TransactionUpdate {
        status: UpdateStatus::Committed(tables),
        caller_identity: Identity::from_bytes(MY_IDENTITY),
        caller_connection_id: ConnectionId::from_bytes(MY_CONNECTION),
        reducer: reducer.into(),
        args: args.to_bytes(),
    })
    .encode()
}

fn set_name_args(name: &str) -> AlgebraicValue {
    AlgebraicValue::product(vec![AlgebraicValue::string(name)])
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_snapshot_then_committed_update() {
    let mut conn = connected();
    let users = conn.table::<User>().unwrap();

    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    users.on_insert(move |row, event| {
        assert!(event.is_none(), "snapshot rows carry no reducer event");
        sink.lock().push(format!("insert:{}", row.name));
    });
    let sink = Arc::clone(&log);
    users.on_delete(move |row, _| sink.lock().push(format!("delete:{}", row.name)));
    let sink = Arc::clone(&log);
    users.on_update(move |old, new, event| {
        let event = event.expect("reducer-driven update carries its event");
        assert_eq!(event.reducer, "set_name");
        assert!(event.status.is_committed());
        assert!(event.caused_by(
            Identity::from_bytes(MY_IDENTITY),
            ConnectionId::from_bytes(MY_CONNECTION)
        ));
        // Arguments decode against the registered product type.
        let args = event.args.as_ref().expect("registered reducer args decode");
        assert_eq!(args.elements, vec![AlgebraicValue::string("Ada Lovelace")]);
        sink.lock().push(format!("update:{}->{}", old.name, new.name));
    });

    // Subscribe, then receive the 2-row snapshot.
    let handle = conn.subscribe(["SELECT * FROM user"]).unwrap();
    conn.handle_frame(&snapshot_frame(
        handle.request_id(),
        vec![user_update(&[user(1, "ada"), user(2, "grace")], &[])],
    ))
    .unwrap();

    assert!(handle.is_applied());
    assert_eq!(conn.subscription_state(), SubscriptionState::Applied);
    assert_eq!(users.count(), 2);
    {
        let mut fired = log.lock().clone();
        fired.sort();
        assert_eq!(fired, vec!["insert:ada", "insert:grace"]);
    }
    log.lock().clear();

    // A committed SetName: delete(old) + insert(new) sharing primary key 1.
    conn.handle_frame(&commit_frame(
        "set_name",
        &set_name_args("Ada Lovelace"),
        vec![user_update(&[user(1, "Ada Lovelace")], &[user(1, "ada")])],
    ))
    .unwrap();

    // Cache size unchanged; exactly one update, no insert/delete.
    assert_eq!(users.count(), 2);
    assert_eq!(*log.lock(), vec!["update:ada->Ada Lovelace"]);
    assert_eq!(users.find_by_key(&1).unwrap().name, "Ada Lovelace");
}

#[test]
fn test_reducer_failure_is_isolated() {
    let mut conn = connected();
    let users = conn.table::<User>().unwrap();

    let handle = conn.subscribe(["SELECT * FROM user"]).unwrap();
    conn.handle_frame(&snapshot_frame(
        handle.request_id(),
        vec![user_update(&[user(1, "ada")], &[])],
    ))
    .unwrap();

    let row_events = Arc::new(Mutex::new(0u32));
    let sink = Arc::clone(&row_events);
    users.on_insert(move |_, _| *sink.lock() += 1);
    let sink = Arc::clone(&row_events);
    users.on_delete(move |_, _| *sink.lock() += 1);

    let failures: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    conn.reducers().on_reducer("set_name", move |event| {
        assert!(!event.status.is_committed());
        sink.lock().push(event.message().unwrap_or("").to_owned());
    });

    let frame = ServerMessage::TransactionUpdate(TransactionUpdate {
        status: UpdateStatus::Failed("name already taken".into()),
        caller_identity: Identity::from_bytes(MY_IDENTITY),
        caller_connection_id: ConnectionId::from_bytes(MY_CONNECTION),
        reducer: "set_name".into(),
        args: set_name_args("grace").to_bytes(),
    })
    .encode();
    conn.handle_frame(&frame).unwrap();

    // Zero cache mutations; the failure reached the reducer callback.
    assert_eq!(users.count(), 1);
    assert_eq!(*row_events.lock(), 0);
    assert_eq!(*failures.lock(), vec!["name already taken"]);
}

#[test]
fn test_out_of_energy_carries_no_message() {
    let mut conn = connected();

    let statuses: Arc<Mutex<Vec<Status>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&statuses);
    conn.reducers()
        .on_reducer("set_name", move |event| sink.lock().push(event.status.clone()));

    let frame = ServerMessage::TransactionUpdate(TransactionUpdate {
        status: UpdateStatus::OutOfEnergy,
        caller_identity: Identity::from_bytes(MY_IDENTITY),
        caller_connection_id: ConnectionId::from_bytes(MY_CONNECTION),
        reducer: "set_name".into(),
        args: set_name_args("x").to_bytes(),
    })
    .encode();
    conn.handle_frame(&frame).unwrap();

    assert_eq!(*statuses.lock(), vec![Status::OutOfEnergy]);
}

#[test]
fn test_subscription_replacement_delivers_server_diff() {
    let mut conn = connected();
    let users = conn.table::<User>().unwrap();

    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    users.on_insert(move |row, _| sink.lock().push(format!("insert:{}", row.name)));
    let sink = Arc::clone(&log);
    users.on_delete(move |row, _| sink.lock().push(format!("delete:{}", row.name)));

    // Q1 matches ada and grace.
    let q1 = conn.subscribe(["SELECT * FROM user WHERE id < 3"]).unwrap();
    conn.handle_frame(&snapshot_frame(
        q1.request_id(),
        vec![user_update(&[user(1, "ada"), user(2, "grace")], &[])],
    ))
    .unwrap();
    log.lock().clear();

    // Q2 matches grace and joan. The server computes the overlay: ada
    // leaves as a delete, the still-matching grace is re-sent as an insert
    // (idempotent, callback-silent), joan arrives as an insert.
    let q2 = conn.subscribe(["SELECT * FROM user WHERE id > 1"]).unwrap();
    assert_eq!(conn.subscription_state(), SubscriptionState::Pending);
    conn.handle_frame(&snapshot_frame(
        q2.request_id(),
        vec![user_update(
            &[user(2, "grace"), user(3, "joan")],
            &[user(1, "ada")],
        )],
    ))
    .unwrap();

    assert_eq!(conn.subscription_state(), SubscriptionState::Applied);
    assert_eq!(users.count(), 2);
    assert!(users.find_by_key(&1).is_none());
    assert_eq!(users.find_by_key(&3).unwrap().name, "joan");

    let mut fired = log.lock().clone();
    fired.sort();
    assert_eq!(fired, vec!["delete:ada", "insert:joan"]);
}

#[test]
fn test_on_applied_fires_after_row_callbacks() {
    let mut conn = connected();
    let users = conn.table::<User>().unwrap();

    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&order);
    users.on_insert(move |row, _| sink.lock().push(format!("insert:{}", row.name)));

    let sink = Arc::clone(&order);
    let handle = conn
        .subscribe_with(["SELECT * FROM user"], move || {
            sink.lock().push("applied".into());
        })
        .unwrap();

    conn.handle_frame(&snapshot_frame(
        handle.request_id(),
        vec![user_update(&[user(1, "ada")], &[])],
    ))
    .unwrap();

    assert_eq!(*order.lock(), vec!["insert:ada", "applied"]);
}

#[test]
fn test_unregistered_reducer_still_applies_diffs() {
    let mut conn = connected();
    let users = conn.table::<User>().unwrap();

    let handle = conn.subscribe(["SELECT * FROM user"]).unwrap();
    conn.handle_frame(&snapshot_frame(handle.request_id(), vec![])).unwrap();

    let seen_args: Arc<Mutex<Vec<Option<usize>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen_args);
    conn.reducers().on_reducer("mystery", move |event| {
        sink.lock().push(event.args.as_ref().map(|a| a.elements.len()));
    });

    // A reducer this binding set has never heard of commits a user insert.
    conn.handle_frame(&commit_frame(
        "mystery",
        &AlgebraicValue::product(vec![AlgebraicValue::U64(9)]),
        vec![user_update(&[user(4, "hopper")], &[])],
    ))
    .unwrap();

    // The diff applied; the event's args stayed raw.
    assert_eq!(users.count(), 1);
    assert_eq!(*seen_args.lock(), vec![None]);
}

#[test]
fn test_multi_table_commit_is_atomic_before_callbacks() {
    let mut conn = connected();
    let users = conn.table::<User>().unwrap();
    let messages = conn.table::<Message>().unwrap();

    let handle = conn.subscribe(["SELECT * FROM user", "SELECT * FROM message"]).unwrap();
    conn.handle_frame(&snapshot_frame(handle.request_id(), vec![])).unwrap();

    // Every row callback observes the fully-committed state of BOTH tables.
    let observed: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    let users_inner = users.clone();
    let messages_inner = messages.clone();
    users.on_insert(move |_, _| {
        sink.lock().push((users_inner.count(), messages_inner.count()));
    });
    let sink = Arc::clone(&observed);
    let users_inner = users.clone();
    let messages_inner = messages.clone();
    messages.on_insert(move |_, _| {
        sink.lock().push((users_inner.count(), messages_inner.count()));
    });

    let message_row = Message {
        sender: 1,
        text: "hello".into(),
    };
    conn.handle_frame(&commit_frame(
        "set_name",
        &set_name_args("ada"),
        vec![
            user_update(&[user(1, "ada")], &[]),
            TableUpdate {
                table_name: Message::TABLE_NAME.into(),
                inserts: vec![message_row.encoded()],
                deletes: vec![],
            },
        ],
    ))
    .unwrap();

    assert_eq!(*observed.lock(), vec![(1, 1), (1, 1)]);
}

#[test]
fn test_callback_registration_from_inside_row_callback() {
    let mut conn = connected();
    let users = conn.table::<User>().unwrap();

    let handle = conn.subscribe(["SELECT * FROM user"]).unwrap();

    let late_fired = Arc::new(Mutex::new(0u32));
    let sink = Arc::clone(&late_fired);
    let users_inner = users.clone();
    users.on_insert(move |_, _| {
        // Registering more callbacks mid-dispatch must be safe and must not
        // add to the current batch.
        let sink = Arc::clone(&sink);
        users_inner.on_update(move |_, _, _| *sink.lock() += 1);
    });

    conn.handle_frame(&snapshot_frame(
        handle.request_id(),
        vec![user_update(&[user(1, "ada")], &[])],
    ))
    .unwrap();
    assert_eq!(*late_fired.lock(), 0);

    // The late-registered update callback fires for the next batch.
    conn.handle_frame(&commit_frame(
        "set_name",
        &set_name_args("ada the first"),
        vec![user_update(&[user(1, "ada the first")], &[user(1, "ada")])],
    ))
    .unwrap();
    assert_eq!(*late_fired.lock(), 1);
}

#[test]
fn test_unknown_table_does_not_poison_transaction() {
    let mut conn = connected();
    let users = conn.table::<User>().unwrap();

    let handle = conn.subscribe(["SELECT * FROM user"]).unwrap();
    conn.handle_frame(&snapshot_frame(handle.request_id(), vec![])).unwrap();

    conn.handle_frame(&commit_frame(
        "set_name",
        &set_name_args("ada"),
        vec![
            TableUpdate {
                table_name: "dropped_in_v2".into(),
                inserts: vec![Bytes::from_static(&[1, 2, 3])],
                deletes: vec![],
            },
            user_update(&[user(1, "ada")], &[]),
        ],
    ))
    .unwrap();

    assert_eq!(users.count(), 1);
}

#[test]
fn test_fatal_decode_error_surfaces() {
    let mut conn = connected();
    // A syntactically broken envelope is fatal for the connection.
    let err = conn.handle_frame(&[2, 0, 0]).unwrap_err();
    assert!(matches!(err, ClientError::Decode(_)));
}
