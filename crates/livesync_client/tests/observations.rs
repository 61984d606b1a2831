//! Observations, replay and projections driven through a connection.

use std::sync::Arc;

use livesync_client::{
    ClientMessage, Connection, ConnectionConfig, MockTransport, ObservableList, ObservableValue,
    Path, Value,
};
use livesync_testkit::fixtures::{self, keyed, labeled};
use parking_lot::Mutex;

fn open_connection() -> (Connection, MockTransport) {
    let transport = MockTransport::new();
    let connection = Connection::new(
        ConnectionConfig::new("mock://observations").with_session_id("session-1"),
        transport.clone(),
    )
    .unwrap();
    connection.connect().unwrap();
    transport.simulate_open();
    transport.take_sent();
    (connection, transport)
}

fn reconnect(connection: &Connection, transport: &MockTransport) {
    transport.simulate_drop();
    connection.connect().unwrap();
    transport.simulate_open();
}

fn observes(transport: &MockTransport, path: &str) -> usize {
    let what = Path::from(path);
    transport
        .sent_messages()
        .iter()
        .filter(|message| matches!(message, ClientMessage::Observe { what: w } if *w == what))
        .count()
}

fn unobserves(transport: &MockTransport, path: &str) -> usize {
    let what = Path::from(path);
    transport
        .sent_messages()
        .iter()
        .filter(|message| matches!(message, ClientMessage::Unobserve { what: w } if *w == what))
        .count()
}

fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str, &Value) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |name: &str, args: &Value| {
        sink.lock().push(format!("{name} {args}"));
    })
}

#[test]
fn first_projection_observes_once() {
    let (connection, transport) = open_connection();
    let a = connection.value("status");
    let b = connection.value("status");
    assert!(a.same_as(&b));
    let _list = connection.list("status");

    assert_eq!(observes(&transport, "status"), 1);
    assert_eq!(connection.observation_count(), 1);
    assert_eq!(
        transport.sent_documents()[0],
        Value::empty_map()
            .with("type", "observe")
            .with("what", "status")
            .with("pushed", false)
    );
}

#[test]
fn refcount_unobserves_after_last_detach() {
    let (connection, transport) = open_connection();
    let observation = connection.observation("items");
    let lists: Vec<ObservableList> = (0..3).map(|_| ObservableList::new()).collect();
    for list in &lists {
        observation.attach(list);
    }
    assert_eq!(observation.subscriber_count(), 3);
    assert_eq!(observes(&transport, "items"), 1);

    lists[0].dispose();
    lists[1].dispose();
    assert_eq!(observation.subscriber_count(), 1);
    assert_eq!(unobserves(&transport, "items"), 0);
    assert!(connection.find_observation(&Path::from("items")).is_some());

    lists[2].dispose();
    assert_eq!(unobserves(&transport, "items"), 1);
    assert!(observation.is_retired());
    assert!(connection.find_observation(&Path::from("items")).is_none());
    assert_eq!(connection.observation_count(), 0);

    drop(lists);
    assert_eq!(unobserves(&transport, "items"), 1);
}

#[test]
fn lookups_without_projections_leave_no_entries() {
    let (connection, transport) = open_connection();
    for i in 0..100 {
        let observation = connection.observation(format!("p{i}"));
        assert_eq!(observation.subscriber_count(), 0);
    }
    assert_eq!(connection.observation_count(), 0);
    assert!(transport.sent().is_empty());

    let observation = connection.observation("p0");
    let list = ObservableList::new();
    observation.attach(&list);
    assert_eq!(connection.observation_count(), 1);
    let current = connection.find_observation(&Path::from("p0")).unwrap();
    assert!(Arc::ptr_eq(&current, &observation));
    assert_eq!(observes(&transport, "p0"), 1);
}

#[test]
fn two_unattached_lookups_share_one_subscription() {
    let (connection, transport) = open_connection();
    let first = connection.observation("shared");
    let second = connection.observation("shared");
    assert!(!Arc::ptr_eq(&first, &second));

    let a = ObservableList::new();
    let b = ObservableList::new();
    first.attach(&a);
    second.attach(&b);

    assert!(second.is_retired());
    assert_eq!(first.subscriber_count(), 2);
    assert_eq!(connection.observation_count(), 1);
    assert_eq!(observes(&transport, "shared"), 1);

    a.dispose();
    assert_eq!(unobserves(&transport, "shared"), 0);
    b.dispose();
    assert_eq!(unobserves(&transport, "shared"), 1);
    assert_eq!(connection.observation_count(), 0);
}

#[test]
fn dropping_the_last_handle_unobserves() {
    let (connection, transport) = open_connection();
    let value = connection.value("status");
    let clone = value.clone();
    drop(value);
    assert_eq!(unobserves(&transport, "status"), 0);

    drop(clone);
    assert_eq!(unobserves(&transport, "status"), 1);
    assert_eq!(connection.observation_count(), 0);
}

#[test]
fn late_subscriber_sees_log_before_live_notifications() {
    let (connection, transport) = open_connection();
    let first = connection.list("feed");
    transport
        .simulate_message(&fixtures::notify_set("feed", Value::from(Vec::<Value>::new())))
        .unwrap();
    transport
        .simulate_message(&fixtures::notify_push("feed", 1.into()))
        .unwrap();

    let second = ObservableList::new();
    let (seen, callback) = recorder();
    second.observe(callback);
    connection.observation("feed").attach(&second);
    transport
        .simulate_message(&fixtures::notify_push("feed", 2.into()))
        .unwrap();

    assert_eq!(
        *seen.lock(),
        vec!["set [[]]", "set [[]]", "push [1]", "push [2]"]
    );
    assert_eq!(first.items(), second.items());
    assert_eq!(second.items(), vec![Value::from(1), Value::from(2)]);
}

#[test]
fn reconnect_clears_log_and_observes_again() {
    let (connection, transport) = open_connection();
    let value = connection.value("counter");
    transport
        .simulate_message(&fixtures::notify_set("counter", 1.into()))
        .unwrap();
    let observation = connection.observation("counter");
    assert_eq!(observation.replay_len(), 1);

    transport.take_sent();
    reconnect(&connection, &transport);
    assert_eq!(observation.replay_len(), 0);
    assert_eq!(observes(&transport, "counter"), 1);
    assert_eq!(value.get(), Value::from(1));

    transport
        .simulate_message(&fixtures::notify_set("counter", 2.into()))
        .unwrap();
    assert_eq!(observation.replay_len(), 1);
    assert_eq!(value.get(), Value::from(2));
}

#[test]
fn reconnect_observes_a_crowded_path_once() {
    let (connection, transport) = open_connection();
    let observation = connection.observation("items");
    let lists: Vec<ObservableList> = (0..3).map(|_| ObservableList::new()).collect();
    for list in &lists {
        observation.attach(list);
    }
    let _value = connection.value("items");
    assert_eq!(observation.subscriber_count(), 4);
    assert_eq!(observes(&transport, "items"), 1);

    transport.take_sent();
    reconnect(&connection, &transport);
    assert_eq!(observes(&transport, "items"), 1);
    assert_eq!(connection.observation_count(), 1);
}

#[test]
fn observations_made_offline_are_sent_on_open() {
    let transport = MockTransport::new();
    let connection = Connection::new(ConnectionConfig::new("mock://"), transport.clone()).unwrap();
    let _a = connection.value("a");
    let _b = connection.list("b");
    assert!(transport.sent().is_empty());

    connection.connect().unwrap();
    transport.simulate_open();
    assert_eq!(observes(&transport, "a"), 1);
    assert_eq!(observes(&transport, "b"), 1);
    assert!(matches!(
        transport.sent_messages().first(),
        Some(ClientMessage::InitializeSession { .. })
    ));
}

#[test]
fn notifications_for_unknown_paths_are_dropped() {
    let (connection, transport) = open_connection();
    transport
        .simulate_message(&fixtures::notify_set("nobody", 1.into()))
        .unwrap();
    let stats = connection.stats();
    assert_eq!(stats.dropped_notifications, 1);
    assert_eq!(stats.notifications, 0);
    assert_eq!(connection.observation_count(), 0);
}

#[test]
fn respawn_observes_again() {
    let (connection, transport) = open_connection();
    let value = connection.value("status");
    transport
        .simulate_message(&fixtures::notify_set("status", "up".into()))
        .unwrap();

    value.dispose();
    assert!(!value.is_active());
    assert_eq!(unobserves(&transport, "status"), 1);

    value.respawn();
    assert!(value.is_active());
    assert!(!value.is_initialized());
    assert_eq!(observes(&transport, "status"), 2);
    assert_eq!(connection.observation_count(), 1);

    transport
        .simulate_message(&fixtures::notify_set("status", "down".into()))
        .unwrap();
    assert_eq!(value.get(), Value::from("down"));
    assert!(connection.value("status").same_as(&value));
}

#[test]
fn keyed_list_follows_server_signals() {
    let (connection, transport) = open_connection();
    let list = connection.list("users");
    let initial = Value::from(vec![keyed("id", 1), keyed("id", 3), keyed("id", 7)]);
    transport
        .simulate_message(&fixtures::notify_set("users", initial))
        .unwrap();

    let put = Value::from(vec![Value::from("id"), Value::from(5), labeled("id", 5, "new")]);
    transport
        .simulate_message(&fixtures::notify("users", "putByKey", put))
        .unwrap();
    assert_eq!(
        list.items(),
        vec![
            keyed("id", 1),
            keyed("id", 3),
            labeled("id", 5, "new"),
            keyed("id", 7)
        ]
    );

    let update = Value::from(vec![Value::from("id"), Value::from(3), labeled("id", 3, "x")]);
    transport
        .simulate_message(&fixtures::notify("users", "updateByField", update))
        .unwrap();
    let remove = Value::from(vec![Value::from("id"), Value::from(1)]);
    transport
        .simulate_message(&fixtures::notify("users", "removeByKey", remove))
        .unwrap();

    assert_eq!(
        list.items(),
        vec![labeled("id", 3, "x"), labeled("id", 5, "new"), keyed("id", 7)]
    );
    assert_eq!(connection.stats().notifications, 4);
}

#[test]
fn bad_signal_for_one_projection_does_not_affect_others() {
    let (connection, transport) = open_connection();
    let value = connection.value("mixed");
    let list = connection.list("mixed");

    transport
        .simulate_message(&fixtures::notify_push("mixed", 9.into()))
        .unwrap();
    assert_eq!(list.items(), vec![Value::from(9)]);
    assert!(!value.is_initialized());
}

#[test]
fn projection_dropped_inside_its_callback_detaches() {
    let (connection, transport) = open_connection();
    let holder: Arc<Mutex<Option<ObservableValue>>> = Arc::new(Mutex::new(None));
    let value = connection.value("once");

    let slot = Arc::clone(&holder);
    value.observe(move |name, _| {
        if name == "set" {
            if let Some(value) = slot.lock().as_ref() {
                value.dispose();
            }
        }
    });
    *holder.lock() = Some(value);

    transport
        .simulate_message(&fixtures::notify_set("once", 1.into()))
        .unwrap();
    assert_eq!(unobserves(&transport, "once"), 1);
    assert_eq!(connection.observation_count(), 0);
}
