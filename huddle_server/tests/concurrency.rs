use huddle_protocol::{JoinPayload, MeetingId, ServerEvent};
use huddle_server::{ServerConfig, ServerState};
use pretty_assertions::assert_eq;

const ROOMS: usize = 4;
const PER_ROOM: usize = 16;

fn meeting(n: usize) -> MeetingId {
    MeetingId(format!("room{}", n % ROOMS))
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_joins_and_departures_stay_consistent() {
    let state = ServerState::new(ServerConfig {
        max_pending_events: 1024,
        ..ServerConfig::default()
    })
    .unwrap();

    let tasks: Vec<_> = (0..ROOMS * PER_ROOM)
        .map(|n| {
            let state = state.clone();
            tokio::spawn(async move {
                let connection = state.connect();
                state
                    .router()
                    .join(
                        connection,
                        JoinPayload {
                            participant_id: format!("p{n}").as_str().into(),
                            alias: None,
                            meeting_id: meeting(n),
                            is_creator: false,
                        },
                    )
                    .unwrap();
                // Every other participant leaves again straight away
                if n % 2 == 1 {
                    state.disconnect(&connection);
                }
                (n, connection)
            })
        })
        .collect();

    let mut stayed = Vec::new();
    let mut left = Vec::new();
    for task in tasks {
        let (n, connection) = task.await.unwrap();
        if n % 2 == 0 {
            stayed.push(connection);
        } else {
            left.push(connection);
        }
    }

    assert_eq!(state.registry().len(), ROOMS * PER_ROOM / 2);
    for room in 0..ROOMS {
        let meeting = meeting(room);
        assert_eq!(
            state.registry().members(&meeting),
            state.mailboxes().room_members(&meeting),
            "{meeting}"
        );
    }
    for connection in &left {
        assert!(state.registry().lookup(connection).is_none());
    }

    // Departures only ever name connections that actually left
    for connection in &stayed {
        let events: Vec<ServerEvent> = state
            .poll(connection)
            .unwrap()
            .iter()
            .map(|raw| raw.parse().unwrap())
            .collect();

        for event in &events {
            if let ServerEvent::ParticipantDeparted { sender, .. } = event {
                assert!(left.contains(sender), "departure of {sender} who never left");
            }
        }
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn join_racing_its_own_disconnect_leaves_no_orphan() {
    let state = ServerState::new(ServerConfig::default()).unwrap();
    let connections: Vec<_> = (0..64).map(|_| state.connect()).collect();

    let tasks: Vec<_> = connections
        .iter()
        .enumerate()
        .flat_map(|(n, &connection)| {
            let joining = state.clone();
            let closing = state.clone();
            [
                tokio::spawn(async move {
                    // A join that loses the race is refused, which is fine here
                    let _ = joining.router().join(
                        connection,
                        JoinPayload {
                            participant_id: format!("p{n}").as_str().into(),
                            alias: None,
                            meeting_id: meeting(n),
                            is_creator: false,
                        },
                    );
                }),
                tokio::spawn(async move {
                    closing.disconnect(&connection);
                }),
            ]
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    for connection in &connections {
        assert!(!state.mailboxes().is_connected(connection));
        assert!(state.registry().lookup(connection).is_none());
    }
    assert!(state.registry().is_empty());
    assert!(state.mailboxes().is_empty());
}
