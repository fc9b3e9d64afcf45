use serde_json::json;
use std::io::{self, BufReader, Cursor, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

use process_tracker::api::{build_router, AppState};
use process_tracker::client::{ApiClient, ClientError};
use process_tracker::dashboard;
use process_tracker::fields::{FieldDefinition, FieldKind, MetadataSchema};
use process_tracker::models::{
    CreateProcess, ListInstances, Role, StartInstance, UpdateInstance, UpdateProcess,
};
use process_tracker::popout::{OpenSurface, Surface, TtySurface};
use process_tracker::registry::{processes, users};
use process_tracker::session::Session;

/// Start a server with one user owning a process; returns the session and process id
async fn start_server(schema: MetadataSchema) -> (Session, i64, tempfile::TempDir) {
    let (pool, guard) = process_tracker::db::create_test_connection_in_temporary_file()
        .await
        .unwrap();
    process_tracker::db::init_database_schema(&pool)
        .await
        .unwrap();

    let (user, token) = users::create(&pool, "Alice", Role::User).await.unwrap();
    let process = processes::create(
        &pool,
        &user,
        CreateProcess {
            name: Some("Prep for Pitch".to_string()),
            description: None,
            metadata_schema: Some(schema),
            is_official: None,
        },
    )
    .await
    .unwrap();

    let app = build_router(Arc::new(AppState { pool }), true);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let session = Session {
        server_url: format!("http://{}", addr),
        token,
    };
    (session, process.id, guard)
}

/// Input that blocks until the test sends the next line
struct ScriptedInput {
    lines: crossbeam_channel::Receiver<String>,
    pending: Vec<u8>,
}

impl ScriptedInput {
    fn new(lines: crossbeam_channel::Receiver<String>) -> BufReader<Self> {
        BufReader::new(Self {
            lines,
            pending: Vec::new(),
        })
    }
}

impl Read for ScriptedInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.lines.recv() {
                Ok(line) => self.pending = format!("{}\n", line).into_bytes(),
                Err(_) => return Ok(0),
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// Output readable while another thread is still writing to it
#[derive(Clone, Default)]
struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn wait_for(output: &SharedOutput, needle: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !output.text().contains(needle) {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {:?} in {:?}",
            needle,
            output.text()
        );
        thread::sleep(Duration::from_millis(20));
    }
}

fn client_schema() -> MetadataSchema {
    MetadataSchema::new(vec![FieldDefinition::new(
        "Client Name",
        FieldKind::Text,
        true,
    )])
}

#[tokio::test]
async fn test_client_round_trip() {
    let (session, process_id, _guard) = start_server(client_schema()).await;

    // The blocking client must stay off the async runtime threads
    let result = tokio::task::spawn_blocking(move || {
        let client = ApiClient::new();

        let me = client.me(&session).unwrap();
        assert_eq!(me.name, "Alice");

        let listed = client.list_processes(&session).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].metadata_schema, client_schema());

        let started = client
            .start_instance(
                &session,
                &StartInstance {
                    process_id: Some(process_id),
                    start_time: Some("2024-01-01T10:00:00Z".parse().unwrap()),
                    metadata: None,
                },
            )
            .unwrap();
        let stopped = client
            .update_instance(
                &session,
                started.id,
                &UpdateInstance {
                    end_time: Some("2024-01-01T10:02:30Z".parse().unwrap()),
                    metadata: None,
                },
            )
            .unwrap();
        assert_eq!(stopped.duration_seconds, Some(150));

        let instances = client
            .list_instances(&session, &ListInstances::default())
            .unwrap();
        assert_eq!(instances.len(), 1);

        let stats = client.summary(&session).unwrap();
        assert_eq!(stats.total_seconds, 150);

        let missing = client.get_process(&session, 9999).unwrap_err();
        assert_eq!(missing.status(), Some(404));
        assert!(matches!(missing, ClientError::Api { .. }));

        let anonymous = Session {
            server_url: session.server_url.clone(),
            token: "pt_wrong".to_string(),
        };
        match client.list_processes(&anonymous) {
            Err(ClientError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Authentication required");
            }
            other => panic!("expected 401, got {:?}", other.map(|p| p.len())),
        }
    })
    .await;
    result.unwrap();
}

#[tokio::test]
async fn test_track_records_instance_with_metadata() {
    let (session, process_id, _guard) = start_server(client_schema()).await;

    let result = tokio::task::spawn_blocking(move || {
        let client = ApiClient::new();
        // start, stop, answer the required field, quit
        let input = Cursor::new(b"\ns\nAcme\nq\n".to_vec());
        let mut out = Vec::new();
        let completed =
            dashboard::track(&client, &session, Some(process_id), input, &mut out, None)
                .unwrap();

        assert_eq!(completed.len(), 1);
        let instance = &completed[0];
        assert!(instance.end_time.is_some());
        assert!(instance.duration_seconds.is_some());
        assert_eq!(instance.metadata["Client Name"], json!("Acme"));

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Started 'Prep for Pitch'"));
        assert!(text.contains("Saved instance"));
        assert!(!text.contains("p to pop out"));
    })
    .await;
    result.unwrap();
}

#[tokio::test]
async fn test_track_unknown_process_is_error() {
    let (session, _, _guard) = start_server(MetadataSchema::default()).await;

    let result = tokio::task::spawn_blocking(move || {
        let client = ApiClient::new();
        let mut out = Vec::new();
        let err = dashboard::track(
            &client,
            &session,
            Some(424242),
            Cursor::new(Vec::new()),
            &mut out,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("424242"));
    })
    .await;
    result.unwrap();
}

#[tokio::test]
async fn test_edit_instance_replaces_metadata() {
    let (session, process_id, _guard) = start_server(client_schema()).await;

    let result = tokio::task::spawn_blocking(move || {
        let client = ApiClient::new();
        let started = client
            .start_instance(
                &session,
                &StartInstance {
                    process_id: Some(process_id),
                    start_time: None,
                    metadata: Some(json!({ "Client Name": "Acme" }).as_object().cloned().unwrap()),
                },
            )
            .unwrap();

        let mut input = Cursor::new(b"Globex\n".to_vec());
        let mut out = Vec::new();
        let saved =
            dashboard::edit_instance(&client, &session, started.id, &mut input, &mut out).unwrap();
        assert_eq!(saved.metadata["Client Name"], json!("Globex"));
        assert!(saved.end_time.is_none());
    })
    .await;
    result.unwrap();
}

#[tokio::test]
async fn test_client_manages_processes_and_instances() {
    let (session, _, _guard) = start_server(MetadataSchema::default()).await;

    let result = tokio::task::spawn_blocking(move || {
        let client = ApiClient::new();

        let created = client
            .create_process(
                &session,
                &CreateProcess {
                    name: Some("Onboarding".to_string()),
                    description: Some("new hires".to_string()),
                    metadata_schema: Some(client_schema()),
                    is_official: Some(true),
                },
            )
            .unwrap();
        assert_eq!(created.creator_name.as_deref(), Some("Alice"));
        assert!(!created.is_official);
        assert_eq!(created.metadata_schema, client_schema());

        let renamed = client
            .update_process(
                &session,
                created.id,
                &UpdateProcess {
                    name: Some("Onboarding v2".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.name, "Onboarding v2");
        assert_eq!(renamed.description.as_deref(), Some("new hires"));

        let instance = client
            .start_instance(
                &session,
                &StartInstance {
                    process_id: Some(created.id),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(client.delete_instance(&session, instance.id).unwrap().contains("deleted"));
        assert_eq!(
            client.get_instance(&session, instance.id).unwrap_err().status(),
            Some(404)
        );
        assert_eq!(
            client.delete_instance(&session, instance.id).unwrap_err().status(),
            Some(404)
        );

        assert!(client.delete_process(&session, created.id).unwrap().contains("deleted"));
        assert_eq!(
            client.get_process(&session, created.id).unwrap_err().status(),
            Some(404)
        );
    })
    .await;
    result.unwrap();
}

#[tokio::test]
async fn test_process_workflows_prompt_on_the_terminal() {
    let (session, _, _guard) = start_server(MetadataSchema::default()).await;

    let result = tokio::task::spawn_blocking(move || {
        let client = ApiClient::new();
        let mut out = Vec::new();

        let mut input = Cursor::new(b"Client Name\ntext\ny\n\n".to_vec());
        let created = dashboard::create_process(
            &client,
            &session,
            CreateProcess {
                name: Some("Onboarding".to_string()),
                ..Default::default()
            },
            &mut input,
            &mut out,
        )
        .unwrap();
        assert_eq!(created.metadata_schema, client_schema());

        let mut input = Cursor::new(b"Stage\nselect\nIntro, Wrap-up\nn\n\n".to_vec());
        let edited = dashboard::edit_process(
            &client,
            &session,
            created.id,
            UpdateProcess {
                description: Some("two stages".to_string()),
                ..Default::default()
            },
            true,
            &mut input,
            &mut out,
        )
        .unwrap();
        assert_eq!(edited.name, "Onboarding");
        assert_eq!(edited.description.as_deref(), Some("two stages"));
        assert_eq!(
            edited.metadata_schema,
            MetadataSchema::new(vec![FieldDefinition::new(
                "Stage",
                FieldKind::Select {
                    options: vec!["Intro".to_string(), "Wrap-up".to_string()]
                },
                false,
            )])
        );

        let err = dashboard::edit_process(
            &client,
            &session,
            created.id,
            UpdateProcess::default(),
            false,
            &mut Cursor::new(Vec::new()),
            &mut out,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Nothing to change"));

        let kept = dashboard::delete_process(
            &client,
            &session,
            created.id,
            false,
            &mut Cursor::new(b"n\n".to_vec()),
            &mut out,
        )
        .unwrap();
        assert!(!kept);
        assert!(client.get_process(&session, created.id).is_ok());

        let deleted = dashboard::delete_process(
            &client,
            &session,
            created.id,
            false,
            &mut Cursor::new(b"y\n".to_vec()),
            &mut out,
        )
        .unwrap();
        assert!(deleted);
        assert_eq!(
            client.get_process(&session, created.id).unwrap_err().status(),
            Some(404)
        );

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Created process"));
        assert!(text.contains("Client Name (text, required)"));
        assert!(text.contains("Kept 'Onboarding'"));
    })
    .await;
    result.unwrap();
}

#[tokio::test]
async fn test_track_stops_from_the_popout() {
    let (session, process_id, _guard) = start_server(client_schema()).await;

    let result = tokio::task::spawn_blocking(move || {
        let (main_tx, main_rx) = crossbeam_channel::unbounded::<String>();
        let (popout_tx, popout_rx) = crossbeam_channel::unbounded::<String>();
        let main_out = SharedOutput::default();
        let popout_out = SharedOutput::default();

        let tracking = {
            let session = session.clone();
            let mut main_out = main_out.clone();
            let popout_out = popout_out.clone();
            thread::spawn(move || {
                let open = move || -> io::Result<Box<dyn Surface + Send>> {
                    Ok(Box::new(TtySurface::new(
                        popout_out.clone(),
                        ScriptedInput::new(popout_rx.clone()),
                    )))
                };
                let opener: &OpenSurface = &open;
                dashboard::track(
                    &ApiClient::new(),
                    &session,
                    Some(process_id),
                    ScriptedInput::new(main_rx),
                    &mut main_out,
                    Some(opener),
                )
                .unwrap()
            })
        };

        main_tx.send(String::new()).unwrap();
        wait_for(&main_out, "p to pop out");
        main_tx.send("p".to_string()).unwrap();
        // Enter on the popout terminal
        popout_tx.send(String::new()).unwrap();
        wait_for(&main_out, "Client Name *");
        main_tx.send("Acme".to_string()).unwrap();
        wait_for(&main_out, "Saved instance");
        main_tx.send("q".to_string()).unwrap();
        drop(main_tx);

        let completed = tracking.join().unwrap();
        assert_eq!(completed.len(), 1);
        assert!(completed[0].end_time.is_some());
        assert_eq!(completed[0].metadata["Client Name"], json!("Acme"));

        let popout_text = popout_out.text();
        assert!(popout_text.contains("Prep for Pitch  "));
        assert!(popout_text.contains("(Enter to stop)"));
        assert!(popout_text.ends_with("Stopped\n"));

        let stored = ApiClient::new()
            .list_instances(&session, &ListInstances::default())
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_completed());
    })
    .await;
    result.unwrap();
}

#[tokio::test]
async fn test_track_failed_start_leaves_timer_idle() {
    let (session, process_id, _guard) = start_server(MetadataSchema::default()).await;

    let result = tokio::task::spawn_blocking(move || {
        let (main_tx, main_rx) = crossbeam_channel::unbounded::<String>();
        let main_out = SharedOutput::default();

        let tracking = {
            let session = session.clone();
            let mut main_out = main_out.clone();
            thread::spawn(move || {
                dashboard::track(
                    &ApiClient::new(),
                    &session,
                    None,
                    ScriptedInput::new(main_rx),
                    &mut main_out,
                    None,
                )
                .unwrap()
            })
        };

        // The process disappears between listing and starting
        wait_for(&main_out, "Select a process");
        let client = ApiClient::new();
        client.delete_process(&session, process_id).unwrap();
        main_tx.send("1".to_string()).unwrap();
        main_tx.send(String::new()).unwrap();
        wait_for(&main_out, "Could not start");
        main_tx.send("q".to_string()).unwrap();
        drop(main_tx);

        let completed = tracking.join().unwrap();
        assert!(completed.is_empty());
        let text = main_out.text();
        assert!(!text.contains("Stop the timer first"));
        assert!(!text.contains("Stopped at"));
        assert!(client
            .list_instances(&session, &ListInstances::default())
            .unwrap()
            .is_empty());
    })
    .await;
    result.unwrap();
}
