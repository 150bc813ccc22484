//! End-to-end call flow tests against an in-memory dialing API and
//! scripted pipeline services.

mod common;

use common::{scripted_pipeline, speech_frame, DialBehavior, FakeTelephony};
use dialout_records::{conversational_turns, create_pool, query_events, run_migrations, DbPool, DbRuntimeSettings};
use dialout_session::{AgentReply, RoomAudioClient};
use dialout_telephony::{DialingApi, LiveKitConfig};
use dialout_types::{AgentIntent, CallOutcome, DialInfo};
use dialout_worker::config::Config;
use dialout_worker::orchestrator::CallOrchestrator;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn test_config() -> Config {
    let mut config = Config::default();
    config.livekit = LiveKitConfig::new("http://localhost:7880", "devkey", "devsecret", "ST_test");
    config.call.answer_timeout_secs = 1;
    config.call.status_poll_interval_ms = 10;
    config.call.join_wait_secs = 1;
    config.call.max_duration_secs = 5;
    config.agent.turn_silence_ms = 40;
    config
}

fn journal_pool(dir: &tempfile::TempDir) -> DbPool {
    let path = dir.path().join("records.db");
    let pool = create_pool(
        path.to_str().expect("utf-8 path"),
        DbRuntimeSettings::default(),
    )
    .expect("pool");
    {
        let conn = pool.get().expect("conn");
        run_migrations(&conn).expect("migrations");
    }
    pool
}

/// Captures the per-call room audio client so the test can play the
/// callee's side of the conversation.
fn capture_room() -> (
    Arc<Mutex<Option<Arc<RoomAudioClient>>>>,
    impl Fn(Arc<RoomAudioClient>) + Send + Sync + 'static,
) {
    let captured: Arc<Mutex<Option<Arc<RoomAudioClient>>>> = Arc::new(Mutex::new(None));
    let slot = captured.clone();
    (captured, move |room| {
        *slot.lock().unwrap() = Some(room);
    })
}

fn event_types(pool: &DbPool) -> Vec<String> {
    let conn = pool.get().expect("conn");
    let call_ids: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT DISTINCT call_id FROM call_event_log")
            .expect("prepare");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .expect("query");
        rows.collect::<Result<Vec<_>, _>>().expect("collect")
    };
    assert_eq!(call_ids.len(), 1, "exactly one call journal expected");
    query_events(&conn, &call_ids[0])
        .expect("query events")
        .into_iter()
        .map(|e| e.event_type)
        .collect()
}

fn turns_recorded(pool: &DbPool) -> i64 {
    let conn = pool.get().expect("conn");
    let call_ids: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT DISTINCT call_id FROM call_event_log")
            .expect("prepare");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .expect("query");
        rows.collect::<Result<Vec<_>, _>>().expect("collect")
    };
    call_ids
        .iter()
        .map(|id| conversational_turns(&conn, id).expect("count"))
        .sum()
}

/// Plays one callee turn into the captured room: a burst of speech
/// frames followed by silence long enough to end the turn.
async fn play_turn(room: &RoomAudioClient) {
    for _ in 0..3 {
        room.push_inbound(&speech_frame()).expect("room connected");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(120)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn confirmed_appointment_then_end_call_deletes_room() {
    let fake = FakeTelephony::new();
    fake.script_callee_statuses(vec![None, Some("dialing"), Some("ringing"), Some("active")]);
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = journal_pool(&dir);
    let (captured, hook) = capture_room();

    let replies = vec![
        AgentReply {
            say: None,
            intents: vec![AgentIntent::ConfirmAppointment {
                date: "next Tuesday".to_string(),
                time: "3pm".to_string(),
            }],
        },
        AgentReply {
            say: Some("Goodbye!".to_string()),
            intents: vec![AgentIntent::EndCall],
        },
    ];
    let telephony: Arc<dyn DialingApi> = fake.clone();
    let orchestrator = CallOrchestrator::new(
        telephony,
        scripted_pipeline(vec!["yes please confirm it", "thanks, goodbye"], replies),
        pool.clone(),
        test_config(),
    )
    .on_room_connected(hook);

    let job = tokio::spawn(async move {
        orchestrator
            .place_call(DialInfo::new("+15105550100"))
            .await
            .expect("call should be attempted")
    });

    // Wait out the dial (50ms) and binding, then play two callee turns.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let room = captured
        .lock()
        .unwrap()
        .clone()
        .expect("room should have connected");
    play_turn(&room).await;
    play_turn(&room).await;

    let outcome = tokio::time::timeout(Duration::from_secs(10), job)
        .await
        .expect("job should finish")
        .expect("job should not panic");
    assert_eq!(outcome, CallOutcome::Completed);

    // The room is deleted exactly once.
    assert_eq!(fake.deleted_rooms().len(), 1);

    let types = event_types(&pool);
    assert!(types.contains(&"ACTION_INVOKED".to_string()));
    assert_eq!(types.last().map(String::as_str), Some("CALL_ENDED"));
    assert!(turns_recorded(&pool) >= 2, "both sides of the dialogue are journaled");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn automation_then_voicemail_hangs_up_without_appointment_actions() {
    let fake = FakeTelephony::new();
    fake.script_callee_statuses(vec![
        None,
        Some("dialing"),
        Some("automation"),
        Some("automation"),
        Some("active"),
    ]);
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = journal_pool(&dir);
    let (captured, hook) = capture_room();

    let replies = vec![AgentReply {
        say: None,
        intents: vec![AgentIntent::DetectedAnsweringMachine],
    }];
    let telephony: Arc<dyn DialingApi> = fake.clone();
    let orchestrator = CallOrchestrator::new(
        telephony,
        scripted_pipeline(vec!["please leave a message after the tone"], replies),
        pool.clone(),
        test_config(),
    )
    .on_room_connected(hook);

    let job = tokio::spawn(async move {
        orchestrator
            .place_call(DialInfo::new("+15105550100"))
            .await
            .expect("call should be attempted")
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let room = captured
        .lock()
        .unwrap()
        .clone()
        .expect("room should have connected");
    play_turn(&room).await;

    let outcome = tokio::time::timeout(Duration::from_secs(10), job)
        .await
        .expect("job should finish")
        .expect("job should not panic");
    assert_eq!(outcome, CallOutcome::Voicemail);
    assert_eq!(fake.deleted_rooms().len(), 1);

    // The automation status was observed and journaled, and no
    // appointment action ever executed.
    let conn = pool.get().expect("conn");
    let call_ids: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT DISTINCT call_id FROM call_event_log")
            .expect("prepare");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .expect("query");
        rows.collect::<Result<Vec<_>, _>>().expect("collect")
    };
    let events = query_events(&conn, &call_ids[0]).expect("events");
    let payloads: Vec<String> = events.iter().map(|e| e.payload_json.clone()).collect();
    assert!(
        payloads.iter().any(|p| p.contains("\"automation\"")),
        "automation status should be journaled"
    );
    assert!(
        payloads
            .iter()
            .any(|p| p.contains("detected_answering_machine")),
        "voicemail action should be journaled"
    );
    assert!(
        !payloads.iter().any(|p| p.contains("confirm_appointment")),
        "no appointment action may execute on a voicemail call"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn never_answered_call_times_out_with_no_turns() {
    let fake = FakeTelephony::new();
    fake.set_callee_dial(DialBehavior::Never);
    fake.script_callee_statuses(vec![None, Some("dialing"), Some("ringing")]);
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = journal_pool(&dir);

    let telephony: Arc<dyn DialingApi> = fake.clone();
    let orchestrator = CallOrchestrator::new(
        telephony,
        scripted_pipeline(vec![], vec![]),
        pool.clone(),
        test_config(),
    );

    let outcome = orchestrator
        .place_call(DialInfo::new("+15105550100"))
        .await
        .expect("call should be attempted");

    assert_eq!(outcome, CallOutcome::AnswerTimeout);
    assert_eq!(fake.deleted_rooms().len(), 1);
    assert_eq!(turns_recorded(&pool), 0, "a timed-out job records no turns");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pre_answer_hangup_terminates_without_conversation() {
    let fake = FakeTelephony::new();
    fake.set_callee_dial(DialBehavior::Never);
    fake.script_callee_statuses(vec![None, Some("dialing"), Some("ringing"), Some("hangup")]);
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = journal_pool(&dir);

    let telephony: Arc<dyn DialingApi> = fake.clone();
    let orchestrator = CallOrchestrator::new(
        telephony,
        scripted_pipeline(vec![], vec![]),
        pool.clone(),
        test_config(),
    );

    let outcome = orchestrator
        .place_call(DialInfo::new("+15105550100"))
        .await
        .expect("call should be attempted");

    assert_eq!(outcome, CallOutcome::CalleeHangup);
    assert_eq!(
        fake.deleted_rooms().len(),
        1,
        "room deleted exactly once after hangup"
    );
    assert_eq!(turns_recorded(&pool), 0);

    let types = event_types(&pool);
    assert!(!types.contains(&"ACTION_INVOKED".to_string()));
    assert_eq!(types.last().map(String::as_str), Some("CALL_ENDED"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn structured_dial_rejection_is_journaled_and_fatal() {
    let fake = FakeTelephony::new();
    fake.set_callee_dial(DialBehavior::Reject {
        sip_status_code: 486,
        sip_status: "USER_BUSY",
    });
    fake.script_callee_statuses(vec![None]);
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = journal_pool(&dir);

    let telephony: Arc<dyn DialingApi> = fake.clone();
    let orchestrator = CallOrchestrator::new(
        telephony,
        scripted_pipeline(vec![], vec![]),
        pool.clone(),
        test_config(),
    );

    let outcome = orchestrator
        .place_call(DialInfo::new("+15105550100"))
        .await
        .expect("call should be attempted");

    assert_eq!(outcome, CallOutcome::DialFailed);
    assert_eq!(fake.deleted_rooms().len(), 1);
    assert_eq!(turns_recorded(&pool), 0);

    let types = event_types(&pool);
    assert!(types.contains(&"DIAL_FAILED".to_string()));

    let conn = pool.get().expect("conn");
    let call_ids: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT DISTINCT call_id FROM call_event_log")
            .expect("prepare");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .expect("query");
        rows.collect::<Result<Vec<_>, _>>().expect("collect")
    };
    let events = query_events(&conn, &call_ids[0]).expect("events");
    let dial_failed = events
        .iter()
        .find(|e| e.event_type == "DIAL_FAILED")
        .expect("dial failure journaled");
    assert!(dial_failed.payload_json.contains("486"));
    assert!(dial_failed.payload_json.contains("USER_BUSY"));
}
