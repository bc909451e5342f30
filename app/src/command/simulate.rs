use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use colloquy_conversation::{ConversationManager, TokioScheduler};
use colloquy_core::{ConversationConfig, ConversationError, SessionHandle};
use colloquy_session::{SessionAttributes, SessionBeanStoreProvider};
use serde_json::json;
use tracing::info;

const COUNTER: &str = "counter";

/// Input parameters for the Simulate command strategy.
#[derive(Debug, Clone)]
pub struct SimulateInput {
    /// Configuration the CLI flags are applied on top of
    pub config: ConversationConfig,
    pub asynchronous: bool,
    pub timeout_ms: u64,
    /// Number of times the conversation is resumed
    pub requests: u32,
}

/// Strategy for running one session through a scripted conversation lifecycle.
///
/// The script begins a conversation, resumes it a number of times, shows a
/// concurrent resume being refused, then lets the conversation expire.
#[derive(Debug, Clone, Copy)]
pub struct SimulateStrategy;

impl super::CommandStrategy for SimulateStrategy {
    type Input = SimulateInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config = input
            .config
            .with_default_timeout_ms(input.timeout_ms)
            .with_asynchronous(input.asynchronous);
        let scheduler = Arc::new(TokioScheduler::current());

        // Requests block on conversation locks, so they run off the async workers.
        tokio::task::spawn_blocking(move || run_script(config, scheduler, input.requests))
            .await?
    }
}

fn run_script(
    config: ConversationConfig,
    scheduler: Arc<TokioScheduler>,
    requests: u32,
) -> anyhow::Result<()> {
    let timeout = Duration::from_millis(config.default_timeout_ms);
    let attributes = SessionAttributes::new();
    let provider = Arc::new(SessionBeanStoreProvider::new(attributes.clone()));
    let session = SessionHandle::new();
    let manager = Arc::new(
        ConversationManager::new(session, provider, config).with_scheduler(scheduler),
    );

    println!("=== colloquy simulation ===\n");
    println!("Session: {session}");
    println!(
        "Expiry: {}, timeout {timeout:?}\n",
        if manager.is_asynchronous() {
            "asynchronous"
        } else {
            "synchronous"
        }
    );

    let cid = begin(&manager)?;
    println!("Began conversation {cid}");

    for _ in 0..requests {
        let count = increment(&manager, &cid)?;
        println!("Resumed conversation {cid}: {COUNTER} = {count}");
    }

    match resume_while_held(&manager, &cid)? {
        Err(ConversationError::Busy(_)) => {
            println!("Concurrent resume of {cid}: busy, as expected");
        }
        other => println!("Concurrent resume of {cid}: unexpected outcome {other:?}"),
    }

    println!(
        "Tracked: {} conversation(s), {} session attribute(s)",
        manager.conversation_count(),
        attributes.len()
    );

    info!("Waiting for conversation {cid} to expire");
    thread::sleep(timeout + Duration::from_millis(100));

    let mut request = manager.new_request();
    match manager.setup_conversation(&mut request, Some(&cid)) {
        Err(ConversationError::Nonexistent(_)) => {
            println!("Resume after {timeout:?} idle: conversation {cid} has expired");
        }
        Err(e) => println!("Resume after {timeout:?} idle: {e}"),
        Ok(()) => println!("Resume after {timeout:?} idle: conversation {cid} still alive"),
    }
    manager.teardown_conversation(&mut request)?;

    println!(
        "Tracked: {} conversation(s), {} session attribute(s)",
        manager.conversation_count(),
        attributes.len()
    );

    manager.destroy_all_conversations();
    Ok(())
}

fn begin(manager: &ConversationManager) -> anyhow::Result<String> {
    let mut request = manager.new_request();
    manager.setup_conversation(&mut request, None)?;
    request.begin(manager)?;
    request.context_mut().put(COUNTER, json!(0));
    manager.teardown_conversation(&mut request)?;
    request
        .conversation()
        .id()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Conversation is still transient after begin"))
}

fn increment(manager: &ConversationManager, cid: &str) -> anyhow::Result<u64> {
    let mut request = manager.new_request();
    manager.setup_conversation(&mut request, Some(cid))?;
    let count = request
        .context()
        .get(COUNTER)
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0)
        + 1;
    request.context_mut().put(COUNTER, json!(count));
    manager.teardown_conversation(&mut request)?;
    Ok(count)
}

/// Try to resume `cid` while another thread holds it.
fn resume_while_held(
    manager: &Arc<ConversationManager>,
    cid: &str,
) -> anyhow::Result<colloquy_core::Result<()>> {
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let holder = {
        let manager = manager.clone();
        let cid = cid.to_string();
        thread::spawn(move || -> anyhow::Result<()> {
            let mut request = manager.new_request();
            let setup = manager.setup_conversation(&mut request, Some(&cid));
            let _ = locked_tx.send(setup.is_ok());
            let _ = release_rx.recv();
            manager.teardown_conversation(&mut request)?;
            setup.map_err(anyhow::Error::from)
        })
    };

    let held = locked_rx.recv().unwrap_or(false);
    let mut request = manager.new_request();
    let outcome = if held {
        manager.setup_conversation(&mut request, Some(cid))
    } else {
        Ok(())
    };
    let _ = release_tx.send(());
    manager.teardown_conversation(&mut request)?;

    holder
        .join()
        .map_err(|_| anyhow::anyhow!("Holder thread panicked"))??;
    Ok(outcome)
}
