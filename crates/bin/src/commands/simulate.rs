//! Scripted session against an in-memory remote.
//!
//! Signs a user in, makes a series of CRS edits, records an assessment, waits
//! for the write-behind synchronizer to settle, prints the result and signs
//! out again. The CRS profile is cached in the real file cache, so repeated
//! runs pick up where the last one stopped.

use std::{sync::Arc, time::Duration};

use crs_sync::{
    Clock, SessionMonitor, Store, SyncConfig, SyncEngine, SystemClock,
    model::AssessmentRecord,
    remote::InMemoryRemote,
    session::{LocalSessionProvider, Session, SessionProvider},
    store::FileCache,
};
use serde_json::json;
use tracing::info;

use crate::cli::SimulateArgs;
use crate::output::{OutputFormat, print_table, print_value};

/// Upper bound on waiting for the monitor to react to a session change.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

fn load_config(args: &SimulateArgs) -> Result<SyncConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => SyncConfig::default(),
    };
    if let Some(ms) = args.debounce_ms {
        config.debounce = Duration::from_millis(ms);
    }
    Ok(config)
}

/// Yield to the runtime until `done` holds.
async fn settle(mut done: impl FnMut() -> bool) -> Result<(), Box<dyn std::error::Error>> {
    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    while !done() {
        if tokio::time::Instant::now() >= deadline {
            return Err("timed out waiting for the session monitor".into());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

/// Run the simulate command
pub async fn run(
    args: &SimulateArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args)?;
    let store = Store::open(Arc::new(FileCache::new(
        &args.cache.cache_dir,
        &args.cache.namespace,
    )));
    let remote = Arc::new(InMemoryRemote::new());

    let provider = LocalSessionProvider::new();
    let engine = SyncEngine::new(store.clone(), remote.clone(), config.clone());
    let monitor = SessionMonitor::start(&provider, engine.clone());

    let mut session = Session::new(&args.uid);
    if let Some(email) = &args.email {
        session = session.with_email(email);
    }
    provider.sign_in(session);
    settle(|| engine.current_uid().as_deref() == Some(args.uid.as_str())).await?;
    info!(uid = %args.uid, "Signed in");
    // Armed after sign-in so the failures hit the debounced writes.
    remote.fail_next_writes(args.fail_writes);

    let interval = Duration::from_millis(args.edit_interval_ms);
    for _ in 0..args.edits {
        store.update_crs(|crs| crs.age = crs.age.saturating_add(1));
        tokio::time::sleep(interval).await;
    }
    let crs = store.get_state().crs_data;
    store.add_assessment(AssessmentRecord::new(
        SystemClock.now(),
        crs.provincial_nomination || crs.job_offer,
        "express-entry",
        crs.last_score,
    ));

    // Push now; on injected failures keep going until the retry budget is spent.
    let mut flushed = engine.flush().await;
    let mut attempts = 1;
    while flushed.is_err() && attempts <= config.write_retry.max_attempts {
        flushed = engine.flush().await;
        attempts += 1;
    }
    if let Err(e) = &flushed {
        info!("Final flush failed: {e}");
    }

    let state = engine.state();
    let document = remote.document(&args.uid);
    let writes = remote.write_count(&args.uid);

    provider.sign_out();
    settle(|| !engine.is_attached() && provider.current_session().is_none()).await?;
    monitor.stop();

    match format {
        OutputFormat::Human => {
            println!("Local state:");
            print_value(&state, format)?;
            println!();
            println!("Remote document:");
            match &document {
                Some(doc) => print_value(doc, format)?,
                None => println!("(none)"),
            }
            println!();
            print_table(
                &["WRITES", "SYNC ERROR"],
                &[vec![
                    writes.to_string(),
                    state
                        .sync
                        .sync_error
                        .clone()
                        .unwrap_or_else(|| "-".to_string()),
                ]],
            );
        }
        OutputFormat::Json => {
            let value = json!({
                "state": state,
                "remote": document,
                "writes": writes,
            });
            println!("{}", serde_json::to_string(&value)?);
        }
    }

    Ok(())
}
