//! Watch session: run the engine and print one line per change.

use color_eyre::eyre::WrapErr;
use color_eyre::Result;

use super::args::WatchOptions;
use crate::config::EngineConfig;
use crate::engine::{LinkEngine, PresentationView, PushConnectionState};
use crate::models::StatusSnapshot;
use crate::traits::ArtifactHandle;

/// Line printed for a canonical snapshot.
pub fn snapshot_line(snapshot: &StatusSnapshot) -> String {
    let mut line = format!("state={} messages={}", snapshot.phase, snapshot.message_count);
    if let Some(account) = &snapshot.account {
        line.push_str(&format!(
            " account=\"{}\" phone={}",
            account.display_name, account.phone_identifier
        ));
    }
    if snapshot.phase == crate::models::ConnectionPhase::LoadingChats {
        line.push_str(&format!(" progress={}%", snapshot.progress_percent));
    }
    if let Some(detail) = &snapshot.error_detail {
        line.push_str(&format!(" error=\"{}\"", detail));
    }
    line
}

/// Line printed when the artifact changes.
pub fn artifact_line(artifact: Option<&ArtifactHandle>) -> String {
    match artifact {
        Some(handle) => format!("qr={}", handle.address),
        None => "qr=none".to_string(),
    }
}

/// Line printed when the presentation view changes.
pub fn view_line(view: &PresentationView) -> String {
    let mut line = format!("status=\"{}\"", view.status_label);
    if !view.elapsed.is_zero() {
        line.push_str(&format!(" elapsed={}s", view.elapsed.as_secs()));
    }
    if let Some(hint) = &view.hint {
        line.push_str(&format!(" hint=\"{}\"", hint));
    }
    line
}

/// Run the engine until Ctrl-C.
pub async fn run_watch(options: WatchOptions) -> Result<()> {
    let mut config = EngineConfig::from_env();
    if let Some(url) = options.url {
        config = config.with_base_url(url);
    }

    let mut engine = LinkEngine::from_config(config);
    let mut snapshots = engine.subscribe_snapshots();
    let mut artifacts = engine.subscribe_artifacts();
    let mut views = engine.subscribe_presentation();
    let mut push_state = engine.subscribe_push_state();

    engine.start().wrap_err("failed to start link engine")?;

    if options.connect {
        engine.request_connect()?;
    }
    if options.logout {
        engine.request_logout()?;
    }

    println!("{}", snapshot_line(&snapshots.borrow_and_update()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = snapshots.changed() => {
                println!("{}", snapshot_line(&snapshots.borrow_and_update()));
            }
            Ok(()) = artifacts.changed() => {
                println!("{}", artifact_line(artifacts.borrow_and_update().as_ref()));
            }
            Ok(()) = views.changed() => {
                println!("{}", view_line(&views.borrow_and_update()));
            }
            Ok(()) = push_state.changed() => {
                let state = *push_state.borrow_and_update();
                if state != PushConnectionState::Connected {
                    tracing::info!("Push stream {}", state);
                }
            }
        }
    }

    engine.shutdown();
    engine.wait_stopped().await;
    Ok(())
}
