use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Process-level events that drive the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Re-read configuration and swap it in (SIGHUP).
    Reload,
    /// Stop immediately; carries the signal name for logging.
    Shutdown(&'static str),
}

/// Forward SIGINT/SIGTERM/SIGHUP into `events`.
///
/// Handlers are installed before this returns so installation failures
/// surface to the caller.
#[cfg(unix)]
pub fn listen(events: mpsc::Sender<ControlEvent>) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = interrupt.recv() => ControlEvent::Shutdown("SIGINT"),
                _ = terminate.recv() => ControlEvent::Shutdown("SIGTERM"),
                _ = hangup.recv() => ControlEvent::Reload,
            };

            debug!("Forwarding {event:?}");
            if events.send(event).await.is_err() {
                break;
            }
        }
    }))
}

/// Without Unix signals only Ctrl+C is available; reload is not supported.
#[cfg(not(unix))]
pub fn listen(events: mpsc::Sender<ControlEvent>) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        loop {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::error!("failed to listen for Ctrl+C: {err}");
                break;
            }
            if events.send(ControlEvent::Shutdown("SIGINT")).await.is_err() {
                break;
            }
        }
    }))
}
