use std::io;

use futures::{
    FutureExt,
    future::{BoxFuture, select_all},
};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SignalTo {
    /// Signal to cancel the run and tear down probers.
    Shutdown,
    /// Second interrupt; stop waiting for graceful teardown.
    Quit,
}

/// Resolves with the next termination signal from the OS/user.
#[cfg(unix)]
pub async fn next_signal() -> io::Result<SignalTo> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let set: Vec<BoxFuture<'_, SignalTo>> = vec![
        Box::pin(async move { sigint.recv().map(|_| SignalTo::Shutdown).await }),
        Box::pin(async move { sigterm.recv().map(|_| SignalTo::Shutdown).await }),
        Box::pin(async move { sigquit.recv().map(|_| SignalTo::Quit).await }),
    ];

    let (signal, _, _) = select_all(set).await;
    Ok(signal)
}

/// Resolves with the next termination signal from the OS/user.
#[cfg(windows)]
pub async fn next_signal() -> io::Result<SignalTo> {
    tokio::signal::ctrl_c().await?;
    Ok(SignalTo::Shutdown)
}
