//! TCP port availability polling
//!
//! Used around engine restarts to wait for the listen port to change hands.

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const PROGRESS_LOG_SECS: u64 = 2;
/// Delay before re-checking a state change, to guard against flapping.
const STABILITY_RECHECK: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortTimeout {
    #[error("port {port} was not released within {timeout_secs}s")]
    Release { port: u16, timeout_secs: u64 },
    #[error("port {port} was not bound within {timeout_secs}s")]
    Bind { port: u16, timeout_secs: u64 },
}

/// Check whether something is listening on `host:port` by attempting to bind
/// a throwaway socket. Any bind error counts as in use.
pub async fn is_port_in_use(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).await.is_err()
}

/// Wait until `port` is free to bind, confirming the state holds for a short
/// settle window. A port that flaps back into use resumes polling; the only
/// failure is the deadline.
pub async fn wait_for_release(host: &str, port: u16, timeout: Duration) -> Result<(), PortTimeout> {
    info!("Waiting for port {port} to be released");
    let start = Instant::now();
    let mut last_logged_secs = 0;

    loop {
        while is_port_in_use(host, port).await {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                warn!(
                    "Port {port} still in use after {:.1}s, giving up",
                    elapsed.as_secs_f64()
                );
                return Err(PortTimeout::Release {
                    port,
                    timeout_secs: timeout.as_secs(),
                });
            }
            let bucket = elapsed.as_secs();
            if bucket > last_logged_secs && bucket % PROGRESS_LOG_SECS == 0 {
                info!(
                    "Port {port} still in use after {:.1}s, continuing to wait",
                    elapsed.as_secs_f64()
                );
                last_logged_secs = bucket;
            }
            sleep(POLL_INTERVAL).await;
        }

        sleep(STABILITY_RECHECK).await;
        if !is_port_in_use(host, port).await {
            info!("Port {port} is now available");
            return Ok(());
        }
        debug!("Port {port} flapped back into use, continuing to wait");
        if start.elapsed() >= timeout {
            return Err(PortTimeout::Release {
                port,
                timeout_secs: timeout.as_secs(),
            });
        }
    }
}

/// Wait until something is listening on `port`, with the same settle window
/// and deadline semantics as [`wait_for_release`].
pub async fn wait_for_bind(host: &str, port: u16, timeout: Duration) -> Result<(), PortTimeout> {
    info!("Waiting for port {port} to be bound");
    let start = Instant::now();
    let mut last_logged_secs = 0;

    loop {
        while !is_port_in_use(host, port).await {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                warn!(
                    "Port {port} still unbound after {:.1}s, giving up",
                    elapsed.as_secs_f64()
                );
                return Err(PortTimeout::Bind {
                    port,
                    timeout_secs: timeout.as_secs(),
                });
            }
            let bucket = elapsed.as_secs();
            if bucket > last_logged_secs && bucket % PROGRESS_LOG_SECS == 0 {
                info!(
                    "Port {port} still unbound after {:.1}s, continuing to wait",
                    elapsed.as_secs_f64()
                );
                last_logged_secs = bucket;
            }
            sleep(POLL_INTERVAL).await;
        }

        sleep(STABILITY_RECHECK).await;
        if is_port_in_use(host, port).await {
            info!("Port {port} is now bound");
            return Ok(());
        }
        debug!("Port {port} was released again, continuing to wait");
        if start.elapsed() >= timeout {
            return Err(PortTimeout::Bind {
                port,
                timeout_secs: timeout.as_secs(),
            });
        }
    }
}
