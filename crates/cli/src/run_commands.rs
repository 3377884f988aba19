//! `claude-relay run`: wire the sidecar, dispatcher, worker bridge, and audit
//! log together and serve until asked to stop.

use std::{sync::Arc, time::Duration};

use {
    anyhow::{Result, bail},
    relay_audit::{AuditEventKind, AuditLogger},
    relay_auto_reply::{DispatchSettings, Dispatcher},
    relay_bridge::{ProcessBridge, WorkerCommand},
    relay_channels::AuthPolicy,
    relay_config::{BridgeConfig, RelayConfig, Severity, SidecarConfig, validate::check_config},
    relay_whatsapp::{SidecarLaunch, SidecarProcess, start_sidecar},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

/// Inbound messages buffered between the sidecar reader and the dispatcher.
const INBOUND_BUFFER: usize = 64;

/// How long in-flight commands may keep running after shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(config: RelayConfig) -> Result<()> {
    let mut diagnostics = Vec::new();
    check_config(&config, &mut diagnostics);
    for d in &diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
            Severity::Info => info!(path = %d.path, "{}", d.message),
        }
    }
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        bail!("invalid configuration; run `claude-relay doctor` for details");
    }

    let policy = AuthPolicy::from_ids(
        config.auth.group_id.as_deref(),
        config.auth.sender_id.as_deref(),
    );
    info!(mode = policy.mode(), "authorization policy loaded");

    let audit = open_audit_log(&config);
    let bridge = Arc::new(ProcessBridge::new(worker_command(&config.bridge)));

    let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
    let (mut sidecar, client) = start_sidecar(&sidecar_launch(&config.sidecar), tx).await?;
    info!(pid = ?sidecar.id(), "chat sidecar launched");

    audit.record(AuditEventKind::ServiceStart, [
        ("mode", policy.mode().to_string()),
        ("version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    let dispatcher = Arc::new(
        Dispatcher::new(
            policy,
            bridge,
            client.clone(),
            audit.clone(),
            dispatch_settings(&config),
        )
        .with_media(client.clone()),
    );
    let shutdown = CancellationToken::new();
    let mut dispatch = tokio::spawn(dispatcher.run(rx, shutdown.clone()));
    info!("relay running; press Ctrl+C to stop");

    let reason = wait_for_shutdown(&mut sidecar).await;
    info!(reason, connected = client.is_connected(), "shutting down");

    // Stop taking new messages but keep the sidecar up so replies to
    // in-flight commands can still be delivered.
    shutdown.cancel();
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut dispatch).await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => warn!(error = %e, "dispatcher task failed"),
        Err(_) => {
            warn!("in-flight commands did not finish in time, abandoning them");
            dispatch.abort();
        },
    }

    if let Err(e) = sidecar.stop().await {
        warn!(error = %e, "failed to stop sidecar");
    }
    audit.record(AuditEventKind::ServiceStop, [("reason", reason)]);
    if let Err(e) = tokio::task::spawn_blocking(move || audit.flush()).await {
        warn!(error = %e, "audit flush task failed");
    }
    Ok(())
}

/// Resolve when the process is asked to stop or the sidecar goes away.
async fn wait_for_shutdown(sidecar: &mut SidecarProcess) -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                warn!(error = %e, "could not listen for SIGTERM");
                return wait_for_interrupt(sidecar).await;
            },
        };
        tokio::select! {
            reason = wait_for_interrupt(sidecar) => reason,
            _ = term.recv() => "sigterm",
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_interrupt(sidecar).await
    }
}

async fn wait_for_interrupt(sidecar: &mut SidecarProcess) -> &'static str {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "could not listen for Ctrl+C");
            }
            "interrupt"
        },
        () = sidecar.closed() => {
            error!("chat sidecar exited");
            "sidecar_exited"
        },
    }
}

fn open_audit_log(config: &RelayConfig) -> AuditLogger {
    if !config.audit.enabled {
        info!("audit log disabled");
        return AuditLogger::disabled();
    }
    let path = config.audit.resolved_path();
    match AuditLogger::jsonl(&path) {
        Ok(logger) => {
            info!(path = %path.display(), "audit log enabled");
            logger
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not open audit log, continuing without it");
            AuditLogger::disabled()
        },
    }
}

fn worker_command(bridge: &BridgeConfig) -> WorkerCommand {
    let mut worker = WorkerCommand::new(&bridge.program).with_args(bridge.args.iter().cloned());
    if let Some(dir) = &bridge.working_dir {
        worker = worker.with_working_dir(dir);
    }
    for (key, value) in &bridge.env {
        worker = worker.with_env(key.clone(), value.clone());
    }
    worker
}

fn sidecar_launch(sidecar: &SidecarConfig) -> SidecarLaunch {
    SidecarLaunch {
        program: sidecar.program.clone(),
        args: sidecar.args.clone(),
        dir: sidecar.dir.clone(),
        auth_dir: sidecar.auth_dir.clone(),
        ack_timeout: Duration::from_secs(sidecar.ack_timeout_secs),
    }
}

fn dispatch_settings(config: &RelayConfig) -> DispatchSettings {
    DispatchSettings {
        command_timeout: Duration::from_secs(config.bridge.timeout_secs),
        transcribe_timeout: Duration::from_secs(config.bridge.transcribe_timeout_secs),
        max_length: config.reply.max_length,
        dedup_capacity: config.dedup.capacity,
    }
}
