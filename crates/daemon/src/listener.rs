// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-socket listener: accepts façade connections and dispatches
//! requests into the engine.
//!
//! This is the request boundary: every error crossing it is logged here
//! exactly once and returned as a structured `Response::Error`.

use crate::lifecycle::DaemonState;
use crate::protocol::{
    read_message, write_message, BrowseEntryDto, JobDetail, JobSummary, OutputEntry,
    PluginStatusEntry, Request, Response, RestreamDto, StreamDetail, StreamSummary, TaskDetail,
};
use cf_core::{Clock, Job, LiveStream};
use cf_engine::EngineError;
use cf_plugin::{check_protocol, discover_manifests, ErrorWindow, Launcher};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Accept loop. Runs until the shutdown token fires.
pub async fn run(daemon: Arc<DaemonState>, listener: UnixListener, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, _addr)) => {
                    let daemon = Arc::clone(&daemon);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        handle_connection(daemon, socket, shutdown).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            },
        }
    }
    info!("listener stopped");
}

async fn handle_connection(
    daemon: Arc<DaemonState>,
    mut socket: UnixStream,
    shutdown: CancellationToken,
) {
    loop {
        let request: Request = match read_message(&mut socket).await {
            Ok(r) => r,
            Err(crate::protocol::ProtocolError::Closed) => return,
            Err(e) => {
                debug!(error = %e, "connection dropped");
                return;
            }
        };

        let is_shutdown = matches!(request, Request::Shutdown);
        let response = handle_request(&daemon, request).await;
        if write_message(&mut socket, &response).await.is_err() {
            return;
        }
        if is_shutdown {
            shutdown.cancel();
            return;
        }
    }
}

/// Dispatch one request. Errors are converted to their structured form
/// here (the request boundary log).
pub async fn handle_request(daemon: &DaemonState, request: Request) -> Response {
    let engine = &daemon.engine;
    let result: Result<Response, EngineError> = match request {
        Request::Ping => Ok(Response::Pong),

        Request::Status => Ok(status(daemon)),

        Request::Shutdown => {
            info!("shutdown requested");
            daemon.launcher.stop_all().await;
            engine.shutdown().map(|_| Response::Ok)
        }

        Request::ValidateToken { raw, scheme } => match engine.host().auth() {
            Ok(auth) => auth
                .validate_token(&raw, &scheme)
                .await
                .map(|identity| Response::Identity {
                    valid: identity.valid,
                    user_id: identity.user_id,
                    username: identity.username,
                    role: identity.role,
                    roles: identity.roles,
                })
                .map_err(EngineError::Plugin),
            // Fail closed: auth provider unreachable denies
            Err(e) => Err(EngineError::Route(e)),
        },

        Request::Authorize { user_id, action, resource_type, resource_id } => {
            match engine.host().auth() {
                Ok(auth) => auth
                    .authorize(&user_id, &action, &resource_type, resource_id.as_deref())
                    .await
                    .map(|decision| Response::AuthzDecision {
                        allowed: decision.allowed,
                        reason: decision.reason,
                    })
                    .map_err(EngineError::Plugin),
                Err(e) => Err(EngineError::Route(e)),
            }
        }

        Request::JobCreate { owner, source, profile, profile_inline, publish_targets, webhook_urls } => {
            engine
                .submit_job(cf_engine::SubmitJob {
                    owner,
                    source,
                    profile_name: profile,
                    profile_inline,
                    publish_targets,
                    webhook_urls,
                })
                .await
                .map(|id| Response::JobCreated { id: id.to_string() })
        }

        Request::JobCancel { id } => engine.cancel_job(&id).map(|_| Response::Ok),

        Request::JobRetry { id } => engine
            .retry_job(&id)
            .await
            .map(|id| Response::JobCreated { id: id.to_string() }),

        Request::JobGet { id } => job_detail(daemon, &id),

        Request::JobList => Ok(job_list(daemon)),

        Request::JobOutputs { id } => engine.list_outputs(&id).map(|outputs| Response::Outputs {
            outputs: outputs
                .into_iter()
                .map(|(key, size)| OutputEntry { key, size })
                .collect(),
        }),

        Request::PublishToPlatform { id, target } => engine
            .publish_single(&id, target)
            .await
            .map(|(platform_id, url)| Response::Published { platform_id, url }),

        Request::StreamCreate { owner, title, archive_enabled } => engine
            .create_stream(&owner, &title, archive_enabled)
            .await
            .map(|(id, stream_key, ingest_url)| Response::StreamCreated {
                id: id.to_string(),
                stream_key,
                ingest_url,
            }),

        Request::StreamList => Ok(stream_list(daemon)),

        Request::StreamStats { id } => stream_detail(daemon, &id),

        Request::StreamEnd { id } => engine.end_stream(&id).await.map(|archive| {
            Response::StreamEnded { archive_job_id: archive.map(|j| j.to_string()) }
        }),

        Request::IngestAuth { id, stream_key } => engine
            .authorize_ingest(&id, &stream_key)
            .map(|allowed| Response::IngestDecision { allowed }),

        Request::RestreamCreate { stream_id, platform, ingest_url, credentials_ref } => engine
            .add_restream(
                &stream_id,
                &platform,
                ingest_url.as_deref(),
                credentials_ref.as_deref(),
            )
            .await
            .map(|_| Response::Ok),

        Request::RestreamStart { stream_id, ingest_url } => engine
            .toggle_restream(&stream_id, &ingest_url, true)
            .await
            .map(|_| Response::Ok),

        Request::RestreamStop { stream_id, ingest_url } => engine
            .toggle_restream(&stream_id, &ingest_url, false)
            .await
            .map(|_| Response::Ok),

        Request::RestreamRemove { stream_id, ingest_url } => engine
            .remove_restream(&stream_id, &ingest_url)
            .await
            .map(|_| Response::Ok),

        Request::BrowseStorage { scheme, path, show_hidden, media_only, search } => {
            browse_storage(daemon, &scheme, &path, show_hidden, media_only, search.as_deref()).await
        }

        Request::GetUploadUrl { scheme, bucket, key, expiry_secs, content_type, method } => {
            upload_url(daemon, &scheme, &bucket, &key, expiry_secs, content_type.as_deref(), &method)
                .await
        }

        Request::PluginInstall => plugin_install(daemon).await,

        Request::PluginConfigure { plugin_id, config } => daemon
            .engine
            .host()
            .configure(&plugin_id, config)
            .map_err(host_error)
            .and_then(|events| engine.record(events).map(|_| Response::Ok)),

        Request::PluginEnable { plugin_id } => daemon
            .engine
            .host()
            .enable(&plugin_id)
            .map_err(host_error)
            .and_then(|events| engine.record(events).map(|_| Response::Ok)),

        Request::PluginDisable { plugin_id } => daemon
            .engine
            .host()
            .disable(&plugin_id)
            .map_err(host_error)
            .and_then(|events| engine.record(events).map(|_| Response::Ok)),

        Request::PluginUpgrade { plugin_id, staged_dir } => {
            plugin_upgrade(daemon, &plugin_id, &staged_dir).await
        }
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            let kernel = e.to_kernel(daemon.engine.clock().epoch_ms());
            error!(code = %kernel.code, correlation = %kernel.correlation_id, "{}", kernel.message);
            Response::Error { error: kernel }
        }
    }
}

fn host_error(e: cf_plugin::HostError) -> EngineError {
    match e {
        cf_plugin::HostError::Plugin(p) => EngineError::Plugin(p),
        other => EngineError::Plugin(cf_plugin::PluginError::Transport(other.to_string())),
    }
}

fn status(daemon: &DaemonState) -> Response {
    let healthy_workers = daemon.engine.healthy_worker_count();
    let (jobs, streams) = {
        let state = daemon.engine.state().lock();
        (state.jobs.len(), state.streams.len())
    };
    Response::Status {
        started_at_utc: daemon.started_at_utc.to_rfc3339(),
        uptime_secs: daemon.start_time.elapsed().as_secs(),
        jobs,
        streams,
        healthy_workers,
        plugins: daemon
            .engine
            .host()
            .statuses()
            .into_iter()
            .map(|(id, plugin_type, health)| PluginStatusEntry { id, plugin_type, health })
            .collect(),
    }
}

fn job_summary(job: &Job) -> JobSummary {
    JobSummary {
        id: job.id.to_string(),
        state: job.state,
        progress_pct: job.progress_pct,
        eta_seconds: job.eta_seconds,
        error_code: job.error.as_ref().map(|e| e.code.clone()),
        created_at_ms: job.created_at_ms,
    }
}

fn job_list(daemon: &DaemonState) -> Response {
    let state = daemon.engine.state().lock();
    let mut jobs: Vec<JobSummary> = state.jobs.values().map(job_summary).collect();
    jobs.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
    Response::Jobs { jobs }
}

fn job_detail(daemon: &DaemonState, id: &str) -> Result<Response, EngineError> {
    let state = daemon.engine.state().lock();
    let job = state
        .get_job(id)
        .ok_or_else(|| EngineError::JobNotFound(id.to_string()))?;
    let tasks = state
        .tasks_of(job.id.as_str())
        .iter()
        .map(|t| TaskDetail {
            id: t.id.to_string(),
            index: t.index,
            start_time: t.start_time,
            end_time: t.end_time,
            status: t.status,
            attempt_count: t.attempt_count,
            progress_pct: t.last_progress_pct,
            worker: t.assigned_worker.as_ref().map(|w| w.to_string()),
        })
        .collect();
    Ok(Response::Job {
        job: JobDetail {
            id: job.id.to_string(),
            owner: job.owner.clone(),
            state: job.state,
            progress_pct: job.progress_pct,
            eta_seconds: job.eta_seconds,
            error: job.error.clone(),
            output_key: job.output_key.clone(),
            tasks,
            created_at_ms: job.created_at_ms,
            started_at_ms: job.started_at_ms,
            finished_at_ms: job.finished_at_ms,
        },
    })
}

fn stream_summary(stream: &LiveStream) -> StreamSummary {
    StreamSummary {
        id: stream.id.to_string(),
        title: stream.title.clone(),
        is_live: stream.is_live,
        viewers: stream.viewers,
    }
}

fn stream_list(daemon: &DaemonState) -> Response {
    let state = daemon.engine.state().lock();
    let mut streams: Vec<StreamSummary> = state.streams.values().map(stream_summary).collect();
    streams.sort_by(|a, b| a.id.cmp(&b.id));
    Response::Streams { streams }
}

fn stream_detail(daemon: &DaemonState, id: &str) -> Result<Response, EngineError> {
    let state = daemon.engine.state().lock();
    let stream = state
        .get_stream(id)
        .ok_or_else(|| EngineError::StreamNotFound(id.to_string()))?;
    Ok(Response::Stream {
        stream: StreamDetail {
            id: stream.id.to_string(),
            owner: stream.owner.clone(),
            title: stream.title.clone(),
            is_live: stream.is_live,
            viewers: stream.viewers,
            total_viewers: stream.total_viewers,
            started_at_ms: stream.started_at_ms,
            ended_at_ms: stream.ended_at_ms,
            archive_enabled: stream.archive_enabled,
            archive_job_id: stream.archive_job_id.map(|j| j.to_string()),
            restreams: stream
                .restreams
                .iter()
                .map(|t| RestreamDto {
                    platform: t.platform.clone(),
                    ingest_url: t.ingest_url.clone(),
                    enabled: t.enabled,
                })
                .collect(),
        },
    })
}

async fn browse_storage(
    daemon: &DaemonState,
    scheme: &str,
    path: &str,
    show_hidden: bool,
    media_only: bool,
    search: Option<&str>,
) -> Result<Response, EngineError> {
    let storage = daemon.engine.host().storage_for_scheme(scheme)?;
    let entries = storage.browse(path, show_hidden, media_only, search).await?;
    Ok(Response::Browse {
        entries: entries
            .into_iter()
            .map(|e| BrowseEntryDto {
                name: e.name,
                path: e.path,
                is_dir: e.is_dir,
                size: e.size,
                is_media: e.is_media,
            })
            .collect(),
    })
}

async fn upload_url(
    daemon: &DaemonState,
    scheme: &str,
    bucket: &str,
    key: &str,
    expiry_secs: u64,
    content_type: Option<&str>,
    method: &str,
) -> Result<Response, EngineError> {
    let storage = daemon.engine.host().storage_for_scheme(scheme)?;
    let signed = storage
        .get_upload_url(bucket, key, expiry_secs, content_type, method)
        .await?;
    Ok(Response::UploadUrl {
        url: signed.url,
        headers: signed.headers,
        expires_at_ms: signed.expires_at_ms,
    })
}

/// Rescan the plugin directory and launch anything new.
async fn plugin_install(daemon: &DaemonState) -> Result<Response, EngineError> {
    let host = daemon.engine.host();
    let known: Vec<String> = host.statuses().into_iter().map(|(id, _, _)| id).collect();

    let discovered = discover_manifests(&daemon.config.plugins_dir)
        .map_err(|e| EngineError::Plugin(cf_plugin::PluginError::Transport(e.to_string())))?;

    for plugin in discovered {
        if known.iter().any(|id| id == &plugin.manifest.id) {
            continue;
        }
        if let Err(e) = check_protocol(&plugin.manifest) {
            warn!(plugin = %plugin.manifest.id, error = %e, "skipping at install");
            continue;
        }
        let window = Arc::new(ErrorWindow::default());
        let api = daemon
            .launcher
            .launch(&plugin.manifest, &plugin.dir, &Default::default(), Arc::clone(&window))
            .await?;
        let events = host
            .register_with_window(
                plugin.manifest.clone(),
                Default::default(),
                api,
                Some(plugin.dir),
                window,
            )
            .map_err(host_error)?;
        daemon.engine.record(events)?;
    }
    Ok(Response::Ok)
}

/// Shadow-upgrade: launch the staged version, self-test, flip, monitor.
async fn plugin_upgrade(
    daemon: &DaemonState,
    plugin_id: &str,
    staged_dir: &str,
) -> Result<Response, EngineError> {
    let staged = std::path::PathBuf::from(staged_dir);
    let manifest_path = staged.join(cf_plugin::manifest::MANIFEST_FILE);
    let manifest = cf_plugin::load_manifest(&manifest_path)
        .map_err(|e| EngineError::Plugin(cf_plugin::PluginError::Handshake(e.to_string())))?;

    let window = Arc::new(ErrorWindow::default());
    let api = daemon
        .launcher
        .launch(&manifest, &staged, &Default::default(), Arc::clone(&window))
        .await?;

    let events = daemon
        .engine
        .host()
        .shadow_upgrade_with_window(plugin_id, manifest, api, window)
        .await
        .map_err(host_error)?;
    daemon.engine.record(events)?;
    Ok(Response::Ok)
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
