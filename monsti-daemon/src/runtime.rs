use std::collections::VecDeque;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use crate::core_types::register_core_node_types;
use crate::error::{io_err, DaemonError};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::service::MonstiService;
use crate::settings::DaemonSettings;

/// Everything a connection handler needs besides the request itself.
#[derive(Clone)]
struct Context {
    service: Arc<MonstiService>,
    shutdown_tx: broadcast::Sender<()>,
    socket: PathBuf,
    started_at_unix: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Load settings below `home`, register the core node types and serve.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let settings = DaemonSettings::load_at(&home)?;
    let socket = settings.socket_path(&home);
    tracing::info!(
        sites = settings.sites.len(),
        mail_debug = settings.mail.debug,
        socket = %socket.display(),
        "starting monsti daemon",
    );

    let service = Arc::new(MonstiService::new(settings));
    register_core_node_types(&service).await?;
    serve(service, socket).await
}

/// Serve `service` on `socket` until a `Stop` request or Ctrl-C.
pub async fn serve(service: Arc<MonstiService>, socket: PathBuf) -> Result<(), DaemonError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let ctx = Context {
        service,
        shutdown_tx: shutdown_tx.clone(),
        socket,
        started_at_unix: unix_seconds_now(),
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(ctx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn socket_server_task(
    ctx: Context,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = ctx.socket.clone();
    if let Some(dir) = socket.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
    }
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, ctx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

/// Serve requests from one connection, one at a time.
///
/// While a call is in progress the connection is still read, so a client that
/// hangs up cancels its call: a parked `WaitSignal` then does not swallow the
/// next signal for that subscriber.
async fn handle_socket_client(stream: UnixStream, ctx: Context) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut queued = VecDeque::<String>::new();

    loop {
        let line = match queued.pop_front() {
            Some(line) => line,
            None => match lines
                .next_line()
                .await
                .map_err(|e| io_err("daemon socket read", e))?
            {
                Some(line) => line,
                None => break,
            },
        };
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };
        let stop = matches!(request, DaemonRequest::Stop);

        let call = dispatch(&ctx, request);
        tokio::pin!(call);
        let response = loop {
            tokio::select! {
                response = &mut call => break Some(response),
                next = lines.next_line() => match next {
                    Ok(Some(line)) => queued.push_back(line),
                    Ok(None) | Err(_) => break None,
                },
            }
        };
        let Some(response) = response else {
            tracing::debug!("client hung up during call; call cancelled");
            break;
        };

        write_response(&mut writer, &response).await?;
        if stop {
            break;
        }
    }

    Ok(())
}

async fn dispatch(ctx: &Context, request: DaemonRequest) -> DaemonResponse {
    let service = &ctx.service;
    let result: Result<Value, DaemonError> = match request {
        DaemonRequest::Status => Ok(build_status_payload(ctx).await),
        DaemonRequest::Stop => {
            let _ = ctx.shutdown_tx.send(());
            Ok(json!({ "stopping": true }))
        }
        DaemonRequest::RegisterNodeType(node_type) => {
            service.register_node_type(node_type).await.map(|()| Value::Null)
        }
        DaemonRequest::GetNodeType { id } => service
            .get_node_type(&id)
            .await
            .and_then(|nt| Ok(serde_json::to_value(nt)?)),
        DaemonRequest::ListNodeTypes => Ok(json!(service.list_node_types().await)),
        DaemonRequest::ListFields => Ok(json!(service.list_fields().await)),
        DaemonRequest::GetAddableNodeTypes { site, node_type } => Ok(json!(
            service.get_addable_node_types(&site, &node_type).await
        )),
        DaemonRequest::GetNode { site, path } => service.get_node(&site, &path).await.map(|n| json!(n)),
        DaemonRequest::GetChildren { site, path } => {
            service.get_children(&site, &path).await.map(Value::Array)
        }
        DaemonRequest::GetNodeData { site, path, file } => service
            .get_node_data(&site, &path, &file)
            .await
            .map(|d| json!(d)),
        DaemonRequest::WriteNodeData {
            site,
            path,
            file,
            content,
        } => service
            .write_node_data(&site, &path, &file, content)
            .await
            .map(|()| Value::Null),
        DaemonRequest::WriteNode { site, path, node } => service
            .write_node(&site, &path, node)
            .await
            .map(|()| Value::Null),
        DaemonRequest::RemoveNode { site, path } => {
            service.remove_node(&site, &path).await.map(|()| Value::Null)
        }
        DaemonRequest::RenameNode {
            site,
            source,
            target,
        } => service
            .rename_node(&site, &source, &target)
            .await
            .map(|()| Value::Null),
        DaemonRequest::GetSiteConfig { site, name } => service
            .get_site_config(&site, &name)
            .await
            .and_then(|v| Ok(serde_json::to_value(v)?)),
        DaemonRequest::ConnectSignal { id, signal } => {
            service.connect_signal(&id, &signal).await;
            Ok(Value::Null)
        }
        DaemonRequest::EmitSignal { name, args } => {
            service.emit_signal(&name, args).await.map(Value::Array)
        }
        DaemonRequest::WaitSignal { id } => service
            .wait_signal(&id)
            .await
            .and_then(|s| Ok(serde_json::to_value(s)?)),
        DaemonRequest::FinishSignal {
            id,
            ticket,
            ret,
            error,
        } => {
            let reply = match error {
                Some(message) if !message.is_empty() => Err(message),
                _ => Ok(ret),
            };
            service
                .finish_signal(&id, ticket, reply)
                .await
                .map(|()| Value::Null)
        }
        DaemonRequest::SendMail(mail) => service.send_mail(&mail).await.map(|()| Value::Null),
        DaemonRequest::PutRequest(request) => Ok(json!(service.put_request(request).await)),
        DaemonRequest::GetRequest { id } => Ok(json!(service.get_request(id).await)),
        DaemonRequest::RemoveRequest { id } => Ok(json!(service.remove_request(id).await)),
    };

    match result {
        Ok(data) => DaemonResponse::ok(data),
        Err(err) => {
            tracing::debug!(error = %err, kind = ?err.kind(), "request failed");
            DaemonResponse::failure(&err)
        }
    }
}

async fn build_status_payload(ctx: &Context) -> Value {
    let settings = ctx.service.settings();
    let sites: Vec<&String> = settings.sites.keys().collect();
    json!({
        "running": true,
        "started_at_unix": ctx.started_at_unix,
        "uptime_secs": unix_seconds_now().saturating_sub(ctx.started_at_unix),
        "node_types": ctx.service.node_type_count().await,
        "sites": sites,
        "mail_debug": settings.mail.debug,
        "socket": ctx.socket.display().to_string(),
    })
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `RUST_LOG` selects the filter (default `info`); `MONSTI_LOG_JSON=1`
/// switches to JSON lines.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var_os("MONSTI_LOG_JSON").is_some() {
        let _ = fmt().json().with_env_filter(filter).try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
