use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use monsti_core::{ConfigValue, FieldConfig, Mail, NodeType, NodeTypeId, Request};

use crate::error::{io_err, DaemonError, ErrorKind};
use crate::signal::ReceivedSignal;

/// JSON newline-delimited request: `{"method": "...", "params": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum DaemonRequest {
    Status,
    Stop,
    RegisterNodeType(NodeType),
    GetNodeType {
        id: NodeTypeId,
    },
    ListNodeTypes,
    ListFields,
    GetAddableNodeTypes {
        site: String,
        node_type: String,
    },
    GetNode {
        site: String,
        path: String,
    },
    GetChildren {
        site: String,
        path: String,
    },
    GetNodeData {
        site: String,
        path: String,
        file: String,
    },
    WriteNodeData {
        site: String,
        path: String,
        file: String,
        content: Vec<u8>,
    },
    WriteNode {
        site: String,
        path: String,
        node: Value,
    },
    RemoveNode {
        site: String,
        path: String,
    },
    RenameNode {
        site: String,
        source: String,
        target: String,
    },
    GetSiteConfig {
        site: String,
        name: String,
    },
    ConnectSignal {
        id: String,
        signal: String,
    },
    EmitSignal {
        name: String,
        #[serde(default)]
        args: Value,
    },
    WaitSignal {
        id: String,
    },
    /// A non-empty `error` aborts the emission; otherwise `ret` is the
    /// subscriber's answer.
    FinishSignal {
        id: String,
        #[serde(default)]
        ticket: Option<u64>,
        #[serde(default)]
        ret: Value,
        #[serde(default)]
        error: Option<String>,
    },
    SendMail(Mail),
    PutRequest(Request),
    GetRequest {
        id: u64,
    },
    RemoveRequest {
        id: u64,
    },
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
            kind: Some(ErrorKind::Protocol),
        }
    }

    pub fn failure(err: &DaemonError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(err.to_string()),
            kind: Some(err.kind()),
        }
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(socket: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        });
    }

    let mut stream = UnixStream::connect(socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.to_path_buf(),
            }
        } else {
            io_err(socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(socket, e))?;
    stream.flush().map_err(|e| io_err(socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader.read_line(&mut line).map_err(|e| io_err(socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    let response: DaemonResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Remote {
            kind: response.kind.unwrap_or(ErrorKind::Protocol),
            message: response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        })
    }
}

/// Blocking client for the daemon socket. Every call opens its own
/// connection, so a parked `wait_signal` does not hold up other calls.
#[derive(Debug, Clone)]
pub struct Client {
    socket: PathBuf,
}

impl Client {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn call(&self, request: &DaemonRequest) -> Result<Value, DaemonError> {
        response_into_data(send_request(&self.socket, request)?)
    }

    fn call_as<T: DeserializeOwned>(&self, request: &DaemonRequest) -> Result<T, DaemonError> {
        Ok(serde_json::from_value(self.call(request)?)?)
    }

    /// Daemon status, retrying briefly while the socket comes up.
    pub fn status(&self) -> Result<Value, DaemonError> {
        let mut last_not_running: Option<DaemonError> = None;
        for attempt in 0..5 {
            match self.call(&DaemonRequest::Status) {
                Ok(status) => return Ok(status),
                Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                    last_not_running = Some(err);
                    if attempt < 4 {
                        sleep(Duration::from_millis(100));
                        continue;
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_not_running.unwrap_or_else(|| {
            DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
        }))
    }

    pub fn stop(&self) -> Result<(), DaemonError> {
        self.call(&DaemonRequest::Stop).map(|_| ())
    }

    pub fn register_node_type(&self, node_type: NodeType) -> Result<(), DaemonError> {
        self.call(&DaemonRequest::RegisterNodeType(node_type))
            .map(|_| ())
    }

    pub fn get_node_type(&self, id: &str) -> Result<NodeType, DaemonError> {
        self.call_as(&DaemonRequest::GetNodeType { id: id.into() })
    }

    pub fn list_node_types(&self) -> Result<Vec<NodeTypeId>, DaemonError> {
        self.call_as(&DaemonRequest::ListNodeTypes)
    }

    pub fn list_fields(&self) -> Result<Vec<FieldConfig>, DaemonError> {
        self.call_as(&DaemonRequest::ListFields)
    }

    pub fn get_addable_node_types(
        &self,
        site: &str,
        node_type: &str,
    ) -> Result<Vec<NodeTypeId>, DaemonError> {
        self.call_as(&DaemonRequest::GetAddableNodeTypes {
            site: site.to_owned(),
            node_type: node_type.to_owned(),
        })
    }

    pub fn get_node(&self, site: &str, path: &str) -> Result<Option<Value>, DaemonError> {
        self.call_as(&DaemonRequest::GetNode {
            site: site.to_owned(),
            path: path.to_owned(),
        })
    }

    pub fn get_children(&self, site: &str, path: &str) -> Result<Vec<Value>, DaemonError> {
        self.call_as(&DaemonRequest::GetChildren {
            site: site.to_owned(),
            path: path.to_owned(),
        })
    }

    pub fn get_node_data(
        &self,
        site: &str,
        path: &str,
        file: &str,
    ) -> Result<Option<Vec<u8>>, DaemonError> {
        self.call_as(&DaemonRequest::GetNodeData {
            site: site.to_owned(),
            path: path.to_owned(),
            file: file.to_owned(),
        })
    }

    pub fn write_node_data(
        &self,
        site: &str,
        path: &str,
        file: &str,
        content: Vec<u8>,
    ) -> Result<(), DaemonError> {
        self.call(&DaemonRequest::WriteNodeData {
            site: site.to_owned(),
            path: path.to_owned(),
            file: file.to_owned(),
            content,
        })
        .map(|_| ())
    }

    pub fn write_node(&self, site: &str, path: &str, node: Value) -> Result<(), DaemonError> {
        self.call(&DaemonRequest::WriteNode {
            site: site.to_owned(),
            path: path.to_owned(),
            node,
        })
        .map(|_| ())
    }

    pub fn remove_node(&self, site: &str, path: &str) -> Result<(), DaemonError> {
        self.call(&DaemonRequest::RemoveNode {
            site: site.to_owned(),
            path: path.to_owned(),
        })
        .map(|_| ())
    }

    pub fn rename_node(&self, site: &str, source: &str, target: &str) -> Result<(), DaemonError> {
        self.call(&DaemonRequest::RenameNode {
            site: site.to_owned(),
            source: source.to_owned(),
            target: target.to_owned(),
        })
        .map(|_| ())
    }

    pub fn get_site_config(&self, site: &str, name: &str) -> Result<ConfigValue, DaemonError> {
        self.call_as(&DaemonRequest::GetSiteConfig {
            site: site.to_owned(),
            name: name.to_owned(),
        })
    }

    pub fn connect_signal(&self, id: &str, signal: &str) -> Result<(), DaemonError> {
        self.call(&DaemonRequest::ConnectSignal {
            id: id.to_owned(),
            signal: signal.to_owned(),
        })
        .map(|_| ())
    }

    pub fn emit_signal(&self, name: &str, args: Value) -> Result<Vec<Value>, DaemonError> {
        self.call_as(&DaemonRequest::EmitSignal {
            name: name.to_owned(),
            args,
        })
    }

    pub fn wait_signal(&self, id: &str) -> Result<ReceivedSignal, DaemonError> {
        self.call_as(&DaemonRequest::WaitSignal { id: id.to_owned() })
    }

    pub fn finish_signal(
        &self,
        id: &str,
        ticket: Option<u64>,
        reply: Result<Value, String>,
    ) -> Result<(), DaemonError> {
        let (ret, error) = match reply {
            Ok(ret) => (ret, None),
            Err(message) => (Value::Null, Some(message)),
        };
        self.call(&DaemonRequest::FinishSignal {
            id: id.to_owned(),
            ticket,
            ret,
            error,
        })
        .map(|_| ())
    }

    pub fn send_mail(&self, mail: Mail) -> Result<(), DaemonError> {
        self.call(&DaemonRequest::SendMail(mail)).map(|_| ())
    }

    pub fn put_request(&self, request: Request) -> Result<u64, DaemonError> {
        self.call_as(&DaemonRequest::PutRequest(request))
    }

    pub fn get_request(&self, id: u64) -> Result<Option<Request>, DaemonError> {
        self.call_as(&DaemonRequest::GetRequest { id })
    }

    pub fn remove_request(&self, id: u64) -> Result<Option<Request>, DaemonError> {
        self.call_as(&DaemonRequest::RemoveRequest { id })
    }
}
