//! The shared-state object behind every remote call.
//!
//! Each subsystem carries its own lock: the node-type registry sits behind a
//! read/write lock, the signal bus and request table synchronise internally,
//! and the node store relies on the filesystem alone. Store and configuration
//! reads run on the blocking pool.

use serde_json::Value;
use tokio::sync::RwLock;

use monsti_core::{
    site_config, ConfigValue, FieldConfig, Mail, NodeStore, NodeType, NodeTypeId,
    NodeTypeRegistry, Request,
};

use crate::error::DaemonError;
use crate::mail::{self, MailTransport};
use crate::requests::RequestTable;
use crate::settings::DaemonSettings;
use crate::signal::{ReceivedSignal, SignalBus, SignalReply};

pub struct MonstiService {
    settings: DaemonSettings,
    registry: RwLock<NodeTypeRegistry>,
    signals: SignalBus,
    requests: RequestTable,
    mailer: Box<dyn MailTransport>,
}

impl MonstiService {
    pub fn new(settings: DaemonSettings) -> Self {
        let mailer = mail::from_settings(&settings.mail);
        Self::with_mailer(settings, mailer)
    }

    pub fn with_mailer(settings: DaemonSettings, mailer: Box<dyn MailTransport>) -> Self {
        let signals = SignalBus::new(settings.signals.grace(), settings.signals.reminder());
        Self {
            settings,
            registry: RwLock::new(NodeTypeRegistry::new()),
            signals,
            requests: RequestTable::new(),
            mailer,
        }
    }

    pub fn settings(&self) -> &DaemonSettings {
        &self.settings
    }

    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    // -----------------------------------------------------------------------
    // Node types
    // -----------------------------------------------------------------------

    pub async fn register_node_type(&self, node_type: NodeType) -> Result<(), DaemonError> {
        let id = node_type.id.clone();
        self.registry.write().await.register(node_type)?;
        tracing::info!(node_type = %id, "node type registered");
        Ok(())
    }

    pub async fn get_node_type(&self, id: &NodeTypeId) -> Result<NodeType, DaemonError> {
        Ok(self.registry.read().await.get(id)?)
    }

    /// Ids of node types addable below a node of type `parent`. The site is
    /// accepted for symmetry with the other calls; all sites share one
    /// registry.
    pub async fn get_addable_node_types(&self, site: &str, parent: &str) -> Vec<NodeTypeId> {
        tracing::debug!(site, parent, "listing addable node types");
        self.registry.read().await.addable_node_types(parent)
    }

    pub async fn list_node_types(&self) -> Vec<NodeTypeId> {
        self.registry.read().await.node_type_ids().cloned().collect()
    }

    /// Every canonical field definition, once per field id.
    pub async fn list_fields(&self) -> Vec<FieldConfig> {
        self.registry.read().await.fields().cloned().collect()
    }

    pub async fn node_type_count(&self) -> usize {
        self.registry.read().await.node_type_ids().count()
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    fn node_store(&self, site: &str) -> Result<NodeStore, DaemonError> {
        Ok(NodeStore::new(&self.settings.site(site)?.nodes_path))
    }

    pub async fn get_node(&self, site: &str, path: &str) -> Result<Option<Value>, DaemonError> {
        let store = self.node_store(site)?;
        let path = path.to_owned();
        blocking(move || Ok(store.get_node(&path)?)).await
    }

    pub async fn get_children(&self, site: &str, path: &str) -> Result<Vec<Value>, DaemonError> {
        let store = self.node_store(site)?;
        let path = path.to_owned();
        blocking(move || Ok(store.get_children(&path)?)).await
    }

    pub async fn get_node_data(
        &self,
        site: &str,
        path: &str,
        file: &str,
    ) -> Result<Option<Vec<u8>>, DaemonError> {
        let store = self.node_store(site)?;
        let (path, file) = (path.to_owned(), file.to_owned());
        blocking(move || Ok(store.get_node_data(&path, &file)?)).await
    }

    pub async fn write_node_data(
        &self,
        site: &str,
        path: &str,
        file: &str,
        content: Vec<u8>,
    ) -> Result<(), DaemonError> {
        let store = self.node_store(site)?;
        let (path, file) = (path.to_owned(), file.to_owned());
        blocking(move || Ok(store.write_node_data(&path, &file, &content)?)).await
    }

    pub async fn write_node(&self, site: &str, path: &str, node: Value) -> Result<(), DaemonError> {
        let store = self.node_store(site)?;
        let path = path.to_owned();
        blocking(move || Ok(store.write_node(&path, &node)?)).await
    }

    pub async fn remove_node(&self, site: &str, path: &str) -> Result<(), DaemonError> {
        let store = self.node_store(site)?;
        let node_path = path.to_owned();
        blocking(move || Ok(store.remove_node(&node_path)?)).await?;
        tracing::info!(site, path, "node removed");
        Ok(())
    }

    pub async fn rename_node(&self, site: &str, source: &str, target: &str) -> Result<(), DaemonError> {
        let store = self.node_store(site)?;
        let (from, to) = (source.to_owned(), target.to_owned());
        blocking(move || Ok(store.rename_node(&from, &to)?)).await?;
        tracing::info!(site, source, target, "node renamed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Site configuration
    // -----------------------------------------------------------------------

    pub async fn get_site_config(&self, site: &str, name: &str) -> Result<ConfigValue, DaemonError> {
        let config_dir = self.settings.site(site)?.config_path.clone();
        let name = name.to_owned();
        blocking(move || Ok(site_config::get_site_config(&config_dir, &name)?)).await
    }

    // -----------------------------------------------------------------------
    // Signals
    // -----------------------------------------------------------------------

    pub async fn connect_signal(&self, subscriber: &str, signal: &str) {
        self.signals.connect(subscriber, signal).await;
    }

    pub async fn emit_signal(&self, signal: &str, args: Value) -> Result<Vec<Value>, DaemonError> {
        self.signals.emit(signal, args).await
    }

    pub async fn wait_signal(&self, subscriber: &str) -> Result<ReceivedSignal, DaemonError> {
        self.signals.wait(subscriber).await
    }

    pub async fn finish_signal(
        &self,
        subscriber: &str,
        ticket: Option<u64>,
        reply: SignalReply,
    ) -> Result<(), DaemonError> {
        self.signals.finish(subscriber, ticket, reply).await
    }

    // -----------------------------------------------------------------------
    // Mail and requests
    // -----------------------------------------------------------------------

    pub async fn send_mail(&self, mail: &Mail) -> Result<(), DaemonError> {
        mail::check_mail(mail)?;
        self.mailer.send(mail).await
    }

    pub async fn put_request(&self, request: Request) -> u64 {
        self.requests.insert(request).await
    }

    pub async fn get_request(&self, id: u64) -> Option<Request> {
        self.requests.get(id).await
    }

    pub async fn remove_request(&self, id: u64) -> Option<Request> {
        self.requests.remove(id).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T, DaemonError>
where
    F: FnOnce() -> Result<T, DaemonError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| DaemonError::Protocol(format!("blocking task join error: {err}")))?
}
