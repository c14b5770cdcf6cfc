//! Shared handler state

use rstuf_auth::AuthenticationService;
use std::sync::Arc;
use std::time::Duration;

use crate::bootstrap::BootstrapCoordinator;
use crate::broker::{Broker, TaskDispatcher};
use crate::settings::SettingsStore;

/// Application state shared across handlers
pub struct AppState {
    pub settings: Arc<SettingsStore>,
    pub dispatcher: Arc<TaskDispatcher>,
    pub coordinator: BootstrapCoordinator,
    /// `None` when no token secret is configured
    pub auth: Option<Arc<dyn AuthenticationService>>,
    /// When false, scope checks are skipped and handlers see no user
    pub auth_enabled: bool,
}

impl AppState {
    pub fn new(
        settings: Arc<SettingsStore>,
        broker: Arc<dyn Broker>,
        auth: Option<Arc<dyn AuthenticationService>>,
        auth_enabled: bool,
        poll_interval: Duration,
    ) -> Self {
        let dispatcher = Arc::new(TaskDispatcher::new(broker));
        let coordinator =
            BootstrapCoordinator::new(settings.clone(), dispatcher.clone(), poll_interval);
        Self {
            settings,
            dispatcher,
            coordinator,
            auth,
            auth_enabled,
        }
    }
}
