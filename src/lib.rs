pub use crate::orbit::connections::{ConnectionTier, Requests};
pub use crate::orbit::error::{OrbitError, Result};
pub use crate::orbit::events::{Event, EventDraft, EventKind};
pub use crate::orbit::messages::{Message, MessageKind, SYSTEM_SENDER, thread_key};
pub use crate::orbit::session::{AuthGate, GateDecision};
pub use crate::orbit::state::{AppState, GeoPoint};
pub use crate::orbit::stories::{Story, StoryDraft, StoryKind};
pub use crate::orbit::users::{User, UserStatus};
pub use crate::orbit::{Orbit, OrbitConfig};
pub use crate::remote::auth::SessionEvent;
pub use crate::remote::subscriptions::{ChangeType, Table, TableChange};
pub use crate::remote::{RemoteConfig, RemoteManager, RemoteManagerError};

use std::sync::{Mutex, OnceLock};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

mod orbit;
mod remote;

static TRACING_GUARDS: OnceLock<Mutex<Option<(WorkerGuard, WorkerGuard)>>> = OnceLock::new();
static TRACING_INIT: OnceLock<()> = OnceLock::new();

pub(crate) fn init_tracing(logs_dir: &std::path::Path) {
    TRACING_INIT.get_or_init(|| {
        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("orbit")
            .filename_suffix("log")
            .build(logs_dir)
            .expect("Failed to create file appender");

        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        TRACING_GUARDS
            .set(Mutex::new(Some((file_guard, stdout_guard))))
            .ok();

        let stdout_layer = Layer::new()
            .with_writer(non_blocking_stdout)
            .with_ansi(true)
            .with_target(true);

        let file_layer = Layer::new()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);

        Registry::default()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(stdout_layer)
            .with(file_layer)
            .init();
    });
}
