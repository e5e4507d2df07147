pub mod config;
pub mod editor;
pub mod engine;
pub mod exclusion;
pub mod executor;
pub mod message;
pub mod model;
pub mod notify;
pub mod output;
pub mod queue;
pub mod reconcile;
pub mod recorder;
pub mod state;
pub mod store;
pub mod sync;

pub use config::{Config, ConfigError};
pub use engine::{Engine, EngineError};
pub use executor::{ExecutionRequest, Executor, ExecutorError};
pub use message::{Message, Severity};
pub use notify::{LogNotifier, NotificationSelector, Notifier, NotifyError, TestResult};
pub use output::OutputInterpreter;
pub use queue::{Admission, QueueManager};
pub use recorder::{RawOutput, Recorded, ResultRecorder};
pub use state::TestState;
pub use store::{FileStore, MemoryStore, Store, StoreError};
pub use sync::{SyncError, SyncReport, TestSynchronizer};
