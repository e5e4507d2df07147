use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub u64);

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl From<u64> for $name {
                fn from(id: u64) -> Self {
                    $name(id)
                }
            }
        )*
    };
}

id_type!(
    /// Identifier of a [`Project`](super::Project).
    ProjectId,
    /// Identifier of a [`Tester`](super::Tester).
    TesterId,
    /// Identifier of a [`Suite`](super::Suite).
    SuiteId,
    /// Identifier of a [`Test`](super::Test).
    TestId,
    /// Identifier of a [`Run`](super::Run).
    RunId,
    /// Identifier of a [`QueueEntry`](super::QueueEntry). Allocated in admission order.
    QueueEntryId,
);
