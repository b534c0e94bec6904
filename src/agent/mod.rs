// Agent module for secret polling functionality
//
// This module implements the sync loop: it polls the secret store on a fixed
// interval, compares each snapshot with the last one it saw, and republishes
// the secret to the output file and the process environment when it changed.

mod daemon;
mod detect;
mod provider;
mod publisher;
mod scheduler;
mod shutdown;

pub use daemon::{SyncLoop, TickOutcome};
pub use provider::{SecretProvider, VaultProvider};
pub use publisher::Publisher;
pub use scheduler::PollingScheduler;
pub use shutdown::listen_for_shutdown;
