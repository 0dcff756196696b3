// Ice Pulse sensor agent
// Samples a temperature/humidity pair, posts readings to the collection API and
// applies firmware updates inside a nightly window without interrupting sampling.
// Hardware collaborators only build for ESP-IDF; other targets get simulated
// stand-ins so the agent runs and tests on a desktop.

pub mod config;
pub mod logging;
pub mod network;
pub mod ota;
pub mod sensors;
pub mod state;
pub mod system;
pub mod tasks;
pub mod version;

#[cfg(test)]
mod testing;
