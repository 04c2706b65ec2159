mod biome;
mod caves;
mod column;
mod config;
mod coords;
mod features;
pub mod lighting;
mod liquid;
mod noise;
mod persist;
mod raycast;
mod relight;
mod scheduler;
mod store;
mod subchunk;
mod terrain;
mod worker;
mod world;

pub use biome::*;
pub use caves::*;
pub use column::*;
pub use config::*;
pub use coords::*;
pub use features::*;
pub use lighting::*;
pub use liquid::*;
pub use noise::*;
pub use persist::*;
pub use raycast::*;
pub use relight::*;
pub use scheduler::*;
pub use store::*;
pub use subchunk::*;
pub use terrain::*;
pub use worker::*;
pub use world::*;
