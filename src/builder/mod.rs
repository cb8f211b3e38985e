//! The interactive tag query builder: data model, pure transitions, the
//! cancellation-aware fetcher, and the coordinator tying them together.

mod coordinator;
mod fetcher;
pub mod flux;
mod gateway;
mod state;
mod store;
#[cfg(test)]
pub mod testing;
mod types;

pub use coordinator::Coordinator;
pub use gateway::{FluxGateway, MetadataGateway};
pub use types::{BuilderConfig, BuilderState, RemoteDataState, TagSelectorState, FUNCTIONS};
