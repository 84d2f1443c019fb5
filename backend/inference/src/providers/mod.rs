pub mod mock;
pub mod replicate;
pub mod sse;

pub use mock::MockGateway;
pub use replicate::ReplicateGateway;
