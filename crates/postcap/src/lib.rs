//! Postcap: build a Postman collection from intercepted HTTP traffic.
//!
//! Every completed flow whose host matches the target domain is normalized,
//! merged into a de-duplicated collection model, and the model is written
//! atomically to a Postman v2.1 file after each change.
//!
//! Pipeline: [`filter`] → [`normalize`] → [`collection::merge`] →
//! [`collection::postman`] → [`persist`], wired by [`dispatch`] and fed by
//! the built-in [`proxy`] or any external engine producing [`flow::Flow`]s.

pub mod collection;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod flow;
pub mod normalize;
pub mod persist;
pub mod proxy;
pub mod store;

pub use collection::{CollectionModel, MergeOutcome};
pub use config::CaptureConfig;
pub use dispatch::{DispatchOutcome, EventDispatcher};
pub use error::CaptureError;
pub use filter::{in_scope, DomainFilter};
pub use flow::{Flow, FlowResponse, HeaderList};
pub use normalize::{CallRecord, Normalizer};
pub use store::CaptureStore;
