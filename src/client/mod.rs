//! Client side of the upload → process → poll → download cycle.

pub mod api;
pub mod controller;
pub mod poller;

pub use api::{ClientError, HttpJobApi, JobApi, SelectedFile};
pub use controller::{ClientController, ClientSnapshot, Phase};
