#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-coupler
//!
//! mesh-coupler is a runtime coupling layer for distributed simulation codes.
//! Independently developed applications, each with its own mesh and data
//! layout, exchange field data through a shared *rendezvous* decomposition
//! without any code owning a global view of the others' internals.
//!
//! ## Features
//! - Partition oracle routing classified mesh entities to rendezvous ranks
//! - Field adapters as the capability contract of native fields
//! - Cached reverse-partition layouts and versioned wire frames
//! - Internal fields over `f32`/`f64`/`i32`/`i64` with checked conversion
//! - Gather (N fields → combiner → one field) and scatter (one field → N
//!   fields) operations
//! - Pluggable transports: in-process mailbox, optional MPI backend
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-coupler = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon"]
//! ```
//!
//! A rendezvous rank builds a [`CouplerServer`](coupler::CouplerServer) over
//! the internal mesh, registers one
//! [`Application`](coupler::Application) per native code and adds the fields
//! it exchanges. Each application rank builds a
//! [`CouplerClient`](coupler::CouplerClient) with the same field names.
//! Traffic is bracketed by send and receive phases:
//!
//! ```text
//! client: send_phase { send_field }     server: receive_phase { gather_fields }
//! client: receive_phase { receive_field } server: send_phase { scatter_fields }
//! ```
//!
//! ## Logging
//! The crate logs through the [`log`] facade and installs no logger.

pub mod adapter;
pub mod algs;
pub mod config;
pub mod coupler;
pub mod coupling_error;
pub mod data;
pub mod io;
pub mod partitioning;
pub mod topology;

pub use coupling_error::{CouplingError, ErrorCategory};

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::adapter::{
        AdapterKind, ArrayFieldAdapter, ClassifiedFieldAdapter, FieldAdapter, ReversePartitionMap,
    };
    pub use crate::algs::combine::{CombinerFunction, combiner, combiners};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, LocalComm, LocalHub, NoComm, Side, Wait};
    pub use crate::algs::field_communicator::SendMode;
    pub use crate::config::{CouplerConfig, EvaluationMethod, FieldTransferMethod, TransferOptions};
    pub use crate::coupler::{
        Application, ApplicationId, CouplerClient, CouplerServer, FieldId, InternalFieldSpec,
    };
    pub use crate::coupling_error::{CouplingError, ErrorCategory};
    pub use crate::data::{
        ArrayMask, Element, ElementType, GridResolution, InternalField, InternalMesh, MeshField,
    };
    pub use crate::io::read_node_classification;
    pub use crate::partitioning::{ClassPartition, Partition, PartitionError, RcbPartition};
    pub use crate::topology::{Gid, ModelEnt, NodeClassification, ReverseClassification};
}
