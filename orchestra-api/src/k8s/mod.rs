//! Kubernetes integration for the control-plane API.
//!
//! The HTTP handlers never talk to the cluster directly; they depend on the
//! [`K8sClient`] trait, which covers the few operations this service needs
//! (submitting pods and reading/writing the settings config map). The
//! default implementation, [`http::HttpK8sClient`], is backed by the
//! [`kube`] crate and uses the ambient configuration (in-cluster or local
//! `~/.kube/config`). Keeping the abstraction in [`base`] lets tests swap in
//! a recording mock.

mod base;
pub mod http;

pub use base::*;
