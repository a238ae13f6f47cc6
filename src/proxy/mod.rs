//! Prefix-routed reverse proxy to the backend services

pub mod dispatcher;
pub mod table;

pub use dispatcher::{
    BackendTarget, DispatchError, Dispatcher, ForwardRequest, ForwardedIdentity, SERVED_BY,
};
pub use table::{is_canonical_path, Access, Rewrite, Route, RouteMatch, RouteTable};
