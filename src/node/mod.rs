mod host;
mod id;

pub use self::{
    host::{Download, Host},
    id::NodeId,
};
