#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("command error: {0}")]
    Exec(#[from] vnet_exec::Error),
    #[error("exceeded supported number of routing domains ({limit})")]
    DomainsExhausted { limit: u32 },
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("interface {0} was deleted")]
    IntfDeleted(String),
    #[error("node {node} has no interface {intf}")]
    IntfNotFound { node: String, intf: String },
    #[error("failed to create interface pair {name1} <-> {name2}: {output}")]
    PairCreation { name1: String, name2: String, output: String },
    #[error("failed to rename interface {intf} to {new_name}: {output}")]
    Rename { intf: String, new_name: String, output: String },
    #[error("interface {0} has no address")]
    NoAddress(String),
    #[error("node {0} is not isolated")]
    NotIsolated(String),
    #[error("invalid MAC address: {0:?}")]
    InvalidMac(String),
    #[error("node {0} was terminated")]
    Terminated(String),
    #[error("failed to create isolation anchor for {node}: {output}")]
    Anchor { node: String, output: String },
}

pub type Result<T> = std::result::Result<T, Error>;
