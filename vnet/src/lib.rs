#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use vnet_clean::{
    register_cleanup_callback, Callback, CallbackRegistry, Cleanup, CleanupConfig,
    CleanupFlavor, CleanupReport,
};
pub use vnet_exec::{Cmd, Executor, HostExecutor, Output, ProcessHandle};
pub use vnet_node::*;
pub use vnet_tc::{Discipline, MAX_BANDWIDTH_MBIT};

pub mod tc {
    //! The traffic shaping model, for building `tc` chains without a node.
    pub use vnet_tc::*;
}
