pub mod cmd;
pub mod luks;
pub mod lvm;
pub mod mkfs;
pub mod mount;
pub mod parted;

use lazy_static::lazy_static;
use tokio::sync::RwLock;

lazy_static! {
    static ref VERBOSE: RwLock<bool> = RwLock::new(false);
}

/// Propagate the log level to the external tools that support a debug flag
/// (cryptsetup, lvm).
pub async fn set_verbose(verbose: bool) {
    *VERBOSE.write().await = verbose;
}

async fn get_verbose() -> bool {
    *VERBOSE.read().await
}
