mod common;
mod pgbackup;
mod pgcluster;
mod pgpolicy;
mod pgpolicylog;
mod pgupgrade;

pub use common::*;
pub use pgbackup::*;
pub use pgcluster::*;
pub use pgpolicy::*;
pub use pgpolicylog::*;
pub use pgupgrade::*;
