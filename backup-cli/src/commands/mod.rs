mod backup;
mod restore;

// Backup commands
pub use backup::{
    CreateRequest, run_create, run_delete, run_list, run_show, run_sweep, run_verify,
};

// Restore commands
pub use restore::run_restore;
