pub mod batch;
pub mod groups;
pub mod local;
pub mod log_tailer;
pub mod merger;
pub mod pm2;
pub mod process_checker;
pub mod retention;
pub mod session;
pub mod supervisor;

pub use batch::{run_batch, BatchAction};
pub use groups::GroupService;
pub use local::LocalSupervisor;
pub use pm2::Pm2Supervisor;
pub use session::{MonitorContext, SessionManager};
pub use supervisor::Supervisor;
