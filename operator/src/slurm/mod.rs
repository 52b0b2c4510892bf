pub mod adapter;
pub mod hostlist;
pub mod types;

pub use adapter::SchedulerAdapter;
pub use hostlist::{parse_host_list, parse_physical_host_from_comment};
