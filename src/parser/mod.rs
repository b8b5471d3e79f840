//! Decoders for the line-oriented text xCAT returns from zhcp commands.

pub mod keyword;
pub mod perf;
pub mod table;
pub mod vswitch;

pub use keyword::{match_lines, match_required, Keyword};
pub use perf::{parse_performance_report, PerfFields};
pub use vswitch::{decode_vswitch_report, nics_by_userid, VswitchGroup};
