//! Alert rule documents and their on-disk layout

mod file;
mod model;

pub use file::{
    deployment_file_name, parse_summary, placeholder_file_name, read_rule, uid_from_file_name,
    write_rule, AlertFileError,
};
pub use model::{
    AlertQuery, ExecErrState, NoDataState, ProvisionedAlertRule, RelativeTimeRange, RuleSummary,
    CONDITION_REF, EXPRESSION_DATASOURCE,
};
