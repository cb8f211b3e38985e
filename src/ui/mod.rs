mod select;
mod spinner;
mod status;
mod table;

pub use select::{fuzzy_select, input, multi_select};

pub use spinner::{with_spinner, with_watched_spinner};

pub use status::{print_command_status, CommandStatus};

pub use table::{apply_column_padding, header, styled_table, truncate};
