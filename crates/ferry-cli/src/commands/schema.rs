use ferry_core::entities::Job;
use ferry_core::mapping::ColumnMapping;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::{SchemaArgs, SchemaType};
use crate::output::output;

/// Handle `ferry schema`.
pub fn handle(args: &SchemaArgs, flags: &GlobalFlags) -> anyhow::Result<()> {
    let schema = match args.type_name {
        SchemaType::Mapping => schemars::schema_for!(ColumnMapping),
        SchemaType::Job => schemars::schema_for!(Job),
    };
    output(&schema, flags.format)
}
