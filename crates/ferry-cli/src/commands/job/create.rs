use std::path::Path;
use std::time::Duration;

use ferry_core::entities::JobSpec;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::CreateJobArgs;
use crate::commands::shared::drive::{DriveEnd, drive, recover};
use crate::commands::shared::mapping::load_mapping;
use crate::context::AppContext;
use crate::output::output;

use super::types::JobView;

const WAIT_PROGRESS_EVERY: Duration = Duration::from_secs(2);

pub async fn run(args: &CreateJobArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let spec = JobSpec {
        name: args.name.clone(),
        source_environment_id: args.source_env.clone(),
        dest_environment_id: args.dest_env.clone(),
        source_entity: args.source_entity.clone(),
        dest_entity: args.dest_entity.clone(),
        mapping: load_mapping(Path::new(&args.mapping))?,
    };

    if !args.wait {
        let scheduler = ctx.recording_scheduler();
        let job_id = scheduler.submit(spec).await?;
        if !flags.quiet {
            eprintln!("{job_id} queued; start it with `ferry run`");
        }
        return output(&JobView::load(&scheduler, &job_id).await?, flags.format);
    }

    let scheduler = ctx.dispatching_scheduler();
    recover(&scheduler).await?;
    let job_id = scheduler.submit(spec).await?;
    if drive(&scheduler, WAIT_PROGRESS_EVERY).await? == DriveEnd::Interrupted {
        eprintln!("interrupted; jobs still queued run with `ferry run`");
    }
    output(&JobView::load(&scheduler, &job_id).await?, flags.format)
}
