use clap::ErrorKind::{DisplayHelp, DisplayVersion};
use log::{info, trace};
use meercal::{
    MeercalContext,
    MeercalError::{ClapError, DryRun},
};
use std::{env, ffi::OsString, fmt::Debug, time::Duration};

fn main_with_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    I: Debug,
{
    let meercal_ctx = match MeercalContext::from_args(args) {
        Ok(meercal_ctx) => meercal_ctx,
        Err(DryRun {}) => {
            info!("Dry run. No toolkit calls will be made.");
            return 0;
        }
        Err(ClapError(inner)) => {
            // Swallow broken pipe errors
            trace!("clap error: {:?}", inner.kind());
            let _ = inner.print();
            match inner.kind() {
                DisplayHelp | DisplayVersion => return 0,
                _ => return 1,
            }
        }
        Err(e) => {
            eprintln!("error parsing args: {e}");
            return 1;
        }
    };

    let num_steps = meercal_ctx.plan.steps.len();
    match meercal_ctx.run() {
        Ok(durations) => {
            info!(
                "total duration of {} steps: {:?}",
                num_steps,
                durations
                    .into_iter()
                    .fold(Duration::ZERO, |duration_sum, (name, duration)| {
                        info!("{} duration: {:?}", name, duration);
                        duration_sum + duration
                    })
            );
            0
        }
        // TODO(Dev): different return codes for toolkit and solve failures
        Err(e) => {
            eprintln!("pipeline error: {e}");
            1
        }
    }
}

fn main() {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    trace!("start main");
    let retcode = main_with_args(env::args());
    trace!("end main");
    std::process::exit(retcode);
}
